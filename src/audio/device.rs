//! Audio device enumeration and lookup
//!
//! Thin helpers over the cpal host: list what is attached, resolve a device
//! by name, and answer channel-count questions the session needs for
//! validation. Everything here runs on the control path.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

/// Audio device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is a system default device
    pub is_default: bool,
    /// Supported sample rates
    pub sample_rates: Vec<u32>,
    /// Number of input channels
    pub input_channels: u16,
    /// Number of output channels
    pub output_channels: u16,
}

/// List available audio devices on the default host
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let default_output = host.default_output_device().and_then(|d| d.name().ok());

    for device in host.devices()? {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let is_default = default_input.as_deref() == Some(name.as_str())
            || default_output.as_deref() == Some(name.as_str());

        let input_channels = device
            .default_input_config()
            .map(|c| c.channels())
            .unwrap_or(0);
        let output_channels = device
            .default_output_config()
            .map(|c| c.channels())
            .unwrap_or(0);

        let common_rates = [22_050, 44_100, 48_000, 88_200, 96_000, 192_000];
        let mut sample_rates = Vec::new();
        if let Ok(configs) = device.supported_output_configs() {
            for config in configs {
                for &rate in &common_rates {
                    if (config.min_sample_rate().0..=config.max_sample_rate().0).contains(&rate)
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
        }
        sample_rates.sort();

        devices.push(DeviceInfo {
            name,
            is_default,
            sample_rates,
            input_channels,
            output_channels,
        });
    }

    Ok(devices)
}

/// Resolve a device by exact name, or the host default for the direction
///
/// Both devices must resolve before a session is constructed; failing here
/// means no audio resource has been touched yet.
pub fn find_input_device(name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => find_by_name(name),
        None => cpal::default_host()
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device available")),
    }
}

/// See [`find_input_device`]
pub fn find_output_device(name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => find_by_name(name),
        None => cpal::default_host()
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device available")),
    }
}

fn find_by_name(name: &str) -> Result<Device> {
    cpal::default_host()
        .devices()?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| anyhow!("device not found: {}", name))
}
