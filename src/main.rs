//! syllable-trigger - closed-loop syllable detection runner
//!
//! Thin operational shell: loads a session file, resolves the devices, runs
//! a session until Ctrl+C, and prints trigger activity as it happens.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use syllable_trigger::audio::device;
use syllable_trigger::{Session, SessionConfig, TriggerStats};
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("syllable_trigger=info".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut input_device: Option<String> = None;
    let mut output_device: Option<String> = None;
    let mut sample_rate: Option<u32> = None;
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--list" | "-l" => {
                list_devices()?;
                return Ok(());
            }
            "--version" | "-v" => {
                println!("syllable-trigger {}", syllable_trigger::VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => {
                if i + 1 >= args.len() {
                    bail!("--config requires a file path");
                }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
                continue;
            }
            "--input-device" => {
                if i + 1 >= args.len() {
                    bail!("--input-device requires a device name");
                }
                input_device = Some(args[i + 1].clone());
                i += 2;
                continue;
            }
            "--output-device" => {
                if i + 1 >= args.len() {
                    bail!("--output-device requires a device name");
                }
                output_device = Some(args[i + 1].clone());
                i += 2;
                continue;
            }
            "--sample-rate" | "-r" => {
                if i + 1 >= args.len() {
                    bail!("--sample-rate requires a value");
                }
                sample_rate = Some(
                    args[i + 1]
                        .parse()
                        .with_context(|| format!("invalid sample rate: {}", args[i + 1]))?,
                );
                i += 2;
                continue;
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
        }
    }

    let Some(config_path) = config_path else {
        print_help();
        bail!("a session file is required (--config session.json)");
    };

    run(&config_path, input_device, output_device, sample_rate)
}

fn print_help() {
    println!("Usage: syllable-trigger [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config FILE       Session file describing channel pairings");
    println!("  -l, --list              List available audio devices");
    println!("      --input-device NAME  Override the session's input device");
    println!("      --output-device NAME Override the session's output device");
    println!("  -r, --sample-rate RATE  Override the session's sample rate");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Example:");
    println!("  syllable-trigger --config experiment.json");
}

fn list_devices() -> Result<()> {
    let devices = device::list_devices()?;
    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    for (i, dev) in devices.iter().enumerate() {
        let default_marker = if dev.is_default { " [DEFAULT]" } else { "" };
        println!("  {}. {}{}", i + 1, dev.name, default_marker);
        println!(
            "     Channels: {} in, {} out",
            dev.input_channels, dev.output_channels
        );
        if !dev.sample_rates.is_empty() {
            println!("     Sample rates: {:?}", dev.sample_rates);
        }
    }

    Ok(())
}

fn run(
    config_path: &std::path::Path,
    input_override: Option<String>,
    output_override: Option<String>,
    rate_override: Option<u32>,
) -> Result<()> {
    let config = SessionConfig::load(config_path)?;
    let base = config_path.parent().unwrap_or(std::path::Path::new("."));
    let entries = config.resolve_entries(base)?;

    let input_name = input_override.or_else(|| config.input_device.clone());
    let output_name = output_override.or_else(|| config.output_device.clone());
    let sample_rate = rate_override.unwrap_or(config.sample_rate);

    // Both devices must resolve before any audio resource is touched
    let input = device::find_input_device(input_name.as_deref())
        .context("could not resolve input device")?;
    let output = device::find_output_device(output_name.as_deref())
        .context("could not resolve output device")?;

    let mut session = Session::start(&input, &output, entries, sample_rate)
        .context("unable to initialize audio")?;

    info!(
        detectors = session.detector_count(),
        sample_rate = session.sample_rate(),
        "Processing started"
    );
    println!(
        "Running: {} detector(s) at {} Hz. Press Ctrl+C to stop.",
        session.detector_count(),
        session.sample_rate()
    );

    let running = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, std::sync::atomic::Ordering::SeqCst);
    })
    .ok();

    let mut stats = TriggerStats::new();
    let mut last_total = 0u64;
    let mut ticks = 0u32;

    while running.load(std::sync::atomic::Ordering::SeqCst) {
        while let Ok(event) = session.events().try_recv() {
            stats.record(&event);
            println!(
                "fired: in {} -> out {} ({} total)",
                event.input_channel,
                event.output_channel,
                stats.total()
            );
        }

        // Input level snapshot every ~10s
        ticks += 1;
        if ticks % 100 == 0 {
            let peaks: Vec<String> = (0..session.input_channels())
                .map(|ch| format!("ch{}: {:.3}", ch, session.input_peak(ch)))
                .collect();
            info!(levels = %peaks.join(", "), "Input peaks");
        }

        if stats.total() != last_total {
            last_total = stats.total();
            let per_channel: Vec<String> = stats
                .per_channel()
                .map(|(ch, n)| format!("ch{}: {}", ch, n))
                .collect();
            info!(
                total = stats.total(),
                breakdown = %per_channel.join(", "),
                "Trigger summary"
            );
        }

        std::thread::sleep(Duration::from_millis(100));
    }

    println!();
    println!("Stopping...");
    session.stop();
    println!(
        "Done. {} trigger(s) over {} second(s).",
        stats.total(),
        stats.uptime_seconds()
    );

    Ok(())
}
