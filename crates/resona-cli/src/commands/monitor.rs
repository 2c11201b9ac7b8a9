//! Live monitoring command.
//!
//! Runs the realtime engine against the default devices for a fixed
//! duration, printing smoothed levels and render statistics.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use resona_core::units::GainUnit;
use resona_core::{EngineConfig, EngineContext, ProcessingChain};
use resona_io::{CpalBackend, RealtimeEngine, RoutingMode};

#[derive(Args)]
pub struct MonitorArgs {
    /// Monitoring mode: direct, processed, or split
    #[arg(short, long, default_value = "processed")]
    mode: String,

    /// Gain applied in the processing chain, in dB
    #[arg(short, long, default_value = "0.0", allow_hyphen_values = true)]
    gain: f32,

    /// Delay compensation in samples
    #[arg(long, default_value = "0")]
    compensation: usize,

    /// How long to run, in seconds
    #[arg(short, long, default_value = "10")]
    duration: u64,

    /// Sample rate in Hz
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Block size in frames
    #[arg(long, default_value = "512")]
    block_size: usize,

    /// Record raw input to this WAV file while monitoring
    #[arg(short, long)]
    record: Option<std::path::PathBuf>,
}

pub fn run(args: MonitorArgs) -> anyhow::Result<()> {
    let mode = match args.mode.as_str() {
        "direct" => RoutingMode::DirectMonitoring,
        "processed" => RoutingMode::ProcessedMonitoring,
        "split" => RoutingMode::SplitMonitoring,
        other => anyhow::bail!("unknown mode '{other}' (expected direct, processed, or split)"),
    };

    let context = EngineContext::new(EngineConfig {
        sample_rate: args.sample_rate as f32,
        block_size: args.block_size,
        input_channels: 2,
        output_channels: 2,
    });
    context.initialize();

    let chain = Arc::new(ProcessingChain::new(Arc::clone(&context)));
    chain.add_unit(Box::new(GainUnit::from_db(args.gain)));

    let engine = Arc::new(RealtimeEngine::new(Arc::clone(&context), chain));
    engine.set_routing_mode(mode);
    engine.set_compensation_samples(args.compensation);

    let backend = CpalBackend::new();
    engine.start(&backend)?;
    if let Some(path) = &args.record {
        engine.start_recording(path)?;
        println!("Recording to {}", path.display());
    }
    println!("Monitoring for {}s ({:?})...", args.duration, mode);

    let deadline = Instant::now() + Duration::from_secs(args.duration);
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(500));
        let stats = engine.performance();
        println!(
            "  in {:>6.3}  out {:>6.3}  cpu {:>5.1}%",
            engine.input_level(),
            engine.output_level(),
            stats.cpu_percent
        );
        if engine.is_failed() {
            engine.stop();
            anyhow::bail!("audio device failed");
        }
    }

    engine.stop();
    println!("Stopped.");
    Ok(())
}
