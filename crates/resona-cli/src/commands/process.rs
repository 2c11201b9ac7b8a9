//! File-based batch processing command.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use resona_core::units::GainUnit;
use resona_core::{EngineConfig, EngineContext, ProcessingChain};
use resona_io::{OfflineEngine, TaskConfig, TaskStatus, read_wav_info};

#[derive(Args)]
pub struct ProcessArgs {
    /// Input WAV files
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory (outputs are named after their inputs)
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Gain to apply, in dB
    #[arg(short, long, default_value = "0.0", allow_hyphen_values = true)]
    gain: f32,

    /// Processing block size
    #[arg(long, default_value = "4096")]
    block_size: usize,

    /// Output bit depth (16, 24, or 32)
    #[arg(long, default_value = "32")]
    bit_depth: u16,

    /// Worker pool size (defaults to the CPU count)
    #[arg(short, long)]
    workers: Option<usize>,
}

pub fn run(args: ProcessArgs) -> anyhow::Result<()> {
    let context = EngineContext::new(EngineConfig::default());
    context.initialize();

    let engine = match args.workers {
        Some(workers) => OfflineEngine::with_workers(Arc::clone(&context), workers),
        None => OfflineEngine::new(Arc::clone(&context)),
    };

    let mut ids = Vec::new();
    for input in &args.inputs {
        let info = read_wav_info(input)?;
        println!(
            "{}: {} Hz, {} ch, {:.2}s",
            input.display(),
            info.sample_rate,
            info.channels,
            info.duration_secs
        );

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let output = args.out_dir.join(format!("{stem}_processed.wav"));

        let chain = ProcessingChain::new(Arc::clone(&context));
        chain.add_unit(Box::new(GainUnit::from_db(args.gain)));

        let config = TaskConfig {
            block_size: args.block_size,
            bits_per_sample: args.bit_depth,
            ..TaskConfig::default()
        };
        ids.push(engine.add_task(input, &output, chain, config));
    }

    println!(
        "Processing {} file(s) on {} worker(s)...",
        ids.len(),
        engine.worker_count()
    );
    engine.start()?;

    let bar = ProgressBar::new(1000);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {percent}%")
            .expect("static template")
            .progress_chars("##-"),
    );

    loop {
        bar.set_position((engine.aggregate_progress() * 1000.0) as u64);
        let all_done = ids
            .iter()
            .all(|&id| engine.task(id).is_some_and(|t| t.status.is_terminal()));
        if all_done {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }
    bar.finish_and_clear();
    engine.stop();

    let mut failed = 0usize;
    for &id in &ids {
        let task = engine.task(id).expect("task registered above");
        match task.status {
            TaskStatus::Completed => {
                println!("  {} -> {}", task.input.display(), task.output.display());
            }
            TaskStatus::Failed => {
                failed += 1;
                eprintln!(
                    "  {} failed: {}",
                    task.input.display(),
                    task.error.as_deref().unwrap_or("unknown error")
                );
            }
            status => {
                eprintln!("  {} ended {:?}", task.input.display(), status);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} task(s) failed");
    }
    println!("Done!");
    Ok(())
}
