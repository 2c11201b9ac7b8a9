//! Integration tests for the offline batch engine.
//!
//! These drive real files through the worker pool with tempfile-backed
//! inputs and outputs. Timing-sensitive cases use a gate unit that blocks
//! inside `process` until the test releases it, so cancellation is
//! exercised deterministically mid-task rather than by racing sleeps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use resona_core::units::GainUnit;
use resona_core::{
    AudioBuffer, EngineConfig, EngineContext, EventQueue, ProcessError, ProcessingChain,
    ProcessingUnit,
};
use resona_io::{
    OfflineEngine, TaskConfig, TaskId, TaskStatus, WavBlockReader, WavBlockWriter, WavSpec,
    read_wav_info,
};
use tempfile::TempDir;

/// Blocks inside `process` until released, flagging when first entered.
struct GateUnit {
    entered: Arc<AtomicBool>,
    release: Arc<AtomicBool>,
}

impl ProcessingUnit for GateUnit {
    fn name(&self) -> &str {
        "gate"
    }

    fn process(
        &mut self,
        _buffer: &mut AudioBuffer,
        _events: &mut EventQueue,
    ) -> Result<(), ProcessError> {
        self.entered.store(true, Ordering::SeqCst);
        while !self.release.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

/// Sleeps a little every block, giving stop/cancel a window.
struct SlowUnit;

impl ProcessingUnit for SlowUnit {
    fn name(&self) -> &str {
        "slow"
    }

    fn process(
        &mut self,
        _buffer: &mut AudioBuffer,
        _events: &mut EventQueue,
    ) -> Result<(), ProcessError> {
        thread::sleep(Duration::from_millis(2));
        Ok(())
    }
}

fn context() -> Arc<EngineContext> {
    EngineContext::new(EngineConfig::default())
}

fn write_input(dir: &TempDir, name: &str, frames: usize, value: f32) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let spec = WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 32,
    };
    let mut writer = WavBlockWriter::create(&path, spec).unwrap();
    let mut buf = AudioBuffer::new(2, frames);
    buf.channel_mut(0).fill(value);
    buf.channel_mut(1).fill(value);
    writer.write_block(&buf, frames).unwrap();
    writer.finalize().unwrap();
    path
}

fn wait_terminal(engine: &OfflineEngine, ids: &[TaskId], timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let done = ids
            .iter()
            .all(|&id| engine.task(id).unwrap().status.is_terminal());
        if done {
            return;
        }
        assert!(Instant::now() < deadline, "tasks did not settle in time");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn batch_completes_and_scales_output() {
    let dir = TempDir::new().unwrap();
    let ctx = context();
    let engine = OfflineEngine::with_workers(Arc::clone(&ctx), 2);

    let mut ids = Vec::new();
    for i in 0..3 {
        let input = write_input(&dir, &format!("in{i}.wav"), 2000, 0.8);
        let output = dir.path().join(format!("out{i}.wav"));
        let chain = ProcessingChain::new(Arc::clone(&ctx));
        chain.add_unit(Box::new(GainUnit::new(0.5)));
        let config = TaskConfig {
            block_size: 256,
            ..TaskConfig::default()
        };
        ids.push(engine.add_task(&input, &output, chain, config));
    }

    engine.start().unwrap();
    wait_terminal(&engine, &ids, Duration::from_secs(10));

    for &id in &ids {
        let info = engine.task(id).unwrap();
        assert_eq!(info.status, TaskStatus::Completed);
        assert!((info.progress - 1.0).abs() < 1e-6);
        assert!(info.error.is_none());

        let wav = read_wav_info(&info.output).unwrap();
        assert_eq!(wav.num_frames, 2000);

        let mut reader = WavBlockReader::open(&info.output).unwrap();
        let mut block = AudioBuffer::new(2, 256);
        reader.read_block(&mut block).unwrap();
        assert!((block.channel(0)[0] - 0.4).abs() < 1e-6);
    }
    assert!((engine.aggregate_progress() - 1.0).abs() < 1e-6);
    engine.stop();
}

#[test]
fn cancel_mid_processing_leaves_other_tasks_unaffected() {
    let dir = TempDir::new().unwrap();
    let ctx = context();
    let engine = OfflineEngine::with_workers(Arc::clone(&ctx), 2);

    let entered = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));

    let gated_input = write_input(&dir, "gated.wav", 4096, 0.5);
    let gated_chain = ProcessingChain::new(Arc::clone(&ctx));
    gated_chain.add_unit(Box::new(GateUnit {
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    }));
    let gated = engine.add_task(
        &gated_input,
        dir.path().join("gated_out.wav"),
        gated_chain,
        TaskConfig {
            block_size: 256,
            ..TaskConfig::default()
        },
    );

    let plain_input = write_input(&dir, "plain.wav", 2000, 0.5);
    let plain_chain = ProcessingChain::new(Arc::clone(&ctx));
    plain_chain.add_unit(Box::new(GainUnit::new(1.0)));
    let plain = engine.add_task(
        &plain_input,
        dir.path().join("plain_out.wav"),
        plain_chain,
        TaskConfig {
            block_size: 256,
            ..TaskConfig::default()
        },
    );

    engine.start().unwrap();

    // Wait until the gated task is provably mid-processing, then cancel it.
    let deadline = Instant::now() + Duration::from_secs(10);
    while !entered.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "gated task never started");
        thread::sleep(Duration::from_millis(1));
    }
    engine.cancel_task(gated).unwrap();
    release.store(true, Ordering::SeqCst);

    wait_terminal(&engine, &[gated, plain], Duration::from_secs(10));

    let gated_info = engine.task(gated).unwrap();
    assert_eq!(gated_info.status, TaskStatus::Cancelled);
    assert!(gated_info.progress < 1.0);
    // The partial output was finalized cleanly: header is readable.
    assert!(read_wav_info(&gated_info.output).is_ok());

    let plain_info = engine.task(plain).unwrap();
    assert_eq!(plain_info.status, TaskStatus::Completed);
    engine.stop();
}

#[test]
fn start_then_stop_leaves_no_task_processing() {
    let dir = TempDir::new().unwrap();
    let ctx = context();
    let engine = OfflineEngine::with_workers(Arc::clone(&ctx), 2);

    let mut ids = Vec::new();
    for i in 0..4 {
        let input = write_input(&dir, &format!("in{i}.wav"), 8192, 0.3);
        let chain = ProcessingChain::new(Arc::clone(&ctx));
        chain.add_unit(Box::new(SlowUnit));
        ids.push(engine.add_task(
            &input,
            dir.path().join(format!("out{i}.wav")),
            chain,
            TaskConfig {
                block_size: 256,
                ..TaskConfig::default()
            },
        ));
    }

    engine.start().unwrap();
    engine.stop();

    for &id in &ids {
        let info = engine.task(id).unwrap();
        assert!(
            matches!(info.status, TaskStatus::Cancelled | TaskStatus::Completed),
            "task {id} ended as {:?}",
            info.status
        );
        // Any output that was opened has a finalized, readable header.
        if info.output.exists() {
            assert!(read_wav_info(&info.output).is_ok());
        }
    }
}

#[test]
fn pause_holds_position_and_resume_finishes() {
    let dir = TempDir::new().unwrap();
    let ctx = context();
    let engine = OfflineEngine::with_workers(Arc::clone(&ctx), 1);

    let input = write_input(&dir, "in.wav", 2000, 0.5);
    let chain = ProcessingChain::new(Arc::clone(&ctx));
    chain.add_unit(Box::new(GainUnit::new(1.0)));
    let id = engine.add_task(
        &input,
        dir.path().join("out.wav"),
        chain,
        TaskConfig {
            block_size: 256,
            ..TaskConfig::default()
        },
    );

    engine.pause();
    assert!(engine.is_paused());
    engine.start().unwrap();

    thread::sleep(Duration::from_millis(150));
    let info = engine.task(id).unwrap();
    assert_ne!(info.status, TaskStatus::Completed, "task ran while paused");

    engine.resume();
    wait_terminal(&engine, &[id], Duration::from_secs(10));
    assert_eq!(engine.task(id).unwrap().status, TaskStatus::Completed);
    engine.stop();
}

#[test]
fn pending_task_cancels_immediately() {
    let dir = TempDir::new().unwrap();
    let ctx = context();
    let engine = OfflineEngine::with_workers(Arc::clone(&ctx), 1);

    let input = write_input(&dir, "in.wav", 100, 0.5);
    let chain = ProcessingChain::new(Arc::clone(&ctx));
    let id = engine.add_task(
        &input,
        dir.path().join("out.wav"),
        chain,
        TaskConfig::default(),
    );

    engine.cancel_task(id).unwrap();
    assert_eq!(engine.task(id).unwrap().status, TaskStatus::Cancelled);

    // Starting afterwards must not resurrect the task.
    engine.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.task(id).unwrap().status, TaskStatus::Cancelled);
    assert!(!engine.task(id).unwrap().output.exists());
    engine.stop();
}

#[test]
fn missing_input_fails_only_that_task() {
    let dir = TempDir::new().unwrap();
    let ctx = context();
    let engine = OfflineEngine::with_workers(Arc::clone(&ctx), 1);

    let missing = engine.add_task(
        dir.path().join("does_not_exist.wav"),
        dir.path().join("bad_out.wav"),
        ProcessingChain::new(Arc::clone(&ctx)),
        TaskConfig::default(),
    );

    let good_input = write_input(&dir, "good.wav", 500, 0.25);
    let good_chain = ProcessingChain::new(Arc::clone(&ctx));
    good_chain.add_unit(Box::new(GainUnit::new(2.0)));
    let good = engine.add_task(
        &good_input,
        dir.path().join("good_out.wav"),
        good_chain,
        TaskConfig {
            block_size: 128,
            ..TaskConfig::default()
        },
    );

    engine.start().unwrap();
    wait_terminal(&engine, &[missing, good], Duration::from_secs(10));

    let failed = engine.task(missing).unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.is_some());

    assert_eq!(engine.task(good).unwrap().status, TaskStatus::Completed);
    engine.stop();
}

#[test]
fn unknown_task_is_rejected() {
    let engine = OfflineEngine::with_workers(context(), 1);
    assert!(engine.cancel_task(42).is_err());
    assert!(engine.task(42).is_none());
}

#[test]
fn aggregate_progress_is_mean_of_tasks() {
    let dir = TempDir::new().unwrap();
    let ctx = context();
    let engine = OfflineEngine::with_workers(Arc::clone(&ctx), 1);
    assert_eq!(engine.aggregate_progress(), 0.0);

    let a_in = write_input(&dir, "a.wav", 300, 0.5);
    let b_in = write_input(&dir, "b.wav", 300, 0.5);
    let a = engine.add_task(
        &a_in,
        dir.path().join("a_out.wav"),
        ProcessingChain::new(Arc::clone(&ctx)),
        TaskConfig {
            block_size: 64,
            ..TaskConfig::default()
        },
    );
    let b = engine.add_task(
        &b_in,
        dir.path().join("b_out.wav"),
        ProcessingChain::new(Arc::clone(&ctx)),
        TaskConfig {
            block_size: 64,
            ..TaskConfig::default()
        },
    );

    engine.start().unwrap();
    wait_terminal(&engine, &[a, b], Duration::from_secs(10));
    assert!((engine.aggregate_progress() - 1.0).abs() < 1e-6);
    engine.stop();
}
