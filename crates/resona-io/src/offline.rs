//! Offline batch engine.
//!
//! [`OfflineEngine`] runs decode → process → encode jobs across a bounded
//! worker pool. Each task streams its input file block-by-block through its
//! own [`ProcessingChain`] instance (tasks never share a chain), applies a
//! static output gain, and writes the result, reporting progress as the
//! fraction of frames processed.
//!
//! Cancellation is cooperative: it is checked at every block boundary
//! during processing and applied immediately to tasks still pending. Pause
//! is a polled flag workers sleep against without losing stream position.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, unbounded};
use resona_core::{AudioBuffer, EngineContext, EventQueue, Notification, Origin, ProcessingChain};

use crate::wav::{WavBlockReader, WavBlockWriter};
use crate::{Error, Result};

/// Identifier of one batch job.
pub type TaskId = u64;

/// Interval at which paused workers re-check the pause flag.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// Lifecycle state of a task.
///
/// Transitions are monotonic — `Pending → Processing → {Completed, Failed}`
/// — except for cancellation, which may occur from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Queued, not yet claimed by a worker.
    Pending,
    /// Claimed by a worker and streaming.
    Processing,
    /// Finished successfully; the output file is finalized.
    Completed,
    /// Aborted by an error; see [`TaskInfo::error`].
    Failed,
    /// Cancelled cooperatively; any partial output file is finalized.
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Per-task processing parameters.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Frames per processing block.
    pub block_size: usize,
    /// Sample rate to prepare the task's chain at; `None` uses the input
    /// file's rate.
    pub sample_rate: Option<f32>,
    /// Static linear gain applied after the chain, before writing.
    pub output_gain: f32,
    /// Output bit depth (32 writes float).
    pub bits_per_sample: u16,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            block_size: 4096,
            sample_rate: None,
            output_gain: 1.0,
            bits_per_sample: 32,
        }
    }
}

/// Caller-facing snapshot of one task.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// Task identifier.
    pub id: TaskId,
    /// Input file path.
    pub input: PathBuf,
    /// Output file path.
    pub output: PathBuf,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Completed fraction in `0.0..=1.0`.
    pub progress: f32,
    /// Failure message, set when `status` is [`TaskStatus::Failed`].
    pub error: Option<String>,
}

struct TaskState {
    status: TaskStatus,
    error: Option<String>,
}

struct TaskRecord {
    id: TaskId,
    input: PathBuf,
    output: PathBuf,
    config: TaskConfig,
    chain: ProcessingChain,
    state: Mutex<TaskState>,
    /// Completed fraction as f32 bits, lock-free for progress polling.
    progress: AtomicU32,
    cancelled: AtomicBool,
    queued: AtomicBool,
}

impl TaskRecord {
    fn status(&self) -> TaskStatus {
        self.state.lock().expect("task state poisoned").status
    }

    fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Relaxed))
    }

    fn set_progress(&self, fraction: f32) {
        self.progress.store(fraction.to_bits(), Ordering::Relaxed);
    }
}

struct Shared {
    context: Arc<EngineContext>,
    tasks: Mutex<Vec<Arc<TaskRecord>>>,
    paused: AtomicBool,
}

/// File-to-file batch engine over a bounded worker pool.
pub struct OfflineEngine {
    shared: Arc<Shared>,
    worker_count: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    sender: Mutex<Option<Sender<Arc<TaskRecord>>>>,
    next_id: AtomicU64,
}

impl OfflineEngine {
    /// Creates an engine with one worker per available CPU.
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self::with_workers(context, num_cpus::get().max(1))
    }

    /// Creates an engine with an explicit worker count.
    pub fn with_workers(context: Arc<EngineContext>, worker_count: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                context,
                tasks: Mutex::new(Vec::new()),
                paused: AtomicBool::new(false),
            }),
            worker_count: worker_count.max(1),
            workers: Mutex::new(Vec::new()),
            sender: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// The configured worker pool size.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Registers a batch job. The task owns its chain instance; tasks never
    /// share one. Pending tasks are enqueued by [`start`](Self::start).
    pub fn add_task<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        chain: ProcessingChain,
        config: TaskConfig,
    ) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(TaskRecord {
            id,
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            config,
            chain,
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                error: None,
            }),
            progress: AtomicU32::new(0.0f32.to_bits()),
            cancelled: AtomicBool::new(false),
            queued: AtomicBool::new(false),
        });
        tracing::debug!(task = id, input = %record.input.display(), "task_added");
        self.shared
            .tasks
            .lock()
            .expect("task list poisoned")
            .push(record);
        id
    }

    /// Spawns the worker pool (if not yet running) and enqueues every
    /// Pending task. Calling `start` again enqueues tasks added since the
    /// previous call.
    pub fn start(&self) -> Result<()> {
        let sender = {
            let mut sender_guard = self.sender.lock().expect("sender poisoned");
            if sender_guard.is_none() {
                let (tx, rx) = unbounded::<Arc<TaskRecord>>();
                let mut workers = self.workers.lock().expect("worker handles poisoned");
                for i in 0..self.worker_count {
                    let shared = Arc::clone(&self.shared);
                    let rx: Receiver<Arc<TaskRecord>> = rx.clone();
                    let handle = thread::Builder::new()
                        .name(format!("resona-worker-{i}"))
                        .spawn(move || worker_loop(&shared, &rx))?;
                    workers.push(handle);
                }
                *sender_guard = Some(tx);
                tracing::info!(workers = self.worker_count, "offline engine started");
                self.shared.context.hub().notify(&Notification::StateChanged {
                    origin: Origin::Offline,
                    state: "started".to_string(),
                });
            }
            sender_guard.clone().expect("sender set above")
        };

        for task in self.shared.tasks.lock().expect("task list poisoned").iter() {
            if task.status() == TaskStatus::Pending && !task.queued.swap(true, Ordering::SeqCst) {
                let _ = sender.send(Arc::clone(task));
            }
        }
        Ok(())
    }

    /// Cancels all non-terminal tasks and waits for in-flight work to reach
    /// a terminal state. Pending tasks cancel immediately; processing tasks
    /// cancel at their next block boundary. Idempotent.
    pub fn stop(&self) {
        for task in self.shared.tasks.lock().expect("task list poisoned").iter() {
            task.cancelled.store(true, Ordering::SeqCst);
            if task.status() == TaskStatus::Pending {
                transition(&self.shared, task, TaskStatus::Cancelled, None);
            }
        }

        let had_workers = {
            self.sender.lock().expect("sender poisoned").take();
            let mut workers = self.workers.lock().expect("worker handles poisoned");
            let handles: Vec<_> = workers.drain(..).collect();
            let had = !handles.is_empty();
            drop(workers);
            for handle in handles {
                let _ = handle.join();
            }
            had
        };

        if had_workers {
            tracing::info!("offline engine stopped");
            self.shared.context.hub().notify(&Notification::StateChanged {
                origin: Origin::Offline,
                state: "stopped".to_string(),
            });
        }
    }

    /// Whether the worker pool is up.
    pub fn is_running(&self) -> bool {
        self.sender.lock().expect("sender poisoned").is_some()
    }

    /// Sets the cooperative pause flag. Workers hold position and sleep
    /// against it at block boundaries; granularity is the polling interval.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        tracing::debug!("offline engine paused");
    }

    /// Clears the pause flag.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        tracing::debug!("offline engine resumed");
    }

    /// Whether the pause flag is set.
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Requests cancellation of one task. Pending tasks are cancelled
    /// immediately; a processing task honors the request at its next block
    /// boundary.
    pub fn cancel_task(&self, id: TaskId) -> Result<()> {
        let tasks = self.shared.tasks.lock().expect("task list poisoned");
        let task = tasks
            .iter()
            .find(|t| t.id == id)
            .ok_or(Error::UnknownTask(id))?;
        task.cancelled.store(true, Ordering::SeqCst);
        if task.status() == TaskStatus::Pending {
            transition(&self.shared, task, TaskStatus::Cancelled, None);
        }
        Ok(())
    }

    /// Snapshot of one task.
    pub fn task(&self, id: TaskId) -> Option<TaskInfo> {
        self.shared
            .tasks
            .lock()
            .expect("task list poisoned")
            .iter()
            .find(|t| t.id == id)
            .map(|t| task_info(t))
    }

    /// Snapshots of all tasks, in submission order.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.shared
            .tasks
            .lock()
            .expect("task list poisoned")
            .iter()
            .map(|t| task_info(t))
            .collect()
    }

    /// Arithmetic mean of per-task progress fractions.
    ///
    /// Deliberately unweighted by sample count — a known approximation for
    /// batches of uneven length.
    pub fn aggregate_progress(&self) -> f32 {
        let tasks = self.shared.tasks.lock().expect("task list poisoned");
        if tasks.is_empty() {
            return 0.0;
        }
        tasks.iter().map(|t| t.progress()).sum::<f32>() / tasks.len() as f32
    }
}

impl Drop for OfflineEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn task_info(record: &TaskRecord) -> TaskInfo {
    let state = record.state.lock().expect("task state poisoned");
    TaskInfo {
        id: record.id,
        input: record.input.clone(),
        output: record.output.clone(),
        status: state.status,
        progress: record.progress(),
        error: state.error.clone(),
    }
}

/// Applies a status transition if it is legal, notifying on success.
fn transition(
    shared: &Shared,
    record: &TaskRecord,
    next: TaskStatus,
    error: Option<String>,
) -> bool {
    {
        let mut state = record.state.lock().expect("task state poisoned");
        let allowed = matches!(
            (state.status, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (
                    TaskStatus::Processing,
                    TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
                )
        );
        if !allowed {
            return false;
        }
        state.status = next;
        state.error = error;
    }
    tracing::debug!(task = record.id, status = ?next, "task_status");
    shared.context.hub().notify(&Notification::StateChanged {
        origin: Origin::Offline,
        state: format!("task {} {next:?}", record.id),
    });
    true
}

fn worker_loop(shared: &Arc<Shared>, receiver: &Receiver<Arc<TaskRecord>>) {
    while let Ok(record) = receiver.recv() {
        run_task(shared, &record);
    }
}

fn run_task(shared: &Shared, record: &TaskRecord) {
    if record.cancelled.load(Ordering::SeqCst) {
        transition(shared, record, TaskStatus::Cancelled, None);
        return;
    }
    if !transition(shared, record, TaskStatus::Processing, None) {
        return;
    }

    let result = process_task(shared, record);
    // The chain's resources go regardless of how the task ended.
    record.chain.release();

    match result {
        Ok(true) => {
            record.set_progress(1.0);
            transition(shared, record, TaskStatus::Completed, None);
        }
        Ok(false) => {
            transition(shared, record, TaskStatus::Cancelled, None);
        }
        Err(err) => {
            tracing::warn!(task = record.id, %err, "task failed");
            let message = err.to_string();
            shared.context.hub().notify(&Notification::Error {
                origin: Origin::Offline,
                message: format!("task {} failed: {message}", record.id),
            });
            transition(shared, record, TaskStatus::Failed, Some(message));
        }
    }
}

/// Streams one task's input through its chain to its output.
///
/// Returns `Ok(true)` on completion, `Ok(false)` on cooperative
/// cancellation (with the output writer finalized cleanly either way).
fn process_task(shared: &Shared, record: &TaskRecord) -> Result<bool> {
    let mut reader = WavBlockReader::open(&record.input)?;
    let spec = reader.spec();
    let sample_rate = record
        .config
        .sample_rate
        .unwrap_or(spec.sample_rate as f32);
    let channels = usize::from(spec.channels.max(1));

    let mut writer = WavBlockWriter::create_for_path(
        &record.output,
        sample_rate as u32,
        spec.channels.max(1),
        record.config.bits_per_sample,
    )?;

    record.chain.prepare(sample_rate, record.config.block_size);

    let mut buffer = AudioBuffer::new(channels, record.config.block_size);
    let mut events = EventQueue::default();
    let total = reader.total_frames().max(1);

    loop {
        if record.cancelled.load(Ordering::SeqCst) {
            writer.finalize()?;
            return Ok(false);
        }
        while shared.paused.load(Ordering::SeqCst) && !record.cancelled.load(Ordering::SeqCst) {
            thread::sleep(PAUSE_POLL);
        }

        let frames = reader.read_block(&mut buffer)?;
        if frames == 0 {
            break;
        }

        events.clear();
        record.chain.process_block(&mut buffer, &mut events);

        if (record.config.output_gain - 1.0).abs() > f32::EPSILON {
            for c in 0..buffer.channel_count() {
                for s in &mut buffer.channel_mut(c)[..frames] {
                    *s *= record.config.output_gain;
                }
            }
        }

        writer.write_block(&buffer, frames)?;

        let fraction = reader.frames_read() as f32 / total as f32;
        record.set_progress(fraction);
        shared.context.hub().notify(&Notification::Progress {
            task: record.id,
            fraction,
        });
    }

    writer.finalize()?;
    Ok(true)
}
