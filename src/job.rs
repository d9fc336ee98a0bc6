//! Render jobs: the consumer-facing handle to an asynchronous render.
//!
//! A render runs on its own thread; the backend drives a [`RenderWorker`]
//! (progress, status, result) while the caller holds the [`RenderJob`] half
//! (wait, cancel, fetch result).

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

use parking_lot::{Condvar, Mutex};

use crate::image::ImageLayerSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled)
    }
}

type CancelHook = Box<dyn Fn(&str) + Send + Sync>;

struct StatusData {
    status: JobStatus,
    result_message: Option<String>,
}

struct JobState {
    status: Mutex<StatusData>,
    status_changed: Condvar,
    progress_bits: AtomicU32,
    cancelled: AtomicBool,
    result: Mutex<Option<ImageLayerSet>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    cancel_hook: Mutex<Option<CancelHook>>,
}

impl JobState {
    fn new() -> Arc<JobState> {
        Arc::new(JobState {
            status: Mutex::new(StatusData {
                status: JobStatus::Pending,
                result_message: None,
            }),
            status_changed: Condvar::new(),
            progress_bits: AtomicU32::new(0),
            cancelled: AtomicBool::new(false),
            result: Mutex::new(None),
            threads: Mutex::new(Vec::new()),
            cancel_hook: Mutex::new(None),
        })
    }
}

/// Producer half, owned by the rendering thread.
pub struct RenderWorker {
    state: Arc<JobState>,
}

impl std::fmt::Debug for RenderWorker {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("RenderWorker")
            .field("status", &self.status())
            .finish()
    }
}

impl RenderWorker {
    pub fn status(&self) -> JobStatus {
        self.state.status.lock().status
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    pub fn update_progress(&self, progress: f32) {
        self.state
            .progress_bits
            .store(progress.to_bits(), Ordering::Release);
    }

    pub fn set_status(&self, status: JobStatus, message: Option<String>) {
        let mut data = self.state.status.lock();
        data.status = status;
        if message.is_some() {
            data.result_message = message;
        }
        drop(data);
        self.state.status_changed.notify_all();
    }

    pub fn set_result_message(&self, message: impl Into<String>) {
        self.state.status.lock().result_message = Some(message.into());
    }

    pub fn set_result(&self, result: ImageLayerSet) {
        *self.state.result.lock() = Some(result);
    }

    /// Attaches the thread that hosts the render; joined by
    /// [`RenderJob::wait`].
    pub fn add_thread(&self, handle: JoinHandle<()>) {
        self.state.threads.lock().push(handle);
    }

    /// Installs the callback invoked when the job is cancelled (typically
    /// the backend's cancellation entry point).
    pub fn set_cancel_hook(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.state.cancel_hook.lock() = Some(Box::new(hook));
    }
}

/// Consumer half, returned by `start_render`.
pub struct RenderJob {
    state: Arc<JobState>,
}

impl std::fmt::Debug for RenderJob {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("RenderJob")
            .field("status", &self.status())
            .field("progress", &self.progress())
            .finish()
    }
}

/// Creates a connected worker/job pair.
pub fn job_pair() -> (RenderWorker, RenderJob) {
    let state = JobState::new();
    (
        RenderWorker {
            state: state.clone(),
        },
        RenderJob { state },
    )
}

impl RenderJob {
    pub fn status(&self) -> JobStatus {
        self.state.status.lock().status
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.state.progress_bits.load(Ordering::Acquire))
    }

    pub fn result_message(&self) -> Option<String> {
        self.state.status.lock().result_message.clone()
    }

    /// Blocks until the job reaches a terminal status, then joins the
    /// rendering thread(s).
    pub fn wait(&self) -> JobStatus {
        let status = {
            let mut data = self.state.status.lock();
            while !data.status.is_terminal() {
                self.state.status_changed.wait(&mut data);
            }
            data.status
        };
        let threads = std::mem::take(&mut *self.state.threads.lock());
        for handle in threads {
            let _ = handle.join();
        }
        status
    }

    /// Requests cooperative cancellation. The backend is notified through
    /// the installed cancel hook.
    pub fn cancel(&self) {
        self.cancel_with_message("Cancelled by application.");
    }

    pub fn cancel_with_message(&self, message: &str) {
        self.state.cancelled.store(true, Ordering::Release);
        {
            let mut data = self.state.status.lock();
            if !data.status.is_terminal() {
                data.status = JobStatus::Cancelled;
                data.result_message = Some(message.to_owned());
            }
        }
        self.state.status_changed.notify_all();
        let hook = self.state.cancel_hook.lock();
        if let Some(hook) = hook.as_ref() {
            hook(message);
        }
    }

    /// Takes the layered-image result once the job is complete.
    pub fn take_result(&self) -> Option<ImageLayerSet> {
        self.state.result.lock().take()
    }

    /// Attaches the thread hosting the render so `wait` can join it.
    pub fn attach_thread(&self, handle: JoinHandle<()>) {
        self.state.threads.lock().push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_and_wait() {
        let (worker, job) = job_pair();
        assert_eq!(job.status(), JobStatus::Pending);
        let thread = std::thread::spawn(move || {
            worker.update_progress(0.5);
            worker.set_result(ImageLayerSet::default());
            worker.set_status(JobStatus::Complete, None);
        });
        assert_eq!(job.wait(), JobStatus::Complete);
        thread.join().unwrap();
        assert_eq!(job.progress(), 0.5);
        assert!(job.take_result().is_some());
        assert!(job.take_result().is_none());
    }

    #[test]
    fn cancel_invokes_hook() {
        let (worker, job) = job_pair();
        let flag = Arc::new(AtomicBool::new(false));
        let hook_flag = flag.clone();
        worker.set_cancel_hook(move |_| hook_flag.store(true, Ordering::Release));
        job.cancel();
        assert!(flag.load(Ordering::Acquire));
        assert!(worker.is_cancelled());
        assert_eq!(job.status(), JobStatus::Cancelled);
    }

    #[test]
    fn failure_carries_message() {
        let (worker, job) = job_pair();
        worker.set_status(JobStatus::Failed, Some("backend exploded".into()));
        assert_eq!(job.wait(), JobStatus::Failed);
        assert_eq!(job.result_message().as_deref(), Some("backend exploded"));
    }
}
