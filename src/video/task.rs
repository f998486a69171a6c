// =============================================================================
// BACKGROUND JOBS - CANCELLABLE WORKER THREADS WITH TOKEN-CHECKED RESULTS
// =============================================================================
//
// A `GenerationSlot` owns at most one live job of a given kind. Starting a new
// job cancels the old one, waits briefly for it to wind down, bumps the token
// and spawns. Results travel back over an unbounded channel tagged with the
// token they were produced for; `poll` applies only the current token.
//
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::video::error::GenerationFailure;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Marks the task finished even if the job panics.
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A named worker thread with a cooperative cancel flag. Dropping the handle
/// cancels the job and detaches the thread.
pub struct TaskHandle {
    name: String,
    cancel: CancelToken,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn spawn<F>(name: impl Into<String>, job: F) -> std::io::Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let name = name.into();
        let cancel = CancelToken::new();
        let finished = Arc::new(AtomicBool::new(false));

        let thread = {
            let cancel = cancel.clone();
            let finished = finished.clone();
            thread::Builder::new().name(name.clone()).spawn(move || {
                let _guard = FinishGuard(finished);
                job(cancel);
            })?
        };

        Ok(Self {
            name,
            cancel,
            finished,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Waits up to `timeout` for the job to return. Returns whether it did.
    pub fn wait_for(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Background task '{}' panicked", self.name);
            }
        }
        true
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A job's outcome, tagged with the token it was started under.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent<T> {
    Finished { token: u64, value: T },
    Failed { token: u64, reason: GenerationFailure },
}

impl<T> GenerationEvent<T> {
    pub fn token(&self) -> u64 {
        match self {
            GenerationEvent::Finished { token, .. } | GenerationEvent::Failed { token, .. } => *token,
        }
    }
}

pub struct GenerationSlot<T> {
    kind: &'static str,
    token: u64,
    task: Option<TaskHandle>,
    pending: bool,
    sender: mpsc::UnboundedSender<GenerationEvent<T>>,
    receiver: mpsc::UnboundedReceiver<GenerationEvent<T>>,
}

impl<T: Send + 'static> GenerationSlot<T> {
    pub fn new(kind: &'static str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            kind,
            token: 0,
            task: None,
            pending: false,
            sender,
            receiver,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// A job for the current token has started and not reported yet.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Cancels whatever is running and invalidates its token.
    pub fn cancel(&mut self, wind_down: Duration) {
        if let Some(mut task) = self.task.take() {
            task.cancel();
            if !task.is_finished() && !task.wait_for(wind_down) {
                log::debug!("{} job {} still winding down, letting it finish detached", self.kind, self.token);
            }
        }
        self.token += 1;
        self.pending = false;
    }

    /// Cancels the previous job and starts `job` under a fresh token. The job
    /// returns `None` when it noticed cancellation.
    pub fn start<F>(&mut self, wind_down: Duration, job: F) -> u64
    where
        F: FnOnce(&CancelToken) -> Option<Result<T, GenerationFailure>> + Send + 'static,
    {
        self.cancel(wind_down);
        let token = self.token;
        let sender = self.sender.clone();
        let kind = self.kind;

        let spawned = TaskHandle::spawn(format!("{}-{}", kind, token), move |cancel| {
            log::debug!("{} job {} started", kind, token);
            let event = match job(&cancel) {
                None => {
                    log::debug!("{} job {} cancelled", kind, token);
                    return;
                }
                Some(Ok(value)) => GenerationEvent::Finished { token, value },
                Some(Err(reason)) => {
                    log::debug!("{} job {} failed: {}", kind, token, reason);
                    GenerationEvent::Failed { token, reason }
                }
            };
            if sender.send(event).is_err() {
                log::debug!("{} job {} finished after its owner went away", kind, token);
            }
        });

        match spawned {
            Ok(task) => {
                self.task = Some(task);
                self.pending = true;
            }
            Err(e) => {
                log::error!("Failed to spawn {} job: {}", kind, e);
                let _ = self.sender.send(GenerationEvent::Failed {
                    token,
                    reason: GenerationFailure::Decode(format!("failed to spawn worker: {}", e)),
                });
                self.pending = true;
            }
        }
        token
    }

    /// Drains finished jobs and returns the latest outcome for the current
    /// token, dropping anything produced for an older one.
    pub fn poll(&mut self) -> Option<GenerationEvent<T>> {
        let mut latest = None;
        while let Ok(event) = self.receiver.try_recv() {
            if event.token() == self.token {
                latest = Some(event);
            } else {
                log::debug!("Discarding stale {} result (token {}, current {})", self.kind, event.token(), self.token);
            }
        }
        if latest.is_some() {
            self.pending = false;
            self.task = None;
        }
        latest
    }
}
