//! The single serial context completions are delivered on.
//!
//! # Design
//! `CompletionQueue` is the cheap, cloneable sending side; `CompletionLoop`
//! owns the receiving side and runs jobs one at a time in posting order. The
//! loop either gets its own thread (`CompletionQueue::spawn_thread`) or is
//! driven by the caller, e.g. from a UI event loop via `run_pending`.
//! A panicking callback is logged and does not take the context down.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

/// Sending side of the completion context.
#[derive(Clone)]
pub struct CompletionQueue {
    tx: mpsc::UnboundedSender<Job>,
}

/// Receiving side of the completion context.
pub struct CompletionLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl CompletionQueue {
    pub fn channel() -> (CompletionQueue, CompletionLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (CompletionQueue { tx }, CompletionLoop { rx })
    }

    /// Start a dedicated thread running the loop. The thread exits once every
    /// `CompletionQueue` clone is dropped and the backlog is drained.
    pub fn spawn_thread(name: &str) -> io::Result<(CompletionQueue, JoinHandle<()>)> {
        let (queue, completion_loop) = Self::channel();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || completion_loop.run())?;
        Ok((queue, join))
    }

    /// Queue `job` behind everything already posted. Returns `false` if the
    /// loop is gone, in which case the job is dropped without running.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}

impl CompletionLoop {
    /// Run jobs until every sender is dropped. Blocks the calling thread, so
    /// it must not be called from inside an async task.
    pub fn run(mut self) {
        while let Some(job) = self.rx.blocking_recv() {
            run_job(job);
        }
    }

    /// Async flavour of `run` for callers whose serial context is a task.
    pub async fn run_async(mut self) {
        while let Some(job) = self.rx.recv().await {
            run_job(job);
        }
    }

    /// Run whatever is queued right now without waiting; returns how many
    /// jobs ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            run_job(job);
            ran += 1;
        }
        ran
    }
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        tracing::error!(target: "courier", "completion callback panicked");
    }
}
