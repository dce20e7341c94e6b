//! Fixed-size pool of fragment worker threads.
//!
//! Backpressure is the pool's only queueing mechanism: the producer must
//! acquire a permit before dispatching, so at most `size` fragments are in
//! flight and the byte stream stalls once every worker is busy.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error};

use super::worker::{crash_result, scan_fragment};
use super::{Fragment, FragmentResult};
use crate::validate::LineChecker;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

struct WorkItem {
    fragment: Fragment,
    permit: OwnedSemaphorePermit,
}

pub struct WorkerPool {
    sender: Option<crossbeam_channel::Sender<WorkItem>>,
    permits: Arc<Semaphore>,
    size: usize,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` worker threads sharing one read-only checker.
    /// Results arrive on the returned channel in completion order.
    pub fn new(
        size: usize,
        checker: Arc<dyn LineChecker>,
    ) -> (Self, UnboundedReceiver<FragmentResult>) {
        let (work_tx, work_rx) = crossbeam_channel::bounded::<WorkItem>(size);
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(size);
        for worker_id in 0..size {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let checker = Arc::clone(&checker);
            handles.push(std::thread::spawn(move || {
                run_worker(worker_id, work_rx, result_tx, checker);
            }));
        }

        let pool = Self {
            sender: Some(work_tx),
            permits: Arc::new(Semaphore::new(size)),
            size,
            handles,
        };
        (pool, result_rx)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Waits until a worker is idle. The permit must accompany the next
    /// `dispatch` and is released when that fragment's result is posted.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .expect("pool semaphore closed")
    }

    /// Hands a fragment (and its permit) to an idle worker. Ownership of
    /// the byte slab moves with it.
    pub fn dispatch(
        &self,
        permit: OwnedSemaphorePermit,
        fragment: Fragment,
    ) -> Result<(), PoolError> {
        let sender = self.sender.as_ref().ok_or(PoolError::ChannelClosed)?;
        sender
            .send(WorkItem { fragment, permit })
            .map_err(|_| PoolError::ChannelClosed)
    }

    /// Blocks until every dispatched fragment has been scanned and its
    /// result posted.
    pub async fn await_all_idle(&self) {
        let all = Arc::clone(&self.permits)
            .acquire_many_owned(self.size as u32)
            .await
            .expect("pool semaphore closed");
        drop(all);
    }

    /// Stops the workers and joins their threads. Idempotent.
    pub fn terminate(&mut self) {
        if let Some(sender) = self.sender.take() {
            drop(sender);
        }
        for (worker_id, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                error!(worker_id, "Worker thread panicked outside scan");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run_worker(
    worker_id: usize,
    work_rx: crossbeam_channel::Receiver<WorkItem>,
    result_tx: UnboundedSender<FragmentResult>,
    checker: Arc<dyn LineChecker>,
) {
    debug!(worker_id, "Fragment worker started");

    while let Ok(item) = work_rx.recv() {
        let scan = catch_unwind(AssertUnwindSafe(|| {
            scan_fragment(&item.fragment, worker_id, checker.as_ref())
        }));
        let result = match scan {
            Ok(result) => result,
            Err(payload) => {
                let detail = panic_message(&payload);
                error!(worker_id, sequence = item.fragment.sequence, %detail, "Fragment scan panicked");
                crash_result(&item.fragment, worker_id, &detail)
            }
        };

        if result_tx.send(result).is_err() {
            debug!(worker_id, "Result channel closed, worker exiting");
            break;
        }
        // Release only after the result is queued so the all-idle barrier
        // implies every result is visible to the aggregator.
        drop(item.permit);
    }

    debug!(worker_id, "Fragment worker stopped");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
