use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::types::{JobInfo, WorkflowInput};

/// Hard ceiling on per-job batch count accepted by the service.
pub const MAX_BATCH_COUNT: u32 = 8;

/// FIFO queue of submitted jobs: any number of producers, one consumer
/// (the lifecycle loop).
pub(crate) struct JobQueue {
    jobs: Mutex<VecDeque<JobInfo>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Sanitize `work`, assign a local id, and append. Returns the local id
    /// without waiting on submission or completion.
    ///
    /// `batch_count` is clamped to [`MAX_BATCH_COUNT`] and self-attention
    /// guidance is disabled (unsupported on remote workers). The `front`
    /// hint is accepted but ignored: ordering is strictly FIFO.
    pub async fn enqueue(&self, mut work: WorkflowInput, front: bool) -> String {
        work.batch_count = work.batch_count.min(MAX_BATCH_COUNT);
        if let Some(models) = work.models.as_mut() {
            models.self_attention_guidance = false;
        }
        if front {
            debug!("front hint ignored, queue is FIFO");
        }

        let job = JobInfo::new(work);
        let local_id = job.local_id.clone();
        self.jobs.lock().await.push_back(job);
        self.notify.notify_one();
        local_id
    }

    /// Remove and return the oldest job, waiting if the queue is empty.
    pub async fn dequeue(&self) -> JobInfo {
        loop {
            let notified = self.notify.notified();
            if let Some(job) = self.jobs.lock().await.pop_front() {
                return job;
            }
            notified.await;
        }
    }

    /// Discard every job that has not been dequeued yet.
    pub async fn clear(&self) {
        self.jobs.lock().await.clear();
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }
}
