use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::transfer::ImageCollection;

/// A notification emitted by the job lifecycle engine.
///
/// Every processed job ends with exactly one terminal event: `Finished`,
/// `Error`, or `Interrupted`.
#[derive(Debug, Clone)]
pub enum Event {
    /// The listening loop is up and ready to process jobs.
    Connected,
    /// The current job is waiting in the service's queue.
    Queued { job_id: String },
    /// The current job advanced; `value` is a fraction in `0.0..=1.0`.
    Progress { job_id: String, value: f32 },
    /// The job completed; result images plus optional pose data.
    Finished {
        job_id: String,
        images: ImageCollection,
        pose: Option<Value>,
    },
    /// The job failed or could not be processed.
    Error { job_id: String, message: String },
    /// The job was cancelled on the service.
    Interrupted { job_id: String },
}

impl Event {
    /// Local id of the job this event concerns, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Event::Connected => None,
            Event::Queued { job_id }
            | Event::Progress { job_id, .. }
            | Event::Finished { job_id, .. }
            | Event::Error { job_id, .. }
            | Event::Interrupted { job_id } => Some(job_id),
        }
    }
}

/// Ordered, single-consumer stream of [`Event`]s from
/// [`CloudClient::listen`](crate::CloudClient::listen).
///
/// Dropping the stream disconnects the producer: the lifecycle loop
/// observes the closed channel at its next emission or poll sleep and
/// stops.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { rx }
    }

    /// Receive the next event. Returns `None` once the engine has stopped.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}
