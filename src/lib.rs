//! # diffusion-cloud
//!
//! Async Rust client for a cloud image-generation service: submit
//! long-running jobs, track them through their remote lifecycle, and
//! stream progress and results back to the caller.
//!
//! - FIFO job queue with non-blocking enqueue, drained by a single
//!   lifecycle loop
//! - Submit/poll/resolve protocol with typed [`Event`]s for queue
//!   position, progress, results, and failures
//! - Inline base64 or pre-signed object-store transfer for image
//!   payloads, chosen by size
//! - Token authentication plus interactive device-linked sign-in
//! - Per-job error isolation: one failing job never stops the loop
//!
//! ## Quick Start
//!
//! ```no_run
//! use diffusion_cloud::{ClientConfig, CloudClient, Event, WorkflowInput, WorkflowKind};
//! use serde_json::json;
//!
//! # async fn example() -> diffusion_cloud::Result<()> {
//! let client = CloudClient::connect(ClientConfig::default(), "my-token").await?;
//! let mut events = client.listen();
//!
//! let work = WorkflowInput::new(WorkflowKind::Generate)
//!     .with_batch_count(2)
//!     .with_param("prompt", json!("a sunset over mountains"));
//! let job_id = client.enqueue(work, false).await;
//! println!("submitted {job_id}");
//!
//! while let Some(event) = events.next_event().await {
//!     match event {
//!         Event::Progress { value, .. } => println!("{:.0}%", value * 100.0),
//!         Event::Finished { images, .. } => {
//!             println!("done, {} images", images.len());
//!             break;
//!         }
//!         Event::Error { message, .. } => {
//!             eprintln!("failed: {message}");
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
mod queue;
pub mod transfer;
pub mod transport;
pub mod types;

pub use catalog::{
    cloud_models, CheckpointInfo, ClientModels, ControlMode, ResourceId, ResourceKind, SdVersion,
};
pub use client::{CloudClient, SignInPending};
pub use config::{ClientConfig, ClientConfigBuilder, PerformanceSettings};
pub use error::{CloudError, Result};
pub use events::{Event, EventStream};
pub use queue::MAX_BATCH_COUNT;
pub use transfer::{ImageCollection, INLINE_IMAGE_LIMIT};
pub use transport::{HttpTransport, Transport};
pub use types::{
    DeviceInfo, ImageData, JobInfo, JobStatus, ModelSelection, User, WorkflowInput, WorkflowKind,
};
