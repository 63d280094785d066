use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of generation workflow submitted to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Generate,
    Inpaint,
    Refine,
    Upscale,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &str {
        match self {
            WorkflowKind::Generate => "generate",
            WorkflowKind::Inpaint => "inpaint",
            WorkflowKind::Refine => "refine",
            WorkflowKind::Upscale => "upscale",
        }
    }
}

/// Combined binary image input plus the byte offsets that mark where each
/// sub-image starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub offsets: Vec<usize>,
}

/// Model choices attached to a workflow.
///
/// Only the fields the client has to inspect are typed; everything else
/// passes through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSelection {
    pub checkpoint: String,
    #[serde(default)]
    pub self_attention_guidance: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One unit of work to run remotely.
///
/// The parameter map is opaque to the client and serialized verbatim into
/// the submission payload. Image bytes are excluded from serialization;
/// they travel inline or out-of-band depending on size (see
/// [`transfer`](crate::transfer)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub kind: WorkflowKind,
    pub batch_count: u32,
    #[serde(skip)]
    pub image_data: Option<ImageData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<ModelSelection>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl WorkflowInput {
    /// Create a workflow of the given kind with a batch count of 1.
    pub fn new(kind: WorkflowKind) -> Self {
        Self {
            kind,
            batch_count: 1,
            image_data: None,
            models: None,
            params: Map::new(),
        }
    }

    pub fn with_batch_count(mut self, count: u32) -> Self {
        self.batch_count = count;
        self
    }

    pub fn with_image_data(mut self, bytes: Vec<u8>, offsets: Vec<usize>) -> Self {
        self.image_data = Some(ImageData { bytes, offsets });
        self
    }

    pub fn with_models(mut self, models: ModelSelection) -> Self {
        self.models = Some(models);
        self
    }

    /// Attach an arbitrary workflow parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// One submitted job, tracked from enqueue to its terminal event.
///
/// `remote_id` and `worker_id` stay `None` until the service accepts the
/// submission.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub local_id: String,
    pub work: WorkflowInput,
    pub remote_id: Option<String>,
    pub worker_id: Option<String>,
}

impl JobInfo {
    pub(crate) fn new(work: WorkflowInput) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            work,
            remote_id: None,
            worker_id: None,
        }
    }
}

impl fmt::Display for JobInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job[{}, local={}, remote={}]",
            self.work.kind.as_str(),
            self.local_id,
            self.remote_id.as_deref().unwrap_or("-")
        )
    }
}

/// Account identity and quota state for the authenticated session.
///
/// Mutated only by server responses: the initial `user` fetch and the
/// post-submission cost deduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images_generated: u64,
    #[serde(default)]
    pub credits: i64,
}

/// Static descriptor of the compute device backing the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub kind: String,
    pub name: String,
    pub vram_gb: u32,
}

impl DeviceInfo {
    /// The fixed descriptor reported for remote cloud workers.
    pub fn cloud() -> Self {
        Self {
            kind: "cloud".to_string(),
            name: "Remote GPU".to_string(),
            vram_gb: 24,
        }
    }
}

/// Job status as reported by the service.
///
/// `IN_QUEUE` and `IN_PROGRESS` keep the poll loop running; everything
/// else is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    /// A status string this client does not recognize.
    Unknown(String),
}

impl JobStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "IN_QUEUE" => JobStatus::InQueue,
            "IN_PROGRESS" => JobStatus::InProgress,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            "TIMED_OUT" => JobStatus::TimedOut,
            other => JobStatus::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::InQueue => "IN_QUEUE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::TimedOut => "TIMED_OUT",
            JobStatus::Unknown(s) => s,
        }
    }

    /// Whether the poll loop should keep waiting on this status.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::InQueue | JobStatus::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parse_known() {
        assert_eq!(JobStatus::parse("IN_QUEUE"), JobStatus::InQueue);
        assert_eq!(JobStatus::parse("IN_PROGRESS"), JobStatus::InProgress);
        assert_eq!(JobStatus::parse("COMPLETED"), JobStatus::Completed);
        assert_eq!(JobStatus::parse("FAILED"), JobStatus::Failed);
        assert_eq!(JobStatus::parse("CANCELLED"), JobStatus::Cancelled);
        assert_eq!(JobStatus::parse("TIMED_OUT"), JobStatus::TimedOut);
    }

    #[test]
    fn test_status_parse_unknown() {
        let status = JobStatus::parse("EXPLODED");
        assert_eq!(status, JobStatus::Unknown("EXPLODED".to_string()));
        assert!(!status.is_active());
        assert_eq!(status.as_str(), "EXPLODED");
    }

    #[test]
    fn test_status_active() {
        assert!(JobStatus::InQueue.is_active());
        assert!(JobStatus::InProgress.is_active());
        assert!(!JobStatus::Completed.is_active());
        assert!(!JobStatus::Cancelled.is_active());
    }

    #[test]
    fn test_workflow_serialization_skips_image_bytes() {
        let work = WorkflowInput::new(WorkflowKind::Generate)
            .with_batch_count(2)
            .with_image_data(vec![1, 2, 3], vec![0])
            .with_param("prompt", json!("a sunset"));

        let value = serde_json::to_value(&work).unwrap();
        assert_eq!(value["kind"], "generate");
        assert_eq!(value["batch_count"], 2);
        assert_eq!(value["prompt"], "a sunset");
        assert!(value.get("image_data").is_none());
    }

    #[test]
    fn test_workflow_params_flattened() {
        let work = WorkflowInput::new(WorkflowKind::Inpaint)
            .with_param("seed", json!(42))
            .with_param("steps", json!(20));

        let value = serde_json::to_value(&work).unwrap();
        assert_eq!(value["seed"], 42);
        assert_eq!(value["steps"], 20);
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_job_display() {
        let job = JobInfo::new(WorkflowInput::new(WorkflowKind::Generate));
        let s = job.to_string();
        assert!(s.starts_with("Job[generate, local="));
        assert!(s.ends_with("remote=-]"));
    }

    #[test]
    fn test_user_deserializes_with_missing_counters() {
        let user: User = serde_json::from_value(json!({"id": "u1", "name": "Ada"})).unwrap();
        assert_eq!(user.images_generated, 0);
        assert_eq!(user.credits, 0);
    }
}
