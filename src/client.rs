use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{cloud_models, ClientModels, SdVersion};
use crate::config::{ClientConfig, PerformanceSettings};
use crate::error::{CloudError, Result};
use crate::events::{Event, EventStream};
use crate::queue::JobQueue;
use crate::transfer;
use crate::transport::{HttpTransport, Transport};
use crate::types::{DeviceInfo, JobInfo, JobStatus, User, WorkflowInput, WorkflowKind};

/// Interval between status polls for the current job.
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Interval between sign-in confirmation polls.
const AUTH_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Give up waiting for interactive sign-in after this long.
const AUTH_TIMEOUT: Duration = Duration::from_secs(300);
/// Progress fraction reported while the server signals activity without a
/// number of its own.
const DEFAULT_PROGRESS: f32 = 0.09;

/// Async client for the cloud generation service.
///
/// One client holds one authenticated session: the bearer token, the shared
/// [`User`] quota state, and a FIFO queue of submitted jobs drained by a
/// single lifecycle loop (see [`listen`](Self::listen)).
///
/// Cloning is cheap; clones share the same session and queue.
///
/// # Example
/// ```no_run
/// use diffusion_cloud::{ClientConfig, CloudClient};
///
/// # async fn example() -> diffusion_cloud::Result<()> {
/// let client = CloudClient::connect(ClientConfig::default(), "my-token").await?;
/// println!("credits: {}", client.user().map(|u| u.credits).unwrap_or(0));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CloudClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient").finish_non_exhaustive()
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    models: ClientModels,
    device_info: DeviceInfo,
    token: RwLock<String>,
    user: RwLock<Option<User>>,
    queue: JobQueue,
    // Single-writer: only the lifecycle loop stores and clears entries;
    // interrupt() just reads the remote id.
    current_job: Mutex<Option<CurrentJob>>,
}

#[derive(Debug, Clone)]
struct CurrentJob {
    remote_id: Option<String>,
}

impl CloudClient {
    /// Connect and authenticate in one step.
    pub async fn connect(config: ClientConfig, access_token: &str) -> Result<Self> {
        if access_token.is_empty() {
            return Err(CloudError::Unauthorized(
                "Authorization missing for cloud endpoint".to_string(),
            ));
        }
        let client = Self::new(config);
        client.authenticate(access_token).await?;
        Ok(client)
    }

    /// Create an unauthenticated client; follow up with
    /// [`authenticate`](Self::authenticate) or [`sign_in`](Self::sign_in).
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Use a custom [`Transport`] implementation.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                config,
                models: cloud_models(),
                device_info: DeviceInfo::cloud(),
                token: RwLock::new(String::new()),
                user: RwLock::new(None),
                queue: JobQueue::new(),
                current_job: Mutex::new(None),
            }),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Base API URL this client talks to.
    pub fn api_url(&self) -> &str {
        &self.inner.config.api_url
    }

    /// Snapshot of the authenticated user, if any.
    pub fn user(&self) -> Option<User> {
        self.inner.user.read().ok().and_then(|u| u.clone())
    }

    /// Static model inventory of the service.
    pub fn models(&self) -> &ClientModels {
        &self.inner.models
    }

    /// Descriptor of the remote compute device.
    pub fn device_info(&self) -> &DeviceInfo {
        &self.inner.device_info
    }

    /// Host performance settings with the remote-execution caps applied.
    pub fn performance_settings(&self) -> PerformanceSettings {
        self.inner.config.performance.clamped_for_cloud()
    }

    fn token(&self) -> String {
        self.inner
            .token
            .read()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    fn set_token(&self, token: &str) {
        if let Ok(mut guard) = self.inner.token.write() {
            *guard = token.to_string();
        }
    }

    async fn get_op(&self, op: &str) -> Result<Value> {
        let url = format!("{}/{}", self.inner.config.api_url, op);
        self.inner.transport.get(&url, Some(&self.token())).await
    }

    async fn post_op(&self, op: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.inner.config.api_url, op);
        self.inner
            .transport
            .post(&url, body, Some(&self.token()))
            .await
    }

    // ── Authentication ──────────────────────────────────────────────

    /// Store `token` and exchange it for the user's identity and quota
    /// state.
    ///
    /// A rejected token (HTTP 401) clears the stored credential and fails
    /// with [`CloudError::Unauthorized`].
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        if token.is_empty() {
            return Err(CloudError::Unauthorized(
                "Authorization missing for cloud endpoint".to_string(),
            ));
        }
        self.set_token(token);

        let user_data = match self.get_op("user").await {
            Ok(data) => data,
            Err(e) => {
                error!("could not authenticate user account: {e}");
                self.set_token("");
                return Err(match e {
                    CloudError::Http { status: 401, .. } => CloudError::Unauthorized(
                        "The login data is incorrect, please sign in again.".to_string(),
                    ),
                    other => other,
                });
            }
        };

        let user: User = serde_json::from_value(user_data)?;
        info!(url = %self.inner.config.api_url, user = %user.id, "connected");
        if let Ok(mut guard) = self.inner.user.write() {
            *guard = Some(user.clone());
        }
        Ok(user)
    }

    /// Begin device-linked interactive sign-in.
    ///
    /// Returns a pending handle whose `auth_url` must be opened by the
    /// user; await [`SignInPending::wait_confirmation`] for the resulting
    /// bearer token.
    pub async fn sign_in(&self) -> Result<SignInPending> {
        let client_id = Uuid::new_v4().to_string();
        let device = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        let client_info = format!("Image generation client [Device: {device}]");
        info!(url = %self.inner.config.api_url, "sending authorization request for {client_info}");

        let init = self
            .post_op(
                "auth/initiate",
                json!({"client_id": client_id, "client_info": client_info}),
            )
            .await?;
        let path = init.get("url").and_then(|v| v.as_str()).ok_or_else(|| {
            CloudError::MalformedPayload("auth/initiate response missing url".to_string())
        })?;

        let auth_url = format!("{}{}", self.inner.config.web_url, path);
        info!(%auth_url, "waiting for completion of the authorization request");
        Ok(SignInPending {
            client: self.clone(),
            client_id,
            auth_url,
        })
    }

    // ── Queue ───────────────────────────────────────────────────────

    /// Submit work for processing; returns the job's local id immediately,
    /// before any network traffic happens.
    ///
    /// `batch_count` is clamped to the service ceiling of 8 and
    /// self-attention guidance is disabled (unsupported on remote
    /// workers). The `front` hint is accepted but ignored: the queue is
    /// strictly FIFO.
    pub async fn enqueue(&self, work: WorkflowInput, front: bool) -> String {
        self.inner.queue.enqueue(work, front).await
    }

    /// Discard all jobs that have not started processing.
    ///
    /// The job currently being processed, if any, is unaffected; use
    /// [`interrupt`](Self::interrupt) to stop it.
    pub async fn clear_queue(&self) {
        self.inner.queue.clear().await;
    }

    /// Request cancellation of the job currently being processed.
    ///
    /// Best-effort: the poll loop observes the resulting `CANCELLED`
    /// status on a later iteration. Queued jobs are unaffected.
    pub async fn interrupt(&self) -> Result<()> {
        let remote_id = self
            .inner
            .current_job
            .lock()
            .ok()
            .and_then(|current| current.as_ref().and_then(|j| j.remote_id.clone()));
        if let Some(remote_id) = remote_id {
            self.post_op(&format!("cancel/{remote_id}"), json!({}))
                .await?;
        }
        Ok(())
    }

    // ── Listening ───────────────────────────────────────────────────

    /// Start the lifecycle loop and return its event stream.
    ///
    /// Exactly one job is processed at a time. A failure while processing
    /// a job becomes an [`Event::Error`] scoped to that job's local id and
    /// the loop moves on to the next one. Dropping the stream stops the
    /// loop at its next suspension point.
    pub fn listen(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();
        tokio::spawn(async move { client.run(tx).await });
        EventStream::new(rx)
    }

    async fn run(self, tx: mpsc::UnboundedSender<Event>) {
        if tx.send(Event::Connected).is_err() {
            return;
        }
        loop {
            let mut job = tokio::select! {
                job = self.inner.queue.dequeue() => job,
                _ = tx.closed() => break,
            };
            self.set_current(CurrentJob { remote_id: None });

            if let Err(e) = self.process_job(&mut job, &tx).await {
                let message = self.classify_job_error(e);
                error!(job = %job, "processing failed: {message}");
                let _ = tx.send(Event::Error {
                    job_id: job.local_id.clone(),
                    message,
                });
            }

            self.clear_current();
            if tx.is_closed() {
                break;
            }
        }
        debug!("listening loop stopped");
    }

    /// Run one job through submit, poll, and resolution. Progress is
    /// emitted on `tx`; a closed channel ends processing early without an
    /// error.
    async fn process_job(
        &self,
        job: &mut JobInfo,
        tx: &mpsc::UnboundedSender<Event>,
    ) -> Result<()> {
        // Submit
        let mut payload = serde_json::to_value(&job.work)?;
        if let Some(image_data) = &job.work.image_data {
            transfer::send_image_data(
                self.inner.transport.as_ref(),
                &self.inner.config.api_url,
                &self.token(),
                image_data,
                &mut payload,
            )
            .await?;
        }
        let mut response = self
            .post_op("generate", json!({"input": {"workflow": payload}}))
            .await?;

        job.remote_id = response
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        job.worker_id = response
            .get("worker_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let (remote_id, worker_id) = match (&job.remote_id, &job.worker_id) {
            (Some(r), Some(w)) => (r.clone(), w.clone()),
            _ => {
                return Err(CloudError::MalformedPayload(
                    "generate response missing job identifiers".to_string(),
                ))
            }
        };
        self.set_current(CurrentJob {
            remote_id: Some(remote_id.clone()),
        });

        let cost = self.apply_user_update(response.get("user"));
        let credits = self.user().map(|u| u.credits).unwrap_or_default();
        info!(job = %job, cost, credits, "job started");
        if tx
            .send(Event::Progress {
                job_id: job.local_id.clone(),
                value: 0.0,
            })
            .is_err()
        {
            return Ok(());
        }

        // Poll until the status goes terminal
        let mut status = JobStatus::parse(
            response
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or(""),
        );
        while status.is_active() {
            response = self
                .post_op(&format!("status/{worker_id}/{remote_id}"), json!({}))
                .await?;
            status = JobStatus::parse(
                response
                    .get("status")
                    .and_then(|v| v.as_str())
                    .unwrap_or(""),
            );

            let event = match status {
                JobStatus::InQueue => Some(Event::Queued {
                    job_id: job.local_id.clone(),
                }),
                JobStatus::InProgress => {
                    let value = response
                        .pointer("/output/progress")
                        .and_then(|v| v.as_f64())
                        .map(|v| v as f32)
                        .unwrap_or(DEFAULT_PROGRESS);
                    Some(Event::Progress {
                        job_id: job.local_id.clone(),
                        value,
                    })
                }
                _ => None,
            };
            if let Some(event) = event {
                if tx.send(event).is_err() {
                    return Ok(());
                }
            }

            if status.is_active() {
                // The sleep races against consumer disconnect so a dropped
                // stream stops the loop promptly.
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = tx.closed() => return Ok(()),
                }
            }
        }

        // Resolution
        match status {
            JobStatus::Completed => {
                let output = response.get("output").ok_or_else(|| {
                    CloudError::MalformedPayload("completed response missing output".to_string())
                })?;
                let images_field = output.get("images").ok_or_else(|| {
                    CloudError::MalformedPayload(
                        "completed response missing output images".to_string(),
                    )
                })?;
                let images =
                    transfer::receive_images(self.inner.transport.as_ref(), images_field).await?;
                let pose = output.get("pose").filter(|v| !v.is_null()).cloned();
                info!(job = %job, count = images.len(), pose = pose.is_some(), "job completed");
                let _ = tx.send(Event::Finished {
                    job_id: job.local_id.clone(),
                    images,
                    pose,
                });
            }
            JobStatus::Failed => {
                let (message, traceback) = extract_error(&response, job.remote_id.as_deref());
                return Err(CloudError::RemoteJobFailure { message, traceback });
            }
            JobStatus::Cancelled => {
                info!(job = %job, "job was cancelled");
                let _ = tx.send(Event::Interrupted {
                    job_id: job.local_id.clone(),
                });
            }
            JobStatus::TimedOut => {
                warn!(job = %job, "job timed out");
                let _ = tx.send(Event::Error {
                    job_id: job.local_id.clone(),
                    message: "job timed out".to_string(),
                });
            }
            JobStatus::Unknown(raw) => {
                // Still a terminal event for the job, otherwise a consumer
                // waiting on it would hang forever.
                warn!(job = %job, status = %raw, "got unknown job status");
                let _ = tx.send(Event::Error {
                    job_id: job.local_id.clone(),
                    message: format!("unknown job status {raw}"),
                });
            }
            JobStatus::InQueue | JobStatus::InProgress => unreachable!("loop exits on terminal"),
        }
        Ok(())
    }

    // ── Quota and error classification ──────────────────────────────

    /// Apply the post-submission quota snapshot; returns the inferred cost.
    fn apply_user_update(&self, update: Option<&Value>) -> i64 {
        match self.inner.user.write() {
            Ok(mut guard) => match guard.as_mut() {
                Some(user) => update_user(user, update),
                None => 0,
            },
            Err(_) => 0,
        }
    }

    /// Convert a processing failure into the user-facing event message,
    /// applying the quota update carried by a 402 response.
    fn classify_job_error(&self, e: CloudError) -> String {
        if let CloudError::Http {
            status: 402,
            data: Some(data),
            ..
        } = &e
        {
            if self.user().is_some() {
                match quota_from_data(data) {
                    Some((cost, credits)) => {
                        if let Ok(mut guard) = self.inner.user.write() {
                            if let Some(user) = guard.as_mut() {
                                user.credits = credits;
                            }
                        }
                        return CloudError::QuotaExceeded { cost, credits }.to_string();
                    }
                    None => warn!("could not parse 402 error: {data}"),
                }
            }
        }
        e.to_string()
    }

    fn set_current(&self, current: CurrentJob) {
        if let Ok(mut guard) = self.inner.current_job.lock() {
            *guard = Some(current);
        }
    }

    fn clear_current(&self) {
        if let Ok(mut guard) = self.inner.current_job.lock() {
            *guard = None;
        }
    }

    // ── Cost estimation ─────────────────────────────────────────────

    /// Ask the service to quote the credit cost of a prospective job.
    pub async fn compute_cost(
        &self,
        kind: WorkflowKind,
        version: SdVersion,
        batch: u32,
        width: u32,
        height: u32,
        steps: u32,
    ) -> Result<i64> {
        let op = format!(
            "admin/cost/{}/{}/{batch}/{width}/{height}/{steps}",
            kind.as_str(),
            version.as_str()
        );
        let response = self.get_op(&op).await?;
        response.as_i64().ok_or_else(|| {
            CloudError::MalformedPayload(format!("expected integer cost, got {response}"))
        })
    }
}

/// In-flight interactive sign-in.
///
/// Present [`auth_url`](Self::auth_url) to the user, then await
/// [`wait_confirmation`](Self::wait_confirmation).
pub struct SignInPending {
    client: CloudClient,
    client_id: String,
    /// URL the user must open to approve this device.
    pub auth_url: String,
}

impl SignInPending {
    /// Poll the confirmation endpoint until the request is decided.
    ///
    /// Polls every 2 seconds while the server answers `"not-found"`; fails
    /// with [`CloudError::Timeout`] after 300 seconds without a decision
    /// and with [`CloudError::AuthorizationFailed`] on any other
    /// non-`"authorized"` status. On success the token is stored on the
    /// client and returned; call
    /// [`CloudClient::authenticate`] with it to open the session.
    pub async fn wait_confirmation(self) -> Result<String> {
        let deadline = tokio::time::Instant::now() + AUTH_TIMEOUT;
        loop {
            let confirm = self
                .client
                .post_op("auth/confirm", json!({"client_id": self.client_id}))
                .await?;
            let status = confirm
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unexpected response");

            match status {
                "authorized" => {
                    let token = confirm.get("token").and_then(|v| v.as_str()).ok_or_else(|| {
                        CloudError::MalformedPayload(
                            "auth/confirm response missing token".to_string(),
                        )
                    })?;
                    self.client.set_token(token);
                    info!("authorization successful");
                    return Ok(token.to_string());
                }
                "not-found" => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(CloudError::Timeout(AUTH_TIMEOUT.as_secs()));
                    }
                    tokio::time::sleep(AUTH_POLL_INTERVAL).await;
                }
                other => return Err(CloudError::AuthorizationFailed(other.to_string())),
            }
        }
    }
}

/// Apply a server-reported quota snapshot to `user`; returns the inferred
/// submission cost, never negative.
fn update_user(user: &mut User, update: Option<&Value>) -> i64 {
    let Some(data) = update.filter(|v| !v.is_null()) else {
        warn!("did not receive updated user data from server");
        return 0;
    };
    let credits = data.get("credits").and_then(|v| v.as_i64());
    let images_generated = data.get("images_generated").and_then(|v| v.as_u64());
    match (credits, images_generated) {
        (Some(credits), Some(images_generated)) => {
            let cost = (user.credits - credits).max(0);
            user.images_generated = images_generated;
            user.credits = credits;
            cost
        }
        _ => {
            warn!("incomplete user data in server response: {data}");
            0
        }
    }
}

/// Pull a message and traceback out of a FAILED response's `error` field.
///
/// The field usually holds a JSON object encoded as a string; anything
/// that does not parse that way is used verbatim.
fn extract_error(response: &Value, remote_id: Option<&str>) -> (String, String) {
    let raw = match response.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => {
            return (
                format!("Job {} failed (unknown error)", remote_id.unwrap_or("?")),
                "No traceback".to_string(),
            )
        }
    };
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&raw) {
        let message = fields
            .get("error_message")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| raw.clone());
        let traceback = fields
            .get("error_traceback")
            .and_then(|v| v.as_str())
            .unwrap_or("No traceback")
            .to_string();
        return (message, traceback);
    }
    (raw, "No traceback".to_string())
}

fn quota_from_data(data: &Value) -> Option<(i64, i64)> {
    let cost = data.get("cost")?.as_i64()?;
    let credits = data.get("credits")?.as_i64()?;
    Some((cost, credits))
}
