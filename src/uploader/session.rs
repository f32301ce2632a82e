//! UploadManager: drives one file through begin → parts → complete.
//!
//! The manager owns at most one session at a time. Its status lives in a
//! single `watch` value (pollable) and every transition is also broadcast as
//! an event, so observers never reconstruct state from scattered callbacks.
//!
//! ```text
//! Idle → Initiating → Uploading → Completing → Completed
//!   any non-terminal ── cancel ──→ Aborting → Aborted → Idle
//!   unrecoverable error ─────────→ Failed (handle kept for resume)
//! ```

use super::{
    error::{UploadError, UploadResult},
    gateway_client::GatewayApi,
    plan::{DEFAULT_PART_SIZE, PartSpec, effective_part_size, plan_parts},
    source::UploadSource,
    transport::PartTransport,
};
use crate::models::multipart::{PartETag, StoredPart, UploadHandle};
use base64::{Engine as _, engine::general_purpose};
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Requested part size; grown automatically for very large files.
    pub part_size: u64,
    /// Parts in flight at once.
    pub concurrency: usize,
    /// Attempts per part, the first one included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Abort the store-side upload when a session fails instead of keeping
    /// it for a later resume.
    pub abort_on_failure: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            concurrency: 4,
            max_attempts: 4,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
            abort_on_failure: false,
        }
    }
}

impl UploadConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum UploadStatus {
    #[default]
    Idle,
    Initiating,
    Uploading,
    Completing,
    Completed,
    Aborting,
    Aborted,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Aborted)
    }
}

/// Everything an observer needs to render the session.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSnapshot {
    pub status: UploadStatus,
    pub file_name: Option<String>,
    pub total_bytes: u64,
    pub bytes_acknowledged: u64,
    pub parts_total: usize,
    pub parts_completed: usize,
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// Acknowledged bytes as a percentage of the file size.
    pub fn progress_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.status == UploadStatus::Completed {
                100.0
            } else {
                0.0
            };
        }
        self.bytes_acknowledged as f64 * 100.0 / self.total_bytes as f64
    }
}

/// Enough to pick an interrupted upload back up, possibly from another process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeToken {
    pub handle: UploadHandle,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub part_size: u64,
}

impl ResumeToken {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    pub fn decode(token: &str) -> UploadResult<Self> {
        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| UploadError::InvalidResumeToken(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| UploadError::InvalidResumeToken(e.to_string()))
    }

    /// Same file, same plan.
    fn matches(&self, source: &dyn UploadSource, part_size: u64) -> bool {
        self.file_name == source.file_name()
            && self.content_type == source.content_type()
            && self.size == source.size()
            && self.part_size == part_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub handle: UploadHandle,
    pub location: String,
    pub parts: usize,
    /// Parts found already stored and skipped.
    pub resumed_parts: usize,
}

#[derive(Debug)]
struct PartState {
    spec: PartSpec,
    e_tag: Option<String>,
}

#[derive(Debug)]
struct RunControl {
    id: u64,
    token: CancellationToken,
    abort_requested: AtomicBool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    current: Option<Arc<RunControl>>,
    /// Handle of the current run once the store has assigned one.
    current_handle: Option<ResumeToken>,
    /// Interrupted session that a matching reselection may resume.
    resume: Option<ResumeToken>,
}

pub struct UploadManager {
    gateway: Arc<dyn GatewayApi>,
    transport: Arc<dyn PartTransport>,
    config: UploadConfig,
    state: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<SessionSnapshot>,
    inner: Mutex<Inner>,
}

impl UploadManager {
    pub fn new(
        gateway: Arc<dyn GatewayApi>,
        transport: Arc<dyn PartTransport>,
        config: UploadConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            gateway,
            transport,
            config,
            state,
            events,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> UploadStatus {
        self.state.borrow().status
    }

    /// Latest-value view of the session.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Every published transition, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.events.subscribe()
    }

    /// The interrupted session a matching reselection would resume.
    pub fn resume_token(&self) -> Option<ResumeToken> {
        self.lock().resume.clone()
    }

    /// Seed the resume candidate, e.g. from a token saved by an earlier process.
    pub fn restore(&self, token: ResumeToken) {
        self.lock().resume = Some(token);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `f` to the snapshot and broadcast it, unless `run` has been
    /// replaced by a newer selection.
    fn publish(&self, run: Option<&RunControl>, f: impl FnOnce(&mut SessionSnapshot)) {
        let inner = self.lock();
        if let Some(run) = run {
            if inner.current.as_ref().map(|c| c.id) != Some(run.id) {
                return;
            }
        }
        self.state.send_modify(f);
        let _ = self.events.send(self.state.borrow().clone());
        drop(inner);
    }

    /// Upload `source`, replacing any session in progress.
    ///
    /// If the file matches the last interrupted session, parts the store
    /// already holds are skipped.
    pub async fn upload(&self, source: Arc<dyn UploadSource>) -> UploadResult<UploadOutcome> {
        let part_size = effective_part_size(source.size(), self.config.part_size);
        let (run, resume) = self.start_run(source.as_ref(), part_size);

        let result = self.drive(&run, source.as_ref(), part_size, resume).await;
        match &result {
            Ok(_) | Err(UploadError::Cancelled) | Err(UploadError::Superseded) => {}
            Err(err) => self.fail(&run, err).await,
        }

        let mut inner = self.lock();
        if inner.current.as_ref().map(|c| c.id) == Some(run.id) {
            inner.current = None;
        }
        drop(inner);
        result
    }

    /// Request cancellation.
    ///
    /// A running session is stopped and its handle aborted by the run itself.
    /// Without a running session, a remembered interrupted handle is aborted
    /// here. Either way the local session ends up discarded and `Idle`.
    pub async fn cancel(&self) -> UploadResult<()> {
        let pending = {
            let mut inner = self.lock();
            if let Some(run) = inner.current.as_ref() {
                run.abort_requested.store(true, Ordering::SeqCst);
                run.token.cancel();
                return Ok(());
            }
            inner.resume.take()
        };

        if let Some(token) = pending {
            self.publish(None, |s| s.status = UploadStatus::Aborting);
            self.gateway.abort_upload(&token.handle).await?;
            info!(key = %token.handle.key, "interrupted upload aborted");
            self.publish(None, |s| s.status = UploadStatus::Aborted);
        }
        self.publish(None, |s| *s = SessionSnapshot::default());
        Ok(())
    }

    fn start_run(
        &self,
        source: &dyn UploadSource,
        part_size: u64,
    ) -> (Arc<RunControl>, Option<ResumeToken>) {
        let mut inner = self.lock();

        let candidate = match inner.current.take() {
            Some(prev) => {
                prev.token.cancel();
                info!(run = prev.id, "previous upload replaced by a new selection");
                inner.current_handle.take().or_else(|| inner.resume.take())
            }
            None => inner.resume.take(),
        };
        // A candidate for some other file stays around for a later reselection.
        let resume = match candidate {
            Some(token) if token.matches(source, part_size) => Some(token),
            other => {
                inner.resume = other;
                None
            }
        };

        inner.next_id += 1;
        let run = Arc::new(RunControl {
            id: inner.next_id,
            token: CancellationToken::new(),
            abort_requested: AtomicBool::new(false),
        });
        inner.current = Some(run.clone());
        inner.current_handle = None;

        let parts_total = plan_parts(source.size(), part_size).len();
        self.state.send_modify(|s| {
            *s = SessionSnapshot {
                status: UploadStatus::Initiating,
                file_name: Some(source.file_name().to_string()),
                total_bytes: source.size(),
                parts_total,
                ..SessionSnapshot::default()
            }
        });
        let _ = self.events.send(self.state.borrow().clone());
        drop(inner);

        (run, resume)
    }

    async fn drive(
        &self,
        run: &RunControl,
        source: &dyn UploadSource,
        part_size: u64,
        resume: Option<ResumeToken>,
    ) -> UploadResult<UploadOutcome> {
        if source.file_name().trim().is_empty() {
            return Err(UploadError::Validation("file name is required".into()));
        }
        if source.content_type().trim().is_empty() {
            return Err(UploadError::Validation("content type is required".into()));
        }

        let mut parts: Vec<PartState> = plan_parts(source.size(), part_size)
            .into_iter()
            .map(|spec| PartState { spec, e_tag: None })
            .collect();

        let (handle, resumed_parts) = match resume {
            Some(token) => match self.gateway.list_parts(&token.handle).await {
                Ok(stored) => {
                    let adopted = adopt_stored_parts(&mut parts, &stored);
                    info!(key = %token.handle.key, adopted, "resuming interrupted upload");
                    (token.handle, adopted)
                }
                Err(err) => {
                    warn!(key = %token.handle.key, error = %err, "cannot resume, starting over");
                    let handle = self
                        .gateway
                        .create_upload(source.file_name(), source.content_type())
                        .await?;
                    (handle, 0)
                }
            },
            None => {
                let handle = self
                    .gateway
                    .create_upload(source.file_name(), source.content_type())
                    .await?;
                (handle, 0)
            }
        };

        {
            let mut inner = self.lock();
            if inner.current.as_ref().map(|c| c.id) == Some(run.id) {
                inner.current_handle = Some(ResumeToken {
                    handle: handle.clone(),
                    file_name: source.file_name().to_string(),
                    content_type: source.content_type().to_string(),
                    size: source.size(),
                    part_size,
                });
            }
        }
        if run.token.is_cancelled() {
            return self.stop(run, &handle).await;
        }

        let mut acknowledged: u64 = parts
            .iter()
            .filter(|p| p.e_tag.is_some())
            .map(|p| p.spec.len)
            .sum();
        let mut completed = resumed_parts;
        self.publish(Some(run), |s| {
            s.status = UploadStatus::Uploading;
            s.bytes_acknowledged = acknowledged;
            s.parts_completed = completed;
        });

        let pending: Vec<PartSpec> = parts
            .iter()
            .filter(|p| p.e_tag.is_none())
            .map(|p| p.spec)
            .collect();
        debug!(key = %handle.key, pending = pending.len(), "uploading parts");

        let mut transfers = stream::iter(pending)
            .map(|spec| self.transfer_part(&handle, source, spec))
            .buffer_unordered(self.config.concurrency.max(1));

        loop {
            tokio::select! {
                biased;
                _ = run.token.cancelled() => {
                    drop(transfers);
                    return self.stop(run, &handle).await;
                }
                next = transfers.next() => match next {
                    None => break,
                    Some(Ok((spec, e_tag))) => {
                        let part = &mut parts[(spec.part_number - 1) as usize];
                        if part.e_tag.is_none() {
                            part.e_tag = Some(e_tag);
                            acknowledged += spec.len;
                            completed += 1;
                        }
                        self.publish(Some(run), |s| {
                            s.bytes_acknowledged = acknowledged;
                            s.parts_completed = completed;
                        });
                    }
                    Some(Err(err)) => return Err(err),
                },
            }
        }
        drop(transfers);

        let completed_parts = completed_part_list(&parts)?;
        if run.token.is_cancelled() {
            return self.stop(run, &handle).await;
        }

        self.publish(Some(run), |s| s.status = UploadStatus::Completing);
        let location = self.gateway.complete_upload(&handle, completed_parts).await?;

        {
            let mut inner = self.lock();
            if inner.current.as_ref().map(|c| c.id) == Some(run.id) {
                inner.current_handle = None;
            }
        }
        let total = source.size();
        self.publish(Some(run), |s| {
            s.status = UploadStatus::Completed;
            s.bytes_acknowledged = total;
            s.parts_completed = s.parts_total;
        });
        info!(key = %handle.key, location = %location, parts = parts.len(), "upload completed");

        Ok(UploadOutcome {
            handle,
            location,
            parts: parts.len(),
            resumed_parts,
        })
    }

    /// Sign, transfer and retry one part until it is acknowledged or out of attempts.
    async fn transfer_part(
        &self,
        handle: &UploadHandle,
        source: &dyn UploadSource,
        spec: PartSpec,
    ) -> UploadResult<(PartSpec, String)> {
        let body = source.read_part(&spec).await?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match self.gateway.sign_part(handle, spec.part_number).await {
                Ok(url) => self
                    .transport
                    .put_part(&url, body.clone())
                    .await
                    .map_err(|e| e.into_upload_error(spec.part_number)),
                Err(err) => Err(err),
            };

            match result {
                Ok(e_tag) => {
                    debug!(part = spec.part_number, attempt, "part acknowledged");
                    return Ok((spec, e_tag));
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = match err {
                        UploadError::ExpiredUrl { .. } => Duration::ZERO,
                        _ => self.config.backoff(attempt),
                    };
                    warn!(
                        part = spec.part_number,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "part upload failed, re-signing"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    return Err(UploadError::PartFailed {
                        part_number: spec.part_number,
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// The run was interrupted: either replaced by a new selection or cancelled.
    async fn stop(&self, run: &RunControl, handle: &UploadHandle) -> UploadResult<UploadOutcome> {
        if !run.abort_requested.load(Ordering::SeqCst) {
            debug!(run = run.id, key = %handle.key, "upload superseded");
            return Err(UploadError::Superseded);
        }

        self.publish(Some(run), |s| s.status = UploadStatus::Aborting);
        let aborted = self.gateway.abort_upload(handle).await;
        {
            let mut inner = self.lock();
            if inner.current.as_ref().map(|c| c.id) == Some(run.id) {
                inner.current_handle = None;
                inner.resume = None;
            }
        }
        aborted?;

        info!(key = %handle.key, "upload cancelled and aborted");
        self.publish(Some(run), |s| s.status = UploadStatus::Aborted);
        self.publish(Some(run), |s| *s = SessionSnapshot::default());
        Err(UploadError::Cancelled)
    }

    async fn fail(&self, run: &RunControl, err: &UploadError) {
        let handle = {
            let mut inner = self.lock();
            if inner.current.as_ref().map(|c| c.id) != Some(run.id) {
                return;
            }
            inner.current_handle.take()
        };

        warn!(error = %err, "upload failed");
        match handle {
            Some(token) if self.config.abort_on_failure => {
                self.publish(Some(run), |s| s.status = UploadStatus::Aborting);
                if let Err(abort_err) = self.gateway.abort_upload(&token.handle).await {
                    warn!(key = %token.handle.key, error = %abort_err, "abort after failure failed");
                }
            }
            Some(token) => {
                self.lock().resume = Some(token);
            }
            None => {}
        }

        let message = err.to_string();
        self.publish(Some(run), |s| {
            s.status = UploadStatus::Failed;
            s.error = Some(message);
        });
    }
}

/// Mark planned parts the store already holds, matched by number and size.
fn adopt_stored_parts(parts: &mut [PartState], stored: &[StoredPart]) -> usize {
    let mut adopted = 0;
    for sp in stored {
        if sp.e_tag.is_empty() {
            continue;
        }
        let Some(part) = usize::try_from(sp.part_number - 1)
            .ok()
            .and_then(|idx| parts.get_mut(idx))
        else {
            continue;
        };
        if part.e_tag.is_none() && part.spec.len as i64 == sp.size {
            part.e_tag = Some(sp.e_tag.clone());
            adopted += 1;
        }
    }
    adopted
}

/// Parts 1..=N with their eTags, or an error naming the first unacknowledged part.
fn completed_part_list(parts: &[PartState]) -> UploadResult<Vec<PartETag>> {
    parts
        .iter()
        .map(|p| match &p.e_tag {
            Some(e_tag) if !e_tag.is_empty() => Ok(PartETag {
                part_number: p.spec.part_number,
                e_tag: e_tag.clone(),
            }),
            _ => Err(UploadError::Completion(format!(
                "part {} was never acknowledged",
                p.spec.part_number
            ))),
        })
        .collect()
}
