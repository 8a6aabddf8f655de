use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::SyncError;
use crate::models::AttendanceRecord;
use crate::settings::ResilienceSettings;

use super::payload::{PunchPayload, RegisterResponse};
use super::resilience::{CircuitBreaker, RetryPolicy};
use super::transport::{Transport, TransportResponse};

/// Submits attendance records to the timesheet service.
///
/// The circuit breaker wraps the retry loop: a submission that exhausts its
/// retries is one failure from the breaker's point of view.
pub struct SyncClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    device_id: String,
}

impl SyncClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        breaker: CircuitBreaker,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            retry,
            breaker,
            device_id: device_id.into(),
        }
    }

    pub fn from_settings(
        transport: Arc<dyn Transport>,
        resilience: &ResilienceSettings,
        device_id: impl Into<String>,
    ) -> Self {
        Self::new(
            transport,
            RetryPolicy::from(resilience),
            CircuitBreaker::from(resilience),
            device_id,
        )
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Delivers `record`, reporting only whether the service accepted it.
    /// Every failure is classified and logged here.
    pub async fn send(&self, record: &AttendanceRecord) -> bool {
        match self.try_send(record).await {
            Ok(response) => {
                info!(
                    "record {} of {} accepted by timesheet service (remote id {}, status {})",
                    record.id, record.employee_id, response.id, response.status
                );
                true
            }
            Err(SyncError::CircuitOpen) => {
                debug!("record {} not sent: circuit breaker open", record.id);
                false
            }
            Err(err) => {
                warn!(
                    "failed to sync record {} of {}: {err}",
                    record.id, record.employee_id
                );
                false
            }
        }
    }

    pub async fn try_send(&self, record: &AttendanceRecord) -> Result<RegisterResponse, SyncError> {
        let payload = PunchPayload::from_record(record, &self.device_id).await?;

        let permit = self.breaker.try_acquire()?;
        let response = match self.submit_with_retry(&payload, &record.id).await {
            Ok(response) => {
                permit.succeeded();
                response
            }
            Err(err) => {
                permit.failed();
                return Err(err);
            }
        };

        serde_json::from_str::<RegisterResponse>(&response.body)
            .map_err(|err| SyncError::InvalidResponse(err.to_string()))
    }

    async fn submit_with_retry(
        &self,
        payload: &PunchPayload,
        record_id: &str,
    ) -> Result<TransportResponse, SyncError> {
        let mut retry = 0;
        loop {
            let err = match self.transport.submit(payload).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => SyncError::Rejected {
                    status: response.status,
                    body: response.body,
                },
                Err(err) => err,
            };

            if !err.is_transient() || retry >= self.retry.retries {
                return Err(err);
            }

            retry += 1;
            let delay = self.retry.delay_for_retry(retry);
            warn!(
                "submission of record {record_id} failed ({err}); retry {retry}/{} in {}s",
                self.retry.retries,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    pub const ACCEPTED_BODY: &str =
        r#"{"id":"srv-1","status":"accepted","serverTimestamp":"2026-03-10T18:00:00Z","message":"ok"}"#;

    pub fn accepted() -> Result<TransportResponse, SyncError> {
        Ok(TransportResponse {
            status: 200,
            body: ACCEPTED_BODY.into(),
        })
    }

    pub fn unavailable() -> Result<TransportResponse, SyncError> {
        Ok(TransportResponse {
            status: 503,
            body: "down".into(),
        })
    }

    /// Pending Entry whose photo is a real file under `dir`.
    pub fn record_with_photo(
        dir: &tempfile::TempDir,
        id: &str,
        employee_id: &str,
    ) -> AttendanceRecord {
        let photo = dir.path().join(format!("{id}.png"));
        std::fs::write(&photo, b"png").unwrap();
        AttendanceRecord {
            id: id.into(),
            employee_id: employee_id.into(),
            timestamp: chrono::Utc::now(),
            record_type: crate::models::RecordType::Entry,
            location: "Main Office".into(),
            photo_ref: photo.display().to_string(),
            sync_status: crate::models::SyncStatus::Pending,
        }
    }

    /// Accepts every submission, but only once the test lets it through.
    pub struct GatedTransport {
        gate: tokio::sync::Semaphore,
        started: AtomicUsize,
    }

    impl GatedTransport {
        pub fn new() -> Self {
            Self {
                gate: tokio::sync::Semaphore::new(0),
                started: AtomicUsize::new(0),
            }
        }

        /// Lets one waiting (or future) submission complete.
        pub fn release(&self) {
            self.gate.add_permits(1);
        }

        pub fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        /// Waits until `count` submissions have reached the transport.
        pub async fn wait_for_started(&self, count: usize) {
            while self.started() < count {
                tokio::task::yield_now().await;
            }
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn submit(&self, _payload: &PunchPayload) -> Result<TransportResponse, SyncError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate
                .acquire()
                .await
                .expect("gate semaphore closed")
                .forget();
            accepted()
        }
    }

    type Responder = Box<dyn Fn(&PunchPayload) -> Result<TransportResponse, SyncError> + Send + Sync>;

    /// Transport that answers from a script, then from a fallback rule.
    pub struct FakeTransport {
        script: Mutex<VecDeque<Result<TransportResponse, SyncError>>>,
        fallback: Mutex<Responder>,
        calls: AtomicUsize,
        seen: Mutex<Vec<PunchPayload>>,
    }

    impl FakeTransport {
        pub fn answering(
            rule: impl Fn(&PunchPayload) -> Result<TransportResponse, SyncError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(Box::new(rule)),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn always_ok() -> Self {
            Self::answering(|_| accepted())
        }

        pub fn always_down() -> Self {
            Self::answering(|_| Err(SyncError::Transient("connection refused".into())))
        }

        pub fn push(&self, response: Result<TransportResponse, SyncError>) {
            self.script.lock().unwrap().push_back(response);
        }

        pub fn set_rule(
            &self,
            rule: impl Fn(&PunchPayload) -> Result<TransportResponse, SyncError> + Send + Sync + 'static,
        ) {
            *self.fallback.lock().unwrap() = Box::new(rule);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn payloads(&self) -> Vec<PunchPayload> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn submit(&self, payload: &PunchPayload) -> Result<TransportResponse, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(payload.clone());
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                return next;
            }
            let rule = self.fallback.lock().unwrap();
            (*rule)(payload)
        }
    }
}
