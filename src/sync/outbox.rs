use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, info};

use crate::db::AttendanceStore;
use crate::error::PersistenceError;
use crate::events::{self, EventSender, PunchEvent};
use crate::models::{AttendanceRecord, SyncStatus};

use super::client::SyncClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted remotely and marked Synced.
    Synced,
    /// Submission failed; the record stays queued.
    Pending,
    /// Another actor already delivered it.
    AlreadySynced,
    /// Another actor is delivering it right now.
    InFlight,
}

/// Delivery side of the local outbox, shared by the punch flow and the
/// reconciliation loop.
///
/// A record is only ever submitted under a per-record lease, and its status
/// is re-read under that lease, so the two actors never send the same
/// Pending record at the same time or re-send one the other already delivered.
pub struct Outbox {
    store: Arc<dyn AttendanceStore>,
    client: Arc<SyncClient>,
    events: EventSender,
    in_flight: Mutex<HashSet<String>>,
}

impl Outbox {
    pub fn new(store: Arc<dyn AttendanceStore>, client: Arc<SyncClient>, events: EventSender) -> Self {
        Self {
            store,
            client,
            events,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn pending(&self) -> Result<Vec<AttendanceRecord>, PersistenceError> {
        self.store.pending().await
    }

    pub async fn deliver(&self, record: &AttendanceRecord) -> Result<Delivery, PersistenceError> {
        let Some(_lease) = Lease::acquire(&self.in_flight, &record.id) else {
            debug!("record {} already being delivered; skipping", record.id);
            return Ok(Delivery::InFlight);
        };

        if self.store.status_of(&record.id).await? == Some(SyncStatus::Synced) {
            return Ok(Delivery::AlreadySynced);
        }

        if !self.client.send(record).await {
            return Ok(Delivery::Pending);
        }

        self.store.update_status(&record.id, SyncStatus::Synced).await?;
        info!("record {} of {} synced", record.id, record.employee_id);
        events::emit(
            &self.events,
            PunchEvent::Synced {
                record_id: record.id.clone(),
                employee_id: record.employee_id.clone(),
                at: Utc::now(),
            },
        );
        Ok(Delivery::Synced)
    }
}

struct Lease<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> Lease<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        let mut guard = match set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(id.to_string()).then(|| Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let mut guard = match self.set.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(&self.id);
    }
}
