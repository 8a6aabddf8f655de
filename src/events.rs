//! Notifications emitted by the punch flow and the outbox.
//!
//! Producers hold a `broadcast::Sender` handed to them at construction; a
//! terminal, display, or message bus subscribes with `Sender::subscribe`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::RecordType;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PunchEvent {
    #[serde(rename_all = "camelCase")]
    Registered {
        record_id: String,
        employee_id: String,
        record_type: RecordType,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Rejected {
        employee_id: String,
        message: String,
        at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Synced {
        record_id: String,
        employee_id: String,
        at: DateTime<Utc>,
    },
}

pub type EventSender = broadcast::Sender<PunchEvent>;

pub fn channel() -> (EventSender, broadcast::Receiver<PunchEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}

/// Fire-and-forget: having no subscribers is normal.
pub fn emit(sender: &EventSender, event: PunchEvent) {
    let _ = sender.send(event);
}
