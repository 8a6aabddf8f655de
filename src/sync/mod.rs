//! Delivery of locally recorded punches to the remote timesheet service.

pub mod client;
mod controller;
mod outbox;
mod payload;
pub mod resilience;
mod transport;
mod worker;

pub use client::SyncClient;
pub use controller::ReconciliationController;
pub use outbox::{Delivery, Outbox};
pub use payload::{PunchPayload, RegisterResponse};
pub use resilience::{BreakerState, CircuitBreaker, RetryPolicy};
pub use transport::{HttpTransport, Transport, TransportFactory, TransportResponse};
pub use worker::{reconciliation_loop, run_cycle, CycleReport, DEFAULT_RECONCILE_INTERVAL};
