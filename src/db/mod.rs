mod connection;
mod helpers;
mod migrations;
mod repositories;
mod store;

pub use connection::Database;
pub use store::AttendanceStore;

#[cfg(test)]
pub(crate) use store::testing;
