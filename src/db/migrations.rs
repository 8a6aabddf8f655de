use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Schema steps in order. The ledger's `user_version` counts how many have run.
const STEPS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

pub fn latest_version() -> usize {
    STEPS.len()
}

/// Applies every step the ledger has not seen yet, each in its own transaction
/// together with the version bump.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let applied: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read ledger schema version")?;
    let applied = usize::try_from(applied)
        .with_context(|| format!("ledger schema version {applied} is invalid"))?;

    let Some(pending) = STEPS.get(applied..) else {
        bail!(
            "ledger schema v{applied} was written by a newer build (this build knows v{})",
            latest_version()
        );
    };

    for (offset, sql) in pending.iter().enumerate() {
        let version = applied + offset + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("ledger schema step v{version} failed"))?;
        tx.pragma_update(None, "user_version", i64::try_from(version)?)?;
        tx.commit()
            .with_context(|| format!("failed to commit ledger schema v{version}"))?;
        info!("ledger schema upgraded to v{version}");
    }

    Ok(())
}
