//! Layout upgrades for the embedded store tables.
//!
//! Steps are listed oldest first. Pending steps run in one transaction and
//! stamp `PRAGMA user_version` as they go, so a failed step leaves the file at
//! its previous layout.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct LayoutStep {
    version: u32,
    sql: &'static str,
}

const LAYOUT_STEPS: &[LayoutStep] = &[LayoutStep {
    version: 1,
    sql: include_str!("0001_init.sql"),
}];

/// Newest layout version this build can read and write.
pub fn latest_version() -> u32 {
    LAYOUT_STEPS.last().map_or(0, |step| step.version)
}

/// Brings the connection's database up to [`latest_version`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    upgrade(conn, LAYOUT_STEPS)
}

fn upgrade(conn: &mut Connection, steps: &[LayoutStep]) -> DbResult<()> {
    let found = stored_version(conn)?;
    let supported = steps.last().map_or(0, |step| step.version);

    if found > supported {
        return Err(DbError::LayoutTooNew { found, supported });
    }

    let pending = steps
        .iter()
        .filter(|step| step.version > found)
        .collect::<Vec<_>>();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in pending {
        tx.execute_batch(step.sql)
            .and_then(|()| tx.pragma_update(None, "user_version", step.version))
            .map_err(|source| DbError::UpgradeFailed {
                version: step.version,
                source,
            })?;
    }
    tx.commit()?;

    info!("event=db_upgrade module=db status=ok from={found} to={supported}");
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?;
    Ok(version)
}
