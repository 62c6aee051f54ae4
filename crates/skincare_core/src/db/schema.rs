use super::{DbError, DbResult};
use log::info;
use rusqlite::Connection;
use std::cmp::Ordering;

/// Schema revision written to `PRAGMA user_version` once `kv_entries` exists.
pub const SCHEMA_VERSION: u32 = 1;

const KV_ENTRIES_SQL: &str = include_str!("kv_entries.sql");

/// Creates `kv_entries` on a fresh file and stamps the revision.
pub(crate) fn ensure_schema(conn: &mut Connection) -> DbResult<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    match found.cmp(&SCHEMA_VERSION) {
        Ordering::Equal => Ok(()),
        Ordering::Greater => Err(DbError::SchemaTooNew {
            found,
            supported: SCHEMA_VERSION,
        }),
        Ordering::Less => {
            let tx = conn.transaction()?;
            tx.execute_batch(KV_ENTRIES_SQL)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            info!(
                "event=db_schema module=db status=ok from_version={} to_version={}",
                found, SCHEMA_VERSION
            );
            Ok(())
        }
    }
}
