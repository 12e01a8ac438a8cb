//! SQLite persistence of unit status.
//!
//! One row per `(service_id, column)`. A dedicated writer thread drains the
//! database queue, folding whatever is already queued into one transaction.

use std::collections::BTreeMap;
use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use rusqlite::{Connection, params};
use tracing::{debug, error, info, warn};

use crate::core::errors::{Result, RwError};
use crate::status::{COLUMNS, Cell, DbMessage};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS status (
    service_id TEXT NOT NULL,
    column_name TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (service_id, column_name)
);";

const UPSERT: &str = "
INSERT INTO status (service_id, column_name, value) VALUES (?1, ?2, ?3)
ON CONFLICT(service_id, column_name) DO UPDATE SET value = excluded.value";

const DELETE: &str = "DELETE FROM status WHERE service_id = ?1";

#[derive(Debug)]
pub struct DatabaseWriter {
    conn: Connection,
}

impl DatabaseWriter {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| RwError::io(parent, err))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Apply a batch of change records in one transaction. Unknown columns
    /// are dropped.
    pub fn write(&mut self, batch: &[DbMessage]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare_cached(UPSERT)?;
            for message in batch {
                if message.delete {
                    written += tx.execute(DELETE, params![message.service_id])?;
                    continue;
                }
                for cell in &message.cells {
                    if !COLUMNS.contains(&cell.column.as_str()) {
                        warn!(service = %message.service_id, column = %cell.column, "unknown status column");
                        continue;
                    }
                    stmt.execute(params![message.service_id, cell.column, cell.value])?;
                    written += 1;
                }
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Every persisted cell, grouped by unit.
    pub fn load_statuses(&self) -> Result<BTreeMap<String, Vec<Cell>>> {
        let mut stmt = self.conn.prepare(
            "SELECT service_id, column_name, value FROM status ORDER BY service_id, column_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut statuses: BTreeMap<String, Vec<Cell>> = BTreeMap::new();
        for row in rows {
            let (service_id, column, value) = row?;
            statuses
                .entry(service_id)
                .or_default()
                .push(Cell::new(&column, value));
        }
        Ok(statuses)
    }

    /// Drain `rx` on a dedicated thread until every sender is gone.
    pub fn spawn(mut self, rx: Receiver<DbMessage>) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("rwatch-db".to_string())
            .spawn(move || {
                info!("database writer started");
                while let Ok(first) = rx.recv() {
                    let mut batch = vec![first];
                    batch.extend(rx.try_iter());
                    match self.write(&batch) {
                        Ok(written) => debug!(messages = batch.len(), written, "status persisted"),
                        Err(err) => error!(error = %err, code = err.code(), "status write failed"),
                    }
                }
                info!("database writer finished");
            })
            .map_err(|err| RwError::Runtime {
                details: format!("failed to spawn database thread: {err}"),
            })
    }
}
