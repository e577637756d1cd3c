//! SQLite record store.
//!
//! Uniqueness is enforced by the store itself (primary keys and UNIQUE
//! constraints), which is the only concurrency safety net the design
//! relies on. Insert functions return an explicit `bool`: `true` when the
//! row was newly added, `false` when an identical key was already present.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::Connection;

pub mod contests;
pub mod schema;
pub mod settings;
pub mod solved;
pub mod students;
pub mod submissions;

pub type DbResult<T> = Result<T, rusqlite::Error>;

/// Cheap-to-clone handle over a single connection. The store sees only
/// short, sequential statements, so one connection behind a mutex is
/// enough.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &str) -> DbResult<Self> {
        log::debug!("[open] opening database at {path}");
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection::open(path)?)),
        })
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn init_schema(&self) -> DbResult<()> {
        let conn = self.conn();
        for statement in schema::ALL {
            conn.execute(statement, [])?;
        }
        log::debug!("[init_schema] schema ready");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_db() -> Db {
    let db = Db::open_in_memory().unwrap();
    db.init_schema().unwrap();
    db
}
