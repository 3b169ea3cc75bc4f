use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use rusqlite::Connection;

/// Shared database handle for the service: a single connection behind a
/// mutex, scoped to the service lifetime. Every endpoint is read-only.
pub type Db = Arc<Mutex<Connection>>;

/// Open the file-backed database produced by the loader.
pub fn open(path: &Path) -> anyhow::Result<Db> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database '{}'", path.display()))?;
    Ok(Arc::new(Mutex::new(conn)))
}
