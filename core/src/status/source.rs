//! Where snapshots come from.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::parser::parse_status_log;
use super::types::Snapshot;
use crate::errors::CoreError;

/// Produces a fresh [`Snapshot`] on demand.
///
/// The watch loop calls [`fetch`](SnapshotSource::fetch) once per
/// reprocessing pass. An `Err` means no snapshot could be obtained at all
/// (for example the log does not exist yet); record-level corruption is
/// absorbed by the parser and still yields `Ok`.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> Result<Snapshot, CoreError>;
}

/// Reads the status log from disk. The file is reopened on every fetch
/// because the daemon rewrites it wholesale.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSource for StatusFile {
    fn fetch(&self) -> Result<Snapshot, CoreError> {
        let file = File::open(&self.path)?;
        let snapshot = parse_status_log(BufReader::new(file));
        debug!(
            "Read {} clients and {} routes from {}",
            snapshot.clients.len(),
            snapshot.routes.len(),
            self.path.display()
        );
        Ok(snapshot)
    }
}
