// Per-submission scratch directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

/// Isolated filesystem arena for one submission.
///
/// Every submission gets its own uniquely named directory under the system
/// temp dir, so two concurrent submissions can never observe each other's
/// source files or compiled artifacts. The directory is removed when the
/// workspace is dropped, on every exit path, including panics.
pub struct Workspace {
    id: Uuid,
    dir: TempDir,
}

impl Workspace {
    pub fn create(id: Uuid) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("arbiter-{id}-"))
            .tempdir()?;
        debug!(submission_id = %id, path = %dir.path().display(), "workspace allocated");
        Ok(Self { id, dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file into the workspace and return its full path.
    pub fn write_file(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Tear the scratch directory down now instead of waiting for drop.
    /// Idempotent: a directory something else already removed is fine.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        let id = self.id;
        if let Err(e) = self.dir.close() {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(submission_id = %id, path = %path.display(), error = %e, "workspace cleanup failed");
            }
        } else {
            debug!(submission_id = %id, "workspace released");
        }
    }
}
