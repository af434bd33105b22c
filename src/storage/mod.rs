//! Storage layout
//!
//! Every upload gets its own allocation directory directly below the upload
//! root, named after a nanosecond timestamp. The directory is created with
//! `create_dir` (never `create_dir_all`), so the filesystem arbitrates between
//! concurrent uploads that pick the same timestamp: the loser bumps its
//! candidate and retries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub mod path;

pub use path::{join_under, resolve_within, strip_parent_tokens};

/// Upper bound on allocation attempts before giving up
const MAX_ALLOCATION_ATTEMPTS: u32 = 64;

/// Relative reference to an uploaded file: `allocation/filename`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageReference {
    allocation: String,
    filename: String,
}

impl StorageReference {
    pub fn new(allocation: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            allocation: allocation.into(),
            filename: filename.into(),
        }
    }

    /// The unique per-upload directory name
    pub fn allocation(&self) -> &str {
        &self.allocation
    }

    /// The client-supplied leaf name
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Location of the referenced file under `root`
    pub fn path_under(&self, root: &Path) -> PathBuf {
        root.join(&self.allocation).join(&self.filename)
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.allocation, self.filename)
    }
}

/// JSON body returned by a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "filePath")]
    pub file_path: String,
}

impl From<&StorageReference> for UploadResponse {
    fn from(reference: &StorageReference) -> Self {
        Self {
            file_path: reference.to_string(),
        }
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch
pub fn timestamp_nanos() -> i64 {
    let now = chrono::Utc::now();
    // Out of range only after the year 2262.
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

/// A freshly created, request-private directory under the upload root
#[derive(Debug)]
pub struct Allocation {
    segment: String,
    dir: PathBuf,
}

impl Allocation {
    /// Create a new uniquely named directory below `root`.
    ///
    /// `root` itself is created if missing.
    pub async fn create(root: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;

        let mut candidate = timestamp_nanos();
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let segment = candidate.to_string();
            let dir = root.join(&segment);
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => return Ok(Self { segment, dir }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(segment = %segment, "Allocation segment taken, retrying");
                    candidate = candidate.max(timestamp_nanos()) + 1;
                }
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "could not allocate a unique upload directory",
        ))
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
