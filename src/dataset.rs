//! Dataset access for exact line lookups.
//!
//! Two modes, fixed at startup:
//! - Cached: the file is read once into an immutable `Snapshot` shared by
//!   every connection. Scans run on the bounded `WorkerPool` so they never
//!   stall the connection event loop.
//! - Reread: every lookup reopens the file and streams it line by line with
//!   async reads, stopping at the first match.
//!
//! Lines are compared to the query after trimming surrounding whitespace.

use crate::pool::{PoolError, WorkerPool};
use crate::search::linear_search;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, trace, warn};

/// Dataset access errors
#[derive(Debug)]
pub enum DatasetError {
    /// The dataset file could not be opened
    Open(PathBuf, io::Error),
    /// Reading the dataset failed partway (including invalid UTF-8)
    Read(PathBuf, io::Error),
    /// The scan job did not complete
    Worker(PoolError),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::Open(path, e) => {
                write!(f, "Failed to open dataset '{}': {}", path.display(), e)
            }
            DatasetError::Read(path, e) => {
                write!(f, "Failed to read dataset '{}': {}", path.display(), e)
            }
            DatasetError::Worker(e) => write!(f, "Dataset scan failed: {e}"),
        }
    }
}

impl std::error::Error for DatasetError {}

impl From<PoolError> for DatasetError {
    fn from(e: PoolError) -> Self {
        DatasetError::Worker(e)
    }
}

/// Immutable in-memory copy of the dataset
#[derive(Debug)]
pub struct Snapshot {
    lines: Box<[String]>,
}

impl Snapshot {
    /// Read the whole file into memory.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let contents = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::InvalidData => DatasetError::Read(path.to_path_buf(), e),
            _ => DatasetError::Open(path.to_path_buf(), e),
        })?;
        Ok(Self::from_text(&contents))
    }

    pub fn from_text(contents: &str) -> Self {
        let lines = contents
            .lines()
            .map(|line| line.trim().to_string())
            .collect();
        Snapshot { lines }
    }

    /// Linear scan for a line equal to `query`.
    pub fn contains(&self, query: &str) -> bool {
        linear_search(&self.lines, query).is_some()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// How lookups reach the data
#[derive(Debug)]
pub enum Dataset {
    Cached {
        snapshot: Arc<Snapshot>,
        pool: WorkerPool,
    },
    Reread {
        path: PathBuf,
    },
}

impl Dataset {
    /// Open the dataset in the configured mode.
    ///
    /// Fails if the file is missing or unreadable; in cached mode the whole
    /// file is loaded here.
    pub fn open(path: &Path, reread_on_query: bool, workers: usize) -> Result<Self, DatasetError> {
        if reread_on_query {
            std::fs::File::open(path).map_err(|e| DatasetError::Open(path.to_path_buf(), e))?;
            info!(path = %path.display(), "Dataset will be reread on every query");
            Ok(Dataset::Reread {
                path: path.to_path_buf(),
            })
        } else {
            let snapshot = Snapshot::load(path)?;
            if snapshot.is_empty() {
                warn!(path = %path.display(), "Dataset is empty");
            }
            let pool = WorkerPool::new(workers);
            info!(
                path = %path.display(),
                lines = snapshot.len(),
                workers = pool.workers(),
                "Dataset cached in memory"
            );
            Ok(Dataset::Cached {
                snapshot: Arc::new(snapshot),
                pool,
            })
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Dataset::Cached { .. } => "cached",
            Dataset::Reread { .. } => "reread",
        }
    }

    /// Whether some line of the dataset equals `query` exactly.
    pub async fn contains(&self, query: &str) -> Result<bool, DatasetError> {
        match self {
            Dataset::Cached { snapshot, pool } => {
                let snapshot = Arc::clone(snapshot);
                let query = query.to_string();
                Ok(pool.run(move || snapshot.contains(&query)).await?)
            }
            Dataset::Reread { path } => scan_file(path, query).await,
        }
    }
}

/// Stream `path` line by line looking for `query`.
async fn scan_file(path: &Path, query: &str) -> Result<bool, DatasetError> {
    let file = File::open(path)
        .await
        .map_err(|e| DatasetError::Open(path.to_path_buf(), e))?;
    let mut lines = BufReader::new(file).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| DatasetError::Read(path.to_path_buf(), e))?
    {
        if line.trim() == query {
            return Ok(true);
        }
    }

    trace!(query, "Reached end of dataset");
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "6;0;1;26;0;7;3;0;\n25;0;23;16;0;19;3;0;\n";

    fn dataset_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    fn open_both(file: &NamedTempFile) -> [Dataset; 2] {
        [
            Dataset::open(file.path(), false, 2).unwrap(),
            Dataset::open(file.path(), true, 2).unwrap(),
        ]
    }

    #[test]
    fn test_snapshot_trims_lines() {
        let snapshot = Snapshot::from_text("  alpha \r\nbeta\t\n\ngamma");
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.contains("alpha"));
        assert!(snapshot.contains("beta"));
        assert!(snapshot.contains(""));
        assert!(snapshot.contains("gamma"));
        assert!(!snapshot.contains("delta"));
    }

    #[tokio::test]
    async fn test_sample_in_both_modes() {
        let file = dataset_file(SAMPLE.as_bytes());

        for dataset in open_both(&file) {
            let mode = dataset.mode();
            assert!(dataset.contains("6;0;1;26;0;7;3;0;").await.unwrap(), "{mode}");
            assert!(dataset.contains("25;0;23;16;0;19;3;0;").await.unwrap(), "{mode}");
            assert!(!dataset.contains("nope").await.unwrap(), "{mode}");
            assert!(!dataset.contains("").await.unwrap(), "{mode}");
            // Partial lines never match
            assert!(!dataset.contains("6;0;1;").await.unwrap(), "{mode}");
        }
    }

    #[tokio::test]
    async fn test_blank_line_matches_empty_query() {
        let file = dataset_file(b"first\n   \nlast\n");

        for dataset in open_both(&file) {
            assert!(dataset.contains("").await.unwrap(), "{}", dataset.mode());
        }
    }

    #[tokio::test]
    async fn test_whitespace_around_lines_is_ignored() {
        let file = dataset_file(b"  padded line \t\r\nother\n");

        for dataset in open_both(&file) {
            assert!(dataset.contains("padded line").await.unwrap(), "{}", dataset.mode());
        }
    }

    #[tokio::test]
    async fn test_cached_snapshot_ignores_file_changes() {
        let mut file = dataset_file(SAMPLE.as_bytes());
        let dataset = Dataset::open(file.path(), false, 2).unwrap();

        file.write_all(b"added-later\n").unwrap();
        file.flush().unwrap();

        assert!(!dataset.contains("added-later").await.unwrap());
        assert!(dataset.contains("6;0;1;26;0;7;3;0;").await.unwrap());
    }

    #[tokio::test]
    async fn test_reread_sees_file_changes() {
        let mut file = dataset_file(SAMPLE.as_bytes());
        let dataset = Dataset::open(file.path(), true, 2).unwrap();

        assert!(!dataset.contains("added-later").await.unwrap());

        file.write_all(b"added-later\n").unwrap();
        file.flush().unwrap();

        assert!(dataset.contains("added-later").await.unwrap());
    }

    #[tokio::test]
    async fn test_reread_reports_deleted_file() {
        let file = dataset_file(SAMPLE.as_bytes());
        let dataset = Dataset::open(file.path(), true, 2).unwrap();
        drop(file);

        let result = dataset.contains("nope").await;
        assert!(matches!(result, Err(DatasetError::Open(_, _))));
    }

    #[tokio::test]
    async fn test_reread_invalid_utf8_is_read_error() {
        let file = dataset_file(b"fine\n\xff\xfe\n");
        let dataset = Dataset::open(file.path(), true, 2).unwrap();

        // The match is found before the bad line is reached
        assert!(dataset.contains("fine").await.unwrap());

        let result = dataset.contains("missing").await;
        assert!(matches!(result, Err(DatasetError::Read(_, _))));
    }

    #[test]
    fn test_cached_invalid_utf8_fails_open() {
        let file = dataset_file(b"fine\n\xff\xfe\n");
        let result = Dataset::open(file.path(), false, 2);
        assert!(matches!(result, Err(DatasetError::Read(_, _))));
    }

    #[test]
    fn test_missing_file_fails_open() {
        let path = Path::new("/nonexistent/dataset.txt");
        assert!(matches!(
            Dataset::open(path, false, 2),
            Err(DatasetError::Open(_, _))
        ));
        assert!(matches!(
            Dataset::open(path, true, 2),
            Err(DatasetError::Open(_, _))
        ));
    }

    #[tokio::test]
    async fn test_repeated_query_is_stable() {
        let file = dataset_file(SAMPLE.as_bytes());

        for dataset in open_both(&file) {
            let first = dataset.contains("25;0;23;16;0;19;3;0;").await.unwrap();
            let second = dataset.contains("25;0;23;16;0;19;3;0;").await.unwrap();
            assert_eq!(first, second);
        }
    }
}
