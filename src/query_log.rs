//! Durable log of attempted search query keys.
//!
//! One key per line, append-only. A batch run skips every query whose key is
//! already present, which makes re-running an interrupted batch cheap.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

#[derive(Debug)]
pub struct ProcessedQueryLog {
    path: PathBuf,
    keys: HashSet<String>,
}

impl ProcessedQueryLog {
    /// Read the log at `path`. A missing file is an empty log; its parent
    /// directory is created so later appends succeed.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let keys = match fs::read_to_string(path).await {
            Ok(raw) => raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e),
        };
        info!(count = keys.len(), "Loaded processed query keys");

        Ok(Self {
            path: path.to_path_buf(),
            keys,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Append `key` to the file and the in-memory set. Keys already present
    /// are not written twice.
    pub async fn record(&mut self, key: &str) -> io::Result<()> {
        if self.keys.contains(key) {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{key}\n").as_bytes()).await?;
        file.flush().await?;
        self.keys.insert(key.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = ProcessedQueryLog::load(&dir.path().join("logs").join("q.log"))
            .await
            .unwrap();
        assert_eq!(log.len(), 0);
    }

    #[tokio::test]
    async fn test_recorded_keys_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.log");
        let key = "moneycontrol.com|'Infosys' news 2025|05/01/2025|05/07/2025";

        let mut log = ProcessedQueryLog::load(&path).await.unwrap();
        log.record(key).await.unwrap();
        log.record(key).await.unwrap();
        assert!(log.contains(key));

        let reloaded = ProcessedQueryLog::load(&path).await.unwrap();
        assert!(reloaded.contains(key));
        assert_eq!(reloaded.len(), 1);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
    }
}
