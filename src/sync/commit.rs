//! The commit image: a local JSON record of what the last successful
//! deployment placed on the remote.
//!
//! The image bounds remote I/O during a diff. Only files listed in the
//! latest commit are fingerprinted remotely, so a sync costs O(last commit)
//! remote reads instead of a full remote tree walk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::ControlError;

/// Commit id reserved for the pre-first-deploy sentinel.
const SENTINEL_ID: u64 = 0;

/// One recorded deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitEntry {
    pub commit_date: String,
    pub files_in_commit: Vec<String>,
}

/// Per-module commit history, persisted beside the local module tree.
#[derive(Debug, Clone)]
pub struct CommitImage {
    path: PathBuf,
    commits: BTreeMap<u64, CommitEntry>,
}

impl CommitImage {
    /// File name of the image for a module, always excluded from sync.
    pub fn file_name(module: &str) -> String {
        config::commit_image_name(module)
    }

    /// Loads the image for a module, or initializes a fresh one holding
    /// only the sentinel commit.
    pub fn load_or_init(module_dir: &Path, module: &str) -> Result<Self, ControlError> {
        let path = module_dir.join(Self::file_name(module));
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let commits: BTreeMap<u64, CommitEntry> = serde_json::from_str(&raw)
                .map_err(|err| ControlError::CommitImage(path.clone(), err))?;
            return Ok(Self { path, commits });
        }
        let mut commits = BTreeMap::new();
        commits.insert(
            SENTINEL_ID,
            CommitEntry {
                commit_date: Utc::now().to_rfc3339(),
                files_in_commit: Vec::new(),
            },
        );
        Ok(Self { path, commits })
    }

    /// Files the latest commit claims are on the remote. Empty before the
    /// first real deployment.
    pub fn latest_files(&self) -> &[String] {
        self.commits
            .last_key_value()
            .map(|(_, entry)| entry.files_in_commit.as_slice())
            .unwrap_or(&[])
    }

    /// Appends a commit describing `files` and rewrites the image on disk.
    ///
    /// The sentinel is dropped on the first real commit. The rewrite goes
    /// through a temp file and a rename so a crash never leaves a torn
    /// image behind.
    pub fn record(&mut self, files: Vec<String>) -> Result<u64, ControlError> {
        self.commits.remove(&SENTINEL_ID);
        let next_id = self
            .commits
            .last_key_value()
            .map(|(id, _)| id + 1)
            .unwrap_or(1);
        self.commits.insert(
            next_id,
            CommitEntry {
                commit_date: Utc::now().to_rfc3339(),
                files_in_commit: files,
            },
        );
        self.persist()?;
        Ok(next_id)
    }

    fn persist(&self) -> Result<(), ControlError> {
        let serialized = serde_json::to_string_pretty(&self.commits)
            .map_err(|err| ControlError::CommitImage(self.path.clone(), err))?;
        let staged = self.path.with_extension("json.tmp");
        std::fs::write(&staged, serialized)?;
        std::fs::rename(&staged, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn ids(&self) -> Vec<u64> {
        self.commits.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_image_holds_only_the_sentinel() {
        let dir = tempdir().expect("tempdir");
        let image = CommitImage::load_or_init(dir.path(), "jobx").expect("init");
        assert_eq!(image.ids(), vec![0]);
        assert!(image.latest_files().is_empty());
    }

    #[test]
    fn first_commit_replaces_the_sentinel() {
        let dir = tempdir().expect("tempdir");
        let mut image = CommitImage::load_or_init(dir.path(), "jobx").expect("init");
        let id = image
            .record(vec!["run.sh".to_string(), "src/a.py".to_string()])
            .expect("record");
        assert_eq!(id, 1);
        assert_eq!(image.ids(), vec![1]);
        assert_eq!(image.latest_files(), ["run.sh", "src/a.py"]);
    }

    #[test]
    fn persisted_image_round_trips() {
        let dir = tempdir().expect("tempdir");
        let mut image = CommitImage::load_or_init(dir.path(), "jobx").expect("init");
        image.record(vec!["run.sh".to_string()]).expect("first");
        image
            .record(vec!["run.sh".to_string(), "lib/b.py".to_string()])
            .expect("second");

        let reloaded = CommitImage::load_or_init(dir.path(), "jobx").expect("reload");
        assert_eq!(reloaded.ids(), vec![1, 2]);
        assert_eq!(reloaded.latest_files(), ["run.sh", "lib/b.py"]);
    }

    #[test]
    fn ids_grow_monotonically_past_nine() {
        // Numeric ids must not fall back to lexicographic ordering once
        // they reach double digits.
        let dir = tempdir().expect("tempdir");
        let mut image = CommitImage::load_or_init(dir.path(), "jobx").expect("init");
        for i in 0..11 {
            image.record(vec![format!("f{i}")]).expect("record");
        }
        assert_eq!(image.latest_files(), ["f10"]);
        let reloaded = CommitImage::load_or_init(dir.path(), "jobx").expect("reload");
        assert_eq!(reloaded.ids().last().copied(), Some(11));
    }

    #[test]
    fn corrupt_image_is_an_integrity_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(CommitImage::file_name("jobx"));
        std::fs::write(&path, "{not json").expect("write");
        let err = CommitImage::load_or_init(dir.path(), "jobx").expect_err("corrupt");
        assert!(matches!(err, ControlError::CommitImage(..)));
    }
}
