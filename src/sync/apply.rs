//! Applies a classified change set to the remote module directory.
//!
//! Uploads create missing directories on demand, relocations are server-side
//! renames, and deletions are followed by an upward sweep that removes
//! directories the change set emptied. Individual failures never abort the
//! apply; they are accumulated and reported, and the reconstructed remote
//! state only reflects operations that actually succeeded.

use std::collections::{BTreeSet, VecDeque};
use std::path::Path;

use log::debug;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;

use super::diff::{parent_dir, ChangeSet};
use crate::error::ControlError;

/// One operation that did not land.
#[derive(Debug, Clone)]
pub struct ApplyFailure {
    pub path: String,
    pub action: &'static str,
    pub cause: String,
}

/// Outcome of applying a change set.
#[derive(Debug, Default, Clone)]
pub struct ApplyReport {
    /// Files the remote holds after the apply, successful operations only.
    pub remote_files: Vec<String>,
    pub failures: Vec<ApplyFailure>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Creates a remote directory, tolerating one that already exists.
pub async fn ensure_dir(sftp: &SftpSession, path: &str) {
    if let Err(err) = sftp.create_dir(path).await {
        debug!("mkdir {path}: {err}");
    }
}

/// Creates every missing ancestor directory of a relative file path.
async fn ensure_parents(sftp: &SftpSession, root: &str, rel_path: &str) {
    let parent = parent_dir(rel_path);
    if parent.is_empty() {
        return;
    }
    let mut current = String::new();
    for segment in parent.split('/') {
        if current.is_empty() {
            current = segment.to_string();
        } else {
            current = format!("{current}/{segment}");
        }
        ensure_dir(sftp, &format!("{root}/{current}")).await;
    }
}

async fn upload(sftp: &SftpSession, local_path: &Path, remote_path: &str) -> Result<(), ControlError> {
    let mut local = tokio::fs::File::open(local_path).await?;
    let mut remote = sftp.create(remote_path).await?;
    tokio::io::copy(&mut local, &mut remote).await?;
    remote.shutdown().await?;
    Ok(())
}

/// Applies `changes` under `root`, returning what actually happened.
///
/// `remote_present` is the set of files the diff verified on the remote;
/// the reconstructed state in the report starts from it.
pub async fn apply(
    sftp: &SftpSession,
    root: &str,
    local_dir: &Path,
    changes: &ChangeSet,
    remote_present: &[String],
) -> ApplyReport {
    let mut state: BTreeSet<String> = remote_present.iter().cloned().collect();
    let mut failures = Vec::new();
    let mut sweep_seeds: Vec<String> = Vec::new();

    // Uploads first, so relocations and deletions never race a directory
    // the upload pass is still creating.
    for rel in changes.new.iter().chain(changes.updated.iter()) {
        let local_path = local_dir.join(rel);
        let remote_path = format!("{root}/{rel}");
        let mut result = upload(sftp, &local_path, &remote_path).await;
        if result.is_err() {
            // Most first failures are a missing directory; create the
            // chain and retry once.
            ensure_parents(sftp, root, rel).await;
            result = upload(sftp, &local_path, &remote_path).await;
        }
        match result {
            Ok(()) => {
                state.insert(rel.clone());
            }
            Err(err) => failures.push(ApplyFailure {
                path: rel.clone(),
                action: "upload",
                cause: err.to_string(),
            }),
        }
    }

    for relocation in &changes.moved {
        let old = format!("{root}/{}", relocation.target);
        let new = format!("{root}/{}", relocation.source);
        let mut result = sftp.rename(old.as_str(), new.as_str()).await;
        if result.is_err() {
            ensure_parents(sftp, root, &relocation.source).await;
            result = sftp.rename(old.as_str(), new.as_str()).await;
        }
        match result {
            Ok(()) => {
                state.remove(&relocation.target);
                state.insert(relocation.source.clone());
                sweep_seeds.push(relocation.target.clone());
            }
            Err(err) => failures.push(ApplyFailure {
                path: relocation.target.clone(),
                action: "move",
                cause: err.to_string(),
            }),
        }
    }

    for relocation in &changes.renamed {
        let old = format!("{root}/{}", relocation.target);
        let new = format!("{root}/{}", relocation.source);
        match sftp.rename(old.as_str(), new.as_str()).await {
            Ok(()) => {
                state.remove(&relocation.target);
                state.insert(relocation.source.clone());
            }
            Err(err) => failures.push(ApplyFailure {
                path: relocation.target.clone(),
                action: "rename",
                cause: err.to_string(),
            }),
        }
    }

    for rel in &changes.deleted {
        let remote_path = format!("{root}/{rel}");
        match sftp.remove_file(remote_path.as_str()).await {
            Ok(()) => {
                state.remove(rel);
                sweep_seeds.push(rel.clone());
            }
            Err(err) => failures.push(ApplyFailure {
                path: rel.clone(),
                action: "delete",
                cause: err.to_string(),
            }),
        }
    }

    sweep_empty_dirs(sftp, root, sweep_seeds).await;

    ApplyReport {
        remote_files: state.into_iter().collect(),
        failures,
    }
}

/// Removes directories emptied by moves and deletions, walking upward until
/// a non-empty parent stops the climb.
async fn sweep_empty_dirs(sftp: &SftpSession, root: &str, seeds: Vec<String>) {
    let mut queue: VecDeque<String> = VecDeque::new();
    for seed in seeds {
        if !queue.contains(&seed) {
            queue.push_back(seed);
        }
    }
    while let Some(path) = queue.pop_front() {
        let parent = parent_dir(&path);
        if parent.is_empty() {
            // Never sweep the module root itself.
            continue;
        }
        let full = format!("{root}/{parent}");
        let occupied = match sftp.read_dir(full.as_str()).await {
            Ok(entries) => entries.count() > 0,
            Err(err) => {
                debug!("sweep skipping {full}: {err}");
                continue;
            }
        };
        if !occupied {
            if let Err(err) = sftp.remove_dir(full.as_str()).await {
                debug!("rmdir {full}: {err}");
                continue;
            }
            queue.push_back(parent.to_string());
        }
    }
}
