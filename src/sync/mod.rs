//! Differential module synchronization.
//!
//! A sync makes the remote copy of a module structurally identical to the
//! local directory with the minimum of transfers: content fingerprints on
//! both sides feed a five-way change classification, the classified changes
//! are applied over SFTP, and a commit image persists what the remote holds
//! so the next diff only reads the files it has to.
//!
//! # Main Components
//!
//! - [`sync_module`] - One full sync pass against a connected host
//! - [`ChangeSet`] - The classified difference (`diff`)
//! - [`CommitImage`] - Persistent record of the last applied state (`commit`)
//! - [`ApplyReport`] - What the apply pass actually changed (`apply`)

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use colored::Colorize;
use indexmap::IndexMap;
use log::{debug, info};
use russh_sftp::client::SftpSession;

use crate::config;
use crate::error::ControlError;
use crate::logging::scribe;

pub use apply::{apply, ensure_dir, ApplyFailure, ApplyReport};
pub use commit::{CommitEntry, CommitImage};
pub use diff::{parent_dir, ChangeSet, RelocatedFile};
pub use fingerprint::digest_reader;

mod apply;
mod commit;
mod diff;
mod fingerprint;

/// Result of one sync pass.
pub struct SyncOutcome {
    /// True when the rebuild trigger file was among the new or updated
    /// files of this pass.
    pub should_rebuild: bool,
    pub changes: ChangeSet,
    pub report: ApplyReport,
}

/// Synchronizes a local module directory onto a connected host.
///
/// Ensures the remote layout exists, diffs against the last known remote
/// state, applies the classified changes minimally and records the new
/// state in the commit image. Per-file transfer failures do not abort the
/// pass; they are summarized and kept out of the recorded state.
pub async fn sync_module(
    sftp: &SftpSession,
    module_dir: &Path,
    verbose: bool,
) -> Result<SyncOutcome, ControlError> {
    let module = module_name(module_dir)?;
    let root = format!("{}/{}", config::MODULES_ROOT, module);
    ensure_dir(sftp, config::MODULES_ROOT).await;
    ensure_dir(sftp, &root).await;

    let mut image = CommitImage::load_or_init(module_dir, &module)?;
    let local = local_fingerprints(module_dir, &CommitImage::file_name(&module)).await?;
    let remote = remote_fingerprints(sftp, &root, image.latest_files()).await;

    let changes = ChangeSet::classify(&local, &remote);
    let should_rebuild = changes.requires_rebuild();
    if changes.is_empty() {
        if verbose {
            scribe("No changes detected");
        }
        return Ok(SyncOutcome {
            should_rebuild,
            changes,
            report: ApplyReport {
                remote_files: remote.into_keys().collect(),
                failures: Vec::new(),
            },
        });
    }

    let remote_present: Vec<String> = remote.keys().cloned().collect();
    let report = apply(sftp, &root, module_dir, &changes, &remote_present).await;
    let commit_id = image.record(report.remote_files.clone())?;
    info!("module '{module}' committed as #{commit_id}");

    if verbose {
        print_changes(&changes);
    }
    if !report.is_clean() {
        scribe(&format!(
            "{} file(s) failed to apply:",
            report.failures.len()
        ));
        for failure in &report.failures {
            println!(
                "{}",
                format!("\t- {} ({}): {}", failure.path, failure.action, failure.cause).red()
            );
        }
    }

    Ok(SyncOutcome {
        should_rebuild,
        changes,
        report,
    })
}

/// Module name: the basename of the local module directory.
pub fn module_name(module_dir: &Path) -> Result<String, ControlError> {
    if !module_dir.is_dir() {
        return Err(ControlError::ModuleMissing(module_dir.to_path_buf()));
    }
    module_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ControlError::ModuleMissing(module_dir.to_path_buf()))
}

/// Fingerprints the local module tree, breadth-first, excluding the commit
/// image file.
async fn local_fingerprints(
    module_dir: &Path,
    exclude: &str,
) -> Result<IndexMap<String, String>, ControlError> {
    let mut files = IndexMap::new();
    let mut folders: VecDeque<PathBuf> = VecDeque::from([module_dir.to_path_buf()]);
    while let Some(current) = folders.pop_front() {
        let mut entries: Vec<_> = std::fs::read_dir(&current)?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());
        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                folders.push_back(path);
                continue;
            }
            let rel = path
                .strip_prefix(module_dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            if rel == exclude {
                continue;
            }
            let mut file = tokio::fs::File::open(&path).await?;
            let hash = digest_reader(&mut file).await?;
            files.insert(rel, hash);
        }
    }
    Ok(files)
}

/// Fingerprints the remote side, reading only the files the latest commit
/// lists. Files that vanished remotely simply drop out of the map and will
/// be classified as new.
async fn remote_fingerprints(
    sftp: &SftpSession,
    root: &str,
    committed: &[String],
) -> IndexMap<String, String> {
    let mut files = IndexMap::new();
    for rel in committed {
        let full = format!("{root}/{rel}");
        let mut file = match sftp.open(full.as_str()).await {
            Ok(file) => file,
            Err(err) => {
                debug!("{full} not readable remotely: {err}");
                continue;
            }
        };
        match digest_reader(&mut file).await {
            Ok(hash) => {
                files.insert(rel.clone(), hash);
            }
            Err(err) => debug!("{full} hash failed: {err}"),
        }
    }
    files
}

/// Prints the classified changes, colored by kind.
fn print_changes(changes: &ChangeSet) {
    scribe("Changes deployed in module:");
    if !changes.new.is_empty() || !changes.updated.is_empty() {
        println!("NEW/UPDATED FILES:");
        for file in changes.new.iter().chain(changes.updated.iter()) {
            println!("{}", format!("\t- {file}").green());
        }
    }
    if !changes.moved.is_empty() || !changes.renamed.is_empty() {
        println!("MOVED/RENAMED FILES:");
        for relocation in changes.moved.iter().chain(changes.renamed.iter()) {
            println!(
                "{}",
                format!("\t- {} -> {}", relocation.target, relocation.source).yellow()
            );
        }
    }
    if !changes.deleted.is_empty() {
        println!("DELETED FILES:");
        for file in &changes.deleted {
            println!("{}", format!("\t- {file}").red());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn local_fingerprints_walk_the_tree_and_skip_the_image() {
        let dir = tempdir().expect("tempdir");
        let module = dir.path().join("jobx");
        std::fs::create_dir_all(module.join("src")).expect("mkdir");
        std::fs::write(module.join("run.sh"), "echo hi\n").expect("write");
        std::fs::write(module.join("src/a.py"), "print(1)\n").expect("write");
        std::fs::write(module.join(".jobx_commit_image.json"), "{}").expect("write");

        let files = local_fingerprints(&module, ".jobx_commit_image.json")
            .await
            .expect("walk");
        let mut paths: Vec<&str> = files.keys().map(String::as_str).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["run.sh", "src/a.py"]);
    }

    #[test]
    fn module_name_is_the_directory_basename() {
        let dir = tempdir().expect("tempdir");
        let module = dir.path().join("py_bench");
        std::fs::create_dir(&module).expect("mkdir");
        assert_eq!(module_name(&module).expect("name"), "py_bench");
    }

    #[test]
    fn missing_module_directory_is_an_error() {
        let err = module_name(Path::new("/nonexistent/nowhere")).expect_err("missing");
        assert!(matches!(err, ControlError::ModuleMissing(_)));
    }
}
