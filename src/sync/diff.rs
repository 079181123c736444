//! Change classification between a local module tree and its last known
//! remote deployment.
//!
//! Every path lands in exactly one of five buckets. Shared paths with
//! differing hashes are updates; content that reappears elsewhere is a
//! rename when it stayed in its directory and a move when it did not; the
//! leftovers are new on one side and deleted on the other.

use indexmap::IndexMap;

use crate::config::REBUILD_SENTINEL;

/// A file whose content survived but whose path changed.
///
/// `source` is the path in the local tree, `target` the path the remote
/// currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatedFile {
    pub source: String,
    pub target: String,
}

/// Result of a module diff, partitioned into disjoint buckets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub new: Vec<String>,
    pub updated: Vec<String>,
    pub moved: Vec<RelocatedFile>,
    pub renamed: Vec<RelocatedFile>,
    pub deleted: Vec<String>,
}

/// Parent directory of a slash-separated relative path, "" for top level.
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

impl ChangeSet {
    /// Classifies the difference between local and remote fingerprint maps.
    ///
    /// Both maps go from relative path to content hash. Iteration order is
    /// the maps' insertion order, which makes the first-match pairing of
    /// relocated files deterministic.
    pub fn classify(local: &IndexMap<String, String>, remote: &IndexMap<String, String>) -> Self {
        let mut changes = ChangeSet::default();
        let mut remote_pool = remote.clone();
        let mut local_pool: IndexMap<String, String> = IndexMap::new();

        for (path, hash) in local {
            match remote_pool.shift_remove(path) {
                Some(remote_hash) => {
                    if *hash != remote_hash {
                        changes.updated.push(path.clone());
                    }
                }
                None => {
                    local_pool.insert(path.clone(), hash.clone());
                }
            }
        }

        // Pair equal content across the leftover pools: same directory is a
        // rename, anything else a move. First match wins.
        let mut paired: Vec<(String, String)> = Vec::new();
        for (source, source_hash) in &local_pool {
            for (target, target_hash) in &remote_pool {
                if target_hash == source_hash && !paired.iter().any(|(_, t)| t == target) {
                    paired.push((source.clone(), target.clone()));
                    break;
                }
            }
        }
        for (source, target) in paired {
            local_pool.shift_remove(&source);
            remote_pool.shift_remove(&target);
            let relocated = RelocatedFile {
                source: source.clone(),
                target: target.clone(),
            };
            if parent_dir(&source) == parent_dir(&target) {
                changes.renamed.push(relocated);
            } else {
                changes.moved.push(relocated);
            }
        }

        changes.new = local_pool.into_keys().collect();
        changes.deleted = remote_pool.into_keys().collect();
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty()
            && self.updated.is_empty()
            && self.moved.is_empty()
            && self.renamed.is_empty()
            && self.deleted.is_empty()
    }

    /// Whether the rebuild trigger file is among the new or updated files.
    pub fn requires_rebuild(&self) -> bool {
        self.new
            .iter()
            .chain(self.updated.iter())
            .any(|path| path == REBUILD_SENTINEL)
    }
}
