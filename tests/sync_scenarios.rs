//! Deployment scenarios exercised against the pure diff and commit layers.

use std::path::Path;

use indexmap::IndexMap;

use flotilla::sync::{digest_reader, ChangeSet, CommitImage, RelocatedFile};

async fn digest_file(path: &Path) -> String {
    let mut file = tokio::fs::File::open(path).await.expect("open fixture");
    digest_reader(&mut file).await.expect("digest fixture")
}

/// Fingerprints a set of (relative path, content) pairs written to disk, so
/// the maps entering the diff went through the real hashing path.
async fn fingerprints(dir: &Path, files: &[(&str, &str)]) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for (rel, content) in files {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("mkdir fixture");
        }
        std::fs::write(&path, content).expect("write fixture");
        map.insert(rel.to_string(), digest_file(&path).await);
    }
    map
}

#[tokio::test]
async fn cold_deploy_uploads_everything_and_triggers_build() {
    let dir = tempfile::tempdir().expect("tempdir");
    let local = fingerprints(
        dir.path(),
        &[
            ("run.sh", "bash main.py\n"),
            ("requirements.txt", "numpy\n"),
            ("src/a.py", "print('a')\n"),
        ],
    )
    .await;
    let remote = IndexMap::new();

    let changes = ChangeSet::classify(&local, &remote);
    assert_eq!(changes.new.len(), 3);
    assert!(changes.updated.is_empty());
    assert!(changes.moved.is_empty());
    assert!(changes.renamed.is_empty());
    assert!(changes.deleted.is_empty());
    assert!(changes.requires_rebuild());

    let mut image = CommitImage::load_or_init(dir.path(), "m").expect("image");
    assert!(image.latest_files().is_empty());
    let id = image
        .record(local.keys().cloned().collect())
        .expect("record");
    assert_eq!(id, 1);

    let reloaded = CommitImage::load_or_init(dir.path(), "m").expect("reload");
    let mut recorded = reloaded.latest_files().to_vec();
    recorded.sort_unstable();
    assert_eq!(recorded, vec!["requirements.txt", "run.sh", "src/a.py"]);
}

#[tokio::test]
async fn rename_with_identical_bytes_is_only_a_rename() {
    let dir = tempfile::tempdir().expect("tempdir");
    let old = dir.path().join("old");
    let remote = fingerprints(
        &old,
        &[("run.sh", "bash main.py\n"), ("src/a.py", "print('a')\n")],
    )
    .await;
    let new = dir.path().join("new");
    let local = fingerprints(
        &new,
        &[("run.sh", "bash main.py\n"), ("src/b.py", "print('a')\n")],
    )
    .await;

    let changes = ChangeSet::classify(&local, &remote);
    assert_eq!(
        changes.renamed,
        vec![RelocatedFile {
            source: "src/b.py".to_string(),
            target: "src/a.py".to_string(),
        }]
    );
    assert!(changes.new.is_empty());
    assert!(changes.updated.is_empty());
    assert!(changes.moved.is_empty());
    assert!(changes.deleted.is_empty());
    assert!(!changes.requires_rebuild());
}

#[tokio::test]
async fn moved_and_edited_file_degrades_to_new_plus_deleted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let old = dir.path().join("old");
    let remote = fingerprints(
        &old,
        &[("src/a.py", "print('a')\n")],
    )
    .await;
    let new = dir.path().join("new");
    let local = fingerprints(
        &new,
        &[("lib/a.py", "print('edited')\n")],
    )
    .await;

    let changes = ChangeSet::classify(&local, &remote);
    assert_eq!(changes.new, vec!["lib/a.py"]);
    assert_eq!(changes.deleted, vec!["src/a.py"]);
    assert!(changes.moved.is_empty());
    assert!(changes.renamed.is_empty());
}

#[tokio::test]
async fn editing_a_source_file_does_not_trigger_a_rebuild() {
    let dir = tempfile::tempdir().expect("tempdir");
    let old = dir.path().join("old");
    let remote = fingerprints(
        &old,
        &[
            ("requirements.txt", "numpy\n"),
            ("src/a.py", "print('a')\n"),
        ],
    )
    .await;
    let new = dir.path().join("new");
    let local = fingerprints(
        &new,
        &[
            ("requirements.txt", "numpy\n"),
            ("src/a.py", "print('changed')\n"),
        ],
    )
    .await;

    let changes = ChangeSet::classify(&local, &remote);
    assert_eq!(changes.updated, vec!["src/a.py"]);
    assert!(changes.new.is_empty());
    assert!(!changes.requires_rebuild());
}

#[tokio::test]
async fn unchanged_trees_produce_no_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let files = [
        ("run.sh", "bash main.py\n"),
        ("src/a.py", "print('a')\n"),
    ];
    let old = dir.path().join("old");
    let new = dir.path().join("new");
    let remote = fingerprints(&old, &files).await;
    let local = fingerprints(&new, &files).await;

    let changes = ChangeSet::classify(&local, &remote);
    assert!(changes.is_empty());
}
