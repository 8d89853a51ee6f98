use stacks_library::error::ErrorKind;
use stacks_library::{Library, LibraryOptions, Location, LocationOptions, Mode, ObjectId, PlainLibrary, RepositoryId};
use std::path::Path;
use tempfile::TempDir;

fn library(dir: &TempDir, transactional: bool) -> PlainLibrary {
    let options = LibraryOptions {
        location: LocationOptions {
            transactional,
            temporary_root: dir.path().join("transactions"),
            object_cache: 64,
        },
        registry_cache: 0,
    };
    let mut library = PlainLibrary::new("test", options);
    library.add_location("foo-bar", dir.path().join("foo-bar")).unwrap();
    library
}

fn id() -> RepositoryId {
    RepositoryId::from_endpoint("https://github.com/foo/bar").unwrap()
}

fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                files.push((relative, std::fs::read(&path).unwrap()));
            }
        }
    }
    files.sort();
    files
}

/// A transactional library holding one committed repository with one object.
async fn seeded(dir: &TempDir) -> (PlainLibrary, ObjectId) {
    let library = library(dir, true);
    let repository = library.init(&id()).await.unwrap();
    let seed = repository.store().write_object(b"seed").await.unwrap();
    repository.store().set_reference("main", seed).await.unwrap();
    repository.commit().await.unwrap();
    (library, seed)
}

#[tokio::test]
async fn commit_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (library, seed) = seeded(&dir).await;

    let repository = library.get(&id(), Mode::ReadWrite).await.unwrap();
    let temporary = repository.temporary_path().unwrap().to_path_buf();
    let blob = repository.store().write_object(b"committed").await.unwrap();
    repository.store().set_reference("main", blob).await.unwrap();
    repository.store().delete_reference("main").await.unwrap();
    repository.store().set_reference("next", blob).await.unwrap();
    let summary = repository.commit().await.unwrap();
    assert_eq!(summary.deleted, 1);
    assert!(!temporary.exists());

    let fresh = library.get(&id(), Mode::ReadWrite).await.unwrap();
    assert!(fresh.store().has_object(&seed).await.unwrap());
    assert_eq!(fresh.store().object(&blob).await.unwrap().as_deref(), Some(&b"committed"[..]));
    assert_eq!(fresh.store().reference("main").await.unwrap(), None);
    assert_eq!(fresh.store().reference("next").await.unwrap(), Some(blob));
    fresh.close().unwrap();
}

#[tokio::test]
async fn close_discards_everything() {
    let dir = tempfile::tempdir().unwrap();
    let (library, seed) = seeded(&dir).await;
    let before = snapshot(&dir.path().join("foo-bar"));

    let repository = library.get(&id(), Mode::TransactionalReadWrite).await.unwrap();
    let temporary = repository.temporary_path().unwrap().to_path_buf();
    let discarded = repository.store().write_object(b"discarded").await.unwrap();
    repository.store().delete_reference("main").await.unwrap();
    // Visible inside the session only.
    assert!(repository.store().has_object(&discarded).await.unwrap());
    assert_eq!(repository.store().reference("main").await.unwrap(), None);
    repository.close().unwrap();

    assert!(!temporary.exists());
    assert_eq!(snapshot(&dir.path().join("foo-bar")), before);
    let fresh = library.get(&id(), Mode::ReadOnly).await.unwrap();
    assert!(!fresh.store().has_object(&discarded).await.unwrap());
    assert_eq!(fresh.store().reference("main").await.unwrap(), Some(seed));
}

#[tokio::test]
async fn drop_discards_like_close() {
    let dir = tempfile::tempdir().unwrap();
    let (library, _) = seeded(&dir).await;
    let before = snapshot(&dir.path().join("foo-bar"));

    let repository = library.get(&id(), Mode::ReadWrite).await.unwrap();
    let temporary = repository.temporary_path().unwrap().to_path_buf();
    repository.store().write_object(b"dropped").await.unwrap();
    drop(repository);

    assert!(!temporary.exists());
    assert_eq!(snapshot(&dir.path().join("foo-bar")), before);
}

#[tokio::test]
async fn discarded_writes_never_reach_the_shared_cache() {
    let dir = tempfile::tempdir().unwrap();
    let (library, _) = seeded(&dir).await;

    let repository = library.get(&id(), Mode::ReadWrite).await.unwrap();
    let discarded = repository.store().write_object(b"discarded").await.unwrap();
    repository.close().unwrap();

    let location = library.location(&"foo-bar".into()).await.unwrap();
    let reader = location.get(&id(), Mode::ReadOnly).await.unwrap();
    assert_eq!(reader.store().object(&discarded).await.unwrap(), None);
}

#[tokio::test]
async fn empty_commit() {
    let dir = tempfile::tempdir().unwrap();
    let (library, _) = seeded(&dir).await;
    let repository = library.get(&id(), Mode::ReadWrite).await.unwrap();
    let temporary = repository.temporary_path().unwrap().to_path_buf();
    let err = repository.commit().await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::EmptyCommit));
    assert!(!temporary.exists());
}

#[tokio::test]
async fn commit_requires_transactional_deployment() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(&dir, false);
    let repository = library.init(&id()).await.unwrap();
    assert!(repository.temporary_path().is_none());
    // Writes are durable straight away.
    let blob = repository.store().write_object(b"durable").await.unwrap();
    let err = repository.commit().await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::NonTransactional));

    let fresh = library.get(&id(), Mode::ReadOnly).await.unwrap();
    assert!(fresh.store().has_object(&blob).await.unwrap());
}

#[tokio::test]
async fn read_only_handle_cannot_commit() {
    let dir = tempfile::tempdir().unwrap();
    let (library, _) = seeded(&dir).await;
    let repository = library.get(&id(), Mode::ReadOnly).await.unwrap();
    assert!(repository.temporary_path().is_none());
    let err = repository.store().write_object(b"nope").await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::ReadOnlyViolation(_)));
    let err = repository.commit().await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::ReadOnlyViolation(_)));
}

#[tokio::test]
async fn uncommitted_init_leaves_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(&dir, true);
    let repository = library.init(&id()).await.unwrap();
    assert!(library.has(&id()).await.unwrap().is_none());
    repository.close().unwrap();
    assert!(library.has(&id()).await.unwrap().is_none());
    assert!(snapshot(&dir.path().join("foo-bar")).is_empty());
}
