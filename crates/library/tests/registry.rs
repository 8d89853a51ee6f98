use stacks_library::error::ErrorKind;
use stacks_library::{
    Library, LibraryOptions, Location, LocationId, LocationOptions, Mode, PlainLibrary, REGISTRY_CACHE_SIZE, RepositoryId,
};
use std::sync::Arc;
use tempfile::TempDir;

fn library(dir: &TempDir, registry_cache: usize) -> PlainLibrary {
    let options = LibraryOptions {
        location: LocationOptions {
            transactional: true,
            temporary_root: dir.path().join("transactions"),
            object_cache: 64,
        },
        registry_cache,
    };
    let mut library = PlainLibrary::new("test", options);
    for location in ["foo-bar", "foo-qux"] {
        library.add_location(location, dir.path().join(location)).unwrap();
    }
    library
}

#[tokio::test]
async fn transactional_registry_always_caches() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(&dir, 0);
    assert_eq!(library.registry().capacity(), REGISTRY_CACHE_SIZE);

    let id = RepositoryId::from_endpoint("github.com/foo/bar").unwrap();
    let location = library.location(&LocationId::from("foo-bar")).await.unwrap();
    location.init(&id).await.unwrap().commit().await.unwrap();

    // While a transaction is open the location is reused.
    let first = library.location(&LocationId::from("foo-bar")).await.unwrap();
    let repository = first.get(&id, Mode::ReadWrite).await.unwrap();
    let second = library.location(&LocationId::from("foo-bar")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    repository.close().unwrap();

    // Same again, ending with a commit of nothing.
    let repository = first.get(&id, Mode::ReadWrite).await.unwrap();
    let second = library.location(&LocationId::from("foo-bar")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let err = repository.commit().await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::EmptyCommit));
}

#[tokio::test]
async fn capacity_one_evicts() {
    let dir = tempfile::tempdir().unwrap();
    let library = library(&dir, 1);
    assert_eq!(library.registry().capacity(), 1);

    let first = library.location(&LocationId::from("foo-bar")).await.unwrap();
    let second = library.location(&LocationId::from("foo-bar")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    library.location(&LocationId::from("foo-qux")).await.unwrap();
    let third = library.location(&LocationId::from("foo-bar")).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(library.registry().len(), 1);
}

#[tokio::test]
async fn concurrent_lookups_share_one_instance() {
    let dir = tempfile::tempdir().unwrap();
    let library = Arc::new(library(&dir, 0));
    let lookups = (0..8).map(|_| {
        let library = library.clone();
        async move { library.location(&LocationId::from("foo-bar")).await.unwrap() }
    });
    let locations = futures::future::join_all(lookups).await;
    assert!(locations.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}
