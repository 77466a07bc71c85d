//! Snapshot engine behavior against SQLite and the in-memory blob store.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use common::TestApp;
use snapvault::blob::{
    BlobError, BlobStore, MemoryBlobStore, RemoveReport, UploadOptions, blob_key, content_hash,
};
use snapvault::config::ServerConfig;
use snapvault::error::Error;
use snapvault::server::AppState;
use snapvault::snapshot::{EntryKind, NewSnapshot, NewSnapshotFile};
use snapvault::store::Store;
use snapvault::types::SnapshotFilter;
use tokio::sync::Notify;

fn names(entries: &[snapvault::snapshot::TreeEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.name.as_str()).collect()
}

#[tokio::test]
async fn create_file_then_read_it_back() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");

    let outcome = app
        .mutator()
        .create_or_update_file(&ctx, "README.md", Bytes::from_static(b"hello"))
        .await
        .unwrap();

    let file = outcome.file.unwrap();
    assert_eq!(
        file.hash,
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(file.size, 5);
    assert_eq!(outcome.snapshot.title.as_deref(), Some("Create file: README.md"));
    assert_eq!(app.head(&project, "main"), Some(outcome.snapshot.id.clone()));

    let view = app
        .resolver()
        .get_blob(&project.id, Some("main"), "README.md")
        .await
        .unwrap();
    assert_eq!(view.content.unwrap().as_ref(), b"hello");
    assert!(view.message.is_none());
}

#[tokio::test]
async fn update_creates_new_snapshot_and_keeps_history() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");
    let mutator = app.mutator();

    let first = mutator
        .create_or_update_file(&ctx, "notes.txt", Bytes::from_static(b"v1"))
        .await
        .unwrap();
    let second = mutator
        .create_or_update_file(&ctx, "/notes.txt", Bytes::from_static(b"v2"))
        .await
        .unwrap();

    assert_ne!(first.snapshot.id, second.snapshot.id);
    assert_eq!(second.snapshot.title.as_deref(), Some("Update file: notes.txt"));

    let old_files = app.store.list_snapshot_files(&first.snapshot.id).unwrap();
    assert_eq!(old_files.len(), 1);
    assert_eq!(old_files[0].hash, content_hash(b"v1"));

    let new_files = app.store.list_snapshot_files(&second.snapshot.id).unwrap();
    assert_eq!(new_files.len(), 1);
    assert_eq!(new_files[0].hash, content_hash(b"v2"));

    // The overwritten content stays available to history.
    assert!(app.blobs.contains(&blob_key(&project.id, &content_hash(b"v1"))));

    let stats = app.store.get_project(&project.id).unwrap().unwrap().stats;
    assert_eq!(stats.snapshot_count, 2);
    assert_eq!(stats.file_count, 1);
    assert_eq!(stats.total_size_bytes, 2);
}

#[tokio::test]
async fn identical_content_shares_one_blob() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");
    let mutator = app.mutator();

    mutator
        .create_or_update_file(&ctx, "a.txt", Bytes::from_static(b"same"))
        .await
        .unwrap();
    mutator
        .create_or_update_file(&ctx, "b/c.txt", Bytes::from_static(b"same"))
        .await
        .unwrap();

    assert_eq!(app.blobs.len(), 1);
    assert!(app.blobs.contains(&blob_key(&project.id, &content_hash(b"same"))));
}

#[tokio::test]
async fn empty_project_has_empty_tree() {
    let app = TestApp::new();
    let (_, project) = app.seed();

    let entries = app.resolver().list_tree(&project.id, Some("main"), "").unwrap();
    assert!(entries.is_empty());

    let missing = app
        .resolver()
        .get_blob(&project.id, Some("main"), "README.md")
        .await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn folder_lifecycle() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");
    let mutator = app.mutator();
    let resolver = app.resolver();

    let created = mutator.create_folder(&ctx, "docs/").await.unwrap();
    assert_eq!(created.path, "docs");
    assert_eq!(created.snapshot.title.as_deref(), Some("Create folder: docs"));

    let root = resolver.list_tree(&project.id, Some("main"), "").unwrap();
    assert_eq!(names(&root), vec!["docs"]);
    assert_eq!(root[0].kind, EntryKind::Dir);

    let inside = resolver.list_tree(&project.id, Some("main"), "/docs/").unwrap();
    assert_eq!(names(&inside), vec![".gitkeep"]);
    assert_eq!(inside[0].size, Some(0));

    mutator
        .create_or_update_file(&ctx, "docs/guide.md", Bytes::from_static(b"# Guide"))
        .await
        .unwrap();
    mutator
        .create_or_update_file(&ctx, "docs.md", Bytes::from_static(b"sibling"))
        .await
        .unwrap();

    let deleted = mutator.delete_folder(&ctx, "docs").await.unwrap();
    assert_eq!(deleted.snapshot.file_count, 1);

    let root = resolver.list_tree(&project.id, Some("main"), "").unwrap();
    assert_eq!(names(&root), vec!["docs.md"]);
}

#[tokio::test]
async fn delete_folder_matches_whole_segments() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");
    let mutator = app.mutator();

    for path in ["a/b/one.txt", "a/b/c/two.txt", "a/bc/three.txt"] {
        mutator
            .create_or_update_file(&ctx, path, Bytes::from(path.to_string()))
            .await
            .unwrap();
    }

    let outcome = mutator.delete_folder(&ctx, "a/b").await.unwrap();
    let files = app.store.list_snapshot_files(&outcome.snapshot.id).unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["a/bc/three.txt"]);
}

#[tokio::test]
async fn deleting_missing_path_leaves_branch_untouched() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");
    let mutator = app.mutator();

    let no_history = mutator.delete_file(&ctx, "README.md").await;
    assert!(matches!(no_history, Err(Error::NotFound(_))));

    let created = mutator
        .create_or_update_file(&ctx, "README.md", Bytes::from_static(b"hello"))
        .await
        .unwrap();

    let missing_file = mutator.delete_file(&ctx, "nope.txt").await;
    assert!(matches!(missing_file, Err(Error::NotFound(_))));
    let missing_folder = mutator.delete_folder(&ctx, "README").await;
    assert!(matches!(missing_folder, Err(Error::NotFound(_))));

    assert_eq!(app.head(&project, "main"), Some(created.snapshot.id));
    let snapshots = app
        .store
        .list_snapshots(&SnapshotFilter {
            project_id: Some(project.id.clone()),
            user_id: None,
        })
        .unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn failed_content_upload_writes_nothing() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");

    app.blobs.set_fail_uploads(true);
    let result = app
        .mutator()
        .create_or_update_file(&ctx, "README.md", Bytes::from_static(b"hello"))
        .await;

    assert!(matches!(result, Err(Error::Blob(_))));
    assert_eq!(app.store.latest_snapshot_id(&project.id).unwrap(), None);
    assert_eq!(app.head(&project, "main"), None);
}

#[tokio::test]
async fn failed_placeholder_upload_still_creates_folder() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");

    app.blobs.set_fail_uploads(true);
    let outcome = app.mutator().create_folder(&ctx, "empty").await.unwrap();
    assert_eq!(app.head(&project, "main"), Some(outcome.snapshot.id));

    let view = app
        .resolver()
        .get_blob(&project.id, Some("main"), "empty/.gitkeep")
        .await
        .unwrap();
    assert!(view.content.is_none());
    assert!(view.message.is_some());
    assert_eq!(view.file.size, 0);
}

#[tokio::test]
async fn unreadable_blob_keeps_metadata() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");

    app.mutator()
        .create_or_update_file(&ctx, "data.bin", Bytes::from_static(&[0, 1, 2]))
        .await
        .unwrap();

    app.blobs.set_fail_downloads(true);
    let view = app
        .resolver()
        .get_blob(&project.id, Some("main"), "data.bin")
        .await
        .unwrap();
    assert!(view.content.is_none());
    assert_eq!(view.file.hash, content_hash(&[0, 1, 2]));
}

#[tokio::test]
async fn stale_expected_head_is_rejected() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let mut ctx = app.ctx(&project, &user, "main");
    let mutator = app.mutator();

    let first = mutator
        .create_or_update_file(&ctx, "a.txt", Bytes::from_static(b"1"))
        .await
        .unwrap();
    let second = mutator
        .create_or_update_file(&ctx, "a.txt", Bytes::from_static(b"2"))
        .await
        .unwrap();

    ctx.expected_head = Some(first.snapshot.id.clone());
    let stale = mutator
        .create_or_update_file(&ctx, "a.txt", Bytes::from_static(b"3"))
        .await;
    assert!(matches!(stale, Err(Error::Conflict(_))));
    assert_eq!(app.head(&project, "main"), Some(second.snapshot.id.clone()));

    ctx.expected_head = Some(second.snapshot.id.clone());
    let fresh = mutator
        .create_or_update_file(&ctx, "a.txt", Bytes::from_static(b"3"))
        .await
        .unwrap();
    assert_eq!(app.head(&project, "main"), Some(fresh.snapshot.id));
}

#[tokio::test]
async fn branches_move_independently() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let mutator = app.mutator();

    let on_main = mutator
        .create_or_update_file(&app.ctx(&project, &user, "main"), "a.txt", Bytes::from_static(b"a"))
        .await
        .unwrap();
    let on_feature = mutator
        .create_or_update_file(
            &app.ctx(&project, &user, "feature"),
            "b.txt",
            Bytes::from_static(b"b"),
        )
        .await
        .unwrap();

    assert_eq!(app.head(&project, "main"), Some(on_main.snapshot.id));
    assert_eq!(app.head(&project, "feature"), Some(on_feature.snapshot.id));

    let main_tree = app.resolver().list_tree(&project.id, Some("main"), "").unwrap();
    assert_eq!(names(&main_tree), vec!["a.txt"]);
    let feature_tree = app
        .resolver()
        .list_tree(&project.id, Some("feature"), "")
        .unwrap();
    assert_eq!(names(&feature_tree), vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn file_and_folder_cannot_share_a_path() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let ctx = app.ctx(&project, &user, "main");
    let mutator = app.mutator();

    mutator
        .create_or_update_file(&ctx, "notes", Bytes::from_static(b"plain"))
        .await
        .unwrap();

    let nested = mutator
        .create_or_update_file(&ctx, "notes/today.md", Bytes::from_static(b"x"))
        .await;
    assert!(matches!(nested, Err(Error::Conflict(_))));
    let folder = mutator.create_folder(&ctx, "notes").await;
    assert!(matches!(folder, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn invalid_paths_and_unknown_owners_are_rejected() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let mutator = app.mutator();
    let ctx = app.ctx(&project, &user, "main");

    for path in ["", "/", "a/../b", "a/./b", "bad\\name"] {
        let result = mutator
            .create_or_update_file(&ctx, path, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(Error::BadRequest(_))), "path {path:?}");
    }

    let mut unknown_user = ctx.clone();
    unknown_user.user_id = "missing".to_string();
    let result = mutator
        .create_or_update_file(&unknown_user, "a.txt", Bytes::from_static(b"x"))
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    let mut unknown_project = ctx;
    unknown_project.project_id = "missing".to_string();
    let result = mutator.create_folder(&unknown_project, "docs").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(app.blobs.is_empty());
}

#[tokio::test]
async fn ensure_branches_creates_main_once() {
    let app = TestApp::new();
    let (user, project) = app.seed();

    let bulk = app
        .catalog()
        .create(NewSnapshot {
            project_id: project.id.clone(),
            user_id: user.id.clone(),
            files: vec![NewSnapshotFile {
                path: "a.txt".to_string(),
                hash: content_hash(b"a"),
                size: 1,
                mode: None,
                content: Some(Bytes::from_static(b"a")),
            }],
            ..NewSnapshot::default()
        })
        .await
        .unwrap();

    let heads = app.state.branches();
    let branches = heads.ensure_branches(&project.id).unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].name, "main");
    assert_eq!(branches[0].head_snapshot_id.as_deref(), Some(bulk.snapshot.id.as_str()));

    let again = heads.ensure_branches(&project.id).unwrap();
    assert_eq!(again, branches);
}

#[tokio::test]
async fn create_branch_and_advance_head() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let other = app.seed_project(&user, "other");
    let mutator = app.mutator();

    let first = mutator
        .create_or_update_file(&app.ctx(&project, &user, "main"), "a.txt", Bytes::from_static(b"a"))
        .await
        .unwrap();
    let second = mutator
        .create_or_update_file(&app.ctx(&project, &user, "main"), "b.txt", Bytes::from_static(b"b"))
        .await
        .unwrap();

    let heads = app.state.branches();

    let draft = heads.create_branch(&project.id, "draft", None).unwrap();
    assert_eq!(draft.head_snapshot_id.as_deref(), Some(second.snapshot.id.as_str()));

    let pinned = heads
        .create_branch(&project.id, "pinned", Some(&first.snapshot.id))
        .unwrap();
    assert_eq!(pinned.head_snapshot_id.as_deref(), Some(first.snapshot.id.as_str()));

    let err = heads
        .create_branch(&other.id, "stolen", Some(&first.snapshot.id))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    heads
        .advance_head(&project.id, "draft", &first.snapshot.id)
        .unwrap();
    assert_eq!(app.head(&project, "draft").as_deref(), Some(first.snapshot.id.as_str()));
    assert_eq!(app.head(&project, "main").as_deref(), Some(second.snapshot.id.as_str()));

    let err = heads
        .advance_head(&project.id, "missing", &first.snapshot.id)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(app.store.get_branch(&project.id, "missing").unwrap().is_none());
}

#[tokio::test]
async fn bulk_snapshot_roundtrip_and_blob_cleanup() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let catalog = app.catalog();

    let inline = |path: &str, body: &'static [u8]| NewSnapshotFile {
        path: path.to_string(),
        hash: content_hash(body),
        size: body.len() as i64,
        mode: None,
        content: Some(Bytes::from_static(body)),
    };

    let first = catalog
        .create(NewSnapshot {
            project_id: project.id.clone(),
            user_id: user.id.clone(),
            title: Some("initial import".to_string()),
            branch: Some("main".to_string()),
            files: vec![inline("src/lib.rs", b"shared"), inline("old.txt", b"only-first")],
            ..NewSnapshot::default()
        })
        .await
        .unwrap();
    let second = catalog
        .create(NewSnapshot {
            project_id: project.id.clone(),
            user_id: user.id.clone(),
            branch: Some("main".to_string()),
            files: vec![inline("src/lib.rs", b"shared")],
            ..NewSnapshot::default()
        })
        .await
        .unwrap();

    assert_eq!(app.head(&project, "main"), Some(second.snapshot.id.clone()));

    let fetched = catalog.get(&first.snapshot.id).unwrap();
    assert_eq!(fetched.snapshot.file_count, 2);
    assert_eq!(fetched.files.len(), 2);

    let listed = catalog
        .list(&SnapshotFilter {
            project_id: Some(project.id.clone()),
            user_id: Some(user.id.clone()),
        })
        .unwrap();
    assert_eq!(listed.len(), 2);

    catalog.delete(&first.snapshot.id).await.unwrap();

    assert!(!app.blobs.contains(&blob_key(&project.id, &content_hash(b"only-first"))));
    assert!(app.blobs.contains(&blob_key(&project.id, &content_hash(b"shared"))));
    assert!(matches!(catalog.get(&first.snapshot.id), Err(Error::NotFound(_))));
    assert!(matches!(
        catalog.delete(&first.snapshot.id).await,
        Err(Error::NotFound(_))
    ));

    catalog.delete_project(&project.id).await.unwrap();
    assert!(app.blobs.is_empty());
    assert!(app.store.get_project(&project.id).unwrap().is_none());
}

#[tokio::test]
async fn bulk_create_rejects_bad_manifests() {
    let app = TestApp::new();
    let (user, project) = app.seed();

    let duplicate = app
        .catalog()
        .create(NewSnapshot {
            project_id: project.id.clone(),
            user_id: user.id.clone(),
            files: vec![
                NewSnapshotFile {
                    path: "a.txt".to_string(),
                    hash: content_hash(b"a"),
                    size: 1,
                    ..NewSnapshotFile::default()
                },
                NewSnapshotFile {
                    path: "/a.txt/".to_string(),
                    hash: content_hash(b"a"),
                    size: 1,
                    ..NewSnapshotFile::default()
                },
            ],
            ..NewSnapshot::default()
        })
        .await;
    assert!(matches!(duplicate, Err(Error::BadRequest(_))));

    let wrong_hash = app
        .catalog()
        .create(NewSnapshot {
            project_id: project.id.clone(),
            user_id: user.id.clone(),
            files: vec![NewSnapshotFile {
                path: "a.txt".to_string(),
                hash: content_hash(b"something else"),
                size: 1,
                mode: None,
                content: Some(Bytes::from_static(b"a")),
            }],
            ..NewSnapshot::default()
        })
        .await;
    assert!(matches!(wrong_hash, Err(Error::BadRequest(_))));

    assert!(app.blobs.is_empty());
    assert_eq!(app.store.latest_snapshot_id(&project.id).unwrap(), None);
}

#[tokio::test]
async fn bulk_create_rejects_file_and_folder_at_one_path() {
    let app = TestApp::new();
    let (user, project) = app.seed();

    let result = app
        .catalog()
        .create(NewSnapshot {
            project_id: project.id.clone(),
            user_id: user.id.clone(),
            branch: Some("main".to_string()),
            files: vec![
                NewSnapshotFile {
                    path: "a".to_string(),
                    hash: content_hash(b"file"),
                    size: 4,
                    content: Some(Bytes::from_static(b"file")),
                    ..NewSnapshotFile::default()
                },
                NewSnapshotFile {
                    path: "a/b.txt".to_string(),
                    hash: content_hash(b"nested"),
                    size: 6,
                    content: Some(Bytes::from_static(b"nested")),
                    ..NewSnapshotFile::default()
                },
            ],
            ..NewSnapshot::default()
        })
        .await;

    assert!(matches!(result, Err(Error::Conflict(_))));
    assert!(app.blobs.is_empty());
    assert_eq!(app.store.latest_snapshot_id(&project.id).unwrap(), None);
    assert_eq!(app.head(&project, "main"), None);
}

/// Parks the next upload of `key` after storing it, until released.
struct PausingBlobStore {
    inner: Arc<MemoryBlobStore>,
    key: String,
    armed: AtomicBool,
    stored: Notify,
    release: Notify,
}

#[async_trait]
impl BlobStore for PausingBlobStore {
    async fn upload(&self, key: &str, data: Bytes, options: UploadOptions) -> Result<(), BlobError> {
        self.inner.upload(key, data, options).await?;
        if key == self.key && self.armed.swap(false, Ordering::SeqCst) {
            self.stored.notify_one();
            self.release.notified().await;
        }
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Bytes, BlobError> {
        self.inner.download(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        self.inner.exists(key).await
    }

    async fn remove(&self, keys: &[String]) -> RemoveReport {
        self.inner.remove(keys).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_delete_waits_for_uncommitted_upload() {
    let app = TestApp::new();
    let (user, project) = app.seed();
    let key = blob_key(&project.id, &content_hash(b"same"));

    let blobs = Arc::new(PausingBlobStore {
        inner: app.blobs.clone(),
        key: key.clone(),
        armed: AtomicBool::new(false),
        stored: Notify::new(),
        release: Notify::new(),
    });
    let state = AppState::new(app.store.clone(), blobs.clone(), ServerConfig::default());

    let old = state
        .mutator()
        .create_or_update_file(&app.ctx(&project, &user, "main"), "old.txt", Bytes::from_static(b"same"))
        .await
        .unwrap();

    blobs.armed.store(true, Ordering::SeqCst);
    let mutator = state.mutator();
    let ctx = app.ctx(&project, &user, "main");
    let write = tokio::spawn(async move {
        mutator
            .create_or_update_file(&ctx, "new.txt", Bytes::from_static(b"same"))
            .await
    });
    blobs.stored.notified().await;

    // The old snapshot is the only committed reference to the content.
    let catalog = state.catalog();
    let old_id = old.snapshot.id.clone();
    let mut delete = tokio::spawn(async move { catalog.delete(&old_id).await });
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut delete)
            .await
            .is_err(),
        "delete must wait for the in-flight write"
    );

    blobs.release.notify_one();
    let written = write.await.unwrap().unwrap();
    delete.await.unwrap().unwrap();

    assert!(app.blobs.contains(&key));
    assert_eq!(app.head(&project, "main").as_deref(), Some(written.snapshot.id.as_str()));

    let view = state
        .resolver()
        .get_blob(&project.id, Some("main"), "new.txt")
        .await
        .unwrap();
    assert_eq!(view.content, Some(Bytes::from_static(b"same")));
}
