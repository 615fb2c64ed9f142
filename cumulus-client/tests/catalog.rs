//! Folder operations and whole-directory transfers

mod common;

use common::{payload, Harness, MockProviders, MockTracker, Mode};
use cumulus_client::catalog::{download_dir, upload_dir};
use cumulus_client::{Catalog, Client, DownloadRequest, ListQuery, UploadRequest, UploadResult};
use cumulus_core::{CumulusError, NodeIdentity};
use cumulus_protocol::tracker::FileOrFolder;
use tokio_util::sync::CancellationToken;

const ERASURE: Mode = Mode::Erasure { data: 4, parity: 2 };

fn names(entries: &[cumulus_client::CatalogEntry]) -> Vec<String> {
    entries.iter().map(|e| e.name.clone()).collect()
}

#[tokio::test]
async fn test_mk_folder_then_list() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());

    catalog
        .mk_folder(&h.identity, "/", &["photos".into(), "docs".into()])
        .await
        .unwrap();

    let page = catalog
        .list_files(&h.identity, &ListQuery::new("/"))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(names(&page.entries), vec!["docs", "photos"]);
    assert!(page.entries.iter().all(|e| e.is_folder && e.file_hash.is_none()));
}

#[tokio::test]
async fn test_mk_folder_under_missing_parent_fails() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());

    let err = catalog
        .mk_folder(&h.identity, "/nope", &["x".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, CumulusError::Protocol { code: 2, .. }));
}

#[tokio::test]
async fn test_listing_pages() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());
    let folders: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
    catalog.mk_folder(&h.identity, "/", &folders).await.unwrap();

    let mut query = ListQuery::new("/");
    query.page_size = 2;
    query.page_num = 2;
    let page = catalog.list_files(&h.identity, &query).await.unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(names(&page.entries), vec!["c", "d"]);

    query.page_num = 1;
    query.ascending = false;
    let page = catalog.list_files(&h.identity, &query).await.unwrap();
    assert_eq!(names(&page.entries), vec!["e", "d"]);

    let all = catalog.list_all(&h.identity, "/").await.unwrap();
    assert_eq!(names(&all), folders);
}

#[tokio::test]
async fn test_listed_file_carries_hash_and_size() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());
    let data = payload(40_000, 31);
    let path = h.file("song.flac", &data);
    let report = h
        .uploader
        .upload(&h.identity, UploadRequest::new(&path, "/"), &CancellationToken::new())
        .await
        .unwrap();

    let entries = catalog.list_all(&h.identity, "/").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "song.flac");
    assert!(!entries[0].is_folder);
    assert_eq!(entries[0].file_hash, Some(report.file_hash));
    assert_eq!(entries[0].file_size, 40_000);
}

#[tokio::test]
async fn test_remove_requires_recursive_for_full_folder() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());
    catalog.mk_folder(&h.identity, "/", &["docs".into()]).await.unwrap();
    catalog.mk_folder(&h.identity, "/docs", &["old".into()]).await.unwrap();

    let err = catalog.remove(&h.identity, "/docs", false).await.unwrap_err();
    assert!(matches!(err, CumulusError::Protocol { code: 39, .. }));

    catalog.remove(&h.identity, "/docs", true).await.unwrap();
    assert!(h.tracker.folder_names("/").is_empty());
    assert!(catalog.list_files(&h.identity, &ListQuery::new("/docs")).await.is_err());
}

#[tokio::test]
async fn test_directory_roundtrip() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());

    let small = payload(300, 32);
    let medium = payload(50_000, 33);
    let deep = payload(12_345, 34);
    h.file("tree/a.txt", &small);
    h.file("tree/sub/b.bin", &medium);
    h.file("tree/sub/deeper/c.dat", &deep);

    let cancel = CancellationToken::new();
    let summary = upload_dir(
        &catalog,
        &h.uploader,
        &h.identity,
        &h.dir.path().join("tree"),
        "/",
        false,
        &cancel,
    )
    .await
    .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.folders, 3);
    assert_eq!(h.tracker.folder_names("/"), vec!["tree"]);
    let mut top = h.tracker.folder_names("/tree");
    top.sort();
    assert_eq!(top, vec!["a.txt", "sub"]);

    let out = h.dir.path().join("restored");
    let summary = download_dir(&catalog, &h.downloader, &h.identity, "/tree", &out, &cancel)
        .await
        .unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.folders, 2);
    assert_eq!(std::fs::read(out.join("a.txt")).unwrap(), small);
    assert_eq!(std::fs::read(out.join("sub/b.bin")).unwrap(), medium);
    assert_eq!(std::fs::read(out.join("sub/deeper/c.dat")).unwrap(), deep);
}

#[tokio::test]
async fn test_directory_download_refuses_escaping_names() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());
    let data = payload(300, 38);
    let report = h
        .uploader
        .upload(&h.identity, UploadRequest::new(h.file("ok.txt", &data), "/"), &CancellationToken::new())
        .await
        .unwrap();

    let file = |name: &str| FileOrFolder {
        id: name.as_bytes().to_vec(),
        folder: false,
        name: name.to_string(),
        mod_time: 0,
        file_hash: report.file_hash.to_vec(),
        file_size: report.file_size,
    };
    h.tracker.list_entry("/", file("../escaped.txt"));
    h.tracker.list_entry("/", file("/abs.txt"));
    h.tracker.list_entry(
        "/",
        FileOrFolder {
            id: b"up".to_vec(),
            folder: true,
            name: "..".into(),
            ..Default::default()
        },
    );

    let inside = h.dir.path().join("inside");
    let summary = download_dir(&catalog, &h.downloader, &h.identity, "/", &inside, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.folders, 0);
    assert_eq!(summary.failed.len(), 3);
    assert!(summary
        .failed
        .iter()
        .all(|(_, e)| matches!(e, CumulusError::UnexpectedResponse(_))));
    assert_eq!(std::fs::read(inside.join("ok.txt")).unwrap(), data);
    assert!(!h.dir.path().join("escaped.txt").exists());
    assert_eq!(std::fs::read_dir(&inside).unwrap().count(), 1);
}

#[tokio::test]
async fn test_directory_upload_continues_past_failures() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());
    h.providers.fail(2);

    h.file("mixed/ok.txt", &payload(500, 35));
    h.file("mixed/zbig.bin", &payload(60_000, 36));

    let summary = upload_dir(
        &catalog,
        &h.uploader,
        &h.identity,
        &h.dir.path().join("mixed"),
        "/",
        false,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(!summary.is_complete());
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].0.ends_with("zbig.bin"));
}

#[tokio::test]
async fn test_directory_upload_honours_cancellation() {
    let h = Harness::new(ERASURE);
    let catalog = Catalog::new(h.tracker.clone());
    h.file("c/one.txt", b"1");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = upload_dir(
        &catalog,
        &h.uploader,
        &h.identity,
        &h.dir.path().join("c"),
        "/",
        false,
        &cancel,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CumulusError::Cancelled));
}

#[tokio::test]
async fn test_client_from_parts() {
    let h = Harness::new(ERASURE);
    let identity = NodeIdentity::generate();
    let tracker = MockTracker::new(&identity, ERASURE);
    let providers = MockProviders::new();
    let client = Client::from_parts(&h.config(), identity, tracker, providers.clone()).unwrap();

    let data = payload(2_000, 37);
    let path = h.file("notes.md", &data);
    let cancel = CancellationToken::new();
    let report = client
        .upload(UploadRequest::new(&path, "/"), &cancel)
        .await
        .unwrap();
    assert_eq!(report.result, UploadResult::Inline);

    let page = client.list_files(&ListQuery::new("/")).await.unwrap();
    assert_eq!(names(&page.entries), vec!["notes.md"]);

    let output = h.dir.path().join("copy.md");
    client
        .download(
            DownloadRequest {
                file_hash: report.file_hash,
                file_size: report.file_size,
                output: output.clone(),
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(std::fs::read(&output).unwrap(), data);

    let key = report.file_hash.to_hex();
    assert_eq!(client.progress().get(&key), None);
    assert_eq!(providers.retrievals(), 0);
}
