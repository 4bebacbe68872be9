mod common;

use bytes::Bytes;
use coffer_archive::{
    ArchiveError, SkipReason, SourceError, SourceProvider, ZipStreamWriter, write_archive,
    write_with,
};
use coffer_core::ResourceFile;
use coffer_storage::{FilesystemBackend, ObjectStore};
use common::{FailingSink, Script, ScriptedStore, read_entries};
use std::sync::atomic::Ordering;
use time::macros::datetime;

#[tokio::test]
async fn test_missing_source_is_skipped() {
    let store = ScriptedStore::default()
        .with_bytes("k/1", b"one")
        .with_bytes("k/3", b"three");
    let files = vec![
        ResourceFile::new("1.txt", "k/1"),
        ResourceFile::new("2.txt", "k/2"),
        ResourceFile::new("3.txt", "k/3"),
    ];

    let (archive, report) = write_archive(Vec::new(), &store, &files).await.unwrap();

    assert_eq!(
        read_entries(&archive),
        vec![
            ("1.txt".to_string(), b"one".to_vec()),
            ("3.txt".to_string(), b"three".to_vec()),
        ]
    );
    assert_eq!(report.written, vec!["1.txt", "3.txt"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].storage_key, "k/2");
    assert_eq!(
        report.skipped[0].reason,
        SkipReason::Source(SourceError::NotFound("k/2".to_string()))
    );
    assert!(!report.is_complete());
    assert_eq!(report.bytes, archive.len() as u64);
}

#[tokio::test]
async fn test_unavailable_source_is_skipped() {
    let store = ScriptedStore::default()
        .with("flaky", Script::Unavailable("timeout"))
        .with_bytes("ok", b"fine");
    let files = vec![
        ResourceFile::new("flaky.bin", "flaky"),
        ResourceFile::new("ok.bin", "ok"),
    ];

    let (archive, report) = write_archive(Vec::new(), &store, &files).await.unwrap();

    assert_eq!(read_entries(&archive).len(), 1);
    assert!(matches!(
        report.skipped[0].reason,
        SkipReason::Source(SourceError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_unsafe_names_are_sanitized_or_skipped() {
    let store = ScriptedStore::default()
        .with_bytes("a", b"a")
        .with_bytes("b", b"b");
    let files = vec![
        ResourceFile::new("C:\\Users\\me\\a.txt", "a"),
        ResourceFile::new("../../etc/passwd", "b"),
    ];

    let (archive, report) = write_archive(Vec::new(), &store, &files).await.unwrap();

    assert_eq!(
        read_entries(&archive),
        vec![("Users/me/a.txt".to_string(), b"a".to_vec())]
    );
    assert!(matches!(
        report.skipped[0].reason,
        SkipReason::InvalidName(_)
    ));
    // A rejected name never opens its source.
    assert_eq!(store.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_duplicate_names_get_suffixes() {
    let store = ScriptedStore::default()
        .with_bytes("x1", b"first")
        .with_bytes("x2", b"second")
        .with_bytes("x3", b"third");
    let files = vec![
        ResourceFile::new("photo.jpg", "x1"),
        ResourceFile::new("photo.jpg", "x2"),
        ResourceFile::new("/photo.jpg", "x3"),
    ];

    let (archive, report) = write_archive(Vec::new(), &store, &files).await.unwrap();

    assert_eq!(report.written, vec!["photo.jpg", "photo (1).jpg", "photo (2).jpg"]);
    assert_eq!(
        read_entries(&archive),
        vec![
            ("photo.jpg".to_string(), b"first".to_vec()),
            ("photo (1).jpg".to_string(), b"second".to_vec()),
            ("photo (2).jpg".to_string(), b"third".to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_truncated_source_reported_and_archive_continues() {
    let store = ScriptedStore::default()
        .with(
            "partial",
            Script::FailAfter(vec![Bytes::from_static(b"half")], "reset"),
        )
        .with_bytes("whole", b"whole");
    let files = vec![
        ResourceFile::new("partial.raw", "partial"),
        ResourceFile::new("whole.raw", "whole"),
    ];

    let (archive, report) = write_archive(Vec::new(), &store, &files).await.unwrap();

    assert_eq!(report.written.len(), 2);
    assert_eq!(report.truncated.len(), 1);
    assert_eq!(report.truncated[0].name, "partial.raw");
    assert_eq!(report.truncated[0].size, 4);
    assert_eq!(
        read_entries(&archive),
        vec![
            ("partial.raw".to_string(), b"half".to_vec()),
            ("whole.raw".to_string(), b"whole".to_vec()),
        ]
    );
    assert_eq!(store.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sink_failure_aborts_and_releases_source() {
    let big = Bytes::from(vec![9u8; 256 * 1024]);
    let store = ScriptedStore::default()
        .with("big", Script::Chunks(vec![big.clone(), big]))
        .with_bytes("never", b"never read");
    let files = vec![
        ResourceFile::new("big.bin", "big"),
        ResourceFile::new("never.bin", "never"),
    ];

    let result = write_archive(FailingSink::new(10_000), &store, &files).await;

    assert!(matches!(result, Err(ArchiveError::SinkWrite(_))));
    assert_eq!(store.opened.load(Ordering::SeqCst), 1);
    assert_eq!(store.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_filesystem_backend_as_provider() {
    let temp = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path()).await.unwrap();
    backend
        .put("res/1/a", Bytes::from_static(b"hello"))
        .await
        .unwrap();

    let store: &dyn ObjectStore = &backend;
    assert!(matches!(
        store.open("res/1/missing").await,
        Err(SourceError::NotFound(_))
    ));

    let files = vec![
        ResourceFile::new("a.txt", "res/1/a"),
        ResourceFile::new("missing.txt", "res/1/missing"),
    ];
    let writer =
        ZipStreamWriter::new(Vec::new()).with_modified_time(datetime!(2024-01-02 03:04:06 UTC));
    let (archive, report) = write_with(writer, store, &files).await.unwrap();

    assert_eq!(
        read_entries(&archive),
        vec![("a.txt".to_string(), b"hello".to_vec())]
    );
    assert_eq!(report.skipped.len(), 1);
}

#[tokio::test]
async fn test_directory_key_is_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path()).await.unwrap();
    backend
        .put("res/1/a", Bytes::from_static(b"hello"))
        .await
        .unwrap();

    let files = vec![
        ResourceFile::new("a.txt", "res/1/a"),
        ResourceFile::new("dir.txt", "res/1"),
    ];
    let (archive, report) = write_archive(Vec::new(), &backend, &files).await.unwrap();

    assert_eq!(report.written, vec!["a.txt".to_string()]);
    assert!(report.truncated.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].storage_key, "res/1");
    assert!(matches!(
        report.skipped[0].reason,
        SkipReason::Source(SourceError::NotFound(_))
    ));
    assert_eq!(read_entries(&archive).len(), 1);
}
