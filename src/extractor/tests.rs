use super::test_helpers::ScriptedBackend;
use super::*;
use crate::registry::JobRegistry;
use crate::types::{DownloadRequest, Event};
use tempfile::tempdir;

fn invocation(dir: &std::path::Path) -> Invocation {
    Invocation {
        source: "https://example.com/playlist".into(),
        format: "best".into(),
        output_dir: dir.to_path_buf(),
        template: "%(title)s.%(ext)s".into(),
        extract_mp3: false,
        cookies_file: None,
        write_metadata: false,
        ignore_item_errors: true,
    }
}

#[tokio::test]
async fn test_drive_emits_events_in_order() {
    let dir = tempdir().unwrap();
    let registry = JobRegistry::default();
    let handle = registry.create(DownloadRequest::new("src")).await;
    let entry = handle.entry().clone();

    let backend = ScriptedBackend::new(&[
        "[udown:item] a1 Song One",
        "[udown:progress]  50.0%",
        "[udown:progress] 100.0%",
        "[udown:file] {dir}/Song One.mp3",
    ])
    .with_file("Song One.mp3", b"audio");

    let outcome = drive(&backend, &invocation(dir.path()), &handle)
        .await
        .unwrap();
    assert_eq!(outcome.items, 1);
    assert_eq!(outcome.files, vec![dir.path().join("Song One.mp3")]);

    let events = entry.bus().snapshot();
    assert_eq!(
        &events[..3],
        &[
            Event::NewItem {
                title: "Song One".into()
            },
            Event::progress(50.0),
            Event::progress(100.0),
        ]
    );
    assert!(matches!(&events[3], Event::Log { line } if line.starts_with("Download finished")));

    handle.finish().unwrap();
}

#[tokio::test]
async fn test_drive_zero_items_is_success() {
    let dir = tempdir().unwrap();
    let registry = JobRegistry::default();
    let handle = registry.create(DownloadRequest::new("src")).await;

    let backend = ScriptedBackend::new(&["[youtube:tab] Playlist empty: Downloading 0 items"]);
    let outcome = drive(&backend, &invocation(dir.path()), &handle)
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::default());
    handle.finish().unwrap();
}

#[tokio::test]
async fn test_drive_nonzero_exit_uses_last_error() {
    let dir = tempdir().unwrap();
    let registry = JobRegistry::default();
    let handle = registry.create(DownloadRequest::new("src")).await;

    let backend = ScriptedBackend::new(&["[generic] Extracting URL"])
        .with_stderr("ERROR: Unsupported URL: https://example.com/playlist")
        .with_exit(ExitReport::failed(1));

    let err = drive(&backend, &invocation(dir.path()), &handle)
        .await
        .unwrap_err();
    match err {
        Error::Extraction(message) => {
            assert_eq!(message, "Unsupported URL: https://example.com/playlist")
        }
        other => panic!("expected extraction error, got {other:?}"),
    }
    handle.fail("x", crate::types::ErrorKind::Extraction).unwrap();
}

#[tokio::test]
async fn test_drive_missing_reported_file_is_error() {
    let dir = tempdir().unwrap();
    let registry = JobRegistry::default();
    let handle = registry.create(DownloadRequest::new("src")).await;

    let backend = ScriptedBackend::new(&["[udown:item] a Song", "[udown:file] {dir}/Song.mp3"]);
    let err = drive(&backend, &invocation(dir.path()), &handle)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(ref m) if m.contains("missing")));
    drop(handle);
}

#[tokio::test]
async fn test_drive_empty_reported_file_is_error() {
    let dir = tempdir().unwrap();
    let registry = JobRegistry::default();
    let handle = registry.create(DownloadRequest::new("src")).await;

    let backend = ScriptedBackend::new(&["[udown:item] a Song", "[udown:file] Song.mp3"])
        .with_file("Song.mp3", b"");
    let err = drive(&backend, &invocation(dir.path()), &handle)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(ref m) if m.contains("empty")));
    drop(handle);
}

#[tokio::test]
async fn test_unavailable_backend() {
    let dir = tempdir().unwrap();
    let backend = UnavailableBackend::new("not found in PATH");
    let err = backend.preflight(&invocation(dir.path())).unwrap_err();
    assert_eq!(err.kind(), crate::types::ErrorKind::Configuration);

    let caps = backend.capabilities();
    assert!(!caps.can_extract);
    assert_eq!(caps.backend, "unavailable");
    assert_eq!(caps.parser_version, PARSER_VERSION);
}
