//! End-to-end vault behaviour through the public API.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::time::Duration;

use image::{DynamicImage, ImageFormat};
use tempfile::tempdir;

use media_vault::{
    ContentSource, EmptyReason, MediaKind, MediaVault, MemoryKeyStore, Rendered, SourceDetails,
    VaultConfig, VaultError, VaultResult,
};

fn open(dir: &Path) -> MediaVault {
    MediaVault::open_with_key_store(VaultConfig::with_data_dir(dir), &MemoryKeyStore::new())
        .unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::new_rgba8(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Source whose stream breaks partway through
struct BrokenSource;

struct BrokenStream {
    sent: usize,
}

impl Read for BrokenStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.sent >= 6000 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "provider died"));
        }
        let n = buf.len().min(1000);
        buf[..n].fill(1);
        self.sent += n;
        Ok(n)
    }
}

impl ContentSource for BrokenSource {
    fn details(&self, _uri: &str) -> VaultResult<SourceDetails> {
        Ok(SourceDetails {
            display_name: Some("broken.mp4".into()),
            mime_type: Some("video/mp4".into()),
        })
    }

    fn open(&self, _uri: &str) -> VaultResult<Box<dyn Read + Send>> {
        Ok(Box::new(BrokenStream { sent: 0 }))
    }
}

#[test]
fn import_pushes_new_list_to_subscribers() {
    let dir = tempdir().unwrap();
    let vault = open(&dir.path().join("vault"));
    let rx = vault.subscribe().unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap().is_empty());

    let src = dir.path().join("sunset.png");
    fs::write(&src, png(4, 4)).unwrap();
    let record = vault.import_file(&src).unwrap();

    let pushed = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(pushed, vec![record]);
}

#[test]
fn presenter_sees_imports() {
    let dir = tempdir().unwrap();
    let vault = open(&dir.path().join("vault"));
    let mut presenter = vault.presenter().unwrap();
    presenter.pump();

    let src = dir.path().join("a.gif");
    fs::write(&src, b"GIF89a").unwrap();
    vault.import_file(&src).unwrap();

    assert!(presenter.wait_for_update(Duration::from_secs(1)));
    assert_eq!(presenter.latest()[0].name, "a.gif");
}

#[test]
fn duplicate_name_overwrites_blob_but_keeps_both_rows() {
    let dir = tempdir().unwrap();
    let vault = open(&dir.path().join("vault"));

    let first_dir = dir.path().join("one");
    let second_dir = dir.path().join("two");
    fs::create_dir_all(&first_dir).unwrap();
    fs::create_dir_all(&second_dir).unwrap();
    fs::write(first_dir.join("a.png"), b"first bytes").unwrap();
    fs::write(second_dir.join("a.png"), b"second bytes").unwrap();

    let first = vault.import_file(first_dir.join("a.png")).unwrap();
    let second = vault.import_file(second_dir.join("a.png")).unwrap();

    let files = vault.files().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(vault.stats().unwrap().blobs, 1);

    for id in [first.id, second.id] {
        let mut out = Vec::new();
        vault.export(id, &mut out).unwrap();
        assert_eq!(out, b"second bytes");
    }
}

#[test]
fn externally_deleted_blob_renders_empty() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().join("vault");
    let vault = open(&data_dir);

    let src = dir.path().join("cat.jpg");
    fs::write(&src, b"\xFF\xD8\xFF not really").unwrap();
    let record = vault.import_file(&src).unwrap();

    fs::remove_file(data_dir.join("files").join("cat.jpg")).unwrap();
    assert!(matches!(
        vault.view(record.id).unwrap(),
        Rendered::Empty(EmptyReason::Missing)
    ));
}

#[test]
fn video_temp_file_matches_content() {
    let dir = tempdir().unwrap();
    let vault = open(&dir.path().join("vault"));

    let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let src = dir.path().join("clip.mp4");
    fs::write(&src, &data).unwrap();
    let record = vault.import_file(&src).unwrap();
    assert_eq!(record.extension, "mp4");

    match vault.view(record.id).unwrap() {
        Rendered::Video { path, len } => {
            assert_eq!(len, data.len() as u64);
            assert_eq!(fs::read(&path).unwrap(), data);
            vault.clear_temp_files();
            assert!(!path.exists());
        }
        other => panic!("expected video, got {:?}", other),
    }
}

#[test]
fn image_decodes_to_original_dimensions() {
    let dir = tempdir().unwrap();
    let vault = open(&dir.path().join("vault"));

    let src = dir.path().join("wide.png");
    fs::write(&src, png(16, 9)).unwrap();
    let record = vault.import_file(&src).unwrap();

    match vault.view(record.id).unwrap() {
        Rendered::Image { width, height, .. } => assert_eq!((width, height), (16, 9)),
        other => panic!("expected image, got {:?}", other),
    }
}

#[test]
fn classification_ignores_case_and_skips_unknown() {
    assert_eq!(MediaKind::classify("JPG"), MediaKind::Image);
    assert_eq!(MediaKind::classify("mkv"), MediaKind::Unknown);

    let dir = tempdir().unwrap();
    let vault = open(&dir.path().join("vault"));
    let src = dir.path().join("movie.mkv");
    fs::write(&src, [0x1A, 0x45, 0xDF, 0xA3, 0, 0]).unwrap();
    let record = vault.import_file(&src).unwrap();

    assert_eq!(record.extension, "mkv");
    assert!(matches!(
        vault.view(record.id).unwrap(),
        Rendered::Empty(EmptyReason::Unsupported)
    ));
}

#[test]
fn failed_copy_records_nothing_and_leaves_no_partial_blob() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().join("vault");
    let vault = open(&data_dir);

    let result = vault.import_from(&BrokenSource, "content://media/video/3");
    assert!(matches!(result, Err(VaultError::Io(_))));

    assert!(vault.files().unwrap().is_empty());
    assert_eq!(fs::read_dir(data_dir.join("files")).unwrap().count(), 0);
}

#[test]
fn missing_source_is_not_found() {
    let dir = tempdir().unwrap();
    let vault = open(&dir.path().join("vault"));

    let result = vault.import_file(dir.path().join("nowhere.png"));
    assert!(matches!(result, Err(VaultError::NotFound(_))));
    assert!(vault.files().unwrap().is_empty());
}

#[test]
fn content_survives_reopen_with_file_key_store() {
    let dir = tempdir().unwrap();
    let config = VaultConfig::with_data_dir(dir.path().join("vault"));
    let src = dir.path().join("keep.gif");
    fs::write(&src, b"GIF89a keep me").unwrap();

    let id = {
        let vault = MediaVault::open(config.clone()).unwrap();
        vault.import_file(&src).unwrap().id
    };

    let vault = MediaVault::open(config).unwrap();
    let mut out = Vec::new();
    vault.export(id, &mut out).unwrap();
    assert_eq!(out, b"GIF89a keep me");
}
