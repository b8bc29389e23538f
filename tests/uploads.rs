use std::fs;

use pi_gallery::Error;
use pi_gallery::uploads::UploadStore;

#[test]
fn save_picks_free_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = UploadStore::new(dir.path().join("uploaded"));
    assert_eq!(store.save("beach day.jpg", b"one").unwrap(), "beach_day.jpg");
    assert_eq!(store.save("beach day.jpg", b"two").unwrap(), "beach_day_1.jpg");
    assert_eq!(store.save("beach_day.jpg", b"three").unwrap(), "beach_day_2.jpg");
    assert_eq!(fs::read(store.dir().join("beach_day_1.jpg")).unwrap(), b"two");
}

#[test]
fn save_rejects_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let store = UploadStore::new(dir.path());
    match store.save("", b"x") {
        Err(Error::InvalidUpload(msg)) => assert_eq!(msg, "No file selected"),
        other => panic!("unexpected {other:?}"),
    }
    match store.save("movie.mp4", b"x") {
        Err(Error::InvalidUpload(msg)) => {
            assert_eq!(msg, "Invalid file type. Only JPG and PNG allowed")
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn list_skips_non_images_and_reports_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let store = UploadStore::new(dir.path());
    store.save("a.png", &[0u8; 2048]).unwrap();
    fs::write(dir.path().join("readme.txt"), b"x").unwrap();
    fs::write(dir.path().join(".b.jpg"), b"x").unwrap();
    let images = store.list().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].filename, "a.png");
    assert_eq!(images[0].path, "uploaded/a.png");
    assert_eq!(images[0].size, 2048);
    assert_eq!(images[0].size_human, "2.0 KB");
    assert_eq!(images[0].caption, "");

    let missing = UploadStore::new(dir.path().join("never-created"));
    assert!(missing.list().unwrap().is_empty());
}

#[test]
fn delete_reports_per_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = UploadStore::new(dir.path());
    store.save("keep.jpg", b"x").unwrap();
    store.save("drop.jpg", b"x").unwrap();
    fs::write(dir.path().join("notes.txt"), b"x").unwrap();
    let report = store.delete(&[
        "uploaded/drop.jpg".to_string(),
        "ghost.jpg".to_string(),
        "notes.txt".to_string(),
        "..".to_string(),
    ]);
    assert_eq!(report.deleted, vec!["uploaded/drop.jpg"]);
    let errors: Vec<&str> = report.failed.iter().map(|f| f.error.as_str()).collect();
    assert_eq!(errors, vec!["File not found", "Not an image file", "Invalid path"]);
    assert!(dir.path().join("keep.jpg").exists());
    assert!(!dir.path().join("drop.jpg").exists());
}

#[test]
fn rename_checks_names_and_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let store = UploadStore::new(dir.path());
    store.save("a.jpg", b"x").unwrap();
    store.save("b.jpg", b"x").unwrap();

    assert_eq!(store.rename("a.jpg", "sunset at bay.jpg").unwrap(), "sunset_at_bay.jpg");
    assert!(dir.path().join("sunset_at_bay.jpg").exists());

    assert!(matches!(store.rename("b.jpg", "sunset_at_bay.jpg"), Err(Error::AlreadyExists(_))));
    assert!(matches!(store.rename("missing.jpg", "c.jpg"), Err(Error::NotFound(_))));
    assert!(matches!(store.rename("b.jpg", "c.gif"), Err(Error::InvalidUpload(_))));
    assert!(matches!(store.rename("../b.jpg", "c.jpg"), Err(Error::InvalidUpload(_))));
    assert!(matches!(store.rename("", "c.jpg"), Err(Error::InvalidUpload(_))));
}

#[test]
fn captions_are_written_into_uploads() {
    let dir = tempfile::tempdir().unwrap();
    let store = UploadStore::new(dir.path());
    image::RgbImage::new(6, 4).save(dir.path().join("pier.jpg")).unwrap();

    assert_eq!(store.set_caption("uploaded/pier.jpg", "Evening tide").unwrap(), "pier.jpg");
    assert_eq!(store.list().unwrap()[0].caption, "Evening tide");

    assert!(matches!(store.set_caption("pier.jpg", "x"), Err(Error::InvalidUpload(_))));
    assert!(matches!(store.set_caption("uploaded/ghost.jpg", "x"), Err(Error::NotFound(_))));
}

#[test]
fn caption_cache_cleanup_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = UploadStore::new(dir.path());
    fs::write(dir.path().join(".captions.json"), b"{}").unwrap();
    assert!(store.cleanup_caption_cache().unwrap());
    assert!(!dir.path().join(".captions.json").exists());
    assert!(!store.cleanup_caption_cache().unwrap());
}
