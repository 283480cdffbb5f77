use std::fs;

use slow_movie::Error;
use slow_movie::store::{FileStore, KeyValueStore, ProgressStore};
use tempfile::tempdir;

#[test]
fn progress_survives_reopening_the_store() {
    let tmp = tempdir().unwrap();
    {
        let mut store = ProgressStore::new(FileStore::open(tmp.path()).unwrap());
        store.save("a.mp4", 240).unwrap();
        store.save_pointer("a.mp4").unwrap();
    }

    let mut store = ProgressStore::new(FileStore::open(tmp.path()).unwrap());
    assert_eq!(store.load("a.mp4").unwrap(), 240);
    assert_eq!(store.load_pointer().unwrap().as_deref(), Some("a.mp4"));
}

#[test]
fn each_video_is_an_independent_file() {
    let tmp = tempdir().unwrap();
    let mut store = ProgressStore::new(FileStore::open(tmp.path()).unwrap());
    store.save("a.mp4", 10).unwrap();
    store.save("b.mp4", 20).unwrap();

    assert_eq!(
        fs::read_to_string(tmp.path().join("progress").join("a.mp4")).unwrap(),
        "10"
    );
    assert_eq!(
        fs::read_to_string(tmp.path().join("progress").join("b.mp4")).unwrap(),
        "20"
    );

    // damage one record; the other is unaffected
    fs::write(tmp.path().join("progress").join("a.mp4"), "garbage").unwrap();
    assert!(matches!(store.load("a.mp4"), Err(Error::CorruptRecord { .. })));
    assert_eq!(store.load("b.mp4").unwrap(), 20);
}

#[test]
fn first_access_creates_a_zero_record() {
    let tmp = tempdir().unwrap();
    let mut store = ProgressStore::new(FileStore::open(tmp.path().join("state")).unwrap());
    assert_eq!(store.load("new.mp4").unwrap(), 0);
    assert!(tmp.path().join("state/progress/new.mp4").is_file());
    assert_eq!(store.videos().unwrap(), vec!["new.mp4"]);
}

#[test]
fn saving_twice_leaves_the_same_value() {
    let tmp = tempdir().unwrap();
    let mut store = ProgressStore::new(FileStore::open(tmp.path()).unwrap());
    store.save("a.mp4", 42).unwrap();
    store.save("a.mp4", 42).unwrap();
    assert_eq!(store.load("a.mp4").unwrap(), 42);
}

#[test]
fn list_skips_temporary_files() {
    let tmp = tempdir().unwrap();
    let mut kv = FileStore::open(tmp.path()).unwrap();
    kv.set("progress/a.mp4", "1").unwrap();
    fs::write(tmp.path().join("progress").join(".b.mp4.tmp"), "2").unwrap();
    assert_eq!(kv.list("progress/").unwrap(), vec!["progress/a.mp4"]);
    assert_eq!(kv.list("").unwrap(), vec!["progress/a.mp4"]);
}

#[test]
fn keys_cannot_escape_the_root() {
    let tmp = tempdir().unwrap();
    let mut kv = FileStore::open(tmp.path()).unwrap();
    for key in ["", "../outside", "/etc/passwd", "progress/../../x"] {
        assert!(
            matches!(kv.set(key, "1"), Err(Error::InvalidKey(_))),
            "key {key:?} should be rejected"
        );
        assert!(matches!(kv.get(key), Err(Error::InvalidKey(_))));
    }
}

#[test]
fn legacy_float_records_load_as_whole_frames() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("progress")).unwrap();
    fs::write(tmp.path().join("progress").join("old.mp4"), "1530.0\n").unwrap();
    let mut store = ProgressStore::new(FileStore::open(tmp.path()).unwrap());
    assert_eq!(store.load("old.mp4").unwrap(), 1530);
}

#[test]
fn list_walks_nested_keys_and_skips_hidden_dirs() {
    let tmp = tempdir().unwrap();
    let mut kv = FileStore::open(tmp.path()).unwrap();
    kv.set("now-playing", "a.mp4").unwrap();
    kv.set("progress/a.mp4", "1").unwrap();
    kv.set("progress/extra/b.mp4", "2").unwrap();
    fs::create_dir_all(tmp.path().join(".cache")).unwrap();
    fs::write(tmp.path().join(".cache").join("c.mp4"), "3").unwrap();

    assert_eq!(
        kv.list("").unwrap(),
        vec!["now-playing", "progress/a.mp4", "progress/extra/b.mp4"]
    );
    assert_eq!(
        kv.list("progress/").unwrap(),
        vec!["progress/a.mp4", "progress/extra/b.mp4"]
    );
}

#[test]
fn failed_rename_removes_the_temporary_file() {
    let tmp = tempdir().unwrap();
    let mut kv = FileStore::open(tmp.path()).unwrap();
    // a non-empty directory where the record should go makes the rename fail
    let blocked = tmp.path().join("progress").join("a.mp4");
    fs::create_dir_all(&blocked).unwrap();
    fs::write(blocked.join("keep"), "x").unwrap();

    assert!(matches!(kv.set("progress/a.mp4", "5"), Err(Error::Io(_))));
    assert!(!tmp.path().join("progress").join(".a.mp4.tmp").exists());
    assert!(blocked.join("keep").is_file());
}
