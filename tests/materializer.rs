// tests/materializer.rs

use std::fs;
use std::sync::Arc;

use syncds::fs::RealFileSystem;
use syncds::server::Materializer;
use syncds::types::ChangeRecord;

fn write(path: &str, data: &[u8]) -> ChangeRecord {
    let mut rec = ChangeRecord::write(path);
    rec.payload = Some(data.to_vec());
    rec
}

#[test]
fn writes_create_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let m = Materializer::new(Arc::new(RealFileSystem), dir.path());

    let out = m.apply(&[write("a/b/c/deep.txt", b"deep")]);

    assert!(out[0].is_ok());
    assert_eq!(fs::read(dir.path().join("a/b/c/deep.txt")).unwrap(), b"deep");
}

#[test]
fn applying_the_same_write_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let m = Materializer::new(Arc::new(RealFileSystem), dir.path());
    let rec = write("src/main.go", b"package main\n");

    assert!(m.apply(&[rec.clone()])[0].is_ok());
    let first = fs::read(dir.path().join("src/main.go")).unwrap();
    assert!(m.apply(&[rec])[0].is_ok());
    let second = fs::read(dir.path().join("src/main.go")).unwrap();

    assert_eq!(first, second);
}

#[test]
fn overwrite_replaces_longer_content() {
    let dir = tempfile::tempdir().unwrap();
    let m = Materializer::new(Arc::new(RealFileSystem), dir.path());

    m.apply(&[write("f.txt", b"a much longer first version")]);
    m.apply(&[write("f.txt", b"short")]);

    assert_eq!(fs::read(dir.path().join("f.txt")).unwrap(), b"short");
}

#[test]
fn removing_twice_succeeds_both_times() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("old.txt"), "bye").unwrap();
    let m = Materializer::new(Arc::new(RealFileSystem), dir.path());

    let rec = ChangeRecord::remove("old.txt");
    assert!(m.apply(&[rec.clone()])[0].is_ok());
    assert!(!dir.path().join("old.txt").exists());
    assert!(m.apply(&[rec])[0].is_ok());
}

#[test]
fn failed_remove_does_not_stop_later_records() {
    let dir = tempfile::tempdir().unwrap();
    // a directory where a file is expected: remove_file fails
    fs::create_dir(dir.path().join("not-a-file")).unwrap();
    let m = Materializer::new(Arc::new(RealFileSystem), dir.path());

    let out = m.apply(&[
        ChangeRecord::remove("not-a-file"),
        write("after.txt", b"still written"),
    ]);

    assert!(!out[0].is_ok());
    assert!(out[1].is_ok());
    assert!(dir.path().join("after.txt").exists());
}
