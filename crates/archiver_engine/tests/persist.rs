use std::fs;

use archiver_engine::{ensure_output_dir, AtomicFileWriter};
use tempfile::TempDir;

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("archive").join("nested");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing_file() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("Article.md", b"hello").unwrap();
    assert_eq!(first.file_name().unwrap(), "Article.md");
    assert_eq!(fs::read_to_string(&first).unwrap(), "hello");

    let second = writer.write("Article.md", b"world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");
}

#[test]
fn binary_content_is_written_unchanged() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());
    let bytes = [0x25, 0x50, 0x44, 0x46, 0x00, 0xFF];

    let path = writer.write("Article.pdf", &bytes).unwrap();
    assert_eq!(fs::read(path).unwrap(), bytes);
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    assert!(writer.write("doc.md", b"data").is_err());
    assert!(!file_path.with_file_name("doc.md").exists());
}
