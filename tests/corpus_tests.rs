use std::path::PathBuf;

use agro_relay::corpus::Corpus;
use agro_relay::error::StartupError;
use tempfile::TempDir;

mod common;

#[ctor::ctor]
fn _init() {
    common::init();
}

fn write_files(dir: &TempDir, files: &[(&str, &[u8])]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, bytes)| {
            let p = dir.path().join(name);
            std::fs::write(&p, bytes).unwrap();
            p
        })
        .collect()
}

#[test]
fn loading_twice_is_identical_and_ordered() {
    let dir = TempDir::new().unwrap();
    let paths = write_files(
        &dir,
        &[
            ("Loan_Products.pdf", b"%PDF-1.4 loans"),
            ("Credit_Score_Guide.pdf", b"%PDF-1.4 credit"),
            ("notes.txt", b"plant after first rains"),
        ],
    );

    let a = Corpus::load(&paths).unwrap();
    let b = Corpus::load(&paths).unwrap();

    assert_eq!(a, b);
    let names: Vec<_> = a.documents().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Loan_Products.pdf", "Credit_Score_Guide.pdf", "notes.txt"]);
    assert_eq!(&*a.documents()[0].bytes, b"%PDF-1.4 loans");
    assert_eq!(a.documents()[0].mime_type, "application/pdf");
    assert_eq!(a.documents()[2].mime_type, "text/plain");
    assert_eq!(a.total_bytes(), 14 + 15 + 23);
}

#[test]
fn missing_file_aborts_loading() {
    let dir = TempDir::new().unwrap();
    let mut paths = write_files(&dir, &[("ok.pdf", b"%PDF")]);
    let missing = dir.path().join("missing.pdf");
    paths.push(missing.clone());

    let err = Corpus::load(&paths).unwrap_err();

    match err {
        StartupError::UnreadableDocument { path, .. } => assert_eq!(path, missing),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn empty_path_list_is_rejected_when_required() {
    let none: Vec<PathBuf> = Vec::new();
    assert!(matches!(Corpus::load_required(&none), Err(StartupError::EmptyCorpus)));
    assert!(Corpus::load(&none).unwrap().is_empty());
}
