use std::path::{Path, PathBuf};

use jobfeed_adapters::{load_captured_page, normalize_all};
use jobfeed_core::CanonicalJobRecord;

fn sample_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/jobfeed/sample")
}

#[test]
fn captured_page_normalizes_to_snapshot() {
    let raw = load_captured_page(sample_dir().join("page.json")).expect("load page");
    assert_eq!(raw.len(), 4);

    let actual = normalize_all(&raw);
    let expected: Vec<CanonicalJobRecord> = serde_json::from_str(
        &std::fs::read_to_string(sample_dir().join("snapshot.json")).expect("read snapshot"),
    )
    .expect("parse snapshot");
    assert_eq!(actual, expected);
}

#[test]
fn missing_capture_reports_the_path() {
    let err = load_captured_page(sample_dir().join("missing.json")).unwrap_err();
    assert!(err.to_string().contains("missing.json"));
}
