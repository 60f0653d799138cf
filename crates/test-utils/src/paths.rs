//! Scratch directories for test output.

/// Creates a temporary directory for test output.
///
/// The directory is removed when the returned handle is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}
