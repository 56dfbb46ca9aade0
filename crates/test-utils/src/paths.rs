//! Temporary directory helpers for filesystem tests.

use std::path::Path;

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix (e.g. "tiles_").
pub fn temp_test_dir_with_prefix(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// Writes `contents` to `name` inside `dir` and returns the full path.
pub fn write_test_file(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// Relative paths of all regular files below `root`, sorted.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_created_and_listed() {
        let dir = temp_test_dir_with_prefix("tiler_test_");
        std::fs::create_dir_all(dir.path().join("0/0")).unwrap();
        write_test_file(&dir.path().join("0/0"), "0.png", b"x");
        write_test_file(dir.path(), "metadata.json", b"{}");

        assert_eq!(list_files(dir.path()), vec!["0/0/0.png", "metadata.json"]);
    }
}
