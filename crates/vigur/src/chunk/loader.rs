//! Directory traversal.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{VigurError, VigurResult};

/// Outcome of a directory walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Files successfully chunked and embedded.
    pub files_processed: usize,
    /// Files skipped because of an unsupported format or a read failure.
    pub files_skipped: usize,
}

/// Collect supported files under `dir`, recursively, in sorted order.
///
/// Hidden files and directories (dot-prefixed) are ignored. Files with
/// unsupported extensions are silently excluded here; per-file read failures
/// surface later when each file is actually chunked.
pub fn walk_files(dir: &Path) -> VigurResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(VigurError::FileNotFound(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                log::warn!("skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| super::is_supported(p))
        .collect();
    files.sort();
    Ok(files)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_file_not_found() {
        let err = walk_files(Path::new("/no/such/dir")).unwrap_err();
        assert!(matches!(err, VigurError::FileNotFound(_)));
    }

    #[test]
    fn finds_supported_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("skip.bin"), "x").unwrap();
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("c.html"), "c").unwrap();

        let files = walk_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.md", "b.txt", "nested/c.html"]);
    }

    #[test]
    fn hidden_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "x").unwrap();
        let hidden_dir = dir.path().join(".git");
        std::fs::create_dir(&hidden_dir).unwrap();
        std::fs::write(hidden_dir.join("config.txt"), "x").unwrap();
        std::fs::write(dir.path().join("visible.txt"), "x").unwrap();

        let files = walk_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("visible.txt"));
    }
}
