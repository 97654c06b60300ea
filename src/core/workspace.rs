use crate::core::{Result, Tv5Error};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PREFIX: &str = "tv5_download_";
pub const CONCAT_LIST: &str = "concat.txt";
pub const OUTPUT_FILE: &str = "output.mp4";

/// Scratch directory owned by a single download.
///
/// The directory and everything in it is removed when the workspace is
/// dropped, whichever way the download ends.
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let temp_dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| Tv5Error::Workspace(e.to_string()))?;

        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn segment_file_name(index: usize) -> String {
        format!("segment_{:06}.ts", index)
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.path().join(Self::segment_file_name(index))
    }

    pub fn concat_list(&self) -> PathBuf {
        self.path().join(CONCAT_LIST)
    }

    pub fn output(&self) -> PathBuf {
        self.path().join(OUTPUT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(Some(parent.path())).unwrap();
        let dir = workspace.path().to_path_buf();
        std::fs::write(workspace.segment_path(3), b"data").unwrap();

        assert!(dir.exists());
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("tv5_download_"));

        drop(workspace);
        assert!(!dir.exists());
    }

    #[test]
    fn test_segment_names_sort_in_playback_order() {
        let mut names: Vec<String> = [10, 2, 100, 0]
            .into_iter()
            .map(Workspace::segment_file_name)
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "segment_000000.ts",
                "segment_000002.ts",
                "segment_000010.ts",
                "segment_000100.ts"
            ]
        );
    }

    #[test]
    fn test_missing_parent_is_workspace_error() {
        let result = Workspace::new(Some(Path::new("/nonexistent/tv5/parent")));
        assert!(matches!(result, Err(Tv5Error::Workspace(_))));
    }
}
