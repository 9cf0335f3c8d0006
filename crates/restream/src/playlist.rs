//! Playlist helpers: eligibility filtering, directory scanning and the
//! saved playlist file.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Media extensions picked up by directory scans (case-insensitive matching).
pub const MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".mkv", ".mov", ".flv", ".avi", ".m4v", ".ts"];

/// Error type for saved playlist operations
#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("failed to write playlist: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode playlist: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk playlist document: `{"files": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaylistFile {
    pub files: Vec<PathBuf>,
}

/// True if `path` is a regular file that can be opened for reading.
pub fn is_playable(path: &Path) -> bool {
    if path.as_os_str().is_empty() || !path.is_file() {
        return false;
    }
    File::open(path).is_ok()
}

/// Keep only the entries that exist as readable regular files.
///
/// Order is preserved and duplicates are kept; a playlist may repeat a file
/// on purpose.
pub fn filter_playable<I, P>(entries: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    entries
        .into_iter()
        .filter(|p| is_playable(p.as_ref()))
        .map(|p| p.as_ref().to_path_buf())
        .collect()
}

/// Checks if a file has a media extension (case-insensitive).
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            MEDIA_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Scans the given directories for media files.
///
/// This function:
/// - Recursively walks each root directory
/// - Skips hidden directories (names starting with `.`)
/// - Filters files by media extensions (case-insensitive)
/// - Sorts each root's results by path so playback order is stable
pub fn scan_media_dirs(roots: &[PathBuf]) -> Vec<PathBuf> {
    use walkdir::WalkDir;

    let mut files = Vec::new();

    for root in roots {
        if !root.exists() {
            continue;
        }

        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.file_type().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    // The root itself may be hidden
                    if name.starts_with('.') && entry.depth() > 0 {
                        return false;
                    }
                }
            }
            true
        });

        let mut found: Vec<PathBuf> = walker
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file() && is_media_file(entry.path()))
            .map(|entry| entry.into_path())
            .collect();
        found.sort();
        files.extend(found);
    }

    files
}

/// Load a saved playlist.
///
/// A missing or malformed file yields an empty playlist.
pub fn load_playlist(path: &Path) -> Vec<PathBuf> {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<PlaylistFile>(&content).ok())
        .map(|doc| doc.files)
        .unwrap_or_default()
}

/// Save a playlist, creating parent directories as needed.
pub fn save_playlist(path: &Path, files: &[PathBuf]) -> Result<(), PlaylistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let doc = PlaylistFile {
        files: files.to_vec(),
    };
    fs::write(path, serde_json::to_string_pretty(&doc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_media_file() {
        assert!(is_media_file(Path::new("/media/clip.mp4")));
        assert!(is_media_file(Path::new("/media/clip.MKV")));
        assert!(is_media_file(Path::new("/media/clip.Mov")));
        assert!(is_media_file(Path::new("/media/clip.flv")));
        assert!(!is_media_file(Path::new("/media/clip.srt")));
        assert!(!is_media_file(Path::new("/media/clip")));
    }

    #[test]
    fn test_filter_playable_keeps_order_and_drops_missing() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.mp4");
        let b = temp_dir.path().join("b.mkv");
        File::create(&a).unwrap();
        File::create(&b).unwrap();

        let entries = vec![
            b.clone(),
            temp_dir.path().join("missing.mp4"),
            PathBuf::new(),
            temp_dir.path().to_path_buf(),
            a.clone(),
            b.clone(),
        ];

        assert_eq!(filter_playable(&entries), vec![b.clone(), a, b]);
    }

    #[test]
    fn test_filter_playable_empty_input() {
        assert!(filter_playable(Vec::<PathBuf>::new()).is_empty());
    }

    #[test]
    fn test_scan_media_dirs_sorted_and_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("season1")).unwrap();
        File::create(root.join("b.mp4")).unwrap();
        File::create(root.join("a.mkv")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        File::create(root.join("season1").join("ep1.mov")).unwrap();

        let files = scan_media_dirs(&[root.to_path_buf(), root.join("does-not-exist")]);

        assert_eq!(
            files,
            vec![
                root.join("a.mkv"),
                root.join("b.mp4"),
                root.join("season1").join("ep1.mov"),
            ]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_hidden_directory_exclusion(
            visible_dir in "[a-zA-Z0-9]{1,10}",
            hidden_dir in "\\.[a-zA-Z0-9]{1,10}",
            filename in "[a-zA-Z0-9]{1,10}",
        ) {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path();

            let visible_video = root.join(&visible_dir).join(format!("{}.mp4", filename));
            fs::create_dir_all(visible_video.parent().unwrap()).unwrap();
            File::create(&visible_video).unwrap();

            let hidden_video = root.join(&hidden_dir).join(format!("{}.mp4", filename));
            fs::create_dir_all(hidden_video.parent().unwrap()).unwrap();
            File::create(&hidden_video).unwrap();

            let files = scan_media_dirs(&[root.to_path_buf()]);

            prop_assert!(files.contains(&visible_video));
            prop_assert!(!files.contains(&hidden_video));
        }
    }

    #[test]
    fn test_save_and_load_playlist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cfg").join("playlist.json");
        let files = vec![PathBuf::from("/media/a.mp4"), PathBuf::from("/media/b.mkv")];

        save_playlist(&path, &files).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"files\""));
        assert_eq!(load_playlist(&path), files);
    }

    #[test]
    fn test_load_playlist_tolerates_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_playlist(&temp_dir.path().join("absent.json")).is_empty());

        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "{\"files\": 42}").unwrap();
        assert!(load_playlist(&path).is_empty());

        fs::write(&path, "not json").unwrap();
        assert!(load_playlist(&path).is_empty());
    }
}
