//! Track enumeration for MUSDB18-HQ style datasets
//!
//! Layout: `<root>/<split>/<track>/{mixture,vocals,drums,bass,other}.wav`

use log::debug;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{UnmixError, UnmixResult};
use crate::target::Target;

/// File stem of the mixture in every track directory
pub const MIXTURE_STEM: &str = "mixture";

/// One track directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEntry {
    /// Directory name, used to prefix output files
    pub name: String,

    /// Track directory
    pub dir: PathBuf,
}

impl TrackEntry {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    pub fn mixture_path(&self) -> PathBuf {
        self.dir.join(format!("{}.wav", MIXTURE_STEM))
    }

    pub fn source_path(&self, target: Target) -> PathBuf {
        self.dir.join(format!("{}.wav", target.name()))
    }
}

/// Tracks of one dataset split
#[derive(Debug, Clone)]
pub struct Dataset {
    root: PathBuf,
    split: String,
    tracks: Vec<TrackEntry>,
}

impl Dataset {
    /// List the track directories under `root/split`, sorted by name
    pub fn discover<P: AsRef<Path>>(root: P, split: &str) -> UnmixResult<Self> {
        let root = root.as_ref().to_path_buf();
        let split_dir = root.join(split);
        if !split_dir.is_dir() {
            return Err(UnmixError::Load(format!(
                "split directory not found: {}",
                split_dir.display()
            )));
        }

        let mut tracks = Vec::new();
        for entry in WalkDir::new(&split_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| UnmixError::Load(format!("{}: {}", split_dir.display(), e)))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            tracks.push(TrackEntry::new(name, entry.path()));
        }
        tracks.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("{} tracks in {}", tracks.len(), split_dir.display());
        Ok(Self {
            root,
            split: split.to_string(),
            tracks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split(&self) -> &str {
        &self.split
    }

    pub fn tracks(&self) -> &[TrackEntry] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_sorted_directories() {
        let dir = TempDir::new().unwrap();
        let split = dir.path().join("test");
        for name in ["Zeta - Song", "Alpha - Song", "Mid - Song"] {
            std::fs::create_dir_all(split.join(name)).unwrap();
        }
        std::fs::write(split.join("README.txt"), "not a track").unwrap();

        let dataset = Dataset::discover(dir.path(), "test").unwrap();
        let names: Vec<&str> = dataset.tracks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha - Song", "Mid - Song", "Zeta - Song"]);
        assert_eq!(dataset.split(), "test");
    }

    #[test]
    fn test_nested_directories_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("train/track/stems")).unwrap();

        let dataset = Dataset::discover(dir.path(), "train").unwrap();
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_missing_split_is_load_error() {
        let dir = TempDir::new().unwrap();
        let result = Dataset::discover(dir.path(), "test");
        assert!(matches!(result, Err(UnmixError::Load(_))));
    }

    #[test]
    fn test_track_paths() {
        let track = TrackEntry::new("song", "/data/test/song");
        assert_eq!(track.mixture_path(), PathBuf::from("/data/test/song/mixture.wav"));
        assert_eq!(
            track.source_path(Target::Bass),
            PathBuf::from("/data/test/song/bass.wav")
        );
    }
}
