//! On-disk dataset layouts. Everything downstream works on a [`Manifest`]
//! regardless of which layout it came from.

use crate::error::CaptureError;
use crate::legacy::{HMD_POSES, load_legacy};
use crate::manifest::Manifest;
use std::path::{Path, PathBuf};

pub const FRAMES_JSON: &str = "frames.json";

/// A recognised capture layout rooted at a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureLayout {
    /// `frames.json` manifest with camera metadata
    FramesJson(PathBuf),
    /// `hmd_poses.csv` plus per-camera folders
    LegacyHmdCsv(PathBuf),
}

impl CaptureLayout {
    /// Recognise the layout of `root`, preferring `frames.json`.
    pub fn detect(root: &Path) -> Result<Self, CaptureError> {
        if root.join(FRAMES_JSON).is_file() {
            Ok(Self::FramesJson(root.to_path_buf()))
        } else if root.join(HMD_POSES).is_file() {
            Ok(Self::LegacyHmdCsv(root.to_path_buf()))
        } else {
            Err(CaptureError::UnknownLayout(root.to_path_buf()))
        }
    }

    pub fn root(&self) -> &Path {
        match self {
            Self::FramesJson(root) | Self::LegacyHmdCsv(root) => root,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FramesJson(_) => "frames.json",
            Self::LegacyHmdCsv(_) => "hmd_poses.csv",
        }
    }

    pub fn load(&self) -> Result<Manifest, CaptureError> {
        match self {
            Self::FramesJson(root) => Manifest::from_json_file(&root.join(FRAMES_JSON)),
            Self::LegacyHmdCsv(root) => load_legacy(root),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_prefers_frames_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CaptureLayout::detect(dir.path()),
            Err(CaptureError::UnknownLayout(_))
        ));

        std::fs::write(dir.path().join(HMD_POSES), "unix_time\n").unwrap();
        assert_eq!(
            CaptureLayout::detect(dir.path()).unwrap(),
            CaptureLayout::LegacyHmdCsv(dir.path().to_path_buf())
        );

        std::fs::write(dir.path().join(FRAMES_JSON), "{\"frames\": []}").unwrap();
        let layout = CaptureLayout::detect(dir.path()).unwrap();
        assert_eq!(layout.name(), "frames.json");
        assert!(layout.load().unwrap().frames.is_empty());
    }
}
