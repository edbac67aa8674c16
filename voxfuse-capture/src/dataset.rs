//! [`FrameSource`] over an extracted capture directory.

use crate::error::CaptureError;
use crate::layout::CaptureLayout;
use crate::legacy::read_csv;
use crate::manifest::{Manifest, ManifestFrame, camera_intrinsics};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use voxfuse_data::{CameraId, StereoRig};
use voxfuse_fusion::ingest::{
    ColorEncoding, DepthEncoding, FrameSource, PoseSource, RawColor, RawDepth, RawFrame,
    SourceError,
};

/// Color resolution assumed when a camera has no image format file.
pub const DEFAULT_IMAGE_SIZE: (u32, u32) = (640, 480);
/// Depth resolution assumed when no depth descriptor matches a frame.
pub const DEFAULT_DEPTH_SIZE: (u32, u32) = (320, 320);
/// Largest timestamp gap for matching a depth descriptor to a frame.
pub const DESCRIPTOR_MATCH_MS: i64 = 100;
/// Meters per unit of 16-bit depth images.
pub const DEPTH_PNG_SCALE: f32 = 0.001;

/// Which cameras of the rig to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSelection {
    #[default]
    Left,
    Right,
    Both,
}

impl CameraSelection {
    pub fn cameras(self) -> &'static [CameraId] {
        match self {
            CameraSelection::Left => &[CameraId::Left],
            CameraSelection::Right => &[CameraId::Right],
            CameraSelection::Both => &[CameraId::Left, CameraId::Right],
        }
    }
}

impl FromStr for CameraSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown camera '{other}' (expected left, right or both)")),
        }
    }
}

impl fmt::Display for CameraSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CameraSelection::Left => "left",
            CameraSelection::Right => "right",
            CameraSelection::Both => "both",
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ImageFormat {
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
struct DepthDescriptor {
    timestamp_ms: i64,
    width: u32,
    height: u32,
}

/// Per-camera file format information.
#[derive(Debug, Clone)]
struct CameraFormat {
    camera: CameraId,
    image_size: (u32, u32),
    descriptors: Vec<DepthDescriptor>,
}

impl CameraFormat {
    fn load(root: &Path, camera: CameraId) -> Result<Self, CaptureError> {
        let format_path = root.join(format!("{camera}_camera_image_format.json"));
        let image_size = if format_path.is_file() {
            let format: ImageFormat = serde_json::from_str(&std::fs::read_to_string(&format_path)?)?;
            (format.width, format.height)
        } else {
            DEFAULT_IMAGE_SIZE
        };

        let descriptor_path = root.join(format!("{camera}_depth_descriptors.csv"));
        let descriptors = if descriptor_path.is_file() {
            read_csv(&descriptor_path)?
        } else {
            Vec::new()
        };

        Ok(Self {
            camera,
            image_size,
            descriptors,
        })
    }

    /// Depth resolution recorded closest to `timestamp_ms`.
    fn depth_size(&self, timestamp_ms: i64) -> (u32, u32) {
        self.descriptors
            .iter()
            .map(|d| ((d.timestamp_ms - timestamp_ms).abs(), d))
            .filter(|(gap, _)| *gap < DESCRIPTOR_MATCH_MS)
            .min_by_key(|(gap, _)| *gap)
            .map_or(DEFAULT_DEPTH_SIZE, |(_, d)| (d.width, d.height))
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Reads records camera by camera, frame by frame, from a capture directory.
pub struct DatasetSource {
    layout: CaptureLayout,
    manifest: Manifest,
    formats: Vec<CameraFormat>,
    rig: StereoRig,
    cursor: usize,
}

impl DatasetSource {
    /// Detect the layout of `root` and index its frames.
    #[tracing::instrument(skip_all, fields(root = %root.display(), cameras = %selection))]
    pub fn open(root: &Path, selection: CameraSelection) -> Result<Self, CaptureError> {
        let layout = CaptureLayout::detect(root)?;
        let manifest = layout.load()?;
        let formats = selection
            .cameras()
            .iter()
            .map(|&camera| CameraFormat::load(root, camera))
            .collect::<Result<Vec<_>, _>>()?;
        let rig = manifest.stereo_rig();
        info!(
            "Opened {} dataset: {} frames, baseline {:.3} m",
            layout.name(),
            manifest.frames.len(),
            rig.baseline
        );
        Ok(Self {
            layout,
            manifest,
            formats,
            rig,
            cursor: 0,
        })
    }

    pub fn layout(&self) -> &CaptureLayout {
        &self.layout
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.layout.root().join(relative)
    }

    fn read_color(&self, relative: &str, format: &CameraFormat) -> Result<RawColor, CaptureError> {
        let path = self.path(relative);
        if !path.is_file() {
            return Err(CaptureError::MissingFile(path));
        }
        if has_extension(&path, &["png", "jpg", "jpeg", "bmp"]) {
            let image = image::open(&path)?.to_rgb8();
            let (width, height) = image.dimensions();
            return Ok(RawColor {
                data: image.into_raw(),
                width,
                height,
                encoding: ColorEncoding::Rgb8,
            });
        }
        let encoding = if has_extension(&path, &["yuv"]) {
            ColorEncoding::I420
        } else {
            ColorEncoding::Auto
        };
        let (width, height) = format.image_size;
        Ok(RawColor {
            data: std::fs::read(&path)?,
            width,
            height,
            encoding,
        })
    }

    /// Depth for one record. A listed but absent depth file yields no depth.
    fn read_depth(
        &self,
        relative: &str,
        timestamp_ms: i64,
        format: &CameraFormat,
    ) -> Result<Option<RawDepth>, CaptureError> {
        let path = self.path(relative);
        if !path.is_file() {
            debug!("Depth file {} missing", path.display());
            return Ok(None);
        }
        if has_extension(&path, &["png"]) {
            let image = image::open(&path)?.into_luma16();
            let (width, height) = image.dimensions();
            return Ok(Some(RawDepth {
                data: image.into_raw().iter().flat_map(|d| d.to_le_bytes()).collect(),
                width,
                height,
                encoding: DepthEncoding::U16,
                scale: DEPTH_PNG_SCALE,
            }));
        }
        let (width, height) = format.depth_size(timestamp_ms);
        Ok(Some(RawDepth {
            data: std::fs::read(&path)?,
            width,
            height,
            encoding: DepthEncoding::F32,
            scale: 1.0,
        }))
    }

    fn read_record(
        &self,
        index: usize,
        frame: &ManifestFrame,
        format: &CameraFormat,
    ) -> Result<RawFrame, CaptureError> {
        let camera = format.camera;
        let files = frame.cameras.get(camera);
        let image = files.and_then(|f| f.image.as_deref()).ok_or_else(|| {
            CaptureError::Manifest(format!("frame {} has no {camera} image", frame.frame_id))
        })?;
        let color = self.read_color(image, format)?;
        let depth = match files.and_then(|f| f.depth.as_deref()) {
            Some(relative) => self.read_depth(relative, frame.timestamp, format)?,
            None => None,
        };
        let intrinsics = camera_intrinsics(
            self.manifest.camera_metadata.get(camera),
            color.width,
            color.height,
        );

        Ok(RawFrame {
            index,
            timestamp_ms: frame.timestamp,
            camera,
            color,
            depth,
            pose: PoseSource::Head(frame.pose.matrix()),
            intrinsics,
        })
    }
}

impl FrameSource for DatasetSource {
    fn frames_total(&self) -> usize {
        self.manifest.frames.len() * self.formats.len()
    }

    fn stereo_rig(&self) -> Option<StereoRig> {
        Some(self.rig)
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        if self.formats.is_empty() || self.cursor >= self.frames_total() {
            return Ok(None);
        }
        let index = self.cursor;
        self.cursor += 1;

        let frame = &self.manifest.frames[index / self.formats.len()];
        let format = &self.formats[index % self.formats.len()];
        self.read_record(index, frame, format)
            .map(Some)
            .map_err(|err| SourceError::Frame {
                index,
                message: err.to_string(),
            })
    }
}
