//! The legacy export layout: `hmd_poses.csv` next to per-camera folders of
//! raw `.yuv` images and `.raw` depth maps.

use crate::error::CaptureError;
use crate::manifest::{
    CameraFiles, CameraMetadata, CameraMetadataMap, FrameCameras, HeadPose, Manifest,
    ManifestFrame,
};
use csv::StringRecord;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

pub const HMD_POSES: &str = "hmd_poses.csv";

/// One row of `hmd_poses.csv`. Extra columns are ignored.
#[derive(Debug, Clone, Copy, Deserialize)]
struct PoseRow {
    unix_time: i64,
    pos_x: f32,
    pos_y: f32,
    pos_z: f32,
    rot_w: f32,
    rot_x: f32,
    rot_y: f32,
    rot_z: f32,
}

/// Deserialize every record of a headed CSV file into `T`, matching columns
/// by header name.
pub(crate) fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CaptureError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| csv_error(path, &err, None))?;
    let headers = reader
        .headers()
        .map_err(|err| csv_error(path, &err, None))?
        .clone();
    reader
        .deserialize()
        .map(|row| row.map_err(|err| csv_error(path, &err, Some(&headers))))
        .collect()
}

fn csv_error(path: &Path, err: &csv::Error, headers: Option<&StringRecord>) -> CaptureError {
    let line = err.position().map_or(1, |pos| pos.line() as usize);
    let message = match err.kind() {
        csv::ErrorKind::Deserialize { err: de, .. } => {
            let column = de
                .field()
                .and_then(|i| headers.and_then(|h| h.get(i as usize)));
            match column {
                Some(name) => format!("bad value for '{name}': {}", de.kind()),
                None => de.kind().to_string(),
            }
        }
        _ => err.to_string(),
    };
    CaptureError::Csv {
        path: path.to_path_buf(),
        line,
        message,
    }
}

/// Read the head pose track.
pub fn read_hmd_poses(path: &Path) -> Result<Vec<(i64, HeadPose)>, CaptureError> {
    let rows: Vec<PoseRow> = read_csv(path)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            (
                row.unix_time,
                HeadPose {
                    position: [row.pos_x, row.pos_y, row.pos_z],
                    rotation: [row.rot_w, row.rot_x, row.rot_y, row.rot_z],
                },
            )
        })
        .collect())
}

/// Names of the files in `root/dir` with extension `ext`, sorted. A missing
/// folder yields no files.
fn list_files(root: &Path, dir: &str, ext: &str) -> Result<Vec<String>, CaptureError> {
    let path = root.join(dir);
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&path)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let matches = Path::new(&name)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches && entry.file_type()?.is_file() {
            names.push(format!("{dir}/{name}"));
        }
    }
    names.sort();
    Ok(names)
}

fn read_characteristics(path: &Path) -> Result<Option<CameraMetadata>, CaptureError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&text)?))
}

/// Build a manifest from the legacy layout. Frames pair the n-th pose with
/// the n-th file of every folder; the left image folder bounds the count.
#[tracing::instrument(skip_all, fields(root = %root.display()))]
pub fn load_legacy(root: &Path) -> Result<Manifest, CaptureError> {
    let poses_path = root.join(HMD_POSES);
    if !poses_path.exists() {
        return Err(CaptureError::MissingFile(poses_path));
    }
    let poses = read_hmd_poses(&poses_path)?;

    let left_images = list_files(root, "left_camera_raw", "yuv")?;
    let right_images = list_files(root, "right_camera_raw", "yuv")?;
    let left_depth = list_files(root, "left_depth", "raw")?;
    let right_depth = list_files(root, "right_depth", "raw")?;

    let count = left_images.len().min(poses.len());
    if count < poses.len() {
        warn!(
            "{} poses but only {} left images; extra poses ignored",
            poses.len(),
            left_images.len()
        );
    }

    let frames = (0..count)
        .map(|i| ManifestFrame {
            frame_id: i,
            timestamp: poses[i].0,
            pose: poses[i].1,
            cameras: FrameCameras {
                left: Some(CameraFiles {
                    image: left_images.get(i).cloned(),
                    depth: left_depth.get(i).cloned(),
                }),
                right: Some(CameraFiles {
                    image: right_images.get(i).cloned(),
                    depth: right_depth.get(i).cloned(),
                }),
            },
        })
        .collect();

    let camera_metadata = CameraMetadataMap {
        left: read_characteristics(&root.join("left_camera_characteristics.json"))?,
        right: read_characteristics(&root.join("right_camera_characteristics.json"))?,
    };
    info!("Indexed {} legacy frames", count);

    Ok(Manifest {
        version: None,
        source: Some("hmd_poses.csv".to_string()),
        camera_metadata,
        frames,
    })
}
