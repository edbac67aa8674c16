//! Frame ingestion: raw records, normalization, depth validation and pose
//! resolution.

pub mod normalizer;
pub mod pose;
pub mod raw;
pub mod source;
pub mod validator;

pub use normalizer::{NormalizeError, align_depth, normalize_color, normalize_depth};
pub use pose::{PoseError, PoseResolver, pose_from_position_quaternion, validate_pose};
pub use raw::{ColorEncoding, DepthEncoding, PoseSource, RawColor, RawDepth, RawFrame};
pub use source::{FrameSource, SourceError, VecFrameSource};
pub use validator::{DepthClass, DepthValidator};
