pub mod buffer;
pub mod frame;
pub mod health;
pub mod source;

pub use buffer::FrameBuffer;
pub use frame::Frame;
pub use health::{normalize_camera_health, CameraHealth, CameraStatus};
pub use source::{CameraKind, CameraSource, SourceError};
