//! Recording and encoding defaults.

/// Default viewport width (vertical 9:16 video).
pub const DEFAULT_WIDTH: u32 = 1080;
/// Default viewport height.
pub const DEFAULT_HEIGHT: u32 = 1920;
/// Default frame rate.
pub const DEFAULT_FRAME_RATE: u32 = 25;
/// Default recording duration in milliseconds.
pub const DEFAULT_DURATION_MS: u64 = 10_000;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Pixel format with the widest player support.
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "veryfast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 23;

/// Content types for uploaded artifacts.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";
