//! Capture configuration: render targets, viewports and frame schedules.

use crate::result::{ExportError, ExportarResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Frame rate used for GIF-mode sequences (frames per second)
pub const GIF_FRAME_RATE: u32 = 10;

/// Frame rate used for video-mode sequences (frames per second)
pub const VIDEO_FRAME_RATE: u32 = 30;

/// Opaque URL of the page to capture.
///
/// Immutable for the lifetime of a request; the pipeline never parses it
/// beyond deriving a suggested output filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTarget(String);

impl RenderTarget {
    /// Wrap a fully-qualified URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The target URL as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last non-empty path segment, used for suggested filenames.
    ///
    /// Falls back to `"export"` when the URL has no usable path.
    #[must_use]
    pub fn slug(&self) -> &str {
        self.0
            .split(['?', '#'])
            .next()
            .unwrap_or(&self.0)
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty() && !s.contains(':'))
            .unwrap_or("export")
    }
}

impl std::fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RenderTarget {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

/// Fixed viewport applied to a capture session.
///
/// Per-mode configuration, not request state: the invitation presets match
/// the mobile dimensions the themes are authored for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSpec {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
    /// Device pixel density scale
    pub device_scale_factor: f64,
}

impl ViewportSpec {
    /// Create a viewport with a 1.0 density scale
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_scale_factor: 1.0,
        }
    }

    /// Set the device pixel density scale
    #[must_use]
    pub const fn with_scale(mut self, scale: f64) -> Self {
        self.device_scale_factor = scale;
        self
    }

    /// Mobile invitation viewport for GIF-rate exports (430x932 @1.5)
    #[must_use]
    pub const fn gif_invitation() -> Self {
        Self::new(430, 932).with_scale(1.5)
    }

    /// Mobile invitation viewport for video-rate exports (430x932 @2.0)
    #[must_use]
    pub const fn video_invitation() -> Self {
        Self::new(430, 932).with_scale(2.0)
    }

    /// Physical pixel width after density scaling
    #[must_use]
    pub fn pixel_width(&self) -> u32 {
        (f64::from(self.width) * self.device_scale_factor).round() as u32
    }

    /// Physical pixel height after density scaling
    #[must_use]
    pub fn pixel_height(&self) -> u32 {
        (f64::from(self.height) * self.device_scale_factor).round() as u32
    }
}

impl Default for ViewportSpec {
    fn default() -> Self {
        Self::gif_invitation()
    }
}

/// Schedule for a timed frame-capture loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Frames per second
    pub frame_rate: u32,
    /// Capture duration in seconds
    pub duration_secs: u32,
    /// Viewport shared by every frame in the sequence
    pub viewport: ViewportSpec,
}

impl CaptureConfig {
    /// Create a capture schedule.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` unless `frame_rate * duration_secs >= 1`.
    pub fn new(frame_rate: u32, duration_secs: u32) -> ExportarResult<Self> {
        if frame_rate == 0 || duration_secs == 0 {
            return Err(ExportError::InvalidConfig {
                message: format!(
                    "frame_rate ({frame_rate}) and duration_secs ({duration_secs}) must both be positive"
                ),
            });
        }
        Ok(Self {
            frame_rate,
            duration_secs,
            viewport: ViewportSpec::default(),
        })
    }

    /// GIF-rate schedule (10 fps) with the GIF invitation viewport
    pub fn gif(duration_secs: u32) -> ExportarResult<Self> {
        Ok(Self::new(GIF_FRAME_RATE, duration_secs)?.with_viewport(ViewportSpec::gif_invitation()))
    }

    /// Video-rate schedule (30 fps) with the video invitation viewport
    pub fn video(duration_secs: u32) -> ExportarResult<Self> {
        Ok(Self::new(VIDEO_FRAME_RATE, duration_secs)?
            .with_viewport(ViewportSpec::video_invitation()))
    }

    /// Set the viewport
    #[must_use]
    pub const fn with_viewport(mut self, viewport: ViewportSpec) -> Self {
        self.viewport = viewport;
        self
    }

    /// Total frames in the sequence (`frame_rate * duration_secs`, >= 1)
    #[must_use]
    pub const fn total_frames(&self) -> u32 {
        self.frame_rate * self.duration_secs
    }

    /// Sleep between consecutive captures (`1 / frame_rate`)
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.frame_rate.max(1)))
    }
}

/// Export modes supported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportMode {
    /// Single settled frame
    Still,
    /// GIF-rate frame sequence
    Gif,
    /// Video-rate frame sequence
    Video,
}
