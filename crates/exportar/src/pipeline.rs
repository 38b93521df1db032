//! Export pipeline: the public orchestrator over runtime, session and
//! sequencer.
//!
//! Every operation ensures the rendering engine is ready, opens one
//! session, captures, and closes the session on every path — cleanup is
//! unconditional and runs exactly once, inside the component that acquired
//! the resource.

use crate::config::{CaptureConfig, RenderTarget, ViewportSpec};
use crate::media::{GifEncoder, GifSettings};
use crate::result::{ExportError, ExportarResult};
use crate::runtime::RendererRuntime;
use crate::sequencer::{CancelFlag, FrameSequence, FrameSequencer};
use crate::session::CaptureSession;
use std::time::Duration;

/// Settle delay before a still capture, letting the initial animation
/// state paint
pub const STILL_SETTLE_DELAY_MS: u64 = 1_000;

/// Default GIF export duration in seconds
pub const DEFAULT_GIF_DURATION_SECS: u32 = 8;

/// Default video export duration in seconds
pub const DEFAULT_VIDEO_DURATION_SECS: u32 = 12;

const PNG_MIME: &str = "image/png";
const GIF_MIME: &str = "image/gif";

/// An encoded export artifact
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Encoded image bytes
    pub data: Vec<u8>,
    /// MIME type of `data`
    pub mime_type: &'static str,
    /// Filename suggestion for download headers or saved files
    pub suggested_filename: String,
}

/// Orchestrates still, GIF-rate and video-rate exports.
#[derive(Debug)]
pub struct ExportPipeline {
    runtime: RendererRuntime,
    sequencer: FrameSequencer,
    gif_encoder: Option<GifEncoder>,
}

impl ExportPipeline {
    /// Create a pipeline over a renderer runtime
    #[must_use]
    pub fn new(runtime: RendererRuntime) -> Self {
        Self {
            runtime,
            sequencer: FrameSequencer::new(),
            gif_encoder: None,
        }
    }

    /// Replace the frame sequencer (custom progress observer, silence)
    #[must_use]
    pub fn with_sequencer(mut self, sequencer: FrameSequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    /// Encode GIF exports as real animated GIFs instead of returning the
    /// middle-frame placeholder
    #[must_use]
    pub fn with_gif_encoder(self) -> Self {
        self.with_gif_settings(GifSettings::default())
    }

    /// Enable GIF encoding with explicit settings
    #[must_use]
    pub fn with_gif_settings(mut self, settings: GifSettings) -> Self {
        self.gif_encoder = Some(GifEncoder::new(settings));
        self
    }

    /// Capture a single settled frame of the target as a PNG.
    ///
    /// # Errors
    ///
    /// `EngineUnavailable`, `NavigationFailed` or `CaptureFailed`,
    /// propagated unmodified.
    pub async fn export_still(&self, target: &RenderTarget) -> ExportarResult<ExportOutput> {
        self.runtime.ensure_ready().await?;
        tracing::info!(target = %target, "starting still export");

        let mut session =
            CaptureSession::open(&self.runtime, target, ViewportSpec::gif_invitation()).await?;
        let result = Self::capture_settled_frame(&mut session).await;
        session.close().await;
        let data = result?;

        tracing::info!(target = %target, bytes = data.len(), "still export complete");
        Ok(ExportOutput {
            data,
            mime_type: PNG_MIME,
            suggested_filename: format!("invitation_{}.png", target.slug()),
        })
    }

    async fn capture_settled_frame(session: &mut CaptureSession) -> ExportarResult<Vec<u8>> {
        tokio::time::sleep(Duration::from_millis(STILL_SETTLE_DELAY_MS)).await;
        session.capture_frame().await
    }

    /// Export a GIF-rate (10 fps) sequence of the target.
    ///
    /// With a GIF encoder enabled the whole sequence is returned as an
    /// animated `image/gif`; otherwise the middle frame stands in as a
    /// PNG until encoding is switched on.
    ///
    /// # Errors
    ///
    /// `EngineUnavailable`, `NavigationFailed` or `CaptureFailed`,
    /// propagated unmodified; never a partial sequence.
    pub async fn export_gif(
        &self,
        target: &RenderTarget,
        duration_secs: u32,
    ) -> ExportarResult<ExportOutput> {
        self.export_gif_with(target, duration_secs, &CancelFlag::new())
            .await
    }

    /// Cancellable variant of [`export_gif`](Self::export_gif)
    pub async fn export_gif_with(
        &self,
        target: &RenderTarget,
        duration_secs: u32,
        cancel: &CancelFlag,
    ) -> ExportarResult<ExportOutput> {
        tracing::info!(target = %target, duration_secs, "starting GIF export");
        let config = CaptureConfig::gif(duration_secs)?;
        let sequence = self.run_sequence(target, &config, cancel).await?;

        let output = if let Some(encoder) = &self.gif_encoder {
            ExportOutput {
                data: encoder.encode(&sequence)?,
                mime_type: GIF_MIME,
                suggested_filename: format!("invitation_{}.gif", target.slug()),
            }
        } else {
            // Placeholder until GIF encoding is enabled: the middle frame
            // is the most representative single moment of the animation.
            ExportOutput {
                data: take_frame(sequence, |s| s.len() / 2)?,
                mime_type: PNG_MIME,
                suggested_filename: format!("invitation_{}.png", target.slug()),
            }
        };

        tracing::info!(target = %target, bytes = output.data.len(), "GIF export complete");
        Ok(output)
    }

    /// Export a video-rate (30 fps) sequence of the target.
    ///
    /// Returns the first frame as a PNG placeholder pending integration of
    /// a real video encoder; the captured sequence already satisfies an
    /// encoder's contract.
    ///
    /// # Errors
    ///
    /// `EngineUnavailable`, `NavigationFailed` or `CaptureFailed`,
    /// propagated unmodified; never a partial sequence.
    pub async fn export_video(
        &self,
        target: &RenderTarget,
        duration_secs: u32,
    ) -> ExportarResult<ExportOutput> {
        self.export_video_with(target, duration_secs, &CancelFlag::new())
            .await
    }

    /// Cancellable variant of [`export_video`](Self::export_video)
    pub async fn export_video_with(
        &self,
        target: &RenderTarget,
        duration_secs: u32,
        cancel: &CancelFlag,
    ) -> ExportarResult<ExportOutput> {
        tracing::info!(target = %target, duration_secs, "starting video export");
        let config = CaptureConfig::video(duration_secs)?;
        let sequence = self.run_sequence(target, &config, cancel).await?;

        let output = ExportOutput {
            data: take_frame(sequence, |_| 0)?,
            mime_type: PNG_MIME,
            suggested_filename: format!("invitation_{}.png", target.slug()),
        };

        tracing::info!(target = %target, bytes = output.data.len(), "video export complete");
        Ok(output)
    }

    /// Open a session, run the sequencer, and close the session whatever
    /// the outcome. The session's temporary directory is removed with it.
    async fn run_sequence(
        &self,
        target: &RenderTarget,
        config: &CaptureConfig,
        cancel: &CancelFlag,
    ) -> ExportarResult<FrameSequence> {
        self.runtime.ensure_ready().await?;
        let mut session = CaptureSession::open(&self.runtime, target, config.viewport).await?;
        let result = self
            .sequencer
            .capture_sequence(&mut session, config, cancel)
            .await;
        session.close().await;
        result
    }

    /// The runtime backing this pipeline
    #[must_use]
    pub const fn runtime(&self) -> &RendererRuntime {
        &self.runtime
    }
}

fn take_frame(
    sequence: FrameSequence,
    pick: impl Fn(&FrameSequence) -> usize,
) -> ExportarResult<Vec<u8>> {
    let index = pick(&sequence);
    let mut frames = sequence.into_frames();
    if index >= frames.len() {
        // total_frames() >= 1 makes this unreachable for validated configs
        return Err(ExportError::ImageProcessing {
            message: "frame sequence unexpectedly empty".to_string(),
        });
    }
    Ok(frames.swap_remove(index).data)
}

#[cfg(all(test, not(feature = "browser")))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn pipeline() -> ExportPipeline {
        ExportPipeline::new(RendererRuntime::with_executable("/usr/bin/chromium"))
            .with_sequencer(FrameSequencer::silent())
    }

    /// The stand-in session fills frame N with shade `N * 7 % 256`, which
    /// lets these tests identify exactly which frame came back.
    fn frame_shade(png: &[u8]) -> u8 {
        let img = image::load_from_memory(png).unwrap();
        img.get_pixel(0, 0).0[0]
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_export_returns_png() {
        let target = RenderTarget::new("https://x/invite/rose_whisper/abc123");
        let output = pipeline().export_still(&target).await.unwrap();

        assert_eq!(output.mime_type, "image/png");
        assert_eq!(output.suggested_filename, "invitation_abc123.png");
        assert_eq!(&output.data[1..4], b"PNG");
    }

    #[tokio::test(start_paused = true)]
    async fn test_gif_placeholder_returns_middle_frame() {
        let target = RenderTarget::new("https://x/invite/rose_whisper/abc123");
        let output = pipeline().export_gif(&target, 8).await.unwrap();

        // 8s at 10 fps = 80 frames; the middle frame has index 40
        assert_eq!(output.mime_type, "image/png");
        assert_eq!(frame_shade(&output.data), (40 * 7 % 256) as u8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_placeholder_returns_first_frame() {
        let target = RenderTarget::new("https://x/invite/abc123");
        let output = pipeline().export_video(&target, 2).await.unwrap();

        assert_eq!(output.mime_type, "image/png");
        assert_eq!(frame_shade(&output.data), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gif_encoder_switches_mime_and_extension() {
        let target = RenderTarget::new("https://x/invite/abc123");
        let output = pipeline()
            .with_gif_encoder()
            .export_gif(&target, 1)
            .await
            .unwrap();

        assert_eq!(output.mime_type, "image/gif");
        assert_eq!(output.suggested_filename, "invitation_abc123.gif");
        assert_eq!(&output.data[0..6], b"GIF89a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_failure_propagates() {
        let target = RenderTarget::new("https://x/invite/gone?status=404");
        let err = pipeline().export_still(&target).await.unwrap_err();
        assert!(matches!(err, ExportError::NavigationFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_sequence_failure_returns_no_bytes() {
        let target = RenderTarget::new("https://x/invite/abc?fail_frame=150");
        let err = pipeline().export_video(&target, 10).await.unwrap_err();
        match err {
            ExportError::CaptureFailed { frame_index, .. } => assert_eq!(frame_index, 150),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_duration_rejected_before_any_session() {
        let target = RenderTarget::new("https://x/invite/abc");
        let err = pipeline().export_gif(&target, 0).await.unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfig { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_export_propagates() {
        let target = RenderTarget::new("https://x/invite/abc");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = pipeline()
            .export_gif_with(&target, 8, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled { .. }));
    }
}
