//! Timed frame-capture loop producing ordered, all-or-nothing sequences.

use crate::config::CaptureConfig;
use crate::result::{ExportError, ExportarResult};
use crate::session::CaptureSession;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Frames between progress notifications
pub const PROGRESS_INTERVAL: u32 = 30;

/// One screenshot taken at a point in time during a capture session
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based capture index, equal to presentation order
    pub index: u32,
    /// PNG-encoded image bytes
    pub data: Vec<u8>,
}

/// An ordered, fixed-length collection of frames captured at a fixed rate.
///
/// Indices are contiguous and zero-based; a sequence is only ever returned
/// whole, never partially.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<Frame>,
}

impl FrameSequence {
    /// Build a sequence from frames already in capture order
    #[must_use]
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Number of frames in the sequence
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the sequence holds no frames
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All frames in capture order
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The first frame, if any
    #[must_use]
    pub fn first_frame(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// The middle frame (`frames[len / 2]`), if any
    #[must_use]
    pub fn middle_frame(&self) -> Option<&Frame> {
        self.frames.get(self.frames.len() / 2)
    }

    /// Consume the sequence, yielding its frames
    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

/// Advisory progress notifications from a running capture loop.
///
/// Never affects control flow; observers must not block.
pub trait ProgressObserver: Send + Sync {
    /// Called every [`PROGRESS_INTERVAL`] frames and after the final frame
    fn on_progress(&self, captured: u32, total: u32);
}

/// Observer that reports progress through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, captured: u32, total: u32) {
        tracing::info!(captured, total, "capture progress");
    }
}

/// Cloneable cancellation signal for an in-flight export.
///
/// Cancelling aborts the capture loop at the next tick; session and
/// temp-directory cleanup still run in full.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a flag in the not-cancelled state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been signalled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Drives the timed loop pulling frames from a session at a fixed rate.
pub struct FrameSequencer {
    observer: Option<Box<dyn ProgressObserver>>,
}

impl Default for FrameSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSequencer")
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl FrameSequencer {
    /// Create a sequencer reporting progress through `tracing`
    #[must_use]
    pub fn new() -> Self {
        Self {
            observer: Some(Box::new(LogObserver)),
        }
    }

    /// Create a sequencer with a custom progress observer
    #[must_use]
    pub fn with_observer(observer: Box<dyn ProgressObserver>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// Create a sequencer that reports no progress
    #[must_use]
    pub fn silent() -> Self {
        Self { observer: None }
    }

    /// Capture `config.total_frames()` frames from the session, pacing at
    /// `1 / frame_rate` between captures.
    ///
    /// Pacing is best-effort sleep-until-next-tick: missed deadlines are
    /// not compensated by dropping frames, since invitation animations are
    /// short and minor drift is visually acceptable.
    ///
    /// # Errors
    ///
    /// All-or-nothing: a single failed capture abandons the sequence and
    /// propagates `CaptureFailed` with the failing index, because a broken
    /// sequence cannot be meaningfully encoded downstream. A signalled
    /// `CancelFlag` aborts with `Cancelled` at the next tick.
    pub async fn capture_sequence(
        &self,
        session: &mut CaptureSession,
        config: &CaptureConfig,
        cancel: &CancelFlag,
    ) -> ExportarResult<FrameSequence> {
        let total = config.total_frames();
        let interval = config.frame_interval();
        let mut frames = Vec::with_capacity(total as usize);

        tracing::info!(
            total,
            frame_rate = config.frame_rate,
            duration_secs = config.duration_secs,
            "capturing frame sequence"
        );

        for index in 0..total {
            if cancel.is_cancelled() {
                tracing::info!(frames_captured = index, "capture cancelled");
                return Err(ExportError::Cancelled {
                    frames_captured: index,
                });
            }

            let data = session.capture_frame().await?;
            frames.push(Frame { index, data });

            if let Some(observer) = &self.observer {
                let captured = index + 1;
                if captured % PROGRESS_INTERVAL == 0 || captured == total {
                    observer.on_progress(captured, total);
                }
            }

            // No wait after the final frame; there is no next capture.
            if index + 1 < total {
                tokio::time::sleep(interval).await;
            }
        }

        Ok(FrameSequence::new(frames))
    }
}

#[cfg(all(test, not(feature = "browser")))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{RenderTarget, ViewportSpec};
    use crate::runtime::RendererRuntime;
    use std::sync::atomic::AtomicUsize;

    async fn open_session(url: &str) -> CaptureSession {
        let runtime = RendererRuntime::with_executable("/usr/bin/chromium");
        CaptureSession::open(&runtime, &RenderTarget::new(url), ViewportSpec::new(4, 4))
            .await
            .unwrap()
    }

    fn config(rate: u32, secs: u32) -> CaptureConfig {
        CaptureConfig::new(rate, secs)
            .unwrap()
            .with_viewport(ViewportSpec::new(4, 4))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_has_exactly_total_frames() {
        let mut session = open_session("https://x/invite/abc").await;
        let sequence = FrameSequencer::silent()
            .capture_sequence(&mut session, &config(10, 8), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(sequence.len(), 80);
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_indices_contiguous_zero_based() {
        let mut session = open_session("https://x/invite/abc").await;
        let sequence = FrameSequencer::silent()
            .capture_sequence(&mut session, &config(5, 2), &CancelFlag::new())
            .await
            .unwrap();

        for (i, frame) in sequence.frames().iter().enumerate() {
            assert_eq!(frame.index, i as u32);
        }
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_sequence_failure_abandons_everything() {
        let mut session = open_session("https://x/invite/abc?fail_frame=150").await;
        let err = FrameSequencer::silent()
            .capture_sequence(&mut session, &config(30, 10), &CancelFlag::new())
            .await
            .unwrap_err();

        match err {
            ExportError::CaptureFailed { frame_index, .. } => assert_eq!(frame_index, 150),
            other => panic!("unexpected error: {other}"),
        }
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_promptly() {
        let mut session = open_session("https://x/invite/abc").await;
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = FrameSequencer::silent()
            .capture_sequence(&mut session, &config(10, 60), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled { frames_captured: 0 }));
        session.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reported_every_interval() {
        struct Recorder(AtomicUsize);
        impl ProgressObserver for Recorder {
            fn on_progress(&self, _captured: u32, _total: u32) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let recorder = Arc::new(Recorder(AtomicUsize::new(0)));

        struct Shared(Arc<Recorder>);
        impl ProgressObserver for Shared {
            fn on_progress(&self, captured: u32, total: u32) {
                self.0.on_progress(captured, total);
            }
        }

        let mut session = open_session("https://x/invite/abc").await;
        // 90 frames: notifications at 30, 60 and 90 (90 is also the final frame)
        FrameSequencer::with_observer(Box::new(Shared(Arc::clone(&recorder))))
            .capture_sequence(&mut session, &config(30, 3), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(recorder.0.load(Ordering::SeqCst), 3);
        session.close().await;
    }

    #[test]
    fn test_middle_and_first_frame_selection() {
        let frames = (0..80)
            .map(|index| Frame {
                index,
                data: vec![index as u8],
            })
            .collect();
        let sequence = FrameSequence::new(frames);

        assert_eq!(sequence.first_frame().unwrap().index, 0);
        assert_eq!(sequence.middle_frame().unwrap().index, 40);
    }

    #[test]
    fn test_default_sequencer_logs_like_new() {
        // Debug output exposes whether an observer is attached
        assert_eq!(
            format!("{:?}", FrameSequencer::default()),
            format!("{:?}", FrameSequencer::new())
        );
        assert_ne!(
            format!("{:?}", FrameSequencer::default()),
            format!("{:?}", FrameSequencer::silent())
        );
    }

    #[test]
    fn test_empty_sequence_accessors() {
        let sequence = FrameSequence::new(Vec::new());
        assert!(sequence.is_empty());
        assert!(sequence.first_frame().is_none());
        assert!(sequence.middle_frame().is_none());
    }
}
