//! Invitation lookup boundary.
//!
//! The pipeline never constructs invitation URLs itself: a collaborator
//! resolves an opaque invitation identifier to the fully-qualified URL of
//! the rendered page, and the exporter drives the pipeline against it.

use crate::config::{ExportMode, RenderTarget};
use crate::pipeline::{
    ExportOutput, ExportPipeline, DEFAULT_GIF_DURATION_SECS, DEFAULT_VIDEO_DURATION_SECS,
};
use crate::result::{ExportError, ExportarResult};
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves opaque invitation identifiers to render targets.
#[async_trait]
pub trait InvitationLookup: Send + Sync {
    /// The URL of the rendered invitation page, or `None` when the
    /// identifier is unknown
    async fn resolve(&self, id: &str) -> Option<RenderTarget>;
}

/// Fixed in-memory lookup, used by the CLI and tests
#[derive(Debug, Default, Clone)]
pub struct StaticLookup {
    targets: HashMap<String, RenderTarget>,
}

impl StaticLookup {
    /// Create an empty lookup
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an invitation identifier
    #[must_use]
    pub fn with_invitation(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.targets.insert(id.into(), RenderTarget::new(url));
        self
    }
}

#[async_trait]
impl InvitationLookup for StaticLookup {
    async fn resolve(&self, id: &str) -> Option<RenderTarget> {
        self.targets.get(id).cloned()
    }
}

/// Resolves invitations and dispatches exports by mode, with the default
/// durations the product uses (GIF 8 s, video 12 s).
pub struct InvitationExporter<L> {
    lookup: L,
    pipeline: ExportPipeline,
}

impl<L: InvitationLookup> InvitationExporter<L> {
    /// Create an exporter over a lookup and a pipeline
    pub fn new(lookup: L, pipeline: ExportPipeline) -> Self {
        Self { lookup, pipeline }
    }

    /// Export an invitation by identifier.
    ///
    /// # Errors
    ///
    /// `InvitationNotFound` for unknown identifiers; otherwise whatever
    /// the pipeline propagates.
    pub async fn export(&self, id: &str, mode: ExportMode) -> ExportarResult<ExportOutput> {
        let target = self
            .lookup
            .resolve(id)
            .await
            .ok_or_else(|| ExportError::InvitationNotFound { id: id.to_string() })?;

        match mode {
            ExportMode::Still => self.pipeline.export_still(&target).await,
            ExportMode::Gif => {
                self.pipeline
                    .export_gif(&target, DEFAULT_GIF_DURATION_SECS)
                    .await
            }
            ExportMode::Video => {
                self.pipeline
                    .export_video(&target, DEFAULT_VIDEO_DURATION_SECS)
                    .await
            }
        }
    }

    /// The underlying pipeline
    #[must_use]
    pub const fn pipeline(&self) -> &ExportPipeline {
        &self.pipeline
    }
}

#[cfg(all(test, not(feature = "browser")))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::runtime::RendererRuntime;
    use crate::sequencer::FrameSequencer;

    fn exporter() -> InvitationExporter<StaticLookup> {
        let lookup =
            StaticLookup::new().with_invitation("abc123", "https://x/invite/rose_whisper/abc123");
        let pipeline = ExportPipeline::new(RendererRuntime::with_executable("/usr/bin/chromium"))
            .with_sequencer(FrameSequencer::silent());
        InvitationExporter::new(lookup, pipeline)
    }

    #[tokio::test(start_paused = true)]
    async fn test_known_invitation_exports() {
        let output = exporter().export("abc123", ExportMode::Still).await.unwrap();
        assert_eq!(output.suggested_filename, "invitation_abc123.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_invitation_is_not_found() {
        let err = exporter()
            .export("nope", ExportMode::Gif)
            .await
            .unwrap_err();
        match err {
            ExportError::InvitationNotFound { id } => assert_eq!(id, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
