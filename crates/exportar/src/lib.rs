//! Exportar: headless rendering-capture pipeline for invitation pages.
//!
//! Exportar (Spanish: "to export") drives a headless browser against a
//! rendered invitation page and produces either a single still image or a
//! timed sequence of frames ready for GIF/video assembly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    EXPORTAR Pipeline                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐   ┌────────────┐   ┌────────────┐             │
//! │   │ Export     │──►│ Frame      │──►│ Capture    │             │
//! │   │ Pipeline   │   │ Sequencer  │   │ Session    │             │
//! │   └────────────┘   └────────────┘   └─────┬──────┘             │
//! │                                           ▼                     │
//! │                                    ┌────────────┐               │
//! │                                    │ Renderer   │               │
//! │                                    │ Runtime    │               │
//! │                                    └────────────┘               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows strictly downward; the runtime's one-time engine
//! acquisition is the only state shared across concurrent exports.
//! Sessions, temporary directories and frame buffers are request-local.
//!
//! With the `browser` feature enabled the session layer drives a real
//! Chromium over CDP (chromiumoxide); without it, a deterministic
//! in-process stand-in renders synthetic frames for tests.

#![warn(missing_docs)]
// Lints are configured in the workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod invitation;
mod pipeline;
mod result;
mod runtime;
mod sequencer;
mod session;

/// Media encoders for captured frame sequences
pub mod media;

pub use config::{
    CaptureConfig, ExportMode, RenderTarget, ViewportSpec, GIF_FRAME_RATE, VIDEO_FRAME_RATE,
};
pub use invitation::{InvitationExporter, InvitationLookup, StaticLookup};
pub use pipeline::{
    ExportOutput, ExportPipeline, DEFAULT_GIF_DURATION_SECS, DEFAULT_VIDEO_DURATION_SECS,
    STILL_SETTLE_DELAY_MS,
};
pub use result::{ExportError, ExportarResult};
pub use runtime::{DefaultProvisioner, EngineProvisioner, RendererRuntime, ENGINE_PATH_ENV};
pub use sequencer::{
    CancelFlag, Frame, FrameSequence, FrameSequencer, LogObserver, ProgressObserver,
    PROGRESS_INTERVAL,
};
pub use session::{CaptureSession, NAVIGATION_TIMEOUT_MS, NETWORK_IDLE_THRESHOLD_MS};
