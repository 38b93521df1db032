//! Capture sessions: one isolated renderer page per export request.
//!
//! With the `browser` feature enabled the session drives a real Chromium
//! instance over CDP. Without it, a deterministic in-process renderer
//! stand-in synthesizes PNG frames, which is what the unit and integration
//! tests run against.
//!
//! A session exclusively owns its browser process and a request-scoped
//! temporary directory (the browser profile). Both are released on every
//! exit path: `close()` tears the browser down and the `TempDir` guard
//! removes the directory when the session is dropped.

/// Cap on the navigation wait; the session proceeds best-effort once it
/// elapses, since long-lived connections do not imply an unrendered page.
pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Quiet period after the load event before the page counts as settled
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

// ============================================================================
// Real CDP implementation (when the `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
mod cdp {
    use super::{NAVIGATION_TIMEOUT_MS, NETWORK_IDLE_THRESHOLD_MS};
    use crate::config::{RenderTarget, ViewportSpec};
    use crate::result::{ExportError, ExportarResult};
    use crate::runtime::RendererRuntime;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::page::{
        CaptureScreenshotFormat, CaptureScreenshotParams,
    };
    use chromiumoxide::handler::viewport::Viewport;
    use chromiumoxide::page::Page;
    use futures::StreamExt;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// One renderer page instance scoped to a single export request
    pub struct CaptureSession {
        target: RenderTarget,
        viewport: ViewportSpec,
        browser: Browser,
        page: Page,
        handler: tokio::task::JoinHandle<()>,
        temp_dir: TempDir,
        frames_captured: u32,
    }

    impl std::fmt::Debug for CaptureSession {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CaptureSession")
                .field("target", &self.target)
                .field("viewport", &self.viewport)
                .field("frames_captured", &self.frames_captured)
                .finish_non_exhaustive()
        }
    }

    impl CaptureSession {
        /// Launch an isolated browser, apply the viewport and navigate to
        /// the target, waiting until the page settles (capped at 30 s,
        /// best-effort proceed on timeout).
        ///
        /// # Errors
        ///
        /// `EngineUnavailable` if the browser cannot be launched,
        /// `NavigationFailed` if the target is unreachable or responds
        /// with a non-2xx status. On either, everything launched so far is
        /// released before the error returns.
        pub async fn open(
            runtime: &RendererRuntime,
            target: &RenderTarget,
            viewport: ViewportSpec,
        ) -> ExportarResult<Self> {
            let executable = runtime.ensure_ready().await?;
            let temp_dir = TempDir::with_prefix("exportar-session-")?;

            let config = BrowserConfig::builder()
                .chrome_executable(&executable)
                .no_sandbox()
                .user_data_dir(temp_dir.path())
                .viewport(Viewport {
                    width: viewport.width,
                    height: viewport.height,
                    device_scale_factor: Some(viewport.device_scale_factor),
                    emulating_mobile: true,
                    is_landscape: false,
                    has_touch: true,
                })
                .args(vec!["--disable-dev-shm-usage", "--disable-gpu"])
                .build()
                .map_err(ExportError::engine_unavailable)?;

            let (browser, mut handler_stream) = Browser::launch(config)
                .await
                .map_err(|e| ExportError::engine_unavailable(e.to_string()))?;

            let handler = tokio::spawn(async move {
                while let Some(event) = handler_stream.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            match Self::prepare_page(&browser, target).await {
                Ok(page) => {
                    tracing::debug!(target = %target, "capture session open");
                    Ok(Self {
                        target: target.clone(),
                        viewport,
                        browser,
                        page,
                        handler,
                        temp_dir,
                        frames_captured: 0,
                    })
                }
                Err(e) => {
                    Self::shutdown(browser, handler).await;
                    Err(e)
                }
            }
        }

        async fn prepare_page(browser: &Browser, target: &RenderTarget) -> ExportarResult<Page> {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| ExportError::engine_unavailable(e.to_string()))?;

            page.goto(target.as_str())
                .await
                .map_err(|e| ExportError::navigation_failed(target.as_str(), e.to_string()))?;

            // Best-effort readiness: a page holding connections open past
            // the cap still gets captured rather than failing the export.
            let wait = tokio::time::timeout(
                Duration::from_millis(NAVIGATION_TIMEOUT_MS),
                page.wait_for_navigation(),
            )
            .await;
            match wait {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    return Err(ExportError::navigation_failed(
                        target.as_str(),
                        e.to_string(),
                    ));
                }
                Err(_) => {
                    tracing::warn!(
                        target = %target,
                        timeout_ms = NAVIGATION_TIMEOUT_MS,
                        "navigation wait timed out, proceeding with best-effort render"
                    );
                }
            }

            Self::check_response_status(&page, target).await?;

            tokio::time::sleep(Duration::from_millis(NETWORK_IDLE_THRESHOLD_MS)).await;
            Ok(page)
        }

        /// Reject pages whose main document came back non-2xx.
        ///
        /// Chrome reports the navigation status through
        /// `PerformanceNavigationTiming.responseStatus`; engines too old to
        /// expose it report 0 and are let through.
        async fn check_response_status(page: &Page, target: &RenderTarget) -> ExportarResult<()> {
            let status: i64 = page
                .evaluate(
                    "window.performance.getEntriesByType('navigation')[0]?.responseStatus ?? 0",
                )
                .await
                .ok()
                .and_then(|v| v.into_value().ok())
                .unwrap_or(0);

            if status >= 400 {
                return Err(ExportError::navigation_failed(
                    target.as_str(),
                    format!("page responded with HTTP {status}"),
                ));
            }
            Ok(())
        }

        /// Take one PNG screenshot of the current viewport (not the full
        /// scrollable page).
        ///
        /// # Errors
        ///
        /// `CaptureFailed` carrying this session's capture counter, which
        /// equals the sequence index for sequential callers.
        pub async fn capture_frame(&mut self) -> ExportarResult<Vec<u8>> {
            let params = CaptureScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();

            let screenshot = self.page.execute(params).await.map_err(|e| {
                ExportError::capture_failed(self.frames_captured, e.to_string())
            })?;

            use base64::Engine;
            let data = base64::engine::general_purpose::STANDARD
                .decode(&screenshot.data)
                .map_err(|e| ExportError::capture_failed(self.frames_captured, e.to_string()))?;

            self.frames_captured += 1;
            Ok(data)
        }

        /// Release the browser process and the session's temporary
        /// directory. Cleanup failures are logged, not surfaced; there is
        /// nothing a caller could do with them.
        pub async fn close(self) {
            Self::shutdown(self.browser, self.handler).await;
            if let Err(e) = self.temp_dir.close() {
                tracing::warn!(error = %e, "failed to remove session temp directory");
            }
            tracing::debug!(target = %self.target, "capture session closed");
        }

        async fn shutdown(mut browser: Browser, handler: tokio::task::JoinHandle<()>) {
            if let Err(e) = browser.close().await {
                tracing::warn!(error = %e, "failed to close browser cleanly");
            }
            handler.abort();
        }

        /// The target this session is pointed at
        #[must_use]
        pub fn target(&self) -> &RenderTarget {
            &self.target
        }

        /// The fixed viewport every frame inherits
        #[must_use]
        pub const fn viewport(&self) -> ViewportSpec {
            self.viewport
        }

        /// Frames captured so far
        #[must_use]
        pub const fn frames_captured(&self) -> u32 {
            self.frames_captured
        }

        /// Path of the session's transient storage directory
        #[must_use]
        pub fn temp_dir_path(&self) -> &Path {
            self.temp_dir.path()
        }
    }
}

// ============================================================================
// Deterministic stand-in (when the `browser` feature is NOT enabled)
// ============================================================================

#[cfg(not(feature = "browser"))]
mod mock {
    use super::{NAVIGATION_TIMEOUT_MS, NETWORK_IDLE_THRESHOLD_MS};
    use crate::config::{RenderTarget, ViewportSpec};
    use crate::result::{ExportError, ExportarResult};
    use crate::runtime::RendererRuntime;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-process renderer stand-in.
    ///
    /// Synthesizes PNG frames at the viewport's pixel dimensions (capped
    /// at [`MOCK_MAX_DIMENSION`] per side so long synthetic sequences stay
    /// cheap), with a per-frame fill color so consecutive frames differ.
    /// Failure paths are scripted through query parameters on the target
    /// URL:
    ///
    /// - `status=404` (any value >= 400): `open` fails with
    ///   `NavigationFailed`, as a real 404 page would.
    /// - `fail_frame=N`: the N-th `capture_frame` call fails with
    ///   `CaptureFailed`.
    /// - `slow_nav=1`: navigation holds connections open past the
    ///   [`NAVIGATION_TIMEOUT_MS`] cap; `open` proceeds best-effort once
    ///   the cap elapses.
    #[derive(Debug)]
    pub struct CaptureSession {
        target: RenderTarget,
        viewport: ViewportSpec,
        temp_dir: TempDir,
        frames_captured: u32,
        fail_at_frame: Option<u32>,
    }

    /// Upper bound on synthetic frame dimensions
    pub const MOCK_MAX_DIMENSION: u32 = 64;

    fn query_directive(url: &str, key: &str) -> Option<u32> {
        let query = url.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.parse().ok())
    }

    impl CaptureSession {
        /// Open a stand-in session against the target.
        ///
        /// # Errors
        ///
        /// `NavigationFailed` when the URL scripts a non-2xx status,
        /// `EngineUnavailable` when the runtime cannot become ready.
        pub async fn open(
            runtime: &RendererRuntime,
            target: &RenderTarget,
            viewport: ViewportSpec,
        ) -> ExportarResult<Self> {
            runtime.ensure_ready().await?;
            let temp_dir = TempDir::with_prefix("exportar-session-")?;

            if let Some(status) = query_directive(target.as_str(), "status") {
                if status >= 400 {
                    return Err(ExportError::navigation_failed(
                        target.as_str(),
                        format!("page responded with HTTP {status}"),
                    ));
                }
            }

            if query_directive(target.as_str(), "slow_nav").is_some() {
                // Wait out the whole cap, as the real session does before
                // proceeding with whatever has rendered
                tokio::time::sleep(Duration::from_millis(NAVIGATION_TIMEOUT_MS)).await;
                tracing::warn!(
                    target = %target,
                    timeout_ms = NAVIGATION_TIMEOUT_MS,
                    "navigation wait timed out, proceeding with best-effort render"
                );
            }

            tokio::time::sleep(Duration::from_millis(NETWORK_IDLE_THRESHOLD_MS)).await;

            Ok(Self {
                target: target.clone(),
                viewport,
                temp_dir,
                frames_captured: 0,
                fail_at_frame: query_directive(target.as_str(), "fail_frame"),
            })
        }

        /// Synthesize one PNG frame at the viewport's pixel dimensions.
        ///
        /// # Errors
        ///
        /// `CaptureFailed` at the scripted frame index, if any.
        pub async fn capture_frame(&mut self) -> ExportarResult<Vec<u8>> {
            let index = self.frames_captured;
            if self.fail_at_frame == Some(index) {
                return Err(ExportError::capture_failed(
                    index,
                    "scripted screenshot failure",
                ));
            }

            let width = self.viewport.pixel_width().clamp(1, MOCK_MAX_DIMENSION);
            let height = self.viewport.pixel_height().clamp(1, MOCK_MAX_DIMENSION);
            let shade = (index * 7 % 256) as u8;
            let mut img = RgbaImage::new(width, height);
            for pixel in img.pixels_mut() {
                *pixel = Rgba([shade, 64, 128, 255]);
            }

            let mut png = Vec::new();
            img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                .map_err(|e| ExportError::capture_failed(index, e.to_string()))?;

            self.frames_captured += 1;
            Ok(png)
        }

        /// Release the session and remove its temporary directory
        pub async fn close(self) {
            if let Err(e) = self.temp_dir.close() {
                tracing::warn!(error = %e, "failed to remove session temp directory");
            }
            tracing::debug!(target = %self.target, "capture session closed");
        }

        /// The target this session is pointed at
        #[must_use]
        pub fn target(&self) -> &RenderTarget {
            &self.target
        }

        /// The fixed viewport every frame inherits
        #[must_use]
        pub const fn viewport(&self) -> ViewportSpec {
            self.viewport
        }

        /// Frames captured so far
        #[must_use]
        pub const fn frames_captured(&self) -> u32 {
            self.frames_captured
        }

        /// Path of the session's transient storage directory
        #[must_use]
        pub fn temp_dir_path(&self) -> &Path {
            self.temp_dir.path()
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::CaptureSession;

#[cfg(not(feature = "browser"))]
pub use mock::CaptureSession;
