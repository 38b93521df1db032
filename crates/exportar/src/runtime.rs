//! Renderer runtime: one-time acquisition of the headless engine binary.
//!
//! The expensive acquisition step (locating or downloading a Chromium
//! binary) runs at most once per process lifetime. Concurrent callers block
//! on the same readiness lock and observe the first caller's outcome; a
//! failed acquisition leaves the runtime unready so the next request
//! retries instead of caching the failure.

use crate::result::{ExportError, ExportarResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Environment variable overriding the engine executable path
pub const ENGINE_PATH_ENV: &str = "EXPORTAR_CHROME";

/// Seam for the engine acquisition step.
///
/// The default provisioner probes the environment (and, with the `fetcher`
/// feature, downloads a managed revision). Tests substitute their own to
/// count acquisitions or script failures.
#[async_trait]
pub trait EngineProvisioner: Send + Sync {
    /// Acquire the engine binary, returning its executable path.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` when no binary can be produced.
    async fn acquire(&self) -> ExportarResult<PathBuf>;
}

/// Process-wide readiness of the headless rendering engine.
///
/// Cheap to clone; clones share the same readiness state.
#[derive(Clone)]
pub struct RendererRuntime {
    inner: Arc<Inner>,
}

struct Inner {
    // None until the first successful acquisition; never reset afterwards.
    state: Mutex<Option<PathBuf>>,
    provisioner: Box<dyn EngineProvisioner>,
}

impl std::fmt::Debug for RendererRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRuntime").finish_non_exhaustive()
    }
}

impl RendererRuntime {
    /// Create a runtime backed by the default provisioner
    #[must_use]
    pub fn new() -> Self {
        Self::with_provisioner(Box::new(DefaultProvisioner::new()))
    }

    /// Create a runtime with a custom acquisition step
    #[must_use]
    pub fn with_provisioner(provisioner: Box<dyn EngineProvisioner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(None),
                provisioner,
            }),
        }
    }

    /// Create a runtime that is already ready with a known executable
    #[must_use]
    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(Some(path.into())),
                provisioner: Box::new(DefaultProvisioner::new()),
            }),
        }
    }

    /// Ensure the engine binary is available, acquiring it on first call.
    ///
    /// Idempotent and concurrency-safe: the readiness lock is held across
    /// the acquisition await, so simultaneous callers during an in-flight
    /// acquisition block until it completes rather than triggering a
    /// duplicate. After the first success every call returns immediately.
    ///
    /// # Errors
    ///
    /// Returns `EngineUnavailable` when acquisition fails; the runtime
    /// stays unready so a later call may retry.
    pub async fn ensure_ready(&self) -> ExportarResult<PathBuf> {
        let mut state = self.inner.state.lock().await;
        if let Some(path) = state.as_ref() {
            return Ok(path.clone());
        }

        tracing::info!("acquiring headless rendering engine");
        let path = self.inner.provisioner.acquire().await?;
        tracing::info!(executable = %path.display(), "rendering engine ready");
        *state = Some(path.clone());
        Ok(path)
    }

    /// Whether a successful acquisition has already happened
    pub async fn is_ready(&self) -> bool {
        self.inner.state.lock().await.is_some()
    }
}

impl Default for RendererRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Default acquisition: environment override, system browser probe and,
/// with the `fetcher` feature, a managed download.
pub struct DefaultProvisioner {
    #[cfg_attr(not(feature = "fetcher"), allow(dead_code))]
    install_dir: PathBuf,
}

impl DefaultProvisioner {
    /// Create a provisioner with the default install directory
    #[must_use]
    pub fn new() -> Self {
        let install_dir = std::env::var_os("EXPORTAR_ENGINE_DIR")
            .map_or_else(|| std::env::temp_dir().join("exportar-engine"), PathBuf::from);
        Self { install_dir }
    }

    /// Create a provisioner downloading into a specific directory
    #[must_use]
    pub fn with_install_dir(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    fn probe_environment() -> Option<PathBuf> {
        for var in [ENGINE_PATH_ENV, "CHROME"] {
            if let Some(path) = std::env::var_os(var) {
                let path = PathBuf::from(path);
                if path.is_file() {
                    return Some(path);
                }
            }
        }
        find_in_path(&[
            "chromium",
            "chromium-browser",
            "google-chrome",
            "google-chrome-stable",
            "chrome",
        ])
    }

    /// Download a managed chromium revision into the install directory.
    ///
    /// This is the only place in the pipeline that writes the engine binary
    /// to persistent local storage.
    #[cfg(feature = "fetcher")]
    async fn download(&self) -> ExportarResult<PathBuf> {
        use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};

        // Disk errors here are acquisition failures, same as a failed fetch
        tokio::fs::create_dir_all(&self.install_dir)
            .await
            .map_err(|e| ExportError::engine_unavailable(e.to_string()))?;
        let options = BrowserFetcherOptions::builder()
            .with_path(&self.install_dir)
            .build()
            .map_err(|e| ExportError::engine_unavailable(e.to_string()))?;

        tracing::info!(dir = %self.install_dir.display(), "downloading chromium revision");
        let info = BrowserFetcher::new(options)
            .fetch()
            .await
            .map_err(|e| ExportError::engine_unavailable(e.to_string()))?;
        Ok(info.executable_path)
    }
}

impl Default for DefaultProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineProvisioner for DefaultProvisioner {
    async fn acquire(&self) -> ExportarResult<PathBuf> {
        if let Some(path) = Self::probe_environment() {
            return Ok(path);
        }

        #[cfg(feature = "fetcher")]
        {
            return self.download().await;
        }

        #[cfg(not(feature = "fetcher"))]
        Err(ExportError::engine_unavailable(format!(
            "no chromium executable found; install one, set {ENGINE_PATH_ENV}, \
             or enable the `fetcher` feature"
        )))
    }
}

fn find_in_path(names: &[&str]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in names {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone)]
    struct CountingProvisioner {
        acquisitions: Arc<AtomicUsize>,
        fail_first: Arc<AtomicBool>,
    }

    impl CountingProvisioner {
        fn new() -> Self {
            Self {
                acquisitions: Arc::new(AtomicUsize::new(0)),
                fail_first: Arc::new(AtomicBool::new(false)),
            }
        }

        fn failing_once() -> Self {
            let p = Self::new();
            p.fail_first.store(true, Ordering::SeqCst);
            p
        }

        fn count(&self) -> usize {
            self.acquisitions.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EngineProvisioner for CountingProvisioner {
        async fn acquire(&self) -> ExportarResult<PathBuf> {
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            // Yield so concurrent callers pile up on the readiness lock
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(ExportError::engine_unavailable("simulated network error"));
            }
            Ok(PathBuf::from("/opt/engine/chromium"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_trigger_single_acquisition() {
        let provisioner = CountingProvisioner::new();
        let runtime = RendererRuntime::with_provisioner(Box::new(provisioner.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let rt = runtime.clone();
                tokio::spawn(async move { rt.ensure_ready().await })
            })
            .collect();

        for task in tasks {
            let path = task.await.unwrap().unwrap();
            assert_eq!(path, PathBuf::from("/opt/engine/chromium"));
        }
        assert_eq!(provisioner.count(), 1);
        assert!(runtime.is_ready().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_acquisition_retries_on_next_call() {
        let provisioner = CountingProvisioner::failing_once();
        let runtime = RendererRuntime::with_provisioner(Box::new(provisioner.clone()));

        let err = runtime.ensure_ready().await.unwrap_err();
        assert!(matches!(err, ExportError::EngineUnavailable { .. }));
        assert!(!runtime.is_ready().await);

        let path = runtime.ensure_ready().await.unwrap();
        assert_eq!(path, PathBuf::from("/opt/engine/chromium"));
        assert_eq!(provisioner.count(), 2);
    }

    #[cfg(feature = "fetcher")]
    #[tokio::test]
    async fn test_unwritable_install_dir_is_engine_unavailable() {
        // A path nested under a regular file cannot be created
        let file = tempfile::NamedTempFile::new().unwrap();
        let provisioner = DefaultProvisioner::with_install_dir(file.path().join("engine"));
        let err = provisioner.download().await.unwrap_err();
        assert!(matches!(err, ExportError::EngineUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_ready_after_success_returns_immediately() {
        let runtime = RendererRuntime::with_executable("/usr/bin/chromium");
        assert!(runtime.is_ready().await);
        let path = runtime.ensure_ready().await.unwrap();
        assert_eq!(path, PathBuf::from("/usr/bin/chromium"));
    }
}
