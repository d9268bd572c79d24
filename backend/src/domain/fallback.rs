//! # Fallback Executor
//!
//! Runs exactly one of two code paths for an operation: the remote one when
//! routing allows it, the local one otherwise. A failed remote attempt is
//! logged and followed by the local path; nothing is retried here. Deferred
//! replays belong to the sync queue.
//!
//! Routing:
//!
//! | mode     | credentials | online | path   |
//! |----------|-------------|--------|--------|
//! | `local`  | any         | any    | local  |
//! | `remote` | yes         | any    | remote |
//! | `auto`   | yes         | yes    | remote |
//! | `auto`   | yes         | no     | local  |
//! | any      | no          | any    | local  |

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};

use super::connectivity::NetworkStatus;
use crate::config::BackendMode;

/// Which store produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Remote,
    Local,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Remote => f.write_str("remote"),
            Source::Local => f.write_str("local"),
        }
    }
}

#[derive(Debug)]
pub struct FallbackResult<T> {
    pub value: T,
    pub source: Source,
    /// The remote failure that forced the local path, if any.
    pub error: Option<anyhow::Error>,
}

impl<T> FallbackResult<T> {
    pub fn is_remote(&self) -> bool {
        self.source == Source::Remote
    }
}

#[derive(Clone)]
pub struct FallbackExecutor {
    mode: BackendMode,
    remote_configured: bool,
    network: Arc<dyn NetworkStatus>,
}

impl FallbackExecutor {
    pub fn new(mode: BackendMode, remote_configured: bool, network: Arc<dyn NetworkStatus>) -> Self {
        Self {
            mode,
            remote_configured,
            network,
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    /// Credentials for the remote store are present.
    pub fn remote_configured(&self) -> bool {
        self.remote_configured
    }

    /// Whether an operation started now would try the remote store first.
    pub fn remote_reachable(&self) -> bool {
        if !self.remote_configured {
            return false;
        }
        match self.mode {
            BackendMode::Local => false,
            BackendMode::Remote => true,
            BackendMode::Auto => self.network.is_online(),
        }
    }

    /// Run `remote` if routing allows it, falling back to `local` on failure.
    pub async fn run<T, R, RFut, L, LFut>(&self, label: &str, remote: R, local: L) -> Result<FallbackResult<T>>
    where
        R: FnOnce() -> RFut,
        RFut: Future<Output = Result<T>>,
        L: FnOnce() -> LFut,
        LFut: Future<Output = Result<T>>,
    {
        self.run_optional(label, Some(remote), local).await
    }

    /// Like [`run`](Self::run) for operations that may have no remote analog.
    pub async fn run_optional<T, R, RFut, L, LFut>(
        &self,
        label: &str,
        remote: Option<R>,
        local: L,
    ) -> Result<FallbackResult<T>>
    where
        R: FnOnce() -> RFut,
        RFut: Future<Output = Result<T>>,
        L: FnOnce() -> LFut,
        LFut: Future<Output = Result<T>>,
    {
        if let Some(remote) = remote.filter(|_| self.remote_reachable()) {
            match remote().await {
                Ok(value) => {
                    debug!("[fallback:{}] served by remote", label);
                    return Ok(FallbackResult {
                        value,
                        source: Source::Remote,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("[fallback:{}] remote failed, using local: {:#}", label, e);
                    let value = local().await?;
                    return Ok(FallbackResult {
                        value,
                        source: Source::Local,
                        error: Some(e),
                    });
                }
            }
        }

        let value = local().await?;
        Ok(FallbackResult {
            value,
            source: Source::Local,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connectivity::ConnectivityMonitor;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor(mode: BackendMode, configured: bool, online: bool) -> FallbackExecutor {
        FallbackExecutor::new(mode, configured, Arc::new(ConnectivityMonitor::new(online)))
    }

    #[tokio::test]
    async fn test_failing_remote_falls_back_to_local_in_every_remote_mode() {
        for mode in [BackendMode::Remote, BackendMode::Auto] {
            let remote_calls = AtomicUsize::new(0);
            let calls = &remote_calls;
            let result = executor(mode, true, true)
                .run(
                    "kids.list",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<i32, _>(anyhow!("connection refused"))
                    },
                    || async { Ok::<_, anyhow::Error>(7) },
                )
                .await
                .unwrap();

            assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
            assert_eq!(result.value, 7);
            assert_eq!(result.source, Source::Local);
            assert!(result.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_local_mode_never_invokes_remote() {
        let remote_calls = AtomicUsize::new(0);
        let calls = &remote_calls;
        let result = executor(BackendMode::Local, true, true)
            .run(
                "kids.list",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(1)
                },
                || async { Ok::<_, anyhow::Error>(2) },
            )
            .await
            .unwrap();

        assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.value, 2);
        assert_eq!(result.source, Source::Local);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_remote_success_is_returned_as_remote() {
        let local_calls = AtomicUsize::new(0);
        let calls = &local_calls;
        let result = executor(BackendMode::Auto, true, true)
            .run("prefs.get", || async { Ok::<_, anyhow::Error>("remote") }, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>("local")
            })
            .await
            .unwrap();

        assert_eq!(result.value, "remote");
        assert!(result.is_remote());
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_routing_table() {
        assert!(!executor(BackendMode::Auto, true, false).remote_reachable());
        assert!(executor(BackendMode::Auto, true, true).remote_reachable());
        assert!(executor(BackendMode::Remote, true, false).remote_reachable());
        assert!(!executor(BackendMode::Remote, false, true).remote_reachable());
        assert!(!executor(BackendMode::Auto, false, true).remote_reachable());
        assert!(!executor(BackendMode::Local, true, true).remote_reachable());
    }

    #[tokio::test]
    async fn test_operation_without_remote_runs_local() {
        let result = executor(BackendMode::Remote, true, true)
            .run_optional::<_, fn() -> std::future::Ready<Result<i32>>, _, _, _>(
                "prefs.get",
                None,
                || async { Ok::<_, anyhow::Error>(3) },
            )
            .await
            .unwrap();
        assert_eq!(result.value, 3);
        assert_eq!(result.source, Source::Local);
    }
}
