//! Sandbox controller: isolated, resource-limited execution contexts.
//!
//! One [`SandboxSession`] exists per in-flight operation. Sessions are
//! drawn from a [`SandboxPool`] with a global concurrency ceiling; dispatch
//! beyond the ceiling waits (backpressure) until capacity frees or the
//! admission timeout elapses, at which point it fails as a timeout rather
//! than being silently dropped. Teardown is exactly-once and guaranteed on
//! every exit path, with a drop guard backstopping explicit release.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::warn;
use uuid::Uuid;

use crate::domain::error::{AgentError, Result};
use crate::tools::ToolKind;

/// Resource limits applied to one sandbox session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceLimits {
    /// Maximum wall-clock time for the operation (milliseconds).
    pub wall_clock_ms: u64,
    /// Maximum memory footprint (bytes).
    pub memory_bytes: u64,
    /// Whether the operation may reach the network.
    pub network_allowed: bool,
    /// Whether the session filesystem is read-only.
    pub fs_read_only: bool,
}

impl ResourceLimits {
    /// The limit policy keyed by tool kind.
    pub fn for_kind(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Shell => Self {
                wall_clock_ms: 30_000,
                memory_bytes: 512 * 1024 * 1024,
                network_allowed: false,
                fs_read_only: true,
            },
            ToolKind::File => Self {
                wall_clock_ms: 10_000,
                memory_bytes: 256 * 1024 * 1024,
                network_allowed: false,
                fs_read_only: false,
            },
            ToolKind::Message => Self {
                wall_clock_ms: 5_000,
                memory_bytes: 64 * 1024 * 1024,
                network_allowed: false,
                fs_read_only: true,
            },
            ToolKind::Knowledge => Self {
                wall_clock_ms: 15_000,
                memory_bytes: 128 * 1024 * 1024,
                network_allowed: false,
                fs_read_only: true,
            },
        }
    }
}

/// An isolated execution context for exactly one operation.
#[derive(Debug)]
pub struct SandboxSession {
    /// Unique identifier for this session.
    pub session_id: Uuid,

    /// Limits configured from the tool-kind policy.
    pub limits: ResourceLimits,

    /// Scratch directory the operation is confined to.
    pub workdir: PathBuf,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    released: AtomicBool,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
    partial: Mutex<Option<serde_json::Value>>,
}

impl SandboxSession {
    fn new(
        session_id: Uuid,
        limits: ResourceLimits,
        workdir: PathBuf,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            session_id,
            limits,
            workdir,
            created_at: Utc::now(),
            released: AtomicBool::new(false),
            permit: Mutex::new(Some(permit)),
            partial: Mutex::new(None),
        }
    }

    /// Buffer partial output so a timeout can still surface what the
    /// operation produced before being killed.
    pub fn buffer_partial(&self, value: serde_json::Value) {
        *self.partial.lock().unwrap() = Some(value);
    }

    /// Take any buffered partial output.
    pub fn take_partial(&self) -> Option<serde_json::Value> {
        self.partial.lock().unwrap().take()
    }

    /// Tear the session down: returns the pool permit and removes the
    /// scratch directory. The first call returns `true`; any further call
    /// is a no-op returning `false`.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        drop(self.permit.lock().unwrap().take());
        if let Err(e) = std::fs::remove_dir_all(&self.workdir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(session_id = %self.session_id, error = %e, "failed to remove session workdir");
            }
        }
        true
    }

    /// Whether the session has been torn down.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if self.release() {
            warn!(session_id = %self.session_id, "sandbox session leaked; released by drop guard");
        }
    }
}

/// Sandbox pool with a global concurrency ceiling.
pub struct SandboxPool {
    semaphore: Arc<Semaphore>,
    ceiling: usize,
    admission_timeout: Duration,
    workdir_root: PathBuf,
}

impl SandboxPool {
    pub fn new(ceiling: usize, admission_timeout: Duration, workdir_root: PathBuf) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(ceiling)),
            ceiling,
            admission_timeout,
            workdir_root,
        }
    }

    /// Admit one operation and configure a session for its tool kind.
    ///
    /// Blocks while the pool is at its ceiling; if capacity does not free
    /// within the admission timeout the dispatch fails as a timeout.
    pub async fn acquire(&self, kind: ToolKind) -> Result<SandboxSession> {
        let permit = tokio::time::timeout(
            self.admission_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| AgentError::Timeout {
            limit_ms: self.admission_timeout.as_millis() as u64,
            partial: None,
        })?
        .map_err(|_| AgentError::Infrastructure("sandbox pool closed".to_string()))?;

        let limits = ResourceLimits::for_kind(kind);
        let session_id = Uuid::new_v4();
        let workdir = self.workdir_root.join(format!("session-{session_id}"));
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|e| AgentError::Infrastructure(format!("session workdir: {e}")))?;

        Ok(SandboxSession::new(session_id, limits, workdir, permit))
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// The configured ceiling.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// Signals task abort into every suspend point of an in-flight dispatch.
pub struct AbortSource {
    tx: watch::Sender<bool>,
}

impl AbortSource {
    /// Create a source and its first token.
    pub fn new() -> (Self, AbortToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, AbortToken { rx })
    }

    /// Signal abort. Best-effort: in-flight sessions are force-terminated
    /// by dropping their execution futures.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    /// Create another token observing the same signal.
    pub fn token(&self) -> AbortToken {
        AbortToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer half of the abort signal.
#[derive(Clone)]
pub struct AbortToken {
    rx: watch::Receiver<bool>,
}

impl AbortToken {
    /// Whether abort has been signalled.
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once abort is signalled. Never resolves if the source is
    /// dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Source gone without an abort: park forever.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(ceiling: usize) -> (tempfile::TempDir, SandboxPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SandboxPool::new(
            ceiling,
            Duration::from_millis(200),
            dir.path().to_path_buf(),
        );
        (dir, pool)
    }

    #[test]
    fn limits_policy_covers_all_kinds() {
        for kind in ToolKind::ALL {
            let limits = ResourceLimits::for_kind(kind);
            assert!(limits.wall_clock_ms > 0);
            assert!(limits.memory_bytes > 0);
        }
        // Shell is the most restricted runtime environment.
        let shell = ResourceLimits::for_kind(ToolKind::Shell);
        assert!(shell.fs_read_only);
        assert!(!shell.network_allowed);
    }

    #[tokio::test]
    async fn release_is_exactly_once() {
        let (_dir, pool) = test_pool(1);
        let session = pool.acquire(ToolKind::Message).await.unwrap();
        assert!(!session.is_released());
        assert!(session.release());
        assert!(session.is_released());
        assert!(!session.release());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn drop_returns_permit() {
        let (_dir, pool) = test_pool(1);
        {
            let _session = pool.acquire(ToolKind::Message).await.unwrap();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn admission_times_out_at_ceiling() {
        let (_dir, pool) = test_pool(1);
        let held = pool.acquire(ToolKind::Message).await.unwrap();
        let err = pool.acquire(ToolKind::Message).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout { .. }));
        held.release();
    }

    #[tokio::test]
    async fn admission_unblocks_when_capacity_frees() {
        let (_dir, pool) = test_pool(1);
        let pool = Arc::new(pool);
        let held = pool.acquire(ToolKind::Message).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(ToolKind::Message).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        held.release();

        let session = waiter.await.unwrap().unwrap();
        session.release();
    }

    #[tokio::test]
    async fn partial_output_buffer_roundtrip() {
        let (_dir, pool) = test_pool(1);
        let session = pool.acquire(ToolKind::Shell).await.unwrap();
        assert!(session.take_partial().is_none());
        session.buffer_partial(serde_json::json!({"stdout": "partial"}));
        assert!(session.take_partial().is_some());
        assert!(session.take_partial().is_none());
        session.release();
    }

    #[tokio::test]
    async fn abort_token_observes_signal() {
        let (source, token) = AbortSource::new();
        assert!(!token.is_aborted());
        source.abort();
        assert!(token.is_aborted());
        // Resolves immediately once aborted.
        token.aborted().await;
    }
}
