use thiserror::Error;
use tracing::{error, warn};

use crate::snapshot::{SnapshotError, SnapshotProvider, SnapshotSession};
use crate::vss::{DiskshadowRunner, ShadowCopyQuerier, ShadowIdRegistry, VssCoordinator, VssError};

#[derive(Debug, Error)]
pub enum ResourceCleanupError {
    #[error("failed to tear down snapshot session '{0}': {1}")]
    Snapshot(String, SnapshotError),
    #[error("failed to tear down VSS shadow copies: {0}")]
    Vss(VssError),
    #[error("failed to remove temporary password file '{0}': {1}")]
    TempFile(String, std::io::Error),
}

/// RAII guard that tears down a hypervisor snapshot session when dropped,
/// regardless of which exit path the job took. Every cleanup is
/// best-effort: a failure is logged, not propagated, because by the time
/// a guard drops there is no longer a caller in a position to act on it.
pub struct SnapshotGuard<'a, P: SnapshotProvider> {
    provider: &'a P,
    session: Option<SnapshotSession>,
}

impl<'a, P: SnapshotProvider> SnapshotGuard<'a, P> {
    pub fn new(provider: &'a P, session: SnapshotSession) -> Self {
        SnapshotGuard { provider, session: Some(session) }
    }

    pub fn session(&self) -> &SnapshotSession {
        self.session.as_ref().expect("session taken before guard dropped")
    }

    /// Explicit, eager teardown so callers can observe the `Result`
    /// instead of relying on the silent best-effort `Drop` path.
    pub fn release(mut self) -> Result<(), ResourceCleanupError> {
        if let Some(session) = self.session.take() {
            self.provider
                .teardown(&session)
                .map_err(|e| ResourceCleanupError::Snapshot(session.session_id.clone(), e))
        } else {
            Ok(())
        }
    }
}

impl<'a, P: SnapshotProvider> Drop for SnapshotGuard<'a, P> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.provider.teardown(&session) {
                error!(session_id = %session.session_id, error = %e, "snapshot teardown failed during drop cleanup");
            }
        }
    }
}

/// RAII guard that removes every shadow copy registered in its
/// `ShadowIdRegistry` when dropped. Cleanup is best-effort, matching
/// `VssCoordinator::remove_all`'s own log-and-continue behavior.
pub struct VssGuard<'a, Q: ShadowCopyQuerier, R: DiskshadowRunner> {
    coordinator: &'a VssCoordinator<Q, R>,
    registry: ShadowIdRegistry,
}

impl<'a, Q: ShadowCopyQuerier, R: DiskshadowRunner> VssGuard<'a, Q, R> {
    pub fn new(coordinator: &'a VssCoordinator<Q, R>, registry: ShadowIdRegistry) -> Self {
        VssGuard { coordinator, registry }
    }
}

impl<'a, Q: ShadowCopyQuerier, R: DiskshadowRunner> Drop for VssGuard<'a, Q, R> {
    fn drop(&mut self) {
        self.coordinator.remove_all(&mut self.registry);
    }
}

/// RAII guard for a password file written to a temp directory for
/// 7-Zip's `-spf` switch; removes it on drop so a crash mid-job never
/// leaves a plaintext secret on disk.
pub struct TempPasswordFileGuard {
    path: Option<String>,
}

impl TempPasswordFileGuard {
    pub fn new(path: String) -> Self {
        TempPasswordFileGuard { path: Some(path) }
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().expect("path taken before guard dropped")
    }
}

impl Drop for TempPasswordFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path, error = %e, "failed to remove temporary password file");
                }
            }
        }
    }
}
