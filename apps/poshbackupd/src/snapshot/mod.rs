use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

pub mod hypervisor;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot provider '{0}' is not registered")]
    UnknownProvider(String),
    #[error("failed to launch snapshot command: {0}")]
    LaunchFailed(String),
    #[error("snapshot creation failed for '{vm_name}': {message}")]
    CreationFailed { vm_name: String, message: String },
    #[error("snapshot teardown failed for session '{session_id}': {message}")]
    TeardownFailed { session_id: String, message: String },
    #[error("source path translation requires a snapshot session but none is active for '{vm_name}'")]
    NoActiveSession { vm_name: String },
    #[error("snapshot session for '{vm_name}' reported success but yielded no mount paths")]
    NoMountPaths { vm_name: String },
}

/// A live handle to a created snapshot: its id, the provider and resource
/// it came from, and the ordered host mount paths the provider exposed
/// its disks under (§3: `mountPaths`).
#[derive(Debug, Clone)]
pub struct SnapshotSession {
    pub session_id: String,
    pub provider_name: String,
    pub resource_name: String,
    pub mount_paths: Vec<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl SnapshotSession {
    /// Rewrites a job's configured source sequence whose first element
    /// names the VM resource and whose remaining elements are guest paths
    /// of the form `<letter>:\<relative>`. Each distinct guest drive
    /// letter is mapped, in order of first appearance, to this session's
    /// `mount_paths` at the same position; the VM-name entry itself is
    /// dropped, and any guest path that doesn't parse or has no
    /// corresponding mount path is dropped with a warning rather than
    /// passed through unmodified.
    pub fn translate_sources(&self, source_paths: &[String]) -> Vec<String> {
        let guest_paths = source_paths.iter().skip(1);

        let mut drive_to_mount: HashMap<String, &str> = HashMap::new();
        let mut next_mount = self.mount_paths.iter();

        let mut translated = Vec::new();
        for guest_path in guest_paths {
            let Some((drive, rest)) = split_drive(guest_path) else {
                warn!(resource = %self.resource_name, guest_path, "guest path is not drive-qualified, dropping");
                continue;
            };

            let mount_root = match drive_to_mount.get(drive.as_str()) {
                Some(mount) => Some(*mount),
                None => match next_mount.next() {
                    Some(mount) => {
                        drive_to_mount.insert(drive.clone(), mount.as_str());
                        Some(mount.as_str())
                    }
                    None => None,
                },
            };

            match mount_root {
                Some(mount_root) => translated.push(format!("{}\\{}", mount_root.trim_end_matches('\\'), rest)),
                None => warn!(
                    resource = %self.resource_name,
                    guest_path,
                    "no host mount path available for this guest volume, dropping"
                ),
            }
        }
        translated
    }
}

/// Splits `C:\App` into `("C:", "App")`. Returns `None` for anything that
/// isn't `<single-letter>:\<rest>`.
fn split_drive(path: &str) -> Option<(String, &str)> {
    let mut chars = path.chars();
    let letter = chars.next()?;
    if !letter.is_ascii_alphabetic() {
        return None;
    }
    if chars.next() != Some(':') {
        return None;
    }
    let rest = &path[2..];
    let rest = rest.trim_start_matches(['\\', '/']);
    Some((format!("{}:", letter.to_ascii_uppercase()), rest))
}

/// A hypervisor/snapshot backend. Implementations shell out to whatever
/// CLI or API the provider wraps; this crate only cares about the
/// create/teardown contract.
pub trait SnapshotProvider {
    fn create(&self, vm_name: &str) -> Result<SnapshotSession, SnapshotError>;
    fn teardown(&self, session: &SnapshotSession) -> Result<(), SnapshotError>;
}

/// Process-scoped registry of live sessions, so every session created
/// during this run can be torn down even if a later job in the same
/// process panics or errors out before reaching its own cleanup path.
#[derive(Default)]
pub struct SnapshotRegistry {
    sessions: HashMap<String, SnapshotSession>,
}

impl SnapshotRegistry {
    pub fn track(&mut self, session: SnapshotSession) {
        self.sessions.insert(session.session_id.clone(), session);
    }

    pub fn untrack(&mut self, session_id: &str) -> Option<SnapshotSession> {
        self.sessions.remove(session_id)
    }

    pub fn active(&self) -> impl Iterator<Item = &SnapshotSession> {
        self.sessions.values()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(mount_paths: Vec<&str>) -> SnapshotSession {
        SnapshotSession {
            session_id: "s1".to_string(),
            provider_name: "hypervisor".to_string(),
            resource_name: "MyVM".to_string(),
            mount_paths: mount_paths.into_iter().map(str::to_string).collect(),
            success: true,
            error_message: None,
        }
    }

    #[test]
    fn translate_maps_distinct_guest_drives_to_mount_paths_in_order() {
        let session = session(vec!["X:", "Y:"]);
        let sources = vec!["MyVM".to_string(), "C:\\App".to_string(), "D:\\Logs".to_string()];
        assert_eq!(session.translate_sources(&sources), vec!["X:\\App".to_string(), "Y:\\Logs".to_string()]);
    }

    #[test]
    fn translate_drops_the_vm_name_entry() {
        let session = session(vec!["X:"]);
        let sources = vec!["MyVM".to_string(), "C:\\App".to_string()];
        let translated = session.translate_sources(&sources);
        assert_eq!(translated.len(), 1);
        assert!(!translated.iter().any(|p| p == "MyVM"));
    }

    #[test]
    fn translate_reuses_mount_path_for_repeated_guest_drive() {
        let session = session(vec!["X:"]);
        let sources = vec!["MyVM".to_string(), "C:\\App".to_string(), "C:\\Other".to_string()];
        assert_eq!(session.translate_sources(&sources), vec!["X:\\App".to_string(), "X:\\Other".to_string()]);
    }

    #[test]
    fn translate_drops_malformed_guest_path() {
        let session = session(vec!["X:"]);
        let sources = vec!["MyVM".to_string(), "not-a-drive-path".to_string()];
        assert!(session.translate_sources(&sources).is_empty());
    }

    #[test]
    fn translate_drops_guest_path_with_no_remaining_mount_path() {
        let session = session(vec!["X:"]);
        let sources = vec!["MyVM".to_string(), "C:\\App".to_string(), "D:\\Logs".to_string()];
        assert_eq!(session.translate_sources(&sources), vec!["X:\\App".to_string()]);
    }

    #[test]
    fn registry_tracks_and_untracks() {
        let mut registry = SnapshotRegistry::default();
        registry.track(session(vec!["X:"]));
        assert!(!registry.is_empty());
        assert!(registry.untrack("s1").is_some());
        assert!(registry.is_empty());
    }
}
