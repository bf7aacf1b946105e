use std::process::Command;

use tracing::{info, warn};
use uuid::Uuid;

use super::{SnapshotError, SnapshotProvider, SnapshotSession};

/// Calls out to a configurable hypervisor CLI (default `xe`, the
/// XenServer/XCP-ng command-line client) to snapshot a named VM and
/// mount its contents somewhere this process can read them for archiving.
///
/// Mirrors the create/export/cleanup lifecycle of a CLI-driven
/// hypervisor client, synchronously: `vm-snapshot` followed by
/// `vm-export` to a scratch directory, and `snapshot-uninstall` on
/// teardown.
pub struct HypervisorSnapshotProvider {
    cli_path: String,
    export_root: String,
}

impl HypervisorSnapshotProvider {
    pub fn new(cli_path: impl Into<String>, export_root: impl Into<String>) -> Self {
        HypervisorSnapshotProvider {
            cli_path: cli_path.into(),
            export_root: export_root.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<String, SnapshotError> {
        let output = Command::new(&self.cli_path)
            .args(args)
            .output()
            .map_err(|e| SnapshotError::LaunchFailed(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(SnapshotError::CreationFailed {
                vm_name: String::new(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl SnapshotProvider for HypervisorSnapshotProvider {
    fn create(&self, vm_name: &str) -> Result<SnapshotSession, SnapshotError> {
        let session_id = Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H-%M-%S");
        let snapshot_name = format!("poshbackup-{vm_name}-{timestamp}");

        let snapshot_uuid = self
            .run(&[
                "vm-snapshot".to_string(),
                format!("new-name-label={snapshot_name}"),
                format!("vm={vm_name}"),
            ])
            .map_err(|e| match e {
                SnapshotError::CreationFailed { message, .. } => {
                    SnapshotError::CreationFailed { vm_name: vm_name.to_string(), message }
                }
                other => other,
            })?;

        info!(vm_name, %snapshot_uuid, "hypervisor snapshot created");

        let mount_root = format!("{}\\{}", self.export_root.trim_end_matches('\\'), session_id);

        if let Err(e) = self.run(&[
            "vm-export".to_string(),
            format!("filename={mount_root}.xva"),
            format!("vm={snapshot_uuid}"),
        ]) {
            warn!(vm_name, error = %e, "export of snapshot failed, tearing down");
            let _ = self.run(&[
                "snapshot-uninstall".to_string(),
                format!("uuid={snapshot_uuid}"),
                "force=true".to_string(),
            ]);
            return Err(e);
        }

        let disk_devices = self
            .run(&["vbd-list".to_string(), format!("vm-uuid={snapshot_uuid}"), "params=device".to_string()])
            .unwrap_or_default();
        let mount_paths = assign_mount_letters(&disk_devices);

        if mount_paths.is_empty() {
            warn!(vm_name, %snapshot_uuid, "snapshot export reported no attached disks, tearing down");
            let _ = self.run(&[
                "snapshot-uninstall".to_string(),
                format!("uuid={snapshot_uuid}"),
                "force=true".to_string(),
            ]);
            return Err(SnapshotError::NoMountPaths { vm_name: vm_name.to_string() });
        }

        Ok(SnapshotSession {
            session_id: snapshot_uuid,
            provider_name: "hypervisor".to_string(),
            resource_name: vm_name.to_string(),
            mount_paths,
            success: true,
            error_message: None,
        })
    }

    fn teardown(&self, session: &SnapshotSession) -> Result<(), SnapshotError> {
        self.run(&[
            "snapshot-uninstall".to_string(),
            format!("uuid={}", session.session_id),
            "force=true".to_string(),
        ])
        .map(|_| ())
        .map_err(|e| SnapshotError::TeardownFailed {
            session_id: session.session_id.clone(),
            message: e.to_string(),
        })
    }
}

/// Assigns each attached disk device a host mount drive letter, starting
/// at `X:` and working backward through the alphabet, the same order the
/// backup host would mount additional snapshot disks under.
fn assign_mount_letters(vbd_list_output: &str) -> Vec<String> {
    let devices: Vec<&str> = vbd_list_output
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();

    (b'X'..=b'Z')
        .chain(b'A'..=b'W')
        .map(|letter| format!("{}:", letter as char))
        .take(devices.len())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_mount_letters_starts_at_x_and_assigns_one_per_device() {
        assert_eq!(assign_mount_letters("xvda, xvdb"), vec!["X:".to_string(), "Y:".to_string()]);
    }

    #[test]
    fn assign_mount_letters_empty_output_yields_no_mounts() {
        assert!(assign_mount_letters("").is_empty());
    }
}
