use thiserror::Error;

pub mod replicate;
pub mod sftp;
pub mod unc;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("failed to connect to target '{name}': {message}")]
    ConnectFailed { name: String, message: String },
    #[error("failed to transfer '{file}' to target '{name}': {message}")]
    TransferFailed { name: String, file: String, message: String },
    #[error("failed to list remote archives on target '{name}': {message}")]
    ListFailed { name: String, message: String },
    #[error("failed to delete remote archive '{file}' on target '{name}': {message}")]
    DeleteFailed { name: String, file: String, message: String },
    #[error("target '{name}' settings are invalid: {message}")]
    InvalidSettings { name: String, message: String },
}

/// A remote destination a completed local archive is copied to, named
/// only at its interface boundary: transfer one file up, list what's
/// there, delete one file. Retention on the remote side is applied by the
/// caller against `list`'s result, the same way local retention is.
pub trait RemoteTarget {
    fn name(&self) -> &str;
    fn transfer(&self, local_archive_path: &str) -> Result<(), TargetError>;
    fn list_remote_archives(&self, base_name_prefix: &str) -> Result<Vec<String>, TargetError>;
    fn delete_remote_archive(&self, remote_path: &str) -> Result<(), TargetError>;
}

/// Applies a `KeepCount` retention policy against whatever `list_remote_archives`
/// returns, newest first, deleting the tail — mirroring `retention::apply_local_retention`
/// but through the `RemoteTarget` interface instead of the filesystem directly.
pub fn apply_remote_retention(
    target: &dyn RemoteTarget,
    base_name_prefix: &str,
    keep_count: u32,
) -> Result<Vec<String>, TargetError> {
    let mut remote = target.list_remote_archives(base_name_prefix)?;
    remote.sort();
    remote.reverse();

    let mut deleted = Vec::new();
    if remote.len() > keep_count as usize {
        for path in &remote[keep_count as usize..] {
            target.delete_remote_archive(path)?;
            deleted.push(path.clone());
        }
    }
    Ok(deleted)
}
