use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{RemoteTarget, TargetError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncTargetSettings {
    pub unc_path: String,
}

/// Copies to a UNC/mapped network share by plain filesystem copy; this is
/// the simplest target, since from this process's point of view a UNC
/// path is just another path.
pub struct UncTarget {
    name: String,
    settings: UncTargetSettings,
}

impl UncTarget {
    pub fn new(name: impl Into<String>, settings: UncTargetSettings) -> Self {
        UncTarget { name: name.into(), settings }
    }
}

impl RemoteTarget for UncTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn transfer(&self, local_archive_path: &str) -> Result<(), TargetError> {
        let file_name = Path::new(local_archive_path)
            .file_name()
            .ok_or_else(|| TargetError::InvalidSettings {
                name: self.name.clone(),
                message: "local archive path has no file name".to_string(),
            })?;
        let destination = Path::new(&self.settings.unc_path).join(file_name);

        fs::copy(local_archive_path, &destination).map_err(|e| TargetError::TransferFailed {
            name: self.name.clone(),
            file: local_archive_path.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn list_remote_archives(&self, base_name_prefix: &str) -> Result<Vec<String>, TargetError> {
        let entries = fs::read_dir(&self.settings.unc_path).map_err(|e| TargetError::ListFailed {
            name: self.name.clone(),
            message: e.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TargetError::ListFailed {
                name: self.name.clone(),
                message: e.to_string(),
            })?;
            if let Some(file_name) = entry.file_name().to_str() {
                if file_name.starts_with(base_name_prefix) {
                    paths.push(entry.path().to_string_lossy().to_string());
                }
            }
        }
        Ok(paths)
    }

    fn delete_remote_archive(&self, remote_path: &str) -> Result<(), TargetError> {
        fs::remove_file(remote_path).map_err(|e| TargetError::DeleteFailed {
            name: self.name.clone(),
            file: remote_path.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_copies_file_to_unc_path() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("Docs_2024.7z");
        std::fs::write(&src, b"data").unwrap();

        let target = UncTarget::new(
            "Nas",
            UncTargetSettings { unc_path: dst_dir.path().to_string_lossy().to_string() },
        );
        target.transfer(src.to_str().unwrap()).unwrap();

        assert!(dst_dir.path().join("Docs_2024.7z").exists());
    }

    #[test]
    fn list_filters_by_prefix() {
        let dst_dir = tempfile::tempdir().unwrap();
        std::fs::write(dst_dir.path().join("Docs_1.7z"), b"x").unwrap();
        std::fs::write(dst_dir.path().join("Other_1.7z"), b"x").unwrap();

        let target = UncTarget::new(
            "Nas",
            UncTargetSettings { unc_path: dst_dir.path().to_string_lossy().to_string() },
        );
        let found = target.list_remote_archives("Docs_").unwrap();
        assert_eq!(found.len(), 1);
    }
}
