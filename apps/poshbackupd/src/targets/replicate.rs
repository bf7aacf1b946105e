use super::{RemoteTarget, TargetError};

/// Fans a single transfer out to every inner target. Retention is an
/// Open Question the configuration surface leaves unresolved: this
/// applies each inner target's retention policy independently rather
/// than trying to keep them in lock-step, since the inner targets may
/// have been configured with different keep counts and there is no
/// documented requirement that they stay synchronized.
pub struct ReplicateTarget {
    name: String,
    inner: Vec<Box<dyn RemoteTarget>>,
}

impl ReplicateTarget {
    pub fn new(name: impl Into<String>, inner: Vec<Box<dyn RemoteTarget>>) -> Self {
        ReplicateTarget { name: name.into(), inner }
    }
}

impl RemoteTarget for ReplicateTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn transfer(&self, local_archive_path: &str) -> Result<(), TargetError> {
        for target in &self.inner {
            target.transfer(local_archive_path)?;
        }
        Ok(())
    }

    fn list_remote_archives(&self, base_name_prefix: &str) -> Result<Vec<String>, TargetError> {
        let mut all = Vec::new();
        for target in &self.inner {
            all.extend(target.list_remote_archives(base_name_prefix)?);
        }
        Ok(all)
    }

    fn delete_remote_archive(&self, remote_path: &str) -> Result<(), TargetError> {
        for target in &self.inner {
            target.delete_remote_archive(remote_path)?;
        }
        Ok(())
    }
}
