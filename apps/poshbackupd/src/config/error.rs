use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    UnknownJob,
    UnknownSet,
    MissingRequired,
    InvalidValue,
    Unresolvable,
    UnknownTarget,
}

#[derive(Debug, Error)]
#[error("{kind:?} at '{path}': {message}")]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub path: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(kind: ConfigErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn unknown_job(name: &str) -> Self {
        Self::new(ConfigErrorKind::UnknownJob, name, format!("job '{name}' is not defined in BackupLocations"))
    }

    pub fn unknown_set(name: &str) -> Self {
        Self::new(ConfigErrorKind::UnknownSet, name, format!("set '{name}' is not defined in BackupSets"))
    }

    pub fn missing_required(path: &str) -> Self {
        Self::new(ConfigErrorKind::MissingRequired, path, format!("'{path}' is required but was not set in any config layer"))
    }

    pub fn invalid_value(path: &str, message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::InvalidValue, path, message)
    }

    pub fn unresolvable(path: &str, message: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Unresolvable, path, message)
    }

    pub fn unknown_target(name: &str) -> Self {
        Self::new(ConfigErrorKind::UnknownTarget, name, format!("target '{name}' is not defined in BackupTargets"))
    }
}
