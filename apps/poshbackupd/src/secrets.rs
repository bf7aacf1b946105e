use std::fmt;
use std::fs;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{ArchivePasswordMethod, EffectiveJobConfig};

/// A password or other sensitive string that is wiped from memory on
/// drop. `Debug`/`Display` are intentionally not derived so a stray
/// `{:?}` never leaks it into a log line.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: String) -> Self {
        SecretString(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("archive password method is {method:?} but no secret name/path was configured")]
    MissingReference { method: ArchivePasswordMethod },
    #[error("failed to read password file '{path}': {source}")]
    FileRead { path: String, source: std::io::Error },
    #[error("OS secret vault lookup failed for '{name}': {source}")]
    VaultLookup { name: String, source: keyring::Error },
    #[error("interactive password prompt failed: {source}")]
    Prompt { source: std::io::Error },
    #[error("password not found in OS secret vault entry '{name}'")]
    VaultEmpty { name: String },
}

/// Resolves a job's configured archive password, dispatching on
/// `ArchivePasswordMethod`. In simulate mode, every method short-circuits
/// to a deterministic placeholder so dry runs never touch the OS vault,
/// prompt the terminal, or read a real secrets file.
pub struct SecretResolver {
    simulate: bool,
}

impl SecretResolver {
    pub fn new(simulate: bool) -> Self {
        SecretResolver { simulate }
    }

    pub fn resolve(&self, job: &EffectiveJobConfig) -> Result<Option<SecretString>, SecretError> {
        let method = legacy_method(job);

        if self.simulate && method != ArchivePasswordMethod::None {
            return Ok(Some(SecretString::new("********".to_string())));
        }

        match method {
            ArchivePasswordMethod::None => Ok(None),
            ArchivePasswordMethod::PlainText => {
                let value = job
                    .archive_password_plain_text
                    .clone()
                    .ok_or(SecretError::MissingReference { method })?;
                Ok(Some(SecretString::new(value)))
            }
            ArchivePasswordMethod::SecureStringFile => {
                let path = job
                    .archive_password_secure_string_path
                    .clone()
                    .ok_or(SecretError::MissingReference { method })?;
                let content = fs::read_to_string(&path)
                    .map_err(|source| SecretError::FileRead { path: path.clone(), source })?;
                Ok(Some(SecretString::new(content.trim_end_matches(['\r', '\n']).to_string())))
            }
            ArchivePasswordMethod::SecretManagement => {
                let name = job
                    .archive_password_secret_name
                    .clone()
                    .ok_or(SecretError::MissingReference { method })?;
                let vault = job.archive_password_vault_name.as_deref().unwrap_or("PoSh-Backup");
                let entry = keyring::Entry::new(vault, &name)
                    .map_err(|source| SecretError::VaultLookup { name: name.clone(), source })?;
                let value = entry.get_password().map_err(|source| match source {
                    keyring::Error::NoEntry => SecretError::VaultEmpty { name: name.clone() },
                    other => SecretError::VaultLookup { name: name.clone(), source: other },
                })?;
                Ok(Some(SecretString::new(value)))
            }
            ArchivePasswordMethod::Interactive => {
                let prompt = format!("Enter archive password for job '{}': ", job.job_name);
                let value = rpassword::prompt_password(prompt)
                    .map_err(|source| SecretError::Prompt { source })?;
                Ok(Some(SecretString::new(value)))
            }
        }
    }
}

/// `UsePassword = true` with no explicit method is the legacy shorthand
/// for `Interactive`, carried over from the original config surface.
fn legacy_method(job: &EffectiveJobConfig) -> ArchivePasswordMethod {
    if job.archive_password_method == ArchivePasswordMethod::None && job.use_password {
        return ArchivePasswordMethod::Interactive;
    }
    job.archive_password_method
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_job() -> EffectiveJobConfig {
        crate::config::resolver::EffectiveConfigResolver::new(&{
            let mut g = crate::config::GlobalConfig::default();
            g.seven_zip_path = "7z".to_string();
            g.backup_locations.insert(
                "Job".to_string(),
                crate::config::JobSpec {
                    path: Some(crate::config::PathValue::Single("C:\\Data".to_string())),
                    destination_dir: Some("D:\\Backups".to_string()),
                    ..Default::default()
                },
            );
            g
        })
        .resolve("Job", None, &crate::config::resolver::CliOverrides::default())
        .unwrap()
    }

    #[test]
    fn none_method_returns_no_secret() {
        let resolver = SecretResolver::new(false);
        let secret = resolver.resolve(&base_job()).unwrap();
        assert!(secret.is_none());
    }

    #[test]
    fn simulate_mode_short_circuits_plain_text() {
        let mut job = base_job();
        job.archive_password_method = ArchivePasswordMethod::PlainText;
        job.archive_password_plain_text = None;
        let resolver = SecretResolver::new(true);
        let secret = resolver.resolve(&job).unwrap().unwrap();
        assert_eq!(secret.expose(), "********");
    }

    #[test]
    fn plain_text_missing_value_is_an_error() {
        let mut job = base_job();
        job.archive_password_method = ArchivePasswordMethod::PlainText;
        let resolver = SecretResolver::new(false);
        let err = resolver.resolve(&job).unwrap_err();
        assert!(matches!(err, SecretError::MissingReference { .. }));
    }

    #[test]
    fn plain_text_value_is_returned() {
        let mut job = base_job();
        job.archive_password_method = ArchivePasswordMethod::PlainText;
        job.archive_password_plain_text = Some("hunter2".to_string());
        let resolver = SecretResolver::new(false);
        let secret = resolver.resolve(&job).unwrap().unwrap();
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn legacy_use_password_flag_resolves_to_interactive_prompt() {
        let mut job = base_job();
        job.use_password = true;
        assert_eq!(legacy_method(&job), ArchivePasswordMethod::Interactive);
    }

    #[test]
    fn use_password_flag_is_ignored_when_a_method_is_already_set() {
        let mut job = base_job();
        job.use_password = true;
        job.archive_password_method = ArchivePasswordMethod::PlainText;
        assert_eq!(legacy_method(&job), ArchivePasswordMethod::PlainText);
    }

    #[test]
    fn debug_never_exposes_value() {
        let secret = SecretString::new("hunter2".to_string());
        assert_eq!(format!("{secret:?}"), "SecretString(***)");
    }
}
