use std::process::Command;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to launch hook script '{path}': {source}")]
    LaunchFailed { path: String, source: std::io::Error },
    #[error("hook script '{path}' exited with code {code}")]
    NonZeroExit { path: String, code: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreBackup,
    PostBackup,
}

/// Runs the pre/post-backup PowerShell hook scripts a job may configure.
/// A hook script failing is reported but, per the pre-processor's
/// short-circuit rules, only `PreBackup` failures actually abort the job.
pub struct HookRunner;

impl HookRunner {
    pub fn run(stage: HookStage, script_path: &str, job_name: &str) -> Result<(), HookError> {
        info!(job_name, script_path, ?stage, "running hook");

        let output = Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-File", script_path, "-JobName", job_name])
            .output()
            .map_err(|source| HookError::LaunchFailed { path: script_path.to_string(), source })?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(job_name, script_path, code, "hook exited non-zero");
            return Err(HookError::NonZeroExit { path: script_path.to_string(), code });
        }

        Ok(())
    }
}
