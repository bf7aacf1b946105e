use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::VssContextOption;

#[derive(Debug, Error)]
pub enum VssError {
    #[error("diskshadow script generation failed: {0}")]
    ScriptGeneration(String),
    #[error("diskshadow invocation failed to launch: {0}")]
    LaunchFailed(String),
    #[error("diskshadow exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("shadow copy for volume '{volume}' did not appear before the polling timeout")]
    PollingTimeout { volume: String },
    #[error("no shadow copy is registered for volume '{volume}'")]
    UnknownVolume { volume: String },
}

/// Maps an original volume root (e.g. `C:\`) to the shadow copy device
/// path diskshadow exposed for it (e.g. `\\?\GLOBALROOT\Device\...`).
#[derive(Debug, Clone, Default)]
pub struct VssShadowMap {
    volumes: HashMap<String, String>,
}

impl VssShadowMap {
    pub fn insert(&mut self, volume: impl Into<String>, shadow_device_path: impl Into<String>) {
        self.volumes.insert(normalize_volume(&volume.into()), shadow_device_path.into());
    }

    pub fn translate(&self, path: &str) -> Result<String, VssError> {
        let volume = volume_root(path);
        let device = self
            .volumes
            .get(&volume)
            .ok_or_else(|| VssError::UnknownVolume { volume: volume.clone() })?;
        Ok(format!("{device}{}", &path[volume.len()..]))
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

fn normalize_volume(volume: &str) -> String {
    volume.to_uppercase()
}

fn volume_root(path: &str) -> String {
    match path.find(['\\', '/']) {
        Some(idx) => normalize_volume(&path[..=idx]),
        None => normalize_volume(path),
    }
}

/// Runs the real `diskshadow.exe` process. Abstracted behind a trait,
/// mirroring `sevenzip_client::ProcessRunner`, so the coordinator is
/// testable without actually invoking diskshadow.
pub trait DiskshadowRunner {
    fn run_script(&self, diskshadow_path: &str, script_path: &str) -> std::io::Result<std::process::Output>;
}

/// Spawns `diskshadow.exe /s <script_path>` and waits for it to exit.
pub struct ChildDiskshadowRunner;

impl DiskshadowRunner for ChildDiskshadowRunner {
    fn run_script(&self, diskshadow_path: &str, script_path: &str) -> std::io::Result<std::process::Output> {
        std::process::Command::new(diskshadow_path).arg("/s").arg(script_path).output()
    }
}

/// Polls for a shadow copy to finish exposing its device path. Abstracted
/// behind a trait so the polling loop is testable without a real VSS
/// writer subsystem.
pub trait ShadowCopyQuerier {
    fn query_device_path(&self, volume: &str) -> Option<String>;
}

/// Queries `Win32_ShadowCopy` over WMI for the device object path of the
/// most recently created shadow copy on a given volume.
#[cfg(windows)]
pub struct WmiShadowCopyQuerier {
    connection: wmi::WMIConnection,
}

#[cfg(windows)]
impl WmiShadowCopyQuerier {
    pub fn new() -> Result<Self, wmi::WMIError> {
        let com = wmi::COMLibrary::new()?;
        let connection = wmi::WMIConnection::new(com)?;
        Ok(WmiShadowCopyQuerier { connection })
    }
}

#[cfg(windows)]
impl ShadowCopyQuerier for WmiShadowCopyQuerier {
    fn query_device_path(&self, volume: &str) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct ShadowCopy {
            #[serde(rename = "DeviceObject")]
            device_object: String,
            #[serde(rename = "VolumeName")]
            volume_name: String,
        }

        let query = format!(
            "SELECT DeviceObject, VolumeName FROM Win32_ShadowCopy WHERE VolumeName = '{}'",
            volume.replace('\'', "''")
        );
        let results: Vec<ShadowCopy> = self.connection.raw_query(&query).ok()?;
        results
            .into_iter()
            .find(|copy| copy.volume_name.eq_ignore_ascii_case(volume))
            .map(|copy| copy.device_object)
    }
}

/// Process-scoped registry of volumes this run has created shadow copies
/// for, so every one of them can be torn down explicitly even if a later
/// volume in the same batch fails.
#[derive(Default)]
pub struct ShadowIdRegistry {
    ids: Vec<String>,
}

impl ShadowIdRegistry {
    pub fn register(&mut self, shadow_id: impl Into<String>) {
        self.ids.push(shadow_id.into());
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

pub struct VssCoordinator<Q: ShadowCopyQuerier, R: DiskshadowRunner> {
    querier: Q,
    runner: R,
    diskshadow_path: String,
    metadata_cache_path: String,
    polling_timeout_seconds: u64,
    polling_interval_seconds: u64,
}

impl<Q: ShadowCopyQuerier, R: DiskshadowRunner> VssCoordinator<Q, R> {
    pub fn new(
        querier: Q,
        runner: R,
        diskshadow_path: impl Into<String>,
        metadata_cache_path: impl Into<String>,
        polling_timeout_seconds: u64,
        polling_interval_seconds: u64,
    ) -> Self {
        VssCoordinator {
            querier,
            runner,
            diskshadow_path: diskshadow_path.into(),
            metadata_cache_path: metadata_cache_path.into(),
            polling_timeout_seconds,
            polling_interval_seconds,
        }
    }

    /// Builds the diskshadow script that creates shadow copies for the
    /// given volumes under the given VSS context, scoped to this
    /// process's id so concurrently running instances never collide on
    /// shadow set ids.
    pub fn build_script(&self, volumes: &[String], context: VssContextOption, process_id: u32) -> Result<String, VssError> {
        if volumes.is_empty() {
            return Err(VssError::ScriptGeneration("no volumes requested".to_string()));
        }
        let cache_path = expand_env_vars(&self.metadata_cache_path);
        let mut script = String::new();
        script.push_str(&format!("set context {}\n", context_token(context)));
        script.push_str(&format!("set metadata {cache_path}\n"));
        script.push_str("begin backup\n");
        for volume in volumes {
            script.push_str(&format!("add volume {} alias vol{}\n", volume, sanitize_alias(volume)));
        }
        script.push_str("create\n");
        script.push_str("end backup\n");
        script.push_str(&format!("exposed metadata poshbackup-{process_id}.cab\n"));
        Ok(script)
    }

    /// Writes the generated script to a temp file and runs diskshadow
    /// against it. A non-launchable executable or non-zero exit both
    /// surface as `VssError` rather than being swallowed.
    pub fn run_script(&self, script: &str) -> Result<String, VssError> {
        let script_path = std::env::temp_dir().join(format!("poshbackup-diskshadow-{}.dsh", std::process::id()));
        std::fs::write(&script_path, script)
            .map_err(|e| VssError::ScriptGeneration(format!("failed writing script file: {e}")))?;

        let output = self
            .runner
            .run_script(&self.diskshadow_path, &script_path.to_string_lossy())
            .map_err(|e| VssError::LaunchFailed(e.to_string()))?;

        let _ = std::fs::remove_file(&script_path);

        if !output.status.success() {
            return Err(VssError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Polls each requested volume until its shadow device path appears
    /// or the timeout elapses, building a `VssShadowMap` from whatever
    /// succeeds. Returns the first volume that timed out as an error;
    /// callers are expected to have already begun cleanup of any shadows
    /// created before the failure.
    pub fn wait_for_shadows(&self, volumes: &[String]) -> Result<VssShadowMap, VssError> {
        let mut map = VssShadowMap::default();
        for volume in volumes {
            let mut elapsed = 0u64;
            loop {
                if let Some(device_path) = self.querier.query_device_path(volume) {
                    info!(volume, device_path, "shadow copy ready");
                    map.insert(volume.clone(), device_path);
                    break;
                }
                if elapsed >= self.polling_timeout_seconds {
                    warn!(volume, "shadow copy polling timed out");
                    return Err(VssError::PollingTimeout { volume: volume.clone() });
                }
                std::thread::sleep(std::time::Duration::from_secs(self.polling_interval_seconds));
                elapsed += self.polling_interval_seconds;
            }
        }
        Ok(map)
    }

    /// Runs script build + invocation + polling as one unit, registering
    /// every volume in `registry` so `remove_all` can clean them up
    /// later regardless of how the rest of the job's run goes.
    pub fn create_shadows(
        &self,
        volumes: &[String],
        context: VssContextOption,
        process_id: u32,
        registry: &mut ShadowIdRegistry,
    ) -> Result<VssShadowMap, VssError> {
        let script = self.build_script(volumes, context, process_id)?;
        self.run_script(&script)?;
        let map = self.wait_for_shadows(volumes)?;
        for volume in volumes {
            registry.register(volume.clone());
        }
        Ok(map)
    }

    /// Issues a removal script for every volume `registry` is still
    /// holding. Failures are logged, not propagated: a shadow copy the
    /// OS garbage-collects eventually should never fail a job that
    /// otherwise completed.
    pub fn remove_all(&self, registry: &mut ShadowIdRegistry) {
        for volume in registry.ids() {
            let script = format!("delete shadows volume {volume}\n");
            if let Err(e) = self.run_script(&script) {
                warn!(volume, error = %e, "failed to remove shadow copy, leaving it for OS cleanup");
            }
        }
        registry.clear();
    }
}

/// Expands `%VAR%` tokens against the current process environment.
/// Unresolvable tokens are left untouched rather than removed, matching
/// the behavior an undefined variable has when left in a batch script.
fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)%").expect("static pattern is valid");
    re.replace_all(input, |caps: &regex::Captures| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    })
    .to_string()
}

fn context_token(context: VssContextOption) -> &'static str {
    match context {
        VssContextOption::Persistent => "persistent",
        VssContextOption::PersistentNoWriters => "persistent nowriters",
        VssContextOption::VolatileNoWriters => "volatile nowriters",
    }
}

fn sanitize_alias(volume: &str) -> String {
    volume.chars().filter(|c| c.is_alphanumeric()).collect()
}

impl fmt::Display for VssShadowMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (volume, device) in &self.volumes {
            writeln!(f, "{volume} -> {device}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedQuerier {
        responses: RefCell<Vec<Option<String>>>,
    }

    impl ShadowCopyQuerier for ScriptedQuerier {
        fn query_device_path(&self, _volume: &str) -> Option<String> {
            self.responses.borrow_mut().pop()
        }
    }

    struct ScriptedRunner {
        exit_code: i32,
    }

    impl DiskshadowRunner for ScriptedRunner {
        fn run_script(&self, _diskshadow_path: &str, _script_path: &str) -> std::io::Result<std::process::Output> {
            fake_output(self.exit_code)
        }
    }

    struct FailingToLaunchRunner;

    impl DiskshadowRunner for FailingToLaunchRunner {
        fn run_script(&self, _diskshadow_path: &str, _script_path: &str) -> std::io::Result<std::process::Output> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "diskshadow.exe not found"))
        }
    }

    #[cfg(unix)]
    fn fake_output(exit_code: i32) -> std::io::Result<std::process::Output> {
        use std::os::unix::process::ExitStatusExt;
        Ok(std::process::Output {
            status: std::process::ExitStatus::from_raw(exit_code << 8),
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }

    #[cfg(not(unix))]
    fn fake_output(exit_code: i32) -> std::io::Result<std::process::Output> {
        std::process::Command::new(if exit_code == 0 { "cmd" } else { "nonexistent-command-xyz" }).output()
    }

    fn coordinator(querier: ScriptedQuerier, runner: ScriptedRunner) -> VssCoordinator<ScriptedQuerier, ScriptedRunner> {
        VssCoordinator::new(querier, runner, "diskshadow.exe", "%TEMP%\\poshbackup.cab", 10, 1)
    }

    #[test]
    fn script_includes_context_and_every_volume() {
        let coord = coordinator(ScriptedQuerier { responses: RefCell::new(vec![]) }, ScriptedRunner { exit_code: 0 });
        let script = coord
            .build_script(&["C:\\".to_string(), "D:\\".to_string()], VssContextOption::Persistent, 4242)
            .unwrap();
        assert!(script.contains("set context persistent"));
        assert!(script.contains("poshbackup-4242.cab"));
        assert!(script.contains("add volume C:\\"));
        assert!(script.contains("add volume D:\\"));
    }

    #[test]
    fn empty_volume_list_is_rejected() {
        let coord = coordinator(ScriptedQuerier { responses: RefCell::new(vec![]) }, ScriptedRunner { exit_code: 0 });
        assert!(coord.build_script(&[], VssContextOption::Persistent, 1).is_err());
    }

    #[test]
    fn wait_for_shadows_times_out_when_never_ready() {
        let coord = VssCoordinator::new(
            ScriptedQuerier { responses: RefCell::new(vec![None, None]) },
            ScriptedRunner { exit_code: 0 },
            "diskshadow.exe",
            "poshbackup.cab",
            0,
            0,
        );
        let err = coord.wait_for_shadows(&["C:\\".to_string()]).unwrap_err();
        assert!(matches!(err, VssError::PollingTimeout { .. }));
    }

    #[test]
    fn wait_for_shadows_succeeds_immediately_when_ready() {
        let coord = coordinator(
            ScriptedQuerier { responses: RefCell::new(vec![Some(r"\\?\GLOBALROOT\Device\Shadow1".to_string())]) },
            ScriptedRunner { exit_code: 0 },
        );
        let map = coord.wait_for_shadows(&["C:\\".to_string()]).unwrap();
        assert!(!map.is_empty());
    }

    #[test]
    fn translate_rewrites_volume_prefix() {
        let mut map = VssShadowMap::default();
        map.insert("C:\\", r"\\?\GLOBALROOT\Device\Shadow1");
        let translated = map.translate(r"C:\Users\Data").unwrap();
        assert_eq!(translated, r"\\?\GLOBALROOT\Device\Shadow1Users\Data");
    }

    #[test]
    fn translate_unknown_volume_is_an_error() {
        let map = VssShadowMap::default();
        let err = map.translate(r"D:\Data").unwrap_err();
        assert!(matches!(err, VssError::UnknownVolume { .. }));
    }

    #[test]
    fn run_script_reports_launch_failure() {
        let coord = VssCoordinator::new(
            ScriptedQuerier { responses: RefCell::new(vec![]) },
            FailingToLaunchRunner,
            "diskshadow.exe",
            "poshbackup.cab",
            10,
            1,
        );
        let err = coord.run_script("set context persistent\n").unwrap_err();
        assert!(matches!(err, VssError::LaunchFailed(_)));
    }

    #[test]
    fn run_script_reports_non_zero_exit() {
        let coord = coordinator(ScriptedQuerier { responses: RefCell::new(vec![]) }, ScriptedRunner { exit_code: 1 });
        let err = coord.run_script("set context persistent\n").unwrap_err();
        assert!(matches!(err, VssError::NonZeroExit { .. }));
    }

    #[test]
    fn create_shadows_registers_every_volume_on_success() {
        let coord = coordinator(
            ScriptedQuerier { responses: RefCell::new(vec![Some("dev".to_string()), Some("dev".to_string())]) },
            ScriptedRunner { exit_code: 0 },
        );
        let mut registry = ShadowIdRegistry::default();
        let volumes = vec!["C:\\".to_string(), "D:\\".to_string()];
        coord.create_shadows(&volumes, VssContextOption::Persistent, 1, &mut registry).unwrap();
        assert_eq!(registry.ids().len(), 2);
    }

    #[test]
    fn remove_all_clears_the_registry_regardless_of_outcome() {
        let coord = coordinator(ScriptedQuerier { responses: RefCell::new(vec![]) }, ScriptedRunner { exit_code: 1 });
        let mut registry = ShadowIdRegistry::default();
        registry.register("vol1");
        coord.remove_all(&mut registry);
        assert!(registry.ids().is_empty());
    }

    #[test]
    fn expand_env_vars_substitutes_known_variable() {
        std::env::set_var("POSHBACKUP_TEST_VSS_VAR", "C:\\Temp");
        let expanded = expand_env_vars("%POSHBACKUP_TEST_VSS_VAR%\\Diskshadow.cab");
        assert_eq!(expanded, "C:\\Temp\\Diskshadow.cab");
        std::env::remove_var("POSHBACKUP_TEST_VSS_VAR");
    }

    #[test]
    fn expand_env_vars_leaves_unknown_variable_untouched() {
        let expanded = expand_env_vars("%POSHBACKUP_DEFINITELY_UNSET_XYZ%\\Diskshadow.cab");
        assert_eq!(expanded, "%POSHBACKUP_DEFINITELY_UNSET_XYZ%\\Diskshadow.cab");
    }
}
