use std::collections::HashSet;

use super::{
    ArchivePasswordMethod, BackupSetSpec, ChecksumAlgorithm, CompressionLevel, ConfigError,
    ConfigErrorKind, GlobalConfig, JobSpec, OnErrorInJob, PathValue, PauseBeforeExit,
    PauseBeforeExitValue, PostRunAction, PostRunActionSpec, ProcessPriorityConfig,
    ReportGeneratorType, SfxModuleConfig, SourcePathPolicy, VssContextOption,
};

/// CLI-layer overrides, the highest-precedence layer (§3: CLI ▸ job ▸ set
/// ▸ global ▸ hard-coded fallback).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub simulate: Option<bool>,
    pub test_archive: Option<bool>,
    pub compression_level: Option<CompressionLevel>,
    pub enable_vss: Option<bool>,
    pub pause_before_exit: Option<PauseBeforeExitValue>,
}

/// Fully resolved, per-job configuration with every tunable settled. This
/// is what the engine actually consumes; nothing downstream re-reads
/// `GlobalConfig` or `JobSpec`.
#[derive(Debug, Clone)]
pub struct EffectiveJobConfig {
    pub job_name: String,
    pub source_paths: Vec<String>,
    pub destination_dir: String,
    pub target_names: Vec<String>,

    pub archive_password_method: ArchivePasswordMethod,
    pub archive_password_secret_name: Option<String>,
    pub archive_password_vault_name: Option<String>,
    pub archive_password_plain_text: Option<String>,
    pub archive_password_secure_string_path: Option<String>,

    pub create_sfx: bool,
    pub sfx_module: SfxModuleConfig,
    pub seven_zip_cpu_affinity: Option<String>,
    pub additional_exclusions: Vec<String>,
    pub archive_date_format: String,
    pub archive_extension: String,
    pub compression_switch: &'static str,
    pub compress_open_files: bool,
    pub threads: Option<u32>,

    pub enable_vss: bool,
    pub vss_context_option: VssContextOption,
    pub snapshot_provider_name: Option<String>,
    pub source_is_vm_name: bool,

    pub on_missing_source: SourcePathPolicy,

    pub seven_zip_process_priority: ProcessPriorityConfig,
    pub enable_retries: bool,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
    pub treat_seven_zip_warnings_as_success: bool,

    pub test_archive_after_creation: bool,
    pub generate_archive_checksum: bool,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub verify_archive_checksum_on_test: bool,

    pub report_generator_type: Vec<String>,
    pub pre_backup_hook: Option<String>,
    pub post_backup_hook: Option<String>,
    pub pause_before_exit: PauseBeforeExit,
    pub hide_output: bool,
    pub use_password: bool,

    pub simulate: bool,
    pub post_run_action: PostRunActionSpec,
}

/// Resolves a single job's effective configuration, applying the
/// documented merge precedence field by field.
pub struct EffectiveConfigResolver<'a> {
    global: &'a GlobalConfig,
}

impl<'a> EffectiveConfigResolver<'a> {
    pub fn new(global: &'a GlobalConfig) -> Self {
        EffectiveConfigResolver { global }
    }

    fn job(&self, name: &str) -> Result<&'a JobSpec, ConfigError> {
        self.global
            .backup_locations
            .get(name)
            .ok_or_else(|| ConfigError::unknown_job(name))
    }

    fn set(&self, name: &str) -> Result<&'a BackupSetSpec, ConfigError> {
        self.global
            .backup_sets
            .get(name)
            .ok_or_else(|| ConfigError::unknown_set(name))
    }

    /// Resolves the ordered, de-duplicated job list a set expands to,
    /// rejecting dependency cycles.
    pub fn expand_set(&self, set_name: &str) -> Result<Vec<String>, ConfigError> {
        let set = self.set(set_name)?;
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        for job_name in &set.job_names {
            self.expand_job_deps(job_name, &mut ordered, &mut seen, &mut HashSet::new())?;
        }
        Ok(ordered)
    }

    fn expand_job_deps(
        &self,
        job_name: &str,
        ordered: &mut Vec<String>,
        seen: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
    ) -> Result<(), ConfigError> {
        if seen.contains(job_name) {
            return Ok(());
        }
        if !visiting.insert(job_name.to_string()) {
            return Err(ConfigError::unresolvable(
                job_name,
                format!("dependency cycle detected involving job '{job_name}'"),
            ));
        }

        let job = self.job(job_name)?;
        if let Some(deps) = &job.depends_on_jobs {
            for dep in deps {
                self.expand_job_deps(dep, ordered, seen, visiting)?;
            }
        }

        visiting.remove(job_name);
        seen.insert(job_name.to_string());
        ordered.push(job_name.to_string());
        Ok(())
    }

    pub fn resolve(
        &self,
        job_name: &str,
        set_name: Option<&str>,
        cli: &CliOverrides,
    ) -> Result<EffectiveJobConfig, ConfigError> {
        let job = self.job(job_name)?;
        let set = set_name.map(|s| self.set(s)).transpose()?;
        let g = self.global;

        let source_paths = job
            .path
            .as_ref()
            .ok_or_else(|| ConfigError::missing_required(&format!("BackupLocations.{job_name}.Path")))?
            .as_vec();
        if source_paths.is_empty() {
            return Err(ConfigError::invalid_value(
                &format!("BackupLocations.{job_name}.Path"),
                "must name at least one source path",
            ));
        }

        let destination_dir = job
            .destination_dir
            .clone()
            .unwrap_or_else(|| g.default_destination_dir.clone());
        if destination_dir.trim().is_empty() {
            return Err(ConfigError::missing_required(&format!(
                "BackupLocations.{job_name}.DestinationDir"
            )));
        }

        let compression_level = cli
            .compression_level
            .or(job.compression_level)
            .unwrap_or(g.default_compression_level);

        let enable_vss = cli.enable_vss.or(job.enable_vss).unwrap_or(g.enable_vss);

        let archive_date_format = job
            .archive_date_format
            .clone()
            .unwrap_or_else(|| g.default_archive_date_format.clone());
        validate_date_format(&archive_date_format, job_name)?;

        let archive_extension = job
            .archive_extension
            .clone()
            .unwrap_or_else(|| g.default_archive_extension.clone());
        if !archive_extension.starts_with('.') {
            return Err(ConfigError::invalid_value(
                &format!("BackupLocations.{job_name}.ArchiveExtension"),
                "must start with '.'",
            ));
        }

        let pause_before_exit = resolve_pause_before_exit(
            cli.pause_before_exit
                .clone()
                .or_else(|| job.pause_before_exit.clone())
                .unwrap_or_else(|| g.default_pause_before_exit.clone()),
        );

        let report_generator_type = job
            .report_generator_type
            .clone()
            .unwrap_or_else(|| g.default_report_generator_type.clone())
            .as_vec();

        let on_error = set.and_then(|s| s.on_error).unwrap_or(OnErrorInJob::StopSet);
        let _ = on_error; // consulted by the set-level orchestrator, not per-job state

        let post_run_action = set
            .and_then(|s| s.post_run_action.clone())
            .unwrap_or_else(|| g.post_run_action_defaults.clone());

        let target_names = resolve_target_names(job_name, job.target_names.as_deref().unwrap_or(&[]), g)?;

        Ok(EffectiveJobConfig {
            job_name: job_name.to_string(),
            source_paths,
            destination_dir,
            target_names,

            archive_password_method: job
                .archive_password_method
                .unwrap_or(g.default_archive_password_method),
            archive_password_secret_name: job.archive_password_secret_name.clone(),
            archive_password_vault_name: job.archive_password_vault_name.clone(),
            archive_password_plain_text: job.archive_password_plain_text.clone(),
            archive_password_secure_string_path: job.archive_password_secure_string_path.clone(),

            create_sfx: job.create_sfx.unwrap_or(g.default_create_sfx),
            sfx_module: job.sfx_module.unwrap_or(g.default_sfx_module),
            seven_zip_cpu_affinity: job.seven_zip_cpu_affinity.clone(),
            additional_exclusions: job
                .additional_exclusions
                .clone()
                .unwrap_or_else(|| g.default_additional_exclusions.clone()),
            archive_date_format,
            archive_extension,
            compression_switch: compression_level.to_switch(),
            compress_open_files: job.compress_open_files.unwrap_or(g.default_compress_open_files),
            threads: job.threads.or(g.default_threads),

            enable_vss,
            vss_context_option: job.vss_context_option.unwrap_or(g.default_vss_context_option),
            snapshot_provider_name: job.snapshot_provider_name.clone(),
            source_is_vm_name: job.source_is_vm_name.unwrap_or(false),

            on_missing_source: job.on_missing_source.unwrap_or(g.default_on_missing_source),

            seven_zip_process_priority: job
                .seven_zip_process_priority
                .unwrap_or(g.default_seven_zip_process_priority),
            enable_retries: job.enable_retries.unwrap_or(g.enable_retries),
            max_retry_attempts: job.max_retry_attempts.unwrap_or(g.max_retry_attempts),
            retry_delay_seconds: job.retry_delay_seconds.unwrap_or(g.retry_delay_seconds),
            treat_seven_zip_warnings_as_success: job
                .treat_seven_zip_warnings_as_success
                .unwrap_or(g.treat_seven_zip_warnings_as_success),

            test_archive_after_creation: cli
                .test_archive
                .or(job.test_archive_after_creation)
                .unwrap_or(g.default_test_archive_after_creation),
            generate_archive_checksum: job
                .generate_archive_checksum
                .unwrap_or(g.default_generate_archive_checksum),
            checksum_algorithm: job.checksum_algorithm.unwrap_or(g.default_checksum_algorithm),
            verify_archive_checksum_on_test: job
                .verify_archive_checksum_on_test
                .unwrap_or(g.default_verify_archive_checksum_on_test),

            report_generator_type,
            pre_backup_hook: job.pre_backup_hook.clone(),
            post_backup_hook: job.post_backup_hook.clone(),
            pause_before_exit,
            hide_output: job.hide_output.unwrap_or(g.default_hide_output),
            use_password: job.use_password.unwrap_or(false),

            simulate: cli.simulate.unwrap_or(false),
            post_run_action,
        })
    }
}

/// Resolves `TargetNames` into `ResolvedTargetInstances`: every name must
/// exist in `BackupTargets`, order is preserved, and duplicates are
/// rejected outright rather than silently deduplicated.
fn resolve_target_names(
    job_name: &str,
    target_names: &[String],
    global: &GlobalConfig,
) -> Result<Vec<String>, ConfigError> {
    let mut seen = HashSet::new();
    for name in target_names {
        if !global.backup_targets.contains_key(name) {
            return Err(ConfigError::unknown_target(name));
        }
        if !seen.insert(name.clone()) {
            return Err(ConfigError::invalid_value(
                &format!("BackupLocations.{job_name}.TargetNames"),
                format!("target '{name}' is listed more than once"),
            ));
        }
    }
    Ok(target_names.to_vec())
}

/// Accepts the `yyyy-MM-dd`-style tokens the config uses; rejects blanks
/// and raw strftime tokens so a misconfigured date format fails at
/// resolve time, not when building the archive name.
fn validate_date_format(format: &str, job_name: &str) -> Result<(), ConfigError> {
    if format.trim().is_empty() {
        return Err(ConfigError::invalid_value(
            &format!("BackupLocations.{job_name}.ArchiveDateFormat"),
            "must not be blank",
        ));
    }
    if format.contains('%') {
        return Err(ConfigError::invalid_value(
            &format!("BackupLocations.{job_name}.ArchiveDateFormat"),
            "use .NET-style tokens (yyyy, MM, dd), not strftime '%' tokens",
        ));
    }
    Ok(())
}

/// Resolves the Open Question of how `PauseBeforeExit`'s bool-or-enum
/// source value collapses to a single enum: `true` behaves as `Always`,
/// `false` as `Never`.
fn resolve_pause_before_exit(value: PauseBeforeExitValue) -> PauseBeforeExit {
    match value {
        PauseBeforeExitValue::Bool(true) => PauseBeforeExit::Always,
        PauseBeforeExitValue::Bool(false) => PauseBeforeExit::Never,
        PauseBeforeExitValue::Named(named) => named,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PathValue, PostRunActionSpec};
    use std::collections::HashMap;

    fn job_with_path(path: &str) -> JobSpec {
        JobSpec {
            path: Some(PathValue::Single(path.to_string())),
            destination_dir: Some("D:\\Backups".to_string()),
            ..Default::default()
        }
    }

    fn global_with_jobs(jobs: Vec<(&str, JobSpec)>) -> GlobalConfig {
        let mut g = GlobalConfig::default();
        g.seven_zip_path = "C:\\7z.exe".to_string();
        for (name, spec) in jobs {
            g.backup_locations.insert(name.to_string(), spec);
        }
        g
    }

    #[test]
    fn missing_job_is_reported() {
        let g = global_with_jobs(vec![]);
        let resolver = EffectiveConfigResolver::new(&g);
        let err = resolver.resolve("Nope", None, &CliOverrides::default()).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::UnknownJob);
    }

    #[test]
    fn job_level_override_beats_global_default() {
        let mut job = job_with_path("C:\\Data");
        job.compression_level = Some(CompressionLevel::Ultra);
        let g = global_with_jobs(vec![("Docs", job)]);
        let resolver = EffectiveConfigResolver::new(&g);
        let effective = resolver.resolve("Docs", None, &CliOverrides::default()).unwrap();
        assert_eq!(effective.compression_switch, "-mx=9");
    }

    #[test]
    fn cli_override_beats_job_level() {
        let mut job = job_with_path("C:\\Data");
        job.compression_level = Some(CompressionLevel::Ultra);
        let g = global_with_jobs(vec![("Docs", job)]);
        let resolver = EffectiveConfigResolver::new(&g);
        let cli = CliOverrides {
            compression_level: Some(CompressionLevel::Store),
            ..Default::default()
        };
        let effective = resolver.resolve("Docs", None, &cli).unwrap();
        assert_eq!(effective.compression_switch, "-mx=0");
    }

    #[test]
    fn dependency_cycle_is_rejected() {
        let mut a = job_with_path("C:\\A");
        a.depends_on_jobs = Some(vec!["B".to_string()]);
        let mut b = job_with_path("C:\\B");
        b.depends_on_jobs = Some(vec!["A".to_string()]);
        let mut g = global_with_jobs(vec![("A", a), ("B", b)]);
        g.backup_sets.insert(
            "Nightly".to_string(),
            BackupSetSpec {
                job_names: vec!["A".to_string()],
                on_error: None,
                post_run_action: None,
            },
        );
        let resolver = EffectiveConfigResolver::new(&g);
        let err = resolver.expand_set("Nightly").unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::Unresolvable);
    }

    #[test]
    fn set_expansion_orders_dependencies_before_dependents() {
        let mut a = job_with_path("C:\\A");
        a.depends_on_jobs = Some(vec!["B".to_string()]);
        let b = job_with_path("C:\\B");
        let mut g = global_with_jobs(vec![("A", a), ("B", b)]);
        g.backup_sets.insert(
            "Nightly".to_string(),
            BackupSetSpec {
                job_names: vec!["A".to_string()],
                on_error: None,
                post_run_action: None,
            },
        );
        let resolver = EffectiveConfigResolver::new(&g);
        let order = resolver.expand_set("Nightly").unwrap();
        assert_eq!(order, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn blank_date_format_is_rejected() {
        let mut job = job_with_path("C:\\Data");
        job.archive_date_format = Some("".to_string());
        let g = global_with_jobs(vec![("Docs", job)]);
        let resolver = EffectiveConfigResolver::new(&g);
        let err = resolver.resolve("Docs", None, &CliOverrides::default()).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::InvalidValue);
    }

    #[test]
    fn unknown_target_name_is_rejected() {
        let mut job = job_with_path("C:\\Data");
        job.target_names = Some(vec!["Nope".to_string()]);
        let g = global_with_jobs(vec![("Docs", job)]);
        let resolver = EffectiveConfigResolver::new(&g);
        let err = resolver.resolve("Docs", None, &CliOverrides::default()).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::UnknownTarget);
    }

    #[test]
    fn duplicate_target_name_is_rejected() {
        use crate::config::{TargetSpec, TargetType};
        let mut job = job_with_path("C:\\Data");
        job.target_names = Some(vec!["Offsite".to_string(), "Offsite".to_string()]);
        let mut g = global_with_jobs(vec![("Docs", job)]);
        g.backup_targets.insert(
            "Offsite".to_string(),
            TargetSpec {
                target_type: TargetType::Unc,
                settings: serde_json::Value::Null,
                retention: None,
            },
        );
        let resolver = EffectiveConfigResolver::new(&g);
        let err = resolver.resolve("Docs", None, &CliOverrides::default()).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::InvalidValue);
    }

    #[test]
    fn known_target_names_resolve_in_order() {
        use crate::config::{TargetSpec, TargetType};
        let mut job = job_with_path("C:\\Data");
        job.target_names = Some(vec!["B".to_string(), "A".to_string()]);
        let mut g = global_with_jobs(vec![("Docs", job)]);
        for name in ["A", "B"] {
            g.backup_targets.insert(
                name.to_string(),
                TargetSpec { target_type: TargetType::Unc, settings: serde_json::Value::Null, retention: None },
            );
        }
        let resolver = EffectiveConfigResolver::new(&g);
        let effective = resolver.resolve("Docs", None, &CliOverrides::default()).unwrap();
        assert_eq!(effective.target_names, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn pause_before_exit_bool_true_maps_to_always() {
        assert_eq!(
            resolve_pause_before_exit(PauseBeforeExitValue::Bool(true)),
            PauseBeforeExit::Always
        );
        assert_eq!(
            resolve_pause_before_exit(PauseBeforeExitValue::Bool(false)),
            PauseBeforeExit::Never
        );
    }
}
