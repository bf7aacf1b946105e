use std::path::Path;
use std::time::Instant;

use sevenzip_client::{
    build_args, test_archive, ArchiveBuildOptions, InvokerConfig, ProcessRunner, SevenZipInvoker,
};
use sha1::Digest as _;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::resolver::EffectiveJobConfig;
use crate::config::ChecksumAlgorithm;
use crate::monitoring::MonitoringHub;
use crate::preprocessor::{JobPreProcessor, PrepareOutcome, PreProcessError};
use crate::reaper::{SnapshotGuard, TempPasswordFileGuard, VssGuard};
use crate::report::{JobReport, JobStatus};
use crate::retention::apply_local_retention;
use crate::snapshot::SnapshotProvider;
use crate::system_actions::{self, PostRunDecision};
use crate::targets::RemoteTarget;
use crate::vss::{DiskshadowRunner, ShadowCopyQuerier, VssCoordinator};

/// Result of running a single job to completion: its report, and any
/// post-run action that was decided (but never executed) for it.
pub struct JobRunOutcome {
    pub report: JobReport,
    pub post_run_decision: Option<PostRunDecision>,
}

/// Ties the pre-processor, argument builder, invoker, tester, remote
/// targets, retention, and reporting together into a single job run.
/// This is the engine's single entry point; `main`/`scheduler` never
/// touch any of the lower-level modules directly.
pub struct JobEngine<'a, R: ProcessRunner, P: SnapshotProvider, Q: ShadowCopyQuerier, D: DiskshadowRunner> {
    invoker: &'a SevenZipInvoker<R>,
    seven_zip_path: String,
    snapshot_provider: Option<&'a P>,
    vss_coordinator: Option<&'a VssCoordinator<Q, D>>,
    targets: &'a [Box<dyn RemoteTarget>],
    monitoring: &'a MonitoringHub,
    hostname: String,
    interactive: bool,
}

impl<'a, R: ProcessRunner, P: SnapshotProvider, Q: ShadowCopyQuerier, D: DiskshadowRunner> JobEngine<'a, R, P, Q, D> {
    pub fn new(
        invoker: &'a SevenZipInvoker<R>,
        seven_zip_path: impl Into<String>,
        snapshot_provider: Option<&'a P>,
        vss_coordinator: Option<&'a VssCoordinator<Q, D>>,
        targets: &'a [Box<dyn RemoteTarget>],
        monitoring: &'a MonitoringHub,
        hostname: impl Into<String>,
        interactive: bool,
    ) -> Self {
        JobEngine {
            invoker,
            seven_zip_path: seven_zip_path.into(),
            snapshot_provider,
            vss_coordinator,
            targets,
            monitoring,
            hostname: hostname.into(),
            interactive,
        }
    }

    pub fn run_job(&self, job: &EffectiveJobConfig) -> JobRunOutcome {
        let mut report = JobReport::new(&job.job_name);
        let _ = self.monitoring_start(job);

        let pre = JobPreProcessor::new(self.snapshot_provider, self.vss_coordinator, job.simulate, self.interactive);
        let prepared = match pre.prepare(job) {
            Ok(PrepareOutcome::Ready(prepared)) => prepared,
            Ok(PrepareOutcome::Skipped { reason }) => {
                report.status = JobStatus::Skipped;
                report.note("skip", reason);
                return self.finish(job, report);
            }
            Err(e @ PreProcessError::ConfirmationDeclined(_)) => {
                report.status = JobStatus::ConfirmationDeclined;
                report.note("pre-processing", e.to_string());
                return self.finish(job, report);
            }
            Err(e) => {
                report.status = JobStatus::Failure;
                report.note("pre-processing", e.to_string());
                return self.finish(job, report);
            }
        };

        let _snapshot_guard = prepared.snapshot_session.as_ref().and_then(|session| {
            self.snapshot_provider.map(|provider| SnapshotGuard::new(provider, session.clone()))
        });
        let _vss_guard = match (prepared.vss_registry, self.vss_coordinator) {
            (Some(registry), Some(coordinator)) => Some(VssGuard::new(coordinator, registry)),
            _ => None,
        };

        let password_guard = prepared
            .secret
            .as_ref()
            .map(|secret| self.write_temp_password_file(secret.expose()));
        let password_file = match &password_guard {
            Some(Ok(guard)) => Some(guard.path().to_string()),
            Some(Err(e)) => {
                report.status = JobStatus::Failure;
                report.note("password file", e.clone());
                return self.finish(job, report);
            }
            None => None,
        };

        let archive_path = self.build_archive_path(job);

        let build_options = ArchiveBuildOptions {
            archive_type_switch: archive_type_switch(&job.archive_extension),
            compression_level_switch: Some(job.compression_switch.to_string()),
            compression_method_switch: None,
            dictionary_size_switch: None,
            word_size_switch: None,
            solid_block_size_switch: None,
            compress_open_files: job.compress_open_files,
            threads_switch: job.threads.map(|t| format!("-mmt={t}")),
            create_sfx: job.create_sfx,
            sfx_module: job.sfx_module.into(),
            additional_exclusions: job.additional_exclusions.clone(),
            password_in_use: prepared.secret.is_some(),
            password_file,
            archive_path: archive_path.clone(),
            source_paths: prepared.resolved_source_paths.clone(),
        };

        let tokens = match build_args(&build_options) {
            Ok(tokens) => tokens,
            Err(e) => {
                report.status = JobStatus::Failure;
                report.note("argument build", e.to_string());
                return self.finish(job, report);
            }
        };

        let invoker_config = InvokerConfig {
            exe_path: self.seven_zip_path.clone(),
            priority: job.seven_zip_process_priority.into(),
            cpu_affinity: job.seven_zip_cpu_affinity.clone(),
            hide_output: job.hide_output,
            simulate: job.simulate,
            max_retries: job.max_retry_attempts,
            retry_delay_seconds: job.retry_delay_seconds,
            enable_retries: job.enable_retries,
            treat_warnings_as_success: job.treat_seven_zip_warnings_as_success,
        };

        let started = Instant::now();
        let invocation = self.invoker.invoke(&invoker_config, &tokens);
        report.exit_code = invocation.exit_code;
        report.attempts_made = invocation.attempts_made;
        report.elapsed_seconds = started.elapsed().as_secs_f64();

        if !invocation.is_success(job.treat_seven_zip_warnings_as_success) {
            report.status = JobStatus::Failure;
            report.note("7-zip", format!("exit code {}", invocation.exit_code));
            return self.finish(job, report);
        }

        report.status = if job.simulate {
            JobStatus::SimulatedComplete
        } else if invocation.exit_code == 1 {
            JobStatus::Warnings
        } else {
            JobStatus::Success
        };
        report.archive_path = Some(archive_path.clone());

        if !job.simulate {
            if let Ok(metadata) = std::fs::metadata(&archive_path) {
                report.archive_size_bytes = Some(metadata.len());
            }

            if job.generate_archive_checksum {
                match compute_checksum(&archive_path, job.checksum_algorithm) {
                    Ok(sum) => report.checksum = Some(sum),
                    Err(e) => report.note("checksum", e),
                }
            }

            if job.test_archive_after_creation {
                let password_file_for_test = password_guard.as_ref().and_then(|g| g.as_ref().ok()).map(|g| g.path());
                let (outcome, _) = test_archive(self.invoker, &invoker_config, &archive_path, password_file_for_test);
                report.note("test", format!("{outcome:?}"));
            }

            for target_name in &job.target_names {
                if let Some(target) = self.targets.iter().find(|t| t.name() == target_name) {
                    match target.transfer(&archive_path) {
                        Ok(()) => {
                            report.note("target", format!("transferred to {target_name}"));
                        }
                        Err(e) => {
                            warn!(job_name = %job.job_name, target = target_name, error = %e, "target transfer failed");
                            report.note("target", format!("{target_name} failed: {e}"));
                        }
                    }
                } else {
                    warn!(job_name = %job.job_name, target = target_name, "target is not configured, skipping");
                }
            }

            if let Some(parent) = Path::new(&archive_path).parent() {
                if let Ok(deleted) = apply_local_retention(&parent.to_string_lossy(), &base_name_prefix(job), 0) {
                    if !deleted.is_empty() {
                        report.note("retention", format!("{} local archive(s) pruned", deleted.len()));
                    }
                }
            }
        }

        self.finish(job, report)
    }

    fn monitoring_start(&self, job: &EffectiveJobConfig) {
        self.monitoring.notify_start(&job.job_name, &self.hostname);
    }

    fn write_temp_password_file(&self, password: &str) -> Result<TempPasswordFileGuard, String> {
        let path = std::env::temp_dir().join(format!("poshbackup-{}.pw", Uuid::new_v4()));
        std::fs::write(&path, password).map_err(|e| e.to_string())?;
        Ok(TempPasswordFileGuard::new(path.to_string_lossy().to_string()))
    }

    fn finish(&self, job: &EffectiveJobConfig, report: JobReport) -> JobRunOutcome {
        match report.status {
            JobStatus::Success | JobStatus::SimulatedComplete | JobStatus::Warnings => {
                self.monitoring.notify_success(&job.job_name, &self.hostname, &report);
            }
            JobStatus::Failure | JobStatus::Skipped | JobStatus::ConfirmationDeclined => {
                self.monitoring.notify_failure(&job.job_name, &self.hostname, &report);
            }
        }

        let post_run_decision = system_actions::decide(&job.post_run_action, report.status);

        info!(job_name = %job.job_name, status = ?report.status, "job finished");
        JobRunOutcome { report, post_run_decision }
    }

    fn build_archive_path(&self, job: &EffectiveJobConfig) -> String {
        let date = chrono::Local::now().format(&net_date_format(&job.archive_date_format));
        format!(
            "{}/{}{date}{}",
            job.destination_dir.trim_end_matches(['\\', '/']),
            base_name_prefix(job),
            job.archive_extension
        )
    }
}

fn base_name_prefix(job: &EffectiveJobConfig) -> String {
    format!("{}_", job.job_name)
}

fn archive_type_switch(extension: &str) -> String {
    match extension.trim_start_matches('.') {
        "zip" => "-tzip".to_string(),
        "tar" => "-ttar".to_string(),
        _ => "-t7z".to_string(),
    }
}

/// Translates the .NET-style date tokens the config uses (`yyyy-MM-dd`)
/// into `chrono`'s strftime tokens.
fn net_date_format(format: &str) -> String {
    format
        .replace("yyyy", "%Y")
        .replace("MM", "%m")
        .replace("dd", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

fn compute_checksum(path: &str, algorithm: ChecksumAlgorithm) -> Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let hex = match algorithm {
        ChecksumAlgorithm::Sha1 => {
            let mut hasher = sha1::Sha1::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        }
        ChecksumAlgorithm::Sha256 => {
            let mut hasher = sha2::Sha256::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        }
        ChecksumAlgorithm::Sha384 => {
            let mut hasher = sha2::Sha384::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        }
        ChecksumAlgorithm::Sha512 => {
            let mut hasher = sha2::Sha512::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        }
        ChecksumAlgorithm::Md5 => {
            let mut hasher = md5::Md5::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        }
    };
    Ok(hex)
}
