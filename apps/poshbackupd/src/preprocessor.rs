use thiserror::Error;
use tracing::{info, warn};

use crate::config::resolver::EffectiveJobConfig;
use crate::config::SourcePathPolicy;
use crate::confirm::{self, ConfirmOutcome};
use crate::hooks::{HookError, HookRunner, HookStage};
use crate::secrets::{SecretError, SecretResolver, SecretString};
use crate::snapshot::{SnapshotError, SnapshotProvider, SnapshotSession};
use crate::vss::{DiskshadowRunner, ShadowCopyQuerier, ShadowIdRegistry, VssCoordinator, VssError};

#[derive(Debug, Error)]
pub enum PreProcessError {
    #[error("pre-backup hook failed: {0}")]
    Hook(#[from] HookError),
    #[error("secret resolution failed: {0}")]
    Secret(#[from] SecretError),
    #[error("snapshot creation failed: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("VSS shadow copy creation failed: {0}")]
    Vss(#[from] VssError),
    #[error("source path '{0}' does not exist")]
    MissingSource(String),
    #[error("failed to create destination directory '{path}': {source}")]
    DestinationPrep { path: String, source: std::io::Error },
    #[error("confirmation declined: {0}")]
    ConfirmationDeclined(String),
    #[error("SnapshotProviderName is set for job '{0}' but SourceIsVMName is false")]
    SnapshotProviderRequiresVmSource(String),
}

/// Outcome of preparing a job to run: either it's ready to archive, or it
/// was deliberately skipped (not a failure) per `OnMissingSource`.
pub enum PrepareOutcome {
    Ready(PreparedJob),
    Skipped { reason: String },
}

pub struct PreparedJob {
    pub resolved_source_paths: Vec<String>,
    pub secret: Option<SecretString>,
    pub snapshot_session: Option<SnapshotSession>,
    pub vss_registry: Option<ShadowIdRegistry>,
}

/// Runs the pre-backup pipeline in the documented order: source
/// validation, destination preparation, secret retrieval, pre-backup
/// hook, and finally snapshot/VSS acquisition. Snapshot/VSS is
/// deliberately the last fallible step: nothing after it in `prepare`
/// can fail and leak an acquired session, since there is nothing left to
/// fail. Whatever resources were already acquired by the time a later
/// stage in the wider job run fails are the caller's responsibility to
/// tear down via the reaper guards, since the pre-processor itself holds
/// no `Drop` state.
pub struct JobPreProcessor<'a, P: SnapshotProvider, Q: ShadowCopyQuerier, R: DiskshadowRunner> {
    snapshot_provider: Option<&'a P>,
    vss_coordinator: Option<&'a VssCoordinator<Q, R>>,
    secret_resolver: SecretResolver,
    interactive: bool,
}

impl<'a, P: SnapshotProvider, Q: ShadowCopyQuerier, R: DiskshadowRunner> JobPreProcessor<'a, P, Q, R> {
    pub fn new(
        snapshot_provider: Option<&'a P>,
        vss_coordinator: Option<&'a VssCoordinator<Q, R>>,
        simulate: bool,
        interactive: bool,
    ) -> Self {
        JobPreProcessor {
            snapshot_provider,
            vss_coordinator,
            secret_resolver: SecretResolver::new(simulate),
            interactive,
        }
    }

    pub fn prepare(&self, job: &EffectiveJobConfig) -> Result<PrepareOutcome, PreProcessError> {
        // 1. Source validation.
        let mut resolved_source_paths = job.source_paths.clone();
        if !job.source_is_vm_name {
            let mut kept = Vec::with_capacity(resolved_source_paths.len());
            for path in resolved_source_paths {
                if std::path::Path::new(&path).exists() {
                    kept.push(path);
                    continue;
                }
                match job.on_missing_source {
                    SourcePathPolicy::FailJob => return Err(PreProcessError::MissingSource(path)),
                    SourcePathPolicy::SkipJob => {
                        info!(job_name = %job.job_name, path, "source missing, skipping job");
                        return Ok(PrepareOutcome::Skipped {
                            reason: format!("source path '{path}' does not exist"),
                        });
                    }
                    SourcePathPolicy::WarnAndContinue => {
                        warn!(job_name = %job.job_name, path, "source missing, dropping from source set");
                    }
                }
            }
            if kept.is_empty() {
                info!(job_name = %job.job_name, "every configured source path was dropped, skipping job");
                return Ok(PrepareOutcome::Skipped { reason: "no valid source paths".to_string() });
            }
            resolved_source_paths = kept;
        }

        // 2. Destination preparation.
        if !std::path::Path::new(&job.destination_dir).exists() {
            let prompt = format!("Create destination directory '{}'?", job.destination_dir);
            if confirm::confirm(&prompt, self.interactive) == ConfirmOutcome::No {
                return Err(PreProcessError::ConfirmationDeclined(format!(
                    "user declined to create destination directory '{}'",
                    job.destination_dir
                )));
            }
            std::fs::create_dir_all(&job.destination_dir)
                .map_err(|source| PreProcessError::DestinationPrep { path: job.destination_dir.clone(), source })?;
        }

        // 3. Secret retrieval.
        let secret = self.secret_resolver.resolve(job)?;

        // 4. Pre-backup hook.
        if let Some(hook_path) = &job.pre_backup_hook {
            HookRunner::run(HookStage::PreBackup, hook_path, &job.job_name)?;
        }

        // 5. Snapshot or VSS.
        if job.snapshot_provider_name.is_some() && !job.source_is_vm_name {
            return Err(PreProcessError::SnapshotProviderRequiresVmSource(job.job_name.clone()));
        }

        let mut snapshot_session = None;
        let mut vss_registry = None;

        if job.source_is_vm_name {
            let provider = self.snapshot_provider.ok_or_else(|| {
                PreProcessError::Snapshot(SnapshotError::UnknownProvider(
                    job.snapshot_provider_name.clone().unwrap_or_default(),
                ))
            })?;
            let vm_name = job.source_paths.first().cloned().unwrap_or_default();
            let session = provider.create(&vm_name)?;
            resolved_source_paths = session.translate_sources(&job.source_paths);
            snapshot_session = Some(session);
        } else if job.enable_vss {
            let coordinator = self
                .vss_coordinator
                .ok_or_else(|| PreProcessError::Vss(VssError::ScriptGeneration("VSS is enabled but no coordinator is configured".to_string())))?;

            let mut volumes: Vec<String> = Vec::new();
            for path in &resolved_source_paths {
                let root = volume_root(path);
                if !volumes.contains(&root) {
                    volumes.push(root);
                }
            }

            let mut registry = ShadowIdRegistry::default();
            let shadow_map = coordinator.create_shadows(&volumes, job.vss_context_option, std::process::id(), &mut registry)?;
            resolved_source_paths = resolved_source_paths
                .iter()
                .map(|path| shadow_map.translate(path))
                .collect::<Result<Vec<_>, _>>()?;
            vss_registry = Some(registry);
        }

        Ok(PrepareOutcome::Ready(PreparedJob {
            resolved_source_paths,
            secret,
            snapshot_session,
            vss_registry,
        }))
    }
}

fn volume_root(path: &str) -> String {
    match path.find(['\\', '/']) {
        Some(idx) => path[..=idx].to_string(),
        None => path.to_string(),
    }
}
