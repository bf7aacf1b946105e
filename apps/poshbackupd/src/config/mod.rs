#![allow(dead_code)]
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod resolver;

pub use error::{ConfigError, ConfigErrorKind};

/// A job's `Path` may be a single string or an ordered sequence of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathValue {
    Single(String),
    Many(Vec<String>),
}

impl PathValue {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            PathValue::Single(s) => vec![s.clone()],
            PathValue::Many(v) => v.clone(),
        }
    }
}

/// `ReportGeneratorType` accepts either a string or an ordered sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportGeneratorType {
    Single(String),
    Many(Vec<String>),
}

impl ReportGeneratorType {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            ReportGeneratorType::Single(s) => vec![s.clone()],
            ReportGeneratorType::Many(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VssContextOption {
    Persistent,
    #[serde(rename = "Persistent NoWriters")]
    PersistentNoWriters,
    #[serde(rename = "Volatile NoWriters")]
    VolatileNoWriters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessPriorityConfig {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
}

impl From<ProcessPriorityConfig> for sevenzip_client::ProcessPriority {
    fn from(value: ProcessPriorityConfig) -> Self {
        match value {
            ProcessPriorityConfig::Idle => sevenzip_client::ProcessPriority::Idle,
            ProcessPriorityConfig::BelowNormal => sevenzip_client::ProcessPriority::BelowNormal,
            ProcessPriorityConfig::Normal => sevenzip_client::ProcessPriority::Normal,
            ProcessPriorityConfig::AboveNormal => sevenzip_client::ProcessPriority::AboveNormal,
            ProcessPriorityConfig::High => sevenzip_client::ProcessPriority::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Md5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    Store,
    Fastest,
    Fast,
    Normal,
    Maximum,
    Ultra,
}

impl CompressionLevel {
    /// Normalizes a compression level name to its 7-Zip `-mx=` switch.
    pub fn to_switch(self) -> &'static str {
        match self {
            CompressionLevel::Store => "-mx=0",
            CompressionLevel::Fastest => "-mx=1",
            CompressionLevel::Fast => "-mx=3",
            CompressionLevel::Normal => "-mx=5",
            CompressionLevel::Maximum => "-mx=7",
            CompressionLevel::Ultra => "-mx=9",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SfxModuleConfig {
    Gui,
    Installer,
    Console,
}

impl From<SfxModuleConfig> for sevenzip_client::SfxModule {
    fn from(value: SfxModuleConfig) -> Self {
        match value {
            SfxModuleConfig::Gui => sevenzip_client::SfxModule::Gui,
            SfxModuleConfig::Installer => sevenzip_client::SfxModule::Installer,
            SfxModuleConfig::Console => sevenzip_client::SfxModule::Console,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchivePasswordMethod {
    None,
    Interactive,
    SecretManagement,
    SecureStringFile,
    PlainText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SourcePathPolicy {
    FailJob,
    SkipJob,
    WarnAndContinue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnErrorInJob {
    StopSet,
    ContinueSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostRunAction {
    None,
    Shutdown,
    Restart,
    Hibernate,
    LogOff,
    Sleep,
    Lock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatusTrigger {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "WARNINGS")]
    Warnings,
    #[serde(rename = "FAILURE")]
    Failure,
    #[serde(rename = "SIMULATED_COMPLETE")]
    SimulatedComplete,
    #[serde(rename = "ANY")]
    Any,
}

/// `PauseBeforeExit` accepts both booleans and string enums in the
/// source config; normalized to this enum by the resolver (Open Question
/// in spec §9, resolved here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseBeforeExit {
    Always,
    Never,
    OnFailure,
    OnWarning,
    OnFailureOrWarning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PauseBeforeExitValue {
    Bool(bool),
    Named(PauseBeforeExit),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostRunActionSpec {
    pub enabled: Option<bool>,
    pub action: Option<PostRunAction>,
    pub delay_seconds: Option<u64>,
    pub trigger_on_status: Option<Vec<JobStatusTrigger>>,
    pub force_action: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RetentionSpec {
    pub keep_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    Unc,
    Sftp,
    Replicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    #[serde(rename = "Type")]
    pub target_type: TargetType,
    #[serde(rename = "TargetSpecificSettings")]
    pub settings: serde_json::Value,
    pub retention: Option<RetentionSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotProviderSpec {
    #[serde(rename = "Type")]
    pub provider_type: String,
    pub settings: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScheduleSpec {
    pub enabled: Option<bool>,
    #[serde(rename = "type")]
    pub schedule_type: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackupSetSpec {
    pub job_names: Vec<String>,
    pub on_error: Option<OnErrorInJob>,
    pub post_run_action: Option<PostRunActionSpec>,
}

/// Raw, as-configured per-job spec. Every tunable is `Option` here; the
/// resolver fills in the effective value from job ▸ set ▸ global ▸
/// hard-coded fallback.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobSpec {
    pub path: Option<PathValue>,
    pub name: Option<String>,
    pub destination_dir: Option<String>,
    pub target_names: Option<Vec<String>>,
    pub schedule: Option<ScheduleSpec>,
    pub depends_on_jobs: Option<Vec<String>>,
    pub enabled: Option<bool>,

    pub archive_password_method: Option<ArchivePasswordMethod>,
    pub archive_password_secret_name: Option<String>,
    pub archive_password_vault_name: Option<String>,
    pub archive_password_plain_text: Option<String>,
    pub archive_password_secure_string_path: Option<String>,
    pub use_password: Option<bool>,

    pub create_sfx: Option<bool>,
    pub sfx_module: Option<SfxModuleConfig>,
    pub seven_zip_cpu_affinity: Option<String>,
    pub additional_exclusions: Option<Vec<String>>,
    pub archive_date_format: Option<String>,
    pub archive_extension: Option<String>,
    pub compression_level: Option<CompressionLevel>,
    pub compression_method_switch: Option<String>,
    pub dictionary_size_switch: Option<String>,
    pub word_size_switch: Option<String>,
    pub solid_block_size_switch: Option<String>,
    pub compress_open_files: Option<bool>,
    pub threads: Option<u32>,

    pub enable_vss: Option<bool>,
    pub vss_context_option: Option<VssContextOption>,
    pub snapshot_provider_name: Option<String>,
    pub source_is_vm_name: Option<bool>,

    pub on_missing_source: Option<SourcePathPolicy>,

    pub seven_zip_process_priority: Option<ProcessPriorityConfig>,
    pub enable_retries: Option<bool>,
    pub max_retry_attempts: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
    pub treat_seven_zip_warnings_as_success: Option<bool>,

    pub test_archive_after_creation: Option<bool>,
    pub generate_archive_checksum: Option<bool>,
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    pub verify_archive_checksum_on_test: Option<bool>,

    pub report_generator_type: Option<ReportGeneratorType>,
    pub pre_backup_hook: Option<String>,
    pub post_backup_hook: Option<String>,
    pub pause_before_exit: Option<PauseBeforeExitValue>,
    pub hide_output: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub hostname: String,
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            hostname: "localhost".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Process-wide, immutable-after-load configuration tree (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub general: GeneralConfig,

    pub seven_zip_path: String,
    pub vss_metadata_cache_path: String,
    pub default_destination_dir: String,
    pub report_dir: String,

    pub enable_vss: bool,
    pub default_vss_context_option: VssContextOption,
    pub vss_polling_timeout_seconds: u64,
    pub vss_polling_interval_seconds: u64,

    pub enable_retries: bool,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,

    pub default_seven_zip_process_priority: ProcessPriorityConfig,
    pub treat_seven_zip_warnings_as_success: bool,

    pub default_generate_archive_checksum: bool,
    pub default_checksum_algorithm: ChecksumAlgorithm,
    pub default_verify_archive_checksum_on_test: bool,

    pub default_compression_level: CompressionLevel,
    pub default_archive_extension: String,
    pub default_archive_date_format: String,
    pub default_create_sfx: bool,
    pub default_sfx_module: SfxModuleConfig,
    pub default_compress_open_files: bool,
    pub default_threads: Option<u32>,
    pub default_additional_exclusions: Vec<String>,
    pub default_archive_password_method: ArchivePasswordMethod,
    pub default_on_missing_source: SourcePathPolicy,
    pub default_test_archive_after_creation: bool,
    pub default_report_generator_type: ReportGeneratorType,
    pub default_pause_before_exit: PauseBeforeExitValue,
    pub default_hide_output: bool,

    pub post_run_action_defaults: PostRunActionSpec,

    pub backup_locations: HashMap<String, JobSpec>,
    pub backup_sets: HashMap<String, BackupSetSpec>,
    pub backup_targets: HashMap<String, TargetSpec>,
    pub snapshot_providers: HashMap<String, SnapshotProviderSpec>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            general: GeneralConfig::default(),
            seven_zip_path: String::new(),
            vss_metadata_cache_path: "%windir%\\System32\\Config\\Systemprofile\\AppData\\Local\\Microsoft\\Diskshadow.cab".to_string(),
            default_destination_dir: String::new(),
            report_dir: "Reports".to_string(),
            enable_vss: false,
            default_vss_context_option: VssContextOption::Persistent,
            vss_polling_timeout_seconds: 120,
            vss_polling_interval_seconds: 2,
            enable_retries: true,
            max_retry_attempts: 3,
            retry_delay_seconds: 5,
            default_seven_zip_process_priority: ProcessPriorityConfig::Normal,
            treat_seven_zip_warnings_as_success: false,
            default_generate_archive_checksum: false,
            default_checksum_algorithm: ChecksumAlgorithm::Sha256,
            default_verify_archive_checksum_on_test: false,
            default_compression_level: CompressionLevel::Normal,
            default_archive_extension: ".7z".to_string(),
            default_archive_date_format: "yyyy-MM-dd".to_string(),
            default_create_sfx: false,
            default_sfx_module: SfxModuleConfig::Console,
            default_compress_open_files: false,
            default_threads: None,
            default_additional_exclusions: Vec::new(),
            default_archive_password_method: ArchivePasswordMethod::None,
            default_on_missing_source: SourcePathPolicy::FailJob,
            default_test_archive_after_creation: false,
            default_report_generator_type: ReportGeneratorType::Single("HTML".to_string()),
            default_pause_before_exit: PauseBeforeExitValue::Named(PauseBeforeExit::Never),
            default_hide_output: false,
            post_run_action_defaults: PostRunActionSpec {
                enabled: Some(false),
                action: Some(PostRunAction::None),
                delay_seconds: Some(0),
                trigger_on_status: Some(vec![JobStatusTrigger::Any]),
                force_action: Some(false),
            },
            backup_locations: HashMap::new(),
            backup_sets: HashMap::new(),
            backup_targets: HashMap::new(),
            snapshot_providers: HashMap::new(),
        }
    }
}

/// Loads and merges `GlobalConfig` from the hard-coded defaults and a
/// TOML config file, the same division of labor the teacher uses
/// (`Figment::from(Serialized::defaults(..)).merge(Toml::file(..))`).
pub fn load(config_path: &str) -> eyre::Result<GlobalConfig> {
    use figment::providers::{Format, Serialized, Toml};
    use figment::Figment;

    let config = Figment::from(Serialized::defaults(GlobalConfig::default()))
        .merge(Toml::file(config_path))
        .extract::<GlobalConfig>()?;

    if config.seven_zip_path.trim().is_empty() {
        return Err(eyre::eyre!("SevenZipPath is required but was not configured"));
    }

    Ok(config)
}
