use std::time::Duration;

/// `7z`/OS process scheduling priority. Maps onto `SetPriorityClass` on
/// Windows and a best-effort `nice` value on Unix test/dev hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessPriority {
    Idle,
    BelowNormal,
    #[default]
    Normal,
    AboveNormal,
    High,
}

/// Self-extracting-archive module selection for `CreateSFX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfxModule {
    Gui,
    Installer,
    Console,
}

impl SfxModule {
    /// The `-sfx<module>` token for this module, per the fixed argument
    /// order in the archive builder.
    pub fn token(self) -> &'static str {
        match self {
            SfxModule::Gui => "-sfx7zS.sfx",
            SfxModule::Installer => "-sfx7zSD.sfx",
            SfxModule::Console => "-sfx",
        }
    }
}

/// Internal sentinel exit codes. These are never codes 7-Zip itself
/// returns; the invoker substitutes them for situations 7-Zip never gets
/// the chance to report on.
pub const SENTINEL_LAUNCH_FAILED: i32 = -999;
pub const SENTINEL_CONFIRM_DECLINED: i32 = -1000;
pub const SENTINEL_UNINITIALIZED: i32 = -1;

/// Result of one `SevenZipInvoker::invoke` call, possibly spanning
/// several retried attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationResult {
    pub exit_code: i32,
    pub elapsed: Duration,
    pub attempts_made: u32,
}

impl InvocationResult {
    /// Whether `exit_code` should be treated as a successful run, given
    /// the job's `treat_warnings_as_success` policy.
    pub fn is_success(&self, treat_warnings_as_success: bool) -> bool {
        is_accepted_exit_code(self.exit_code, treat_warnings_as_success)
    }
}

/// Shared acceptance rule used by the retry loop and by observability
/// (stderr/stdout log levels): 0 always succeeds, 1 succeeds only under
/// `treat_warnings_as_success`, anything else is a failure.
pub fn is_accepted_exit_code(exit_code: i32, treat_warnings_as_success: bool) -> bool {
    exit_code == 0 || (exit_code == 1 && treat_warnings_as_success)
}
