use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::affinity;
use crate::types::{is_accepted_exit_code, InvocationResult, ProcessPriority, SENTINEL_LAUNCH_FAILED};

/// One completed (or attempted) child-process invocation, as observed by
/// the invoker: exit code plus whatever it printed.
pub struct RunOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Abstracts "spawn a process, optionally set priority/affinity once
/// started, wait for it, capture streams" so the retry/observability
/// logic can be unit tested against a fake.
pub trait ProcessRunner {
    fn run(
        &self,
        exe_path: &str,
        args: &[String],
        priority: ProcessPriority,
        affinity_mask: Option<u64>,
        capture_stdout: bool,
    ) -> std::io::Result<RunOutcome>;
}

/// The real runner: spawns `exe_path` via `std::process::Command`, sets
/// priority/affinity after start (best-effort, warns on failure), and
/// waits for exit.
pub struct ChildProcessRunner;

impl ProcessRunner for ChildProcessRunner {
    fn run(
        &self,
        exe_path: &str,
        args: &[String],
        priority: ProcessPriority,
        affinity_mask: Option<u64>,
        capture_stdout: bool,
    ) -> std::io::Result<RunOutcome> {
        let mut command = Command::new(exe_path);
        command.args(args);
        command.stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        command.stderr(Stdio::piped());

        let mut child = command.spawn()?;
        let pid = child.id();

        if let Err(e) = crate::platform::set_priority(pid, priority) {
            warn!("failed to set process priority for pid {pid}: {e}");
        }
        if let Some(mask) = affinity_mask {
            if let Err(e) = crate::platform::set_affinity(pid, mask) {
                warn!("failed to set CPU affinity for pid {pid}: {e}");
            }
        }

        let mut stderr_buf = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut stderr_buf);
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let exit_code = output.status.code().unwrap_or(SENTINEL_LAUNCH_FAILED);

        Ok(RunOutcome {
            exit_code,
            stdout,
            stderr: stderr_buf,
        })
    }
}

/// Configuration for one `SevenZipInvoker` call, per §4.3 of the engine's
/// contract.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    pub exe_path: String,
    pub priority: ProcessPriority,
    pub cpu_affinity: Option<String>,
    pub hide_output: bool,
    pub simulate: bool,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub enable_retries: bool,
    pub treat_warnings_as_success: bool,
}

pub struct SevenZipInvoker<R: ProcessRunner = ChildProcessRunner> {
    pub(crate) runner: R,
    logical_processors: usize,
}

impl SevenZipInvoker<ChildProcessRunner> {
    pub fn new() -> Self {
        SevenZipInvoker {
            runner: ChildProcessRunner,
            logical_processors: num_cpus::get(),
        }
    }
}

impl Default for SevenZipInvoker<ChildProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ProcessRunner> SevenZipInvoker<R> {
    pub fn with_runner(runner: R, logical_processors: usize) -> Self {
        SevenZipInvoker {
            runner,
            logical_processors,
        }
    }

    /// Renders tokens into a single display/log line, quoting any token
    /// that contains whitespace and isn't already quoted. This is purely
    /// for logging/simulation; tokens are passed to the OS unquoted and
    /// unsplit (`Command::args` takes each as a literal argv entry).
    pub fn format_command_line(exe_path: &str, tokens: &[String]) -> String {
        let mut parts = vec![exe_path.to_string()];
        for tok in tokens {
            if tok.contains(char::is_whitespace) && !(tok.starts_with('"') && tok.ends_with('"')) {
                parts.push(format!("\"{tok}\""));
            } else {
                parts.push(tok.clone());
            }
        }
        parts.join(" ")
    }

    fn resolved_affinity(&self, config: &InvokerConfig) -> Option<u64> {
        let resolution = affinity::resolve(config.cpu_affinity.as_deref(), self.logical_processors);
        for w in &resolution.warnings {
            warn!("{w}");
        }
        if config.cpu_affinity.is_some() {
            info!(
                "CPU affinity: raw={:?} effective={:?} logical_processors={}",
                config.cpu_affinity, resolution.mask, self.logical_processors
            );
        }
        resolution.mask
    }

    /// Runs `7z` with `tokens`, applying the retry/priority/affinity
    /// discipline in §4.3. Never returns a Rust `Err` for a failed
    /// archive operation — failures are encoded in `exit_code` (including
    /// the sentinel codes), matching the PowerShell original's "exit code
    /// is the contract" design.
    pub fn invoke(&self, config: &InvokerConfig, tokens: &[String]) -> InvocationResult {
        let affinity_mask = self.resolved_affinity(config);

        if config.simulate {
            info!(
                "[SIMULATE] would run: {}",
                Self::format_command_line(&config.exe_path, tokens)
            );
            return InvocationResult {
                exit_code: 0,
                elapsed: Duration::ZERO,
                attempts_made: 1,
            };
        }

        let actual_max_tries = if config.enable_retries {
            config.max_retries.max(1)
        } else {
            1
        };

        let mut total_elapsed = Duration::ZERO;
        let mut last_exit_code = crate::types::SENTINEL_UNINITIALIZED;
        let mut attempts_made = 0u32;

        for attempt in 1..=actual_max_tries {
            attempts_made = attempt;
            debug!(
                "7-Zip attempt {attempt}/{actual_max_tries}: {}",
                Self::format_command_line(&config.exe_path, tokens)
            );

            let started = Instant::now();
            let outcome = self.runner.run(
                &config.exe_path,
                tokens,
                config.priority,
                affinity_mask,
                config.hide_output,
            );
            total_elapsed += started.elapsed();

            let exit_code = match outcome {
                Ok(outcome) => {
                    let accepted = is_accepted_exit_code(outcome.exit_code, config.treat_warnings_as_success);
                    log_streams(&outcome, config.hide_output, accepted);
                    outcome.exit_code
                }
                Err(e) => {
                    error!("failed to launch 7-Zip: {e}");
                    SENTINEL_LAUNCH_FAILED
                }
            };

            last_exit_code = exit_code;

            if is_accepted_exit_code(exit_code, config.treat_warnings_as_success) {
                return InvocationResult {
                    exit_code,
                    elapsed: total_elapsed,
                    attempts_made: attempt,
                };
            }

            if attempt < actual_max_tries && config.retry_delay_seconds > 0 {
                std::thread::sleep(Duration::from_secs(config.retry_delay_seconds));
            }
        }

        InvocationResult {
            exit_code: last_exit_code,
            elapsed: total_elapsed,
            attempts_made,
        }
    }
}

fn log_streams(outcome: &RunOutcome, hide_output: bool, accepted: bool) {
    if !outcome.stderr.is_empty() {
        for line in outcome.stderr.lines() {
            if accepted {
                warn!(target: "sevenzip::stderr", "{line}");
            } else {
                error!(target: "sevenzip::stderr", "{line}");
            }
        }
    }
    if hide_output {
        for line in outcome.stdout.lines() {
            debug!(target: "sevenzip::stdout", "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedRunner {
        exit_codes: RefCell<Vec<i32>>,
        calls: RefCell<u32>,
    }

    impl ScriptedRunner {
        fn new(exit_codes: Vec<i32>) -> Self {
            ScriptedRunner {
                exit_codes: RefCell::new(exit_codes),
                calls: RefCell::new(0),
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(
            &self,
            _exe_path: &str,
            _args: &[String],
            _priority: ProcessPriority,
            _affinity_mask: Option<u64>,
            _capture_stdout: bool,
        ) -> std::io::Result<RunOutcome> {
            let mut calls = self.calls.borrow_mut();
            let codes = self.exit_codes.borrow();
            let code = codes[(*calls as usize).min(codes.len() - 1)];
            *calls += 1;
            Ok(RunOutcome {
                exit_code: code,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn base_config() -> InvokerConfig {
        InvokerConfig {
            exe_path: "7z".to_string(),
            priority: ProcessPriority::Normal,
            cpu_affinity: None,
            hide_output: false,
            simulate: false,
            max_retries: 3,
            retry_delay_seconds: 0,
            enable_retries: true,
            treat_warnings_as_success: false,
        }
    }

    #[test]
    fn simulate_never_spawns_and_reports_success() {
        let invoker = SevenZipInvoker::with_runner(ScriptedRunner::new(vec![99]), 4);
        let mut config = base_config();
        config.simulate = true;
        let result = invoker.invoke(&config, &["a".to_string()]);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.attempts_made, 1);
        assert_eq!(*invoker.runner.calls.borrow(), 0);
    }

    #[test]
    fn retries_exactly_r_times_on_persistent_failure() {
        let invoker = SevenZipInvoker::with_runner(ScriptedRunner::new(vec![2, 2, 2]), 4);
        let mut config = base_config();
        config.max_retries = 3;
        let result = invoker.invoke(&config, &["a".to_string()]);
        assert_eq!(result.attempts_made, 3);
        assert_eq!(result.exit_code, 2);
        assert_eq!(*invoker.runner.calls.borrow(), 3);
    }

    #[test]
    fn succeeds_on_first_success_and_stops_retrying() {
        let invoker = SevenZipInvoker::with_runner(ScriptedRunner::new(vec![2, 0, 2]), 4);
        let config = base_config();
        let result = invoker.invoke(&config, &["a".to_string()]);
        assert_eq!(result.attempts_made, 2);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn warnings_as_success_accepts_exit_code_one_on_first_try() {
        let invoker = SevenZipInvoker::with_runner(ScriptedRunner::new(vec![1]), 4);
        let mut config = base_config();
        config.treat_warnings_as_success = true;
        let result = invoker.invoke(&config, &["a".to_string()]);
        assert_eq!(result.attempts_made, 1);
        assert!(result.is_success(true));
    }

    #[test]
    fn disabled_retries_means_exactly_one_attempt() {
        let invoker = SevenZipInvoker::with_runner(ScriptedRunner::new(vec![2, 0]), 4);
        let mut config = base_config();
        config.enable_retries = false;
        let result = invoker.invoke(&config, &["a".to_string()]);
        assert_eq!(result.attempts_made, 1);
        assert_eq!(result.exit_code, 2);
    }

    struct AlwaysFailsToLaunchRunner {
        calls: RefCell<u32>,
    }

    impl ProcessRunner for AlwaysFailsToLaunchRunner {
        fn run(
            &self,
            _exe_path: &str,
            _args: &[String],
            _priority: ProcessPriority,
            _affinity_mask: Option<u64>,
            _capture_stdout: bool,
        ) -> std::io::Result<RunOutcome> {
            *self.calls.borrow_mut() += 1;
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "7z.exe not found"))
        }
    }

    #[test]
    fn launch_failure_is_retried_like_any_other_failure() {
        let invoker = SevenZipInvoker::with_runner(AlwaysFailsToLaunchRunner { calls: RefCell::new(0) }, 4);
        let mut config = base_config();
        config.max_retries = 3;
        let result = invoker.invoke(&config, &["a".to_string()]);
        assert_eq!(result.attempts_made, 3);
        assert_eq!(result.exit_code, SENTINEL_LAUNCH_FAILED);
        assert_eq!(*invoker.runner.calls.borrow(), 3);
    }

    #[test]
    fn format_command_line_quotes_whitespace_tokens_only() {
        let line = SevenZipInvoker::<ChildProcessRunner>::format_command_line(
            "7z",
            &["a".to_string(), "C:\\My Data".to_string(), "-mx=9".to_string()],
        );
        assert_eq!(line, "7z a \"C:\\My Data\" -mx=9");
    }
}
