use crate::invoker::{InvokerConfig, ProcessRunner, SevenZipInvoker};
use crate::types::InvocationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    PassedWithWarnings,
    Failed,
}

/// Runs `7z t <archive>` with the same priority/affinity/retry discipline
/// as archive creation, but never simulates (§4.4: "Testing never
/// simulates").
pub fn test_archive<R: ProcessRunner>(
    invoker: &SevenZipInvoker<R>,
    config: &InvokerConfig,
    archive_path: &str,
    password_file: Option<&str>,
) -> (TestOutcome, InvocationResult) {
    let mut forced = config.clone();
    forced.simulate = false;

    let mut tokens = vec!["t".to_string(), archive_path.to_string()];
    if let Some(path) = password_file {
        tokens.push(format!("-spf\"{path}\""));
    }

    let result = invoker.invoke(&forced, &tokens);

    let outcome = if result.exit_code == 0 {
        TestOutcome::Passed
    } else if result.exit_code == 1 && config.treat_warnings_as_success {
        TestOutcome::PassedWithWarnings
    } else {
        TestOutcome::Failed
    };

    (outcome, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::RunOutcome;
    use crate::types::ProcessPriority;
    use std::cell::RefCell;

    struct FixedRunner {
        exit_code: i32,
        simulated: RefCell<bool>,
        calls: RefCell<u32>,
    }

    impl ProcessRunner for FixedRunner {
        fn run(
            &self,
            _exe_path: &str,
            _args: &[String],
            _priority: ProcessPriority,
            _affinity_mask: Option<u64>,
            _capture_stdout: bool,
        ) -> std::io::Result<RunOutcome> {
            *self.simulated.borrow_mut() = false;
            *self.calls.borrow_mut() += 1;
            Ok(RunOutcome {
                exit_code: self.exit_code,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn config(simulate: bool, treat_warnings_as_success: bool) -> InvokerConfig {
        InvokerConfig {
            exe_path: "7z".to_string(),
            priority: ProcessPriority::Normal,
            cpu_affinity: None,
            hide_output: false,
            simulate,
            max_retries: 1,
            retry_delay_seconds: 0,
            enable_retries: false,
            treat_warnings_as_success,
        }
    }

    #[test]
    fn successful_test_returns_passed() {
        let invoker = SevenZipInvoker::with_runner(
            FixedRunner {
                exit_code: 0,
                simulated: RefCell::new(false),
                calls: RefCell::new(0),
            },
            4,
        );
        let (outcome, result) = test_archive(&invoker, &config(false, false), "archive.7z", None);
        assert_eq!(outcome, TestOutcome::Passed);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn wrong_password_failure_returns_failed() {
        let invoker = SevenZipInvoker::with_runner(
            FixedRunner {
                exit_code: 2,
                simulated: RefCell::new(false),
                calls: RefCell::new(0),
            },
            4,
        );
        let (outcome, _) = test_archive(&invoker, &config(false, false), "archive.7z", Some("pw.txt"));
        assert_eq!(outcome, TestOutcome::Failed);
    }

    #[test]
    fn testing_ignores_simulate_flag_and_actually_spawns() {
        let invoker = SevenZipInvoker::with_runner(
            FixedRunner {
                exit_code: 0,
                simulated: RefCell::new(false),
                calls: RefCell::new(0),
            },
            4,
        );
        let (outcome, _) = test_archive(&invoker, &config(true, false), "archive.7z", None);
        assert_eq!(outcome, TestOutcome::Passed);
        assert_eq!(*invoker.runner.calls.borrow(), 1);
    }
}
