use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Yes,
    No,
    /// A confirmation was requested but `--confirm` was not passed
    /// interactively (e.g. non-interactive/daemon mode); treated as a
    /// deliberate answer, not a missing one, per the engine's sentinel
    /// `-1000` exit code for a declined confirmation.
    Assumed,
}

/// Asks the operator to confirm a destructive or unusual action (e.g.
/// running against a job whose source path no longer exists when policy
/// is `WarnAndContinue`). When not running attached to a terminal the
/// answer is `Assumed` rather than blocking forever.
pub fn confirm(prompt: &str, interactive: bool) -> ConfirmOutcome {
    if !interactive {
        return ConfirmOutcome::Assumed;
    }

    print!("{prompt} [y/N]: ");
    let _ = io::stdout().flush();

    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return ConfirmOutcome::Assumed;
    }

    match line.trim().to_lowercase().as_str() {
        "y" | "yes" => ConfirmOutcome::Yes,
        _ => ConfirmOutcome::No,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_is_always_assumed() {
        assert_eq!(confirm("proceed?", false), ConfirmOutcome::Assumed);
    }
}
