use tracing::{info, warn};

use crate::config::{JobStatusTrigger, PostRunAction, PostRunActionSpec};
use crate::report::JobStatus;

/// Decides whether a configured post-run action should fire for a given
/// job/set outcome. The action itself is never executed by this process
/// (§ Non-goals: PostRunAction is decided, logged, and left for an
/// operator or outer wrapper to carry out) — this only answers "would it
/// fire, and with what delay".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRunDecision {
    pub action: PostRunAction,
    pub delay_seconds: u64,
    pub force_action: bool,
}

pub fn decide(spec: &PostRunActionSpec, status: JobStatus) -> Option<PostRunDecision> {
    if !spec.enabled.unwrap_or(false) {
        return None;
    }

    let action = spec.action.unwrap_or(PostRunAction::None);
    if action == PostRunAction::None {
        return None;
    }

    let triggers = spec.trigger_on_status.clone().unwrap_or_else(|| vec![JobStatusTrigger::Any]);
    let matches = triggers.iter().any(|t| trigger_matches(*t, status));
    if !matches {
        info!(?status, ?action, "post-run action configured but status did not match trigger");
        return None;
    }

    let decision = PostRunDecision {
        action,
        delay_seconds: spec.delay_seconds.unwrap_or(0),
        force_action: spec.force_action.unwrap_or(false),
    };
    warn!(?decision, "post-run action decided; execution is the caller's responsibility");
    Some(decision)
}

fn trigger_matches(trigger: JobStatusTrigger, status: JobStatus) -> bool {
    match (trigger, status) {
        (JobStatusTrigger::Any, _) => true,
        (JobStatusTrigger::Success, JobStatus::Success) => true,
        (JobStatusTrigger::Warnings, JobStatus::Warnings) => true,
        (JobStatusTrigger::Failure, JobStatus::Failure) => true,
        (JobStatusTrigger::SimulatedComplete, JobStatus::SimulatedComplete) => true,
        _ => false,
    }
}
