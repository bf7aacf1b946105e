use std::collections::HashMap;
use std::thread::sleep;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use tracing::{info, warn};

/// One job's schedule, parsed once at daemon startup.
struct ScheduledJob {
    job_name: String,
    schedule: Schedule,
}

/// Minimal blocking scheduler: wakes once a minute, and for every
/// configured job whose cron expression matches "now", runs it. No
/// `tokio_cron_scheduler` runtime — the engine runs entirely on this
/// thread, one job at a time, matching the rest of the process's
/// synchronous execution model.
pub struct PoshBackupScheduler {
    jobs: Vec<ScheduledJob>,
    poll_interval: Duration,
}

impl PoshBackupScheduler {
    pub fn new(poll_interval: Duration) -> Self {
        PoshBackupScheduler { jobs: Vec::new(), poll_interval }
    }

    pub fn add_job(&mut self, job_name: impl Into<String>, cron_expression: &str) -> Result<(), cron::error::Error> {
        let schedule = Schedule::from_str(cron_expression)?;
        let job_name = job_name.into();
        info!(job_name, cron_expression, "registered scheduled job");
        self.jobs.push(ScheduledJob { job_name, schedule });
        Ok(())
    }

    /// Runs forever, invoking `run_job` for every job due at each poll
    /// tick. Tracks the last tick a job fired on so a single due minute
    /// never fires twice if polling drifts slightly past it.
    pub fn run_forever<F: FnMut(&str)>(&self, mut run_job: F) -> ! {
        let mut last_fired: HashMap<String, chrono::DateTime<Utc>> = HashMap::new();

        loop {
            let now = Utc::now();
            for job in &self.jobs {
                let mut upcoming = job.schedule.after(&(now - chrono::Duration::minutes(1)));
                if let Some(next) = upcoming.next() {
                    if next <= now && last_fired.get(&job.job_name) != Some(&next) {
                        last_fired.insert(job.job_name.clone(), next);
                        info!(job_name = %job.job_name, "scheduled trigger fired");
                        run_job(&job.job_name);
                    }
                }
            }
            sleep(self.poll_interval);
        }
    }
}

pub fn validate_cron_expression(expression: &str) -> Result<(), String> {
    Schedule::from_str(expression).map(|_| ()).map_err(|e| {
        warn!(expression, error = %e, "invalid cron expression");
        e.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_expression_is_accepted() {
        assert!(validate_cron_expression("0 0 3 * * *").is_ok());
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(validate_cron_expression("not a cron expression").is_err());
    }

    #[test]
    fn add_job_rejects_invalid_expression() {
        let mut scheduler = PoshBackupScheduler::new(Duration::from_secs(1));
        assert!(scheduler.add_job("Docs", "garbage").is_err());
    }
}
