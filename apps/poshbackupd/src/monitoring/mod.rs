use thiserror::Error;

pub mod healthchecks;
pub mod mail;

use crate::report::JobReport;

#[derive(Debug, Error)]
pub enum MonitoringError {
    #[error("mail notification failed: {0}")]
    Mail(String),
    #[error("healthchecks notification failed: {0}")]
    Healthchecks(String),
}

/// A notification sink the engine calls at job start/success/failure.
/// Blocking, like the rest of the engine: each call happens on the
/// engine's own thread after the job it describes has already finished,
/// so there's no concurrency to manage here.
pub trait MonitoringService {
    fn start(&self, job_name: &str, hostname: &str) -> Result<(), MonitoringError>;
    fn success(&self, job_name: &str, hostname: &str, report: &JobReport) -> Result<(), MonitoringError>;
    fn failure(&self, job_name: &str, hostname: &str, report: &JobReport) -> Result<(), MonitoringError>;
}

/// Fans a notification out to every configured monitoring backend,
/// logging (not aborting on) an individual backend's failure so one dead
/// webhook never blocks the others.
pub struct MonitoringHub {
    services: Vec<Box<dyn MonitoringService>>,
}

impl MonitoringHub {
    pub fn new(services: Vec<Box<dyn MonitoringService>>) -> Self {
        MonitoringHub { services }
    }

    pub fn notify_start(&self, job_name: &str, hostname: &str) {
        for service in &self.services {
            if let Err(e) = service.start(job_name, hostname) {
                tracing::warn!(job_name, error = %e, "monitoring start notification failed");
            }
        }
    }

    pub fn notify_success(&self, job_name: &str, hostname: &str, report: &JobReport) {
        for service in &self.services {
            if let Err(e) = service.success(job_name, hostname, report) {
                tracing::warn!(job_name, error = %e, "monitoring success notification failed");
            }
        }
    }

    pub fn notify_failure(&self, job_name: &str, hostname: &str, report: &JobReport) {
        for service in &self.services {
            if let Err(e) = service.failure(job_name, hostname, report) {
                tracing::warn!(job_name, error = %e, "monitoring failure notification failed");
            }
        }
    }
}
