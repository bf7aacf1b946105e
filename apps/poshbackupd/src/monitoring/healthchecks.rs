use reqwest::blocking::Client;

use super::{MonitoringError, MonitoringService};
use crate::report::JobReport;

#[derive(Debug, Clone)]
pub struct HealthchecksConfig {
    pub ping_base_url: String,
}

/// Pings a healthchecks.io-compatible endpoint with `/start`, `/fail`,
/// or a bare success ping, slugged by job name and hostname. Blocking
/// `reqwest::blocking::Client` in place of the teacher's
/// `reqwest-middleware`/retry-policy stack, since the engine retries at
/// the 7-Zip invocation level, not the notification level.
pub struct HealthchecksService {
    client: Client,
    config: HealthchecksConfig,
}

impl HealthchecksService {
    pub fn from_config(config: HealthchecksConfig) -> Self {
        HealthchecksService { client: Client::new(), config }
    }

    fn slug(&self, job_name: &str, hostname: &str) -> String {
        format!("{job_name}_{hostname}")
    }

    fn ping(&self, url: String) -> Result<(), MonitoringError> {
        let response = self
            .client
            .post(url)
            .send()
            .map_err(|e| MonitoringError::Healthchecks(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(MonitoringError::Healthchecks(format!("ping returned status {}", response.status())))
        }
    }
}

impl MonitoringService for HealthchecksService {
    fn start(&self, job_name: &str, hostname: &str) -> Result<(), MonitoringError> {
        let url = format!("{}/{}/start", self.config.ping_base_url, self.slug(job_name, hostname));
        self.ping(url)
    }

    fn success(&self, job_name: &str, hostname: &str, _report: &JobReport) -> Result<(), MonitoringError> {
        let url = format!("{}/{}", self.config.ping_base_url, self.slug(job_name, hostname));
        self.ping(url)
    }

    fn failure(&self, job_name: &str, hostname: &str, _report: &JobReport) -> Result<(), MonitoringError> {
        let url = format!("{}/{}/fail", self.config.ping_base_url, self.slug(job_name, hostname));
        self.ping(url)
    }
}
