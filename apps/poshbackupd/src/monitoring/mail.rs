use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{MonitoringError, MonitoringService};
use crate::report::JobReport;

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_from: String,
    pub smtp_to: Vec<String>,
}

/// Sends plain-text notification emails over blocking SMTP. Same shape
/// as the teacher's async mail service, minus the `Tokio1Executor`
/// plumbing: `SmtpTransport` here blocks the calling thread, which is
/// exactly what a synchronous engine wants.
pub struct MailService {
    from: String,
    to: String,
    mailer: SmtpTransport,
}

impl MailService {
    pub fn from_config(config: MailConfig) -> Result<Self, MonitoringError> {
        let mut builder = SmtpTransport::relay(&config.smtp_server)
            .map_err(|e| MonitoringError::Mail(e.to_string()))?
            .port(config.smtp_port);

        if !config.smtp_user.is_empty() {
            builder = builder.credentials(Credentials::new(config.smtp_user, config.smtp_password));
        }

        Ok(MailService {
            from: config.smtp_from,
            to: config.smtp_to.join(", "),
            mailer: builder.build(),
        })
    }

    fn send(&self, subject: &str, body: String) -> Result<(), MonitoringError> {
        let email = Message::builder()
            .from(self.from.parse().map_err(|e: lettre::address::AddressError| MonitoringError::Mail(e.to_string()))?)
            .to(self.to.parse().map_err(|e: lettre::address::AddressError| MonitoringError::Mail(e.to_string()))?)
            .subject(subject)
            .body(body)
            .map_err(|e| MonitoringError::Mail(e.to_string()))?;

        self.mailer.send(&email).map_err(|e| MonitoringError::Mail(e.to_string()))?;
        Ok(())
    }
}

impl MonitoringService for MailService {
    fn start(&self, _job_name: &str, _hostname: &str) -> Result<(), MonitoringError> {
        Ok(())
    }

    fn success(&self, job_name: &str, hostname: &str, report: &JobReport) -> Result<(), MonitoringError> {
        let body = format!(
            "Backup job '{job_name}' on host '{hostname}' succeeded.\n\n{}",
            crate::report::ReportRenderer::render(report, "text").unwrap_or_default()
        );
        self.send(&format!("Success: Backup job '{job_name}' on host '{hostname}'"), body)
    }

    fn failure(&self, job_name: &str, hostname: &str, report: &JobReport) -> Result<(), MonitoringError> {
        let body = format!(
            "Backup job '{job_name}' on host '{hostname}' failed.\n\n{}",
            crate::report::ReportRenderer::render(report, "text").unwrap_or_default()
        );
        self.send(&format!("Failure: Backup job '{job_name}' on host '{hostname}'"), body)
    }
}
