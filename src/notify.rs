//! Inactivity detection and outbound notifications.
//!
//! Delivery is behind the `Notifier` trait so the detector can be tested
//! without a mail server; the default implementation just logs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::{sleep, Duration};

use crate::cfdb::Db;
use crate::error::SyncError;
use crate::models::{InactivityStats, SyncReport};

const SECONDS_PER_DAY: i64 = 86_400;

/// Sends one message to one recipient. Returns whether delivery succeeded;
/// delivery failure is an outcome to count, not an error to propagate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool;
}

/// Receives the merged report of one scheduled firing.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &SyncReport) -> bool;
}

/// Notifier that records deliveries in the log instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> bool {
        log::info!("[send] to {recipient}: {subject}");
        log::debug!("[send] body: {body}");
        true
    }
}

/// Report sink that logs the report, addressed to the admin when one is
/// configured.
pub struct LogReportSink {
    admin_email: Option<String>,
}

impl LogReportSink {
    pub fn new(admin_email: Option<String>) -> Self {
        Self { admin_email }
    }
}

#[async_trait]
impl ReportSink for LogReportSink {
    async fn deliver(&self, report: &SyncReport) -> bool {
        let detail = serde_json::to_string(report).unwrap_or_else(|_| report.to_string());
        match &self.admin_email {
            Some(email) => log::info!("[deliver] report for {email}: {detail}"),
            None => log::info!("[deliver] report: {detail}"),
        }
        true
    }
}

/// Finds students whose last submission is older than the threshold and
/// sends each a reminder.
pub struct InactivityDetector {
    db: Db,
    notifier: Arc<dyn Notifier>,
    /// Breather between outbound messages, so a long inactive list does
    /// not burst the mail provider.
    pause: Duration,
}

impl InactivityDetector {
    pub fn new(db: Db, notifier: Arc<dyn Notifier>, pause: Duration) -> Self {
        Self { db, notifier, pause }
    }

    /// One detection pass. A student is inactive when their last stored
    /// submission is at least `threshold_days` old, or when they have
    /// never submitted at all. Students with notifications disabled are
    /// not considered.
    pub async fn detect_and_notify(&self, threshold_days: i64) -> Result<InactivityStats, SyncError> {
        let now = Utc::now().timestamp();
        let cutoff = now - threshold_days * SECONDS_PER_DAY;

        let inactive = self.db.query_inactive_students(cutoff)?;
        log::info!("[detect_and_notify] found {} inactive students", inactive.len());

        let mut stats = InactivityStats {
            total_inactive: inactive.len(),
            ..Default::default()
        };

        for student in inactive {
            // Bump the reminder counter first; the message quotes it.
            let bumped = student.with_reminder_bumped();
            if let Err(err) = self.db.update_profile(&bumped) {
                log::error!("[detect_and_notify] failed to update '{}': {err}", student.handle);
                stats.failed += 1;
                continue;
            }

            let days_idle = student.last_submission_time.map(|t| (now - t) / SECONDS_PER_DAY);
            let (subject, body) = compose_reminder(&bumped.handle, bumped.reminder_count, days_idle);

            if self.notifier.send(&bumped.email, &subject, &body).await {
                stats.sent += 1;
            } else {
                log::warn!("[detect_and_notify] delivery failed for '{}'", bumped.handle);
                stats.failed += 1;
            }

            sleep(self.pause).await;
        }

        log::info!(
            "[detect_and_notify] reminders sent: {}, failed: {}",
            stats.sent,
            stats.failed
        );
        Ok(stats)
    }
}

fn compose_reminder(handle: &str, reminder_count: i64, days_idle: Option<i64>) -> (String, String) {
    let subject = format!("Coding practice reminder #{reminder_count}");
    let idle = match days_idle {
        Some(days) => format!("{days} days"),
        None => String::from("a long time"),
    };
    let body = format!(
        "Hi {handle},\n\n\
         It has been {idle} since your last Codeforces submission. \
         Time to get back to problem solving!\n"
    );
    (subject, body)
}
