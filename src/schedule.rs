//! Scheduled execution of the daily sync.
//!
//! One controller owns the scheduler and at most one active job; applying
//! a new cron expression always removes the previous job first, so two
//! schedules can never fire concurrently.

use std::sync::Arc;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::cfdb::Db;
use crate::models::SyncReport;
use crate::notify::{InactivityDetector, ReportSink};
use crate::sync::BatchRunner;

/// Fires at 02:00 in the configured timezone when no schedule is stored.
pub const DEFAULT_CRON: &str = "0 2 * * *";

/// Settings key under which the active cron expression is persisted.
pub const SCHEDULE_KEY: &str = "dailySyncCronTime";

pub struct ScheduleController {
    sched: JobScheduler,
    db: Db,
    runner: Arc<BatchRunner>,
    detector: Arc<InactivityDetector>,
    sink: Arc<dyn ReportSink>,
    timezone: chrono_tz::Tz,
    threshold_days: i64,
    active: tokio::sync::Mutex<Option<Uuid>>,
}

impl ScheduleController {
    pub async fn new(
        db: Db,
        runner: Arc<BatchRunner>,
        detector: Arc<InactivityDetector>,
        sink: Arc<dyn ReportSink>,
        timezone: chrono_tz::Tz,
        threshold_days: i64,
    ) -> anyhow::Result<Self> {
        let sched = JobScheduler::new()
            .await
            .context("failed to create job scheduler")?;

        Ok(Self {
            sched,
            db,
            runner,
            detector,
            sink,
            timezone,
            threshold_days,
            active: tokio::sync::Mutex::new(None),
        })
    }

    /// Applies the persisted schedule (or the default) and starts firing.
    pub async fn start(&self) -> anyhow::Result<()> {
        let expression = self
            .db
            .get_setting(SCHEDULE_KEY)?
            .unwrap_or_else(|| String::from(DEFAULT_CRON));

        let active = self.apply_schedule(&expression).await?;
        self.sched.start().await.context("failed to start scheduler")?;
        log::info!("[start] daily sync scheduled at '{active}' ({})", self.timezone);
        Ok(())
    }

    /// Persists a requested schedule change and applies it. The stored
    /// value is the expression actually in effect, which may be the
    /// default if the requested one did not parse.
    pub async fn update_schedule(&self, expression: &str) -> anyhow::Result<String> {
        let active = self.apply_schedule(expression).await?;
        self.db.set_setting(SCHEDULE_KEY, &active, "daily sync schedule")?;
        Ok(active)
    }

    /// Replaces the active trigger with one firing at `expression` and
    /// returns the expression actually in effect. Persists nothing. An
    /// expression the cron parser rejects falls back to the default
    /// rather than leaving the system unscheduled.
    pub async fn apply_schedule(&self, expression: &str) -> anyhow::Result<String> {
        let (job, active_expression) = match self.build_job(expression) {
            Ok(job) => (job, expression.to_string()),
            Err(err) => {
                log::warn!(
                    "[apply_schedule] invalid cron expression '{expression}' ({err}); \
                     falling back to '{DEFAULT_CRON}'"
                );
                (
                    self.build_job(DEFAULT_CRON)
                        .context("default cron expression failed to parse")?,
                    String::from(DEFAULT_CRON),
                )
            }
        };

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            if let Err(err) = self.sched.remove(&previous).await {
                log::warn!("[apply_schedule] failed to remove previous job: {err}");
            }
        }

        let id = self
            .sched
            .add(job)
            .await
            .context("failed to add scheduled job")?;
        *active = Some(id);

        log::info!("[apply_schedule] schedule set to '{active_expression}'");
        Ok(active_expression)
    }

    fn build_job(&self, expression: &str) -> anyhow::Result<Job> {
        let runner = self.runner.clone();
        let detector = self.detector.clone();
        let sink = self.sink.clone();
        let threshold_days = self.threshold_days;

        let job = Job::new_async_tz(expression, self.timezone, move |_id, _scheduler| {
            let runner = runner.clone();
            let detector = detector.clone();
            let sink = sink.clone();
            Box::pin(async move {
                run_scheduled(runner, detector, sink, threshold_days).await;
            })
        })?;
        Ok(job)
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.sched.shutdown().await.context("failed to stop scheduler")?;
        Ok(())
    }
}

/// One scheduled firing: full batch sync, then inactivity pass, then the
/// merged report. Either half failing outright still reports the other.
async fn run_scheduled(
    runner: Arc<BatchRunner>,
    detector: Arc<InactivityDetector>,
    sink: Arc<dyn ReportSink>,
    threshold_days: i64,
) {
    log::info!("[run_scheduled] scheduled sync starting");

    let batch = match runner.synchronize_all().await {
        Ok(stats) => stats,
        Err(err) => {
            log::error!("[run_scheduled] batch sync failed: {err}");
            Default::default()
        }
    };

    let inactivity = match detector.detect_and_notify(threshold_days).await {
        Ok(stats) => stats,
        Err(err) => {
            log::error!("[run_scheduled] inactivity pass failed: {err}");
            Default::default()
        }
    };

    let report = SyncReport::merge(batch, inactivity);
    log::info!("[run_scheduled] {report}");
    if !sink.deliver(&report).await {
        log::warn!("[run_scheduled] report delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::cfapi::{CfContest, CfSubmission, CfUser, ContestStandings, JudgeClient, RatingChange};
    use crate::cfdb::test_db;
    use crate::error::SyncError;
    use crate::notify::Notifier;
    use crate::sync::SyncEngine;
    use tokio::time::Duration;

    struct NullJudge;

    #[async_trait]
    impl JudgeClient for NullJudge {
        async fn fetch_profile(&self, _handle: &str) -> Result<Option<CfUser>, SyncError> {
            Ok(None)
        }
        async fn fetch_rating_history(&self, _handle: &str) -> Result<Vec<RatingChange>, SyncError> {
            Ok(Vec::new())
        }
        async fn fetch_submissions(
            &self,
            _handle: &str,
            _from: u32,
            _count: u32,
        ) -> Result<Vec<CfSubmission>, SyncError> {
            Ok(Vec::new())
        }
        async fn fetch_contest_standings(
            &self,
            _contest_id: i64,
            _from: u32,
            _count: u32,
        ) -> Result<ContestStandings, SyncError> {
            Err(SyncError::Transient(String::from("not scripted")))
        }
        async fn list_contests(&self) -> Result<Vec<CfContest>, SyncError> {
            Ok(Vec::new())
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send(&self, _recipient: &str, _subject: &str, _body: &str) -> bool {
            true
        }
    }

    struct NullSink;

    #[async_trait]
    impl ReportSink for NullSink {
        async fn deliver(&self, _report: &SyncReport) -> bool {
            true
        }
    }

    async fn controller(db: &Db) -> ScheduleController {
        let engine = Arc::new(SyncEngine::new(db.clone(), Arc::new(NullJudge)));
        let runner = Arc::new(BatchRunner::new(engine, db.clone(), Duration::ZERO));
        let detector = Arc::new(InactivityDetector::new(
            db.clone(),
            Arc::new(NullNotifier),
            Duration::ZERO,
        ));
        ScheduleController::new(
            db.clone(),
            runner,
            detector,
            Arc::new(NullSink),
            chrono_tz::Asia::Kolkata,
            7,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn update_persists_the_active_expression() {
        let db = test_db();
        let ctrl = controller(&db).await;

        let active = ctrl.update_schedule("30 4 * * *").await.unwrap();
        assert_eq!(active, "30 4 * * *");
        assert_eq!(
            db.get_setting(SCHEDULE_KEY).unwrap().as_deref(),
            Some("30 4 * * *")
        );
        assert!(ctrl.active.lock().await.is_some());
    }

    #[tokio::test]
    async fn apply_alone_persists_nothing() {
        let db = test_db();
        let ctrl = controller(&db).await;

        ctrl.apply_schedule("30 4 * * *").await.unwrap();
        assert!(db.get_setting(SCHEDULE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_expression_falls_back_to_default() {
        let db = test_db();
        let ctrl = controller(&db).await;

        let active = ctrl.update_schedule("not a cron line").await.unwrap();
        assert_eq!(active, DEFAULT_CRON);
        assert_eq!(
            db.get_setting(SCHEDULE_KEY).unwrap().as_deref(),
            Some(DEFAULT_CRON)
        );
    }

    #[tokio::test]
    async fn reapplying_replaces_the_active_job() {
        let db = test_db();
        let ctrl = controller(&db).await;

        ctrl.update_schedule("0 2 * * *").await.unwrap();
        let first = (*ctrl.active.lock().await).unwrap();

        ctrl.update_schedule("0 3 * * *").await.unwrap();
        let second = (*ctrl.active.lock().await).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            db.get_setting(SCHEDULE_KEY).unwrap().as_deref(),
            Some("0 3 * * *")
        );
    }
}
