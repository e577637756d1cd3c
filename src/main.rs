use std::str::FromStr;
use std::sync::Arc;

use tokio::time::Duration;

use cftracker::cfapi::{CfClient, RateLimiter};
use cftracker::cfdb::Db;
use cftracker::config::AppConfig;
use cftracker::notify::{InactivityDetector, LogNotifier, LogReportSink};
use cftracker::schedule::ScheduleController;
use cftracker::sync::{BatchRunner, SyncEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env();

    let db = Db::open(&config.database_path)?;
    db.init_schema()?;

    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(config.rate_limit_ms)));
    let client = Arc::new(CfClient::new(limiter.clone()));

    let engine = Arc::new(SyncEngine::new(db.clone(), client));
    // Batch runs take an extra breather between students, on top of the
    // per-call rate limit.
    let runner = Arc::new(BatchRunner::new(engine, db.clone(), limiter.floor() * 2));

    let detector = Arc::new(InactivityDetector::new(
        db.clone(),
        Arc::new(LogNotifier),
        Duration::from_millis(config.notify_pause_ms),
    ));
    let sink = Arc::new(LogReportSink::new(config.admin_email.clone()));

    let timezone = chrono_tz::Tz::from_str(&config.timezone).unwrap_or_else(|_| {
        log::warn!(
            "unknown timezone '{}', falling back to Asia/Kolkata",
            config.timezone
        );
        chrono_tz::Asia::Kolkata
    });

    let mut controller = ScheduleController::new(
        db,
        runner,
        detector,
        sink,
        timezone,
        config.inactivity_threshold_days,
    )
    .await?;
    controller.start().await?;

    log::info!("cftracker is up; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    controller.shutdown().await?;
    log::info!("cftracker shut down");
    Ok(())
}
