//! Read-only client for the Codeforces JSON API.
//!
//! Everything the rest of the crate needs from the judge goes through the
//! [`JudgeClient`] trait so the sync engine can be exercised against a
//! scripted judge in tests.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

use crate::error::SyncError;

pub mod client;

pub use client::CfClient;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfUser {
    pub handle: String,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub max_rating: Option<i64>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingChange {
    pub contest_id: i64,
    pub contest_name: String,
    pub rank: i64,
    pub old_rating: i64,
    pub new_rating: i64,
    pub rating_update_time_seconds: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfProblem {
    #[serde(default)]
    pub contest_id: Option<i64>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CfMember {
    pub handle: String,
}

/// The submitting party. Ghost and team entries carry no usable member
/// handle, which is why [`CfAuthor::display_handle`] falls back.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfAuthor {
    #[serde(default)]
    pub members: Vec<CfMember>,
}

impl CfAuthor {
    pub fn display_handle(&self) -> String {
        self.members
            .first()
            .map(|m| m.handle.clone())
            .unwrap_or_else(|| String::from("Unknown"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfSubmission {
    pub id: i64,
    #[serde(default)]
    pub contest_id: Option<i64>,
    pub creation_time_seconds: i64,
    #[serde(default)]
    pub problem: CfProblem,
    #[serde(default)]
    pub author: CfAuthor,
    #[serde(default)]
    pub programming_language: String,
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default = "default_testset")]
    pub testset: String,
    #[serde(default)]
    pub passed_test_count: i64,
    #[serde(default)]
    pub time_consumed_millis: i64,
    #[serde(default)]
    pub memory_consumed_bytes: i64,
}

fn default_testset() -> String {
    String::from("TESTS")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CfContest {
    pub id: i64,
    pub name: String,
    pub phase: String,
    #[serde(default)]
    pub start_time_seconds: Option<i64>,
}

/// One contest's standings. Rows are passed through untyped; only the
/// request-handling layer (out of scope here) presents them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestStandings {
    pub contest: CfContest,
    #[serde(default)]
    pub rows: serde_json::Value,
}

/// Surface of the judge API the core consumes.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// `Ok(None)` means the judge reports the handle does not exist; that
    /// is a found-but-empty result, not an error.
    async fn fetch_profile(&self, handle: &str) -> Result<Option<CfUser>, SyncError>;

    /// Empty for users who never took part in a rated contest.
    async fn fetch_rating_history(&self, handle: &str) -> Result<Vec<RatingChange>, SyncError>;

    async fn fetch_submissions(
        &self,
        handle: &str,
        from: u32,
        count: u32,
    ) -> Result<Vec<CfSubmission>, SyncError>;

    async fn fetch_contest_standings(
        &self,
        contest_id: i64,
        from: u32,
        count: u32,
    ) -> Result<ContestStandings, SyncError>;

    /// Finished or not-yet-started contests, newest start time first.
    async fn list_contests(&self) -> Result<Vec<CfContest>, SyncError>;
}

/// Process-wide pacing for judge API calls.
///
/// Callers wait on [`RateLimiter::acquire`] before every call; the gap
/// between consecutive call *starts* is at least `floor`, even when calls
/// for different students interleave. The lock is held across the sleep so
/// waiters line up instead of all stamping the same start time.
pub struct RateLimiter {
    floor: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(floor: Duration) -> Self {
        Self {
            floor,
            last_start: Mutex::new(None),
        }
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub async fn acquire(&self) {
        let mut last = self.last_start.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.floor {
                sleep(self.floor - since).await;
            }
        }
        *last = Some(Instant::now());
    }
}
