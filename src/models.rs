use chrono::DateTime;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StudentProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub handle: String,

    pub current_rating: i64,
    pub max_rating: i64,
    pub rank: String,
    pub avatar: String,

    pub last_synced_at: Option<i64>,
    pub last_submission_time: Option<i64>,

    pub reminder_count: i64,
    pub notifications_enabled: bool,
}

/// Profile updates are whole-record values, never in-place field pokes.
/// A sync run builds the next profile from the loaded one and writes it
/// back in one shot, so an overlapping run can't observe a half-updated
/// record.
impl StudentProfile {
    /// New profile value carrying the ratings reported by the judge.
    pub fn with_remote_info(
        &self,
        rating: i64,
        max_rating: i64,
        rank: String,
        avatar: String,
    ) -> Self {
        Self {
            current_rating: rating,
            max_rating,
            rank,
            avatar,
            ..self.clone()
        }
    }

    /// New profile value with the latest-submission watermark and sync stamp.
    /// `last_submission` is None when the judge returned no submissions at
    /// all, which marks the student as never having submitted.
    pub fn with_last_submission(&self, last_submission: Option<i64>, now: i64) -> Self {
        Self {
            last_submission_time: last_submission,
            last_synced_at: Some(now),
            ..self.clone()
        }
    }

    /// New profile value for a handle the judge no longer knows about.
    pub fn with_notifications_disabled(&self, now: i64) -> Self {
        Self {
            notifications_enabled: false,
            last_synced_at: Some(now),
            ..self.clone()
        }
    }

    pub fn with_reminder_bumped(&self) -> Self {
        Self {
            reminder_count: self.reminder_count + 1,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for StudentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "**Student:** {} ({})\n\
             \tRating: {} (max {})\n\
             \tRank: {}\n\
             \tLast submission: {}",
            self.name,
            self.handle,
            self.current_rating,
            self.max_rating,
            self.rank,
            self.last_submission_time
                .and_then(|t| DateTime::from_timestamp(t, 0))
                .map(|t| t.to_string())
                .unwrap_or_else(|| String::from("never")),
        )
    }
}

/// One contest participation. Immutable once stored; a (student, contest)
/// pair is only ever inserted once.
#[derive(Debug, Clone)]
pub struct ContestResult {
    pub student_id: i64,
    pub contest_id: i64,
    pub contest_name: String,
    pub rank: i64,
    pub old_rating: i64,
    pub new_rating: i64,
    pub rating_change: i64,
    pub update_time_seconds: i64,
}

/// One judged submission. Immutable once stored; submission ids are
/// assigned by the judge and globally unique.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub submission_id: i64,
    pub student_id: i64,
    pub contest_id: i64,

    pub problem_name: Option<String>,
    pub problem_index: Option<String>,
    pub problem_rating: Option<i64>,
    pub tags: Vec<String>,

    pub author: String,
    pub language: String,
    pub verdict: Option<String>,
    pub testset: String,
    pub passed_test_count: i64,
    pub time_consumed_millis: i64,
    pub memory_consumed_bytes: i64,
    pub creation_time_seconds: i64,
}

/// Earliest accepted submission per problem name. Written once and never
/// overwritten, even if a later submission for the same name shows up.
#[derive(Debug, Clone)]
pub struct SolvedProblem {
    pub student_id: i64,
    pub problem_name: String,
    pub problem_rating: i64,
    pub tags: Vec<String>,
    pub solved_at: i64,
    pub language: String,
    pub verdict: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncFailure {
    pub student_id: i64,
    pub handle: String,
    pub message: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchStats {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<SyncFailure>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct InactivityStats {
    pub sent: usize,
    pub failed: usize,
    pub total_inactive: usize,
}

/// Merged statistics of one scheduled firing, handed to the report sink.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<SyncFailure>,
    pub notices_sent: usize,
    pub notices_failed: usize,
    pub total_inactive: usize,
}

impl SyncReport {
    pub fn merge(batch: BatchStats, inactivity: InactivityStats) -> Self {
        Self {
            success_count: batch.success_count,
            error_count: batch.error_count,
            errors: batch.errors,
            notices_sent: inactivity.sent,
            notices_failed: inactivity.failed,
            total_inactive: inactivity.total_inactive,
        }
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "synced {} ok / {} failed, {} inactive ({} notified, {} failed)",
            self.success_count,
            self.error_count,
            self.total_inactive,
            self.notices_sent,
            self.notices_failed,
        )
    }
}
