use std::collections::HashSet;

use crate::cfdb::{Db, DbResult};
use crate::models::SubmissionRecord;

/// Upper bound on rows per insert transaction. Full-history syncs can
/// carry tens of thousands of submissions; inserting in bounded batches
/// keeps single operations from ballooning.
pub const INSERT_BATCH_SIZE: usize = 1000;

/////*============== SUBMISSION QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for SubmissionRecord {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let tags: String = row.get("tags")?;

        Ok(Self {
            submission_id: row.get("submission_id")?,
            student_id: row.get("student_id")?,
            contest_id: row.get("contest_id")?,
            problem_name: row.get("problem_name")?,
            problem_index: row.get("problem_index")?,
            problem_rating: row.get("problem_rating")?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            author: row.get("author")?,
            language: row.get("language")?,
            verdict: row.get("verdict")?,
            testset: row.get("testset")?,
            passed_test_count: row.get("passed_test_count")?,
            time_consumed_millis: row.get("time_consumed_millis")?,
            memory_consumed_bytes: row.get("memory_consumed_bytes")?,
            creation_time_seconds: row.get("creation_time_seconds")?,
        })
    }
}

impl Db {
    /// All submission ids already stored for a student.
    pub fn query_submission_ids(&self, student_id: i64) -> DbResult<HashSet<i64>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT submission_id FROM Submissions WHERE student_id = :student_id")?;

        let ids = stmt
            .query_map(rusqlite::named_params! { ":student_id": student_id }, |row| {
                row.get::<_, i64>(0)
            })?
            .collect::<DbResult<HashSet<i64>>>()?;

        Ok(ids)
    }

    pub fn query_submissions(&self, student_id: i64) -> DbResult<Vec<SubmissionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM Submissions
             WHERE student_id = :student_id
             ORDER BY creation_time_seconds DESC",
        )?;

        let submissions = stmt
            .query_map(rusqlite::named_params! { ":student_id": student_id }, |row| {
                SubmissionRecord::try_from(row)
            })?
            .collect::<DbResult<Vec<SubmissionRecord>>>()?;

        Ok(submissions)
    }

    /// Inserts submissions in bounded batches, one transaction per batch.
    /// Rows whose submission id is already stored are skipped by the
    /// store's primary key, so a concurrent sync of the same student can
    /// never duplicate a row. Returns the number of rows actually added.
    pub fn insert_submissions(&self, records: &[SubmissionRecord]) -> DbResult<usize> {
        let mut conn = self.conn();
        let mut inserted = 0;

        for batch in records.chunks(INSERT_BATCH_SIZE) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO Submissions
                        ( submission_id,  student_id,  contest_id,
                          problem_name,  problem_index,  problem_rating,  tags,
                          author,  language,  verdict,  testset,
                          passed_test_count,  time_consumed_millis,
                          memory_consumed_bytes,  creation_time_seconds)
                     VALUES
                        (:submission_id, :student_id, :contest_id,
                         :problem_name, :problem_index, :problem_rating, :tags,
                         :author, :language, :verdict, :testset,
                         :passed_test_count, :time_consumed_millis,
                         :memory_consumed_bytes, :creation_time_seconds)",
                )?;

                for record in batch {
                    let tags = serde_json::to_string(&record.tags)
                        .unwrap_or_else(|_| String::from("[]"));
                    inserted += stmt.execute(rusqlite::named_params! {
                        ":submission_id":         record.submission_id,
                        ":student_id":            record.student_id,
                        ":contest_id":            record.contest_id,
                        ":problem_name":          record.problem_name,
                        ":problem_index":         record.problem_index,
                        ":problem_rating":        record.problem_rating,
                        ":tags":                  tags,
                        ":author":                record.author,
                        ":language":              record.language,
                        ":verdict":               record.verdict,
                        ":testset":               record.testset,
                        ":passed_test_count":     record.passed_test_count,
                        ":time_consumed_millis":  record.time_consumed_millis,
                        ":memory_consumed_bytes": record.memory_consumed_bytes,
                        ":creation_time_seconds": record.creation_time_seconds,
                    })?;
                }
            }
            tx.commit()?;
        }

        Ok(inserted)
    }
}
