use std::collections::HashSet;

use crate::cfdb::{Db, DbResult};
use crate::models::ContestResult;

/////*============== CONTEST QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for ContestResult {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            student_id: row.get("student_id")?,
            contest_id: row.get("contest_id")?,
            contest_name: row.get("contest_name")?,
            rank: row.get("rank")?,
            old_rating: row.get("old_rating")?,
            new_rating: row.get("new_rating")?,
            rating_change: row.get("rating_change")?,
            update_time_seconds: row.get("update_time_seconds")?,
        })
    }
}

impl Db {
    /// All contest ids already stored for a student.
    pub fn query_contest_ids(&self, student_id: i64) -> DbResult<HashSet<i64>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT contest_id FROM Contests WHERE student_id = :student_id")?;

        let ids = stmt
            .query_map(rusqlite::named_params! { ":student_id": student_id }, |row| {
                row.get::<_, i64>(0)
            })?
            .collect::<DbResult<HashSet<i64>>>()?;

        Ok(ids)
    }

    pub fn query_contests(&self, student_id: i64) -> DbResult<Vec<ContestResult>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM Contests
             WHERE student_id = :student_id
             ORDER BY update_time_seconds DESC",
        )?;

        let contests = stmt
            .query_map(rusqlite::named_params! { ":student_id": student_id }, |row| {
                ContestResult::try_from(row)
            })?
            .collect::<DbResult<Vec<ContestResult>>>()?;

        Ok(contests)
    }

    /// Inserts one contest participation.
    /// Returns `true` if it was newly added, `false` if the (student,
    /// contest) pair was already stored.
    pub fn insert_contest(&self, contest: &ContestResult) -> DbResult<bool> {
        log::trace!(
            "[insert_contest] contest {} for student {}",
            contest.contest_id,
            contest.student_id
        );

        let changed = self
            .conn()
            .prepare(
                "INSERT OR IGNORE INTO Contests
                    ( student_id,  contest_id,  contest_name,  rank,
                      old_rating,  new_rating,  rating_change,  update_time_seconds)
                 VALUES
                    (:student_id, :contest_id, :contest_name, :rank,
                     :old_rating, :new_rating, :rating_change, :update_time_seconds)",
            )?
            .execute(rusqlite::named_params! {
                ":student_id":          contest.student_id,
                ":contest_id":          contest.contest_id,
                ":contest_name":        contest.contest_name,
                ":rank":                contest.rank,
                ":old_rating":          contest.old_rating,
                ":new_rating":          contest.new_rating,
                ":rating_change":       contest.rating_change,
                ":update_time_seconds": contest.update_time_seconds,
            })?;

        Ok(changed > 0)
    }
}
