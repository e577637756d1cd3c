use std::collections::HashSet;

use crate::cfdb::{Db, DbResult};
use crate::models::SolvedProblem;

/////*============== SOLVED PROBLEM QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for SolvedProblem {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let tags: String = row.get("tags")?;

        Ok(Self {
            student_id: row.get("student_id")?,
            problem_name: row.get("problem_name")?,
            problem_rating: row.get("problem_rating")?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            solved_at: row.get("solved_at")?,
            language: row.get("language")?,
            verdict: row.get("verdict")?,
        })
    }
}

impl Db {
    /// Names of every problem the student has already solved.
    pub fn query_solved_names(&self, student_id: i64) -> DbResult<HashSet<String>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT problem_name FROM SolvedProblems WHERE student_id = :student_id")?;

        let names = stmt
            .query_map(rusqlite::named_params! { ":student_id": student_id }, |row| {
                row.get::<_, String>(0)
            })?
            .collect::<DbResult<HashSet<String>>>()?;

        Ok(names)
    }

    pub fn query_solved(&self, student_id: i64) -> DbResult<Vec<SolvedProblem>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT * FROM SolvedProblems
             WHERE student_id = :student_id
             ORDER BY solved_at DESC",
        )?;

        let solved = stmt
            .query_map(rusqlite::named_params! { ":student_id": student_id }, |row| {
                SolvedProblem::try_from(row)
            })?
            .collect::<DbResult<Vec<SolvedProblem>>>()?;

        Ok(solved)
    }

    /// Records a first acceptance. Returns `true` if it was newly added,
    /// `false` if the problem was already marked solved for the student;
    /// an existing row is never overwritten.
    pub fn insert_solved(&self, solved: &SolvedProblem) -> DbResult<bool> {
        log::trace!(
            "[insert_solved] '{}' for student {}",
            solved.problem_name,
            solved.student_id
        );

        let tags = serde_json::to_string(&solved.tags).unwrap_or_else(|_| String::from("[]"));
        let changed = self
            .conn()
            .prepare(
                "INSERT OR IGNORE INTO SolvedProblems
                    ( student_id,  problem_name,  problem_rating,  tags,
                      solved_at,  language,  verdict)
                 VALUES
                    (:student_id, :problem_name, :problem_rating, :tags,
                     :solved_at, :language, :verdict)",
            )?
            .execute(rusqlite::named_params! {
                ":student_id":     solved.student_id,
                ":problem_name":   solved.problem_name,
                ":problem_rating": solved.problem_rating,
                ":tags":           tags,
                ":solved_at":      solved.solved_at,
                ":language":       solved.language,
                ":verdict":        solved.verdict,
            })?;

        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfdb::test_db;

    fn solved(student_id: i64, name: &str, at: i64) -> SolvedProblem {
        SolvedProblem {
            student_id,
            problem_name: String::from(name),
            problem_rating: 1200,
            tags: vec![String::from("dp")],
            solved_at: at,
            language: String::from("Rust"),
            verdict: String::from("OK"),
        }
    }

    #[test]
    fn first_acceptance_is_never_overwritten() {
        let db = test_db();
        let id = db.insert_student("A", "a@x.com", "a").unwrap();

        assert!(db.insert_solved(&solved(id, "Two Sum", 100)).unwrap());
        // A later acceptance for the same name is ignored.
        assert!(!db.insert_solved(&solved(id, "Two Sum", 50)).unwrap());

        let stored = db.query_solved(id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].solved_at, 100);
        assert_eq!(db.query_solved_names(id).unwrap(), HashSet::from([String::from("Two Sum")]));
    }
}
