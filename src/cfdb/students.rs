use crate::cfdb::{Db, DbResult};
use crate::models::StudentProfile;

/////*============== STUDENT QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for StudentProfile {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            handle: row.get("handle")?,
            current_rating: row.get("current_rating")?,
            max_rating: row.get("max_rating")?,
            rank: row.get("rank")?,
            avatar: row.get("avatar")?,
            last_synced_at: row.get("last_synced_at")?,
            last_submission_time: row.get("last_submission_time")?,
            reminder_count: row.get("reminder_count")?,
            notifications_enabled: row.get("notifications_enabled")?,
        })
    }
}

impl Db {
    /// Returns the student with the given id, if they exist.
    pub fn query_student(&self, student_id: i64) -> DbResult<Option<StudentProfile>> {
        self.conn()
            .prepare("SELECT * FROM Students WHERE id = :id")?
            .query(rusqlite::named_params! { ":id": student_id })?
            .next()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Gathers every registered student, in registration order.
    pub fn query_all_students(&self) -> DbResult<Vec<StudentProfile>> {
        log::trace!("[query_all_students] listing students");
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT * FROM Students ORDER BY id")?;

        let students = stmt
            .query_map([], |row| StudentProfile::try_from(row))?
            .collect::<DbResult<Vec<StudentProfile>>>()?;

        Ok(students)
    }

    /// Students with notifications enabled whose last submission is at or
    /// before `cutoff` (epoch seconds), or who never submitted at all.
    pub fn query_inactive_students(&self, cutoff: i64) -> DbResult<Vec<StudentProfile>> {
        log::trace!("[query_inactive_students] cutoff = {cutoff}");
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT *
             FROM Students
             WHERE notifications_enabled = 1
               AND (last_submission_time IS NULL OR last_submission_time <= :cutoff)
             ORDER BY id",
        )?;

        let students = stmt
            .query_map(rusqlite::named_params! { ":cutoff": cutoff }, |row| {
                StudentProfile::try_from(row)
            })?
            .collect::<DbResult<Vec<StudentProfile>>>()?;

        Ok(students)
    }

    /// Registers a student (the registration flow lives outside the core;
    /// the core only ever updates existing rows). Returns the new row id.
    pub fn insert_student(&self, name: &str, email: &str, handle: &str) -> DbResult<i64> {
        log::trace!("[insert_student] inserting '{handle}'");
        let conn = self.conn();
        conn.prepare(
            "INSERT INTO Students (name, email, handle)
             VALUES (:name, :email, :handle)",
        )?
        .execute(rusqlite::named_params! {
            ":name": name,
            ":email": email,
            ":handle": handle,
        })?;

        Ok(conn.last_insert_rowid())
    }

    /// Writes a full profile value over the stored row. All mutable fields
    /// are replaced in one statement; there is no partial merge.
    pub fn update_profile(&self, profile: &StudentProfile) -> DbResult<()> {
        log::trace!("[update_profile] updating '{}'", profile.handle);
        self.conn()
            .prepare(
                "UPDATE Students SET
                    current_rating        = :current_rating,
                    max_rating            = :max_rating,
                    rank                  = :rank,
                    avatar                = :avatar,
                    last_synced_at        = :last_synced_at,
                    last_submission_time  = :last_submission_time,
                    reminder_count        = :reminder_count,
                    notifications_enabled = :notifications_enabled
                 WHERE id = :id",
            )?
            .execute(rusqlite::named_params! {
                ":id":                    profile.id,
                ":current_rating":        profile.current_rating,
                ":max_rating":            profile.max_rating,
                ":rank":                  profile.rank,
                ":avatar":                profile.avatar,
                ":last_synced_at":        profile.last_synced_at,
                ":last_submission_time":  profile.last_submission_time,
                ":reminder_count":        profile.reminder_count,
                ":notifications_enabled": profile.notifications_enabled,
            })
            .inspect_err(|err| {
                log::error!("[update_profile] could not update '{}': {err}", profile.handle)
            })?;

        Ok(())
    }
}
