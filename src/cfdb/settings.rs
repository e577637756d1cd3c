use crate::cfdb::{Db, DbResult};

/////*============== SETTINGS QUERIES ==============*/
impl Db {
    pub fn get_setting(&self, key: &str) -> DbResult<Option<String>> {
        self.conn()
            .prepare("SELECT value FROM Settings WHERE key = :key")?
            .query(rusqlite::named_params! { ":key": key })?
            .next()?
            .map(|row| row.get("value"))
            .transpose()
    }

    /// Creates or replaces a setting.
    pub fn set_setting(&self, key: &str, value: &str, description: &str) -> DbResult<()> {
        log::trace!("[set_setting] {key} = {value:?}");
        self.conn()
            .prepare(
                "INSERT INTO Settings (key, value, description)
                 VALUES (:key, :value, :description)
                 ON CONFLICT (key) DO UPDATE SET
                    value = excluded.value,
                    description = excluded.description",
            )?
            .execute(rusqlite::named_params! {
                ":key": key,
                ":value": value,
                ":description": description,
            })?;

        Ok(())
    }
}
