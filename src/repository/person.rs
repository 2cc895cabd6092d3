//! People storage: merge-don't-clobber upserts keyed by profile URL.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use super::{parse_datetime, to_option, Result};
use crate::models::{PersonRecord, ProfileData, UpsertCounts};

/// SQLite-backed store for extracted people.
pub struct PersonRepository {
    db_path: PathBuf,
}

impl PersonRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            -- One row per person, keyed by their canonical profile URL
            CREATE TABLE IF NOT EXISTS people (
                id TEXT PRIMARY KEY,
                profile_url TEXT NOT NULL UNIQUE,
                full_name TEXT,
                title TEXT,
                company_name TEXT,
                location TEXT,
                email TEXT,
                phone TEXT,
                connection_degree TEXT,
                profile_data TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_people_company
                ON people(company_name);
        "#,
        )?;
        Ok(())
    }

    /// Persist one extracted batch in a single transaction. Existing rows
    /// are merged field by field (a blank incoming value never overwrites a
    /// stored one), rows without a profile URL are skipped, and an identical
    /// re-run counts everything as skipped.
    pub fn upsert_batch(&self, profiles: &[ProfileData]) -> Result<UpsertCounts> {
        let conn = self.connect()?;
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<UpsertCounts> = (|| {
            let mut counts = UpsertCounts::default();
            for profile in profiles {
                let profile_url = match profile.profile_url() {
                    Some(url) => url,
                    None => {
                        counts.skipped += 1;
                        continue;
                    }
                };
                match find_in_conn(&conn, &profile_url)? {
                    Some(mut existing) => {
                        if existing.merge(profile) {
                            update_in_conn(&conn, &existing)?;
                            counts.updated += 1;
                        } else {
                            counts.skipped += 1;
                        }
                    }
                    None => {
                        // profile_url() returned Some above, so this cannot skip
                        if let Some(record) = PersonRecord::from_profile(profile) {
                            insert_in_conn(&conn, &record)?;
                            counts.inserted += 1;
                        }
                    }
                }
            }
            Ok(counts)
        })();

        if result.is_ok() {
            conn.execute("COMMIT", [])?;
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }
        result
    }

    pub fn find_by_profile_url(&self, profile_url: &str) -> Result<Option<PersonRecord>> {
        let conn = self.connect()?;
        find_in_conn(&conn, profile_url)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.connect()?;
        let count = conn.query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn find_in_conn(conn: &Connection, profile_url: &str) -> Result<Option<PersonRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM people WHERE profile_url = ?")?;
    to_option(stmt.query_row(params![profile_url], row_to_person))
}

fn insert_in_conn(conn: &Connection, record: &PersonRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO people
            (id, profile_url, full_name, title, company_name, location,
             email, phone, connection_degree, profile_data, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            record.id,
            record.profile_url,
            record.full_name,
            record.title,
            record.company_name,
            record.location,
            record.email,
            record.phone,
            record.connection_degree,
            serde_json::to_string(&record.profile_data)?,
            record.created_at.to_rfc3339(),
            record.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn update_in_conn(conn: &Connection, record: &PersonRecord) -> Result<()> {
    conn.execute(
        r#"
        UPDATE people
        SET full_name = ?, title = ?, company_name = ?, location = ?,
            email = ?, phone = ?, connection_degree = ?, profile_data = ?,
            updated_at = ?
        WHERE profile_url = ?
        "#,
        params![
            record.full_name,
            record.title,
            record.company_name,
            record.location,
            record.email,
            record.phone,
            record.connection_degree,
            serde_json::to_string(&record.profile_data)?,
            record.updated_at.to_rfc3339(),
            record.profile_url,
        ],
    )?;
    Ok(())
}

/// Parse a database row into a PersonRecord.
fn row_to_person(row: &rusqlite::Row) -> rusqlite::Result<PersonRecord> {
    let profile_data: String = row.get("profile_data")?;
    Ok(PersonRecord {
        id: row.get("id")?,
        profile_url: row.get("profile_url")?,
        full_name: row.get("full_name")?,
        title: row.get("title")?,
        company_name: row.get("company_name")?,
        location: row.get("location")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        connection_degree: row.get("connection_degree")?,
        profile_data: serde_json::from_str(&profile_data)
            .unwrap_or_else(|_| serde_json::json!({})),
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        updated_at: parse_datetime(&row.get::<_, String>("updated_at")?),
    })
}
