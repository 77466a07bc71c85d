use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

const USER_COLUMNS: &str = "id, external_id, display_name, email, created_at, updated_at";

const PROJECT_COLUMNS: &str = "id, owner_id, name, description, visibility, snapshot_count, \
     file_count, total_size_bytes, last_snapshot_at, created_at, updated_at";

const SNAPSHOT_COLUMNS: &str = "id, project_id, user_id, title, description, timestamp, \
     file_count, external_id, created_at";

const BRANCH_COLUMNS: &str = "project_id, name, head_snapshot_id, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database, mostly useful for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        visibility: Visibility::parse(&row.get::<_, String>(4)?).unwrap_or_default(),
        stats: ProjectStats {
            snapshot_count: row.get(5)?,
            file_count: row.get(6)?,
            total_size_bytes: row.get(7)?,
            last_snapshot_at: row.get(8)?,
        },
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        updated_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        project_id: row.get(1)?,
        user_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        timestamp: row.get(5)?,
        file_count: row.get(6)?,
        external_id: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<SnapshotFile> {
    Ok(SnapshotFile {
        path: row.get(0)?,
        hash: row.get(1)?,
        size: row.get(2)?,
        mode: row.get(3)?,
    })
}

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        project_id: row.get(0)?,
        name: row.get(1)?,
        head_snapshot_id: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        project_id: row.get(0)?,
        name: row.get(1)?,
        snapshot_id: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

// Insertion order (rowid) breaks timestamp ties so "latest" is deterministic.
fn latest_snapshot_id_in(conn: &Connection, project_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT id FROM snapshots WHERE project_id = ?1
         ORDER BY timestamp DESC, rowid DESC LIMIT 1",
        params![project_id],
        |row| row.get(0),
    )
    .optional()
}

fn refresh_project_stats(conn: &Connection, project_id: &str) -> rusqlite::Result<()> {
    let latest = latest_snapshot_id_in(conn, project_id)?;

    let (file_count, total_size): (i64, i64) = match &latest {
        Some(snapshot_id) => conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM snapshot_files WHERE snapshot_id = ?1",
            params![snapshot_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?,
        None => (0, 0),
    };

    conn.execute(
        "UPDATE projects SET
             snapshot_count = (SELECT COUNT(*) FROM snapshots WHERE project_id = ?1),
             file_count = ?2,
             total_size_bytes = ?3,
             last_snapshot_at = (SELECT MAX(timestamp) FROM snapshots WHERE project_id = ?1),
             updated_at = ?4
         WHERE id = ?1",
        params![project_id, file_count, total_size, format_datetime(&Utc::now())],
    )?;
    Ok(())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, external_id, display_name, email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.external_id,
                user.display_name,
                user.email,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::conflict(format!(
                "User with external id '{}' already exists",
                user.external_id
            ))),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
            params![external_id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    // Project operations

    fn create_project(&self, project: &Project) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO projects (id, owner_id, name, description, visibility, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project.id,
                project.owner_id,
                project.name,
                project.description,
                project.visibility.as_str(),
                format_datetime(&project.created_at),
                format_datetime(&project.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::conflict(format!(
                "Project '{}' already exists",
                project.name
            ))),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            project_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_projects(&self, owner_id: Option<&str>) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE (?1 IS NULL OR owner_id = ?1) ORDER BY name, id"
        ))?;

        let rows = stmt.query_map(params![owner_id], project_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_project(&self, project: &Project) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE projects SET name = ?1, description = ?2, visibility = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                project.name,
                project.description,
                project.visibility.as_str(),
                format_datetime(&Utc::now()),
                project.id
            ],
        );

        match result {
            Ok(0) => Err(Error::not_found("Project not found")),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::conflict(format!(
                "Project '{}' already exists",
                project.name
            ))),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn delete_project(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn list_project_hashes(&self, project_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT f.hash FROM snapshot_files f
             JOIN snapshots s ON s.id = f.snapshot_id
             WHERE s.project_id = ?1 ORDER BY f.hash",
        )?;

        let rows = stmt.query_map(params![project_id], |row| row.get(0))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Snapshot operations

    fn commit_snapshot(&self, commit: &SnapshotCommit) -> Result<()> {
        let snapshot = &commit.snapshot;
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        if let Some(advance) = &commit.advance {
            if let Some(expected) = &advance.expected_head {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT head_snapshot_id FROM branches WHERE project_id = ?1 AND name = ?2",
                        params![snapshot.project_id, advance.branch],
                        |row| row.get(0),
                    )
                    .optional()?
                    .flatten();

                if current.as_deref() != Some(expected.as_str()) {
                    return Err(Error::conflict(format!(
                        "Branch '{}' has moved: expected head {}, found {}",
                        advance.branch,
                        expected,
                        current.as_deref().unwrap_or("none")
                    )));
                }
            }
        }

        tx.execute(
            "INSERT INTO snapshots (id, project_id, user_id, title, description, timestamp, file_count, external_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                snapshot.id,
                snapshot.project_id,
                snapshot.user_id,
                snapshot.title,
                snapshot.description,
                snapshot.timestamp,
                commit.files.len() as i64,
                snapshot.external_id,
                format_datetime(&snapshot.created_at),
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO snapshot_files (snapshot_id, path, hash, size, mode)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for file in &commit.files {
                stmt.execute(params![snapshot.id, file.path, file.hash, file.size, file.mode])
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            Error::bad_request(format!("Duplicate path in snapshot: {}", file.path))
                        } else {
                            Error::from(e)
                        }
                    })?;
            }
        }

        if let Some(advance) = &commit.advance {
            let now = format_datetime(&Utc::now());
            tx.execute(
                "INSERT INTO branches (project_id, name, head_snapshot_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(project_id, name)
                 DO UPDATE SET head_snapshot_id = excluded.head_snapshot_id, updated_at = excluded.updated_at",
                params![snapshot.project_id, advance.branch, snapshot.id, now],
            )?;
        }

        refresh_project_stats(&tx, &snapshot.project_id)?;

        tx.commit()?;
        Ok(())
    }

    fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?1"),
            params![id],
            snapshot_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_snapshots(&self, filter: &SnapshotFilter) -> Result<Vec<Snapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots
             WHERE (?1 IS NULL OR project_id = ?1) AND (?2 IS NULL OR user_id = ?2)
             ORDER BY timestamp DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(
            params![filter.project_id, filter.user_id],
            snapshot_from_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_snapshot_files(&self, snapshot_id: &str) -> Result<Vec<SnapshotFile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT path, hash, size, mode FROM snapshot_files
             WHERE snapshot_id = ?1 ORDER BY path",
        )?;

        let rows = stmt.query_map(params![snapshot_id], file_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn get_snapshot_file(&self, snapshot_id: &str, path: &str) -> Result<Option<SnapshotFile>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT path, hash, size, mode FROM snapshot_files WHERE snapshot_id = ?1 AND path = ?2",
            params![snapshot_id, path],
            file_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn latest_snapshot_id(&self, project_id: &str) -> Result<Option<String>> {
        latest_snapshot_id_in(&self.conn(), project_id).map_err(Error::from)
    }

    fn delete_snapshot(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let project_id: Option<String> = tx
            .query_row(
                "SELECT project_id FROM snapshots WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(project_id) = project_id else {
            return Ok(false);
        };

        // Tags are immutable, so a tagged snapshot stays.
        let tag: Option<String> = tx
            .query_row(
                "SELECT name FROM tags WHERE snapshot_id = ?1 ORDER BY name LIMIT 1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(tag) = tag {
            return Err(Error::conflict(format!("Snapshot is tagged as '{tag}'")));
        }

        // File rows cascade; branch heads pointing here are set to NULL.
        tx.execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
        refresh_project_stats(&tx, &project_id)?;

        tx.commit()?;
        Ok(true)
    }

    // Branch operations

    fn get_branch(&self, project_id: &str, name: &str) -> Result<Option<Branch>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 AND name = ?2"),
            params![project_id, name],
            branch_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 ORDER BY name"
        ))?;

        let rows = stmt.query_map(params![project_id], branch_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn ensure_default_branch(&self, project_id: &str, name: &str) -> Result<Vec<Branch>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM branches WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;

        if count == 0 {
            let head = latest_snapshot_id_in(&tx, project_id)?;
            let now = format_datetime(&Utc::now());
            tx.execute(
                "INSERT INTO branches (project_id, name, head_snapshot_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![project_id, name, head, now],
            )?;
            tracing::info!(project_id, branch = name, head = ?head, "created default branch");
        }

        let branches = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 ORDER BY name"
            ))?;
            let rows = stmt.query_map(params![project_id], branch_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        tx.commit()?;
        Ok(branches)
    }

    fn create_branch(&self, branch: &Branch) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO branches (project_id, name, head_snapshot_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                branch.project_id,
                branch.name,
                branch.head_snapshot_id,
                format_datetime(&branch.created_at),
                format_datetime(&branch.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::conflict(format!(
                "Branch '{}' already exists",
                branch.name
            ))),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn advance_head(&self, project_id: &str, name: &str, snapshot_id: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE branches SET head_snapshot_id = ?1, updated_at = ?2
             WHERE project_id = ?3 AND name = ?4",
            params![snapshot_id, format_datetime(&Utc::now()), project_id, name],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("Branch not found: {name}")));
        }
        Ok(())
    }

    // Tag operations

    fn create_tag(&self, tag: &Tag) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tags (project_id, name, snapshot_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                tag.project_id,
                tag.name,
                tag.snapshot_id,
                format_datetime(&tag.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::conflict(format!("Tag '{}' already exists", tag.name)))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn list_tags(&self, project_id: &str) -> Result<Vec<Tag>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT project_id, name, snapshot_id, created_at FROM tags
             WHERE project_id = ?1 ORDER BY name",
        )?;

        let rows = stmt.query_map(params![project_id], tag_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}
