use crate::calc::{self, Evaluation, Thresholds};
use crate::gradebook::SubjectGradeSet;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "notas.sqlite3";
pub const THRESHOLDS_KEY: &str = "grades.thresholds";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_sort ON subjects(sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            name TEXT NOT NULL,
            percentage REAL NOT NULL,
            score REAL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(subject_id, id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_subject ON evaluations(subject_id, sort_order)",
        [],
    )?;

    Ok(conn)
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = serde_json::from_str(&raw)
        .with_context(|| format!("settings value for {} is not valid JSON", key))?;
    Ok(Some(value))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Stored thresholds, or the defaults when nothing valid has been saved.
pub fn load_thresholds(conn: &Connection) -> anyhow::Result<Thresholds> {
    let Some(saved) = settings_get_json(conn, THRESHOLDS_KEY)? else {
        return Ok(Thresholds::default());
    };
    let parsed: Result<Thresholds, _> = serde_json::from_value(saved);
    let checked = parsed
        .ok()
        .and_then(|t| calc::validate_thresholds(t.min_passing_grade, t.min_exam_grade).ok());
    match checked {
        Some(t) => Ok(t),
        None => {
            tracing::warn!(key = THRESHOLDS_KEY, "ignoring malformed stored thresholds");
            Ok(Thresholds::default())
        }
    }
}

pub fn save_thresholds(conn: &Connection, thresholds: &Thresholds) -> anyhow::Result<()> {
    settings_set_json(conn, THRESHOLDS_KEY, &serde_json::to_value(thresholds)?)
}

#[derive(Debug, Clone)]
pub struct SubjectRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub sort_order: i64,
}

pub fn list_subjects(conn: &Connection) -> anyhow::Result<Vec<SubjectRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, code, name, sort_order
         FROM subjects
         ORDER BY sort_order, code",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(SubjectRow {
                id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
                sort_order: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_subject(conn: &Connection, subject_id: &str) -> anyhow::Result<Option<SubjectRow>> {
    let row = conn
        .query_row(
            "SELECT id, code, name, sort_order FROM subjects WHERE id = ?",
            [subject_id],
            |r| {
                Ok(SubjectRow {
                    id: r.get(0)?,
                    code: r.get(1)?,
                    name: r.get(2)?,
                    sort_order: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Inserts or renames a subject; new subjects go to the end of the list.
pub fn upsert_subject(conn: &Connection, id: &str, code: &str, name: &str) -> anyhow::Result<()> {
    let next_sort: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM subjects",
        [],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO subjects(id, code, name, sort_order, updated_at) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           code = excluded.code,
           name = excluded.name,
           updated_at = excluded.updated_at",
        (id, code, name, next_sort, now_timestamp()),
    )?;
    Ok(())
}

/// Loads a subject's evaluations in entry order.
pub fn load_grade_set(conn: &Connection, subject_id: &str) -> anyhow::Result<SubjectGradeSet> {
    let mut stmt = conn.prepare(
        "SELECT id, name, percentage, score
         FROM evaluations
         WHERE subject_id = ?
         ORDER BY sort_order",
    )?;
    let evaluations = stmt
        .query_map([subject_id], |r| {
            Ok(Evaluation {
                id: r.get(0)?,
                name: r.get(1)?,
                percentage: r.get(2)?,
                score: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SubjectGradeSet {
        subject_id: subject_id.to_string(),
        evaluations,
    })
}

pub fn insert_evaluation(
    conn: &Connection,
    subject_id: &str,
    evaluation: &Evaluation,
) -> anyhow::Result<()> {
    let next_sort: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM evaluations WHERE subject_id = ?",
        [subject_id],
        |r| r.get(0),
    )?;
    conn.execute(
        "INSERT INTO evaluations(id, subject_id, name, percentage, score, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &evaluation.id,
            subject_id,
            &evaluation.name,
            evaluation.percentage,
            evaluation.score,
            next_sort,
            now_timestamp(),
        ),
    )?;
    Ok(())
}

/// Replaces every evaluation of a subject with the given set, keeping its order.
pub fn replace_evaluations(conn: &Connection, set: &SubjectGradeSet) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM evaluations WHERE subject_id = ?",
        [&set.subject_id],
    )?;
    let updated_at = now_timestamp();
    for (idx, e) in set.evaluations.iter().enumerate() {
        conn.execute(
            "INSERT INTO evaluations(id, subject_id, name, percentage, score, sort_order, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &e.id,
                &set.subject_id,
                &e.name,
                e.percentage,
                e.score,
                idx as i64,
                &updated_at,
            ),
        )?;
    }
    Ok(())
}
