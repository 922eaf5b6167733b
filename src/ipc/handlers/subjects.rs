use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, optional_str, require_conn, require_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };

    // Correlated subqueries keep one row per subject.
    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.code,
           s.name,
           s.sort_order,
           (SELECT COUNT(*) FROM evaluations e WHERE e.subject_id = s.id) AS evaluation_count,
           (SELECT COALESCE(SUM(e.percentage), 0) FROM evaluations e WHERE e.subject_id = s.id) AS total_percentage
         FROM subjects s
         ORDER BY s.sort_order, s.code",
    ) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let name: String = row.get(2)?;
            let sort_order: i64 = row.get(3)?;
            let evaluation_count: i64 = row.get(4)?;
            let total_percentage: f64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "code": code,
                "name": name,
                "sortOrder": sort_order,
                "evaluationCount": evaluation_count,
                "totalPercentage": total_percentage
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_subjects_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let code = match require_str(req, "code") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if code.chars().count() > 32 {
        return err(&req.id, "bad_params", "code length must be <= 32", None);
    }
    if name.chars().count() > 120 {
        return err(&req.id, "bad_params", "name length must be <= 120", None);
    }

    let (subject_id, created) = match optional_str(req, "subjectId") {
        Some(id) => {
            let exists = match db::find_subject(conn, id) {
                Ok(v) => v.is_some(),
                Err(e) => return db_err(req, "db_query_failed", e),
            };
            (id.to_string(), !exists)
        }
        None => (Uuid::new_v4().to_string(), true),
    };

    if let Err(e) = db::upsert_subject(conn, &subject_id, code, name) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }

    ok(
        &req.id,
        json!({
            "subjectId": subject_id,
            "code": code,
            "name": name,
            "created": created
        }),
    )
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let subject_id = match require_str(req, "subjectId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match db::find_subject(conn, subject_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "subject not found", None),
        Err(e) => return db_err(req, "db_query_failed", e),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_tx_failed", e),
    };

    // No ON DELETE CASCADE: evaluations first.
    let removed = match tx.execute("DELETE FROM evaluations WHERE subject_id = ?", [subject_id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "evaluations" })),
            );
        }
    };
    if let Err(e) = tx.execute("DELETE FROM subjects WHERE id = ?", [subject_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "subjects" })),
        );
    }
    if let Err(e) = tx.commit() {
        return db_err(req, "db_commit_failed", e);
    }

    ok(
        &req.id,
        json!({ "ok": true, "evaluationsRemoved": removed }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.upsert" => Some(handle_subjects_upsert(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
