use crate::db;
use crate::gradebook::{self, EvaluationError, SubjectGradeSet};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, nullable_f64, require_conn, require_f64, require_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn evaluation_err(req: &Request, e: EvaluationError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), None)
}

/// Resolves the subject and loads its evaluations, or the error response to send.
fn load_subject_set(
    conn: &Connection,
    req: &Request,
) -> Result<SubjectGradeSet, serde_json::Value> {
    let subject_id = require_str(req, "subjectId")?;
    match db::find_subject(conn, subject_id) {
        Ok(Some(_)) => {}
        Ok(None) => return Err(err(&req.id, "not_found", "subject not found", None)),
        Err(e) => return Err(db_err(req, "db_query_failed", e)),
    }
    db::load_grade_set(conn, subject_id).map_err(|e| db_err(req, "db_query_failed", e))
}

fn handle_evaluations_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match load_subject_set(conn, req) {
        Ok(set) => ok(
            &req.id,
            json!({ "subjectId": set.subject_id, "evaluations": set.evaluations }),
        ),
        Err(resp) => resp,
    }
}

fn handle_evaluations_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mut set = match load_subject_set(conn, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let percentage = match require_f64(req, "percentage") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let score = match nullable_f64(req, "score") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let input = match gradebook::validate_evaluation_input(name, percentage, score) {
        Ok(v) => v,
        Err(e) => return evaluation_err(req, e),
    };
    let evaluation = input.into_evaluation(Uuid::new_v4().to_string());
    if let Err(e) = set.add(evaluation.clone()) {
        return evaluation_err(req, e);
    }
    if let Err(e) = db::insert_evaluation(conn, &set.subject_id, &evaluation) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "evaluations" })),
        );
    }

    ok(
        &req.id,
        json!({ "subjectId": set.subject_id, "evaluation": evaluation }),
    )
}

fn handle_evaluations_update_score(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mut set = match load_subject_set(conn, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let evaluation_id = match require_str(req, "evaluationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if req.params.get("score").is_none() {
        return err(&req.id, "bad_params", "missing score (use null to clear)", None);
    }
    let score = match nullable_f64(req, "score") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = set.update_score(evaluation_id, score) {
        return evaluation_err(req, e);
    }
    if let Err(e) = conn.execute(
        "UPDATE evaluations SET score = ?, updated_at = ? WHERE id = ? AND subject_id = ?",
        (score, db::now_timestamp(), evaluation_id, &set.subject_id),
    ) {
        return db_err(req, "db_update_failed", e);
    }

    ok(
        &req.id,
        json!({
            "subjectId": set.subject_id,
            "evaluationId": evaluation_id,
            "score": score
        }),
    )
}

fn handle_evaluations_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mut set = match load_subject_set(conn, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let evaluation_id = match require_str(req, "evaluationId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let removed = match set.remove(evaluation_id) {
        Ok(e) => e,
        Err(e) => return evaluation_err(req, e),
    };
    if let Err(e) = conn.execute(
        "DELETE FROM evaluations WHERE id = ? AND subject_id = ?",
        (&removed.id, &set.subject_id),
    ) {
        return db_err(req, "db_delete_failed", e);
    }

    ok(
        &req.id,
        json!({
            "ok": true,
            "removed": removed,
            "remaining": set.evaluations.len()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "evaluations.list" => Some(handle_evaluations_list(state, req)),
        "evaluations.add" => Some(handle_evaluations_add(state, req)),
        "evaluations.updateScore" => Some(handle_evaluations_update_score(state, req)),
        "evaluations.remove" => Some(handle_evaluations_remove(state, req)),
        _ => None,
    }
}
