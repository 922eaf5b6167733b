use crate::calc::{
    self, Thresholds, DEFAULT_MIN_EXAM_GRADE, DEFAULT_MIN_PASSING_GRADE, MAX_SCORE, MIN_SCORE,
    PASSING_GRADE_PRESETS,
};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, require_conn, require_f64};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn thresholds_json(t: &Thresholds) -> serde_json::Value {
    json!({
        "minPassingGrade": t.min_passing_grade,
        "minExamGrade": t.min_exam_grade,
        "defaults": {
            "minPassingGrade": DEFAULT_MIN_PASSING_GRADE,
            "minExamGrade": DEFAULT_MIN_EXAM_GRADE
        },
        "presets": PASSING_GRADE_PRESETS,
        "scale": { "min": MIN_SCORE, "max": MAX_SCORE }
    })
}

fn handle_thresholds_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match db::load_thresholds(conn) {
        Ok(t) => ok(&req.id, thresholds_json(&t)),
        Err(e) => db_err(req, "db_query_failed", e),
    }
}

fn handle_thresholds_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let passing = match require_f64(req, "minPassingGrade") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let exam = match require_f64(req, "minExamGrade") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let thresholds = match calc::validate_thresholds(passing, exam) {
        Ok(t) => t,
        Err(e) => {
            return err(
                &req.id,
                "invalid_thresholds",
                e.to_string(),
                Some(json!({ "minPassingGrade": passing, "minExamGrade": exam })),
            )
        }
    };
    if let Err(e) = db::save_thresholds(conn, &thresholds) {
        return db_err(req, "db_update_failed", e);
    }
    tracing::info!(
        min_passing_grade = thresholds.min_passing_grade,
        min_exam_grade = thresholds.min_exam_grade,
        "thresholds updated"
    );
    ok(&req.id, thresholds_json(&thresholds))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.thresholds.get" => Some(handle_thresholds_get(state, req)),
        "settings.thresholds.update" => Some(handle_thresholds_update(state, req)),
        _ => None,
    }
}
