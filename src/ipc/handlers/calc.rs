use crate::calc::{self, Evaluation, SubjectStats, Thresholds};
use crate::db;
use crate::gradebook::SubjectGradeSet;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, require_conn, require_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use uuid::Uuid;

fn stats_json(stats: &SubjectStats) -> Value {
    json!({
        "stats": stats,
        "outlook": stats.outlook(),
    })
}

fn handle_subject_stats(state: &mut AppState, req: &Request) -> Value {
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
    let thresholds = match db::load_thresholds(conn) {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let set = match db::load_grade_set(conn, subject_id) {
        Ok(s) => s,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let stats = set.stats(&thresholds);
    let mut result = stats_json(&stats);
    result["subjectId"] = json!(subject_id);
    result["thresholds"] = json!(thresholds);
    ok(&req.id, result)
}

fn handle_overview(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let thresholds = match db::load_thresholds(conn) {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_query_failed", e),
    };
    let subjects = match db::list_subjects(conn) {
        Ok(v) => v,
        Err(e) => return db_err(req, "db_query_failed", e),
    };

    let mut rows: Vec<Value> = Vec::with_capacity(subjects.len());
    for s in &subjects {
        let set = match db::load_grade_set(conn, &s.id) {
            Ok(v) => v,
            Err(e) => return db_err(req, "db_query_failed", e),
        };
        let stats = set.stats(&thresholds);
        let mut row = stats_json(&stats);
        row["subjectId"] = json!(s.id);
        row["code"] = json!(s.code);
        row["name"] = json!(s.name);
        row["sortOrder"] = json!(s.sort_order);
        row["evaluationCount"] = json!(set.evaluations.len());
        rows.push(row);
    }

    ok(
        &req.id,
        json!({ "thresholds": thresholds, "subjects": rows }),
    )
}

/// Parses ad-hoc evaluations; entries without an id get a fresh uuid.
fn parse_adhoc_evaluations(req: &Request) -> Result<SubjectGradeSet, Value> {
    let Some(items) = req.params.get("evaluations").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "evaluations must be an array", None));
    };
    let mut set = SubjectGradeSet::new("adhoc");
    for (idx, raw) in items.iter().enumerate() {
        let mut raw = raw.clone();
        if let Some(obj) = raw.as_object_mut() {
            if !obj.contains_key("id") {
                obj.insert("id".into(), json!(Uuid::new_v4().to_string()));
            }
            if !obj.contains_key("name") {
                obj.insert("name".into(), json!(format!("#{}", idx + 1)));
            }
        }
        let evaluation: Evaluation = serde_json::from_value(raw).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("evaluations[{}]: {}", idx, e),
                None,
            )
        })?;
        set.add(evaluation).map_err(|e| {
            err(
                &req.id,
                e.code(),
                e.to_string(),
                Some(json!({ "index": idx })),
            )
        })?;
    }
    Ok(set)
}

fn adhoc_thresholds(state: &AppState, req: &Request) -> Result<Thresholds, Value> {
    let passing = req.params.get("minPassingGrade").filter(|v| !v.is_null());
    let exam = req.params.get("minExamGrade").filter(|v| !v.is_null());
    match (passing, exam) {
        (None, None) => match state.db.as_ref() {
            Some(conn) => db::load_thresholds(conn).map_err(|e| db_err(req, "db_query_failed", e)),
            None => Ok(Thresholds::default()),
        },
        (Some(p), Some(x)) => {
            let (Some(p), Some(x)) = (p.as_f64(), x.as_f64()) else {
                return Err(err(&req.id, "bad_params", "thresholds must be numbers", None));
            };
            calc::validate_thresholds(p, x)
                .map_err(|e| err(&req.id, "invalid_thresholds", e.to_string(), None))
        }
        _ => Err(err(
            &req.id,
            "bad_params",
            "minPassingGrade and minExamGrade must be given together",
            None,
        )),
    }
}

fn handle_evaluate(state: &mut AppState, req: &Request) -> Value {
    let set = match parse_adhoc_evaluations(req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let thresholds = match adhoc_thresholds(state, req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let stats = set.stats(&thresholds);
    let mut result = stats_json(&stats);
    result["thresholds"] = json!(thresholds);
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "calc.subjectStats" => Some(handle_subject_stats(state, req)),
        "calc.overview" => Some(handle_overview(state, req)),
        "calc.evaluate" => Some(handle_evaluate(state, req)),
        _ => None,
    }
}
