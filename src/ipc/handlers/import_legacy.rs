use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, require_conn};
use crate::ipc::types::{AppState, Request};
use crate::legacy;
use serde_json::json;
use std::path::PathBuf;

fn handle_import_user_data(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let record = match (req.params.get("record"), req.params.get("path")) {
        (Some(r), _) if !r.is_null() => r.clone(),
        (_, Some(p)) => {
            let Some(p) = p.as_str().map(str::trim).filter(|p| !p.is_empty()) else {
                return err(&req.id, "bad_params", "path must be a non-empty string", None);
            };
            match legacy::read_hosted_record(&PathBuf::from(p)) {
                Ok(v) => v,
                Err(e) => {
                    return err(
                        &req.id,
                        "io_failed",
                        format!("{e:#}"),
                        Some(json!({ "path": p })),
                    )
                }
            }
        }
        _ => return err(&req.id, "bad_params", "missing record or path", None),
    };

    let parsed = match legacy::parse_hosted_user_data(&record) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("{e:#}"), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return db_err(req, "db_tx_failed", e),
    };

    let subjects = parsed.subjects_with_placeholders();
    for s in &subjects {
        if let Err(e) = db::upsert_subject(&tx, &s.id, &s.code, &s.name) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "subjects", "subjectId": s.id })),
            );
        }
    }

    let mut evaluations_imported = 0usize;
    for set in &parsed.grade_sets {
        if let Err(e) = db::replace_evaluations(&tx, set) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "evaluations", "subjectId": set.subject_id })),
            );
        }
        evaluations_imported += set.evaluations.len();
    }

    if let Some(t) = parsed.thresholds.as_ref() {
        if let Err(e) = db::save_thresholds(&tx, t) {
            let _ = tx.rollback();
            return db_err(req, "db_update_failed", e);
        }
    }

    if let Err(e) = tx.commit() {
        return db_err(req, "db_commit_failed", e);
    }

    tracing::info!(
        subjects = subjects.len(),
        evaluations = evaluations_imported,
        warnings = parsed.warnings.len(),
        "hosted user data imported"
    );

    ok(
        &req.id,
        json!({
            "subjectsImported": subjects.len(),
            "evaluationsImported": evaluations_imported,
            "thresholdsImported": parsed.thresholds.is_some(),
            "warnings": parsed.warnings
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.userData" => Some(handle_import_user_data(state, req)),
        _ => None,
    }
}
