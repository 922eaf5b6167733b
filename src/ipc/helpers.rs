use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::Value;

pub fn no_workspace(req: &Request) -> Value {
    err(&req.id, "no_workspace", "select a workspace first", None)
}

pub fn require_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state.db.as_ref().ok_or_else(|| no_workspace(req))
}

/// Trimmed, non-empty string parameter.
pub fn require_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, Value> {
    match req.params.get(key).and_then(|v| v.as_str()).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn require_f64(req: &Request, key: &str) -> Result<f64, Value> {
    match req.params.get(key) {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be a number", key), None)),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

/// Absent or null maps to `None`; anything else must be a number.
pub fn nullable_f64(req: &Request, key: &str) -> Result<Option<f64>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a number or null", key),
                None,
            )
        }),
    }
}

pub fn db_err(req: &Request, code: &str, e: impl std::fmt::Display) -> Value {
    err(&req.id, code, e.to_string(), None)
}
