use crate::calc::{self, Evaluation, Thresholds};
use crate::gradebook::SubjectGradeSet;
use anyhow::{anyhow, Context};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// A subject as the hosted schedule lists it (first occurrence wins).
#[derive(Debug, Clone, PartialEq)]
pub struct HostedSubject {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportWarning {
    pub location: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedUserData {
    pub subjects: Vec<HostedSubject>,
    pub grade_sets: Vec<SubjectGradeSet>,
    pub thresholds: Option<Thresholds>,
    pub warnings: Vec<ImportWarning>,
}

impl ParsedUserData {
    /// Schedule subjects plus placeholder subjects for grade groups the schedule lacks.
    pub fn subjects_with_placeholders(&self) -> Vec<HostedSubject> {
        let mut out = self.subjects.clone();
        for set in &self.grade_sets {
            if !out.iter().any(|s| s.id == set.subject_id) {
                out.push(HostedSubject {
                    id: set.subject_id.clone(),
                    code: set.subject_id.clone(),
                    name: set.subject_id.clone(),
                });
            }
        }
        out
    }
}

/// Reads a hosted `user_data` export: a single record, or a one-element array.
pub fn read_hosted_record(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.to_string_lossy()))?;
    match value {
        Value::Array(mut rows) if rows.len() == 1 => Ok(rows.remove(0)),
        Value::Array(rows) => Err(anyhow!(
            "expected exactly one user_data record, found {}",
            rows.len()
        )),
        Value::Object(_) => Ok(value),
        _ => Err(anyhow!("user_data record must be a JSON object")),
    }
}

/// The hosted store keeps list columns as JSON-encoded strings.
fn decode_list_field(record: &Value, key: &str) -> anyhow::Result<Vec<Value>> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => {
            let inner: Value = serde_json::from_str(s)
                .with_context(|| format!("{} is not valid JSON", key))?;
            match inner {
                Value::Null => Ok(Vec::new()),
                Value::Array(items) => Ok(items),
                _ => Err(anyhow!("{} must encode a JSON array", key)),
            }
        }
        Some(_) => Err(anyhow!("{} must be an array or a JSON string", key)),
    }
}

fn id_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(v: Option<&Value>) -> String {
    v.and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn parse_schedule(items: &[Value]) -> Vec<HostedSubject> {
    let mut subjects: Vec<HostedSubject> = Vec::new();
    for item in items {
        let Some(id) = id_string(item.get("subjectId")) else {
            continue;
        };
        if subjects.iter().any(|s| s.id == id) {
            continue;
        }
        let code = text_field(item.get("subjectCode"));
        let name = text_field(item.get("subjectName"));
        subjects.push(HostedSubject {
            code: if code.is_empty() { id.clone() } else { code },
            name: if name.is_empty() { id.clone() } else { name },
            id,
        });
    }
    subjects
}

fn parse_grade(raw: &Value, location: &str) -> Result<Evaluation, ImportWarning> {
    let warn = |code: &'static str, message: String| ImportWarning {
        location: location.to_string(),
        code,
        message,
    };
    let id = id_string(raw.get("id")).ok_or_else(|| warn("missing_id", "grade has no id".into()))?;
    let percentage = raw
        .get("percentage")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| warn("bad_percentage", "percentage must be a number".into()))?;
    let score = match raw.get("score") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_f64()
                .ok_or_else(|| warn("bad_score", "score must be a number or null".into()))?,
        ),
    };
    Ok(Evaluation {
        id,
        name: text_field(raw.get("name")),
        percentage,
        score,
    })
}

fn parse_grade_groups(items: &[Value], warnings: &mut Vec<ImportWarning>) -> Vec<SubjectGradeSet> {
    let mut sets: Vec<SubjectGradeSet> = Vec::new();
    for (gi, group) in items.iter().enumerate() {
        let Some(subject_id) = id_string(group.get("subjectId")) else {
            warnings.push(ImportWarning {
                location: format!("subject_grades[{}]", gi),
                code: "missing_subject",
                message: "grade group has no subjectId".into(),
            });
            continue;
        };
        let pos = match sets.iter().position(|s| s.subject_id == subject_id) {
            Some(p) => p,
            None => {
                sets.push(SubjectGradeSet::new(subject_id));
                sets.len() - 1
            }
        };
        let grades = group
            .get("grades")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        for (ei, raw) in grades.iter().enumerate() {
            let location = format!("subject_grades[{}].grades[{}]", gi, ei);
            let evaluation = match parse_grade(raw, &location) {
                Ok(e) => e,
                Err(w) => {
                    warnings.push(w);
                    continue;
                }
            };
            if let Err(e) = sets[pos].add(evaluation) {
                warnings.push(ImportWarning {
                    location,
                    code: e.code(),
                    message: e.to_string(),
                });
            }
        }
    }
    sets.retain(|s| !s.is_empty());
    sets
}

fn parse_thresholds(record: &Value, warnings: &mut Vec<ImportWarning>) -> Option<Thresholds> {
    let passing = record.get("min_passing_grade").and_then(|v| v.as_f64());
    let exam = record.get("min_exam_grade").and_then(|v| v.as_f64());
    let (Some(passing), Some(exam)) = (passing, exam) else {
        if passing.is_some() || exam.is_some() {
            warnings.push(ImportWarning {
                location: "min_passing_grade/min_exam_grade".into(),
                code: "invalid_thresholds",
                message: "both thresholds are required; keeping current values".into(),
            });
        }
        return None;
    };
    match calc::validate_thresholds(passing, exam) {
        Ok(t) => Some(t),
        Err(e) => {
            warnings.push(ImportWarning {
                location: "min_passing_grade/min_exam_grade".into(),
                code: "invalid_thresholds",
                message: format!("{}; keeping current values", e),
            });
            None
        }
    }
}

pub fn parse_hosted_user_data(record: &Value) -> anyhow::Result<ParsedUserData> {
    if !record.is_object() {
        return Err(anyhow!("user_data record must be a JSON object"));
    }
    let mut warnings = Vec::new();
    let schedule = decode_list_field(record, "schedule")?;
    let groups = decode_list_field(record, "subject_grades")?;

    let subjects = parse_schedule(&schedule);
    let grade_sets = parse_grade_groups(&groups, &mut warnings);
    let thresholds = parse_thresholds(record, &mut warnings);

    Ok(ParsedUserData {
        subjects,
        grade_sets,
        thresholds,
        warnings,
    })
}
