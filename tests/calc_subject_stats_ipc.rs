use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_notasd");
    let mut child = Command::new(exe)
        .env_remove("NOTASD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn notasd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", value);
    value["error"]["code"].as_str().unwrap_or("").to_string()
}

#[test]
fn evaluate_reports_partial_projection_with_explicit_thresholds() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.evaluate",
        json!({
            "evaluations": [
                { "name": "Prueba 1", "percentage": 30, "score": 5.5 },
                { "name": "Prueba 2", "percentage": 20, "score": 6.0 }
            ],
            "minPassingGrade": 4.0,
            "minExamGrade": 3.5
        }),
    );
    let stats = &result["stats"];
    assert_eq!(stats["totalPercentage"].as_f64(), Some(50.0));
    assert_eq!(stats["remainingPercentage"].as_f64(), Some(50.0));
    assert_eq!(stats["average"].as_f64(), Some(2.85));
    assert_eq!(stats["status"], "pending");
    assert_eq!(stats["minNeededToPass"].as_f64(), Some(2.3));
    assert_eq!(stats["minNeededToExam"].as_f64(), Some(1.3));
    assert_eq!(result["outlook"]["toPass"], "reachable");
    assert_eq!(result["outlook"]["toExam"], "reachable");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn evaluate_boundaries_and_overshoot() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let thresholds = json!({ "minPassingGrade": 4.0, "minExamGrade": 3.5 });

    let cases = [
        (json!([{ "percentage": 100, "score": 4.0 }]), "passed", "Promedio: 4.00"),
        (json!([{ "percentage": 100, "score": 3.6 }]), "examEligible", "Promedio: 3.60"),
        (json!([{ "percentage": 100, "score": 2.0 }]), "failed", "Promedio: 2.00"),
        (
            json!([{ "percentage": 60, "score": 5 }, { "percentage": 60, "score": 5 }]),
            "configurationError",
            "El porcentaje total es 120% (debe ser 100%)",
        ),
    ];
    for (i, (evaluations, status, message)) in cases.into_iter().enumerate() {
        let mut params = thresholds.clone();
        params["evaluations"] = evaluations;
        let result = request_ok(&mut stdin, &mut reader, &i.to_string(), "calc.evaluate", params);
        assert_eq!(result["stats"]["status"], status, "case {}", i);
        assert_eq!(result["stats"]["message"], message, "case {}", i);
        assert!(result["stats"]["minNeededToPass"].is_null());
        assert!(result["stats"]["minNeededToExam"].is_null());
    }

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn evaluate_empty_set_uses_default_thresholds_without_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.evaluate",
        json!({ "evaluations": [] }),
    );
    assert_eq!(result["thresholds"]["minPassingGrade"].as_f64(), Some(3.96));
    assert_eq!(result["stats"]["totalPercentage"].as_f64(), Some(0.0));
    assert_eq!(result["stats"]["status"], "pending");
    assert_eq!(result["stats"]["minNeededToPass"].as_f64(), Some(3.96));
    assert_eq!(result["stats"]["minNeededToExam"].as_f64(), Some(3.56));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn evaluate_rejects_invalid_input_before_computing() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let bad_score = request(
        &mut stdin,
        &mut reader,
        "1",
        "calc.evaluate",
        json!({ "evaluations": [{ "percentage": 50, "score": 7.5 }] }),
    );
    assert_eq!(error_code(&bad_score), "invalid_evaluation");
    assert_eq!(bad_score["error"]["details"]["index"], 0);

    let bad_thresholds = request(
        &mut stdin,
        &mut reader,
        "2",
        "calc.evaluate",
        json!({ "evaluations": [], "minPassingGrade": 3.0, "minExamGrade": 3.5 }),
    );
    assert_eq!(error_code(&bad_thresholds), "invalid_thresholds");

    let half = request(
        &mut stdin,
        &mut reader,
        "3",
        "calc.evaluate",
        json!({ "evaluations": [], "minPassingGrade": 4.0 }),
    );
    assert_eq!(error_code(&half), "bad_params");

    let not_array = request(
        &mut stdin,
        &mut reader,
        "4",
        "calc.evaluate",
        json!({ "evaluations": {} }),
    );
    assert_eq!(error_code(&not_array), "bad_params");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn stored_subject_stats_follow_score_edits() {
    let workspace = temp_dir("notas-calc-stored");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "settings.thresholds.update",
        json!({ "minPassingGrade": 4.0, "minExamGrade": 3.5 }),
    );
    let subject = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.upsert",
        json!({ "code": "FIS100", "name": "Física" }),
    );
    let sid = subject["subjectId"].as_str().expect("subjectId").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "evaluations.add",
        json!({ "subjectId": sid, "name": "Certamen 1", "percentage": 60, "score": 6.0 }),
    );
    let pending = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "evaluations.add",
        json!({ "subjectId": sid, "name": "Certamen 2", "percentage": 40 }),
    );
    let pending_id = pending["evaluation"]["id"].as_str().expect("id").to_string();

    // Weights at 100% with one score missing: pending, nothing to project onto.
    let stats = request_ok(&mut stdin, &mut reader, "6", "calc.subjectStats", json!({ "subjectId": sid }));
    assert_eq!(stats["stats"]["status"], "pending");
    assert_eq!(stats["stats"]["average"].as_f64(), Some(3.6));
    assert!(stats["stats"]["minNeededToPass"].is_null());
    assert!(stats["outlook"]["toPass"].is_null());

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "evaluations.updateScore",
        json!({ "subjectId": sid, "evaluationId": pending_id, "score": 1.5 }),
    );
    let stats = request_ok(&mut stdin, &mut reader, "8", "calc.subjectStats", json!({ "subjectId": sid }));
    assert_eq!(stats["stats"]["status"], "passed");
    assert_eq!(stats["stats"]["average"].as_f64(), Some(4.2));

    let overview = request_ok(&mut stdin, &mut reader, "9", "calc.overview", json!({}));
    let rows = overview["subjects"].as_array().expect("subjects");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["code"], "FIS100");
    assert_eq!(rows[0]["stats"]["status"], "passed");
    assert_eq!(rows[0]["evaluationCount"], 2);

    let missing = request(&mut stdin, &mut reader, "10", "calc.subjectStats", json!({ "subjectId": "nope" }));
    assert_eq!(error_code(&missing), "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn evaluate_is_repeatable() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let params = json!({
        "evaluations": [
            { "id": "a", "name": "A", "percentage": 25, "score": 4.3 },
            { "id": "b", "name": "B", "percentage": 25 },
            { "id": "c", "name": "C", "percentage": 35, "score": 6.1 }
        ]
    });
    let first = request_ok(&mut stdin, &mut reader, "1", "calc.evaluate", params.clone());
    let second = request_ok(&mut stdin, &mut reader, "2", "calc.evaluate", params);
    assert_eq!(first, second);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn evaluate_mixes_explicit_and_missing_ids() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "calc.evaluate",
        json!({
            "evaluations": [
                { "id": "1", "percentage": 50, "score": 5.0 },
                { "percentage": 50, "score": 3.0 }
            ],
            "minPassingGrade": 4.0,
            "minExamGrade": 3.5
        }),
    );
    assert_eq!(result["stats"]["status"], "passed");
    assert_eq!(result["stats"]["average"].as_f64(), Some(4.0));

    let duplicate = request(
        &mut stdin,
        &mut reader,
        "2",
        "calc.evaluate",
        json!({
            "evaluations": [
                { "id": "a", "percentage": 50 },
                { "id": "a", "percentage": 50 }
            ]
        }),
    );
    assert_eq!(error_code(&duplicate), "invalid_evaluation");
    assert_eq!(duplicate["error"]["details"]["index"], 1);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn subject_stats_trims_subject_id() {
    let workspace = temp_dir("notas-calc-trimmed-id");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.upsert",
        json!({ "subjectId": "qui", "code": "QUI010", "name": "Química" }),
    );

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "calc.subjectStats",
        json!({ "subjectId": "  qui " }),
    );
    assert_eq!(stats["subjectId"], "qui");
    assert_eq!(stats["stats"]["status"], "pending");

    let blank = request(&mut stdin, &mut reader, "4", "calc.subjectStats", json!({ "subjectId": "   " }));
    assert_eq!(error_code(&blank), "bad_params");

    drop(stdin);
    let _ = child.wait();
}
