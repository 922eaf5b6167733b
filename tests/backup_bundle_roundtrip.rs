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
fn export_then_import_into_fresh_workspace_restores_grades() {
    let workspace = temp_dir("notas-backup-source");
    let restored = temp_dir("notas-backup-restored");
    let bundle = workspace.join("exports/notas-backup.zip");

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
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "evaluations.add",
        json!({ "subjectId": "qui", "name": "Laboratorio", "percentage": 100, "score": 5.1 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "settings.thresholds.update",
        json!({ "minPassingGrade": 4.0, "minExamGrade": 3.5 }),
    );

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export["bundleFormat"], "notas-workspace-v1");
    assert_eq!(export["entryCount"], 2);
    assert_eq!(export["dbSha256"].as_str().map(|s| s.len()), Some(64));
    assert!(bundle.is_file());

    let import = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.importWorkspaceBundle",
        json!({
            "inPath": bundle.to_string_lossy(),
            "workspacePath": restored.to_string_lossy()
        }),
    );
    assert_eq!(import["bundleFormatDetected"], "notas-workspace-v1");

    let health = request_ok(&mut stdin, &mut reader, "7", "health", json!({}));
    assert_eq!(health["workspacePath"], restored.to_string_lossy().to_string());

    let stats = request_ok(&mut stdin, &mut reader, "8", "calc.subjectStats", json!({ "subjectId": "qui" }));
    assert_eq!(stats["stats"]["status"], "passed");
    assert_eq!(stats["stats"]["average"].as_f64(), Some(5.1));
    assert_eq!(stats["thresholds"]["minPassingGrade"].as_f64(), Some(4.0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn import_of_missing_or_foreign_bundle_fails_cleanly() {
    let workspace = temp_dir("notas-backup-bad");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "backup.importWorkspaceBundle",
        json!({ "inPath": workspace.join("nope.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), "not_found");

    let no_out = request(&mut stdin, &mut reader, "3", "backup.exportWorkspaceBundle", json!({}));
    assert_eq!(error_code(&no_out), "bad_params");

    // The workspace stays usable after failed calls.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.upsert",
        json!({ "code": "MAT101", "name": "Cálculo I" }),
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn import_of_plain_file_keeps_current_workspace() {
    let workspace = temp_dir("notas-backup-plain-file");
    let notes = workspace.join("notes.txt");
    std::fs::write(&notes, "just some text, not a database").expect("write notes");

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
        json!({ "subjectId": "s1", "code": "MAT101", "name": "Cálculo I" }),
    );

    let rejected = request(
        &mut stdin,
        &mut reader,
        "3",
        "backup.importWorkspaceBundle",
        json!({ "inPath": notes.to_string_lossy() }),
    );
    assert_eq!(error_code(&rejected), "io_failed");

    let subjects = request_ok(&mut stdin, &mut reader, "4", "subjects.list", json!({}));
    let list = subjects["subjects"].as_array().expect("subjects");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], "s1");

    drop(stdin);
    let _ = child.wait();
}
