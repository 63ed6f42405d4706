use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolbookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolbookd");
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

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert!(
        !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

#[test]
fn bundle_round_trip_restores_the_workspace() {
    let base = tempfile::TempDir::new().expect("temp base");
    let source_ws = base.path().join("source");
    let restored_ws = base.path().join("restored");
    let bundle = base.path().join("out/schoolbook-backup.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    // Exporting before any workspace is selected fails cleanly.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(code, "no_workspace");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": source_ws.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.upsert",
        json!({ "firstName": "Ada", "lastName": "Obi", "class": "PRY 1" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "tabs.create",
        json!({ "name": "Uniform Fees", "preset": "payment" }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("schoolbook-workspace-v1")
    );
    let sha = exported.get("dbSha256").and_then(|v| v.as_str()).expect("sha");
    assert_eq!(sha.len(), 64);

    // Restoring into the live workspace is refused.
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "6",
        "backup.import",
        json!({
            "inPath": bundle.to_string_lossy(),
            "workspacePath": source_ws.to_string_lossy()
        }),
    );
    assert_eq!(code, "bad_params");

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "backup.import",
        json!({
            "inPath": bundle.to_string_lossy(),
            "workspacePath": restored_ws.to_string_lossy()
        }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("schoolbook-workspace-v1")
    );

    // The restored workspace carries the same data.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "workspace.select",
        json!({ "path": restored_ws.to_string_lossy() }),
    );
    let students = request_ok(&mut stdin, &mut reader, "9", "students.list", json!({}));
    let names: Vec<&str> = students
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .filter_map(|s| s.get("name").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(names, vec!["Ada Obi"]);

    let tabs = request_ok(&mut stdin, &mut reader, "10", "tabs.list", json!({}));
    let tab_names: Vec<&str> = tabs
        .get("tabs")
        .and_then(|v| v.as_array())
        .expect("tabs")
        .iter()
        .filter_map(|t| t.get("name").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(tab_names, vec!["Uniform Fees"]);
}
