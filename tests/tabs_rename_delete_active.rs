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
fn rename_follows_the_active_view() {
    let workspace = tempfile::TempDir::new().expect("temp workspace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "tabs.create",
        json!({ "name": "Trip Fund", "columns": "Item, Cost" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "tabs.addRow",
        json!({ "name": "Trip Fund" }),
    );

    // Creation made the tab active; renaming moves the pointer with it.
    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "tabs.rename",
        json!({ "oldName": "Trip Fund", "newName": "School Trip" }),
    );
    assert_eq!(renamed.get("renamed").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(renamed.get("active").and_then(|v| v.as_str()), Some("School Trip"));

    // Only the name changed; rows and columns are untouched.
    let listed = request_ok(&mut stdin, &mut reader, "5", "tabs.list", json!({}));
    let tab = listed.get("tabs").and_then(|v| v.get(0)).expect("tab");
    assert_eq!(tab.get("name").and_then(|v| v.as_str()), Some("School Trip"));
    assert_eq!(tab.get("columns").expect("columns"), &json!(["Item", "Cost"]));
    assert_eq!(tab.get("rows").and_then(|v| v.as_array()).map(Vec::len), Some(1));

    // Blank or unchanged targets are reported as no-ops.
    let noop = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "tabs.rename",
        json!({ "oldName": "School Trip", "newName": "  " }),
    );
    assert_eq!(noop.get("renamed").and_then(|v| v.as_bool()), Some(false));
    let noop = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "tabs.rename",
        json!({ "oldName": "School Trip", "newName": "School Trip" }),
    );
    assert_eq!(noop.get("renamed").and_then(|v| v.as_bool()), Some(false));

    // Renaming onto an existing tab name is rejected.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "tabs.create",
        json!({ "name": "Other", "columns": "X" }),
    );
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "9",
        "tabs.rename",
        json!({ "oldName": "Other", "newName": "School Trip" }),
    );
    assert_eq!(code, "bad_params");

    // The rename survives a reload.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "11", "tabs.list", json!({}));
    let names: Vec<&str> = listed
        .get("tabs")
        .and_then(|v| v.as_array())
        .expect("tabs")
        .iter()
        .filter_map(|t| t.get("name").and_then(|v| v.as_str()))
        .collect();
    assert!(names.contains(&"School Trip"), "names: {names:?}");
    assert!(names.contains(&"Other"), "names: {names:?}");
}

#[test]
fn delete_clears_the_active_view_and_the_store() {
    let workspace = tempfile::TempDir::new().expect("temp workspace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "tabs.create",
        json!({ "name": "Short Lived", "columns": "A" }),
    );

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "tabs.delete",
        json!({ "name": "Short Lived" }),
    );
    assert_eq!(deleted.get("deleted").and_then(|v| v.as_bool()), Some(true));
    assert!(deleted.get("active").map(|v| v.is_null()).unwrap_or(false));

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "4",
        "tabs.delete",
        json!({ "name": "Short Lived" }),
    );
    assert_eq!(code, "not_found");

    // Gone from the store too, not just from memory.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "6", "tabs.list", json!({}));
    assert_eq!(listed.get("tabs").and_then(|v| v.as_array()).map(Vec::len), Some(0));
}

#[test]
fn select_tracks_only_known_tabs() {
    let workspace = tempfile::TempDir::new().expect("temp workspace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "tabs.create",
        json!({ "name": "Known", "columns": "A" }),
    );

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "tabs.select",
        json!({ "name": "Known" }),
    );
    assert_eq!(selected.get("active").and_then(|v| v.as_str()), Some("Known"));

    // Navigating to a built-in screen clears the pointer.
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "tabs.select",
        json!({ "name": "Dashboard" }),
    );
    assert!(selected.get("active").map(|v| v.is_null()).unwrap_or(false));
}
