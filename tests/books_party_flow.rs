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

fn add_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    first: &str,
    last: &str,
    class: &str,
) -> i64 {
    let saved = request_ok(
        stdin,
        reader,
        id,
        "students.upsert",
        json!({ "firstName": first, "lastName": last, "class": class }),
    );
    saved.get("studentId").and_then(|v| v.as_i64()).expect("studentId")
}

#[test]
fn book_rows_upsert_by_student_and_kind() {
    let workspace = tempfile::TempDir::new().expect("temp workspace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let ada_id = add_student(&mut stdin, &mut reader, "2", "Ada", "Obi", "PRY 4");

    // First save: blank date defaults to today.
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "books.upsert",
        json!({ "studentId": ada_id, "type": "textbook", "amount": 8000, "deposit": 3000, "date": "" }),
    );
    assert_eq!(saved.get("studentName").and_then(|v| v.as_str()), Some("Ada Obi"));
    assert_eq!(saved.get("class").and_then(|v| v.as_str()), Some("PRY 4"));
    assert_eq!(saved.get("balance").and_then(|v| v.as_f64()), Some(5000.0));
    let date = saved.get("date").and_then(|v| v.as_str()).expect("date");
    assert!(!date.is_empty(), "date defaulted");

    // Same student and kind: the row is replaced, not duplicated.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "books.upsert",
        json!({ "studentId": ada_id, "type": "textbook", "amount": 8000, "deposit": 8000, "date": "2026-03-01" }),
    );
    // A different kind is its own row.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "books.upsert",
        json!({ "studentId": ada_id, "type": "notebook", "amount": 2500, "deposit": 0 }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "6", "books.list", json!({}));
    let books = listed.get("books").and_then(|v| v.as_array()).expect("books");
    assert_eq!(books.len(), 2);
    let textbook = books
        .iter()
        .find(|b| b.get("type").and_then(|v| v.as_str()) == Some("textbook"))
        .expect("textbook row");
    assert_eq!(textbook.get("deposit").and_then(|v| v.as_f64()), Some(8000.0));
    assert_eq!(textbook.get("balance").and_then(|v| v.as_f64()), Some(0.0));
    assert_eq!(textbook.get("date").and_then(|v| v.as_str()), Some("2026-03-01"));
}

#[test]
fn party_deposits_and_class_amounts() {
    let workspace = tempfile::TempDir::new().expect("temp workspace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.path().to_string_lossy() }),
    );
    let ada_id = add_student(&mut stdin, &mut reader, "2", "Ada", "Obi", "KG 1");
    let bola_id = add_student(&mut stdin, &mut reader, "3", "Bola", "Ade", "KG 1");
    let event = "End of Year Party";

    // Setting the class amount seeds a row for every student in the class.
    let set = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "party.setClassAmount",
        json!({ "eventType": event, "class": "KG 1", "amount": 3000 }),
    );
    assert_eq!(set.get("studentsUpdated").and_then(|v| v.as_i64()), Some(2));

    // A first deposit stamps today's date automatically.
    let deposit = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "party.setDeposit",
        json!({ "eventType": event, "studentId": ada_id, "deposit": 1500 }),
    );
    assert_eq!(deposit.get("amount").and_then(|v| v.as_f64()), Some(3000.0));
    let stamped = deposit
        .get("paymentDate")
        .and_then(|v| v.as_str())
        .expect("payment date stamped");
    assert!(!stamped.is_empty());

    // An explicit date write sticks.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "party.setDate",
        json!({ "eventType": event, "studentId": bola_id, "date": "2026-07-01" }),
    );
    // Re-setting the class amount must not clobber deposits or dates.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "party.setClassAmount",
        json!({ "eventType": event, "class": "KG 1", "amount": 3500 }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "party.open",
        json!({ "eventType": event }),
    );
    assert_eq!(
        opened.get("classAmounts").and_then(|c| c.get("KG 1")).and_then(|v| v.as_f64()),
        Some(3500.0)
    );
    let rows = opened.get("rows").and_then(|v| v.as_array()).expect("rows");
    let ada_row = rows
        .iter()
        .find(|r| r.get("studentId").and_then(|v| v.as_i64()) == Some(ada_id))
        .expect("ada row");
    assert_eq!(ada_row.get("deposit").and_then(|v| v.as_f64()), Some(1500.0));
    assert_eq!(ada_row.get("amount").and_then(|v| v.as_f64()), Some(3500.0));
    let bola_row = rows
        .iter()
        .find(|r| r.get("studentId").and_then(|v| v.as_i64()) == Some(bola_id))
        .expect("bola row");
    assert_eq!(
        bola_row.get("paymentDate").and_then(|v| v.as_str()),
        Some("2026-07-01")
    );

    // Another event type is a separate ledger.
    let other = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "party.open",
        json!({ "eventType": "Graduation" }),
    );
    assert_eq!(other.get("rows").and_then(|v| v.as_array()).map(Vec::len), Some(0));

    // The paid summary lists only paying students, grouped by class.
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "party.paidSummary",
        json!({ "eventType": event }),
    );
    let text = summary.get("text").and_then(|v| v.as_str()).expect("text");
    assert!(text.starts_with("KG 1"), "text: {text}");
    assert!(text.contains("Ada Obi"), "text: {text}");
    assert!(text.contains("₦1,500"), "text: {text}");
    assert!(!text.contains("Bola Ade"), "no deposit, no line: {text}");
}
