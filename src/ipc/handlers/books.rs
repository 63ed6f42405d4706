use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::money::balance_of;
use rusqlite::OptionalExtension;
use serde_json::json;

use super::students::display_name;

fn handle_books_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "books": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, student_id, student_name, class, type, amount, deposit, date, note
         FROM books
         ORDER BY class, student_name, type",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let student_id: i64 = row.get(1)?;
            let student_name: String = row.get(2)?;
            let class: String = row.get(3)?;
            let kind: String = row.get(4)?;
            let amount: f64 = row.get(5)?;
            let deposit: f64 = row.get(6)?;
            let date: String = row.get(7)?;
            let note: String = row.get(8)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "studentName": student_name,
                "class": class,
                "type": kind,
                "amount": amount,
                "deposit": deposit,
                "balance": balance_of(amount, deposit),
                "date": date,
                "note": note
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(books) => ok(&req.id, json!({ "books": books })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_books_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match req.params.get("studentId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let kind = match req.params.get("type").and_then(|v| v.as_str()) {
        Some(v) if v == "textbook" || v == "notebook" => v.to_string(),
        Some(v) => {
            return err(
                &req.id,
                "bad_params",
                "type must be textbook or notebook",
                Some(json!({ "type": v })),
            )
        }
        None => return err(&req.id, "bad_params", "missing type", None),
    };
    let amount = req.params.get("amount").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let deposit = req.params.get("deposit").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let note = req
        .params
        .get("note")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    // Blank dates default to the day of entry.
    let date = match req.params.get("date").and_then(|v| v.as_str()) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => chrono::Local::now().format("%Y-%m-%d").to_string(),
    };

    // Names ride along from the student record, never from the caller.
    let student: Option<(String, String, String)> = match conn
        .query_row(
            "SELECT first_name, last_name, class FROM students WHERE id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((first_name, last_name, class)) = student else {
        return err(&req.id, "not_found", "student not found", None);
    };
    let student_name = display_name(&first_name, &last_name);

    if let Err(e) = conn.execute(
        "INSERT INTO books(student_id, student_name, class, type, amount, deposit, date, note)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, type) DO UPDATE SET
           student_name = excluded.student_name,
           class = excluded.class,
           amount = excluded.amount,
           deposit = excluded.deposit,
           date = excluded.date,
           note = excluded.note",
        (
            student_id,
            &student_name,
            &class,
            &kind,
            amount,
            deposit,
            &date,
            &note,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "books" })),
        );
    }

    let row_id: i64 = match conn.query_row(
        "SELECT id FROM books WHERE student_id = ? AND type = ?",
        rusqlite::params![student_id, &kind],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "id": row_id,
            "studentId": student_id,
            "studentName": student_name,
            "class": class,
            "type": kind,
            "amount": amount,
            "deposit": deposit,
            "balance": balance_of(amount, deposit),
            "date": date,
            "note": note
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "books.list" => Some(handle_books_list(state, req)),
        "books.upsert" => Some(handle_books_upsert(state, req)),
        _ => None,
    }
}
