use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::money::format_naira;
use crate::school;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::students::display_name;

fn event_type_param(req: &Request) -> Result<String, serde_json::Value> {
    match req.params.get("eventType").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(err(&req.id, "bad_params", "missing eventType", None)),
    }
}

fn class_amount(conn: &Connection, class: &str, event_type: &str) -> rusqlite::Result<f64> {
    let amount: Option<f64> = conn
        .query_row(
            "SELECT amount FROM party_class_amounts WHERE class = ? AND event_type = ?",
            [class, event_type],
            |r| r.get(0),
        )
        .optional()?;
    Ok(amount.unwrap_or(0.0))
}

fn upsert_party_row(
    conn: &Connection,
    student_id: i64,
    student_name: &str,
    class: &str,
    event_type: &str,
    amount: f64,
    deposit: f64,
    payment_date: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO party(student_id, student_name, class, event_type, amount, deposit, payment_date)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, event_type) DO UPDATE SET
           student_name = excluded.student_name,
           class = excluded.class,
           amount = excluded.amount,
           deposit = excluded.deposit,
           payment_date = excluded.payment_date",
        rusqlite::params![
            student_id,
            student_name,
            class,
            event_type,
            amount,
            deposit,
            payment_date
        ],
    )?;
    Ok(())
}

struct PartyRow {
    deposit: f64,
    payment_date: Option<String>,
}

fn party_row(conn: &Connection, student_id: i64, event_type: &str) -> rusqlite::Result<Option<PartyRow>> {
    conn.query_row(
        "SELECT deposit, payment_date FROM party WHERE student_id = ? AND event_type = ?",
        rusqlite::params![student_id, event_type],
        |r| {
            Ok(PartyRow {
                deposit: r.get(0)?,
                payment_date: r.get(1)?,
            })
        },
    )
    .optional()
}

fn handle_party_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let event_type = match event_type_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut amounts = serde_json::Map::new();
    for cls in school::CLASS_LIST {
        match class_amount(conn, cls, &event_type) {
            Ok(a) => {
                amounts.insert(cls.to_string(), json!(a));
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let mut stmt = match conn.prepare(
        "SELECT student_id, student_name, class, amount, deposit, payment_date
         FROM party WHERE event_type = ?
         ORDER BY class, student_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&event_type], |row| {
            let student_id: i64 = row.get(0)?;
            let student_name: String = row.get(1)?;
            let class: String = row.get(2)?;
            let amount: f64 = row.get(3)?;
            let deposit: f64 = row.get(4)?;
            let payment_date: Option<String> = row.get(5)?;
            Ok(json!({
                "studentId": student_id,
                "studentName": student_name,
                "class": class,
                "amount": amount,
                "deposit": deposit,
                "paymentDate": payment_date
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(entries) => ok(
            &req.id,
            json!({ "eventType": event_type, "classAmounts": amounts, "rows": entries }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Setting a class amount fans out to every student of the class,
/// preserving whatever deposit and date each already has.
fn handle_party_set_class_amount(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let event_type = match event_type_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let class = match req.params.get("class").and_then(|v| v.as_str()) {
        Some(v) if school::is_known_class(v) => v.to_string(),
        Some(v) => return err(&req.id, "bad_params", format!("unknown class: {}", v), None),
        None => return err(&req.id, "bad_params", "missing class", None),
    };
    let amount = match req.params.get("amount").and_then(|v| v.as_f64()) {
        Some(v) if v >= 0.0 => v,
        _ => return err(&req.id, "bad_params", "amount must be a number >= 0", None),
    };

    if let Err(e) = conn.execute(
        "INSERT INTO party_class_amounts(class, event_type, amount) VALUES(?, ?, ?)
         ON CONFLICT(class, event_type) DO UPDATE SET amount = excluded.amount",
        rusqlite::params![&class, &event_type, amount],
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    let students: Result<Vec<(i64, String, String)>, _> = conn
        .prepare("SELECT id, first_name, last_name FROM students WHERE class = ?")
        .and_then(|mut stmt| {
            stmt.query_map([&class], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
                .and_then(|it| it.collect())
        });
    let students = match students {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    for (student_id, first_name, last_name) in &students {
        let existing = match party_row(conn, *student_id, &event_type) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        let (deposit, date) = existing
            .map(|r| (r.deposit, r.payment_date))
            .unwrap_or((0.0, None));
        if let Err(e) = upsert_party_row(
            conn,
            *student_id,
            &display_name(first_name, last_name),
            &class,
            &event_type,
            amount,
            deposit,
            date.as_deref(),
        ) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }

    ok(
        &req.id,
        json!({ "class": class, "amount": amount, "studentsUpdated": students.len() }),
    )
}

fn resolve_student(
    conn: &Connection,
    req: &Request,
) -> Result<(i64, String, String), serde_json::Value> {
    let student_id = match req.params.get("studentId").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return Err(err(&req.id, "bad_params", "missing studentId", None)),
    };
    let found: Option<(String, String, String)> = match conn
        .query_row(
            "SELECT first_name, last_name, class FROM students WHERE id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    };
    match found {
        Some((first, last, class)) => Ok((student_id, display_name(&first, &last), class)),
        None => Err(err(&req.id, "not_found", "student not found", None)),
    }
}

fn handle_party_set_deposit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let event_type = match event_type_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let deposit = match req.params.get("deposit").and_then(|v| v.as_f64()) {
        Some(v) if v >= 0.0 => v,
        _ => return err(&req.id, "bad_params", "deposit must be a number >= 0", None),
    };
    let (student_id, student_name, class) = match resolve_student(conn, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let existing = match party_row(conn, student_id, &event_type) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // A first deposit stamps today's date; an explicit date set earlier
    // stays put.
    let mut payment_date = existing.and_then(|r| r.payment_date).filter(|d| !d.is_empty());
    if deposit > 0.0 && payment_date.is_none() {
        payment_date = Some(chrono::Local::now().format("%Y-%m-%d").to_string());
    }

    let amount = match class_amount(conn, &class, &event_type) {
        Ok(a) => a,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Err(e) = upsert_party_row(
        conn,
        student_id,
        &student_name,
        &class,
        &event_type,
        amount,
        deposit,
        payment_date.as_deref(),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "deposit": deposit,
            "amount": amount,
            "paymentDate": payment_date
        }),
    )
}

fn handle_party_set_date(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let event_type = match event_type_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let date = req
        .params
        .get("date")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let (student_id, student_name, class) = match resolve_student(conn, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let deposit = match party_row(conn, student_id, &event_type) {
        Ok(v) => v.map(|r| r.deposit).unwrap_or(0.0),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let amount = match class_amount(conn, &class, &event_type) {
        Ok(a) => a,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let payment_date = if date.is_empty() { None } else { Some(date.as_str()) };
    if let Err(e) = upsert_party_row(
        conn,
        student_id,
        &student_name,
        &class,
        &event_type,
        amount,
        deposit,
        payment_date,
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "studentId": student_id, "paymentDate": payment_date }),
    )
}

/// Clipboard-ready roll call of everyone who has paid something, grouped
/// by class.
fn handle_party_paid_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let event_type = match event_type_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let rows: Result<Vec<(String, String, f64)>, _> = conn
        .prepare(
            "SELECT class, student_name, deposit FROM party
             WHERE event_type = ? AND deposit > 0
             ORDER BY student_name",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&event_type], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
                .and_then(|it| it.collect())
        });
    let rows = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut lines: Vec<String> = Vec::new();
    for cls in school::CLASS_LIST {
        let in_class: Vec<&(String, String, f64)> =
            rows.iter().filter(|(c, _, _)| c == cls).collect();
        if in_class.is_empty() {
            continue;
        }
        lines.push(cls.to_uppercase());
        for (_, name, deposit) in in_class {
            lines.push(format!("{} — {}", name, format_naira(*deposit)));
        }
        lines.push(String::new());
    }

    ok(
        &req.id,
        json!({ "eventType": event_type, "text": lines.join("\n") }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "party.open" => Some(handle_party_open(state, req)),
        "party.setClassAmount" => Some(handle_party_set_class_amount(state, req)),
        "party.setDeposit" => Some(handle_party_set_deposit(state, req)),
        "party.setDate" => Some(handle_party_set_date(state, req)),
        "party.paidSummary" => Some(handle_party_paid_summary(state, req)),
        _ => None,
    }
}
