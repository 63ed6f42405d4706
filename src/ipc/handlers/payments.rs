use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::money::balance_of;
use crate::school;
use rusqlite::Connection;
use serde_json::json;

fn payment_rows(conn: &Connection) -> rusqlite::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, student_name, class, amount, amount_paid,
                status, payment_date, is_scholarship
         FROM payments
         ORDER BY class, student_name",
    )?;
    let rows = stmt.query_map([], |row| {
        let id: i64 = row.get(0)?;
        let student_id: i64 = row.get(1)?;
        let student_name: String = row.get(2)?;
        let class: String = row.get(3)?;
        let amount: f64 = row.get(4)?;
        let amount_paid: f64 = row.get(5)?;
        let status: String = row.get(6)?;
        let payment_date: Option<String> = row.get(7)?;
        let is_scholarship: bool = row.get::<_, i64>(8)? != 0;
        Ok(json!({
            "id": id,
            "studentId": student_id,
            "studentName": student_name,
            "class": class,
            "amount": amount,
            "amountPaid": amount_paid,
            "balance": balance_of(amount, amount_paid),
            "status": status,
            "paymentDate": payment_date,
            "isScholarship": is_scholarship
        }))
    })?;
    rows.collect()
}

fn handle_payments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "payments": [] }));
    };
    match payment_rows(conn) {
        Ok(payments) => ok(&req.id, json!({ "payments": payments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_payments_edit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let payment_id = match req.params.get("id").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing id", None),
    };
    let amount = match req.params.get("amount").and_then(|v| v.as_f64()) {
        Some(v) if v >= 0.0 => v,
        Some(_) => return err(&req.id, "bad_params", "amount must be >= 0", None),
        None => return err(&req.id, "bad_params", "missing amount", None),
    };
    let amount_paid = match req.params.get("amountPaid").and_then(|v| v.as_f64()) {
        Some(v) if v >= 0.0 => v,
        Some(_) => return err(&req.id, "bad_params", "amountPaid must be >= 0", None),
        None => return err(&req.id, "bad_params", "missing amountPaid", None),
    };
    let is_scholarship = req
        .params
        .get("isScholarship")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let payment_date = req
        .params
        .get("paymentDate")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty());

    // Status is never taken from the caller; it always derives from the
    // amounts and the scholarship flag.
    let status = school::payment_status(is_scholarship, amount, amount_paid);

    let changed = conn.execute(
        "UPDATE payments
         SET amount = ?, amount_paid = ?, status = ?, payment_date = ?, is_scholarship = ?
         WHERE id = ?",
        (
            amount,
            amount_paid,
            status,
            payment_date,
            is_scholarship as i64,
            payment_id,
        ),
    );
    match changed {
        Ok(0) => err(&req.id, "not_found", "payment not found", None),
        Ok(_) => ok(
            &req.id,
            json!({
                "id": payment_id,
                "amount": amount,
                "amountPaid": amount_paid,
                "balance": balance_of(amount, amount_paid),
                "status": status,
                "paymentDate": payment_date,
                "isScholarship": is_scholarship
            }),
        ),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "payments" })),
        ),
    }
}

fn handle_payments_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Scholarships are untouched; everyone else starts the term over.
    let reset = conn.execute(
        "UPDATE payments
         SET amount_paid = 0, payment_date = NULL, status = 'unpaid'
         WHERE is_scholarship = 0",
        [],
    );
    match reset {
        Ok(n) => ok(&req.id, json!({ "resetCount": n })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_tuition_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match school::tuition_map(conn) {
        Ok(map) => {
            // Emit in roster order so the dashboard renders stably.
            let mut out = serde_json::Map::new();
            for cls in school::CLASS_LIST {
                out.insert(cls.to_string(), json!(map.get(cls).copied().unwrap_or(0.0)));
            }
            ok(&req.id, json!({ "tuition": out }))
        }
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_tuition_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class = match req.params.get("class").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing class", None),
    };
    if !school::is_known_class(&class) {
        return err(&req.id, "bad_params", format!("unknown class: {}", class), None);
    }
    let amount = match req.params.get("amount").and_then(|v| v.as_f64()) {
        Some(v) if v >= 0.0 => v,
        _ => return err(&req.id, "bad_params", "amount must be a number >= 0", None),
    };

    if let Err(e) = conn.execute(
        "INSERT INTO tuition(class, amount) VALUES(?, ?)
         ON CONFLICT(class) DO UPDATE SET amount = excluded.amount",
        (&class, amount),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "tuition" })),
        );
    }

    // A tuition change ripples into every payment row of the class: the
    // amount due moves and the status is re-derived per row.
    let rippled = conn.execute(
        "UPDATE payments
         SET amount = ?1,
             status = CASE
               WHEN is_scholarship = 1 THEN 'scholarship'
               WHEN amount_paid = ?1 AND ?1 > 0 THEN 'paid'
               WHEN amount_paid > 0 THEN 'partial'
               ELSE 'unpaid'
             END
         WHERE class = ?2",
        rusqlite::params![amount, &class],
    );
    match rippled {
        Ok(n) => ok(
            &req.id,
            json!({ "class": class, "amount": amount, "paymentsUpdated": n }),
        ),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "payments" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.list" => Some(handle_payments_list(state, req)),
        "payments.edit" => Some(handle_payments_edit(state, req)),
        "payments.reset" => Some(handle_payments_reset(state, req)),
        "tuition.get" => Some(handle_tuition_get(state, req)),
        "tuition.set" => Some(handle_tuition_set(state, req)),
        _ => None,
    }
}
