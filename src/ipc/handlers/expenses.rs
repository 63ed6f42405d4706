use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const TERMS: [&str; 3] = ["first", "second", "third"];

fn term_param(req: &Request) -> Result<String, serde_json::Value> {
    match req.params.get("term").and_then(|v| v.as_str()) {
        Some(t) if TERMS.contains(&t) => Ok(t.to_string()),
        Some(t) => Err(err(
            &req.id,
            "bad_params",
            "term must be one of: first, second, third",
            Some(json!({ "term": t })),
        )),
        None => Err(err(&req.id, "bad_params", "missing term", None)),
    }
}

fn handle_expenses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "expenses": [] }));
    };
    let term = match term_param(req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT id, category, amount, note FROM expenses WHERE term = ? ORDER BY id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&term], |row| {
            let id: i64 = row.get(0)?;
            let category: String = row.get(1)?;
            let amount: f64 = row.get(2)?;
            let note: String = row.get(3)?;
            Ok(json!({ "id": id, "category": category, "amount": amount, "note": note }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(expenses) => ok(&req.id, json!({ "term": term, "expenses": expenses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn expense_fields(req: &Request) -> Result<(String, f64, String), serde_json::Value> {
    let category = req
        .params
        .get("category")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    if category.is_empty() {
        return Err(err(&req.id, "bad_params", "category must not be empty", None));
    }
    let amount = match req.params.get("amount").and_then(|v| v.as_f64()) {
        Some(v) => v,
        None => return Err(err(&req.id, "bad_params", "amount must be a number", None)),
    };
    let note = req
        .params
        .get("note")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    Ok((category, amount, note))
}

fn handle_expenses_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let term = match term_param(req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let (category, amount, note) = match expense_fields(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = conn.execute(
        "INSERT INTO expenses(term, category, amount, note) VALUES(?, ?, ?, ?)",
        (&term, &category, amount, &note),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "expenses" })),
        );
    }
    ok(
        &req.id,
        json!({
            "id": conn.last_insert_rowid(),
            "term": term,
            "category": category,
            "amount": amount,
            "note": note
        }),
    )
}

fn handle_expenses_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let expense_id = match req.params.get("id").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing id", None),
    };
    let (category, amount, note) = match expense_fields(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let changed = conn.execute(
        "UPDATE expenses SET category = ?, amount = ?, note = ? WHERE id = ?",
        (&category, amount, &note, expense_id),
    );
    match changed {
        Ok(0) => err(&req.id, "not_found", "expense not found", None),
        Ok(_) => ok(
            &req.id,
            json!({ "id": expense_id, "category": category, "amount": amount, "note": note }),
        ),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_expenses_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let expense_id = match req.params.get("id").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing id", None),
    };

    match conn.execute("DELETE FROM expenses WHERE id = ?", [expense_id]) {
        Ok(0) => err(&req.id, "not_found", "expense not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "expenses.list" => Some(handle_expenses_list(state, req)),
        "expenses.add" => Some(handle_expenses_add(state, req)),
        "expenses.update" => Some(handle_expenses_update(state, req)),
        "expenses.delete" => Some(handle_expenses_delete(state, req)),
        _ => None,
    }
}
