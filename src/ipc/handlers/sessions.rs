use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_sessions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "sessions": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, term, year, open_date, close_date, holiday_weeks
         FROM sessions
         ORDER BY year, term",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let term: String = row.get(1)?;
            let year: String = row.get(2)?;
            let open_date: Option<String> = row.get(3)?;
            let close_date: Option<String> = row.get(4)?;
            let holiday_weeks: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "term": term,
                "year": year,
                "openDate": open_date,
                "closeDate": close_date,
                "holidayWeeks": holiday_weeks
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(sessions) => ok(&req.id, json!({ "sessions": sessions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_sessions_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let term = match req.params.get("term").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing term", None),
    };
    let year = req
        .params
        .get("year")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    // Blank dates are stored as NULL, not empty text.
    let open_date = req
        .params
        .get("openDate")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty());
    let close_date = req
        .params
        .get("closeDate")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty());
    let holiday_weeks = req
        .params
        .get("holidayWeeks")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);

    if let Some(session_id) = req.params.get("id").and_then(|v| v.as_i64()) {
        let changed = conn.execute(
            "UPDATE sessions
             SET term = ?, year = ?, open_date = ?, close_date = ?, holiday_weeks = ?
             WHERE id = ?",
            (&term, &year, open_date, close_date, holiday_weeks, session_id),
        );
        match changed {
            Ok(0) => err(&req.id, "not_found", "session not found", None),
            Ok(_) => ok(&req.id, json!({ "sessionId": session_id })),
            Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
        }
    } else {
        match conn.execute(
            "INSERT INTO sessions(term, year, open_date, close_date, holiday_weeks)
             VALUES(?, ?, ?, ?, ?)",
            (&term, &year, open_date, close_date, holiday_weeks),
        ) {
            Ok(_) => ok(&req.id, json!({ "sessionId": conn.last_insert_rowid() })),
            Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.list" => Some(handle_sessions_list(state, req)),
        "sessions.upsert" => Some(handle_sessions_upsert(state, req)),
        _ => None,
    }
}
