use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::school;
use crate::tabs::{
    reconcile, CustomTable, Preset, Row, SqliteTabStore, StudentSeed, TabError, TabSet, TabStore,
};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::students::display_name;

fn tab_error(id: &str, e: &TabError) -> serde_json::Value {
    let code = match e {
        TabError::EmptyName
        | TabError::DuplicateName(_)
        | TabError::NoColumns
        | TabError::DuplicateColumn(_)
        | TabError::ColumnNotEditable(_)
        | TabError::NotANumber(_)
        | TabError::UnsupportedValue
        | TabError::BlankRowOnPaymentTab
        | TabError::NotAPaymentTab(_) => "bad_params",
        TabError::UnknownTab(_) | TabError::UnknownColumn { .. } | TabError::RowOutOfRange { .. } => {
            "not_found"
        }
        TabError::Persist { .. } => "persist_failed",
    };
    err(id, code, e.to_string(), None)
}

fn tab_json(table: &CustomTable) -> serde_json::Value {
    serde_json::to_value(table).unwrap_or_else(|_| json!(null))
}

/// Pushes the whole in-memory tab list through the store and swaps in the
/// canonical result. On failure the optimistic in-memory edit stays; the
/// caller reports the error and the next successful operation re-syncs.
fn persist_tabs(conn: &Connection, tabs: &mut TabSet) -> Result<(), TabError> {
    let mut store = SqliteTabStore::new(conn);
    let merged = reconcile(&mut store, tabs.tables())?;
    tabs.replace_tables(merged);
    Ok(())
}

fn name_param<'a>(req: &'a Request) -> Result<&'a str, serde_json::Value> {
    match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => Ok(v),
        None => Err(err(&req.id, "bad_params", "missing name", None)),
    }
}

fn row_index_param(req: &Request) -> Result<usize, serde_json::Value> {
    match req.params.get("rowIndex").and_then(|v| v.as_u64()) {
        Some(v) => Ok(v as usize),
        None => Err(err(&req.id, "bad_params", "missing rowIndex", None)),
    }
}

fn handle_tabs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let tabs: Vec<serde_json::Value> = state.tabs.tables().iter().map(tab_json).collect();
    ok(
        &req.id,
        json!({ "tabs": tabs, "active": state.tabs.active() }),
    )
}

fn handle_tabs_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    state.tabs.select(name);
    ok(&req.id, json!({ "active": state.tabs.active() }))
}

fn handle_tabs_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let preset = match req.params.get("preset") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) if s == "payment" => Some(Preset::Payment),
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                "preset must be \"payment\" or null",
                Some(json!({ "preset": other })),
            )
        }
    };
    let columns_spec = req
        .params
        .get("columns")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    if let Err(e) = state.tabs.create_table(&name, preset, columns_spec) {
        return tab_error(&req.id, &e);
    }
    if let Err(e) = persist_tabs(conn, &mut state.tabs) {
        return tab_error(&req.id, &e);
    }

    let tab = state.tabs.get(name.trim()).map(tab_json);
    ok(&req.id, json!({ "tab": tab, "active": state.tabs.active() }))
}

fn handle_tabs_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let old_name = match req.params.get("oldName").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing oldName", None),
    };
    let new_name = req
        .params
        .get("newName")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match state.tabs.rename_table(&old_name, new_name) {
        Ok(false) => ok(&req.id, json!({ "renamed": false, "active": state.tabs.active() })),
        Ok(true) => {
            if let Err(e) = persist_tabs(conn, &mut state.tabs) {
                return tab_error(&req.id, &e);
            }
            ok(&req.id, json!({ "renamed": true, "active": state.tabs.active() }))
        }
        Err(e) => tab_error(&req.id, &e),
    }
}

fn handle_tabs_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    if state.tabs.get(&name).is_none() {
        return err(&req.id, "not_found", format!("no tab named {name:?}"), None);
    }

    // The destructive store call goes first; the tab leaves memory only
    // once the store confirms, so a failed delete never strands the UI
    // with state the backend still has.
    let mut store = SqliteTabStore::new(conn);
    if let Err(e) = store.delete_by_name(&name) {
        tracing::warn!(tab = %name, error = %e, "tab delete failed");
        return err(&req.id, "db_delete_failed", format!("{e:#}"), None);
    }
    if let Err(e) = state.tabs.remove_table(&name) {
        return tab_error(&req.id, &e);
    }

    ok(&req.id, json!({ "deleted": true, "active": state.tabs.active() }))
}

fn handle_tabs_update_columns(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let columns: Vec<String> = match req.params.get("columns").and_then(|v| v.as_array()) {
        Some(list) => list
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        None => return err(&req.id, "bad_params", "missing columns", None),
    };

    if let Err(e) = state.tabs.update_columns(&name, &columns) {
        return tab_error(&req.id, &e);
    }
    if let Err(e) = persist_tabs(conn, &mut state.tabs) {
        return tab_error(&req.id, &e);
    }
    ok(&req.id, json!({ "tab": state.tabs.get(&name).map(tab_json) }))
}

fn handle_tabs_add_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let student_ids: Vec<i64> = match req.params.get("studentIds").and_then(|v| v.as_array()) {
        Some(list) => {
            let ids: Vec<i64> = list.iter().filter_map(|v| v.as_i64()).collect();
            if ids.len() != list.len() {
                return err(&req.id, "bad_params", "studentIds must be numbers", None);
            }
            ids
        }
        None => return err(&req.id, "bad_params", "missing studentIds", None),
    };

    // Resolve one by one so the rows land in the caller's order.
    let mut seeds = Vec::with_capacity(student_ids.len());
    for student_id in &student_ids {
        let found: Option<(String, String, String)> = match conn
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
        let Some((first, last, class)) = found else {
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": student_id })),
            );
        };
        seeds.push(StudentSeed {
            name: display_name(&first, &last),
            class,
        });
    }

    let tuition = match school::tuition_map(conn) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };

    let added = match state.tabs.add_students(&name, &seeds, &tuition) {
        Ok(n) => n,
        Err(e) => return tab_error(&req.id, &e),
    };
    if let Err(e) = persist_tabs(conn, &mut state.tabs) {
        return tab_error(&req.id, &e);
    }
    ok(
        &req.id,
        json!({ "added": added, "tab": state.tabs.get(&name).map(tab_json) }),
    )
}

fn handle_tabs_add_row(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };

    if let Err(e) = state.tabs.add_blank_row(&name) {
        return tab_error(&req.id, &e);
    }
    if let Err(e) = persist_tabs(conn, &mut state.tabs) {
        return tab_error(&req.id, &e);
    }
    ok(&req.id, json!({ "tab": state.tabs.get(&name).map(tab_json) }))
}

fn handle_tabs_delete_row(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let row_index = match row_index_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = state.tabs.delete_row(&name, row_index) {
        return tab_error(&req.id, &e);
    }
    if let Err(e) = persist_tabs(conn, &mut state.tabs) {
        return tab_error(&req.id, &e);
    }
    ok(&req.id, json!({ "tab": state.tabs.get(&name).map(tab_json) }))
}

fn handle_tabs_edit_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let row_index = match row_index_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let column = match req.params.get("column").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing column", None),
    };
    let value = req.params.get("value").cloned().unwrap_or(serde_json::Value::Null);

    if let Err(e) = state.tabs.edit_cell(&name, row_index, &column, &value) {
        return tab_error(&req.id, &e);
    }
    if let Err(e) = persist_tabs(conn, &mut state.tabs) {
        return tab_error(&req.id, &e);
    }
    ok(&req.id, json!({ "tab": state.tabs.get(&name).map(tab_json) }))
}

fn handle_tabs_edit_row(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    let row_index = match row_index_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let row: Row = match req.params.get("row") {
        Some(v) if v.is_object() => match serde_json::from_value(v.clone()) {
            Ok(r) => r,
            Err(e) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("bad row payload: {}", e),
                    None,
                )
            }
        },
        _ => return err(&req.id, "bad_params", "missing row", None),
    };

    if let Err(e) = state.tabs.edit_row(&name, row_index, row) {
        return tab_error(&req.id, &e);
    }
    if let Err(e) = persist_tabs(conn, &mut state.tabs) {
        return tab_error(&req.id, &e);
    }
    ok(&req.id, json!({ "tab": state.tabs.get(&name).map(tab_json) }))
}

fn handle_tabs_set_amount_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match name_param(req) {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };
    // The bulk-amount box submits text; numeric strings are accepted,
    // anything else is rejected like a cell edit would be.
    let value = match req.params.get("value") {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let Some(value) = value else {
        return err(&req.id, "bad_params", "value must be a number", None);
    };

    let updated = match state.tabs.set_amount_all(&name, value) {
        Ok(n) => n,
        Err(e) => return tab_error(&req.id, &e),
    };
    if let Err(e) = persist_tabs(conn, &mut state.tabs) {
        return tab_error(&req.id, &e);
    }
    ok(
        &req.id,
        json!({ "rowsUpdated": updated, "tab": state.tabs.get(&name).map(tab_json) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tabs.list" => Some(handle_tabs_list(state, req)),
        "tabs.select" => Some(handle_tabs_select(state, req)),
        "tabs.create" => Some(handle_tabs_create(state, req)),
        "tabs.rename" => Some(handle_tabs_rename(state, req)),
        "tabs.delete" => Some(handle_tabs_delete(state, req)),
        "tabs.updateColumns" => Some(handle_tabs_update_columns(state, req)),
        "tabs.addStudents" => Some(handle_tabs_add_students(state, req)),
        "tabs.addRow" => Some(handle_tabs_add_row(state, req)),
        "tabs.deleteRow" => Some(handle_tabs_delete_row(state, req)),
        "tabs.editCell" => Some(handle_tabs_edit_cell(state, req)),
        "tabs.editRow" => Some(handle_tabs_edit_row(state, req)),
        "tabs.setAmountAll" => Some(handle_tabs_set_amount_all(state, req)),
        _ => None,
    }
}
