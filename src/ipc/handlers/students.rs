use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::school;
use rusqlite::OptionalExtension;
use serde_json::json;

pub fn display_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT id, first_name, last_name, age, class, parent_name, parent_phone, parent_email
         FROM students
         ORDER BY class, first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let first_name: String = row.get(1)?;
            let last_name: String = row.get(2)?;
            let age: Option<i64> = row.get(3)?;
            let class: String = row.get(4)?;
            let parent_name: Option<String> = row.get(5)?;
            let parent_phone: Option<String> = row.get(6)?;
            let parent_email: Option<String> = row.get(7)?;
            Ok(json!({
                "id": id,
                "firstName": first_name,
                "lastName": last_name,
                "name": display_name(&first_name, &last_name),
                "age": age,
                "class": class,
                "parentName": parent_name,
                "parentPhone": parent_phone,
                "parentEmail": parent_email
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let first_name = req
        .params
        .get("firstName")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let last_name = req
        .params
        .get("lastName")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    if first_name.is_empty() && last_name.is_empty() {
        return err(&req.id, "bad_params", "student name must not be empty", None);
    }

    let class = match req.params.get("class").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing class", None),
    };
    if !school::is_known_class(&class) {
        return err(
            &req.id,
            "bad_params",
            format!("unknown class: {}", class),
            Some(json!({ "class": class })),
        );
    }

    let age = req.params.get("age").and_then(|v| v.as_i64());
    let parent_name = req.params.get("parentName").and_then(|v| v.as_str());
    let parent_phone = req.params.get("parentPhone").and_then(|v| v.as_str());
    let parent_email = req.params.get("parentEmail").and_then(|v| v.as_str());
    let name = display_name(&first_name, &last_name);

    if let Some(student_id) = req.params.get("id").and_then(|v| v.as_i64()) {
        let changed = conn.execute(
            "UPDATE students
             SET first_name = ?, last_name = ?, age = ?, class = ?,
                 parent_name = ?, parent_phone = ?, parent_email = ?
             WHERE id = ?",
            (
                &first_name,
                &last_name,
                age,
                &class,
                parent_name,
                parent_phone,
                parent_email,
                student_id,
            ),
        );
        match changed {
            Ok(0) => err(&req.id, "not_found", "student not found", None),
            Ok(_) => ok(
                &req.id,
                json!({ "studentId": student_id, "name": name, "class": class }),
            ),
            Err(e) => err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            ),
        }
    } else {
        let created_at = chrono::Local::now().format("%Y-%m-%d").to_string();
        if let Err(e) = conn.execute(
            "INSERT INTO students(first_name, last_name, age, class,
                                  parent_name, parent_phone, parent_email, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &first_name,
                &last_name,
                age,
                &class,
                parent_name,
                parent_phone,
                parent_email,
                &created_at,
            ),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            );
        }
        let student_id = conn.last_insert_rowid();

        // A new student always gets a tuition payment row at the class
        // rate, unpaid.
        let tuition = match school::tuition_map(conn) {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
        };
        let amount = tuition.get(&class).copied().unwrap_or(0.0);
        if let Err(e) = conn.execute(
            "INSERT INTO payments(student_id, student_name, class, amount, amount_paid, status, payment_date, is_scholarship)
             VALUES(?, ?, ?, ?, 0, 'unpaid', NULL, 0)
             ON CONFLICT(student_id) DO UPDATE SET
               student_name = excluded.student_name,
               class = excluded.class,
               amount = excluded.amount",
            (student_id, &name, &class, amount),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "payments" })),
            );
        }

        ok(
            &req.id,
            json!({
                "studentId": student_id,
                "name": name,
                "class": class,
                "paymentAmount": amount
            }),
        )
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let student_id = match req.params.get("id").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing id", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    for (table, sql) in [
        ("party", "DELETE FROM party WHERE student_id = ?"),
        ("books", "DELETE FROM books WHERE student_id = ?"),
        ("payments", "DELETE FROM payments WHERE student_id = ?"),
        ("students", "DELETE FROM students WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [student_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.upsert" => Some(handle_students_upsert(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
