use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::money::balance_of;
use crate::school;
use rusqlite::Connection;
use serde_json::json;

struct PaymentFacts {
    class: String,
    student_name: String,
    amount: f64,
    amount_paid: f64,
    status: String,
    is_scholarship: bool,
}

fn load_payment_facts(conn: &Connection) -> rusqlite::Result<Vec<PaymentFacts>> {
    let mut stmt = conn.prepare(
        "SELECT class, student_name, amount, amount_paid, status, is_scholarship
         FROM payments
         ORDER BY class, student_name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(PaymentFacts {
            class: row.get(0)?,
            student_name: row.get(1)?,
            amount: row.get(2)?,
            amount_paid: row.get(3)?,
            status: row.get(4)?,
            is_scholarship: row.get::<_, i64>(5)? != 0,
        })
    })?;
    rows.collect()
}

/// Debtors grouped by roster class: anyone not fully paid with a positive
/// outstanding balance.
fn handle_debtors_by_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let facts = match load_payment_facts(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut by_class = serde_json::Map::new();
    for cls in school::CLASS_LIST {
        by_class.insert(cls.to_string(), json!([]));
    }
    for p in &facts {
        let debt = balance_of(p.amount, p.amount_paid);
        if p.status != "paid" && debt > 0.0 {
            if let Some(list) = by_class.get_mut(&p.class).and_then(|v| v.as_array_mut()) {
                list.push(json!({ "name": p.student_name, "debt": debt }));
            }
        }
    }

    ok(&req.id, json!({ "debtors": by_class }))
}

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let facts = match load_payment_facts(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut class_counts = serde_json::Map::new();
    for cls in school::CLASS_LIST {
        let count: i64 = match conn.query_row(
            "SELECT COUNT(*) FROM students WHERE class = ?",
            [cls],
            |r| r.get(0),
        ) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        class_counts.insert(cls.to_string(), json!(count));
    }

    let student_count: i64 = match conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let scholarship_count = facts.iter().filter(|p| p.is_scholarship).count();
    let debtor_count = facts
        .iter()
        .filter(|p| p.status != "paid" && balance_of(p.amount, p.amount_paid) > 0.0)
        .count();

    // Scholarships owe nothing, so they stay out of the revenue totals.
    let billed: Vec<&PaymentFacts> = facts.iter().filter(|p| !p.is_scholarship).collect();
    let expected: f64 = billed.iter().map(|p| p.amount).sum();
    let collected: f64 = billed.iter().map(|p| p.amount_paid).sum();
    let outstanding: f64 = billed
        .iter()
        .map(|p| balance_of(p.amount, p.amount_paid))
        .sum();

    ok(
        &req.id,
        json!({
            "studentCount": student_count,
            "scholarshipCount": scholarship_count,
            "debtorCount": debtor_count,
            "classCounts": class_counts,
            "expectedTotal": expected,
            "collectedTotal": collected,
            "outstandingTotal": outstanding
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "debtors.byClass" => Some(handle_debtors_by_class(state, req)),
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        _ => None,
    }
}
