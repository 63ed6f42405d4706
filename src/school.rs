use std::collections::HashMap;

use rusqlite::Connection;

/// Fixed class roster, in display order.
pub const CLASS_LIST: [&str; 10] = [
    "CRECHE", "KG 1", "KG 2", "NURS 1", "NURS 2", "PRY 1", "PRY 2", "PRY 3", "PRY 4", "PRY 5",
];

const DEFAULT_TUITION: [(&str, f64); 10] = [
    ("CRECHE", 14000.0),
    ("KG 1", 21000.0),
    ("KG 2", 21000.0),
    ("NURS 1", 24000.0),
    ("NURS 2", 24000.0),
    ("PRY 1", 27000.0),
    ("PRY 2", 27000.0),
    ("PRY 3", 27000.0),
    ("PRY 4", 27000.0),
    ("PRY 5", 27000.0),
];

pub fn is_known_class(name: &str) -> bool {
    CLASS_LIST.contains(&name)
}

/// Tuition per class: stored overrides merged over the built-in defaults,
/// so every roster class always resolves to an amount.
pub fn tuition_map(conn: &Connection) -> anyhow::Result<HashMap<String, f64>> {
    let mut out: HashMap<String, f64> = DEFAULT_TUITION
        .iter()
        .map(|(c, a)| (c.to_string(), *a))
        .collect();

    let mut stmt = conn.prepare("SELECT class, amount FROM tuition")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let class: String = row.get(0)?;
        let amount: f64 = row.get(1)?;
        out.insert(class, amount);
    }
    Ok(out)
}

/// Payment status from the scholarship flag and the paid-vs-due amounts.
/// The scholarship flag always wins.
pub fn payment_status(is_scholarship: bool, amount: f64, amount_paid: f64) -> &'static str {
    if is_scholarship {
        "scholarship"
    } else if amount_paid == amount && amount > 0.0 {
        "paid"
    } else if amount_paid > 0.0 {
        "partial"
    } else {
        "unpaid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_resolution_order() {
        assert_eq!(payment_status(true, 1000.0, 1000.0), "scholarship");
        assert_eq!(payment_status(false, 1000.0, 1000.0), "paid");
        assert_eq!(payment_status(false, 1000.0, 400.0), "partial");
        assert_eq!(payment_status(false, 1000.0, 0.0), "unpaid");
    }
}
