use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const COL_STUDENT_NAME: &str = "Student Name";
pub const COL_AMOUNT: &str = "Amount";
pub const COL_DEPOSIT: &str = "Deposit";
pub const COL_BALANCE: &str = "Balance";
pub const COL_DATE_PAID: &str = "DatePaid";
pub const COL_NOTE: &str = "Note";

/// The payment preset always uses exactly these columns, in this order,
/// regardless of what the caller supplied.
pub const PAYMENT_COLUMNS: [&str; 6] = [
    COL_STUDENT_NAME,
    COL_AMOUNT,
    COL_DEPOSIT,
    COL_BALANCE,
    COL_DATE_PAID,
    COL_NOTE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Payment,
}

impl Preset {
    pub fn from_db(s: Option<&str>) -> Option<Preset> {
        match s {
            Some("payment") => Some(Preset::Payment),
            _ => None,
        }
    }

    pub fn as_db(preset: Option<Preset>) -> Option<&'static str> {
        preset.map(|p| match p {
            Preset::Payment => "payment",
        })
    }
}

/// A single cell. Rows are schema-less, so a cell is either text or a
/// number; which one it is depends on how the value arrived, not on the
/// column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn empty() -> CellValue {
        CellValue::Text(String::new())
    }

    pub fn text(s: impl Into<String>) -> CellValue {
        CellValue::Text(s.into())
    }

    /// Lenient numeric read used for balance recomputation: numbers pass
    /// through, blank or missing parses as zero, unparsable text counts as
    /// zero. Strictness lives at the edit boundary, not here.
    pub fn coerce_number(&self) -> f64 {
        match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        }
    }
}

/// An ordered column-name → value mapping. Key order is the order the
/// entries were written, independent of the table's column list; a row's
/// keys are expected to be a subset of the table's columns, but rows that
/// predate a column change may carry orphaned keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Vec<(String, CellValue)>);

impl Row {
    pub fn new() -> Row {
        Row(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Replaces an existing entry in place; appends otherwise.
    pub fn set(&mut self, key: &str, value: CellValue) {
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.0.push((key.to_string(), value));
        }
    }

    pub fn number_or_zero(&self, key: &str) -> f64 {
        self.get(key).map(CellValue::coerce_number).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, CellValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, CellValue)>>(iter: T) -> Row {
        Row(iter.into_iter().collect())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Row, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a map of column names to cell values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, CellValue>()? {
                    entries.push((key, value));
                }
                Ok(Row(entries))
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// A user-defined tab: named, with an ordered column list and free-form
/// rows. `id` is assigned by the store on first successful insert and is
/// absent for tables created this session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub preset: Option<Preset>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl CustomTable {
    pub fn is_payment(&self) -> bool {
        self.preset == Some(Preset::Payment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_values_round_trip_untagged() {
        let n: CellValue = serde_json::from_str("27000").expect("number");
        assert_eq!(n, CellValue::Number(27000.0));
        let t: CellValue = serde_json::from_str("\"PRY 1\"").expect("text");
        assert_eq!(t, CellValue::text("PRY 1"));
        assert_eq!(serde_json::to_string(&n).expect("ser"), "27000.0");
    }

    #[test]
    fn row_preserves_insertion_order() {
        let mut row = Row::new();
        row.set("Item", CellValue::text("Chairs"));
        row.set("Cost", CellValue::Number(1500.0));
        row.set("Item", CellValue::text("Tables"));

        let keys: Vec<&str> = row.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Item", "Cost"]);
        assert_eq!(row.get("Item"), Some(&CellValue::text("Tables")));
    }

    #[test]
    fn row_json_round_trip_keeps_order() {
        let json = r#"{"Student Name":"Ada","Amount":27000,"Deposit":0}"#;
        let row: Row = serde_json::from_str(json).expect("row");
        let keys: Vec<&str> = row.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Student Name", "Amount", "Deposit"]);
        let back = serde_json::to_string(&row).expect("ser");
        assert!(back.starts_with("{\"Student Name\":\"Ada\""), "got {back}");
    }

    #[test]
    fn lenient_numeric_reads() {
        assert_eq!(CellValue::Number(10.0).coerce_number(), 10.0);
        assert_eq!(CellValue::text("250").coerce_number(), 250.0);
        assert_eq!(CellValue::text("").coerce_number(), 0.0);
        assert_eq!(CellValue::text("n/a").coerce_number(), 0.0);
    }
}
