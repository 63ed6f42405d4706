use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use super::model::{
    CellValue, CustomTable, Preset, Row, COL_AMOUNT, COL_BALANCE, COL_DATE_PAID, COL_DEPOSIT,
    COL_NOTE, COL_STUDENT_NAME, PAYMENT_COLUMNS,
};
use crate::money::balance_of;

#[derive(Debug, Error)]
pub enum TabError {
    #[error("tab name must not be empty")]
    EmptyName,
    #[error("a tab named {0:?} already exists")]
    DuplicateName(String),
    #[error("no columns given for the tab")]
    NoColumns,
    #[error("duplicate column {0:?}")]
    DuplicateColumn(String),
    #[error("no tab named {0:?}")]
    UnknownTab(String),
    #[error("tab {tab:?} has no column {column:?}")]
    UnknownColumn { tab: String, column: String },
    #[error("row {index} is out of range (tab has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },
    #[error("column {0:?} is derived and cannot be edited directly")]
    ColumnNotEditable(String),
    #[error("{0:?} is not a number")]
    NotANumber(String),
    #[error("cell values must be text or numbers")]
    UnsupportedValue,
    #[error("payment tabs grow by adding students, not blank rows")]
    BlankRowOnPaymentTab,
    #[error("tab {0:?} is not a payment tab")]
    NotAPaymentTab(String),
    #[error("failed to persist {failed} of {total} tabs: {first_error}")]
    Persist {
        failed: usize,
        total: usize,
        first_error: String,
    },
}

/// A student being imported into a tab, resolved by the caller from the
/// students collection.
#[derive(Debug, Clone)]
pub struct StudentSeed {
    pub name: String,
    pub class: String,
}

/// Splits a free-text column list: comma-separated, trimmed, empties
/// dropped.
pub fn parse_column_spec(spec: &str) -> Vec<String> {
    spec.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn check_unique_columns(columns: &[String]) -> Result<(), TabError> {
    for (i, col) in columns.iter().enumerate() {
        if columns[..i].contains(col) {
            return Err(TabError::DuplicateColumn(col.clone()));
        }
    }
    Ok(())
}

/// Strict numeric coercion applied at the edit boundary of payment
/// numeric columns: empty means "cleared, zero"; anything unparsable is
/// rejected rather than silently zeroed.
fn coerce_payment_number(raw: &Value) -> Result<f64, TabError> {
    match raw {
        Value::Null => Ok(0.0),
        Value::Number(n) => n.as_f64().ok_or(TabError::UnsupportedValue),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(0.0)
            } else {
                trimmed
                    .parse::<f64>()
                    .map_err(|_| TabError::NotANumber(s.clone()))
            }
        }
        _ => Err(TabError::UnsupportedValue),
    }
}

fn cell_from_value(raw: &Value) -> Result<CellValue, TabError> {
    match raw {
        Value::Null => Ok(CellValue::empty()),
        Value::String(s) => Ok(CellValue::text(s.clone())),
        Value::Number(n) => n
            .as_f64()
            .map(CellValue::Number)
            .ok_or(TabError::UnsupportedValue),
        _ => Err(TabError::UnsupportedValue),
    }
}

fn recompute_balance(row: &mut Row) {
    let amount = row.number_or_zero(COL_AMOUNT);
    let deposit = row.number_or_zero(COL_DEPOSIT);
    row.set(COL_BALANCE, CellValue::Number(balance_of(amount, deposit)));
}

/// The in-memory set of custom tabs plus the active-view pointer. All
/// mutations are pure state transitions; persistence happens separately
/// through `reconcile` so callers keep the optimistic edit even when the
/// store write fails.
#[derive(Debug, Default)]
pub struct TabSet {
    tables: Vec<CustomTable>,
    active: Option<String>,
}

impl TabSet {
    pub fn tables(&self) -> &[CustomTable] {
        &self.tables
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&CustomTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut CustomTable, TabError> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| TabError::UnknownTab(name.to_string()))
    }

    /// Replaces the whole table list with the store's canonical copy,
    /// keeping the active pointer when the tab still exists.
    pub fn replace_tables(&mut self, tables: Vec<CustomTable>) {
        self.tables = tables;
        if let Some(active) = &self.active {
            if self.get(active).is_none() {
                self.active = None;
            }
        }
    }

    pub fn select(&mut self, name: Option<String>) {
        self.active = name.filter(|n| self.get(n).is_some());
    }

    pub fn create_table(
        &mut self,
        name: &str,
        preset: Option<Preset>,
        columns_spec: &str,
    ) -> Result<(), TabError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TabError::EmptyName);
        }
        if self.get(name).is_some() {
            return Err(TabError::DuplicateName(name.to_string()));
        }

        let columns: Vec<String> = match preset {
            Some(Preset::Payment) => PAYMENT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            None => {
                let cols = parse_column_spec(columns_spec);
                if cols.is_empty() {
                    return Err(TabError::NoColumns);
                }
                check_unique_columns(&cols)?;
                cols
            }
        };

        self.tables.push(CustomTable {
            id: None,
            name: name.to_string(),
            preset,
            columns,
            rows: Vec::new(),
        });
        self.active = Some(name.to_string());
        Ok(())
    }

    /// Returns false for the blank/unchanged no-op cases.
    pub fn rename_table(&mut self, old_name: &str, new_name: &str) -> Result<bool, TabError> {
        let new_name = new_name.trim();
        if new_name.is_empty() || new_name == old_name {
            return Ok(false);
        }
        if self.get(new_name).is_some() {
            return Err(TabError::DuplicateName(new_name.to_string()));
        }

        let table = self.get_mut(old_name)?;
        table.name = new_name.to_string();
        if self.active.as_deref() == Some(old_name) {
            self.active = Some(new_name.to_string());
        }
        Ok(true)
    }

    /// In-memory removal only. Callers must confirm the destructive store
    /// delete first so a failed delete never discards local state.
    pub fn remove_table(&mut self, name: &str) -> Result<CustomTable, TabError> {
        let idx = self
            .tables
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| TabError::UnknownTab(name.to_string()))?;
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        Ok(self.tables.remove(idx))
    }

    /// Replaces the column list. Existing row keys are deliberately left
    /// alone: a renamed column keeps its old key on old rows and renders
    /// empty under the new name.
    pub fn update_columns(&mut self, name: &str, columns: &[String]) -> Result<(), TabError> {
        let cleaned: Vec<String> = columns
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if cleaned.is_empty() {
            return Err(TabError::NoColumns);
        }
        check_unique_columns(&cleaned)?;

        let table = self.get_mut(name)?;
        table.columns = cleaned;
        Ok(())
    }

    /// Appends one synthesized row per student, in input order.
    pub fn add_students(
        &mut self,
        name: &str,
        students: &[StudentSeed],
        tuition: &HashMap<String, f64>,
    ) -> Result<usize, TabError> {
        let table = self.get_mut(name)?;

        for student in students {
            let mut row = Row::new();
            row.set(COL_STUDENT_NAME, CellValue::text(student.name.clone()));
            if table.preset == Some(Preset::Payment) {
                let due = tuition.get(&student.class).copied().unwrap_or(0.0);
                row.set(COL_AMOUNT, CellValue::Number(due));
                row.set(COL_DEPOSIT, CellValue::Number(0.0));
                row.set(COL_BALANCE, CellValue::Number(due));
                row.set(COL_DATE_PAID, CellValue::empty());
                row.set(COL_NOTE, CellValue::empty());
            } else {
                for col in &table.columns {
                    if col != COL_STUDENT_NAME {
                        row.set(col, CellValue::empty());
                    }
                }
            }
            table.rows.push(row);
        }
        Ok(students.len())
    }

    pub fn add_blank_row(&mut self, name: &str) -> Result<(), TabError> {
        let table = self.get_mut(name)?;
        if table.is_payment() {
            return Err(TabError::BlankRowOnPaymentTab);
        }
        let row: Row = table
            .columns
            .iter()
            .map(|col| (col.clone(), CellValue::empty()))
            .collect();
        table.rows.push(row);
        Ok(())
    }

    pub fn delete_row(&mut self, name: &str, index: usize) -> Result<(), TabError> {
        let table = self.get_mut(name)?;
        if index >= table.rows.len() {
            return Err(TabError::RowOutOfRange {
                index,
                len: table.rows.len(),
            });
        }
        table.rows.remove(index);
        Ok(())
    }

    pub fn edit_cell(
        &mut self,
        name: &str,
        index: usize,
        column: &str,
        raw: &Value,
    ) -> Result<(), TabError> {
        let table = self.get_mut(name)?;
        if !table.columns.iter().any(|c| c == column) {
            return Err(TabError::UnknownColumn {
                tab: name.to_string(),
                column: column.to_string(),
            });
        }

        let payment = table.is_payment();
        if payment && (column == COL_BALANCE || column == COL_STUDENT_NAME) {
            return Err(TabError::ColumnNotEditable(column.to_string()));
        }

        let value = if payment && (column == COL_AMOUNT || column == COL_DEPOSIT) {
            CellValue::Number(coerce_payment_number(raw)?)
        } else {
            cell_from_value(raw)?
        };

        let len = table.rows.len();
        let row = table
            .rows
            .get_mut(index)
            .ok_or(TabError::RowOutOfRange { index, len })?;
        row.set(column, value);

        if payment && (column == COL_AMOUNT || column == COL_DEPOSIT) {
            recompute_balance(row);
        }
        Ok(())
    }

    /// Whole-row replacement from a full-row edit form. Payment tabs get
    /// the balance recomputed from the incoming amount/deposit
    /// unconditionally.
    pub fn edit_row(&mut self, name: &str, index: usize, mut row: Row) -> Result<(), TabError> {
        let table = self.get_mut(name)?;
        let len = table.rows.len();
        if index >= len {
            return Err(TabError::RowOutOfRange { index, len });
        }
        if table.is_payment() {
            recompute_balance(&mut row);
        }
        table.rows[index] = row;
        Ok(())
    }

    /// Payment-preset convenience: one amount for every row. Balance is
    /// not recomputed here; the deposit-driven recompute only fires
    /// through edit_cell/edit_row.
    pub fn set_amount_all(&mut self, name: &str, value: f64) -> Result<usize, TabError> {
        let table = self.get_mut(name)?;
        if !table.is_payment() {
            return Err(TabError::NotAPaymentTab(name.to_string()));
        }
        for row in &mut table.rows {
            row.set(COL_AMOUNT, CellValue::Number(value));
        }
        Ok(table.rows.len())
    }
}
