use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "schoolbook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            age INTEGER,
            class TEXT NOT NULL,
            parent_name TEXT,
            parent_phone TEXT,
            parent_email TEXT,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payments(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            student_name TEXT NOT NULL,
            class TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            amount_paid REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            payment_date TEXT,
            is_scholarship INTEGER NOT NULL DEFAULT 0,
            UNIQUE(student_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_payments_class ON payments(class)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tuition(
            class TEXT PRIMARY KEY,
            amount REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS expenses(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            term TEXT NOT NULL,
            category TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            note TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expenses_term ON expenses(term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            term TEXT NOT NULL,
            year TEXT NOT NULL,
            open_date TEXT,
            close_date TEXT,
            holiday_weeks INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS books(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            student_name TEXT NOT NULL,
            class TEXT NOT NULL,
            type TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            deposit REAL NOT NULL DEFAULT 0,
            date TEXT NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            UNIQUE(student_id, type),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_books_student ON books(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS party(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            student_name TEXT NOT NULL,
            class TEXT NOT NULL,
            event_type TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            deposit REAL NOT NULL DEFAULT 0,
            payment_date TEXT,
            UNIQUE(student_id, event_type),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_party_event ON party(event_type)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS party_class_amounts(
            class TEXT NOT NULL,
            event_type TEXT NOT NULL,
            amount REAL NOT NULL DEFAULT 0,
            PRIMARY KEY(class, event_type)
        )",
        [],
    )?;

    // The custom-tab collection stores whole records: the schema-less
    // columns/rows payloads live as JSON text.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS custom_tabs(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            preset TEXT,
            columns TEXT NOT NULL,
            rows TEXT NOT NULL
        )",
        [],
    )?;

    // Existing workspaces may predate later columns. Add them if needed.
    ensure_payments_scholarship_flag(&conn)?;
    ensure_books_note(&conn)?;

    Ok(conn)
}

fn ensure_payments_scholarship_flag(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "payments", "is_scholarship")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE payments ADD COLUMN is_scholarship INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    // Rows already marked by status keep their meaning.
    conn.execute(
        "UPDATE payments SET is_scholarship = 1 WHERE status = 'scholarship'",
        [],
    )?;
    Ok(())
}

fn ensure_books_note(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "books", "note")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE books ADD COLUMN note TEXT NOT NULL DEFAULT ''", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
