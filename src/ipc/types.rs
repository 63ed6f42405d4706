use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::tabs::TabSet;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// In-memory custom-tab set; loaded on workspace.select, mutated
    /// optimistically by the tab handlers.
    pub tabs: TabSet,
}
