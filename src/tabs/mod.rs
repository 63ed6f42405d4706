mod engine;
mod model;
mod store;

pub use engine::{StudentSeed, TabError, TabSet};
pub use model::{CustomTable, Preset, Row};
pub use store::{reconcile, SqliteTabStore, TabStore};
