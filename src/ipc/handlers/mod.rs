pub mod books;
pub mod core;
pub mod expenses;
pub mod party;
pub mod payments;
pub mod reports;
pub mod sessions;
pub mod students;
pub mod tabs;
