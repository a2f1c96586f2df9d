mod repository;

pub use repository::*;

/// SQL migration for contracts and fund entries
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQL migration for the entry event log
pub const MIGRATION_002_ENTRY_EVENTS: &str = include_str!("migrations/002_entry_events.sql");
