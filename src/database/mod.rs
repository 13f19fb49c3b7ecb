// Storage: SQLite holds the user records, LanceDB holds the similarity index

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
