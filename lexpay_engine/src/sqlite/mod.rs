//! SQLite backend for the LexPay engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
