//! Video game sales data over HTTP: a one-shot CSV loader and a read-only
//! JSON query service sharing a single SQLite table.

pub mod api;
pub mod db;
pub mod load;
