// crates/db/src/queries/mod.rs
// Query methods on `Database`, one module per table.

pub mod daily_summary;
pub mod devices;
pub mod sessions;
pub mod sync_log;
