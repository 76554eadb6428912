//! Database implementations

pub mod interval_sql;
pub mod manager;
pub mod pool;
pub mod tracking_store;

pub use interval_sql::*;
pub use manager::*;
pub use pool::*;
pub use tracking_store::*;
