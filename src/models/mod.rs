//! Data models for trustdb.
//!
//! Parameters and result cells share one scalar type so that callers see
//! identical shapes from either backend.

mod row;
mod value;

pub use row::Row;
pub use value::{FromValue, Value};
