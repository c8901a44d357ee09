//! Session records.

mod models;

pub use models::{Session, SessionSnapshot};
