//! Database models split into separate files.
//! This module re-exports individual model modules so callers can simply
//! `use crate::db::models::*;`.

pub mod slot;
pub mod swap_request;
pub mod user;

pub use self::slot::*;
pub use self::swap_request::*;
pub use self::user::*;
