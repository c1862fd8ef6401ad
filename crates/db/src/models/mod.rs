//! Row structs and request DTOs.
//!
//! Each submodule contains a `FromRow` row struct matching the table and the
//! domain-facing type the store hands back.

pub mod email;
pub mod measurement;
pub mod threshold;
