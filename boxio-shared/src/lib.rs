//! boxio shared - common code for the attach core and its CLI
//!
//! This crate contains the error type, stream naming constants and the
//! on-disk layout of per-container stdio directories.

pub mod constants;
pub mod errors;
pub mod layout;

pub use errors::{BoxioError, BoxioResult};
pub use layout::IoLayout;
