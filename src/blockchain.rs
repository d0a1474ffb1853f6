// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// the block model / chain store and the validation rules.

pub mod core;
pub use core::*;
