pub mod cache;
pub mod classify;
pub mod validate;
