//! Application handle and the injection scope stores are looked up in.

mod app;

pub use app::{use_store, App};
