// src/config/mod.rs
pub mod backlog;
pub mod profiles;

pub use backlog::{BackendKind, BacklogConfig, LegiscanConfig, RunMode, SupabaseConfig};
pub use profiles::Profile;
