pub mod prelude;

pub mod asset_audit_logs;
pub mod asset_references;
pub mod assets;
pub mod cleanup_jobs;
