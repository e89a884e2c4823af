pub use super::asset_audit_logs::Entity as AssetAuditLogs;
pub use super::asset_references::Entity as AssetReferences;
pub use super::assets::Entity as Assets;
pub use super::cleanup_jobs::Entity as CleanupJobs;
