pub mod assets;
pub mod audit;
pub mod cleanup;
pub mod health;
pub mod jobs;
pub mod references;
pub mod types;
pub mod webhooks;
