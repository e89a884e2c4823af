#![allow(dead_code)]

use asset_lifecycle::config::LifecycleConfig;
use asset_lifecycle::entities::{assets, prelude::*};
use asset_lifecycle::infrastructure::database;
use asset_lifecycle::services::events::EventChannel;
use asset_lifecycle::services::lifecycle::{AssetDescriptor, LifecycleService};
use asset_lifecycle::services::storage::StorageService;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub const BASE_URL: &str = "https://cdn.test/assets";

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::create_schema(&db).await.unwrap();
    db
}

/// In-memory object store. Keys in `failing` reject deletes.
pub struct MockStorageService {
    objects: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn put(&self, public_id: &str) {
        self.objects.lock().unwrap().insert(public_id.to_string());
    }

    pub fn fail_deletes_for(&self, public_id: &str) {
        self.failing.lock().unwrap().insert(public_id.to_string());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn contains(&self, public_id: &str) -> bool {
        self.objects.lock().unwrap().contains(public_id)
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn delete_file(&self, public_id: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(public_id) {
            return Err(anyhow::anyhow!("simulated store outage for {}", public_id));
        }
        self.objects.lock().unwrap().remove(public_id);
        self.deleted.lock().unwrap().push(public_id.to_string());
        Ok(())
    }

    async fn file_exists(&self, public_id: &str) -> anyhow::Result<bool> {
        Ok(self.contains(public_id))
    }

    fn public_url(&self, public_id: &str) -> String {
        format!("{}/{}", BASE_URL, public_id)
    }

    fn resolve_public_id(&self, url: &str) -> Option<String> {
        url.strip_prefix(&format!("{}/", BASE_URL))
            .map(|rest| rest.split('?').next().unwrap_or(rest).to_string())
            .filter(|key| !key.is_empty())
    }
}

pub struct TestContext {
    pub db: DatabaseConnection,
    pub storage: Arc<MockStorageService>,
    pub events: Arc<EventChannel>,
    pub service: Arc<LifecycleService>,
    pub config: LifecycleConfig,
}

pub async fn setup() -> TestContext {
    setup_with(LifecycleConfig::default()).await
}

pub async fn setup_with(config: LifecycleConfig) -> TestContext {
    let db = setup_test_db().await;
    let storage = Arc::new(MockStorageService::new());
    let events = Arc::new(EventChannel::new(
        config.event_topic_prefix.clone(),
        config.event_channel_capacity,
    ));
    let service = Arc::new(LifecycleService::new(
        db.clone(),
        storage.clone(),
        Arc::clone(&events),
        config.clone(),
    ));

    TestContext {
        db,
        storage,
        events,
        service,
        config,
    }
}

pub fn descriptor(public_id: &str) -> AssetDescriptor {
    AssetDescriptor {
        public_id: public_id.to_string(),
        url: format!("{}/{}", BASE_URL, public_id),
        name: public_id.rsplit('/').next().unwrap().to_string(),
        media_kind: "image".to_string(),
        byte_size: 2048,
        mime_type: Some("image/png".to_string()),
        uploader_id: Some("user-1".to_string()),
        ..Default::default()
    }
}

impl TestContext {
    /// Registers an asset and places its object in the mock store.
    pub async fn upload(&self, public_id: &str) -> assets::Model {
        self.storage.put(public_id);
        self.service.register_asset(descriptor(public_id)).await.unwrap()
    }

    /// Moves `created_at` into the past.
    pub async fn age_asset(&self, asset_id: i32, hours: i64) {
        let at = Utc::now() - ChronoDuration::hours(hours);
        Assets::update_many()
            .col_expr(assets::Column::CreatedAt, Expr::value(at))
            .filter(assets::Column::Id.eq(asset_id))
            .exec(&self.db)
            .await
            .unwrap();
    }

    /// Moves `marked_for_deletion_at` into the past.
    pub async fn age_orphan_mark(&self, asset_id: i32, hours: i64) {
        let at = Utc::now() - ChronoDuration::hours(hours);
        Assets::update_many()
            .col_expr(assets::Column::MarkedForDeletionAt, Expr::value(at))
            .filter(assets::Column::Id.eq(asset_id))
            .exec(&self.db)
            .await
            .unwrap();
    }

    pub async fn raw_asset(&self, asset_id: i32) -> Option<assets::Model> {
        Assets::find_by_id(asset_id).one(&self.db).await.unwrap()
    }
}
