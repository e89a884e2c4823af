use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Query, SelectStatement};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value;

use crate::entities::{prelude::*, *};
use crate::services::lifecycle::types::{AuditLogFilter, CleanupJobKind, JobStatus};

/// Persistence gateway for asset, reference, audit and cleanup-job rows.
///
/// Every state transition on `assets` is a conditional `UPDATE` keyed on the
/// current flags, so callers learn from `rows_affected` whether they won it.
#[derive(Clone)]
pub struct AssetRepository {
    db: DatabaseConnection,
}

impl AssetRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn ping(&self) -> Result<(), DbErr> {
        self.db.ping().await
    }

    // ---- assets -------------------------------------------------------

    pub async fn insert_asset(&self, model: assets::ActiveModel) -> Result<assets::Model, DbErr> {
        model.insert(&self.db).await
    }

    /// Inserts an asset together with its first reference; neither row is
    /// kept if the other fails.
    pub async fn insert_asset_with_reference(
        &self,
        asset: assets::ActiveModel,
        mut reference: asset_references::ActiveModel,
    ) -> Result<(assets::Model, asset_references::Model), DbErr> {
        let txn = self.db.begin().await?;
        let asset = asset.insert(&txn).await?;
        reference.asset_id = Set(asset.id);
        let reference = reference.insert(&txn).await?;
        txn.commit().await?;
        Ok((asset, reference))
    }

    /// Soft-deleted rows are never returned.
    pub async fn find_live_asset(&self, id: i32) -> Result<Option<assets::Model>, DbErr> {
        Assets::find_by_id(id)
            .filter(assets::Column::DeletedAt.is_null())
            .one(&self.db)
            .await
    }

    pub async fn find_asset_any_state(&self, id: i32) -> Result<Option<assets::Model>, DbErr> {
        Assets::find_by_id(id).one(&self.db).await
    }

    pub async fn find_live_asset_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<assets::Model>, DbErr> {
        Assets::find()
            .filter(assets::Column::PublicId.eq(public_id))
            .filter(assets::Column::DeletedAt.is_null())
            .one(&self.db)
            .await
    }

    /// Includes soft-deleted rows: the unique constraint covers them too.
    pub async fn public_id_taken(&self, public_id: &str) -> Result<bool, DbErr> {
        let count = Assets::find()
            .filter(assets::Column::PublicId.eq(public_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    pub async fn find_live_assets(&self, ids: &[i32]) -> Result<Vec<assets::Model>, DbErr> {
        Assets::find()
            .filter(assets::Column::Id.is_in(ids.iter().copied()))
            .filter(assets::Column::DeletedAt.is_null())
            .order_by_asc(assets::Column::Id)
            .all(&self.db)
            .await
    }

    /// Clears the orphan/temporary flags. Returns false when nothing changed.
    pub async fn flag_referenced(&self, asset_id: i32, now: DateTime<Utc>) -> Result<bool, DbErr> {
        let res = Assets::update_many()
            .col_expr(assets::Column::IsOrphaned, Expr::value(false))
            .col_expr(assets::Column::IsTemporary, Expr::value(false))
            .col_expr(
                assets::Column::MarkedForDeletionAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(assets::Column::UpdatedAt, Expr::value(now))
            .filter(assets::Column::Id.eq(asset_id))
            .filter(assets::Column::DeletedAt.is_null())
            .filter(
                Condition::any()
                    .add(assets::Column::IsOrphaned.eq(true))
                    .add(assets::Column::IsTemporary.eq(true))
                    .add(assets::Column::MarkedForDeletionAt.is_not_null()),
            )
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Flags a confirmed, live asset as orphaned. Returns true only for the
    /// caller that performed the transition.
    pub async fn flag_orphaned(&self, asset_id: i32, now: DateTime<Utc>) -> Result<bool, DbErr> {
        let res = Assets::update_many()
            .col_expr(assets::Column::IsOrphaned, Expr::value(true))
            .col_expr(assets::Column::MarkedForDeletionAt, Expr::value(now))
            .col_expr(assets::Column::UpdatedAt, Expr::value(now))
            .filter(assets::Column::Id.eq(asset_id))
            .filter(assets::Column::IsOrphaned.eq(false))
            .filter(assets::Column::IsTemporary.eq(false))
            .filter(assets::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Hard-deletes a temporary asset only while it still has no active reference.
    pub async fn hard_delete_unreferenced_temporary(&self, asset_id: i32) -> Result<u64, DbErr> {
        let res = Assets::delete_many()
            .filter(assets::Column::Id.eq(asset_id))
            .filter(assets::Column::IsTemporary.eq(true))
            .filter(assets::Column::Id.not_in_subquery(actively_referenced()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    /// Soft-deletes an orphan only while it is still flagged and unreferenced.
    pub async fn soft_delete_unreferenced_orphan(
        &self,
        asset_id: i32,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let res = Assets::update_many()
            .col_expr(assets::Column::DeletedAt, Expr::value(now))
            .col_expr(assets::Column::UpdatedAt, Expr::value(now))
            .filter(assets::Column::Id.eq(asset_id))
            .filter(assets::Column::DeletedAt.is_null())
            .filter(assets::Column::IsOrphaned.eq(true))
            .filter(assets::Column::Id.not_in_subquery(actively_referenced()))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn soft_delete_asset(&self, asset_id: i32, now: DateTime<Utc>) -> Result<u64, DbErr> {
        let res = Assets::update_many()
            .col_expr(assets::Column::DeletedAt, Expr::value(now))
            .col_expr(assets::Column::UpdatedAt, Expr::value(now))
            .filter(assets::Column::Id.eq(asset_id))
            .filter(assets::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn temporary_candidates(
        &self,
        created_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<assets::Model>, DbErr> {
        Assets::find()
            .filter(assets::Column::IsTemporary.eq(true))
            .filter(assets::Column::DeletedAt.is_null())
            .filter(assets::Column::CreatedAt.lt(created_before))
            .order_by_asc(assets::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    pub async fn orphan_candidates(
        &self,
        marked_before: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<assets::Model>, DbErr> {
        Assets::find()
            .filter(assets::Column::IsOrphaned.eq(true))
            .filter(assets::Column::DeletedAt.is_null())
            .filter(assets::Column::MarkedForDeletionAt.is_not_null())
            .filter(assets::Column::MarkedForDeletionAt.lte(marked_before))
            .order_by_asc(assets::Column::MarkedForDeletionAt)
            .limit(limit)
            .all(&self.db)
            .await
    }

    /// Confirmed live assets with no active reference that are not flagged yet.
    pub async fn unflagged_orphans(&self, limit: u64) -> Result<Vec<assets::Model>, DbErr> {
        Assets::find()
            .filter(assets::Column::IsOrphaned.eq(false))
            .filter(assets::Column::IsTemporary.eq(false))
            .filter(assets::Column::DeletedAt.is_null())
            .filter(assets::Column::Id.not_in_subquery(actively_referenced()))
            .order_by_asc(assets::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
    }

    // ---- references ---------------------------------------------------

    pub async fn count_active_references(&self, asset_id: i32) -> Result<u64, DbErr> {
        AssetReferences::find()
            .filter(asset_references::Column::AssetId.eq(asset_id))
            .filter(asset_references::Column::Active.eq(true))
            .count(&self.db)
            .await
    }

    pub async fn find_active_slot(
        &self,
        asset_id: i32,
        entity_type: &str,
        entity_id: &str,
        field_name: Option<&str>,
    ) -> Result<Option<asset_references::Model>, DbErr> {
        let query = AssetReferences::find()
            .filter(asset_references::Column::AssetId.eq(asset_id))
            .filter(asset_references::Column::EntityType.eq(entity_type))
            .filter(asset_references::Column::EntityId.eq(entity_id))
            .filter(asset_references::Column::Active.eq(true));

        let query = match field_name {
            Some(field) => query.filter(asset_references::Column::FieldName.eq(field)),
            None => query.filter(asset_references::Column::FieldName.is_null()),
        };

        query.one(&self.db).await
    }

    pub async fn insert_reference(
        &self,
        model: asset_references::ActiveModel,
    ) -> Result<asset_references::Model, DbErr> {
        model.insert(&self.db).await
    }

    /// Soft-deletes the active rows linking `asset_id` to one entity.
    pub async fn deactivate_references(
        &self,
        asset_id: i32,
        entity_type: &str,
        entity_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let res = AssetReferences::update_many()
            .col_expr(asset_references::Column::Active, Expr::value(false))
            .col_expr(asset_references::Column::DeletedAt, Expr::value(now))
            .filter(asset_references::Column::AssetId.eq(asset_id))
            .filter(asset_references::Column::EntityType.eq(entity_type))
            .filter(asset_references::Column::EntityId.eq(entity_id))
            .filter(asset_references::Column::Active.eq(true))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn deactivate_all_references(
        &self,
        asset_id: i32,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let res = AssetReferences::update_many()
            .col_expr(asset_references::Column::Active, Expr::value(false))
            .col_expr(asset_references::Column::DeletedAt, Expr::value(now))
            .filter(asset_references::Column::AssetId.eq(asset_id))
            .filter(asset_references::Column::Active.eq(true))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn active_references_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<asset_references::Model>, DbErr> {
        AssetReferences::find()
            .filter(asset_references::Column::EntityType.eq(entity_type))
            .filter(asset_references::Column::EntityId.eq(entity_id))
            .filter(asset_references::Column::Active.eq(true))
            .order_by_asc(asset_references::Column::Id)
            .all(&self.db)
            .await
    }

    pub async fn active_references_for_asset(
        &self,
        asset_id: i32,
    ) -> Result<Vec<asset_references::Model>, DbErr> {
        AssetReferences::find()
            .filter(asset_references::Column::AssetId.eq(asset_id))
            .filter(asset_references::Column::Active.eq(true))
            .order_by_asc(asset_references::Column::Id)
            .all(&self.db)
            .await
    }

    // ---- audit --------------------------------------------------------

    pub async fn insert_audit(
        &self,
        model: asset_audit_logs::ActiveModel,
    ) -> Result<asset_audit_logs::Model, DbErr> {
        model.insert(&self.db).await
    }

    pub async fn audit_page(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<(Vec<asset_audit_logs::Model>, u64), DbErr> {
        let mut query = AssetAuditLogs::find();

        if let Some(asset_id) = filter.asset_id {
            query = query.filter(asset_audit_logs::Column::AssetId.eq(asset_id));
        }
        if let Some(ref action) = filter.action {
            query = query.filter(asset_audit_logs::Column::Action.eq(action.as_str()));
        }
        if let Some(ref actor_id) = filter.actor_id {
            query = query.filter(asset_audit_logs::Column::ActorId.eq(actor_id.as_str()));
        }
        if let Some(from) = filter.from {
            query = query.filter(asset_audit_logs::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(asset_audit_logs::Column::CreatedAt.lte(to));
        }

        let paginator = query
            .order_by_desc(asset_audit_logs::Column::CreatedAt)
            .order_by_desc(asset_audit_logs::Column::Id)
            .paginate(&self.db, filter.per_page());

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(filter.page() - 1).await?;
        Ok((items, total))
    }

    // ---- cleanup jobs -------------------------------------------------

    pub async fn create_job(
        &self,
        kind: CleanupJobKind,
        parameters: Value,
    ) -> Result<cleanup_jobs::Model, DbErr> {
        let now = Utc::now();
        cleanup_jobs::ActiveModel {
            job_type: Set(kind.as_str().to_string()),
            status: Set(JobStatus::Pending.as_str().to_string()),
            parameters: Set(parameters),
            files_processed: Set(0),
            files_deleted: Set(0),
            files_failed: Set(0),
            error_message: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
    }

    pub async fn mark_job_running(
        &self,
        job: cleanup_jobs::Model,
    ) -> Result<cleanup_jobs::Model, DbErr> {
        let now = Utc::now();
        let mut active: cleanup_jobs::ActiveModel = job.into();
        active.status = Set(JobStatus::Running.as_str().to_string());
        active.started_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&self.db).await
    }

    pub async fn finish_job(
        &self,
        job: cleanup_jobs::Model,
        status: JobStatus,
        counts: (u32, u32, u32),
        error_message: Option<String>,
    ) -> Result<cleanup_jobs::Model, DbErr> {
        let now = Utc::now();
        let (processed, deleted, failed) = counts;
        let mut active: cleanup_jobs::ActiveModel = job.into();
        active.status = Set(status.as_str().to_string());
        active.files_processed = Set(processed as i32);
        active.files_deleted = Set(deleted as i32);
        active.files_failed = Set(failed as i32);
        active.error_message = Set(error_message);
        active.completed_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&self.db).await
    }

    pub async fn find_job(&self, id: i32) -> Result<Option<cleanup_jobs::Model>, DbErr> {
        CleanupJobs::find_by_id(id).one(&self.db).await
    }

    pub async fn recent_jobs(&self, limit: u64) -> Result<Vec<cleanup_jobs::Model>, DbErr> {
        CleanupJobs::find()
            .order_by_desc(cleanup_jobs::Column::CreatedAt)
            .order_by_desc(cleanup_jobs::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
    }

    // ---- aggregates ---------------------------------------------------

    pub async fn count_assets(&self, condition: Condition) -> Result<u64, DbErr> {
        Assets::find().filter(condition).count(&self.db).await
    }

    pub async fn count_all_active_references(&self) -> Result<u64, DbErr> {
        AssetReferences::find()
            .filter(asset_references::Column::Active.eq(true))
            .count(&self.db)
            .await
    }

    pub async fn live_byte_total(&self) -> Result<i64, DbErr> {
        let total = Assets::find()
            .select_only()
            .column_as(
                Expr::cust("CAST(COALESCE(SUM(byte_size), 0) AS BIGINT)"),
                "total_bytes",
            )
            .filter(assets::Column::DeletedAt.is_null())
            .into_tuple::<i64>()
            .one(&self.db)
            .await?;
        Ok(total.unwrap_or(0))
    }

    pub async fn live_assets_by_media_kind(&self) -> Result<Vec<(String, i64)>, DbErr> {
        Assets::find()
            .select_only()
            .column(assets::Column::MediaKind)
            .column_as(Expr::col(assets::Column::Id).count(), "asset_count")
            .filter(assets::Column::DeletedAt.is_null())
            .group_by(assets::Column::MediaKind)
            .into_tuple::<(String, i64)>()
            .all(&self.db)
            .await
    }

    pub async fn jobs_by_status(&self) -> Result<Vec<(String, i64)>, DbErr> {
        CleanupJobs::find()
            .select_only()
            .column(cleanup_jobs::Column::Status)
            .column_as(Expr::col(cleanup_jobs::Column::Id).count(), "job_count")
            .group_by(cleanup_jobs::Column::Status)
            .into_tuple::<(String, i64)>()
            .all(&self.db)
            .await
    }
}

/// `SELECT asset_id FROM asset_references WHERE active`
fn actively_referenced() -> SelectStatement {
    Query::select()
        .column(asset_references::Column::AssetId)
        .from(asset_references::Entity)
        .and_where(asset_references::Column::Active.eq(true))
        .to_owned()
}
