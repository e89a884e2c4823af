use sea_orm::{ColumnTrait, Condition};

use super::{AssetStatistics, AuditLogFilter, AuditLogPage, LifecycleResult, LifecycleService};
use crate::entities::assets;

impl LifecycleService {
    pub async fn get_statistics(&self) -> LifecycleResult<AssetStatistics> {
        let live = || Condition::all().add(assets::Column::DeletedAt.is_null());

        let total_assets = self.repo.count_assets(live()).await?;
        let temporary_assets = self
            .repo
            .count_assets(live().add(assets::Column::IsTemporary.eq(true)))
            .await?;
        let orphaned_assets = self
            .repo
            .count_assets(live().add(assets::Column::IsOrphaned.eq(true)))
            .await?;
        let deleted_assets = self
            .repo
            .count_assets(Condition::all().add(assets::Column::DeletedAt.is_not_null()))
            .await?;

        Ok(AssetStatistics {
            total_assets,
            temporary_assets,
            orphaned_assets,
            deleted_assets,
            active_references: self.repo.count_all_active_references().await?,
            total_bytes: self.repo.live_byte_total().await?,
            assets_by_media_kind: self
                .repo
                .live_assets_by_media_kind()
                .await?
                .into_iter()
                .collect(),
            jobs_by_status: self.repo.jobs_by_status().await?.into_iter().collect(),
            last_job: self.repo.recent_jobs(1).await?.into_iter().next(),
        })
    }

    pub async fn get_audit_logs(&self, filter: &AuditLogFilter) -> LifecycleResult<AuditLogPage> {
        let (items, total) = self.repo.audit_page(filter).await?;
        Ok(AuditLogPage {
            items,
            total,
            page: filter.page(),
            per_page: filter.per_page(),
        })
    }
}
