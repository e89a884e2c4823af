use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub public_id: String,
    pub url: String,
    pub name: String,
    pub media_kind: String,
    pub byte_size: i64,
    pub folder: Option<String>,
    pub mime_type: Option<String>,
    pub uploader_id: Option<String>,
    pub tags: Json,
    pub metadata: Json,
    #[sea_orm(default_expr = "Expr::value(true)")]
    pub is_temporary: bool,
    #[sea_orm(default_expr = "Expr::value(false)")]
    pub is_orphaned: bool,
    pub marked_for_deletion_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::asset_references::Entity")]
    AssetReferences,
}

impl Related<super::asset_references::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssetReferences.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_value(self.tags.clone()).unwrap_or_default()
    }
}
