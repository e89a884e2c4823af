use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::entities::assets;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Upload,
    ReferenceAdded,
    ReferenceRemoved,
    Orphaned,
    Cleanup,
    Deleted,
}

impl FileEventKind {
    pub const ALL: [FileEventKind; 6] = [
        FileEventKind::Upload,
        FileEventKind::ReferenceAdded,
        FileEventKind::ReferenceRemoved,
        FileEventKind::Orphaned,
        FileEventKind::Cleanup,
        FileEventKind::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileEventKind::Upload => "upload",
            FileEventKind::ReferenceAdded => "reference_added",
            FileEventKind::ReferenceRemoved => "reference_removed",
            FileEventKind::Orphaned => "orphaned",
            FileEventKind::Cleanup => "cleanup",
            FileEventKind::Deleted => "deleted",
        }
    }

    pub fn is_reference_change(&self) -> bool {
        matches!(
            self,
            FileEventKind::ReferenceAdded | FileEventKind::ReferenceRemoved
        )
    }
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileEventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event kind '{}'", s))
    }
}

/// State-change notification carried over the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub asset_id: i32,
    pub public_id: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, asset: &assets::Model, action: impl Into<String>) -> Self {
        Self {
            kind,
            asset_id: asset.id,
            public_id: asset.public_id.clone(),
            action: action.into(),
            entity_type: None,
            entity_id: None,
            user_id: None,
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn with_user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip_through_from_str() {
        for kind in FileEventKind::ALL {
            assert_eq!(kind.as_str().parse::<FileEventKind>(), Ok(kind));
        }
        assert!("reference-added".parse::<FileEventKind>().is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let event = FileEvent {
            kind: FileEventKind::ReferenceAdded,
            asset_id: 7,
            public_id: "products/7.png".to_string(),
            action: "reference_add".to_string(),
            entity_type: Some("product".to_string()),
            entity_id: Some("42".to_string()),
            user_id: None,
            metadata: Map::new(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "reference_added");
        assert_eq!(json["entity_id"], "42");

        let missing_metadata = serde_json::json!({
            "kind": "orphaned",
            "asset_id": 1,
            "public_id": "a",
            "action": "mark_orphaned",
            "entity_type": null,
            "entity_id": null,
            "user_id": null,
            "timestamp": "2026-01-01T00:00:00Z"
        });
        let parsed: FileEvent = serde_json::from_value(missing_metadata).unwrap();
        assert_eq!(parsed.kind, FileEventKind::Orphaned);
        assert!(parsed.metadata.is_empty());
    }
}
