//! Lock record entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use warden_common::{LockError, LockKind, LockRecord};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "locks")]
pub struct Model {
    #[sea_orm(
        primary_key,
        auto_increment = false,
        column_name = "lock_key",
        column_type = "String(StringLen::N(255))"
    )]
    pub key: String,
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub owner: String,
    #[sea_orm(column_type = "Blob")]
    pub value: Vec<u8>,
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub kind: String,
    pub modification_index: i64,
    pub ttl_ms: i64,
    pub deadline_ms: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for LockRecord {
    type Error = LockError;

    /// Rows that violate the record invariants are an integrity failure.
    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let kind = model
            .kind
            .parse::<LockKind>()
            .map_err(|e| LockError::StoreFatal(format!("lock '{}': {}", model.key, e)))?;
        if model.owner.is_empty() {
            return Err(LockError::StoreFatal(format!(
                "lock '{}' is persisted without an owner",
                model.key
            )));
        }
        Ok(LockRecord {
            key: model.key,
            owner: model.owner,
            value: model.value,
            kind,
            modification_index: model.modification_index,
            ttl_ms: model.ttl_ms,
            deadline_ms: model.deadline_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(kind: &str, owner: &str) -> Model {
        Model {
            key: "job-17".to_string(),
            owner: owner.to_string(),
            value: b"payload".to_vec(),
            kind: kind.to_string(),
            modification_index: 3,
            ttl_ms: 10_000,
            deadline_ms: Some(42),
        }
    }

    #[test]
    fn test_model_into_record() {
        let record = LockRecord::try_from(model("presence", "worker-A")).unwrap();
        assert_eq!(record.kind, LockKind::Presence);
        assert_eq!(record.modification_index, 3);
        assert_eq!(record.value, b"payload".to_vec());
    }

    #[test]
    fn test_corrupt_rows_are_fatal() {
        assert!(matches!(
            LockRecord::try_from(model("mutex", "worker-A")),
            Err(LockError::StoreFatal(_))
        ));
        assert!(matches!(
            LockRecord::try_from(model("lock", "")),
            Err(LockError::StoreFatal(_))
        ));
    }
}
