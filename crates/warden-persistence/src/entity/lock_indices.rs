//! Per-key modification index counter
//!
//! Outlives the `locks` row it numbers, so an index is never handed out twice
//! for the same key after a release or a sweep.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lock_indices")]
pub struct Model {
    #[sea_orm(
        primary_key,
        auto_increment = false,
        column_name = "lock_key",
        column_type = "String(StringLen::N(255))"
    )]
    pub key: String,
    pub modification_index: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
