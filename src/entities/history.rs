//! Budget history tracking entities.
//!
//! These tables give the sync layer a commit/branch/tag history of budget
//! changes. The ledger engine only owns their schema; rows are written by
//! the history collaborator.

/// Commit in the budget history graph
pub mod budget_commit {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    /// Budget commit database model
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "budget_commits")]
    #[serde(rename_all = "camelCase")]
    pub struct Model {
        /// Content hash identifying the commit
        #[sea_orm(primary_key, auto_increment = false)]
        pub hash: String,
        /// Commit time, epoch milliseconds
        pub timestamp: i64,
        /// Commit message
        pub message: String,
        /// Author display name
        pub author: String,
        /// Parent commit hash
        pub parent_hash: Option<String>,
        /// Device that produced the commit
        pub device_fingerprint: Option<String>,
    }

    /// `BudgetCommit` has no declared relations
    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Per-entity change belonging to a commit
pub mod budget_change {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    /// Budget change database model
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "budget_changes")]
    #[serde(rename_all = "camelCase")]
    pub struct Model {
        /// Autoincrementing identifier
        #[sea_orm(primary_key)]
        pub id: i64,
        /// Owning commit
        pub commit_hash: String,
        /// Kind of entity changed
        pub entity_type: String,
        /// Identifier of the entity changed
        pub entity_id: String,
        /// `"add"`, `"modify"` or `"delete"`
        pub change_type: String,
        /// Human-readable summary
        pub description: String,
        /// Entity state before the change
        pub before_data: Option<Json>,
        /// Entity state after the change
        pub after_data: Option<Json>,
    }

    /// `BudgetChange` has no declared relations
    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Named line of budget history
pub mod budget_branch {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    /// Budget branch database model
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "budget_branches")]
    #[serde(rename_all = "camelCase")]
    pub struct Model {
        /// Autoincrementing identifier
        #[sea_orm(primary_key)]
        pub id: i64,
        /// Branch name
        pub name: String,
        /// Optional description
        pub description: Option<String>,
        /// Commit the branch started from
        pub source_commit_hash: String,
        /// Latest commit on the branch
        pub head_commit_hash: String,
        /// Author display name
        pub author: String,
        /// Creation time, epoch milliseconds
        pub created: i64,
        /// Whether this is the checked-out branch
        pub is_active: bool,
        /// Whether the branch has been merged
        pub is_merged: bool,
    }

    /// `BudgetBranch` has no declared relations
    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Label attached to a commit
pub mod budget_tag {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    /// Budget tag database model
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "budget_tags")]
    #[serde(rename_all = "camelCase")]
    pub struct Model {
        /// Autoincrementing identifier
        #[sea_orm(primary_key)]
        pub id: i64,
        /// Tag name
        pub name: String,
        /// Optional description
        pub description: Option<String>,
        /// Tagged commit
        pub commit_hash: String,
        /// `"milestone"`, `"backup"`, ...
        pub tag_type: String,
        /// Author display name
        pub author: String,
        /// Creation time, epoch milliseconds
        pub created: i64,
    }

    /// `BudgetTag` has no declared relations
    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
