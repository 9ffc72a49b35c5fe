//! Auto-funding entities - Stored funding rules and their execution history.

/// Rule describing how unassigned cash should be moved automatically
pub mod auto_funding_rule {
    use crate::storage::timestamps;
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    /// Auto-funding rule database model
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "auto_funding_rules")]
    #[serde(rename_all = "camelCase")]
    pub struct Model {
        /// Unique identifier for the rule
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        /// Display name
        pub name: String,
        /// `"fixed_amount"`, `"percentage"`, `"priority_fill"`, ...
        pub rule_type: String,
        /// Execution order, higher runs first
        pub priority: i32,
        /// Whether the rule participates in runs
        pub enabled: bool,
        /// Rule-specific configuration
        pub config: Json,
        /// Last execution time, epoch milliseconds
        pub last_executed: Option<i64>,
        /// Creation time, epoch milliseconds
        pub created_at: i64,
        /// Last modification time, epoch milliseconds
        pub last_modified: i64,
    }

    /// `AutoFundingRule` has no declared relations
    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    #[async_trait::async_trait]
    impl ActiveModelBehavior for ActiveModel {
        async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
        where
            C: ConnectionTrait,
        {
            Ok(timestamps::stamp(
                self,
                insert,
                Column::CreatedAt,
                Column::LastModified,
            ))
        }
    }
}

/// One execution of the auto-funding rules
pub mod auto_funding_history {
    use sea_orm::entity::prelude::*;
    use serde::{Deserialize, Serialize};

    /// Auto-funding execution database model
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "auto_funding_history")]
    #[serde(rename_all = "camelCase")]
    pub struct Model {
        /// Unique identifier for the execution
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: String,
        /// Execution time, epoch milliseconds
        pub executed_at: i64,
        /// What started the run (`"manual"`, `"paycheck"`, ...)
        pub trigger: String,
        /// Total moved out of unassigned cash, in cents
        pub total_funded: i64,
        /// Per-rule results
        pub results: Json,
    }

    /// `AutoFundingHistory` has no declared relations
    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
