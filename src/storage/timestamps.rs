//! Row timestamp stamping.
//!
//! Every data table carries `created_at` and `last_modified` columns holding Unix
//! epoch milliseconds. Entities call [`stamp`] from `ActiveModelBehavior::before_save`,
//! so the hook runs for every single-row insert and update issued through an
//! active model. The function consumes the active model and hands back the stamped
//! value; rows that arrive from a remote merge are converted into a fresh active
//! model first and the caller's `Model` is never touched.

use sea_orm::{ActiveModelTrait, ActiveValue, EntityTrait, Value};

/// Current time as Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Stamps `last_modified` on every save and fills `created_at` on insert when the
/// incoming row does not carry one (unset, null, or zero).
pub fn stamp<A>(
    model: A,
    insert: bool,
    created_at: <A::Entity as EntityTrait>::Column,
    last_modified: <A::Entity as EntityTrait>::Column,
) -> A
where
    A: ActiveModelTrait,
{
    stamp_at(model, insert, created_at, last_modified, now_millis())
}

/// [`stamp`] with an explicit clock, used by tests.
pub fn stamp_at<A>(
    mut model: A,
    insert: bool,
    created_at: <A::Entity as EntityTrait>::Column,
    last_modified: <A::Entity as EntityTrait>::Column,
    now: i64,
) -> A
where
    A: ActiveModelTrait,
{
    model.set(last_modified, now.into());

    if insert && !has_timestamp(&model.get(created_at)) {
        model.set(created_at, now.into());
    }

    model
}

fn has_timestamp(value: &ActiveValue<Value>) -> bool {
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => {
            !matches!(v, Value::BigInt(None | Some(0)))
        }
        ActiveValue::NotSet => false,
    }
}
