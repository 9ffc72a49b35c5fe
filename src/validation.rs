//! Input and row validation.
//!
//! Operations validate their inputs before touching the database, so a
//! validation error never leaves a partial write behind. Restores validate each
//! snapshot row against the same rules and skip the rows that fail.

use crate::{
    entities::{bill, envelope, paycheck, transaction},
    errors::{Error, Result},
};

/// Longest accepted name or category.
pub const MAX_NAME_LEN: usize = 100;
/// Longest accepted free-form description.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// A value that can check its own shape.
pub trait Validate {
    /// Returns the first problem found, if any.
    fn validate(&self) -> Result<()>;
}

/// Validates every element, reporting the index of the first failure.
pub fn validate_all<T>(items: &[T]) -> Result<()>
where
    T: Validate,
{
    for (index, item) in items.iter().enumerate() {
        item.validate().map_err(|e| Error::ValidationAt {
            index,
            message: e.to_string(),
        })?;
    }
    Ok(())
}

/// Rejects empty or whitespace-only strings and overlong ones.
pub(crate) fn require_name(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    require_max_len(field, value, MAX_NAME_LEN)
}

pub(crate) fn require_max_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(Error::validation(
            field,
            format!("must be at most {max} characters, got {len}"),
        ));
    }
    Ok(())
}

pub(crate) fn require_non_negative(field: &str, amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(Error::validation(
            field,
            format!("must not be negative, got {amount}"),
        ));
    }
    Ok(())
}

impl Validate for envelope::Model {
    fn validate(&self) -> Result<()> {
        require_name("id", &self.id)?;
        require_name("name", &self.name)?;
        require_max_len("category", &self.category, MAX_NAME_LEN)?;
        require_non_negative("targetAmount", self.target_amount)?;
        require_non_negative("biweeklyAllocation", self.biweekly_allocation)?;
        require_non_negative("monthlyBudget", self.monthly_budget)
    }
}

impl Validate for transaction::Model {
    fn validate(&self) -> Result<()> {
        require_name("id", &self.id)?;
        require_name("envelopeId", &self.envelope_id)?;
        require_max_len("description", &self.description, MAX_DESCRIPTION_LEN)?;
        if self.amount == 0 {
            return Err(Error::validation("amount", "must not be zero"));
        }
        match self.transaction_type {
            transaction::TransactionType::Transfer if self.to_envelope_id.is_none() => Err(
                Error::validation("toEnvelopeId", "is required for transfers"),
            ),
            transaction::TransactionType::Income | transaction::TransactionType::Expense
                if self.to_envelope_id.is_some() =>
            {
                Err(Error::validation(
                    "toEnvelopeId",
                    "is only allowed on transfers",
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Validate for bill::Model {
    fn validate(&self) -> Result<()> {
        require_name("id", &self.id)?;
        require_name("name", &self.name)?;
        require_non_negative("amount", self.amount)
    }
}

impl Validate for paycheck::Model {
    fn validate(&self) -> Result<()> {
        require_name("id", &self.id)?;
        if self.amount <= 0 {
            return Err(Error::validation("amount", "must be positive"));
        }
        if !self.allocations.is_array() {
            return Err(Error::validation("allocations", "must be a list"));
        }
        Ok(())
    }
}
