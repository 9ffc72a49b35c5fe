//! Bill-envelope prioritization and unassigned-cash distribution strategies.
//!
//! Everything here is a pure function of envelopes, bills and a reference date,
//! so callers decide what to load and whether to apply the result (usually via
//! `EnvelopeService::distribute_unassigned`).
//!
//! Priority is driven by the earliest unpaid linked bill due today or later.
//! Overdue bills are left to the bill-payment flow and never raise priority.

use crate::{
    core::classify::FundingClass,
    entities::{EnvelopeType, bill, envelope},
};
use chrono::NaiveDate;
use serde::Serialize;
use std::{cmp::Reverse, collections::BTreeMap};

/// Bills due within this many days are critical when underfunded.
pub const CRITICAL_WINDOW_DAYS: i64 = 3;
/// Bills due within this many days are urgent when more than half unfunded.
pub const URGENT_WINDOW_DAYS: i64 = 7;
/// Bills due within this many days get a half top-up when underfunded.
pub const SOON_WINDOW_DAYS: i64 = 14;
/// Bills further out than this do not raise priority.
pub const HORIZON_DAYS: i64 = 30;
/// Monthly weight for a savings envelope with no allocation, in cents.
pub const DEFAULT_SAVINGS_WEIGHT: i64 = 5_000;
/// Low-priority top-up for an envelope with no allocation, in cents.
pub const DEFAULT_MINIMAL_FUNDING: i64 = 2_500;

/// Urgency of funding a bill envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    /// Nothing pressing, or already funded
    Normal,
    /// Due within a week and more than half unfunded
    Urgent,
    /// Due within three days and underfunded
    Critical,
}

/// What a bill envelope still needs before its next bill.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillEnvelopeNeeds {
    /// The envelope
    pub envelope_id: String,
    /// Earliest unpaid linked bill, if any
    pub next_bill_id: Option<String>,
    /// Amount of that bill in cents, 0 without one
    pub next_bill_amount: i64,
    /// Days until it is due, never negative
    pub days_until_due: Option<i64>,
    /// Cents still missing from the envelope
    pub remaining: i64,
    /// Funded share of the bill, 0-100
    pub funding_progress: i64,
}

/// Priority and suggested top-up for one bill envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillPriority {
    /// Level used for the first distribution pass
    pub level: PriorityLevel,
    /// Ordering score; higher is funded first
    pub score: u8,
    /// Suggested amount to move in, in cents
    pub recommended_amount: i64,
    /// Underlying needs
    pub needs: BillEnvelopeNeeds,
}

/// Result of [`recommend_bill_distribution`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillDistribution {
    /// Cents per envelope id
    pub allocations: BTreeMap<String, i64>,
    /// Sum of `allocations`
    pub total_allocated: i64,
    /// Cash left over
    pub remaining_cash: i64,
}

fn next_unpaid_bill<'a>(
    envelope_id: &str,
    bills: &'a [bill::Model],
    today: NaiveDate,
) -> Option<&'a bill::Model> {
    bills
        .iter()
        .filter(|b| !b.is_paid && b.envelope_id.as_deref() == Some(envelope_id))
        .filter(|b| b.due_date >= today)
        .min_by_key(|b| (b.due_date, b.id.as_str()))
}

/// Computes what an envelope still needs for its next upcoming unpaid bill.
#[must_use]
pub fn bill_envelope_needs(
    envelope: &envelope::Model,
    bills: &[bill::Model],
    today: NaiveDate,
) -> BillEnvelopeNeeds {
    let next = next_unpaid_bill(&envelope.id, bills, today);
    let next_bill_amount = next.map_or(0, |b| b.amount);
    let remaining = (next_bill_amount - envelope.current_balance).max(0);
    let funding_progress = if next_bill_amount > 0 {
        (envelope.current_balance.max(0) * 100 / next_bill_amount).min(100)
    } else {
        100
    };

    BillEnvelopeNeeds {
        envelope_id: envelope.id.clone(),
        next_bill_id: next.map(|b| b.id.clone()),
        next_bill_amount,
        days_until_due: next.map(|b| (b.due_date - today).num_days()),
        remaining,
        funding_progress,
    }
}

#[derive(Clone, Copy)]
enum TopUp {
    Nothing,
    Remaining,
    Half,
    Minimal,
}

/// Ranks a bill envelope by how soon its next bill is due and how underfunded
/// it is, and suggests how much of `available_cash` to move in.
///
/// | condition                                   | level    | score | top-up                                |
/// |---------------------------------------------|----------|-------|---------------------------------------|
/// | fully funded                                | normal   | 1     | nothing                               |
/// | no upcoming bill, or due after 30 days      | normal   | 2     | allocation (or 25.00), max 10% cash   |
/// | due within 3 days                           | critical | 10    | remaining                             |
/// | due within 7 days, more than half unfunded  | urgent   | 8     | remaining                             |
/// | due within 14 days                          | normal   | 6     | max(allocation, half remaining)       |
/// | otherwise                                   | normal   | 4     | max(allocation, half remaining)       |
///
/// Every top-up is capped at `available_cash`.
#[must_use]
pub fn bill_envelope_priority(
    envelope: &envelope::Model,
    bills: &[bill::Model],
    available_cash: i64,
    today: NaiveDate,
) -> BillPriority {
    let needs = bill_envelope_needs(envelope, bills, today);
    let remaining = needs.remaining;

    let (level, score, top_up) = match needs.days_until_due {
        _ if remaining == 0 => (PriorityLevel::Normal, 1, TopUp::Nothing),
        None => (PriorityLevel::Normal, 2, TopUp::Minimal),
        Some(days) if days > HORIZON_DAYS => (PriorityLevel::Normal, 2, TopUp::Minimal),
        Some(days) if days <= CRITICAL_WINDOW_DAYS => {
            (PriorityLevel::Critical, 10, TopUp::Remaining)
        }
        Some(days) if days <= URGENT_WINDOW_DAYS && remaining * 2 > needs.next_bill_amount => {
            (PriorityLevel::Urgent, 8, TopUp::Remaining)
        }
        Some(days) if days <= SOON_WINDOW_DAYS => (PriorityLevel::Normal, 6, TopUp::Half),
        Some(_) => (PriorityLevel::Normal, 4, TopUp::Half),
    };

    let cash = available_cash.max(0);
    let recommended_amount = match top_up {
        TopUp::Nothing => 0,
        TopUp::Remaining => remaining.min(cash),
        TopUp::Half => envelope.biweekly_allocation.max(remaining / 2).min(cash),
        TopUp::Minimal => {
            let minimal = if envelope.biweekly_allocation > 0 {
                envelope.biweekly_allocation
            } else {
                DEFAULT_MINIMAL_FUNDING
            };
            minimal.min(cash / 10)
        }
    };

    BillPriority {
        level,
        score,
        recommended_amount,
        needs,
    }
}

/// Splits `cash` across active liability envelopes in two passes.
///
/// The first pass gives critical and urgent envelopes their full recommended
/// amount, highest score first, while cash lasts. The second pass gives the rest
/// up to their recommended amount in the same order.
#[must_use]
pub fn recommend_bill_distribution(
    envelopes: &[envelope::Model],
    bills: &[bill::Model],
    cash: i64,
    today: NaiveDate,
) -> BillDistribution {
    let mut ranked: Vec<BillPriority> = envelopes
        .iter()
        .filter(|e| !e.archived && e.envelope_type == EnvelopeType::Liability)
        .map(|e| bill_envelope_priority(e, bills, cash, today))
        .collect();
    ranked.sort_by(|a, b| {
        Reverse(a.score)
            .cmp(&Reverse(b.score))
            .then_with(|| a.needs.days_until_due.cmp(&b.needs.days_until_due))
            .then_with(|| a.needs.envelope_id.cmp(&b.needs.envelope_id))
    });

    let mut distribution = BillDistribution {
        remaining_cash: cash.max(0),
        ..BillDistribution::default()
    };

    let (pressing, rest): (Vec<_>, Vec<_>) = ranked
        .iter()
        .partition(|p| p.level != PriorityLevel::Normal);

    for priority in pressing.into_iter().chain(rest) {
        if distribution.remaining_cash == 0 {
            break;
        }
        let amount = priority.recommended_amount.min(distribution.remaining_cash);
        if amount <= 0 {
            continue;
        }
        *distribution
            .allocations
            .entry(priority.needs.envelope_id.clone())
            .or_default() += amount;
        distribution.total_allocated += amount;
        distribution.remaining_cash -= amount;
    }

    distribution
}

/// Splits `cash` evenly across active envelopes, flooring to the cent.
///
/// The floored remainder is not allocated.
#[must_use]
pub fn distribute_equally(envelopes: &[envelope::Model], cash: i64) -> BTreeMap<String, i64> {
    let active: Vec<&envelope::Model> = envelopes.iter().filter(|e| !e.archived).collect();
    let Ok(count) = i64::try_from(active.len()) else {
        return BTreeMap::new();
    };
    if count == 0 || cash <= 0 {
        return BTreeMap::new();
    }

    let share = cash / count;
    active.into_iter().map(|e| (e.id.clone(), share)).collect()
}

/// Monthly need used to weight [`distribute_proportionally`], in cents.
#[must_use]
pub fn monthly_weight(envelope: &envelope::Model) -> i64 {
    // 26.07 pay periods per year spread over 12 months
    let biweekly_monthly = envelope.biweekly_allocation * 2607 / 1200;
    match FundingClass::from(envelope.envelope_type) {
        FundingClass::Bill => biweekly_monthly,
        FundingClass::Variable => envelope.monthly_budget,
        FundingClass::Savings if envelope.biweekly_allocation > 0 => biweekly_monthly,
        FundingClass::Savings => DEFAULT_SAVINGS_WEIGHT,
    }
}

/// Splits `cash` across active envelopes in proportion to their monthly need,
/// flooring to the cent. Falls back to an equal split when every weight is zero.
#[must_use]
pub fn distribute_proportionally(
    envelopes: &[envelope::Model],
    cash: i64,
) -> BTreeMap<String, i64> {
    if cash <= 0 {
        return BTreeMap::new();
    }

    let weighted: Vec<(&envelope::Model, i64)> = envelopes
        .iter()
        .filter(|e| !e.archived)
        .map(|e| (e, monthly_weight(e).max(0)))
        .collect();
    let total: i64 = weighted.iter().map(|(_, w)| w).sum();
    if total == 0 {
        return distribute_equally(envelopes, cash);
    }

    weighted
        .into_iter()
        .filter(|(_, weight)| *weight > 0)
        .filter_map(|(e, weight)| {
            let share = i128::from(cash) * i128::from(weight) / i128::from(total);
            i64::try_from(share).ok().map(|share| (e.id.clone(), share))
        })
        .collect()
}
