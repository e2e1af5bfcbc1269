//! Size-wise quantity arithmetic shared by the cutting, batch and QC workflows.
//!
//! Everything here is pure: callers load the current ceilings (what an order item or an
//! assignment still has "left" per size) and ask for a validated or proportionally distributed
//! request before writing anything.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Pieces of one garment size
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SizeQuantity {
    pub size: String,
    pub quantity: i32,
}

impl SizeQuantity {
    pub fn new(size: impl Into<String>, quantity: i32) -> Self {
        Self {
            size: size.into(),
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("size {0} is not part of this item")]
    UnknownSize(String),
    #[error("size {size} has a negative quantity ({quantity})")]
    NegativeQuantity { size: String, quantity: i32 },
    #[error("size {size} requests {requested} pieces but only {remaining} remain")]
    ExceedsRemaining {
        size: String,
        requested: i32,
        remaining: i32,
    },
    #[error("nothing is left to move")]
    NothingRemaining,
    #[error("the request does not move any pieces")]
    EmptyRequest,
}

/// A move of pieces between assignments: explicit per-size counts, or a total that is spread
/// across sizes in proportion to what each size has left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MoveRequest {
    Sizes(Vec<SizeQuantity>),
    Total(i32),
}

fn same_size(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

fn clamp_to_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Quantity recorded for `size` (summed if it repeats), zero when absent.
/// Saturates at `i32::MAX`, which no ceiling can hold.
pub fn quantity_of(sizes: &[SizeQuantity], size: &str) -> i32 {
    clamp_to_i32(
        sizes
            .iter()
            .filter(|s| same_size(&s.size, size))
            .map(|s| i64::from(s.quantity))
            .sum(),
    )
}

/// Total pieces, saturating; use [`checked_sum`] on untrusted input
pub fn sum(sizes: &[SizeQuantity]) -> i32 {
    clamp_to_i32(sizes.iter().map(|s| i64::from(s.quantity)).sum())
}

/// Total pieces, or `None` when it does not fit an `i32`
pub fn checked_sum(sizes: &[SizeQuantity]) -> Option<i32> {
    sizes
        .iter()
        .try_fold(0i32, |acc, s| acc.checked_add(s.quantity))
}

/// `base - consumed` per size, clamped at zero, in `base` order
pub fn subtract_each(base: &[SizeQuantity], consumed: &[SizeQuantity]) -> Vec<SizeQuantity> {
    base.iter()
        .map(|b| SizeQuantity {
            size: b.size.clone(),
            quantity: b.quantity.saturating_sub(quantity_of(consumed, &b.size)).max(0),
        })
        .collect()
}

/// Per-size sum; sizes only present in `extra` are appended in their order
pub fn add_each(base: &[SizeQuantity], extra: &[SizeQuantity]) -> Vec<SizeQuantity> {
    let mut out: Vec<SizeQuantity> = base.to_vec();
    for e in extra {
        match out.iter_mut().find(|o| same_size(&o.size, &e.size)) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(e.quantity),
            None => out.push(e.clone()),
        }
    }
    out
}

/// Checks `requested` against `ceilings`.
///
/// Returns the request merged per size, using the ceiling's spelling of each size and the
/// ceiling order. Sizes not mentioned in the request are left out.
pub fn validate_within(
    requested: &[SizeQuantity],
    ceilings: &[SizeQuantity],
) -> Result<Vec<SizeQuantity>, AllocationError> {
    for r in requested {
        if r.quantity < 0 {
            return Err(AllocationError::NegativeQuantity {
                size: r.size.clone(),
                quantity: r.quantity,
            });
        }
        if !ceilings.iter().any(|c| same_size(&c.size, &r.size)) {
            return Err(AllocationError::UnknownSize(r.size.trim().to_string()));
        }
    }

    let mut out = Vec::new();
    for ceiling in ceilings {
        if !requested.iter().any(|r| same_size(&r.size, &ceiling.size)) {
            continue;
        }
        let wanted = quantity_of(requested, &ceiling.size);
        let remaining = ceiling.quantity.max(0);
        if wanted > remaining {
            return Err(AllocationError::ExceedsRemaining {
                size: ceiling.size.clone(),
                requested: wanted,
                remaining,
            });
        }
        out.push(SizeQuantity::new(ceiling.size.clone(), wanted));
    }
    Ok(out)
}

/// Splits `total` pieces across the sizes of `ceilings` in proportion to each ceiling.
///
/// Each size first gets the floor of its exact share; the pieces lost to rounding go one at a
/// time to the sizes with the largest remainder, earlier sizes winning ties. The result lists
/// every ceiling size, including those that receive nothing.
pub fn distribute_proportionally(
    total: i32,
    ceilings: &[SizeQuantity],
) -> Result<Vec<SizeQuantity>, AllocationError> {
    if total < 0 {
        return Err(AllocationError::NegativeQuantity {
            size: "total".to_string(),
            quantity: total,
        });
    }

    let caps: Vec<i64> = ceilings.iter().map(|c| i64::from(c.quantity.max(0))).collect();
    let available: i64 = caps.iter().sum();

    if total == 0 {
        return Ok(ceilings
            .iter()
            .map(|c| SizeQuantity::new(c.size.clone(), 0))
            .collect());
    }
    if available == 0 {
        return Err(AllocationError::NothingRemaining);
    }
    let wanted = i64::from(total);
    if wanted > available {
        return Err(AllocationError::ExceedsRemaining {
            size: "total".to_string(),
            requested: total,
            remaining: i32::try_from(available).unwrap_or(i32::MAX),
        });
    }

    let mut shares: Vec<i64> = caps.iter().map(|cap| wanted * cap / available).collect();
    let remainders: Vec<i64> = caps.iter().map(|cap| wanted * cap % available).collect();
    let mut leftover = wanted - shares.iter().sum::<i64>();

    let mut order: Vec<usize> = (0..caps.len()).collect();
    // stable sort keeps the earlier size first on equal remainders
    order.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]));

    for idx in order {
        if leftover == 0 {
            break;
        }
        if shares[idx] < caps[idx] {
            shares[idx] += 1;
            leftover -= 1;
        }
    }

    Ok(ceilings
        .iter()
        .zip(shares)
        .map(|(c, share)| {
            SizeQuantity::new(c.size.clone(), i32::try_from(share).unwrap_or(i32::MAX))
        })
        .collect())
}

/// Resolves a move request into the non-zero per-size quantities to move
pub fn resolve_request(
    request: &MoveRequest,
    ceilings: &[SizeQuantity],
) -> Result<Vec<SizeQuantity>, AllocationError> {
    let resolved = match request {
        MoveRequest::Sizes(sizes) => validate_within(sizes, ceilings)?,
        MoveRequest::Total(total) => distribute_proportionally(*total, ceilings)?,
    };

    let moved: Vec<SizeQuantity> = resolved.into_iter().filter(|s| s.quantity > 0).collect();
    if moved.is_empty() {
        return Err(AllocationError::EmptyRequest);
    }
    Ok(moved)
}
