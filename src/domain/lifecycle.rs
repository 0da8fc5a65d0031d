//! Order lifecycle: `open` -> `finished` -> `closed`.
//!
//! Creation is gated by [`validate_new_order`]. Finishing freezes the article
//! prices, allocates the ordered amount to the groups and recomputes the group
//! prices; [`plan_finish`] computes all of it up front so the repository can
//! write it in one transaction.

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use log::warn;
use uuid::Uuid;

use super::aggregator::{aggregate, apply_totals, OrderArticleTotals};
use super::errors::{DomainError, ValidationErrors};
use super::order::{GroupOrderArticle, NewOrder, OrderAggregate, OrderState};
use super::pricing::PriceMarkup;
use super::sums::{group_sum, SumBasis};

/// Checks the fields a new order must carry.
pub fn validate_new_order(order: &NewOrder) -> Result<(), DomainError> {
    let mut errors = ValidationErrors::new();
    if order.supplier_id.is_none() {
        errors.add("supplier", "can't be blank");
    }
    match (order.starts, order.ends) {
        (None, _) => errors.add("starts", "can't be blank"),
        (Some(starts), Some(ends)) if ends <= starts => {
            errors.add("ends", "must be after the start")
        }
        _ => {}
    }
    if order.article_ids.is_empty() {
        errors.add("articles", "must contain at least one article");
    }
    errors.into_result()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSnapshot {
    pub order_article_id: Uuid,
    pub article_price_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedResult {
    pub group_order_article_id: Uuid,
    pub result: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupPrice {
    pub group_order_id: Uuid,
    pub price: BigDecimal,
}

/// Everything that changes when an order is finished.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishPlan {
    pub ends: DateTime<Utc>,
    pub actor: Uuid,
    pub totals: Vec<OrderArticleTotals>,
    pub price_snapshots: Vec<PriceSnapshot>,
    pub results: Vec<AllocatedResult>,
    pub group_prices: Vec<GroupPrice>,
}

impl FinishPlan {
    /// Applies the plan to an in-memory aggregate.
    pub fn apply_to(&self, agg: &mut OrderAggregate) {
        apply_totals(&mut agg.articles, &self.totals);
        for snapshot in &self.price_snapshots {
            if let Some(oa) = agg
                .articles
                .iter_mut()
                .find(|oa| oa.id == snapshot.order_article_id)
            {
                oa.frozen_price = oa
                    .article
                    .current_price
                    .clone()
                    .filter(|p| p.id == snapshot.article_price_id);
            }
        }
        let results: HashMap<Uuid, i32> = self
            .results
            .iter()
            .map(|r| (r.group_order_article_id, r.result))
            .collect();
        for go in &mut agg.group_orders {
            if let Some(gp) = self.group_prices.iter().find(|gp| gp.group_order_id == go.id) {
                go.price = gp.price.clone();
            }
            for goa in &mut go.articles {
                if let Some(result) = results.get(&goa.id) {
                    goa.result = Some(*result);
                }
            }
        }
        agg.order.state = OrderState::Finished;
        agg.order.ends = Some(self.ends);
        agg.order.updated_by = Some(self.actor);
    }
}

/// Plans finishing the order, `None` when it is no longer open.
///
/// Prices are frozen first, so the units to order and the amount allocated
/// to the groups are both measured in the unit size of the frozen price.
pub fn plan_finish(
    agg: &OrderAggregate,
    actor: Uuid,
    now: DateTime<Utc>,
    markup: &PriceMarkup,
) -> Result<Option<FinishPlan>, DomainError> {
    if !agg.order.is_open() {
        return Ok(None);
    }

    let mut work = agg.clone();
    let mut price_snapshots = Vec::new();
    for oa in &mut work.articles {
        match oa.article.current_price.clone() {
            Some(price) => {
                price_snapshots.push(PriceSnapshot {
                    order_article_id: oa.id,
                    article_price_id: price.id,
                });
                oa.frozen_price = Some(price);
            }
            None => warn!(
                "Article {} ({}) has no price to freeze in order {}",
                oa.article.name, oa.article.id, agg.order.id
            ),
        }
    }

    let totals = aggregate(&work.articles, agg.group_order_articles())?;
    apply_totals(&mut work.articles, &totals);

    let mut results = Vec::new();
    for oa in &work.articles {
        let available = oa
            .units_to_order
            .checked_mul(oa.unit_quantity())
            .ok_or_else(|| {
                DomainError::InvalidInput(format!(
                    "ordered amount of {} is too large",
                    oa.article.name
                ))
            })?;
        let mut rows: Vec<&GroupOrderArticle> = work
            .group_order_articles()
            .filter(|goa| goa.order_article_id == oa.id)
            .collect();
        rows.sort_by_key(|goa| (goa.created_at, goa.id));
        results.extend(allocate(available, &rows));
    }
    let by_row: HashMap<Uuid, i32> = results
        .iter()
        .map(|r| (r.group_order_article_id, r.result))
        .collect();
    for goa in work.group_orders.iter_mut().flat_map(|go| go.articles.iter_mut()) {
        goa.result = Some(by_row.get(&goa.id).copied().unwrap_or(0));
    }

    let group_prices = work
        .group_orders
        .iter()
        .map(|go| GroupPrice {
            group_order_id: go.id,
            price: group_sum(&work, go, SumBasis::Groups, markup),
        })
        .collect();

    Ok(Some(FinishPlan {
        ends: now,
        actor,
        totals,
        price_snapshots,
        results,
        group_prices,
    }))
}

/// Hands out `available` single units, quantities first, then tolerance.
///
/// `rows` must be in submission order; earlier rows are served first.
pub fn allocate(available: i32, rows: &[&GroupOrderArticle]) -> Vec<AllocatedResult> {
    let mut remaining = available.max(0);
    let mut allocated = vec![0; rows.len()];

    for (slot, row) in allocated.iter_mut().zip(rows) {
        let take = row.quantity.max(0).min(remaining);
        *slot += take;
        remaining -= take;
    }
    for (slot, row) in allocated.iter_mut().zip(rows) {
        let take = row.tolerance.max(0).min(remaining);
        *slot += take;
        remaining -= take;
    }

    rows.iter()
        .zip(allocated)
        .map(|(row, result)| AllocatedResult {
            group_order_article_id: row.id,
            result,
        })
        .collect()
}

/// Checks an order may be closed without posting transactions.
pub fn check_close(agg: &OrderAggregate) -> Result<(), DomainError> {
    if agg.order.booked {
        return Err(DomainError::AlreadyBooked);
    }
    if !agg.order.is_finished() {
        return Err(DomainError::NotFinished);
    }
    Ok(())
}
