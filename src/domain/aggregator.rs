use std::collections::HashMap;

use uuid::Uuid;

use super::errors::DomainError;
use super::order::{GroupOrderArticle, OrderArticle};

/// Recomputed demand of one order article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderArticleTotals {
    pub order_article_id: Uuid,
    pub article_id: Uuid,
    pub quantity: i32,
    pub tolerance: i32,
    pub units_to_order: i32,
}

/// Sums the group rows per article and derives the order units to buy.
///
/// Returns one entry per order article, in the order given. Articles without
/// contributing rows get zero totals instead of being dropped. Rows pointing at
/// articles outside `order_articles` are ignored. Sums that do not fit an
/// `i32` are rejected as invalid input.
pub fn aggregate<'a, I>(
    order_articles: &[OrderArticle],
    rows: I,
) -> Result<Vec<OrderArticleTotals>, DomainError>
where
    I: IntoIterator<Item = &'a GroupOrderArticle>,
{
    let mut sums: HashMap<Uuid, (i32, i32)> = HashMap::new();
    for row in rows {
        let entry = sums.entry(row.order_article_id).or_insert((0, 0));
        match (
            entry.0.checked_add(row.quantity),
            entry.1.checked_add(row.tolerance),
        ) {
            (Some(quantity), Some(tolerance)) => *entry = (quantity, tolerance),
            _ => {
                return Err(DomainError::InvalidInput(format!(
                    "total quantity of order article {} is too large",
                    row.order_article_id
                )))
            }
        }
    }

    Ok(order_articles
        .iter()
        .map(|oa| {
            let (quantity, tolerance) = sums.get(&oa.id).copied().unwrap_or((0, 0));
            OrderArticleTotals {
                order_article_id: oa.id,
                article_id: oa.article.id,
                quantity,
                tolerance,
                units_to_order: oa.calculate_order_quantity(quantity, tolerance),
            }
        })
        .collect())
}

/// Whether writing `totals` would change any stored order article.
pub fn totals_differ(order_articles: &[OrderArticle], totals: &[OrderArticleTotals]) -> bool {
    if order_articles.len() != totals.len() {
        return true;
    }
    totals.iter().any(|t| {
        order_articles
            .iter()
            .find(|oa| oa.id == t.order_article_id)
            .map_or(true, |oa| {
                oa.quantity != t.quantity
                    || oa.tolerance != t.tolerance
                    || oa.units_to_order != t.units_to_order
            })
    })
}

/// Copies computed totals onto the matching order articles.
pub fn apply_totals(order_articles: &mut [OrderArticle], totals: &[OrderArticleTotals]) {
    for t in totals {
        if let Some(oa) = order_articles.iter_mut().find(|oa| oa.id == t.order_article_id) {
            oa.quantity = t.quantity;
            oa.tolerance = t.tolerance;
            oa.units_to_order = t.units_to_order;
        }
    }
}
