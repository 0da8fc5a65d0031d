use std::collections::HashSet;

use uuid::Uuid;

use super::errors::DomainError;
use super::order::OrderAggregate;

/// Difference between the articles of an order and a new selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionChange {
    /// Article ids that get a fresh, empty order article.
    pub added: Vec<Uuid>,
    /// Order article ids to delete.
    pub removed: Vec<Uuid>,
}

impl SelectionChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Works out which order articles to create and which to drop.
///
/// Articles still carrying group demand cannot be deselected.
pub fn reconcile(agg: &OrderAggregate, article_ids: &[Uuid]) -> Result<SelectionChange, DomainError> {
    let selected: HashSet<Uuid> = article_ids.iter().copied().collect();
    let present: HashSet<Uuid> = agg.articles.iter().map(|oa| oa.article.id).collect();

    let mut seen = HashSet::new();
    let added: Vec<Uuid> = article_ids
        .iter()
        .copied()
        .filter(|id| !present.contains(id) && seen.insert(*id))
        .collect();

    let removed: Vec<_> = agg
        .articles
        .iter()
        .filter(|oa| !selected.contains(&oa.article.id))
        .collect();

    let in_use: Vec<String> = removed
        .iter()
        .filter(|oa| {
            agg.group_order_articles().any(|goa| {
                goa.order_article_id == oa.id && (goa.quantity > 0 || goa.tolerance > 0)
            })
        })
        .map(|oa| oa.article.name.clone())
        .collect();
    if !in_use.is_empty() {
        return Err(DomainError::ArticleInUse(in_use));
    }

    Ok(SelectionChange {
        added,
        removed: removed.iter().map(|oa| oa.id).collect(),
    })
}
