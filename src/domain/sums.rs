use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, Zero};
use log::warn;
use serde::{Deserialize, Serialize};

use super::order::{GroupOrder, OrderAggregate, OrderArticle};
use super::pricing::{PriceKind, PriceMarkup};

/// Pricing basis an order total is computed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SumBasis {
    /// Ordered units at net price.
    Clear,
    /// Ordered units at gross price.
    Gross,
    /// Ordered units at foodcoop price.
    Fc,
    /// Group quantities at foodcoop price.
    Groups,
    /// Group quantities at gross price.
    GroupsWithoutMarkup,
}

impl SumBasis {
    pub const ALL: [SumBasis; 5] = [
        SumBasis::Clear,
        SumBasis::Gross,
        SumBasis::Fc,
        SumBasis::Groups,
        SumBasis::GroupsWithoutMarkup,
    ];

    pub fn price_kind(self) -> PriceKind {
        match self {
            SumBasis::Clear => PriceKind::Net,
            SumBasis::Gross | SumBasis::GroupsWithoutMarkup => PriceKind::Gross,
            SumBasis::Fc | SumBasis::Groups => PriceKind::Foodcoop,
        }
    }

    /// Whether the basis reads group quantities rather than ordered units.
    pub fn is_group_basis(self) -> bool {
        matches!(self, SumBasis::Groups | SumBasis::GroupsWithoutMarkup)
    }
}

/// Total of the order under `basis`.
pub fn sum(agg: &OrderAggregate, basis: SumBasis, markup: &PriceMarkup) -> BigDecimal {
    if basis.is_group_basis() {
        agg.group_orders
            .iter()
            .map(|go| group_sum(agg, go, basis, markup))
            .fold(BigDecimal::zero(), |acc, v| acc + v)
    } else {
        let kind = basis.price_kind();
        agg.articles
            .iter()
            .map(|oa| {
                let units = BigDecimal::from(oa.units_to_order) * BigDecimal::from(oa.unit_quantity());
                units * unit_price(oa, kind, markup)
            })
            .fold(BigDecimal::zero(), |acc, v| acc + v)
    }
}

/// Total of one group's lines, priced with the price kind of `basis`.
pub fn group_sum(
    agg: &OrderAggregate,
    group_order: &GroupOrder,
    basis: SumBasis,
    markup: &PriceMarkup,
) -> BigDecimal {
    let kind = basis.price_kind();
    group_order
        .articles
        .iter()
        .filter_map(|goa| {
            let oa = agg.order_article(goa.order_article_id)?;
            Some(BigDecimal::from(goa.billed_quantity()) * unit_price(oa, kind, markup))
        })
        .fold(BigDecimal::zero(), |acc, v| acc + v)
}

/// What the groups pay minus what the supplier billed, `None` without invoice.
pub fn profit(agg: &OrderAggregate, with_markup: bool, markup: &PriceMarkup) -> Option<BigDecimal> {
    let invoice = agg.invoice.as_ref()?;
    let basis = if with_markup {
        SumBasis::Groups
    } else {
        SumBasis::GroupsWithoutMarkup
    };
    Some(sum(agg, basis, markup) - &invoice.net_amount)
}

/// Order articles bucketed by article category, both sorted by name.
pub fn articles_grouped_by_category(agg: &OrderAggregate) -> Vec<(String, Vec<&OrderArticle>)> {
    let mut groups: BTreeMap<String, Vec<&OrderArticle>> = BTreeMap::new();
    for oa in &agg.articles {
        groups
            .entry(oa.article.category().to_string())
            .or_default()
            .push(oa);
    }
    groups
        .into_iter()
        .map(|(category, mut articles)| {
            articles.sort_by(|a, b| a.article.name.cmp(&b.article.name));
            (category, articles)
        })
        .collect()
}

fn unit_price(oa: &OrderArticle, kind: PriceKind, markup: &PriceMarkup) -> BigDecimal {
    match oa.price() {
        Some(price) => price.unit_price(kind, markup),
        None => {
            warn!(
                "Article {} ({}) has no price, counting it as zero",
                oa.article.name, oa.article.id
            );
            BigDecimal::zero()
        }
    }
}
