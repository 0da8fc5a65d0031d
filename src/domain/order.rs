use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::article::{order_units, Article};
use super::errors::DomainError;
use super::pricing::ArticlePrice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Open,
    Finished,
    Closed,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Open => "open",
            OrderState::Finished => "finished",
            OrderState::Closed => "closed",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(OrderState::Open),
            "finished" => Ok(OrderState::Finished),
            "closed" => Ok(OrderState::Closed),
            other => Err(DomainError::Internal(format!("unknown order state '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub supplier_name: String,
    pub starts: DateTime<Utc>,
    pub ends: Option<DateTime<Utc>>,
    pub state: OrderState,
    pub booked: bool,
    pub foodcoop_result: Option<BigDecimal>,
    pub note: Option<String>,
    pub updated_by: Option<Uuid>,
    pub lock_version: i32,
}

impl Order {
    /// Orders are named after their supplier.
    pub fn name(&self) -> &str {
        &self.supplier_name
    }

    pub fn is_open(&self) -> bool {
        self.state == OrderState::Open
    }

    pub fn is_finished(&self) -> bool {
        self.state == OrderState::Finished
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.ends.is_some_and(|ends| ends <= now)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderArticle {
    pub id: Uuid,
    pub article: Article,
    pub quantity: i32,
    pub tolerance: i32,
    pub units_to_order: i32,
    /// Price frozen when the order was finished.
    pub frozen_price: Option<ArticlePrice>,
}

impl OrderArticle {
    /// The frozen snapshot once finished, the article's current price before.
    pub fn price(&self) -> Option<&ArticlePrice> {
        self.frozen_price
            .as_ref()
            .or(self.article.current_price.as_ref())
    }

    /// Unit size of the price in effect, the catalog's without any price.
    pub fn unit_quantity(&self) -> i32 {
        self.price()
            .map(|p| p.unit_quantity)
            .unwrap_or(self.article.unit_quantity)
    }

    /// Order units to buy, measured in [`OrderArticle::unit_quantity`].
    pub fn calculate_order_quantity(&self, quantity: i32, tolerance: i32) -> i32 {
        order_units(self.unit_quantity(), quantity, tolerance)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOrderArticle {
    pub id: Uuid,
    pub order_article_id: Uuid,
    pub quantity: i32,
    pub tolerance: i32,
    /// Quantity allocated to the group when the order was finished.
    pub result: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl GroupOrderArticle {
    /// Quantity the group pays for.
    pub fn billed_quantity(&self) -> i32 {
        self.result.unwrap_or(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOrder {
    pub id: Uuid,
    pub ordergroup_id: Uuid,
    pub ordergroup_name: String,
    pub price: BigDecimal,
    pub articles: Vec<GroupOrderArticle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    pub net_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

/// An order with everything the workflow computes on.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAggregate {
    pub order: Order,
    pub articles: Vec<OrderArticle>,
    pub group_orders: Vec<GroupOrder>,
    pub invoice: Option<Invoice>,
}

impl OrderAggregate {
    pub fn order_article(&self, id: Uuid) -> Option<&OrderArticle> {
        self.articles.iter().find(|oa| oa.id == id)
    }

    pub fn order_article_for(&self, article_id: Uuid) -> Option<&OrderArticle> {
        self.articles.iter().find(|oa| oa.article.id == article_id)
    }

    pub fn group_order(&self, ordergroup_id: Uuid) -> Option<&GroupOrder> {
        self.group_orders
            .iter()
            .find(|go| go.ordergroup_id == ordergroup_id)
    }

    pub fn group_order_articles(&self) -> impl Iterator<Item = &GroupOrderArticle> {
        self.group_orders.iter().flat_map(|go| go.articles.iter())
    }

    pub fn ordergroup_ids(&self) -> Vec<Uuid> {
        self.group_orders.iter().map(|go| go.ordergroup_id).collect()
    }
}

/// Row of the `open`, `finished` and `closed` collections.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub id: Uuid,
    pub supplier_name: String,
    pub starts: DateTime<Utc>,
    pub ends: Option<DateTime<Utc>>,
    pub state: OrderState,
    pub booked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub supplier_id: Option<Uuid>,
    pub starts: Option<DateTime<Utc>>,
    pub ends: Option<DateTime<Utc>>,
    pub article_ids: Vec<Uuid>,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
}

/// One requested line of a group's sub-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOrderLineInput {
    pub article_id: Uuid,
    pub quantity: i32,
    pub tolerance: i32,
}
