use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::{
    article_prices, articles, financial_transactions, group_order_articles, group_orders, invoices,
    order_articles, order_outbox, ordergroups, orders, suppliers,
};

#[derive(Debug, Insertable)]
#[diesel(table_name = suppliers)]
pub struct NewSupplierRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = articles)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ArticleRow {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub name: String,
    pub category: String,
    pub unit_quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = articles)]
pub struct NewArticleRow {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub name: String,
    pub category: String,
    pub unit_quantity: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = article_prices)]
#[diesel(belongs_to(ArticleRow, foreign_key = article_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ArticlePriceRow {
    pub id: Uuid,
    pub article_id: Uuid,
    pub unit_quantity: i32,
    pub price: BigDecimal,
    pub tax: BigDecimal,
    pub deposit: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = article_prices)]
pub struct NewArticlePriceRow {
    pub id: Uuid,
    pub article_id: Uuid,
    pub unit_quantity: i32,
    pub price: BigDecimal,
    pub tax: BigDecimal,
    pub deposit: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub starts: DateTime<Utc>,
    pub ends: Option<DateTime<Utc>>,
    pub state: String,
    pub booked: bool,
    pub foodcoop_result: Option<BigDecimal>,
    pub note: Option<String>,
    pub updated_by: Option<Uuid>,
    pub lock_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub starts: DateTime<Utc>,
    pub ends: Option<DateTime<Utc>>,
    pub state: String,
    pub note: Option<String>,
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = order_articles)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderArticleRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub article_id: Uuid,
    pub quantity: i32,
    pub tolerance: i32,
    pub units_to_order: i32,
    pub article_price_id: Option<Uuid>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_articles)]
pub struct NewOrderArticleRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub article_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = ordergroups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrdergroupRow {
    pub id: Uuid,
    pub name: String,
    pub account_balance: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ordergroups)]
pub struct NewOrdergroupRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = group_orders)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupOrderRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ordergroup_id: Uuid,
    pub price: BigDecimal,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = group_orders)]
pub struct NewGroupOrderRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ordergroup_id: Uuid,
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = group_order_articles)]
#[diesel(belongs_to(GroupOrderRow, foreign_key = group_order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupOrderArticleRow {
    pub id: Uuid,
    pub group_order_id: Uuid,
    pub order_article_id: Uuid,
    pub quantity: i32,
    pub tolerance: i32,
    pub result: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = group_order_articles)]
pub struct NewGroupOrderArticleRow {
    pub id: Uuid,
    pub group_order_id: Uuid,
    pub order_article_id: Uuid,
    pub quantity: i32,
    pub tolerance: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = invoices)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InvoiceRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub net_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = invoices)]
pub struct NewInvoiceRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub net_amount: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = financial_transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FinancialTransactionRow {
    pub id: Uuid,
    pub ordergroup_id: Uuid,
    pub amount: BigDecimal,
    pub note: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = financial_transactions)]
pub struct NewFinancialTransactionRow {
    pub id: Uuid,
    pub ordergroup_id: Uuid,
    pub amount: BigDecimal,
    pub note: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = order_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}
