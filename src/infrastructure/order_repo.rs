use std::collections::{HashMap, HashSet};

use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::aggregator::OrderArticleTotals;
use crate::domain::article::Article;
use crate::domain::errors::{DomainError, ValidationErrors};
use crate::domain::lifecycle::FinishPlan;
use crate::domain::order::{
    GroupOrder, GroupOrderArticle, Invoice, NewOrder, Order, OrderAggregate, OrderArticle,
    OrderState, OrderSummary,
};
use crate::domain::ports::{GroupOrderUpdate, OrderRepository};
use crate::domain::pricing::ArticlePrice;
use crate::domain::selection::SelectionChange;
use crate::domain::settlement::BalancePlan;
use crate::schema::{
    article_prices, articles, financial_transactions, group_order_articles, group_orders, invoices,
    order_articles, ordergroups, orders, suppliers,
};

use super::models::{
    ArticlePriceRow, ArticleRow, GroupOrderArticleRow, GroupOrderRow, InvoiceRow,
    NewFinancialTransactionRow, NewGroupOrderArticleRow, NewGroupOrderRow, NewInvoiceRow,
    NewOrderArticleRow, NewOrderRow, OrderArticleRow, OrderRow,
};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

// ── Row conversions ──────────────────────────────────────────────────────────

impl From<ArticlePriceRow> for ArticlePrice {
    fn from(row: ArticlePriceRow) -> Self {
        ArticlePrice {
            id: row.id,
            article_id: row.article_id,
            unit_quantity: row.unit_quantity,
            price: row.price,
            tax: row.tax,
            deposit: row.deposit,
            created_at: row.created_at,
        }
    }
}

impl From<GroupOrderArticleRow> for GroupOrderArticle {
    fn from(row: GroupOrderArticleRow) -> Self {
        GroupOrderArticle {
            id: row.id,
            order_article_id: row.order_article_id,
            quantity: row.quantity,
            tolerance: row.tolerance,
            result: row.result,
            created_at: row.created_at,
        }
    }
}

/// Whether every id in `article_ids` is an article of the supplier.
///
/// `article_ids` must be free of duplicates.
fn all_of_supplier(
    conn: &mut PgConnection,
    supplier_id: Uuid,
    article_ids: &[Uuid],
) -> Result<bool, DomainError> {
    let known: i64 = articles::table
        .filter(articles::id.eq_any(article_ids))
        .filter(articles::supplier_id.eq(supplier_id))
        .count()
        .get_result(conn)?;
    Ok(known == article_ids.len() as i64)
}

// ── Optimistic locking ───────────────────────────────────────────────────────

/// Moves the order to the next lock version, or fails if it moved already.
///
/// Runs first in every write transaction; the row lock it takes serialises
/// concurrent writers until commit.
fn bump_version(conn: &mut PgConnection, order_id: Uuid, expected: i32) -> Result<(), DomainError> {
    let updated = diesel::update(
        orders::table
            .filter(orders::id.eq(order_id))
            .filter(orders::lock_version.eq(expected)),
    )
    .set((
        orders::lock_version.eq(expected + 1),
        orders::updated_at.eq(Utc::now()),
    ))
    .execute(conn)?;
    if updated == 0 {
        log::debug!("Order {order_id}: lock version {expected} is stale");
        return Err(DomainError::Conflict);
    }
    Ok(())
}

fn write_totals(conn: &mut PgConnection, totals: &[OrderArticleTotals]) -> Result<(), DomainError> {
    for t in totals {
        diesel::update(order_articles::table.find(t.order_article_id))
            .set((
                order_articles::quantity.eq(t.quantity),
                order_articles::tolerance.eq(t.tolerance),
                order_articles::units_to_order.eq(t.units_to_order),
            ))
            .execute(conn)?;
    }
    Ok(())
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn load(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrderAggregate>, DomainError> {
        let row = orders::table
            .find(id)
            .select(OrderRow::as_select())
            .first(conn)
            .optional()?;
        let Some(row) = row else {
            return Ok(None);
        };

        let supplier_name: String = suppliers::table
            .find(row.supplier_id)
            .select(suppliers::name)
            .first(conn)?;

        let article_rows: Vec<(OrderArticleRow, ArticleRow)> = order_articles::table
            .inner_join(articles::table)
            .filter(order_articles::order_id.eq(id))
            .order(articles::name.asc())
            .select((OrderArticleRow::as_select(), ArticleRow::as_select()))
            .load(conn)?;

        // Newest first, so the first row seen per article is its current price.
        let article_ids: Vec<Uuid> = article_rows.iter().map(|(_, a)| a.id).collect();
        let price_rows: Vec<ArticlePriceRow> = article_prices::table
            .filter(article_prices::article_id.eq_any(&article_ids))
            .order((article_prices::article_id, article_prices::created_at.desc()))
            .select(ArticlePriceRow::as_select())
            .load(conn)?;
        let mut current: HashMap<Uuid, ArticlePrice> = HashMap::new();
        let mut by_id: HashMap<Uuid, ArticlePrice> = HashMap::new();
        for price in price_rows.into_iter().map(ArticlePrice::from) {
            current.entry(price.article_id).or_insert_with(|| price.clone());
            by_id.insert(price.id, price);
        }

        let articles = article_rows
            .into_iter()
            .map(|(oa, a)| OrderArticle {
                id: oa.id,
                frozen_price: oa.article_price_id.and_then(|pid| by_id.get(&pid).cloned()),
                article: Article {
                    id: a.id,
                    name: a.name,
                    category: a.category,
                    unit_quantity: a.unit_quantity,
                    current_price: current.get(&a.id).cloned(),
                },
                quantity: oa.quantity,
                tolerance: oa.tolerance,
                units_to_order: oa.units_to_order,
            })
            .collect();

        let group_rows: Vec<(GroupOrderRow, String)> = group_orders::table
            .inner_join(ordergroups::table)
            .filter(group_orders::order_id.eq(id))
            .order(group_orders::created_at.asc())
            .select((GroupOrderRow::as_select(), ordergroups::name))
            .load(conn)?;
        let group_ids: Vec<Uuid> = group_rows.iter().map(|(go, _)| go.id).collect();
        let line_rows: Vec<GroupOrderArticleRow> = group_order_articles::table
            .filter(group_order_articles::group_order_id.eq_any(&group_ids))
            .order((group_order_articles::created_at.asc(), group_order_articles::id))
            .select(GroupOrderArticleRow::as_select())
            .load(conn)?;
        let mut lines: HashMap<Uuid, Vec<GroupOrderArticle>> = HashMap::new();
        for line in line_rows {
            lines
                .entry(line.group_order_id)
                .or_default()
                .push(line.into());
        }
        let group_orders = group_rows
            .into_iter()
            .map(|(go, name)| GroupOrder {
                id: go.id,
                ordergroup_id: go.ordergroup_id,
                ordergroup_name: name,
                price: go.price,
                articles: lines.remove(&go.id).unwrap_or_default(),
            })
            .collect();

        let invoice = invoices::table
            .filter(invoices::order_id.eq(id))
            .select(InvoiceRow::as_select())
            .first(conn)
            .optional()?
            .map(|i| Invoice {
                id: i.id,
                net_amount: i.net_amount,
                created_at: i.created_at,
            });

        Ok(Some(OrderAggregate {
            order: Order {
                id: row.id,
                supplier_id: row.supplier_id,
                supplier_name,
                starts: row.starts,
                ends: row.ends,
                state: row.state.parse()?,
                booked: row.booked,
                foodcoop_result: row.foodcoop_result,
                note: row.note,
                updated_by: row.updated_by,
                lock_version: row.lock_version,
            },
            articles,
            group_orders,
            invoice,
        }))
    }
}

impl OrderRepository for DieselOrderRepository {
    fn create(&self, order: &NewOrder) -> Result<Uuid, DomainError> {
        let (Some(supplier_id), Some(starts)) = (order.supplier_id, order.starts) else {
            return Err(DomainError::InvalidInput(
                "supplier and start are required".to_string(),
            ));
        };
        let mut seen = HashSet::new();
        let article_ids: Vec<Uuid> = order
            .article_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let mut errors = ValidationErrors::new();
            let supplier = suppliers::table
                .find(supplier_id)
                .select(suppliers::id)
                .first::<Uuid>(conn)
                .optional()?;
            if supplier.is_none() {
                errors.add("supplier", "does not exist");
            }
            if !all_of_supplier(conn, supplier_id, &article_ids)? {
                errors.add("articles", "must all belong to the supplier");
            }
            errors.into_result()?;

            // 1. Insert the order
            let order_id = Uuid::new_v4();
            diesel::insert_into(orders::table)
                .values(&NewOrderRow {
                    id: order_id,
                    supplier_id,
                    starts,
                    ends: order.ends,
                    state: OrderState::Open.as_str().to_string(),
                    note: order.note.clone(),
                    updated_by: order.created_by,
                })
                .execute(conn)?;

            // 2. Insert one empty order article per selected article
            let new_articles: Vec<NewOrderArticleRow> = article_ids
                .iter()
                .map(|article_id| NewOrderArticleRow {
                    id: Uuid::new_v4(),
                    order_id,
                    article_id: *article_id,
                })
                .collect();
            diesel::insert_into(order_articles::table)
                .values(&new_articles)
                .execute(conn)?;

            Ok(order_id)
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderAggregate>, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| Self::load(conn, id))
    }

    fn list(&self, state: OrderState) -> Result<Vec<OrderSummary>, DomainError> {
        let mut conn = self.pool.get()?;

        let rows: Vec<(OrderRow, String)> = orders::table
            .inner_join(suppliers::table)
            .filter(orders::state.eq(state.as_str()))
            .order(orders::ends.desc().nulls_last())
            .select((OrderRow::as_select(), suppliers::name))
            .load(&mut conn)?;

        rows.into_iter()
            .map(|(o, supplier_name)| {
                Ok(OrderSummary {
                    id: o.id,
                    supplier_name,
                    starts: o.starts,
                    ends: o.ends,
                    state: o.state.parse()?,
                    booked: o.booked,
                })
            })
            .collect()
    }

    fn save_selection(
        &self,
        order_id: Uuid,
        expected_version: i32,
        change: &SelectionChange,
        actor: Uuid,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            bump_version(conn, order_id, expected_version)?;
            diesel::update(orders::table.find(order_id))
                .set(orders::updated_by.eq(Some(actor)))
                .execute(conn)?;

            if !change.added.is_empty() {
                let supplier_id: Uuid = orders::table
                    .find(order_id)
                    .select(orders::supplier_id)
                    .first(conn)?;
                if !all_of_supplier(conn, supplier_id, &change.added)? {
                    let mut errors = ValidationErrors::new();
                    errors.add("articles", "must all belong to the supplier");
                    return Err(DomainError::Validation(errors));
                }
            }

            // Empty group lines go with their order article (ON DELETE CASCADE).
            if !change.removed.is_empty() {
                diesel::delete(
                    order_articles::table
                        .filter(order_articles::order_id.eq(order_id))
                        .filter(order_articles::id.eq_any(&change.removed)),
                )
                .execute(conn)?;
            }
            if !change.added.is_empty() {
                let rows: Vec<NewOrderArticleRow> = change
                    .added
                    .iter()
                    .map(|article_id| NewOrderArticleRow {
                        id: Uuid::new_v4(),
                        order_id,
                        article_id: *article_id,
                    })
                    .collect();
                diesel::insert_into(order_articles::table)
                    .values(&rows)
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    fn save_group_order(
        &self,
        order_id: Uuid,
        expected_version: i32,
        update: &GroupOrderUpdate,
        totals: &[OrderArticleTotals],
    ) -> Result<Uuid, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            bump_version(conn, order_id, expected_version)?;
            let now = Utc::now();

            let group_order_id: Uuid = diesel::insert_into(group_orders::table)
                .values(&NewGroupOrderRow {
                    id: Uuid::new_v4(),
                    order_id,
                    ordergroup_id: update.ordergroup_id,
                    updated_by: Some(update.actor),
                })
                .on_conflict((group_orders::order_id, group_orders::ordergroup_id))
                .do_update()
                .set((
                    group_orders::updated_by.eq(Some(update.actor)),
                    group_orders::updated_at.eq(now),
                ))
                .returning(group_orders::id)
                .get_result(conn)?;

            let order_article_ids: HashMap<Uuid, Uuid> = order_articles::table
                .filter(order_articles::order_id.eq(order_id))
                .select((order_articles::article_id, order_articles::id))
                .load::<(Uuid, Uuid)>(conn)?
                .into_iter()
                .collect();
            let rows = update
                .lines
                .iter()
                .map(|line| {
                    let order_article_id =
                        *order_article_ids.get(&line.article_id).ok_or_else(|| {
                            DomainError::InvalidInput(format!(
                                "article {} is not part of this order",
                                line.article_id
                            ))
                        })?;
                    Ok(NewGroupOrderArticleRow {
                        id: Uuid::new_v4(),
                        group_order_id,
                        order_article_id,
                        quantity: line.quantity,
                        tolerance: line.tolerance,
                    })
                })
                .collect::<Result<Vec<_>, DomainError>>()?;

            let kept: Vec<Uuid> = rows.iter().map(|r| r.order_article_id).collect();
            diesel::delete(
                group_order_articles::table
                    .filter(group_order_articles::group_order_id.eq(group_order_id))
                    .filter(group_order_articles::order_article_id.ne_all(&kept)),
            )
            .execute(conn)?;

            // Existing lines keep their id and creation time, which decide
            // the allocation order when the order is finished.
            if !rows.is_empty() {
                diesel::insert_into(group_order_articles::table)
                    .values(&rows)
                    .on_conflict((
                        group_order_articles::group_order_id,
                        group_order_articles::order_article_id,
                    ))
                    .do_update()
                    .set((
                        group_order_articles::quantity.eq(excluded(group_order_articles::quantity)),
                        group_order_articles::tolerance
                            .eq(excluded(group_order_articles::tolerance)),
                        group_order_articles::updated_at.eq(now),
                    ))
                    .execute(conn)?;
            }

            write_totals(conn, totals)?;
            Ok(group_order_id)
        })
    }

    fn save_totals(
        &self,
        order_id: Uuid,
        expected_version: i32,
        totals: &[OrderArticleTotals],
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            bump_version(conn, order_id, expected_version)?;
            write_totals(conn, totals)
        })
    }

    fn apply_finish(
        &self,
        order_id: Uuid,
        expected_version: i32,
        plan: &FinishPlan,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            bump_version(conn, order_id, expected_version)?;

            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(order_id))
                    .filter(orders::state.eq(OrderState::Open.as_str())),
            )
            .set((
                orders::state.eq(OrderState::Finished.as_str()),
                orders::ends.eq(Some(plan.ends)),
                orders::updated_by.eq(Some(plan.actor)),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Err(DomainError::NotOpen);
            }

            write_totals(conn, &plan.totals)?;
            for snapshot in &plan.price_snapshots {
                diesel::update(order_articles::table.find(snapshot.order_article_id))
                    .set(order_articles::article_price_id.eq(Some(snapshot.article_price_id)))
                    .execute(conn)?;
            }
            for allocated in &plan.results {
                diesel::update(group_order_articles::table.find(allocated.group_order_article_id))
                    .set(group_order_articles::result.eq(Some(allocated.result)))
                    .execute(conn)?;
            }
            for group_price in &plan.group_prices {
                diesel::update(group_orders::table.find(group_price.group_order_id))
                    .set(group_orders::price.eq(&group_price.price))
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    fn apply_balance(
        &self,
        order_id: Uuid,
        expected_version: i32,
        plan: &BalancePlan,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            bump_version(conn, order_id, expected_version)?;

            // 1. Mark the order booked; this is the guard against booking twice
            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(order_id))
                    .filter(orders::booked.eq(false))
                    .filter(orders::state.eq(OrderState::Finished.as_str())),
            )
            .set((
                orders::booked.eq(true),
                orders::state.eq(OrderState::Closed.as_str()),
                orders::updated_by.eq(Some(plan.actor)),
                orders::foodcoop_result.eq(plan.foodcoop_result.clone()),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Err(DomainError::AlreadyBooked);
            }

            // 2. Post one transaction per group and move its balance
            let rows: Vec<NewFinancialTransactionRow> = plan
                .transactions
                .iter()
                .map(|t| NewFinancialTransactionRow {
                    id: Uuid::new_v4(),
                    ordergroup_id: t.ordergroup_id,
                    amount: t.amount.clone(),
                    note: t.note.clone(),
                    user_id: Some(plan.actor),
                })
                .collect();
            if !rows.is_empty() {
                diesel::insert_into(financial_transactions::table)
                    .values(&rows)
                    .execute(conn)?;
            }
            for t in &plan.transactions {
                diesel::update(ordergroups::table.find(t.ordergroup_id))
                    .set(ordergroups::account_balance.eq(ordergroups::account_balance + t.amount.clone()))
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    fn close(&self, order_id: Uuid, expected_version: i32, actor: Uuid) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            bump_version(conn, order_id, expected_version)?;
            let updated = diesel::update(
                orders::table
                    .filter(orders::id.eq(order_id))
                    .filter(orders::booked.eq(false))
                    .filter(orders::state.eq(OrderState::Finished.as_str())),
            )
            .set((
                orders::state.eq(OrderState::Closed.as_str()),
                orders::updated_by.eq(Some(actor)),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Err(DomainError::NotFinished);
            }
            Ok(())
        })
    }

    fn attach_invoice(&self, order_id: Uuid, net_amount: &BigDecimal) -> Result<Uuid, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // Bumped unconditionally so a balance computed on the old invoice conflicts.
            let updated = diesel::update(orders::table.find(order_id))
                .set((
                    orders::lock_version.eq(orders::lock_version + 1),
                    orders::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(DomainError::NotFound);
            }

            let id = diesel::insert_into(invoices::table)
                .values(&NewInvoiceRow {
                    id: Uuid::new_v4(),
                    order_id,
                    net_amount: net_amount.clone(),
                })
                .on_conflict(invoices::order_id)
                .do_update()
                .set(invoices::net_amount.eq(excluded(invoices::net_amount)))
                .returning(invoices::id)
                .get_result(conn)?;
            Ok(id)
        })
    }
}
