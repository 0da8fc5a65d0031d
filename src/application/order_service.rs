use std::collections::HashSet;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::domain::aggregator::{aggregate, totals_differ, OrderArticleTotals};
use crate::domain::errors::DomainError;
use crate::domain::lifecycle::{check_close, plan_finish, validate_new_order};
use crate::domain::order::{
    GroupOrder, GroupOrderArticle, GroupOrderLineInput, NewOrder, OrderAggregate, OrderArticle,
    OrderState, OrderSummary,
};
use crate::domain::ports::{GroupOrderUpdate, Messenger, OrderRepository};
use crate::domain::pricing::PriceMarkup;
use crate::domain::selection::reconcile;
use crate::domain::settlement::plan_balance;
use crate::domain::sums::{self, SumBasis};

/// Template sent to all participating groups once an order is finished.
pub const ORDER_FINISHED_TEMPLATE: &str = "order_finished";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    Finished,
    /// The order was no longer open; nothing was written.
    AlreadyFinished,
}

pub struct OrderService<R, M> {
    repo: R,
    messenger: M,
    markup: PriceMarkup,
}

impl<R: OrderRepository, M: Messenger> OrderService<R, M> {
    pub fn new(repo: R, messenger: M, markup: PriceMarkup) -> Self {
        Self {
            repo,
            messenger,
            markup,
        }
    }

    pub fn markup(&self) -> &PriceMarkup {
        &self.markup
    }

    pub fn create_order(&self, order: NewOrder) -> Result<Uuid, DomainError> {
        validate_new_order(&order)?;
        let id = self.repo.create(&order)?;
        info!("Created order {id} with {} articles", order.article_ids.len());
        Ok(id)
    }

    pub fn get_order(&self, id: Uuid) -> Result<Option<OrderAggregate>, DomainError> {
        self.repo.find_by_id(id)
    }

    pub fn list_orders(&self, state: OrderState) -> Result<Vec<OrderSummary>, DomainError> {
        self.repo.list(state)
    }

    /// Makes the order's articles match `article_ids`.
    pub fn set_selected_articles(
        &self,
        order_id: Uuid,
        article_ids: &[Uuid],
        actor: Uuid,
    ) -> Result<(), DomainError> {
        let agg = self.load(order_id)?;
        if !agg.order.is_open() {
            return Err(DomainError::NotOpen);
        }
        let change = reconcile(&agg, article_ids)?;
        if change.is_empty() {
            debug!("Article selection of order {order_id} unchanged");
            return Ok(());
        }
        self.repo
            .save_selection(order_id, agg.order.lock_version, &change, actor)?;
        info!(
            "Order {order_id}: {} articles added, {} removed",
            change.added.len(),
            change.removed.len()
        );
        Ok(())
    }

    /// Replaces one group's sub-order and recomputes the order totals with it.
    pub fn update_group_order(
        &self,
        order_id: Uuid,
        ordergroup_id: Uuid,
        lines: Vec<GroupOrderLineInput>,
        actor: Uuid,
    ) -> Result<Uuid, DomainError> {
        let agg = self.load(order_id)?;
        if !agg.order.is_open() {
            return Err(DomainError::NotOpen);
        }

        let mut seen = HashSet::new();
        let mut rows: Vec<GroupOrderArticle> = agg
            .group_orders
            .iter()
            .filter(|go| go.ordergroup_id != ordergroup_id)
            .flat_map(|go| go.articles.iter().cloned())
            .collect();
        let mut kept = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity < 0 || line.tolerance < 0 {
                return Err(DomainError::InvalidInput(format!(
                    "quantity and tolerance of article {} must not be negative",
                    line.article_id
                )));
            }
            if !seen.insert(line.article_id) {
                return Err(DomainError::InvalidInput(format!(
                    "article {} is listed twice",
                    line.article_id
                )));
            }
            let oa = agg.order_article_for(line.article_id).ok_or_else(|| {
                DomainError::InvalidInput(format!(
                    "article {} is not part of this order",
                    line.article_id
                ))
            })?;
            if line.quantity == 0 && line.tolerance == 0 {
                continue;
            }
            rows.push(GroupOrderArticle {
                id: Uuid::new_v4(),
                order_article_id: oa.id,
                quantity: line.quantity,
                tolerance: line.tolerance,
                result: None,
                created_at: Utc::now(),
            });
            kept.push(line);
        }

        let totals = aggregate(&agg.articles, &rows)?;
        let update = GroupOrderUpdate {
            ordergroup_id,
            actor,
            lines: kept,
        };
        let group_order_id =
            self.repo
                .save_group_order(order_id, agg.order.lock_version, &update, &totals)?;
        debug!(
            "Order {order_id}: group {ordergroup_id} now orders {} articles",
            update.lines.len()
        );
        Ok(group_order_id)
    }

    /// Recomputes the order article totals from the group rows.
    ///
    /// Nothing is written when the stored totals already match.
    pub fn recompute_totals(&self, order_id: Uuid) -> Result<Vec<OrderArticleTotals>, DomainError> {
        let agg = self.load(order_id)?;
        let totals = aggregate(&agg.articles, agg.group_order_articles())?;
        if totals_differ(&agg.articles, &totals) {
            self.repo
                .save_totals(order_id, agg.order.lock_version, &totals)?;
            info!("Order {order_id}: totals recomputed");
        } else {
            debug!("Order {order_id}: totals up to date");
        }
        Ok(totals)
    }

    /// Finishes an open order and notifies the participating groups.
    pub fn finish(&self, order_id: Uuid, actor: Uuid) -> Result<FinishOutcome, DomainError> {
        let agg = self.load(order_id)?;
        let Some(plan) = plan_finish(&agg, actor, Utc::now(), &self.markup)? else {
            debug!("Order {order_id} is already {}", agg.order.state);
            return Ok(FinishOutcome::AlreadyFinished);
        };
        self.repo
            .apply_finish(order_id, agg.order.lock_version, &plan)?;
        info!(
            "Order {order_id} finished by {actor}, {} prices frozen",
            plan.price_snapshots.len()
        );

        let recipients = agg.ordergroup_ids();
        let context = json!({
            "order_id": order_id,
            "supplier": agg.order.name(),
            "ends": plan.ends.to_rfc3339(),
        });
        if let Err(e) = self
            .messenger
            .send_template(ORDER_FINISHED_TEMPLATE, context, &recipients)
        {
            warn!("Order {order_id} finished but notifying {} groups failed: {e}", recipients.len());
        }
        Ok(FinishOutcome::Finished)
    }

    /// Finishes every open order whose end lies before `now`.
    ///
    /// An order that fails to finish is logged and skipped; the others still
    /// get finished.
    pub fn finish_expired(&self, now: DateTime<Utc>, actor: Uuid) -> Result<Vec<Uuid>, DomainError> {
        let mut finished = Vec::new();
        for summary in self.repo.list(OrderState::Open)? {
            if !summary.ends.is_some_and(|ends| ends <= now) {
                continue;
            }
            match self.finish(summary.id, actor) {
                Ok(FinishOutcome::Finished) => finished.push(summary.id),
                Ok(FinishOutcome::AlreadyFinished) => {}
                Err(e) => warn!("Expired order {} could not be finished: {e}", summary.id),
            }
        }
        Ok(finished)
    }

    /// Closes a finished order without posting any transactions.
    pub fn close_direct(&self, order_id: Uuid, actor: Uuid) -> Result<(), DomainError> {
        let agg = self.load(order_id)?;
        check_close(&agg)?;
        self.repo.close(order_id, agg.order.lock_version, actor)?;
        info!("Order {order_id} closed without booking by {actor}");
        Ok(())
    }

    pub fn attach_invoice(&self, order_id: Uuid, net_amount: BigDecimal) -> Result<Uuid, DomainError> {
        if net_amount < BigDecimal::zero() {
            return Err(DomainError::InvalidInput(
                "invoice net amount must not be negative".to_string(),
            ));
        }
        let id = self.repo.attach_invoice(order_id, &net_amount)?;
        info!("Order {order_id}: invoice over {net_amount} attached");
        Ok(id)
    }

    /// Books the order: debits every group and marks the order closed.
    pub fn balance(&self, order_id: Uuid, actor: Uuid) -> Result<(), DomainError> {
        let agg = self.load(order_id)?;
        let plan = plan_balance(&agg, actor, &self.markup)?;
        self.repo
            .apply_balance(order_id, agg.order.lock_version, &plan)?;
        info!(
            "Order {order_id} booked by {actor}: {} transactions posted",
            plan.transactions.len()
        );
        Ok(())
    }

    pub fn sum(&self, order_id: Uuid, basis: SumBasis) -> Result<BigDecimal, DomainError> {
        let agg = self.load(order_id)?;
        Ok(sums::sum(&agg, basis, &self.markup))
    }

    /// `Ok(None)` when the order has no invoice yet.
    pub fn profit(&self, order_id: Uuid, with_markup: bool) -> Result<Option<BigDecimal>, DomainError> {
        let agg = self.load(order_id)?;
        Ok(sums::profit(&agg, with_markup, &self.markup))
    }

    pub fn group_order(
        &self,
        order_id: Uuid,
        ordergroup_id: Uuid,
    ) -> Result<Option<GroupOrder>, DomainError> {
        let agg = self.load(order_id)?;
        Ok(agg.group_order(ordergroup_id).cloned())
    }

    pub fn articles_grouped_by_category(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<(String, Vec<OrderArticle>)>, DomainError> {
        let agg = self.load(order_id)?;
        Ok(sums::articles_grouped_by_category(&agg)
            .into_iter()
            .map(|(category, articles)| (category, articles.into_iter().cloned().collect()))
            .collect())
    }

    fn load(&self, order_id: Uuid) -> Result<OrderAggregate, DomainError> {
        self.repo.find_by_id(order_id)?.ok_or(DomainError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

    use chrono::Duration;
    use serde_json::Value;

    use super::*;
    use crate::domain::aggregator::apply_totals;
    use crate::domain::article::Article;
    use crate::domain::errors::ValidationErrors;
    use crate::domain::lifecycle::FinishPlan;
    use crate::domain::order::{Invoice, Order, OrderArticle};
    use crate::domain::pricing::ArticlePrice;
    use crate::domain::selection::SelectionChange;
    use crate::domain::settlement::{BalancePlan, FinancialTransactionInput};

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).expect("valid decimal")
    }

    #[derive(Default)]
    struct Store {
        suppliers: HashMap<Uuid, String>,
        catalog: HashMap<Uuid, Article>,
        article_suppliers: HashMap<Uuid, Uuid>,
        /// Orders a concurrent writer holds; every write on them conflicts.
        contended: HashSet<Uuid>,
        ordergroups: HashMap<Uuid, String>,
        balances: HashMap<Uuid, BigDecimal>,
        transactions: Vec<FinancialTransactionInput>,
        orders: HashMap<Uuid, OrderAggregate>,
    }

    #[derive(Clone, Default)]
    struct InMemoryRepo {
        store: Arc<Mutex<Store>>,
    }

    impl InMemoryRepo {
        fn add_supplier(&self, name: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.store.lock().unwrap().suppliers.insert(id, name.to_string());
            id
        }

        fn add_article(&self, supplier: Uuid, name: &str, unit_quantity: i32, price: &str) -> Uuid {
            let id = Uuid::new_v4();
            let article = Article {
                id,
                name: name.to_string(),
                category: "Misc".to_string(),
                unit_quantity,
                current_price: Some(ArticlePrice {
                    id: Uuid::new_v4(),
                    article_id: id,
                    unit_quantity,
                    price: dec(price),
                    tax: BigDecimal::zero(),
                    deposit: BigDecimal::zero(),
                    created_at: Utc::now(),
                }),
            };
            let mut store = self.store.lock().unwrap();
            store.catalog.insert(id, article);
            store.article_suppliers.insert(id, supplier);
            id
        }

        /// Simulates the catalog publishing a new price row.
        fn reprice(&self, article_id: Uuid, price: &str) {
            let mut store = self.store.lock().unwrap();
            let article = store.catalog.get_mut(&article_id).unwrap();
            let mut next = article.current_price.clone().unwrap();
            next.id = Uuid::new_v4();
            next.price = dec(price);
            article.current_price = Some(next);
        }

        fn add_ordergroup(&self, name: &str) -> Uuid {
            let id = Uuid::new_v4();
            let mut store = self.store.lock().unwrap();
            store.ordergroups.insert(id, name.to_string());
            store.balances.insert(id, BigDecimal::zero());
            id
        }

        fn balance_of(&self, ordergroup_id: Uuid) -> BigDecimal {
            self.store.lock().unwrap().balances[&ordergroup_id].clone()
        }

        fn transaction_count(&self) -> usize {
            self.store.lock().unwrap().transactions.len()
        }

        fn version_of(&self, order_id: Uuid) -> i32 {
            self.store.lock().unwrap().orders[&order_id].order.lock_version
        }

        fn with_order<T>(
            &self,
            order_id: Uuid,
            expected_version: i32,
            f: impl FnOnce(&mut Store, Uuid) -> Result<T, DomainError>,
        ) -> Result<T, DomainError> {
            let mut store = self.store.lock().unwrap();
            let version = store
                .orders
                .get(&order_id)
                .ok_or(DomainError::NotFound)?
                .order
                .lock_version;
            if version != expected_version || store.contended.contains(&order_id) {
                return Err(DomainError::Conflict);
            }
            let out = f(&mut store, order_id)?;
            if let Some(agg) = store.orders.get_mut(&order_id) {
                agg.order.lock_version += 1;
            }
            Ok(out)
        }

        fn check_supplier(store: &Store, supplier_id: Uuid, article_ids: &[Uuid]) -> Result<(), DomainError> {
            let mut errors = ValidationErrors::new();
            if !article_ids
                .iter()
                .all(|a| store.article_suppliers.get(a) == Some(&supplier_id))
            {
                errors.add("articles", "must all belong to the supplier");
            }
            errors.into_result()
        }
    }

    fn order_article_from(article: &Article) -> OrderArticle {
        OrderArticle {
            id: Uuid::new_v4(),
            article: article.clone(),
            quantity: 0,
            tolerance: 0,
            units_to_order: 0,
            frozen_price: None,
        }
    }

    impl OrderRepository for InMemoryRepo {
        fn create(&self, order: &NewOrder) -> Result<Uuid, DomainError> {
            let mut store = self.store.lock().unwrap();
            let supplier_id = order.supplier_id.unwrap();
            let Some(supplier_name) = store.suppliers.get(&supplier_id).cloned() else {
                let mut errors = ValidationErrors::new();
                errors.add("supplier", "does not exist");
                return Err(DomainError::Validation(errors));
            };
            Self::check_supplier(&store, supplier_id, &order.article_ids)?;
            let articles = order
                .article_ids
                .iter()
                .map(|id| store.catalog.get(id).map(order_article_from))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| DomainError::InvalidInput("unknown article".to_string()))?;
            let id = Uuid::new_v4();
            store.orders.insert(
                id,
                OrderAggregate {
                    order: Order {
                        id,
                        supplier_id,
                        supplier_name,
                        starts: order.starts.unwrap(),
                        ends: order.ends,
                        state: OrderState::Open,
                        booked: false,
                        foodcoop_result: None,
                        note: order.note.clone(),
                        updated_by: order.created_by,
                        lock_version: 0,
                    },
                    articles,
                    group_orders: vec![],
                    invoice: None,
                },
            );
            Ok(id)
        }

        fn find_by_id(&self, id: Uuid) -> Result<Option<OrderAggregate>, DomainError> {
            let store = self.store.lock().unwrap();
            Ok(store.orders.get(&id).cloned().map(|mut agg| {
                for oa in &mut agg.articles {
                    oa.article = store.catalog[&oa.article.id].clone();
                }
                agg
            }))
        }

        fn list(&self, state: OrderState) -> Result<Vec<OrderSummary>, DomainError> {
            let store = self.store.lock().unwrap();
            let mut rows: Vec<OrderSummary> = store
                .orders
                .values()
                .filter(|agg| agg.order.state == state)
                .map(|agg| OrderSummary {
                    id: agg.order.id,
                    supplier_name: agg.order.supplier_name.clone(),
                    starts: agg.order.starts,
                    ends: agg.order.ends,
                    state: agg.order.state,
                    booked: agg.order.booked,
                })
                .collect();
            rows.sort_by(|a, b| b.ends.cmp(&a.ends));
            Ok(rows)
        }

        fn save_selection(
            &self,
            order_id: Uuid,
            expected_version: i32,
            change: &SelectionChange,
            _actor: Uuid,
        ) -> Result<(), DomainError> {
            self.with_order(order_id, expected_version, |store, id| {
                let supplier_id = store.orders[&id].order.supplier_id;
                Self::check_supplier(store, supplier_id, &change.added)?;
                let added: Vec<OrderArticle> = change
                    .added
                    .iter()
                    .map(|a| order_article_from(&store.catalog[a]))
                    .collect();
                let agg = store.orders.get_mut(&id).unwrap();
                agg.articles.retain(|oa| !change.removed.contains(&oa.id));
                for go in &mut agg.group_orders {
                    go.articles
                        .retain(|goa| !change.removed.contains(&goa.order_article_id));
                }
                agg.articles.extend(added);
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
            self.with_order(order_id, expected_version, |store, id| {
                let name = store.ordergroups[&update.ordergroup_id].clone();
                let agg = store.orders.get_mut(&id).unwrap();
                let ids: HashMap<Uuid, Uuid> = agg
                    .articles
                    .iter()
                    .map(|oa| (oa.article.id, oa.id))
                    .collect();
                if agg.group_order(update.ordergroup_id).is_none() {
                    agg.group_orders.push(GroupOrder {
                        id: Uuid::new_v4(),
                        ordergroup_id: update.ordergroup_id,
                        ordergroup_name: name,
                        price: BigDecimal::zero(),
                        articles: vec![],
                    });
                }
                let go = agg
                    .group_orders
                    .iter_mut()
                    .find(|go| go.ordergroup_id == update.ordergroup_id)
                    .unwrap();
                let previous = std::mem::take(&mut go.articles);
                go.articles = update
                    .lines
                    .iter()
                    .map(|line| {
                        let order_article_id = ids[&line.article_id];
                        let existing = previous
                            .iter()
                            .find(|goa| goa.order_article_id == order_article_id);
                        GroupOrderArticle {
                            id: existing.map_or_else(Uuid::new_v4, |goa| goa.id),
                            order_article_id,
                            quantity: line.quantity,
                            tolerance: line.tolerance,
                            result: None,
                            created_at: existing.map_or_else(Utc::now, |goa| goa.created_at),
                        }
                    })
                    .collect();
                let go_id = go.id;
                apply_totals(&mut agg.articles, totals);
                Ok(go_id)
            })
        }

        fn save_totals(
            &self,
            order_id: Uuid,
            expected_version: i32,
            totals: &[OrderArticleTotals],
        ) -> Result<(), DomainError> {
            self.with_order(order_id, expected_version, |store, id| {
                apply_totals(&mut store.orders.get_mut(&id).unwrap().articles, totals);
                Ok(())
            })
        }

        fn apply_finish(
            &self,
            order_id: Uuid,
            expected_version: i32,
            plan: &FinishPlan,
        ) -> Result<(), DomainError> {
            self.with_order(order_id, expected_version, |store, id| {
                let catalog = store.catalog.clone();
                let agg = store.orders.get_mut(&id).unwrap();
                for oa in &mut agg.articles {
                    oa.article = catalog[&oa.article.id].clone();
                }
                plan.apply_to(agg);
                Ok(())
            })
        }

        fn apply_balance(
            &self,
            order_id: Uuid,
            expected_version: i32,
            plan: &BalancePlan,
        ) -> Result<(), DomainError> {
            self.with_order(order_id, expected_version, |store, id| {
                for t in &plan.transactions {
                    let balance = store.balances.get_mut(&t.ordergroup_id).unwrap();
                    *balance = balance.clone() + &t.amount;
                    store.transactions.push(t.clone());
                }
                let order = &mut store.orders.get_mut(&id).unwrap().order;
                order.booked = true;
                order.state = OrderState::Closed;
                order.updated_by = Some(plan.actor);
                order.foodcoop_result = plan.foodcoop_result.clone();
                Ok(())
            })
        }

        fn close(&self, order_id: Uuid, expected_version: i32, actor: Uuid) -> Result<(), DomainError> {
            self.with_order(order_id, expected_version, |store, id| {
                let order = &mut store.orders.get_mut(&id).unwrap().order;
                order.state = OrderState::Closed;
                order.updated_by = Some(actor);
                Ok(())
            })
        }

        fn attach_invoice(&self, order_id: Uuid, net_amount: &BigDecimal) -> Result<Uuid, DomainError> {
            let mut store = self.store.lock().unwrap();
            let agg = store.orders.get_mut(&order_id).ok_or(DomainError::NotFound)?;
            let invoice = Invoice {
                id: Uuid::new_v4(),
                net_amount: net_amount.clone(),
                created_at: Utc::now(),
            };
            let id = invoice.id;
            agg.invoice = Some(invoice);
            Ok(id)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingMessenger {
        sent: Arc<Mutex<Vec<(String, Value, Vec<Uuid>)>>>,
        fail: bool,
    }

    impl RecordingMessenger {
        fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Messenger for RecordingMessenger {
        fn send_template(
            &self,
            template_id: &str,
            context: Value,
            recipients: &[Uuid],
        ) -> Result<(), DomainError> {
            if self.fail {
                return Err(DomainError::Internal("mail relay down".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((template_id.to_string(), context, recipients.to_vec()));
            Ok(())
        }
    }

    struct Fixture {
        repo: InMemoryRepo,
        messenger: RecordingMessenger,
        service: OrderService<InMemoryRepo, RecordingMessenger>,
        actor: Uuid,
        supplier: Uuid,
        order_id: Uuid,
        oats: Uuid,
        honey: Uuid,
        kitchen: Uuid,
        garden: Uuid,
    }

    fn fixture_with(messenger: RecordingMessenger) -> Fixture {
        let repo = InMemoryRepo::default();
        let supplier = repo.add_supplier("Green Farm");
        let oats = repo.add_article(supplier, "Oats", 6, "1.50");
        let honey = repo.add_article(supplier, "Honey", 1, "6.00");
        let kitchen = repo.add_ordergroup("Kitchen");
        let garden = repo.add_ordergroup("Garden");
        let service = OrderService::new(repo.clone(), messenger.clone(), PriceMarkup::default());
        let actor = Uuid::new_v4();
        let starts = Utc::now() - Duration::days(2);
        let order_id = service
            .create_order(NewOrder {
                supplier_id: Some(supplier),
                starts: Some(starts),
                ends: Some(starts + Duration::days(7)),
                article_ids: vec![oats, honey],
                note: None,
                created_by: Some(actor),
            })
            .expect("create failed");
        Fixture {
            repo,
            messenger,
            service,
            actor,
            supplier,
            order_id,
            oats,
            honey,
            kitchen,
            garden,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingMessenger::default())
    }

    fn line(article_id: Uuid, quantity: i32, tolerance: i32) -> GroupOrderLineInput {
        GroupOrderLineInput {
            article_id,
            quantity,
            tolerance,
        }
    }

    /// Kitchen orders 3 (+1) oats and 2 honey, Garden 5 oats and 1 honey.
    fn place_group_orders(f: &Fixture) {
        f.service
            .update_group_order(
                f.order_id,
                f.kitchen,
                vec![line(f.oats, 3, 1), line(f.honey, 2, 0)],
                f.actor,
            )
            .expect("kitchen order failed");
        f.service
            .update_group_order(
                f.order_id,
                f.garden,
                vec![line(f.oats, 5, 0), line(f.honey, 1, 0)],
                f.actor,
            )
            .expect("garden order failed");
    }

    fn oats_of(f: &Fixture) -> OrderArticle {
        let agg = f.service.get_order(f.order_id).unwrap().unwrap();
        agg.order_article_for(f.oats).unwrap().clone()
    }

    #[test]
    fn invalid_orders_are_rejected_before_persisting() {
        let f = fixture();

        let err = f.service.create_order(NewOrder::default()).unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(f.repo.store.lock().unwrap().orders.len(), 1);
    }

    #[test]
    fn group_orders_aggregate_into_order_totals() {
        let f = fixture();

        place_group_orders(&f);

        let oats = oats_of(&f);
        assert_eq!((oats.quantity, oats.tolerance), (8, 1));
        assert_eq!(oats.units_to_order, oats.calculate_order_quantity(8, 1));
        assert_eq!(oats.units_to_order, 1);
    }

    #[test]
    fn resubmitting_a_group_order_replaces_its_lines() {
        let f = fixture();
        place_group_orders(&f);

        f.service
            .update_group_order(f.order_id, f.kitchen, vec![line(f.oats, 1, 0)], f.actor)
            .unwrap();

        let kitchen = f.service.group_order(f.order_id, f.kitchen).unwrap().unwrap();
        assert_eq!(kitchen.articles.len(), 1);
        assert_eq!(oats_of(&f).quantity, 6);
    }

    #[test]
    fn group_order_lines_must_reference_order_articles() {
        let f = fixture();

        let err = f
            .service
            .update_group_order(f.order_id, f.kitchen, vec![line(Uuid::new_v4(), 1, 0)], f.actor)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        let err = f
            .service
            .update_group_order(f.order_id, f.kitchen, vec![line(f.oats, -1, 0)], f.actor)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn recompute_is_idempotent_and_skips_unchanged_writes() {
        let f = fixture();
        place_group_orders(&f);
        let version = f.repo.version_of(f.order_id);

        let first = f.service.recompute_totals(f.order_id).unwrap();
        let second = f.service.recompute_totals(f.order_id).unwrap();

        assert_eq!(first, second);
        assert_eq!(f.repo.version_of(f.order_id), version);
    }

    #[test]
    fn finishing_twice_notifies_once_and_bumps_version_once() {
        let f = fixture();
        place_group_orders(&f);

        let first = f.service.finish(f.order_id, f.actor).unwrap();
        let version = f.repo.version_of(f.order_id);
        let snapshot = f.service.get_order(f.order_id).unwrap().unwrap();
        let second = f.service.finish(f.order_id, f.actor).unwrap();

        assert_eq!(first, FinishOutcome::Finished);
        assert_eq!(second, FinishOutcome::AlreadyFinished);
        assert_eq!(f.repo.version_of(f.order_id), version);
        assert_eq!(f.service.get_order(f.order_id).unwrap().unwrap(), snapshot);
        assert_eq!(f.messenger.count(), 1);

        let sent = f.messenger.sent.lock().unwrap();
        assert_eq!(sent[0].0, ORDER_FINISHED_TEMPLATE);
        assert_eq!(sent[0].2.len(), 2);
        assert!(sent[0].2.contains(&f.kitchen));
    }

    #[test]
    fn finish_freezes_prices_against_catalog_changes() {
        let f = fixture();
        place_group_orders(&f);
        f.service.finish(f.order_id, f.actor).unwrap();
        let clear_before = f.service.sum(f.order_id, SumBasis::Clear).unwrap();

        f.repo.reprice(f.oats, "9.99");

        let oats = oats_of(&f);
        assert_eq!(oats.frozen_price.as_ref().unwrap().price, dec("1.50"));
        assert_eq!(oats.price().unwrap().price, dec("1.50"));
        assert_eq!(f.service.sum(f.order_id, SumBasis::Clear).unwrap(), clear_before);
    }

    #[test]
    fn finish_allocates_results_and_prices_groups() {
        let f = fixture();
        place_group_orders(&f);

        f.service.finish(f.order_id, f.actor).unwrap();

        // 6 oats available: Kitchen submitted first and gets 3, Garden the rest.
        let kitchen = f.service.group_order(f.order_id, f.kitchen).unwrap().unwrap();
        let garden = f.service.group_order(f.order_id, f.garden).unwrap().unwrap();
        assert_eq!(kitchen.price, dec("16.50"));
        assert_eq!(garden.price, dec("10.50"));
    }

    #[test]
    fn failed_notification_does_not_fail_finish() {
        let f = fixture_with(RecordingMessenger {
            fail: true,
            ..Default::default()
        });

        assert_eq!(
            f.service.finish(f.order_id, f.actor).unwrap(),
            FinishOutcome::Finished
        );
        let agg = f.service.get_order(f.order_id).unwrap().unwrap();
        assert_eq!(agg.order.state, OrderState::Finished);
    }

    #[test]
    fn finished_orders_reject_group_orders_and_selection_changes() {
        let f = fixture();
        f.service.finish(f.order_id, f.actor).unwrap();

        let err = f
            .service
            .update_group_order(f.order_id, f.kitchen, vec![line(f.oats, 1, 0)], f.actor)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotOpen));
        let err = f
            .service
            .set_selected_articles(f.order_id, &[f.oats], f.actor)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotOpen));
    }

    #[test]
    fn selection_keeps_articles_with_demand() {
        let f = fixture();
        place_group_orders(&f);

        let err = f
            .service
            .set_selected_articles(f.order_id, &[f.oats], f.actor)
            .unwrap_err();
        assert!(matches!(err, DomainError::ArticleInUse(_)));

        let jam = f.repo.add_article(f.supplier, "Jam", 1, "3.00");
        f.service
            .set_selected_articles(f.order_id, &[f.oats, f.honey, jam], f.actor)
            .unwrap();
        let agg = f.service.get_order(f.order_id).unwrap().unwrap();
        assert_eq!(agg.articles.len(), 3);
        assert_eq!(agg.order_article_for(jam).unwrap().quantity, 0);
    }

    #[test]
    fn selection_only_accepts_articles_of_the_order_supplier() {
        let f = fixture();
        let other = f.repo.add_supplier("Far Away Farm");
        let foreign = f.repo.add_article(other, "Olives", 1, "4.00");
        let version = f.repo.version_of(f.order_id);

        for stranger in [foreign, Uuid::new_v4()] {
            let err = f
                .service
                .set_selected_articles(f.order_id, &[f.oats, f.honey, stranger], f.actor)
                .unwrap_err();
            match err {
                DomainError::Validation(errors) => {
                    assert_eq!(errors.on("articles"), vec!["must all belong to the supplier"])
                }
                other => panic!("expected validation error, got {other:?}"),
            }
        }

        let agg = f.service.get_order(f.order_id).unwrap().unwrap();
        assert_eq!(agg.articles.len(), 2);
        assert_eq!(f.repo.version_of(f.order_id), version);
    }

    #[test]
    fn oversized_group_orders_are_rejected() {
        let f = fixture();
        f.service
            .update_group_order(f.order_id, f.kitchen, vec![line(f.oats, i32::MAX, 0)], f.actor)
            .unwrap();

        let err = f
            .service
            .update_group_order(f.order_id, f.garden, vec![line(f.oats, 1, 0)], f.actor)
            .unwrap_err();

        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert!(f.service.group_order(f.order_id, f.garden).unwrap().is_none());
    }

    #[test]
    fn profit_is_absent_until_an_invoice_exists() {
        let f = fixture();
        place_group_orders(&f);
        f.service.finish(f.order_id, f.actor).unwrap();

        assert_eq!(f.service.profit(f.order_id, true).unwrap(), None);

        f.service.attach_invoice(f.order_id, dec("25.00")).unwrap();
        assert_eq!(f.service.profit(f.order_id, false).unwrap(), Some(dec("2.00")));
    }

    #[test]
    fn negative_invoices_are_rejected() {
        let f = fixture();
        let err = f.service.attach_invoice(f.order_id, dec("-1")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn balance_debits_groups_and_books_the_order() {
        let f = fixture();
        place_group_orders(&f);
        f.service.finish(f.order_id, f.actor).unwrap();
        f.service.attach_invoice(f.order_id, dec("25.00")).unwrap();

        f.service.balance(f.order_id, f.actor).unwrap();

        assert_eq!(f.repo.balance_of(f.kitchen), dec("-16.50"));
        assert_eq!(f.repo.balance_of(f.garden), dec("-10.50"));
        let agg = f.service.get_order(f.order_id).unwrap().unwrap();
        assert!(agg.order.booked);
        assert_eq!(agg.order.state, OrderState::Closed);
        assert_eq!(agg.order.foodcoop_result, Some(dec("2.00")));
    }

    #[test]
    fn booked_orders_fail_to_balance_without_touching_accounts() {
        let f = fixture();
        place_group_orders(&f);
        f.service.finish(f.order_id, f.actor).unwrap();
        f.service.attach_invoice(f.order_id, dec("25.00")).unwrap();
        f.service.balance(f.order_id, f.actor).unwrap();
        let kitchen_balance = f.repo.balance_of(f.kitchen);

        let err = f.service.balance(f.order_id, f.actor).unwrap_err();

        assert!(matches!(err, DomainError::AlreadyBooked));
        assert_eq!(f.repo.balance_of(f.kitchen), kitchen_balance);
        assert_eq!(f.repo.transaction_count(), 2);
    }

    #[test]
    fn stale_versions_are_reported_as_retryable_conflicts() {
        let f = fixture();
        let stale = f.repo.version_of(f.order_id);
        place_group_orders(&f);

        let err = f.repo.save_totals(f.order_id, stale, &[]).unwrap_err();

        assert!(matches!(err, DomainError::Conflict));
        assert!(err.is_retryable());
    }

    #[test]
    fn close_direct_requires_a_finished_order() {
        let f = fixture();
        assert!(matches!(
            f.service.close_direct(f.order_id, f.actor),
            Err(DomainError::NotFinished)
        ));

        f.service.finish(f.order_id, f.actor).unwrap();
        f.service.close_direct(f.order_id, f.actor).unwrap();

        let agg = f.service.get_order(f.order_id).unwrap().unwrap();
        assert_eq!(agg.order.state, OrderState::Closed);
        assert!(!agg.order.booked);
        assert_eq!(f.repo.transaction_count(), 0);
    }

    #[test]
    fn finish_expired_only_touches_past_orders() {
        let f = fixture();
        let now = Utc::now();

        assert!(f.service.finish_expired(now, f.actor).unwrap().is_empty());
        let later = now + Duration::days(30);
        assert_eq!(f.service.finish_expired(later, f.actor).unwrap(), vec![f.order_id]);
        assert!(f.service.list_orders(OrderState::Open).unwrap().is_empty());
        assert_eq!(f.service.list_orders(OrderState::Finished).unwrap().len(), 1);
    }

    #[test]
    fn finish_expired_goes_on_past_orders_that_fail() {
        let f = fixture();
        let starts = Utc::now() - Duration::days(10);
        let other = f
            .service
            .create_order(NewOrder {
                supplier_id: Some(f.supplier),
                starts: Some(starts),
                ends: Some(starts + Duration::days(1)),
                article_ids: vec![f.oats],
                note: None,
                created_by: Some(f.actor),
            })
            .unwrap();
        f.repo.store.lock().unwrap().contended.insert(f.order_id);

        let later = Utc::now() + Duration::days(30);
        let finished = f.service.finish_expired(later, f.actor).unwrap();

        assert_eq!(finished, vec![other]);
        let open = f.service.list_orders(OrderState::Open).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, f.order_id);
    }

    #[test]
    fn unknown_orders_are_not_found() {
        let f = fixture();
        assert!(matches!(
            f.service.finish(Uuid::new_v4(), f.actor),
            Err(DomainError::NotFound)
        ));
    }
}
