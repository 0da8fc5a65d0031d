use bigdecimal::BigDecimal;
use serde_json::Value;
use uuid::Uuid;

use super::aggregator::OrderArticleTotals;
use super::errors::DomainError;
use super::lifecycle::FinishPlan;
use super::order::{GroupOrderLineInput, NewOrder, OrderAggregate, OrderState, OrderSummary};
use super::selection::SelectionChange;
use super::settlement::BalancePlan;

/// Replacement line set of one group's sub-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOrderUpdate {
    pub ordergroup_id: Uuid,
    pub actor: Uuid,
    /// Lines with non-zero demand; everything else of the group is deleted.
    pub lines: Vec<GroupOrderLineInput>,
}

/// Persistence of orders.
///
/// Every mutating method runs in one transaction that first moves the order's
/// lock version from `expected_version` to the next one and fails with
/// [`DomainError::Conflict`] when someone else got there first.
pub trait OrderRepository: Send + Sync + 'static {
    fn create(&self, order: &NewOrder) -> Result<Uuid, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderAggregate>, DomainError>;
    /// Orders in `state`, latest end first.
    fn list(&self, state: OrderState) -> Result<Vec<OrderSummary>, DomainError>;

    fn save_selection(
        &self,
        order_id: Uuid,
        expected_version: i32,
        change: &SelectionChange,
        actor: Uuid,
    ) -> Result<(), DomainError>;
    fn save_group_order(
        &self,
        order_id: Uuid,
        expected_version: i32,
        update: &GroupOrderUpdate,
        totals: &[OrderArticleTotals],
    ) -> Result<Uuid, DomainError>;
    fn save_totals(
        &self,
        order_id: Uuid,
        expected_version: i32,
        totals: &[OrderArticleTotals],
    ) -> Result<(), DomainError>;
    fn apply_finish(
        &self,
        order_id: Uuid,
        expected_version: i32,
        plan: &FinishPlan,
    ) -> Result<(), DomainError>;
    fn apply_balance(
        &self,
        order_id: Uuid,
        expected_version: i32,
        plan: &BalancePlan,
    ) -> Result<(), DomainError>;
    fn close(&self, order_id: Uuid, expected_version: i32, actor: Uuid) -> Result<(), DomainError>;
    fn attach_invoice(&self, order_id: Uuid, net_amount: &BigDecimal) -> Result<Uuid, DomainError>;
}

/// Delivery of templated notifications to ordergroups.
pub trait Messenger: Send + Sync + 'static {
    fn send_template(
        &self,
        template_id: &str,
        context: Value,
        recipients: &[Uuid],
    ) -> Result<(), DomainError>;
}
