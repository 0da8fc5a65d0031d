use bigdecimal::BigDecimal;
use uuid::Uuid;

use super::errors::DomainError;
use super::order::{Order, OrderAggregate};
use super::pricing::PriceMarkup;
use super::sums::{group_sum, profit, SumBasis};

/// A debit or credit to post against an ordergroup's account.
#[derive(Debug, Clone, PartialEq)]
pub struct FinancialTransactionInput {
    pub ordergroup_id: Uuid,
    pub amount: BigDecimal,
    pub note: String,
}

/// Everything written when an order is booked.
#[derive(Debug, Clone, PartialEq)]
pub struct BalancePlan {
    pub actor: Uuid,
    pub transactions: Vec<FinancialTransactionInput>,
    pub foodcoop_result: Option<BigDecimal>,
}

/// Plans the settlement of a finished, invoiced and not yet booked order.
///
/// Every participating group is debited what it ordered at foodcoop price.
pub fn plan_balance(
    agg: &OrderAggregate,
    actor: Uuid,
    markup: &PriceMarkup,
) -> Result<BalancePlan, DomainError> {
    if agg.order.booked {
        return Err(DomainError::AlreadyBooked);
    }
    if !agg.order.is_finished() {
        return Err(DomainError::NotFinished);
    }
    if agg.invoice.is_none() {
        return Err(DomainError::MissingInvoice);
    }

    let note = transaction_memo(&agg.order);
    let transactions = agg
        .group_orders
        .iter()
        .map(|go| FinancialTransactionInput {
            ordergroup_id: go.ordergroup_id,
            amount: -group_sum(agg, go, SumBasis::Groups, markup),
            note: note.clone(),
        })
        .collect();

    Ok(BalancePlan {
        actor,
        transactions,
        foodcoop_result: profit(agg, true, markup),
    })
}

/// Memo naming the order and the time it ran.
pub fn transaction_memo(order: &Order) -> String {
    let starts = order.starts.format("%d.%m.%Y");
    match order.ends {
        Some(ends) => format!("Order: {}, {} - {}", order.name(), starts, ends.format("%d.%m.%Y")),
        None => format!("Order: {}, from {}", order.name(), starts),
    }
}
