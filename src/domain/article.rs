use uuid::Uuid;

use super::pricing::ArticlePrice;

/// Catalog article as seen by the order workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    /// Current order unit size in the catalog.
    pub unit_quantity: i32,
    /// Most recent price row, if the article was ever priced.
    pub current_price: Option<ArticlePrice>,
}

/// Number of order units of `unit_size` to buy for the given demand.
///
/// Full units are always ordered. A partially filled unit is ordered
/// only when the tolerance of the groups can fill it up.
pub fn order_units(unit_size: i32, quantity: i32, tolerance: i32) -> i32 {
    let unit_size = unit_size.max(1);
    let quantity = quantity.max(0);
    let tolerance = tolerance.max(0);

    let units = quantity / unit_size;
    let remainder = quantity % unit_size;
    if remainder > 0 && tolerance >= unit_size - remainder {
        units + 1
    } else {
        units
    }
}

impl Article {
    /// Number of supplier order units to buy for the given demand, using
    /// the catalog unit size.
    pub fn calculate_order_quantity(&self, quantity: i32, tolerance: i32) -> i32 {
        order_units(self.unit_quantity, quantity, tolerance)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn current_price(&self) -> Option<&ArticlePrice> {
        self.current_price.as_ref()
    }
}
