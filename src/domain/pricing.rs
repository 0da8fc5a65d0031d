use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Which per-unit price of an article a computation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceKind {
    Net,
    Gross,
    Foodcoop,
}

/// Cooperative-wide markup in percent, applied on top of the gross price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceMarkup(BigDecimal);

impl PriceMarkup {
    pub fn new(percent: BigDecimal) -> Option<Self> {
        if percent < BigDecimal::zero() {
            None
        } else {
            Some(Self(percent))
        }
    }

    pub fn percent(&self) -> &BigDecimal {
        &self.0
    }
}

impl Default for PriceMarkup {
    fn default() -> Self {
        Self(BigDecimal::zero())
    }
}

/// Immutable snapshot of an article's price as the supplier quoted it.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticlePrice {
    pub id: Uuid,
    pub article_id: Uuid,
    /// Number of single units in one supplier order unit.
    pub unit_quantity: i32,
    pub price: BigDecimal,
    /// Tax in percent.
    pub tax: BigDecimal,
    pub deposit: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl ArticlePrice {
    pub fn net_price(&self) -> BigDecimal {
        self.price.clone()
    }

    /// `(price + deposit) * (100 + tax) / 100`, rounded to cents.
    pub fn gross_price(&self) -> BigDecimal {
        let base = &self.price + &self.deposit;
        round_cents(base * percent_factor(&self.tax))
    }

    /// Gross price plus the cooperative markup, rounded to cents.
    pub fn fc_price(&self, markup: &PriceMarkup) -> BigDecimal {
        round_cents(self.gross_price() * percent_factor(markup.percent()))
    }

    pub fn unit_price(&self, kind: PriceKind, markup: &PriceMarkup) -> BigDecimal {
        match kind {
            PriceKind::Net => self.net_price(),
            PriceKind::Gross => self.gross_price(),
            PriceKind::Foodcoop => self.fc_price(markup),
        }
    }
}

fn percent_factor(percent: &BigDecimal) -> BigDecimal {
    (BigDecimal::from(100) + percent) / BigDecimal::from(100)
}

pub(crate) fn round_cents(value: BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}
