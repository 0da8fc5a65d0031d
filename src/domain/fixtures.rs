//! Builders shared by the domain unit tests.

use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use super::article::Article;
use super::order::{
    GroupOrder, GroupOrderArticle, Order, OrderAggregate, OrderArticle, OrderState,
};
use super::pricing::ArticlePrice;

pub(crate) fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).expect("valid decimal")
}

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

pub(crate) fn price(unit_quantity: i32, price: &str, tax: &str, deposit: &str) -> ArticlePrice {
    ArticlePrice {
        id: Uuid::new_v4(),
        article_id: Uuid::new_v4(),
        unit_quantity,
        price: dec(price),
        tax: dec(tax),
        deposit: dec(deposit),
        created_at: t0(),
    }
}

pub(crate) fn article(name: &str, category: &str, unit_quantity: i32) -> Article {
    Article {
        id: Uuid::new_v4(),
        name: name.to_string(),
        category: category.to_string(),
        unit_quantity,
        current_price: None,
    }
}

/// Article priced at `net` with the given tax and no deposit.
pub(crate) fn priced_article(name: &str, unit_quantity: i32, net: &str, tax: &str) -> Article {
    let mut a = article(name, "Misc", unit_quantity);
    let mut p = price(unit_quantity, net, tax, "0");
    p.article_id = a.id;
    a.current_price = Some(p);
    a
}

pub(crate) fn order_article(article: Article) -> OrderArticle {
    OrderArticle {
        id: Uuid::new_v4(),
        article,
        quantity: 0,
        tolerance: 0,
        units_to_order: 0,
        frozen_price: None,
    }
}

/// Group line submitted `secs` seconds after [`t0`].
pub(crate) fn goa(order_article: &OrderArticle, quantity: i32, tolerance: i32, secs: i64) -> GroupOrderArticle {
    GroupOrderArticle {
        id: Uuid::new_v4(),
        order_article_id: order_article.id,
        quantity,
        tolerance,
        result: None,
        created_at: t0() + Duration::seconds(secs),
    }
}

pub(crate) fn group_order(name: &str, articles: Vec<GroupOrderArticle>) -> GroupOrder {
    GroupOrder {
        id: Uuid::new_v4(),
        ordergroup_id: Uuid::new_v4(),
        ordergroup_name: name.to_string(),
        price: BigDecimal::zero(),
        articles,
    }
}

pub(crate) fn open_order(supplier_name: &str) -> Order {
    Order {
        id: Uuid::new_v4(),
        supplier_id: Uuid::new_v4(),
        supplier_name: supplier_name.to_string(),
        starts: t0(),
        ends: Some(t0() + Duration::days(7)),
        state: OrderState::Open,
        booked: false,
        foodcoop_result: None,
        note: None,
        updated_by: None,
        lock_version: 0,
    }
}

pub(crate) fn aggregate(articles: Vec<OrderArticle>, group_orders: Vec<GroupOrder>) -> OrderAggregate {
    OrderAggregate {
        order: open_order("Green Farm"),
        articles,
        group_orders,
        invoice: None,
    }
}
