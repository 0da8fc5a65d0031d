use std::str::FromStr;

use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::order_service::{FinishOutcome, OrderService};
use crate::domain::aggregator::OrderArticleTotals;
use crate::domain::order::{
    GroupOrder, GroupOrderLineInput, NewOrder, OrderAggregate, OrderArticle, OrderState,
    OrderSummary,
};
use crate::domain::pricing::PriceMarkup;
use crate::domain::sums::SumBasis;
use crate::errors::AppError;
use crate::infrastructure::order_repo::DieselOrderRepository;
use crate::infrastructure::outbox::OutboxMessenger;

pub type AppOrderService = OrderService<DieselOrderRepository, OutboxMessenger>;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub supplier_id: Option<Uuid>,
    pub starts: Option<chrono::DateTime<chrono::Utc>>,
    pub ends: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub article_ids: Vec<Uuid>,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IdResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ActorRequest {
    pub actor: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectArticlesRequest {
    pub actor: Uuid,
    pub article_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupOrderLineRequest {
    pub article_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub tolerance: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GroupOrderRequest {
    pub actor: Uuid,
    pub lines: Vec<GroupOrderLineRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InvoiceRequest {
    /// Decimal amount as a string to avoid floating-point issues, e.g. "120.50"
    pub net_amount: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderSummaryResponse {
    pub id: Uuid,
    pub name: String,
    pub starts: String,
    pub ends: Option<String>,
    pub state: String,
    pub booked: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderArticleResponse {
    pub id: Uuid,
    pub article_id: Uuid,
    pub name: String,
    pub category: String,
    pub unit_quantity: i32,
    pub quantity: i32,
    pub tolerance: i32,
    pub units_to_order: i32,
    pub price_frozen: bool,
    pub net_price: Option<String>,
    pub fc_price: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupOrderArticleResponse {
    pub id: Uuid,
    pub order_article_id: Uuid,
    pub quantity: i32,
    pub tolerance: i32,
    pub result: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GroupOrderResponse {
    pub id: Uuid,
    pub ordergroup_id: Uuid,
    pub ordergroup_name: String,
    pub price: String,
    pub articles: Vec<GroupOrderArticleResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub net_amount: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub name: String,
    pub starts: String,
    pub ends: Option<String>,
    pub state: String,
    pub booked: bool,
    pub foodcoop_result: Option<String>,
    pub note: Option<String>,
    pub lock_version: i32,
    pub articles: Vec<OrderArticleResponse>,
    pub group_orders: Vec<GroupOrderResponse>,
    pub invoice: Option<InvoiceResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TotalsResponse {
    pub order_article_id: Uuid,
    pub article_id: Uuid,
    pub quantity: i32,
    pub tolerance: i32,
    pub units_to_order: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FinishResponse {
    /// False when the order was already finished and nothing changed.
    pub finished: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SumResponse {
    #[schema(value_type = String)]
    pub basis: SumBasis,
    pub amount: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfitResponse {
    /// Absent until an invoice is attached.
    pub profit: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryResponse {
    pub category: String,
    pub articles: Vec<OrderArticleResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    #[serde(default = "default_state")]
    pub state: OrderState,
}

fn default_state() -> OrderState {
    OrderState::Open
}

#[derive(Debug, Deserialize)]
pub struct SumParams {
    pub basis: SumBasis,
}

#[derive(Debug, Deserialize)]
pub struct ProfitParams {
    #[serde(default = "default_with_markup")]
    pub with_markup: bool,
}

fn default_with_markup() -> bool {
    true
}

// ── Mapping ──────────────────────────────────────────────────────────────────

fn summary_response(o: OrderSummary) -> OrderSummaryResponse {
    OrderSummaryResponse {
        id: o.id,
        name: o.supplier_name,
        starts: o.starts.to_rfc3339(),
        ends: o.ends.map(|e| e.to_rfc3339()),
        state: o.state.to_string(),
        booked: o.booked,
    }
}

fn article_response(oa: &OrderArticle, markup: &PriceMarkup) -> OrderArticleResponse {
    let price = oa.price();
    OrderArticleResponse {
        id: oa.id,
        article_id: oa.article.id,
        name: oa.article.name.clone(),
        category: oa.article.category().to_string(),
        unit_quantity: oa.unit_quantity(),
        quantity: oa.quantity,
        tolerance: oa.tolerance,
        units_to_order: oa.units_to_order,
        price_frozen: oa.frozen_price.is_some(),
        net_price: price.map(|p| p.net_price().to_string()),
        fc_price: price.map(|p| p.fc_price(markup).to_string()),
    }
}

fn group_order_response(go: GroupOrder) -> GroupOrderResponse {
    GroupOrderResponse {
        id: go.id,
        ordergroup_id: go.ordergroup_id,
        ordergroup_name: go.ordergroup_name,
        price: go.price.to_string(),
        articles: go
            .articles
            .into_iter()
            .map(|goa| GroupOrderArticleResponse {
                id: goa.id,
                order_article_id: goa.order_article_id,
                quantity: goa.quantity,
                tolerance: goa.tolerance,
                result: goa.result,
            })
            .collect(),
    }
}

fn order_response(agg: OrderAggregate, markup: &PriceMarkup) -> OrderResponse {
    let articles = agg
        .articles
        .iter()
        .map(|oa| article_response(oa, markup))
        .collect();
    let order = agg.order;
    OrderResponse {
        id: order.id,
        supplier_id: order.supplier_id,
        name: order.supplier_name,
        starts: order.starts.to_rfc3339(),
        ends: order.ends.map(|e| e.to_rfc3339()),
        state: order.state.to_string(),
        booked: order.booked,
        foodcoop_result: order.foodcoop_result.map(|r| r.to_string()),
        note: order.note,
        lock_version: order.lock_version,
        articles,
        group_orders: agg.group_orders.into_iter().map(group_order_response).collect(),
        invoice: agg.invoice.map(|i| InvoiceResponse {
            id: i.id,
            net_amount: i.net_amount.to_string(),
        }),
    }
}

fn totals_response(t: OrderArticleTotals) -> TotalsResponse {
    TotalsResponse {
        order_article_id: t.order_article_id,
        article_id: t.article_id,
        quantity: t.quantity,
        tolerance: t.tolerance,
        units_to_order: t.units_to_order,
    }
}

fn blocking_error(e: actix_web::error::BlockingError) -> AppError {
    AppError::Internal(e.to_string())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Opens a new order for a supplier with an initial article selection.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = IdResponse),
        (status = 422, description = "Missing or invalid fields"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    service: web::Data<AppOrderService>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let order = NewOrder {
        supplier_id: body.supplier_id,
        starts: body.starts,
        ends: body.ends,
        article_ids: body.article_ids,
        note: body.note,
        created_by: body.created_by,
    };

    let id = web::block(move || service.create_order(order))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::Created().json(IdResponse { id }))
}

/// GET /orders
///
/// Orders in one state, latest end first.
#[utoipa::path(
    get,
    path = "/orders",
    params(
        ("state" = Option<String>, Query, description = "open (default), finished or closed"),
    ),
    responses(
        (status = 200, description = "Orders in the state", body = Vec<OrderSummaryResponse>),
        (status = 400, description = "Unknown state"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    service: web::Data<AppOrderService>,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let state = query.into_inner().state;

    let orders = web::block(move || service.list_orders(state))
        .await
        .map_err(blocking_error)??;

    let items: Vec<OrderSummaryResponse> = orders.into_iter().map(summary_response).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// GET /orders/{id}
///
/// Returns the order with its articles, group orders and invoice.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let result = web::block(move || {
        let agg = service.get_order(order_id)?;
        Ok::<_, crate::domain::errors::DomainError>(
            agg.map(|agg| order_response(agg, service.markup())),
        )
    })
    .await
    .map_err(blocking_error)??;

    match result {
        Some(order) => Ok(HttpResponse::Ok().json(order)),
        None => Err(AppError::NotFound),
    }
}

/// PUT /orders/{id}/articles
///
/// Replaces the article selection of an open order.
#[utoipa::path(
    put,
    path = "/orders/{id}/articles",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = SelectArticlesRequest,
    responses(
        (status = 204, description = "Selection saved"),
        (status = 409, description = "Order not open, articles still ordered or concurrent change"),
    ),
    tag = "orders"
)]
pub async fn set_articles(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
    body: web::Json<SelectArticlesRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let body = body.into_inner();

    web::block(move || service.set_selected_articles(order_id, &body.article_ids, body.actor))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::NoContent().finish())
}

/// PUT /orders/{id}/group_orders/{ordergroup_id}
///
/// Replaces one ordergroup's lines; lines with zero quantity and tolerance are dropped.
#[utoipa::path(
    put,
    path = "/orders/{id}/group_orders/{ordergroup_id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
        ("ordergroup_id" = Uuid, Path, description = "Ordergroup UUID"),
    ),
    request_body = GroupOrderRequest,
    responses(
        (status = 200, description = "Group order saved", body = IdResponse),
        (status = 400, description = "Invalid lines"),
        (status = 409, description = "Order not open or concurrent change"),
    ),
    tag = "orders"
)]
pub async fn put_group_order(
    service: web::Data<AppOrderService>,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<GroupOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let (order_id, ordergroup_id) = path.into_inner();
    let body = body.into_inner();
    let lines = body
        .lines
        .into_iter()
        .map(|l| GroupOrderLineInput {
            article_id: l.article_id,
            quantity: l.quantity,
            tolerance: l.tolerance,
        })
        .collect();

    let id = web::block(move || service.update_group_order(order_id, ordergroup_id, lines, body.actor))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::Ok().json(IdResponse { id }))
}

/// GET /orders/{id}/group_orders/{ordergroup_id}
#[utoipa::path(
    get,
    path = "/orders/{id}/group_orders/{ordergroup_id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
        ("ordergroup_id" = Uuid, Path, description = "Ordergroup UUID"),
    ),
    responses(
        (status = 200, description = "The group's sub-order", body = GroupOrderResponse),
        (status = 404, description = "Order or group order not found"),
    ),
    tag = "orders"
)]
pub async fn get_group_order(
    service: web::Data<AppOrderService>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (order_id, ordergroup_id) = path.into_inner();

    let result = web::block(move || service.group_order(order_id, ordergroup_id))
        .await
        .map_err(blocking_error)??;

    match result {
        Some(go) => Ok(HttpResponse::Ok().json(group_order_response(go))),
        None => Err(AppError::NotFound),
    }
}

/// POST /orders/{id}/recompute
#[utoipa::path(
    post,
    path = "/orders/{id}/recompute",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Current totals per order article", body = Vec<TotalsResponse>),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn recompute(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let totals = web::block(move || service.recompute_totals(order_id))
        .await
        .map_err(blocking_error)??;

    let items: Vec<TotalsResponse> = totals.into_iter().map(totals_response).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// POST /orders/{id}/finish
///
/// Finishing an order that is no longer open changes nothing.
#[utoipa::path(
    post,
    path = "/orders/{id}/finish",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Order finished or already finished", body = FinishResponse),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Concurrent change"),
    ),
    tag = "orders"
)]
pub async fn finish(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
    body: web::Json<ActorRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let actor = body.into_inner().actor;

    let outcome = web::block(move || service.finish(order_id, actor))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::Ok().json(FinishResponse {
        finished: outcome == FinishOutcome::Finished,
    }))
}

/// POST /orders/{id}/close
///
/// Closes a finished order without posting transactions.
#[utoipa::path(
    post,
    path = "/orders/{id}/close",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = ActorRequest,
    responses(
        (status = 204, description = "Order closed"),
        (status = 409, description = "Order not finished or already booked"),
    ),
    tag = "orders"
)]
pub async fn close(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
    body: web::Json<ActorRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let actor = body.into_inner().actor;

    web::block(move || service.close_direct(order_id, actor))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::NoContent().finish())
}

/// PUT /orders/{id}/invoice
#[utoipa::path(
    put,
    path = "/orders/{id}/invoice",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = InvoiceRequest,
    responses(
        (status = 200, description = "Invoice attached", body = IdResponse),
        (status = 400, description = "Invalid amount"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn put_invoice(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
    body: web::Json<InvoiceRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let raw = body.into_inner().net_amount;
    let net_amount = BigDecimal::from_str(&raw)
        .map_err(|e| AppError::BadRequest(format!("Invalid net_amount '{raw}': {e}")))?;

    let id = web::block(move || service.attach_invoice(order_id, net_amount))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::Ok().json(IdResponse { id }))
}

/// POST /orders/{id}/balance
///
/// Debits every group and books the order.
#[utoipa::path(
    post,
    path = "/orders/{id}/balance",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    request_body = ActorRequest,
    responses(
        (status = 204, description = "Order booked"),
        (status = 409, description = "Already booked, not finished, no invoice or concurrent change"),
    ),
    tag = "orders"
)]
pub async fn balance(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
    body: web::Json<ActorRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let actor = body.into_inner().actor;

    web::block(move || service.balance(order_id, actor))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::NoContent().finish())
}

/// GET /orders/{id}/sum
#[utoipa::path(
    get,
    path = "/orders/{id}/sum",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
        ("basis" = String, Query, description = "clear, gross, fc, groups or groups_without_markup"),
    ),
    responses(
        (status = 200, description = "Order total", body = SumResponse),
        (status = 400, description = "Unknown basis"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn sum(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
    query: web::Query<SumParams>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let basis = query.into_inner().basis;

    let amount = web::block(move || service.sum(order_id, basis))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::Ok().json(SumResponse {
        basis,
        amount: amount.to_string(),
    }))
}

/// GET /orders/{id}/profit
#[utoipa::path(
    get,
    path = "/orders/{id}/profit",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
        ("with_markup" = Option<bool>, Query, description = "Charge the markup (default true)"),
    ),
    responses(
        (status = 200, description = "Profit, absent without invoice", body = ProfitResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn profit(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
    query: web::Query<ProfitParams>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let with_markup = query.into_inner().with_markup;

    let profit = web::block(move || service.profit(order_id, with_markup))
        .await
        .map_err(blocking_error)??;

    Ok(HttpResponse::Ok().json(ProfitResponse {
        profit: profit.map(|p| p.to_string()),
    }))
}

/// GET /orders/{id}/categories
///
/// Order articles bucketed by category for the order sheet.
#[utoipa::path(
    get,
    path = "/orders/{id}/categories",
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Articles by category", body = Vec<CategoryResponse>),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn categories(
    service: web::Data<AppOrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let result = web::block(move || {
        let grouped = service.articles_grouped_by_category(order_id)?;
        Ok::<_, crate::domain::errors::DomainError>(
            grouped
                .into_iter()
                .map(|(category, articles)| CategoryResponse {
                    category,
                    articles: articles
                        .iter()
                        .map(|oa| article_response(oa, service.markup()))
                        .collect(),
                })
                .collect::<Vec<_>>(),
        )
    })
    .await
    .map_err(blocking_error)??;

    Ok(HttpResponse::Ok().json(result))
}
