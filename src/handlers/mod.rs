pub mod orders;

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        orders::create_order,
        orders::list_orders,
        orders::get_order,
        orders::set_articles,
        orders::put_group_order,
        orders::get_group_order,
        orders::recompute,
        orders::finish,
        orders::close,
        orders::put_invoice,
        orders::balance,
        orders::sum,
        orders::profit,
        orders::categories,
    ),
    tags(
        (name = "orders", description = "Group purchase orders from opening to booking")
    )
)]
pub struct ApiDoc;
