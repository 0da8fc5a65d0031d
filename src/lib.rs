pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod schema;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use application::order_service::OrderService;
use domain::pricing::PriceMarkup;
use handlers::orders::{self as order_handlers, AppOrderService};
use handlers::ApiDoc;
use infrastructure::order_repo::DieselOrderRepository;
use infrastructure::outbox::OutboxMessenger;

pub use config::{AppConfig, ConfigError};
pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) {
    let mut conn = pool.get().expect("Failed to get DB connection for migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run database migrations");
}

/// Build and return an actix-web `Server` bound to `host:port`.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    pool: DbPool,
    host: &str,
    port: u16,
    markup: PriceMarkup,
) -> std::io::Result<actix_web::dev::Server> {
    let service: web::Data<AppOrderService> = web::Data::new(OrderService::new(
        DieselOrderRepository::new(pool.clone()),
        OutboxMessenger::new(pool),
        markup,
    ));

    Ok(HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/orders")
                    .route("", web::post().to(order_handlers::create_order))
                    .route("", web::get().to(order_handlers::list_orders))
                    .route("/{id}", web::get().to(order_handlers::get_order))
                    .route("/{id}/articles", web::put().to(order_handlers::set_articles))
                    .route(
                        "/{id}/group_orders/{ordergroup_id}",
                        web::put().to(order_handlers::put_group_order),
                    )
                    .route(
                        "/{id}/group_orders/{ordergroup_id}",
                        web::get().to(order_handlers::get_group_order),
                    )
                    .route("/{id}/recompute", web::post().to(order_handlers::recompute))
                    .route("/{id}/finish", web::post().to(order_handlers::finish))
                    .route("/{id}/close", web::post().to(order_handlers::close))
                    .route("/{id}/invoice", web::put().to(order_handlers::put_invoice))
                    .route("/{id}/balance", web::post().to(order_handlers::balance))
                    .route("/{id}/sum", web::get().to(order_handlers::sum))
                    .route("/{id}/profit", web::get().to(order_handlers::profit))
                    .route("/{id}/categories", web::get().to(order_handlers::categories)),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((host.to_string(), port))?
    .run())
}
