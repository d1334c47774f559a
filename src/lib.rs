pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod delivery;
pub mod error;
pub mod models;
pub mod orders;
pub mod response;
pub mod store;
pub mod users;

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use serde_json::json;

use crate::auth::AuthMiddleware;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::store::Store;

/// Shared by every worker through `web::Data`.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig) -> Self {
        AppState { store, config }
    }
}

pub fn parse_object_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw.trim()).map_err(|_| ApiError::Validation("Invalid ID format".into()))
}

async fn health() -> HttpResponse {
    response::ok(
        "Server is running",
        json!({ "status": "ok", "timestamp": Utc::now() }),
    )
}

/// Registers every route under `/api`. The caller provides `web::Data<AppState>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| ApiError::Validation(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .route("/health", web::get().to(health))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(auth::register))
                    .route("/login", web::post().to(auth::login))
                    .service(
                        web::resource("/me")
                            .wrap(AuthMiddleware)
                            .route(web::get().to(auth::me)),
                    )
                    .service(
                        web::resource("/change-password")
                            .wrap(AuthMiddleware)
                            .route(web::put().to(auth::change_password)),
                    ),
            )
            .service(
                web::scope("/orders")
                    .wrap(AuthMiddleware)
                    .route("/admin/all", web::get().to(orders::list_all_orders))
                    .route("/admin/stats", web::get().to(orders::order_stats))
                    .route("/admin/{id}/status", web::put().to(orders::update_order_status))
                    .route("/admin/{id}/payment", web::put().to(orders::update_payment_status))
                    .route("/admin/{id}", web::get().to(orders::get_any_order))
                    .route("", web::post().to(orders::create_order))
                    .route("", web::get().to(orders::list_my_orders))
                    .route("/{id}", web::get().to(orders::get_my_order))
                    .route("/{id}/cancel", web::put().to(orders::cancel_order)),
            )
            .service(
                web::scope("/cart")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(cart::get_cart))
                    .route("", web::delete().to(cart::clear_cart))
                    .route("/items", web::post().to(cart::add_item))
                    .route("/items/{index}", web::put().to(cart::update_item))
                    .route("/items/{index}", web::delete().to(cart::remove_item)),
            )
            .service(
                web::scope("/users")
                    .wrap(AuthMiddleware)
                    .route("", web::get().to(users::list_users))
                    .route("/profile", web::get().to(users::profile))
                    .route("/admin", web::post().to(users::create_admin))
                    .route("/{id}", web::get().to(users::get_user))
                    .route("/{id}", web::put().to(users::update_user))
                    .route("/{id}", web::delete().to(users::delete_user)),
            )
            .service(
                web::scope("/products")
                    .route("", web::get().to(catalog::list_products))
                    .route("", web::post().to(catalog::create_product))
                    .route("/{id}", web::get().to(catalog::get_product))
                    .route("/{id}", web::put().to(catalog::update_product))
                    .route("/{id}", web::delete().to(catalog::delete_product)),
            )
            .service(
                web::scope("/category")
                    .route("", web::get().to(catalog::list_categories))
                    .route("", web::post().to(catalog::create_category))
                    .route("/{id}", web::put().to(catalog::update_category))
                    .route("/{id}", web::delete().to(catalog::delete_category)),
            )
            .service(
                web::scope("/delivery-methods")
                    .route("/admin/all", web::get().to(delivery::list_all))
                    .route("/admin", web::post().to(delivery::create))
                    .route("/admin/{id}/toggle", web::patch().to(delivery::toggle))
                    .route("/admin/{id}", web::put().to(delivery::update))
                    .route("/admin/{id}", web::delete().to(delivery::delete))
                    .route("", web::get().to(delivery::list_enabled))
                    .route("/{id}", web::get().to(delivery::get_enabled)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_parsed_or_rejected() {
        let id = ObjectId::new();
        assert_eq!(parse_object_id(&id.to_hex()).unwrap(), id);
        assert!(matches!(
            parse_object_id("not-an-id"),
            Err(ApiError::Validation(_))
        ));
    }
}
