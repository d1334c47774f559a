use std::{fmt::Debug, io, sync::Arc};

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use miropet_api::config::{AppConfig, StoreBackend};
use miropet_api::store::{MemoryStore, MongoStore, Store};
use miropet_api::{configure, users, AppState};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

fn startup_error(context: &str, err: impl Debug) -> io::Error {
    error!("{}: {:?}", context, err);
    io::Error::other(format!("{context}: {err:?}"))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,actix_web=info,miropet_api=debug")),
        )
        .init();

    info!("Starting miropet API server");

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Mongo => {
            let store = MongoStore::connect(&config)
                .await
                .map_err(|e| startup_error("Failed to initialize MongoDB", e))?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    users::ensure_bootstrap_admin(store.as_ref(), &config)
        .await
        .map_err(|e| startup_error("Failed to create bootstrap admin", e))?;

    let bind = (config.host.clone(), config.port);
    let cors_origin = config.cors_origin.clone();
    let state = web::Data::new(AppState::new(store, config));

    info!("Listening on {}:{}", bind.0, bind.1);
    HttpServer::new(move || {
        let cors = match &cors_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .supports_credentials(),
            None => Cors::permissive(),
        };

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await
}
