//! Quota-gated chat assistant server

use metered_chat_api::api;
use metered_chat_api::core::generator::SupportiveResponder;
use metered_chat_api::core::services::{MeteredChatService, QuotaAdmissionService};
use metered_chat_api::infrastructure::database::DatabaseConnection;
use metered_chat_api::infrastructure::repositories::{DbEntitlementStore, DbMessageLedger};

use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use log::info;
use serde::Serialize;
use tokio::runtime::{Builder, Runtime};
use tower_http::cors::{Any, CorsLayer};

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(web_server_task());

    Ok(())
}

async fn web_server_task() {
    let provider = ServiceCollection::new()
        .add(DatabaseConnection::singleton())
        .add(DbEntitlementStore::scoped())
        .add(DbMessageLedger::scoped())
        .add(SupportiveResponder::singleton())
        .add(QuotaAdmissionService::scoped())
        .add(MeteredChatService::scoped())
        .build_provider()
        .unwrap();

    // bring the schema up before serving anything
    {
        let database = provider.get_required::<DatabaseConnection>();
        sqlx::migrate!()
            .run(&**database)
            .await
            .expect("failed to run database migrations");
    }

    // build our application with a route
    let app = Router::new()
        .route("/", get(index))
        .nest("/chat", api::chat::router())
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_origin([
                    "http://localhost:3000".parse::<HeaderValue>().unwrap(),
                    "http://localhost:5173".parse::<HeaderValue>().unwrap(),
                ]),
        )
        .with_provider(provider);

    // run our app with hyper, listening globally on port 3000
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
    info!("Shutting down...");
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    message: &'static str,
}

async fn index() -> Json<Health> {
    Json(Health {
        status: "healthy",
        message: "metered chat server is running",
    })
}
