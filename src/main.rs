//! Sokoni Commerce - storefront checkout service

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use sokoni_commerce::checkout::{CheckoutPolicy, CheckoutRequest, PaymentInitiator};
use sokoni_commerce::callback::CallbackReconciler;
use sokoni_commerce::config::AppConfig;
use sokoni_commerce::domain::Order;
use sokoni_commerce::error::CommerceError;
use sokoni_commerce::events::EventPublisher;
use sokoni_commerce::gateway::{DarajaGateway, PushGateway};
use sokoni_commerce::ledger::{OrderLedger, PgOrderLedger};

#[derive(Clone)]
struct AppState {
    initiator: Arc<PaymentInitiator>,
    reconciler: Arc<CallbackReconciler>,
    ledger: Arc<dyn OrderLedger>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url).await.ok(),
        None => None,
    };
    let events = EventPublisher::new(nats);

    let ledger: Arc<dyn OrderLedger> = Arc::new(PgOrderLedger::new(db));
    let gateway: Arc<dyn PushGateway> = Arc::new(DarajaGateway::new(config.gateway.clone())?);
    let policy = CheckoutPolicy {
        account_tag: config.gateway.account_tag.clone(),
        country_code: config.gateway.country_code.clone(),
    };
    let state = AppState {
        initiator: Arc::new(PaymentInitiator::new(
            ledger.clone(),
            gateway,
            events.clone(),
            policy,
        )),
        reconciler: Arc::new(CallbackReconciler::new(ledger.clone(), events)),
        ledger,
    };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "sokoni-commerce"})) }))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/payments/mpesa/callback", post(mpesa_callback))
        .route("/api/v1/orders/:id", get(get_order))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    tracing::info!("sokoni-commerce listening on 0.0.0.0:{}", config.port);
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?,
        app,
    )
    .await?;
    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct CheckoutResponse {
    success: bool,
    order_id: Uuid,
    checkout_request_id: String,
    customer_message: Option<String>,
}

async fn checkout(
    State(s): State<AppState>,
    Json(submission): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), CommerceError> {
    let receipt = s.initiator.initiate(submission).await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            success: true,
            order_id: receipt.order_id,
            checkout_request_id: receipt.checkout_request_id,
            customer_message: receipt.customer_message,
        }),
    ))
}

/// Acknowledgment is about callback receipt, not payment outcome: any
/// structurally valid envelope gets a 2xx so the gateway stops retrying,
/// including deliveries for unknown checkout requests (logged for operator
/// follow-up).
async fn mpesa_callback(
    State(s): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, CommerceError> {
    match s.reconciler.reconcile(payload).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "callback reconciled");
            Ok(Json(serde_json::json!({"ResultCode": 0, "ResultDesc": "Accepted"})))
        }
        Err(CommerceError::UnknownCheckoutRequest(id)) => {
            tracing::warn!(checkout_request_id = %id, "callback for unknown checkout request");
            Ok(Json(serde_json::json!({"ResultCode": 0, "ResultDesc": "Accepted"})))
        }
        Err(e) => Err(e),
    }
}

async fn get_order(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, (StatusCode, String)> {
    s.ledger
        .find_by_id(id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Not found".to_string()))
}
