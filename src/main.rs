use shoprec::{init_tracing, AppState, Config};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    count: Option<usize>,
    exclude_purchased: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SimilarQuery {
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TrendingQuery {
    category: Option<String>,
    period: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PopularQuery {
    category: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TrackBehaviorRequest {
    user_id: Uuid,
    product_id: Uuid,
    interaction_type: shoprec::InteractionType,
    rating: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrainRequest {
    #[serde(default)]
    force: bool,
}

fn error_status(e: &shoprec::RecError) -> StatusCode {
    match e {
        shoprec::RecError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        shoprec::RecError::UnknownEntity { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn health_check(
    State(state): State<AppState>,
) -> Json<ApiResponse<HashMap<String, serde_json::Value>>> {
    let mut status = state.recommendation_service.health_check().await;
    status.insert("service".to_string(), serde_json::json!("shoprec"));
    status.insert("version".to_string(), serde_json::json!("0.1.0"));

    Json(ApiResponse::success(status))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<RecommendationQuery>,
) -> Result<Json<ApiResponse<shoprec::RecommendationResponse>>, StatusCode> {
    let exclude_purchased = params.exclude_purchased.unwrap_or(true);

    match state
        .recommendation_service
        .get_user_recommendations(user_id, params.count, exclude_purchased)
        .await
    {
        Ok(response) => Ok(Json(ApiResponse::success(response))),
        Err(e) => {
            tracing::error!("Failed to get recommendations: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn get_similar_products(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(params): Query<SimilarQuery>,
) -> Result<Json<ApiResponse<Vec<shoprec::RecommendationEntry>>>, StatusCode> {
    match state
        .recommendation_service
        .get_similar_products(product_id, params.count)
        .await
    {
        Ok(entries) => Ok(Json(ApiResponse::success(entries))),
        Err(e) => {
            tracing::error!("Failed to get similar products: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn track_behavior(
    State(state): State<AppState>,
    Json(request): Json<TrackBehaviorRequest>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    match state
        .recommendation_service
        .track_behavior(
            request.user_id,
            request.product_id,
            request.interaction_type,
            request.rating,
        )
        .await
    {
        Ok(()) => Ok(Json(ApiResponse::success(
            "Interaction recorded successfully".to_string(),
        ))),
        Err(e) => {
            tracing::error!("Failed to track behavior: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn receive_event(
    State(state): State<AppState>,
    Json(event): Json<shoprec::DomainEvent>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    state.recommendation_service.handle_event(&event).await;
    Ok(Json(ApiResponse::success(
        "Event processed successfully".to_string(),
    )))
}

async fn get_trending(
    State(state): State<AppState>,
    Query(params): Query<TrendingQuery>,
) -> Result<Json<ApiResponse<Vec<shoprec::RankedProduct>>>, StatusCode> {
    let period = match params.period.as_deref() {
        Some(raw) => match shoprec::TrendingPeriod::parse(raw) {
            Some(period) => period,
            None => return Err(StatusCode::BAD_REQUEST),
        },
        None => shoprec::TrendingPeriod::Week,
    };

    match state
        .recommendation_service
        .get_trending(params.category.as_deref(), period, params.limit)
        .await
    {
        Ok(entries) => Ok(Json(ApiResponse::success(entries))),
        Err(e) => {
            tracing::error!("Failed to get trending products: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn get_popular(
    State(state): State<AppState>,
    Query(params): Query<PopularQuery>,
) -> Result<Json<ApiResponse<Vec<shoprec::RankedProduct>>>, StatusCode> {
    match state
        .recommendation_service
        .get_popular(params.category.as_deref(), params.limit)
        .await
    {
        Ok(entries) => Ok(Json(ApiResponse::success(entries))),
        Err(e) => {
            tracing::error!("Failed to get popular products: {}", e);
            Err(error_status(&e))
        }
    }
}

async fn get_model_status(
    State(state): State<AppState>,
) -> Json<ApiResponse<shoprec::ModelStatus>> {
    Json(ApiResponse::success(state.training_service.model_status()))
}

async fn trigger_retrain(
    State(state): State<AppState>,
    request: Option<Json<RetrainRequest>>,
) -> Json<ApiResponse<String>> {
    let force = request.map(|Json(r)| r.force).unwrap_or(false);

    if state.model.is_training() {
        return Json(ApiResponse::error(
            "Training already in progress".to_string(),
        ));
    }

    let training_service = state.training_service.clone();
    tokio::spawn(async move {
        match training_service.train_if_needed(force).await {
            Ok(Some(report)) => {
                info!(
                    "Retraining finished: version={} users={} products={} elapsed_ms={}",
                    report.version, report.user_count, report.product_count, report.elapsed_ms
                );
            }
            Ok(None) => info!("Retraining skipped, model is still fresh"),
            Err(e) => tracing::error!("Retraining failed: {}", e),
        }
    });

    Json(ApiResponse::success("Training started".to_string()))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommendations/:user_id", get(get_recommendations))
        .route("/products/:product_id/similar", get(get_similar_products))
        .route("/interactions", post(track_behavior))
        .route("/events", post(receive_event))
        .route("/trending", get(get_trending))
        .route("/popular", get(get_popular))
        .route("/model/status", get(get_model_status))
        .route("/model/retrain", post(trigger_retrain))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing().await;

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    info!("Starting Shoprec server with config: {:?}", config.server);

    let addr = config.server.socket_addr();
    let state = AppState::new(config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
