//! HTTP API server for integration with other systems.
//!
//! Provides REST endpoints for caption search and archive inspection.

use crate::assemble::{assemble, SearchResponse};
use crate::cli::Output;
use crate::config::Settings;
use crate::engine::SearchEngine;
use crate::error::KilnsError;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state.
struct AppState {
    engine: SearchEngine,
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let engine = SearchEngine::from_settings(&settings)?;

    let state = Arc::new(AppState { engine });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/search", post(search))
        .route("/videos", get(list_videos))
        .route("/videos/{video_id}", get(get_video))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Kilns API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Search", "POST /search");
    Output::kv("List Videos", "GET  /videos");
    Output::kv("Get Video", "GET  /videos/:video_id");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: usize,
}

#[derive(Serialize)]
struct VideoListResponse {
    videos: Vec<VideoInfo>,
    total: usize,
}

#[derive(Serialize)]
struct VideoInfo {
    video_id: String,
    title: String,
    upload_date: Option<String>,
    segment_count: u64,
}

#[derive(Serialize)]
struct VideoDetailResponse {
    video_id: String,
    title: String,
    uploader: Option<String>,
    upload_date: Option<String>,
    duration_seconds: Option<u32>,
    view_count: Option<u64>,
    tags: Vec<String>,
    segment_count: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_status(e: &KilnsError) -> StatusCode {
    match e {
        KilnsError::Validation(_) => StatusCode::BAD_REQUEST,
        KilnsError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    match state.engine.search(&req.query, req.limit).await {
        Ok(ranked) => {
            let response: SearchResponse = assemble(ranked);
            Json(response).into_response()
        }
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn list_videos(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.store().list_videos().await {
        Ok(videos) => Json(VideoListResponse {
            total: videos.len(),
            videos: videos
                .into_iter()
                .map(|v| VideoInfo {
                    video_id: v.video_id,
                    title: v.title,
                    upload_date: v.upload_date,
                    segment_count: v.segment_count,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

async fn get_video(
    State(state): State<Arc<AppState>>,
    axum::extract::Path(video_id): axum::extract::Path<String>,
) -> impl IntoResponse {
    let store = state.engine.store();

    let video = match store.get_video(&video_id).await {
        Ok(Some(v)) => v,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Video not found: {}", video_id),
                }),
            )
                .into_response()
        }
        Err(e) => {
            return (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    };

    match store.get_segments(&video_id).await {
        Ok(segments) => Json(VideoDetailResponse {
            video_id: video.video_id,
            title: video.title,
            uploader: video.uploader,
            upload_date: video.upload_date,
            duration_seconds: video.duration_seconds,
            view_count: video.view_count,
            tags: video.tags,
            segment_count: segments.len(),
        })
        .into_response(),
        Err(e) => (
            error_status(&e),
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}
