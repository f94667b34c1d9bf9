//! Route handlers.
//!
//! Terminal step of the pipeline. Pages are rendered through the
//! [`TemplateRenderer`](crate::templates::TemplateRenderer) collaborator.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::http::response::internal_error;
use crate::http::server::AppState;

pub const HOME_TEMPLATE: &str = "index.html";
pub const NOT_FOUND_TEMPLATE: &str = "404.html";

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub time: DateTime<Utc>,
}

pub async fn home(State(state): State<AppState>) -> Response {
    render_page(&state, HOME_TEMPLATE, StatusCode::OK)
}

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        time: Utc::now(),
    })
}

pub async fn not_found(State(state): State<AppState>) -> Response {
    render_page(&state, NOT_FOUND_TEMPLATE, StatusCode::NOT_FOUND)
}

fn render_page(state: &AppState, template: &str, status: StatusCode) -> Response {
    match state.templates.render(template, &serde_json::Value::Null) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(e) => {
            tracing::error!(template, error = %e, "Template rendering failed");
            internal_error()
        }
    }
}
