//! Route handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::http::request::X_REQUEST_ID;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::resilience::OutboundRequest;

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 10;
const POST_MIN: usize = 1;
const POST_MAX: usize = 140;

#[derive(Debug, Serialize)]
pub struct AppInfo {
    #[serde(rename = "APPNAME")]
    pub appname: String,
    #[serde(rename = "VERSION")]
    pub version: String,
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> String {
    format!("{} {}", state.app.name, state.app.version)
}

/// `GET /info`
pub async fn info(State(state): State<AppState>) -> Json<AppInfo> {
    Json(AppInfo {
        appname: state.app.name.clone(),
        version: state.app.version.clone(),
    })
}

/// `GET /healthcheck`
pub async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /hello/{name}`
pub async fn hello(Path(name): Path<String>) -> Result<String, ApiError> {
    let len = name.chars().count();
    if len < NAME_MIN {
        return Err(ApiError::BadRequest(format!(
            "\"name\" length must be at least {} characters long",
            NAME_MIN
        )));
    }
    if len > NAME_MAX {
        return Err(ApiError::BadRequest(format!(
            "\"name\" length must be less than or equal to {} characters long",
            NAME_MAX
        )));
    }
    Ok(format!("Hello {}!", name))
}

/// A validated blog post.
#[derive(Debug, Clone, PartialEq)]
pub struct BlogPost {
    pub post: Option<String>,
    pub date: DateTime<Utc>,
}

/// `POST /post`
pub async fn create_post(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<&'static str, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let post = validate_blog_post(&payload).map_err(ApiError::BadRequest)?;
    tracing::debug!(date = %post.date, "Blog post accepted");
    Ok("Blog post added")
}

/// Check a `POST /post` body: optional `post` of 1–140 characters and a
/// required `date`. Unknown keys are rejected.
pub fn validate_blog_post(payload: &Value) -> Result<BlogPost, String> {
    let object = payload
        .as_object()
        .ok_or_else(|| "\"Blog\" must be of type object".to_string())?;

    if let Some(key) = object.keys().find(|k| !matches!(k.as_str(), "post" | "date")) {
        return Err(format!("\"{}\" is not allowed", key));
    }

    let post = match object.get("post") {
        None => None,
        Some(Value::String(text)) => {
            let len = text.chars().count();
            if len < POST_MIN {
                return Err("\"post\" is not allowed to be empty".to_string());
            }
            if len > POST_MAX {
                return Err(format!(
                    "\"post\" length must be less than or equal to {} characters long",
                    POST_MAX
                ));
            }
            Some(text.clone())
        }
        Some(_) => return Err("\"post\" must be a string".to_string()),
    };

    let date = match object.get("date") {
        None | Some(Value::Null) => return Err("\"date\" is required".to_string()),
        Some(value) => parse_date(value).ok_or_else(|| "\"date\" must be a valid date".to_string())?,
    };

    Ok(BlogPost { post, date })
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD[THH:MM:SS]`, or milliseconds
/// since the epoch.
fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(dt.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        _ => None,
    }
}

/// `GET /upstream/{name}`: forwards to a configured upstream through the
/// circuit breaker.
pub async fn upstream(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let url = state
        .upstreams
        .get(&name)
        .ok_or_else(|| ApiError::NotFound(format!("unknown upstream '{}'", name)))?;

    let mut request = OutboundRequest::get(url.as_str());
    if let Some(id) = headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
        request = request.header(X_REQUEST_ID, id);
    }

    match state.breaker.call_service(request).await {
        Some(payload) => Ok(Json(payload)),
        None => {
            tracing::warn!(upstream = %name, "No data from upstream");
            Err(ApiError::UpstreamUnavailable(name))
        }
    }
}
