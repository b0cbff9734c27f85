use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use eduopp_catalog::{CatalogService, SearchFilter};
use eduopp_channels::ChannelRegistry;
use eduopp_core::types::{
    NewBinding, NewOpportunity, NewUser, OpportunityUpdate, PreferencesUpdate, UserUpdate,
};
use eduopp_core::{AppContext, Error};
use eduopp_dispatch::{DeliveryLog, Dispatcher};
use eduopp_match::MatchEngine;
use eduopp_users::UserService;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing;

const DEFAULT_RECOMMENDATIONS: usize = 10;
const MAX_RECOMMENDATIONS: usize = 50;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<T, ApiError>;

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Store(inner) => {
            tracing::error!(error = %inner, "Store operation failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            );
        }
    };
    (status, Json(json!({"error": e.to_string()})))
}

fn bad_request(msg: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({"error": msg})))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "eduopp-api"
    }))
}

// Users

pub async fn create_user(
    Extension(ctx): Extension<AppContext>,
    Json(input): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = UserService::new(ctx)
        .create_user(input)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(json!(user))))
}

pub async fn get_user(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let user = UserService::new(ctx).get(id).await.map_err(api_error)?;
    Ok(Json(json!(user)))
}

pub async fn update_user(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Json(update): Json<UserUpdate>,
) -> ApiResult<Json<Value>> {
    let user = UserService::new(ctx)
        .update(id, update)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(user)))
}

pub async fn delete_user(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    UserService::new(ctx).delete(id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct BindingRequest {
    pub channel: eduopp_core::types::ChannelKind,
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
}

pub async fn add_binding(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<BindingRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let binding = UserService::new(ctx)
        .add_binding(NewBinding {
            user_id: id,
            channel: req.channel,
            address: req.address,
            username: req.username,
        })
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(json!(binding))))
}

pub async fn list_bindings(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let bindings = UserService::new(ctx)
        .bindings(id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(bindings)))
}

pub async fn get_preferences(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let prefs = UserService::new(ctx)
        .preferences(id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(prefs)))
}

pub async fn put_preferences(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Json(update): Json<PreferencesUpdate>,
) -> ApiResult<Json<Value>> {
    let prefs = UserService::new(ctx)
        .set_preferences(id, update)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(prefs)))
}

pub async fn send_welcome(
    Extension(ctx): Extension<AppContext>,
    Extension(channels): Extension<Arc<ChannelRegistry>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    Dispatcher::new(ctx, channels)
        .send_welcome(id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Deserialize)]
pub struct RecommendQuery {
    pub limit: Option<i64>,
}

pub async fn recommendations(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Query(params): Query<RecommendQuery>,
) -> ApiResult<Json<Value>> {
    // The engine assumes a positive limit; reject anything else here.
    let limit = params.limit.unwrap_or(DEFAULT_RECOMMENDATIONS as i64);
    if limit < 1 {
        return Err(bad_request("limit must be positive"));
    }
    let recs = MatchEngine::new(ctx)
        .recommend(id, (limit as usize).min(MAX_RECOMMENDATIONS))
        .await
        .map_err(api_error)?;
    Ok(Json(json!(recs)))
}

#[derive(Deserialize)]
pub struct DeliveriesQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_deliveries(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Query(params): Query<DeliveriesQuery>,
) -> ApiResult<Json<Value>> {
    let records = DeliveryLog::new(ctx)
        .for_user(id, params.limit, params.offset)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(records)))
}

#[derive(Deserialize)]
pub struct MarkReadRequest {
    pub ids: Vec<i64>,
}

pub async fn mark_deliveries_read(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<MarkReadRequest>,
) -> ApiResult<Json<Value>> {
    let updated = DeliveryLog::new(ctx)
        .mark_read(id, &req.ids)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"updated": updated})))
}

// Opportunities

pub async fn create_opportunity(
    Extension(ctx): Extension<AppContext>,
    Json(input): Json<NewOpportunity>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let opp = CatalogService::new(ctx)
        .create_opportunity(input)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(json!(opp))))
}

pub async fn get_opportunity(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let opp = CatalogService::new(ctx).get(id).await.map_err(api_error)?;
    Ok(Json(json!(opp)))
}

pub async fn update_opportunity(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Json(update): Json<OpportunityUpdate>,
) -> ApiResult<Json<Value>> {
    let opp = CatalogService::new(ctx)
        .update(id, update)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(opp)))
}

pub async fn delete_opportunity(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    CatalogService::new(ctx)
        .delete(id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub kind: Option<String>,
    /// Comma-separated tag list; any listed tag qualifies.
    pub tags: Option<String>,
    pub location: Option<String>,
    pub language: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn search_opportunities(
    Extension(ctx): Extension<AppContext>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let kind = match params.kind.as_deref() {
        Some(raw) => Some(
            raw.parse()
                .map_err(|_| bad_request("unknown opportunity kind"))?,
        ),
        None => None,
    };
    let filter = SearchFilter {
        query: params.query,
        kind,
        tags: params
            .tags
            .map(|tags| {
                tags.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        location: params.location,
        language: params.language,
        limit: params.limit,
        offset: params.offset,
    };
    let results = CatalogService::new(ctx)
        .search(&filter)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(results)))
}

pub async fn opportunities_by_creator(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let opps = CatalogService::new(ctx)
        .by_creator(id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(opps)))
}

pub async fn opportunity_subscribers(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let users = CatalogService::new(ctx)
        .subscribers(id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!(users)))
}

#[derive(Deserialize)]
pub struct SubscribeRequest {
    pub user_id: i64,
}

pub async fn subscribe(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<Value>> {
    match CatalogService::new(ctx)
        .subscribe(id, req.user_id)
        .await
        .map_err(api_error)?
    {
        Some(sub) => Ok(Json(json!({"status": "subscribed", "subscription": sub}))),
        None => Ok(Json(json!({"status": "already_subscribed"}))),
    }
}

pub async fn unsubscribe(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<i64>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<Value>> {
    let removed = CatalogService::new(ctx)
        .unsubscribe(id, req.user_id)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"unsubscribed": removed})))
}

#[derive(Deserialize, Default)]
pub struct AlertRequest {
    #[serde(default)]
    pub user_ids: Option<Vec<i64>>,
}

pub async fn send_alert(
    Extension(ctx): Extension<AppContext>,
    Extension(channels): Extension<Arc<ChannelRegistry>>,
    Path(id): Path<i64>,
    Json(req): Json<AlertRequest>,
) -> ApiResult<Json<Value>> {
    let report = Dispatcher::new(ctx, channels)
        .send_opportunity_alert(id, req.user_ids)
        .await
        .map_err(api_error)?;
    Ok(Json(json!({
        "success": report.all_delivered(),
        "report": report,
    })))
}
