// handlers.rs
use axum::{
    extract::{FromRequest, FromRequestParts, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::auth::{AuthUser, Voter};
use crate::error::{AppError, AppResult};
use crate::models::{
    CastVoteRequest, CreatePollRequest, Poll, PollFilter, PollResults, PollWithOptions, Profile,
    UpdatePollRequest, VoteStatus,
};
use crate::services::{self, parse_id};
use crate::state::AppState;

/// `Json` with rejections turned into [`AppError`] responses.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "store": state.store.backend_tag(),
    }))
}

/// List polls, newest first
pub async fn list_polls(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<PollFilter>,
) -> AppResult<Json<Vec<Poll>>> {
    let polls = services::list_polls(state.store.as_ref(), &filter).await?;
    Ok(Json(polls))
}

pub async fn create_poll(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(payload): ApiJson<CreatePollRequest>,
) -> AppResult<impl IntoResponse> {
    let created = services::create_poll(state.store.as_ref(), &user, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<Json<PollWithOptions>> {
    let poll_id = parse_id(&poll_id, "poll")?;
    let poll = services::get_poll(state.store.as_ref(), poll_id).await?;
    Ok(Json(poll))
}

/// Creator only
pub async fn update_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    user: AuthUser,
    ApiJson(payload): ApiJson<UpdatePollRequest>,
) -> AppResult<Json<Poll>> {
    let poll_id = parse_id(&poll_id, "poll")?;
    let poll = services::update_poll(state.store.as_ref(), &user, poll_id, payload).await?;
    Ok(Json(poll))
}

/// Creator only
pub async fn delete_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    user: AuthUser,
) -> AppResult<Json<Value>> {
    let poll_id = parse_id(&poll_id, "poll")?;
    services::delete_poll(state.store.as_ref(), &user, poll_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Vote for an option; anonymous when no bearer token is sent
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    voter: Voter,
    ApiJson(payload): ApiJson<CastVoteRequest>,
) -> AppResult<impl IntoResponse> {
    let poll_id = parse_id(&poll_id, "poll")?;
    let option_id = uuid::Uuid::parse_str(payload.option_id.trim())
        .map_err(|_| AppError::Validation("Invalid request body".to_string()))?;

    services::cast_vote(state.store.as_ref(), voter, poll_id, option_id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true }))))
}

pub async fn vote_status(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
    user: AuthUser,
) -> AppResult<Json<VoteStatus>> {
    let poll_id = parse_id(&poll_id, "poll")?;
    let status = services::vote_status(state.store.as_ref(), &user, poll_id).await?;
    Ok(Json(status))
}

pub async fn poll_results(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> AppResult<Json<PollResults>> {
    let poll_id = parse_id(&poll_id, "poll")?;
    let results = services::poll_results(state.store.as_ref(), poll_id).await?;
    Ok(Json(results))
}

pub async fn current_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Profile>> {
    let profile = services::ensure_profile(state.store.as_ref(), &user).await?;
    Ok(Json(profile))
}
