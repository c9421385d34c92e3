use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use validator::Validate;

use crate::{
    api::{app_state::AppState, dto::conversation_dto::*},
    error::AppError,
    security::identity::OwnerIdentity,
};

pub async fn create_conversation(
    State(state): State<AppState>,
    identity: OwnerIdentity,
    Json(request): Json<PostTextRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Creating conversation for owner: {}", identity.owner_id);
    request.validate()?;

    let outcome = state
        .conversation_service
        .create_conversation(&identity.owner_id, &request.text, state.wait(request.wait))
        .await?;

    Ok((StatusCode::CREATED, Json(TurnOutcomeResponse::from(outcome))))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    identity: OwnerIdentity,
) -> Result<impl IntoResponse, AppError> {
    debug!("Listing conversations for owner: {}", identity.owner_id);

    let items = state
        .conversation_service
        .list_conversations(&identity.owner_id)
        .await?;

    Ok(Json(ConversationListResponse::newest_first(items)))
}

pub async fn list_branch_conversations(
    State(state): State<AppState>,
    identity: OwnerIdentity,
) -> Result<impl IntoResponse, AppError> {
    debug!("Listing branch conversations for owner: {}", identity.owner_id);

    let items = state
        .conversation_service
        .list_branch_conversations(&identity.owner_id)
        .await?;

    Ok(Json(ConversationListResponse::newest_first(items)))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    identity: OwnerIdentity,
    Path(turn_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Getting conversation at turn: {}", turn_id);

    let path = state
        .conversation_service
        .get_conversation(&turn_id, &identity.owner_id)
        .await?;

    let root_id = path
        .first()
        .map(|t| t.id.clone())
        .ok_or_else(|| AppError::NotFound(format!("Turn not found: {}", turn_id)))?;

    Ok(Json(ConversationResponse {
        root_id,
        identifying_turn_id: turn_id,
        turns: path.into_iter().map(TurnResponse::from).collect(),
    }))
}

pub async fn reply(
    State(state): State<AppState>,
    identity: OwnerIdentity,
    Path(turn_id): Path<String>,
    Json(request): Json<PostTextRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Replying to turn: {}", turn_id);
    request.validate()?;

    let outcome = state
        .conversation_service
        .reply(
            &turn_id,
            &identity.owner_id,
            &request.text,
            state.wait(request.wait),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(TurnOutcomeResponse::from(outcome))))
}

pub async fn branch_reply(
    State(state): State<AppState>,
    identity: OwnerIdentity,
    Path(turn_id): Path<String>,
    Json(request): Json<PostTextRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Branching from turn: {}", turn_id);
    request.validate()?;

    let outcome = state
        .conversation_service
        .branch_reply(
            &turn_id,
            &identity.owner_id,
            &request.text,
            state.wait(request.wait),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(TurnOutcomeResponse::from(outcome))))
}

pub async fn get_turn(
    State(state): State<AppState>,
    identity: OwnerIdentity,
    Path(turn_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Getting turn: {}", turn_id);

    let turn = state
        .conversation_service
        .get_turn(&turn_id, &identity.owner_id)
        .await?;

    Ok(Json(TurnResponse::from(turn)))
}

pub async fn list_children(
    State(state): State<AppState>,
    identity: OwnerIdentity,
    Path(turn_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Listing children of turn: {}", turn_id);

    let children = state
        .conversation_service
        .children(&turn_id, &identity.owner_id)
        .await?;

    let total = children.len();
    Ok(Json(TurnListResponse {
        turns: children.into_iter().map(TurnResponse::from).collect(),
        total,
    }))
}

pub async fn regenerate(
    State(state): State<AppState>,
    identity: OwnerIdentity,
    Path(turn_id): Path<String>,
    request: Option<Json<RegenerateRequest>>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Regenerating bot reply for turn: {}", turn_id);
    let wait = request.and_then(|Json(r)| r.wait);

    let outcome = state
        .conversation_service
        .regenerate(&turn_id, &identity.owner_id, state.wait(wait))
        .await?;

    Ok(Json(TurnOutcomeResponse::from(outcome)))
}
