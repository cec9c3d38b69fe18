use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::DeleteMode;
use crate::services::{PageRequest, SendMessageRequest};
use crate::state::AppState;
use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub relationship_id: Uuid,
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessagesRequest {
    pub message_ids: Vec<Uuid>,
    #[serde(default)]
    pub mode: DeleteMode,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessagesResponse {
    pub deleted_count: u64,
}

// ==================== Message Endpoints ====================

/// POST /api/v1/chat/send
#[post("/send")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let receipt = state.messaging.send(user.id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(receipt))
}

/// GET /api/v1/chat/{relationship_id}/history?page&limit
#[get("/{relationship_id}/history")]
pub async fn get_history(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    query: web::Query<PageRequest>,
) -> Result<HttpResponse, AppError> {
    let page = state
        .messaging
        .get_history(path.into_inner(), user.id, query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// PUT /api/v1/chat/read
#[put("/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<MarkReadRequest>,
) -> Result<HttpResponse, AppError> {
    let updated = state
        .messaging
        .mark_read(body.relationship_id, &body.message_ids, user.id)
        .await?;
    Ok(HttpResponse::Ok().json(MarkReadResponse { updated }))
}

/// PUT /api/v1/chat/{relationship_id}/read-all
#[put("/{relationship_id}/read-all")]
pub async fn mark_all_read(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let updated_count = state
        .messaging
        .mark_all_read(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(MarkAllReadResponse { updated_count }))
}

/// GET /api/v1/chat/{relationship_id}/unread-count
#[get("/{relationship_id}/unread-count")]
pub async fn get_unread_count(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let summary = state
        .messaging
        .get_unread_count(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// DELETE /api/v1/chat/messages
#[delete("/messages")]
pub async fn delete_messages(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<DeleteMessagesRequest>,
) -> Result<HttpResponse, AppError> {
    let deleted_count = state
        .messaging
        .delete_messages(&body.message_ids, user.id, body.mode)
        .await?;
    Ok(HttpResponse::Ok().json(DeleteMessagesResponse { deleted_count }))
}

// ==================== Conversation Endpoints ====================

/// GET /api/v1/chat/conversations?page&limit
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<PageRequest>,
) -> Result<HttpResponse, AppError> {
    let page = state
        .messaging
        .list_conversations(user.id, query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// POST /api/v1/chat/{relationship_id}/block
#[post("/{relationship_id}/block")]
pub async fn block_conversation(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let block = state
        .messaging
        .block_conversation(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(block))
}

/// DELETE /api/v1/chat/{relationship_id}/block
#[delete("/{relationship_id}/block")]
pub async fn unblock_conversation(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let block = state
        .messaging
        .unblock_conversation(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(block))
}
