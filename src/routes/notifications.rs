use axum::extract::{Json, State};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{Notification, NotificationKind};
use crate::notify;
use crate::schema::notifications;
use crate::state::AppState;

use super::documents::to_iso;

#[derive(Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub document_id: Option<Uuid>,
    pub message: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<NotificationResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Notification> = notifications::table
        .filter(notifications::user_id.eq(user.user_id))
        .order(notifications::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|notification| NotificationResponse {
                id: notification.id,
                document_id: notification.document_id,
                message: notification.message,
                kind: notification.kind,
                is_read: notification.is_read,
                created_at: to_iso(notification.created_at),
            })
            .collect(),
    ))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<MarkAllReadResponse>> {
    let mut conn = state.db()?;
    let updated = notify::mark_all_read(&mut conn, user.user_id)?;
    Ok(Json(MarkAllReadResponse { updated }))
}
