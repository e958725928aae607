use axum::extract::{Json, Query, State};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{AuditAction, AuditEntry, DocumentStatus};
use crate::schema::{audit_trail, documents};
use crate::state::AppState;

use super::documents::to_iso;

const DEFAULT_AUDIT_PAGE: i64 = 100;
const MAX_AUDIT_PAGE: i64 = 500;
const DASHBOARD_ACTIVITY_LIMIT: i64 = 10;

#[derive(Deserialize)]
pub struct AuditListQuery {
    pub document_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AuditEntryResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub action: AuditAction,
    pub description: String,
    pub ip_address: Option<String>,
    pub created_at: String,
}

fn to_audit_response(entry: AuditEntry) -> AuditEntryResponse {
    AuditEntryResponse {
        id: entry.id,
        user_id: entry.user_id,
        document_id: entry.document_id,
        action: entry.action,
        description: entry.description,
        ip_address: entry.ip_address,
        created_at: to_iso(entry.created_at),
    }
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub total_documents: i64,
    pub approved_documents: i64,
    pub rejected_documents: i64,
    pub pending_documents: i64,
    pub recent_activity: Vec<AuditEntryResponse>,
}

pub async fn list_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<AuditEntryResponse>>> {
    if !user.role.is_admin() {
        return Err(AppError::forbidden(
            "you do not have permission to view the audit trail",
        ));
    }

    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_PAGE)
        .clamp(1, MAX_AUDIT_PAGE);

    let mut conn = state.db()?;

    let mut query = audit_trail::table.into_boxed();
    if let Some(document_id) = params.document_id {
        query = query.filter(audit_trail::document_id.eq(Some(document_id)));
    }

    let entries: Vec<AuditEntry> = query
        .order(audit_trail::created_at.desc())
        .limit(limit)
        .load(&mut conn)?;

    Ok(Json(entries.into_iter().map(to_audit_response).collect()))
}

pub async fn dashboard(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<DashboardResponse>> {
    let mut conn = state.db()?;

    let total_documents: i64 = documents::table
        .filter(documents::is_deleted.eq(false))
        .count()
        .get_result(&mut conn)?;
    let approved_documents: i64 = documents::table
        .filter(documents::is_deleted.eq(false))
        .filter(documents::status.eq(DocumentStatus::Approved))
        .count()
        .get_result(&mut conn)?;
    let rejected_documents: i64 = documents::table
        .filter(documents::is_deleted.eq(false))
        .filter(documents::status.eq(DocumentStatus::Rejected))
        .count()
        .get_result(&mut conn)?;
    let pending_documents: i64 = documents::table
        .filter(documents::is_deleted.eq(false))
        .filter(documents::status.eq(DocumentStatus::Review))
        .count()
        .get_result(&mut conn)?;

    let recent: Vec<AuditEntry> = audit_trail::table
        .order(audit_trail::created_at.desc())
        .limit(DASHBOARD_ACTIVITY_LIMIT)
        .load(&mut conn)?;

    Ok(Json(DashboardResponse {
        total_documents,
        approved_documents,
        rejected_documents,
        pending_documents,
        recent_activity: recent.into_iter().map(to_audit_response).collect(),
    }))
}
