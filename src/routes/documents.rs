use std::time::Duration;

use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

use crate::audit;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::lifecycle::{self, DocumentEdit, NewDocumentInput, NewFileInput};
use crate::models::{AuditAction, Document, DocumentStatus, DocumentVersion, TaskStatus};
use crate::policy::{self, Actor};
use crate::schema::{document_versions, documents, tasks, users};
use crate::state::AppState;

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;

pub(crate) fn to_iso(value: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(value, Utc).to_rfc3339()
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}

fn derive_document_title(original_name: &str) -> String {
    let stem = original_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(original_name)
        .trim();
    if stem.is_empty() {
        original_name.to_string()
    } else {
        stem.to_string()
    }
}

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub q: Option<String>,
    pub status: Option<DocumentStatus>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub title: String,
    pub status: DocumentStatus,
    pub content_type: Option<String>,
    pub folder_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub uploaded_by: Uuid,
    pub created_at: String,
    pub updated_at: String,
    pub submitted_for_review_at: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<String>,
    pub review_comments: String,
}

pub(crate) fn to_document_response(document: Document) -> DocumentResponse {
    DocumentResponse {
        id: document.id,
        title: document.title,
        status: document.status,
        content_type: document.content_type,
        folder_id: document.folder_id,
        category_id: document.category_id,
        uploaded_by: document.uploaded_by,
        created_at: to_iso(document.created_at),
        updated_at: to_iso(document.updated_at),
        submitted_for_review_at: document.submitted_for_review_at.map(to_iso),
        reviewed_by: document.reviewed_by,
        reviewed_at: document.reviewed_at.map(to_iso),
        review_comments: document.review_comments,
    }
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub id: Uuid,
    pub version_number: i32,
    pub file_key: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub created_by: Option<Uuid>,
    pub created_at: String,
}

pub(crate) fn to_version_response(version: DocumentVersion) -> VersionResponse {
    VersionResponse {
        id: version.id,
        version_number: version.version_number,
        file_key: version.file_key,
        size_bytes: version.size_bytes,
        checksum: version.checksum,
        created_by: version.created_by,
        created_at: to_iso(version.created_at),
    }
}

#[derive(Serialize)]
pub struct PendingTaskResponse {
    pub id: Uuid,
    pub assigned_to: Uuid,
    pub assigned_to_username: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct DocumentWithTaskResponse {
    #[serde(flatten)]
    pub document: DocumentResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_task: Option<PendingTaskResponse>,
}

#[derive(Serialize)]
pub struct DocumentDetailResponse {
    pub document: DocumentResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<VersionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_task: Option<PendingTaskResponse>,
}

#[derive(Serialize)]
pub struct DocumentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DocumentStatus,
}

pub(crate) fn latest_version(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> AppResult<Option<DocumentVersion>> {
    Ok(document_versions::table
        .filter(document_versions::document_id.eq(document_id))
        .order(document_versions::version_number.desc())
        .first(conn)
        .optional()?)
}

pub(crate) fn pending_task_for_document(
    conn: &mut PgConnection,
    document: &Document,
) -> AppResult<Option<PendingTaskResponse>> {
    if document.status != DocumentStatus::Review {
        return Ok(None);
    }

    let row: Option<(Uuid, Uuid, NaiveDateTime, String)> = tasks::table
        .inner_join(users::table)
        .filter(tasks::document_id.eq(document.id))
        .filter(tasks::status.eq(TaskStatus::Pending))
        .order(tasks::created_at.asc())
        .select((
            tasks::id,
            tasks::assigned_to,
            tasks::created_at,
            users::username,
        ))
        .first(conn)
        .optional()?;

    Ok(row.map(|(id, assigned_to, created_at, username)| PendingTaskResponse {
        id,
        assigned_to,
        assigned_to_username: username,
        created_at: to_iso(created_at),
    }))
}

struct UploadFields {
    bytes: Vec<u8>,
    original_name: String,
    content_type: Option<String>,
    title: Option<String>,
    folder_id: Option<Uuid>,
    category_id: Option<Uuid>,
}

async fn collect_upload_fields(multipart: &mut Multipart) -> AppResult<UploadFields> {
    let mut fields = UploadFields {
        bytes: Vec::new(),
        original_name: String::new(),
        content_type: None,
        title: None,
        folder_id: None,
        category_id: None,
    };
    let mut has_file = false;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                fields.original_name = field.file_name().unwrap_or_default().to_string();
                fields.content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                fields.bytes = data.to_vec();
                has_file = true;
            }
            Some("title") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid title: {err}")))?;
                if !value.trim().is_empty() {
                    fields.title = Some(value.trim().to_string());
                }
            }
            Some("folder_id") => {
                fields.folder_id = parse_uuid_field(field, "folder_id").await?;
            }
            Some("category_id") => {
                fields.category_id = parse_uuid_field(field, "category_id").await?;
            }
            _ => {}
        }
    }

    if has_file && fields.bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }

    Ok(fields)
}

async fn parse_uuid_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> AppResult<Option<Uuid>> {
    let value = field
        .text()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid {name}: {err}")))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(trimmed)
        .map(Some)
        .map_err(|_| AppError::bad_request(format!("{name} must be a valid UUID")))
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentDetailResponse>)> {
    let actor = Actor::from(&user);
    if !policy::can_upload(actor) {
        return Err(AppError::forbidden(
            "you do not have permission to upload documents",
        ));
    }

    let fields = collect_upload_fields(&mut multipart).await?;
    if fields.bytes.is_empty() {
        error!("upload rejected: missing file field");
        return Err(AppError::bad_request("file field is required"));
    }
    if fields.original_name.is_empty() {
        error!("upload rejected: missing original filename");
        return Err(AppError::bad_request("filename is required"));
    }

    let doc_id = Uuid::new_v4();
    let file_key = format!("documents/{doc_id}/{}", Uuid::new_v4());
    let checksum = hex::encode(Sha256::digest(&fields.bytes));
    let size_bytes = fields.bytes.len() as i64;
    let title = fields
        .title
        .clone()
        .unwrap_or_else(|| derive_document_title(&fields.original_name));

    let content_disposition = inline_content_disposition(&fields.original_name);
    state
        .storage
        .put_object(
            &file_key,
            fields.bytes,
            fields.content_type.clone(),
            content_disposition,
        )
        .await
        .map_err(|err| {
            error!(error = %err, key = %file_key, "failed to store document file");
            AppError::internal(format!("failed to store document file: {err}"))
        })?;

    let mut conn = state.db()?;
    let document = lifecycle::create_document(
        &mut conn,
        NewDocumentInput {
            id: doc_id,
            title,
            file_key,
            content_type: fields.content_type,
            folder_id: fields.folder_id,
            category_id: fields.category_id,
            size_bytes,
            checksum,
        },
        actor,
    )?;

    let current_version = latest_version(&mut conn, document.id)?;

    info!(
        document_id = %document.id,
        original_name = %fields.original_name,
        "document upload succeeded"
    );

    Ok((
        StatusCode::CREATED,
        Json(DocumentDetailResponse {
            document: to_document_response(document),
            current_version: current_version.map(to_version_response),
            pending_task: None,
        }),
    ))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;

    let mut query = documents::table
        .filter(documents::is_deleted.eq(false))
        .filter(documents::uploaded_by.eq(user.user_id))
        .into_boxed();

    if let Some(status) = params.status {
        query = query.filter(documents::status.eq(status));
    }
    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        query = query.filter(documents::title.ilike(format!("%{q}%")));
    }

    let docs: Vec<Document> = query.order(documents::created_at.desc()).load(&mut conn)?;

    Ok(Json(docs.into_iter().map(to_document_response).collect()))
}

pub async fn all_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentWithTaskResponse>>> {
    if !user.role.is_admin() && !user.role.is_reviewer() {
        return Err(AppError::forbidden(
            "you do not have permission to view all documents",
        ));
    }

    let mut conn = state.db()?;

    let mut query = documents::table
        .filter(documents::is_deleted.eq(false))
        .into_boxed();

    if let Some(status) = params.status {
        query = query.filter(documents::status.eq(status));
    }
    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        query = query.filter(documents::title.ilike(format!("%{q}%")));
    }

    let docs: Vec<Document> = query.order(documents::created_at.desc()).load(&mut conn)?;

    let mut response = Vec::with_capacity(docs.len());
    for doc in docs {
        let pending_task = pending_task_for_document(&mut conn, &doc)?;
        response.push(DocumentWithTaskResponse {
            document: to_document_response(doc),
            pending_task,
        });
    }

    Ok(Json(response))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentDetailResponse>> {
    let mut conn = state.db()?;

    let document = lifecycle::load_document(&mut conn, document_id)?;
    if !policy::can_view(Actor::from(&user), &document) {
        return Err(AppError::forbidden(
            "you do not have permission to view this document",
        ));
    }

    audit::record(
        &mut conn,
        Some(user.user_id),
        Some(document.id),
        AuditAction::View,
        format!("Viewed document: {}", document.title),
        None,
    )?;

    let current_version = latest_version(&mut conn, document.id)?;
    let pending_task = pending_task_for_document(&mut conn, &document)?;

    Ok(Json(DocumentDetailResponse {
        document: to_document_response(document),
        current_version: current_version.map(to_version_response),
        pending_task,
    }))
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<DocumentDetailResponse>> {
    let fields = collect_upload_fields(&mut multipart).await?;

    let new_file = if fields.bytes.is_empty() {
        None
    } else {
        let file_key = format!("documents/{document_id}/{}", Uuid::new_v4());
        let checksum = hex::encode(Sha256::digest(&fields.bytes));
        let size_bytes = fields.bytes.len() as i64;
        let content_disposition = inline_content_disposition(&fields.original_name);
        state
            .storage
            .put_object(
                &file_key,
                fields.bytes,
                fields.content_type.clone(),
                content_disposition,
            )
            .await
            .map_err(|err| {
                error!(error = %err, key = %file_key, "failed to store document file");
                AppError::internal(format!("failed to store document file: {err}"))
            })?;
        Some(NewFileInput {
            file_key,
            content_type: fields.content_type.clone(),
            size_bytes,
            checksum,
        })
    };

    let mut conn = state.db()?;
    let document = lifecycle::update_document(
        &mut conn,
        document_id,
        DocumentEdit {
            title: fields.title,
            folder_id: fields.folder_id,
            category_id: fields.category_id,
        },
        new_file,
        Actor::from(&user),
    )?;

    let current_version = latest_version(&mut conn, document.id)?;
    let pending_task = pending_task_for_document(&mut conn, &document)?;

    Ok(Json(DocumentDetailResponse {
        document: to_document_response(document),
        current_version: current_version.map(to_version_response),
        pending_task,
    }))
}

pub async fn update_document_status(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document =
        lifecycle::set_status(&mut conn, document_id, payload.status, Actor::from(&user))?;
    Ok(Json(to_document_response(document)))
}

pub async fn submit_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document = lifecycle::submit_for_review(&mut conn, document_id, Actor::from(&user))?;
    Ok(Json(to_document_response(document)))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;
    lifecycle::soft_delete(&mut conn, document_id, Actor::from(&user))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let mut conn = state.db()?;

    let document = lifecycle::load_document(&mut conn, document_id)?;
    if !policy::can_view(Actor::from(&user), &document) {
        return Err(AppError::forbidden(
            "you do not have permission to view this document",
        ));
    }

    let version = latest_version(&mut conn, document.id)?
        .ok_or_else(|| AppError::internal("document has no versions"))?;

    audit::record(
        &mut conn,
        Some(user.user_id),
        Some(document.id),
        AuditAction::Download,
        format!("Downloaded document: {}", document.title),
        None,
    )?;
    drop(conn);

    let presigned_url = state
        .storage
        .presign_get_object(
            &document.file_key,
            Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;

    Ok(Json(DocumentDownloadResponse {
        url: presigned_url,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
        filename: document.title.clone(),
        content_type: document.content_type.clone(),
        size_bytes: version.size_bytes,
    }))
}

pub async fn list_document_versions(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<VersionResponse>>> {
    let mut conn = state.db()?;

    // Version history is owner-only; everyone else sees the same 404 as for
    // a missing document.
    let document = lifecycle::load_document(&mut conn, document_id)?;
    if document.uploaded_by != user.user_id {
        return Err(AppError::not_found());
    }

    let versions: Vec<DocumentVersion> = document_versions::table
        .filter(document_versions::document_id.eq(document.id))
        .order(document_versions::version_number.desc())
        .load(&mut conn)?;

    Ok(Json(
        versions.into_iter().map(to_version_response).collect(),
    ))
}
