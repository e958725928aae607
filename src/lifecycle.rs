//! Document lifecycle: the status state machine, the version ledger, and the
//! persistence orchestration that keeps both consistent with every change.
//!
//! Documents move draft -> review -> approved/rejected, with rejected looping
//! back through draft/review and archived reachable only by admin override.
//! Every operation here runs inside one transaction that covers the primary
//! row change plus the cascading version/audit appends, so a review outcome is
//! never half-applied.

use chrono::Utc;
use diesel::dsl::max;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::error::{DomainError, DomainResult};
use crate::models::{
    AuditAction, Document, DocumentStatus, DocumentVersion, NewDocument, NewDocumentVersion, Task,
    TaskStatus,
};
use crate::policy::{self, Actor};
use crate::schema::{document_versions, documents, tasks};

pub struct NewDocumentInput {
    pub id: Uuid,
    pub title: String,
    pub file_key: String,
    pub content_type: Option<String>,
    pub folder_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub size_bytes: i64,
    pub checksum: String,
}

#[derive(Default)]
pub struct DocumentEdit {
    pub title: Option<String>,
    pub folder_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
}

/// A freshly stored blob accompanying a save. Absent when only metadata or
/// status changed, in which case the version row re-references the current
/// file.
pub struct NewFileInput {
    pub file_key: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
}

/// Loads a document for reading. Soft-deleted documents are invisible here
/// and everywhere downstream.
pub fn load_document(conn: &mut PgConnection, document_id: Uuid) -> DomainResult<Document> {
    let document: Option<Document> = documents::table
        .find(document_id)
        .first(conn)
        .optional()?;

    match document {
        Some(document) if !document.is_deleted => Ok(document),
        _ => Err(DomainError::NotFound),
    }
}

/// Same lookup with a row lock, for mutating operations. Concurrent writers
/// serialize here; the loser re-reads whatever the winner committed.
pub(crate) fn load_document_for_update(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> DomainResult<Document> {
    let document: Option<Document> = documents::table
        .find(document_id)
        .for_update()
        .first(conn)
        .optional()?;

    match document {
        Some(document) if !document.is_deleted => Ok(document),
        _ => Err(DomainError::NotFound),
    }
}

/// The single source of truth for status changes. Admin override skips every
/// rule; everything else must match one of the allowed pairs.
pub fn validate_transition(
    document: &Document,
    new_status: DocumentStatus,
    actor: Actor,
) -> DomainResult<()> {
    if policy::can_override_status(actor) {
        return Ok(());
    }

    match (document.status, new_status) {
        (DocumentStatus::Draft, DocumentStatus::Review) => {
            if document.uploaded_by != actor.id {
                return Err(DomainError::permission(
                    "only the document owner can submit for review",
                ));
            }
            Ok(())
        }
        (DocumentStatus::Review, DocumentStatus::Approved | DocumentStatus::Rejected) => {
            if !policy::can_review(actor, document) {
                return Err(DomainError::permission("you cannot review this document"));
            }
            Ok(())
        }
        (DocumentStatus::Rejected, DocumentStatus::Draft | DocumentStatus::Review) => {
            if document.uploaded_by != actor.id {
                return Err(DomainError::permission(
                    "only the document owner can resubmit",
                ));
            }
            Ok(())
        }
        (current, attempted) => Err(DomainError::validation(format!(
            "invalid status transition from {current} to {attempted}"
        ))),
    }
}

/// Derives a document's status from the collective state of its review
/// tasks. A single rejection vetoes everything else.
pub fn aggregate_status(task_statuses: &[TaskStatus]) -> DocumentStatus {
    if task_statuses.contains(&TaskStatus::Rejected) {
        DocumentStatus::Rejected
    } else if !task_statuses.is_empty()
        && task_statuses
            .iter()
            .all(|status| *status == TaskStatus::Approved)
    {
        DocumentStatus::Approved
    } else if !task_statuses.is_empty() {
        DocumentStatus::Review
    } else {
        DocumentStatus::Draft
    }
}

/// Appends the next version row for a document. Version numbers are strictly
/// increasing from 1 and never reused, even after soft deletion.
fn append_version(
    conn: &mut PgConnection,
    document: &Document,
    file: Option<&NewFileInput>,
) -> DomainResult<DocumentVersion> {
    let last_number: Option<i32> = document_versions::table
        .filter(document_versions::document_id.eq(document.id))
        .select(max(document_versions::version_number))
        .first(conn)?;

    let (size_bytes, checksum) = match file {
        Some(file) => (file.size_bytes, file.checksum.clone()),
        None => {
            // Metadata-only save: the snapshot re-references the current
            // file, carrying forward its recorded size and checksum.
            let previous: Option<(i64, String)> = document_versions::table
                .filter(document_versions::document_id.eq(document.id))
                .order(document_versions::version_number.desc())
                .select((document_versions::size_bytes, document_versions::checksum))
                .first(conn)
                .optional()?;
            previous.unwrap_or((0, String::new()))
        }
    };

    let new_version = NewDocumentVersion {
        id: Uuid::new_v4(),
        document_id: document.id,
        file_key: document.file_key.clone(),
        version_number: last_number.unwrap_or(0) + 1,
        size_bytes,
        checksum,
        created_by: Some(document.uploaded_by),
    };

    diesel::insert_into(document_versions::table)
        .values(&new_version)
        .execute(conn)?;

    Ok(document_versions::table.find(new_version.id).first(conn)?)
}

/// Cascading effects of persisting a document: exactly one version row and
/// exactly one audit entry per save. `previous_status` is `None` on creation.
/// The audit actor is the reviewer when a review just completed, else the
/// uploader.
fn append_save_effects(
    conn: &mut PgConnection,
    document: &Document,
    previous_status: Option<DocumentStatus>,
    file: Option<&NewFileInput>,
) -> DomainResult<()> {
    append_version(conn, document, file)?;

    match previous_status {
        None => {
            audit::record(
                conn,
                Some(document.uploaded_by),
                Some(document.id),
                AuditAction::Upload,
                format!("Document uploaded with status: {}", document.status),
                None,
            )?;
        }
        Some(old_status) if old_status != document.status => {
            let actor = document.reviewed_by.unwrap_or(document.uploaded_by);
            audit::record(
                conn,
                Some(actor),
                Some(document.id),
                AuditAction::Update,
                format!(
                    "Document status changed from {old_status} to {}",
                    document.status
                ),
                None,
            )?;
        }
        Some(_) => {
            audit::record(
                conn,
                Some(document.uploaded_by),
                Some(document.id),
                AuditAction::Update,
                "Document updated",
                None,
            )?;
        }
    }

    Ok(())
}

fn ensure_folder_exists(conn: &mut PgConnection, folder_id: Uuid) -> DomainResult<()> {
    use crate::schema::folders;

    let exists: bool = diesel::select(diesel::dsl::exists(
        folders::table.filter(folders::id.eq(folder_id)),
    ))
    .get_result(conn)?;
    if !exists {
        return Err(DomainError::validation("folder does not exist"));
    }
    Ok(())
}

fn ensure_category_exists(conn: &mut PgConnection, category_id: Uuid) -> DomainResult<()> {
    use crate::schema::categories;

    let exists: bool = diesel::select(diesel::dsl::exists(
        categories::table.filter(categories::id.eq(category_id)),
    ))
    .get_result(conn)?;
    if !exists {
        return Err(DomainError::validation("category does not exist"));
    }
    Ok(())
}

/// Creates a document in draft with its first version and upload audit entry.
/// The blob must already be stored under `input.file_key`.
pub fn create_document(
    conn: &mut PgConnection,
    input: NewDocumentInput,
    actor: Actor,
) -> DomainResult<Document> {
    if !policy::can_upload(actor) {
        return Err(DomainError::permission(
            "you do not have permission to upload documents",
        ));
    }

    conn.transaction(|conn| {
        if let Some(folder_id) = input.folder_id {
            ensure_folder_exists(conn, folder_id)?;
        }
        if let Some(category_id) = input.category_id {
            ensure_category_exists(conn, category_id)?;
        }

        let file = NewFileInput {
            file_key: input.file_key.clone(),
            content_type: input.content_type.clone(),
            size_bytes: input.size_bytes,
            checksum: input.checksum.clone(),
        };

        let new_document = NewDocument {
            id: input.id,
            title: input.title,
            file_key: input.file_key,
            content_type: input.content_type,
            folder_id: input.folder_id,
            category_id: input.category_id,
            uploaded_by: actor.id,
            status: DocumentStatus::Draft,
        };

        diesel::insert_into(documents::table)
            .values(&new_document)
            .execute(conn)?;

        let document: Document = documents::table.find(new_document.id).first(conn)?;
        append_save_effects(conn, &document, None, Some(&file))?;

        info!(document_id = %document.id, title = %document.title, "document created as draft");
        Ok(document)
    })
}

/// Edits title/folder/category and optionally swaps in a newly stored file.
/// Editing a rejected document sends it back to draft.
pub fn update_document(
    conn: &mut PgConnection,
    document_id: Uuid,
    edit: DocumentEdit,
    new_file: Option<NewFileInput>,
    actor: Actor,
) -> DomainResult<Document> {
    conn.transaction(|conn| {
        let document = load_document_for_update(conn, document_id)?;

        if !policy::can_edit(actor, &document) {
            return Err(DomainError::permission(format!(
                "you cannot edit this document. Documents can only be edited in draft or rejected status. Current status: {}",
                document.status
            )));
        }

        if let Some(folder_id) = edit.folder_id {
            ensure_folder_exists(conn, folder_id)?;
        }
        if let Some(category_id) = edit.category_id {
            ensure_category_exists(conn, category_id)?;
        }

        let old_status = document.status;
        let mut new_status = document.status;
        if document.status == DocumentStatus::Rejected {
            validate_transition(&document, DocumentStatus::Draft, actor)?;
            new_status = DocumentStatus::Draft;
        }

        let title = edit.title.unwrap_or_else(|| document.title.clone());
        if title.trim().is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        let file_key = new_file
            .as_ref()
            .map(|file| file.file_key.clone())
            .unwrap_or_else(|| document.file_key.clone());
        let content_type = new_file
            .as_ref()
            .map(|file| file.content_type.clone())
            .unwrap_or_else(|| document.content_type.clone());

        diesel::update(documents::table.find(document.id))
            .set((
                documents::title.eq(title.trim()),
                documents::file_key.eq(&file_key),
                documents::content_type.eq(content_type.clone()),
                documents::folder_id.eq(edit.folder_id.or(document.folder_id)),
                documents::category_id.eq(edit.category_id.or(document.category_id)),
                documents::status.eq(new_status),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let document: Document = documents::table.find(document_id).first(conn)?;
        append_save_effects(conn, &document, Some(old_status), new_file.as_ref())?;

        Ok(document)
    })
}

/// Owner (or admin) moves a draft or rejected document into review.
pub fn submit_for_review(
    conn: &mut PgConnection,
    document_id: Uuid,
    actor: Actor,
) -> DomainResult<Document> {
    conn.transaction(|conn| {
        let document = load_document_for_update(conn, document_id)?;

        if document.uploaded_by != actor.id && !actor.role.is_admin() {
            return Err(DomainError::permission(
                "only the document owner can submit for review",
            ));
        }
        if !document.can_be_submitted_for_review() {
            return Err(DomainError::validation(format!(
                "document in {} status cannot be submitted for review",
                document.status
            )));
        }

        let old_status = document.status;
        let now = Utc::now().naive_utc();
        diesel::update(documents::table.find(document.id))
            .set((
                documents::status.eq(DocumentStatus::Review),
                documents::submitted_for_review_at.eq(Some(now)),
                documents::updated_at.eq(now),
            ))
            .execute(conn)?;

        let document: Document = documents::table.find(document_id).first(conn)?;
        append_save_effects(conn, &document, Some(old_status), None)?;

        info!(document_id = %document.id, "document submitted for review");
        Ok(document)
    })
}

/// Direct status edit, routed through the transition validator. Admins may
/// force any pair, including archiving.
pub fn set_status(
    conn: &mut PgConnection,
    document_id: Uuid,
    new_status: DocumentStatus,
    actor: Actor,
) -> DomainResult<Document> {
    conn.transaction(|conn| {
        let document = load_document_for_update(conn, document_id)?;
        validate_transition(&document, new_status, actor)?;

        let old_status = document.status;
        let now = Utc::now().naive_utc();
        let submitted_for_review_at = if new_status == DocumentStatus::Review {
            Some(now)
        } else {
            document.submitted_for_review_at
        };

        diesel::update(documents::table.find(document.id))
            .set((
                documents::status.eq(new_status),
                documents::submitted_for_review_at.eq(submitted_for_review_at),
                documents::updated_at.eq(now),
            ))
            .execute(conn)?;

        let document: Document = documents::table.find(document_id).first(conn)?;
        append_save_effects(conn, &document, Some(old_status), None)?;

        info!(document_id = %document.id, from = %old_status, to = %new_status, "document status changed");
        Ok(document)
    })
}

/// Flags the document deleted without touching its rows or blobs. The version
/// ledger keeps counting from where it left off if the document ever comes
/// back through an admin restore.
pub fn soft_delete(conn: &mut PgConnection, document_id: Uuid, actor: Actor) -> DomainResult<()> {
    conn.transaction(|conn| {
        let document = load_document_for_update(conn, document_id)?;

        if !policy::can_delete(actor, &document) {
            return Err(DomainError::permission(format!(
                "you cannot delete this document. Documents can only be deleted in draft or rejected status. Current status: {}",
                document.status
            )));
        }

        let old_status = document.status;
        diesel::update(documents::table.find(document.id))
            .set((
                documents::is_deleted.eq(true),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let document: Document = documents::table.find(document_id).first(conn)?;
        append_save_effects(conn, &document, Some(old_status), None)?;
        audit::record(
            conn,
            Some(actor.id),
            Some(document.id),
            AuditAction::Delete,
            format!("Deleted document: {}", document.title),
            None,
        )?;

        info!(document_id = %document.id, "document soft-deleted");
        Ok(())
    })
}

/// Trusted aggregation path invoked from task resolution, inside the
/// resolution's transaction. Re-derives the document status from all attached
/// tasks and records the completing reviewer; deliberately not routed through
/// the transition validator.
pub(crate) fn apply_review_outcome(
    conn: &mut PgConnection,
    document: &Document,
    task: &Task,
) -> DomainResult<Document> {
    let task_statuses: Vec<TaskStatus> = tasks::table
        .filter(tasks::document_id.eq(document.id))
        .select(tasks::status)
        .load(conn)?;

    let new_status = aggregate_status(&task_statuses);
    let old_status = document.status;
    let now = Utc::now().naive_utc();

    diesel::update(documents::table.find(document.id))
        .set((
            documents::status.eq(new_status),
            documents::reviewed_by.eq(Some(task.assigned_to)),
            documents::reviewed_at.eq(Some(now)),
            documents::review_comments.eq(&task.comments),
            documents::updated_at.eq(now),
        ))
        .execute(conn)?;

    let document: Document = documents::table.find(document.id).first(conn)?;
    append_save_effects(conn, &document, Some(old_status), None)?;

    Ok(document)
}
