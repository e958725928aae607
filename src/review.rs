//! Review workflow: reviewer assignment and task resolution.
//!
//! A task is one reviewer's assignment to one document inside a workflow.
//! Tasks resolve exactly once, pending -> approved or pending -> rejected,
//! and the document's status is re-derived from the full task set in the same
//! transaction, together with the notification and audit appends. Racing
//! resolutions serialize on the task row lock; the loser observes the task
//! already resolved and gets a conflict.

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::error::{DomainError, DomainResult};
use crate::lifecycle;
use crate::models::{
    AuditAction, Document, NewTask, NewWorkflow, NotificationKind, Task, TaskStatus, User,
    Workflow,
};
use crate::notify;
use crate::policy::{self, Actor};
use crate::schema::{tasks, users, workflows};

/// Assigns a reviewer to a document under review. Admin-only. When no
/// workflow is supplied, one is created for this review cycle.
pub fn create_task(
    conn: &mut PgConnection,
    document_id: Uuid,
    assignee_id: Uuid,
    workflow_id: Option<Uuid>,
    actor: Actor,
) -> DomainResult<Task> {
    if !actor.role.is_admin() {
        return Err(DomainError::permission("only admins can assign reviewers"));
    }

    conn.transaction(|conn| {
        let document = lifecycle::load_document_for_update(conn, document_id)?;

        if !document.can_be_reviewed() {
            return Err(DomainError::validation(
                "document must be in review status to assign a reviewer",
            ));
        }

        let assignee: User = users::table
            .find(assignee_id)
            .first(conn)
            .optional()?
            .ok_or(DomainError::NotFound)?;

        if assignee.id == document.uploaded_by {
            return Err(DomainError::validation(
                "cannot assign the document owner as reviewer (separation of duties)",
            ));
        }
        if !assignee.role.is_reviewer() && !assignee.role.is_admin() {
            return Err(DomainError::validation(
                "only users with reviewer or admin role can be assigned review tasks",
            ));
        }

        let workflow = resolve_workflow(conn, workflow_id, &document, actor)?;

        let new_task = NewTask {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            document_id: document.id,
            assigned_to: assignee.id,
            status: TaskStatus::Pending,
        };

        diesel::insert_into(tasks::table)
            .values(&new_task)
            .execute(conn)?;

        let task: Task = tasks::table.find(new_task.id).first(conn)?;

        notify::create(
            conn,
            assignee.id,
            Some(document.id),
            format!(
                "You have been assigned to review document '{}'",
                document.title
            ),
            NotificationKind::Task,
        )?;
        audit::record(
            conn,
            Some(assignee.id),
            Some(document.id),
            AuditAction::Update,
            format!("Review task assigned to {}", assignee.username),
            None,
        )?;

        info!(
            task_id = %task.id,
            document_id = %document.id,
            assignee = %assignee.username,
            "review task assigned"
        );
        Ok(task)
    })
}

fn resolve_workflow(
    conn: &mut PgConnection,
    workflow_id: Option<Uuid>,
    document: &Document,
    actor: Actor,
) -> DomainResult<Workflow> {
    if let Some(workflow_id) = workflow_id {
        let workflow: Option<Workflow> = workflows::table
            .find(workflow_id)
            .filter(workflows::is_active.eq(true))
            .first(conn)
            .optional()?;
        return workflow.ok_or(DomainError::NotFound);
    }

    let new_workflow = NewWorkflow {
        id: Uuid::new_v4(),
        name: format!("Review for {}", document.title),
        description: String::new(),
        created_by: actor.id,
    };

    diesel::insert_into(workflows::table)
        .values(&new_workflow)
        .execute(conn)?;

    Ok(workflows::table.find(new_workflow.id).first(conn)?)
}

pub fn approve_task(
    conn: &mut PgConnection,
    task_id: Uuid,
    reviewer: Actor,
    comments: &str,
) -> DomainResult<(Task, Document)> {
    resolve_task(conn, task_id, reviewer, comments, TaskStatus::Approved)
}

pub fn reject_task(
    conn: &mut PgConnection,
    task_id: Uuid,
    reviewer: Actor,
    comments: &str,
) -> DomainResult<(Task, Document)> {
    resolve_task(conn, task_id, reviewer, comments, TaskStatus::Rejected)
}

fn resolve_task(
    conn: &mut PgConnection,
    task_id: Uuid,
    reviewer: Actor,
    comments: &str,
    outcome: TaskStatus,
) -> DomainResult<(Task, Document)> {
    conn.transaction(|conn| {
        // Lock the task first, then the document, so concurrent resolutions
        // of the same task queue up here.
        let task: Task = tasks::table
            .find(task_id)
            .for_update()
            .first(conn)
            .optional()?
            .ok_or(DomainError::NotFound)?;

        let document = lifecycle::load_document_for_update(conn, task.document_id)?;

        if task.assigned_to != reviewer.id && !reviewer.role.is_admin() {
            return Err(DomainError::permission("you are not assigned to this task"));
        }
        if document.uploaded_by == reviewer.id {
            return Err(DomainError::permission(
                "you cannot review your own document (separation of duties)",
            ));
        }
        if !policy::can_review(reviewer, &document) {
            return Err(DomainError::permission(
                "you do not have permission to review this document",
            ));
        }

        if task.status != TaskStatus::Pending {
            return Err(DomainError::conflict(format!(
                "task has already been {}",
                task.status
            )));
        }

        if outcome == TaskStatus::Rejected && comments.trim().is_empty() {
            return Err(DomainError::validation(
                "comments are required when rejecting a document",
            ));
        }

        let assignee: User = users::table.find(task.assigned_to).first(conn)?;

        let now = Utc::now().naive_utc();
        diesel::update(tasks::table.find(task.id))
            .set((
                tasks::status.eq(outcome),
                tasks::comments.eq(comments),
                tasks::completed_at.eq(Some(now)),
            ))
            .execute(conn)?;

        let task: Task = tasks::table.find(task.id).first(conn)?;
        let document = lifecycle::apply_review_outcome(conn, &document, &task)?;

        let (message, action) = match outcome {
            TaskStatus::Approved => (
                format!(
                    "Your document '{}' has been approved by {}",
                    document.title, assignee.username
                ),
                AuditAction::Approved,
            ),
            TaskStatus::Rejected => (
                format!(
                    "Your document '{}' has been rejected by {}",
                    document.title, assignee.username
                ),
                AuditAction::Rejected,
            ),
            TaskStatus::Pending => unreachable!("tasks never resolve back to pending"),
        };

        notify::create(
            conn,
            document.uploaded_by,
            Some(document.id),
            message,
            NotificationKind::Task,
        )?;

        let excerpt: String = task.comments.chars().take(100).collect();
        audit::record(
            conn,
            Some(task.assigned_to),
            Some(document.id),
            action,
            format!(
                "Document {} by {}. Comments: {excerpt}",
                outcome, assignee.username
            ),
            None,
        )?;

        info!(
            task_id = %task.id,
            document_id = %document.id,
            outcome = %outcome,
            document_status = %document.status,
            "review task resolved"
        );
        Ok((task, document))
    })
}
