use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Document, DocumentStatus, Task, TaskStatus, Workflow};
use crate::policy::Actor;
use crate::review;
use crate::schema::{documents, tasks, workflows};
use crate::state::AppState;

use super::documents::{
    pending_task_for_document, to_document_response, to_iso, DocumentWithTaskResponse,
};

#[derive(Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct PendingReviewsQuery {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct AssignReviewerRequest {
    pub reviewer_id: Uuid,
    pub workflow_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ResolveTaskRequest {
    #[serde(default)]
    pub comments: String,
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub document_id: Uuid,
    pub assigned_to: Uuid,
    pub status: TaskStatus,
    pub comments: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

fn to_task_response(task: Task) -> TaskResponse {
    TaskResponse {
        id: task.id,
        workflow_id: task.workflow_id,
        document_id: task.document_id,
        assigned_to: task.assigned_to,
        status: task.status,
        comments: task.comments,
        created_at: to_iso(task.created_at),
        completed_at: task.completed_at.map(to_iso),
    }
}

#[derive(Serialize)]
pub struct TaskListItemResponse {
    #[serde(flatten)]
    pub task: TaskResponse,
    pub document_title: String,
    pub document_status: DocumentStatus,
}

#[derive(Serialize)]
pub struct ReviewOutcomeResponse {
    pub task: TaskResponse,
    pub document_status: DocumentStatus,
}

#[derive(Serialize)]
pub struct WorkflowResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: String,
}

pub async fn list_my_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TaskListItemResponse>>> {
    if !user.role.is_reviewer() && !user.role.is_admin() {
        return Err(AppError::forbidden(
            "you do not have permission to access review tasks",
        ));
    }

    let mut conn = state.db()?;

    let mut query = tasks::table
        .inner_join(documents::table)
        .filter(tasks::assigned_to.eq(user.user_id))
        .select((tasks::all_columns, documents::all_columns))
        .into_boxed();

    // Pending assignments are the default worklist.
    query = query.filter(tasks::status.eq(params.status.unwrap_or(TaskStatus::Pending)));

    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        query = query.filter(documents::title.ilike(format!("%{q}%")));
    }

    let rows: Vec<(Task, Document)> = query.order(tasks::created_at.desc()).load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(task, document)| TaskListItemResponse {
                task: to_task_response(task),
                document_title: document.title,
                document_status: document.status,
            })
            .collect(),
    ))
}

pub async fn assign_reviewer(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<AssignReviewerRequest>,
) -> AppResult<(StatusCode, Json<TaskResponse>)> {
    let mut conn = state.db()?;
    let task = review::create_task(
        &mut conn,
        document_id,
        payload.reviewer_id,
        payload.workflow_id,
        Actor::from(&user),
    )?;

    Ok((StatusCode::CREATED, Json(to_task_response(task))))
}

pub async fn approve_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<ResolveTaskRequest>,
) -> AppResult<Json<ReviewOutcomeResponse>> {
    let mut conn = state.db()?;
    let (task, document) =
        review::approve_task(&mut conn, task_id, Actor::from(&user), &payload.comments)?;

    Ok(Json(ReviewOutcomeResponse {
        task: to_task_response(task),
        document_status: document.status,
    }))
}

pub async fn reject_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<ResolveTaskRequest>,
) -> AppResult<Json<ReviewOutcomeResponse>> {
    let mut conn = state.db()?;
    let (task, document) =
        review::reject_task(&mut conn, task_id, Actor::from(&user), &payload.comments)?;

    Ok(Json(ReviewOutcomeResponse {
        task: to_task_response(task),
        document_status: document.status,
    }))
}

pub async fn pending_reviews(
    State(state): State<AppState>,
    Query(params): Query<PendingReviewsQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentWithTaskResponse>>> {
    if !user.role.is_reviewer() && !user.role.is_admin() {
        return Err(AppError::forbidden(
            "you do not have permission to view pending reviews",
        ));
    }

    let mut conn = state.db()?;

    let mut query = documents::table
        .filter(documents::is_deleted.eq(false))
        .filter(documents::status.eq(DocumentStatus::Review))
        // Separation of duties: reviewers never see their own submissions.
        .filter(documents::uploaded_by.ne(user.user_id))
        .into_boxed();

    if let Some(q) = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        query = query.filter(documents::title.ilike(format!("%{q}%")));
    }

    let docs: Vec<Document> = query
        .order(documents::submitted_for_review_at.desc())
        .load(&mut conn)?;

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

pub async fn list_workflows(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<WorkflowResponse>>> {
    if !user.role.is_admin() {
        return Err(AppError::forbidden("only admins can manage workflows"));
    }

    let mut conn = state.db()?;
    let rows: Vec<Workflow> = workflows::table
        .filter(workflows::is_active.eq(true))
        .order(workflows::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|workflow| WorkflowResponse {
                id: workflow.id,
                name: workflow.name,
                description: workflow.description,
                is_active: workflow.is_active,
                created_at: to_iso(workflow.created_at),
            })
            .collect(),
    ))
}
