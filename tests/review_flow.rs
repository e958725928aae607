mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use docflow::models::Role;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct DocumentDetail {
    document: DocumentInfo,
    #[serde(default)]
    pending_task: Option<PendingTaskInfo>,
}

#[derive(Deserialize)]
struct DocumentInfo {
    id: Uuid,
    status: String,
    submitted_for_review_at: Option<String>,
    reviewed_by: Option<Uuid>,
    review_comments: String,
}

#[derive(Deserialize)]
struct PendingTaskInfo {
    assigned_to: Uuid,
    assigned_to_username: String,
}

#[derive(Deserialize)]
struct TaskInfo {
    id: Uuid,
    document_id: Uuid,
    assigned_to: Uuid,
    status: String,
}

#[derive(Deserialize)]
struct ReviewOutcome {
    task: TaskInfo,
    document_status: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

async fn upload_draft(app: &TestApp, token: &str, filename: &str) -> Result<Uuid> {
    let response = app
        .upload_document(filename, "text/plain", b"draft body", token)
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_vec(response.into_body()).await?;
    let detail: DocumentDetail = serde_json::from_slice(&body)?;
    assert_eq!(detail.document.status, "draft");
    Ok(detail.document.id)
}

async fn submit(app: &TestApp, token: &str, document_id: Uuid) -> Result<DocumentInfo> {
    let response = app
        .post_json(
            &format!("/api/documents/{document_id}/submit"),
            &json!({}),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn assign(
    app: &TestApp,
    token: &str,
    document_id: Uuid,
    reviewer_id: Uuid,
) -> Result<TaskInfo> {
    let response = app
        .post_json(
            &format!("/api/documents/{document_id}/tasks"),
            &json!({ "reviewer_id": reviewer_id }),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[tokio::test]
async fn full_approval_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let owner_id = app.insert_user("alice", "alicepw", Role::User).await?;
    let reviewer_id = app.insert_user("bob", "bobpw", Role::Reviewer).await?;
    app.insert_user("root", "rootpw", Role::Admin).await?;

    let owner_token = app.login_token("alice", "alicepw").await?;
    let reviewer_token = app.login_token("bob", "bobpw").await?;
    let admin_token = app.login_token("root", "rootpw").await?;

    let doc_id = upload_draft(&app, &owner_token, "handbook.txt").await?;
    assert_eq!(app.version_numbers(doc_id).await?, vec![1]);

    let submitted = submit(&app, &owner_token, doc_id).await?;
    assert_eq!(submitted.status, "review");
    assert!(submitted.submitted_for_review_at.is_some());
    assert_eq!(app.version_numbers(doc_id).await?, vec![1, 2]);

    let task = assign(&app, &admin_token, doc_id, reviewer_id).await?;
    assert_eq!(task.status, "pending");
    assert_eq!(task.assigned_to, reviewer_id);
    assert_eq!(task.document_id, doc_id);

    // The assignee is notified and the assignment is audited.
    let reviewer_inbox = app.notifications_for(reviewer_id).await?;
    assert_eq!(reviewer_inbox.len(), 1);
    assert!(reviewer_inbox[0].message.contains("assigned to review"));
    let audit = app.audit_for_document(doc_id).await?;
    assert!(audit
        .iter()
        .any(|entry| entry.description.contains("Review task assigned to bob")));

    // The pending assignment is visible on the document detail.
    let detail_resp = app
        .get(&format!("/api/documents/{doc_id}"), Some(&admin_token))
        .await?;
    assert_eq!(detail_resp.status(), StatusCode::OK);
    let detail: DocumentDetail =
        serde_json::from_slice(&body_to_vec(detail_resp.into_body()).await?)?;
    let pending = detail.pending_task.expect("pending task in detail");
    assert_eq!(pending.assigned_to, reviewer_id);
    assert_eq!(pending.assigned_to_username, "bob");

    let approve_resp = app
        .post_json(
            &format!("/api/tasks/{}/approve", task.id),
            &json!({ "comments": "ok" }),
            Some(&reviewer_token),
        )
        .await?;
    assert_eq!(approve_resp.status(), StatusCode::OK);
    let outcome: ReviewOutcome =
        serde_json::from_slice(&body_to_vec(approve_resp.into_body()).await?)?;
    assert_eq!(outcome.task.status, "approved");
    assert_eq!(outcome.document_status, "approved");

    // Review metadata lands on the document, the owner is notified, and the
    // aggregation save appended another version.
    let detail_resp = app
        .get(&format!("/api/documents/{doc_id}"), Some(&owner_token))
        .await?;
    let detail: DocumentDetail =
        serde_json::from_slice(&body_to_vec(detail_resp.into_body()).await?)?;
    assert_eq!(detail.document.status, "approved");
    assert_eq!(detail.document.reviewed_by, Some(reviewer_id));
    assert_eq!(detail.document.review_comments, "ok");
    assert_eq!(app.version_numbers(doc_id).await?, vec![1, 2, 3]);

    let owner_inbox = app.notifications_for(owner_id).await?;
    assert!(owner_inbox
        .iter()
        .any(|entry| entry.message.contains("approved by bob")));

    let audit = app.audit_for_document(doc_id).await?;
    assert!(audit
        .iter()
        .any(|entry| entry.action.as_str() == "approved"));
    assert!(audit.iter().any(|entry| entry
        .description
        .contains("status changed from review to approved")));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejection_loops_back_to_review() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("ana", "anapw", Role::User).await?;
    let reviewer_id = app.insert_user("ben", "benpw", Role::Reviewer).await?;
    app.insert_user("root", "rootpw", Role::Admin).await?;

    let owner_token = app.login_token("ana", "anapw").await?;
    let reviewer_token = app.login_token("ben", "benpw").await?;
    let admin_token = app.login_token("root", "rootpw").await?;

    let doc_id = upload_draft(&app, &owner_token, "draft.txt").await?;
    submit(&app, &owner_token, doc_id).await?;
    let task = assign(&app, &admin_token, doc_id, reviewer_id).await?;

    // Rejection without comments is refused outright.
    let empty_reject = app
        .post_json(
            &format!("/api/tasks/{}/reject", task.id),
            &json!({ "comments": "" }),
            Some(&reviewer_token),
        )
        .await?;
    assert_eq!(empty_reject.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorBody = serde_json::from_slice(&body_to_vec(empty_reject.into_body()).await?)?;
    assert!(error.error.contains("comments are required"));

    let reject_resp = app
        .post_json(
            &format!("/api/tasks/{}/reject", task.id),
            &json!({ "comments": "fix formatting" }),
            Some(&reviewer_token),
        )
        .await?;
    assert_eq!(reject_resp.status(), StatusCode::OK);
    let outcome: ReviewOutcome =
        serde_json::from_slice(&body_to_vec(reject_resp.into_body()).await?)?;
    assert_eq!(outcome.task.status, "rejected");
    assert_eq!(outcome.document_status, "rejected");

    // The owner resubmits straight from rejected, looping back to review.
    let resubmitted = submit(&app, &owner_token, doc_id).await?;
    assert_eq!(resubmitted.status, "review");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn owner_cannot_be_assigned_as_reviewer() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let owner_id = app.insert_user("selfie", "selfpw", Role::Reviewer).await?;
    app.insert_user("root", "rootpw", Role::Admin).await?;

    let owner_token = app.login_token("selfie", "selfpw").await?;
    let admin_token = app.login_token("root", "rootpw").await?;

    let doc_id = upload_draft(&app, &owner_token, "own-work.txt").await?;
    submit(&app, &owner_token, doc_id).await?;

    let response = app
        .post_json(
            &format!("/api/documents/{doc_id}/tasks"),
            &json!({ "reviewer_id": owner_id }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorBody = serde_json::from_slice(&body_to_vec(response.into_body()).await?)?;
    assert!(error.error.contains("separation of duties"));

    // No task row was created.
    assert!(app.tasks_for_document(doc_id).await?.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn assignment_preconditions() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("uma", "umapw", Role::User).await?;
    let reviewer_id = app.insert_user("rex", "rexpw", Role::Reviewer).await?;
    let regular_id = app.insert_user("norole", "norolepw", Role::User).await?;
    app.insert_user("root", "rootpw", Role::Admin).await?;

    let owner_token = app.login_token("uma", "umapw").await?;
    let reviewer_token = app.login_token("rex", "rexpw").await?;
    let admin_token = app.login_token("root", "rootpw").await?;

    let doc_id = upload_draft(&app, &owner_token, "memo.txt").await?;

    // Assignment requires the document to be in review.
    let too_early = app
        .post_json(
            &format!("/api/documents/{doc_id}/tasks"),
            &json!({ "reviewer_id": reviewer_id }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(too_early.status(), StatusCode::UNPROCESSABLE_ENTITY);

    submit(&app, &owner_token, doc_id).await?;

    // Only admins assign reviewers.
    let not_admin = app
        .post_json(
            &format!("/api/documents/{doc_id}/tasks"),
            &json!({ "reviewer_id": reviewer_id }),
            Some(&reviewer_token),
        )
        .await?;
    assert_eq!(not_admin.status(), StatusCode::FORBIDDEN);

    // Assignees must hold the reviewer or admin role.
    let wrong_role = app
        .post_json(
            &format!("/api/documents/{doc_id}/tasks"),
            &json!({ "reviewer_id": regular_id }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(wrong_role.status(), StatusCode::UNPROCESSABLE_ENTITY);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn resolving_twice_conflicts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("ola", "olapw", Role::User).await?;
    let reviewer_id = app.insert_user("vic", "vicpw", Role::Reviewer).await?;
    app.insert_user("root", "rootpw", Role::Admin).await?;

    let owner_token = app.login_token("ola", "olapw").await?;
    let reviewer_token = app.login_token("vic", "vicpw").await?;
    let admin_token = app.login_token("root", "rootpw").await?;

    let doc_id = upload_draft(&app, &owner_token, "spec.txt").await?;
    submit(&app, &owner_token, doc_id).await?;
    let task = assign(&app, &admin_token, doc_id, reviewer_id).await?;

    let first = app
        .post_json(
            &format!("/api/tasks/{}/approve", task.id),
            &json!({}),
            Some(&reviewer_token),
        )
        .await?;
    assert_eq!(first.status(), StatusCode::OK);

    // The loser of the race sees the task already resolved.
    let second = app
        .post_json(
            &format!("/api/tasks/{}/reject", task.id),
            &json!({ "comments": "changed my mind" }),
            Some(&reviewer_token),
        )
        .await?;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let error: ErrorBody = serde_json::from_slice(&body_to_vec(second.into_body()).await?)?;
    assert!(error.error.contains("already been approved"));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn resolution_permissions() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("pia", "piapw", Role::User).await?;
    let assignee_id = app.insert_user("sam", "sampw", Role::Reviewer).await?;
    app.insert_user("tess", "tesspw", Role::Reviewer).await?;
    app.insert_user("root", "rootpw", Role::Admin).await?;

    let owner_token = app.login_token("pia", "piapw").await?;
    let other_reviewer_token = app.login_token("tess", "tesspw").await?;
    let admin_token = app.login_token("root", "rootpw").await?;

    let doc_id = upload_draft(&app, &owner_token, "plan.txt").await?;
    submit(&app, &owner_token, doc_id).await?;
    let task = assign(&app, &admin_token, doc_id, assignee_id).await?;

    // A reviewer who is not the assignee cannot resolve the task.
    let not_assigned = app
        .post_json(
            &format!("/api/tasks/{}/approve", task.id),
            &json!({}),
            Some(&other_reviewer_token),
        )
        .await?;
    assert_eq!(not_assigned.status(), StatusCode::FORBIDDEN);

    // The owner cannot resolve their own review either.
    let owner_resolves = app
        .post_json(
            &format!("/api/tasks/{}/approve", task.id),
            &json!({}),
            Some(&owner_token),
        )
        .await?;
    assert_eq!(owner_resolves.status(), StatusCode::FORBIDDEN);

    // An admin may resolve on behalf of the assignee; the recorded reviewer
    // stays the assignee.
    let admin_resolves = app
        .post_json(
            &format!("/api/tasks/{}/approve", task.id),
            &json!({ "comments": "fine" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(admin_resolves.status(), StatusCode::OK);

    let detail_resp = app
        .get(&format!("/api/documents/{doc_id}"), Some(&admin_token))
        .await?;
    let detail: DocumentDetail =
        serde_json::from_slice(&body_to_vec(detail_resp.into_body()).await?)?;
    assert_eq!(detail.document.status, "approved");
    assert_eq!(detail.document.reviewed_by, Some(assignee_id));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn aggregation_over_multiple_reviewers() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("max", "maxpw", Role::User).await?;
    let first_id = app.insert_user("ruth", "ruthpw", Role::Reviewer).await?;
    let second_id = app.insert_user("saul", "saulpw", Role::Reviewer).await?;
    app.insert_user("root", "rootpw", Role::Admin).await?;

    let owner_token = app.login_token("max", "maxpw").await?;
    let first_token = app.login_token("ruth", "ruthpw").await?;
    let second_token = app.login_token("saul", "saulpw").await?;
    let admin_token = app.login_token("root", "rootpw").await?;

    // All approvals required before the document turns approved.
    let doc_id = upload_draft(&app, &owner_token, "joint.txt").await?;
    submit(&app, &owner_token, doc_id).await?;
    let first_task = assign(&app, &admin_token, doc_id, first_id).await?;
    let second_task = assign(&app, &admin_token, doc_id, second_id).await?;

    let outcome: ReviewOutcome = serde_json::from_slice(
        &body_to_vec(
            app.post_json(
                &format!("/api/tasks/{}/approve", first_task.id),
                &json!({}),
                Some(&first_token),
            )
            .await?
            .into_body(),
        )
        .await?,
    )?;
    assert_eq!(outcome.document_status, "review");

    let outcome: ReviewOutcome = serde_json::from_slice(
        &body_to_vec(
            app.post_json(
                &format!("/api/tasks/{}/approve", second_task.id),
                &json!({}),
                Some(&second_token),
            )
            .await?
            .into_body(),
        )
        .await?,
    )?;
    assert_eq!(outcome.document_status, "approved");

    // A single rejection vetoes the other reviewer's approval.
    let doc_id = upload_draft(&app, &owner_token, "contested.txt").await?;
    submit(&app, &owner_token, doc_id).await?;
    let first_task = assign(&app, &admin_token, doc_id, first_id).await?;
    let second_task = assign(&app, &admin_token, doc_id, second_id).await?;

    let outcome: ReviewOutcome = serde_json::from_slice(
        &body_to_vec(
            app.post_json(
                &format!("/api/tasks/{}/approve", first_task.id),
                &json!({}),
                Some(&first_token),
            )
            .await?
            .into_body(),
        )
        .await?,
    )?;
    assert_eq!(outcome.document_status, "review");

    let outcome: ReviewOutcome = serde_json::from_slice(
        &body_to_vec(
            app.post_json(
                &format!("/api/tasks/{}/reject", second_task.id),
                &json!({ "comments": "insufficient evidence" }),
                Some(&second_token),
            )
            .await?
            .into_body(),
        )
        .await?,
    )?;
    assert_eq!(outcome.document_status, "rejected");

    app.cleanup().await?;
    Ok(())
}
