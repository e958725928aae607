use std::fmt;
use std::io::Write;

use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant)),+,
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = std::str::from_utf8(value.as_bytes())?;
                Self::parse(raw)
                    .ok_or_else(|| format!("unrecognized {} value: {raw}", stringify!($name)).into())
            }
        }
    };
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Reviewer,
    User,
}

text_enum!(Role {
    Admin => "admin",
    Reviewer => "reviewer",
    User => "user",
});

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn is_reviewer(&self) -> bool {
        matches!(self, Role::Reviewer)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Review,
    Approved,
    Rejected,
    Archived,
}

text_enum!(DocumentStatus {
    Draft => "draft",
    Review => "review",
    Approved => "approved",
    Rejected => "rejected",
    Archived => "archived",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(TaskStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Upload,
    Update,
    Delete,
    Approved,
    Rejected,
    Download,
    View,
    Login,
}

text_enum!(AuditAction {
    Upload => "upload",
    Update => "update",
    Delete => "delete",
    Approved => "approved",
    Rejected => "rejected",
    Download => "download",
    View => "view",
    Login => "login",
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Task,
    Document,
}

text_enum!(NotificationKind {
    Task => "task",
    Document => "document",
});

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = folders)]
pub struct Folder {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = folders)]
pub struct NewFolder {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = categories)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = categories)]
pub struct NewCategory {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub file_key: String,
    pub content_type: Option<String>,
    pub folder_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub uploaded_by: Uuid,
    pub status: DocumentStatus,
    pub is_deleted: bool,
    pub submitted_for_review_at: Option<NaiveDateTime>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub review_comments: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Document {
    /// Draft and rejected documents are the only ones the owner may rework.
    pub fn can_be_edited(&self) -> bool {
        matches!(
            self.status,
            DocumentStatus::Draft | DocumentStatus::Rejected
        )
    }

    pub fn can_be_submitted_for_review(&self) -> bool {
        matches!(
            self.status,
            DocumentStatus::Draft | DocumentStatus::Rejected
        )
    }

    pub fn can_be_reviewed(&self) -> bool {
        self.status == DocumentStatus::Review
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub title: String,
    pub file_key: String,
    pub content_type: Option<String>,
    pub folder_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub uploaded_by: Uuid,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = document_versions)]
#[diesel(belongs_to(Document))]
pub struct DocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub file_key: String,
    pub version_number: i32,
    pub size_bytes: i64,
    pub checksum: String,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_versions)]
pub struct NewDocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub file_key: String,
    pub version_number: i32,
    pub size_bytes: i64,
    pub checksum: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = workflows)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_by: Uuid,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = workflows)]
pub struct NewWorkflow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Workflow))]
#[diesel(belongs_to(Document))]
pub struct Task {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub document_id: Uuid,
    pub assigned_to: Uuid,
    pub status: TaskStatus,
    pub comments: String,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub document_id: Uuid,
    pub assigned_to: Uuid,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = audit_trail)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub action: AuditAction,
    pub ip_address: Option<String>,
    pub description: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_trail)]
pub struct NewAuditEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub action: AuditAction,
    pub ip_address: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Option<Uuid>,
    pub message: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Option<Uuid>,
    pub message: String,
    pub kind: NotificationKind,
}
