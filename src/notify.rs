//! In-app notification feed. Rows are written by the review workflow and
//! only ever mutated by the recipient's bulk mark-read.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{NewNotification, Notification, NotificationKind};
use crate::schema::notifications;

pub fn create(
    conn: &mut PgConnection,
    user_id: Uuid,
    document_id: Option<Uuid>,
    message: impl Into<String>,
    kind: NotificationKind,
) -> QueryResult<Notification> {
    let notification = NewNotification {
        id: Uuid::new_v4(),
        user_id,
        document_id,
        message: message.into(),
        kind,
    };

    diesel::insert_into(notifications::table)
        .values(&notification)
        .execute(conn)?;

    notifications::table.find(notification.id).first(conn)
}

/// Idempotent: flips every unread notification for the recipient and reports
/// how many changed.
pub fn mark_all_read(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<usize> {
    diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(conn)
}
