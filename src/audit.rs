//! Append-only audit trail. Entries are never updated or deleted; the
//! nullable user/document references survive removal of what they point at.

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{AuditAction, AuditEntry, NewAuditEntry};
use crate::schema::audit_trail;

pub fn record(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
    document_id: Option<Uuid>,
    action: AuditAction,
    description: impl Into<String>,
    ip_address: Option<&str>,
) -> QueryResult<AuditEntry> {
    let entry = NewAuditEntry {
        id: Uuid::new_v4(),
        user_id,
        document_id,
        action,
        ip_address: ip_address.map(|value| value.to_string()),
        description: description.into(),
    };

    diesel::insert_into(audit_trail::table)
        .values(&entry)
        .execute(conn)?;

    audit_trail::table.find(entry.id).first(conn)
}
