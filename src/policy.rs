//! Capability decisions derived from role, ownership, and document status.
//!
//! These are pure predicates: no persistence, no side effects. Every mutating
//! operation in the crate gates on one of them (or on
//! [`crate::lifecycle::validate_transition`], which composes them).

use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::models::{Document, Role, User};

/// Minimal identity view the capability checks need.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl From<&AuthenticatedUser> for Actor {
    fn from(user: &AuthenticatedUser) -> Self {
        Self {
            id: user.user_id,
            role: user.role,
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            role: user.role,
        }
    }
}

pub fn can_view(actor: Actor, document: &Document) -> bool {
    if actor.role.is_admin() || actor.role.is_reviewer() {
        return true;
    }
    document.uploaded_by == actor.id
}

pub fn can_edit(actor: Actor, document: &Document) -> bool {
    if actor.role.is_admin() {
        return true;
    }
    document.uploaded_by == actor.id && document.can_be_edited()
}

pub fn can_delete(actor: Actor, document: &Document) -> bool {
    if actor.role.is_admin() {
        return true;
    }
    document.uploaded_by == actor.id && document.can_be_edited()
}

/// Every role may upload today; kept as an explicit gate so a future
/// restriction only touches one place.
pub fn can_upload(actor: Actor) -> bool {
    matches!(actor.role, Role::Admin | Role::Reviewer | Role::User)
}

pub fn can_review(actor: Actor, document: &Document) -> bool {
    if !actor.role.is_reviewer() && !actor.role.is_admin() {
        return false;
    }
    // Separation of duties: an owner never reviews their own document.
    document.uploaded_by != actor.id
}

pub fn can_approve(actor: Actor, document: &Document) -> bool {
    can_review(actor, document)
}

pub fn can_override_status(actor: Actor) -> bool {
    actor.role.is_admin()
}
