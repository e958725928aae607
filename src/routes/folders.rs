use axum::extract::{Json, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Category, Folder, NewCategory, NewFolder};
use crate::schema::{categories, folders};
use crate::state::AppState;

use super::documents::to_iso;

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize)]
pub struct FolderResponse {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

fn to_folder_response(folder: Folder) -> FolderResponse {
    FolderResponse {
        id: folder.id,
        name: folder.name,
        created_by: folder.created_by,
        created_at: to_iso(folder.created_at),
    }
}

fn to_category_response(category: Category) -> CategoryResponse {
    CategoryResponse {
        id: category.id,
        name: category.name,
        description: category.description,
        created_at: to_iso(category.created_at),
    }
}

pub async fn list_folders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<FolderResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Folder> = folders::table
        .filter(folders::created_by.eq(user.user_id))
        .order(folders::name.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_folder_response).collect()))
}

pub async fn create_folder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateFolderRequest>,
) -> AppResult<(StatusCode, Json<FolderResponse>)> {
    if !user.role.is_admin() {
        return Err(AppError::forbidden("only admins can manage folders"));
    }

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("folder name must not be empty"));
    }

    let mut conn = state.db()?;

    let new_folder = NewFolder {
        id: Uuid::new_v4(),
        name: name.to_string(),
        created_by: user.user_id,
    };
    diesel::insert_into(folders::table)
        .values(&new_folder)
        .execute(&mut conn)?;

    let folder: Folder = folders::table.find(new_folder.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(to_folder_response(folder))))
}

pub async fn list_categories(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<Vec<CategoryResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Category> = categories::table
        .order(categories::name.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_category_response).collect()))
}

pub async fn create_category(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> AppResult<(StatusCode, Json<CategoryResponse>)> {
    if !user.role.is_admin() {
        return Err(AppError::forbidden("only admins can manage categories"));
    }

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("category name must not be empty"));
    }

    let mut conn = state.db()?;

    let new_category = NewCategory {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: payload.description.trim().to_string(),
    };
    diesel::insert_into(categories::table)
        .values(&new_category)
        .execute(&mut conn)?;

    let category: Category = categories::table.find(new_category.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(to_category_response(category))))
}
