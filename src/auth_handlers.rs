// src/auth_handlers.rs
//! Login, registration, profile and user management endpoints, plus the
//! per-action permission checks the protected wrappers in main.rs use.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::auth::{
    get_current_user, AuthService, ChangePasswordRequest, Claims, LoginRequest, LoginResponse,
    RegisterRequest, User, UserInfo, UserRole,
};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::pages::{sanitize_next, SESSION_COOKIE};
use crate::AppState;

// ==================== PERMISSION CHECKS ====================

#[derive(Debug, Clone, Copy)]
pub enum RequestAction {
    Edit,
    Move,
    Assign,
    Delete,
}

#[derive(Debug, Clone, Copy)]
pub enum CatalogAction {
    Create,
    Edit,
    Delete,
}

pub fn get_claims_from_request(req: &HttpRequest) -> ApiResult<Claims> {
    get_current_user(req)
}

pub fn check_request_permission(req: &HttpRequest, action: RequestAction) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    let allowed = match action {
        RequestAction::Edit => claims.role.can_edit_requests(),
        RequestAction::Move => claims.role.can_move_requests(),
        RequestAction::Assign => claims.role.can_assign_requests(),
        RequestAction::Delete => claims.role.can_delete_requests(),
    };
    if allowed {
        Ok(claims)
    } else {
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

pub fn check_catalog_permission(req: &HttpRequest, action: CatalogAction) -> ApiResult<Claims> {
    let claims = get_current_user(req)?;
    let allowed = match action {
        CatalogAction::Create => claims.role.can_create_catalog(),
        CatalogAction::Edit => claims.role.can_edit_catalog(),
        CatalogAction::Delete => claims.role.can_delete_catalog(),
    };
    if allowed {
        Ok(claims)
    } else {
        Err(ApiError::Forbidden("Insufficient permissions".to_string()))
    }
}

// ==================== LOGIN / REGISTER ====================

pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    let mut user = User::find_by_username(&app_state.db_pool, &request.username)
        .await
        .map_err(|_| ApiError::AuthError("Invalid username or password".to_string()))?;

    if user.is_locked() {
        return Err(ApiError::Forbidden(
            "Account is temporarily locked after repeated failures".to_string(),
        ));
    }

    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".to_string()));
    }

    let password_ok = auth_service
        .verify_password(&request.password, &user.password_hash)
        .map_err(|_| ApiError::InternalServerError("Password verification failed".to_string()))?;

    if !password_ok {
        user.increment_failed_attempts(&app_state.db_pool).await?;
        let max_attempts = app_state.config.auth.max_login_attempts;
        if user.failed_login_attempts >= max_attempts {
            let lockout = Duration::minutes(app_state.config.auth.lockout_duration_minutes as i64);
            user.lock_for_duration(&app_state.db_pool, lockout).await?;
            log::warn!("Account '{}' locked after {} failed logins", user.username, max_attempts);
        }
        return Err(ApiError::AuthError("Invalid username or password".to_string()));
    }

    user.reset_failed_attempts(&app_state.db_pool).await?;
    user.update_last_login(&app_state.db_pool).await?;

    let token = auth_service.generate_token(&user)?;
    let expires_in = auth_service.token_expiration_hours() * 3600;
    let next = sanitize_next(request.next.as_deref()).unwrap_or_else(|| "/admin".to_string());

    log::info!("User '{}' logged in", user.username);

    let cookie = Cookie::build(SESSION_COOKIE, token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(expires_in))
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(ApiResponse::success(LoginResponse {
        token,
        expires_in,
        next,
        user: UserInfo::from(user),
    })))
}

pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RegisterRequest>,
) -> ApiResult<HttpResponse> {
    request.validate()?;

    if !app_state.config.auth.allow_self_registration {
        return Err(ApiError::Forbidden("Self registration is disabled".to_string()));
    }

    let username_taken = User::find_by_username(&app_state.db_pool, &request.username)
        .await
        .is_ok();
    if username_taken {
        return Err(ApiError::bad_request("Username is already taken"));
    }

    // Self registration only grants the lowest role
    let user = User::create(
        &app_state.db_pool,
        request.into_inner(),
        UserRole::Member,
        &auth_service,
    )
    .await?;

    log::info!("User '{}' registered", user.username);
    Ok(HttpResponse::Created().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn logout() -> ApiResult<HttpResponse> {
    // JWT tokens are stateless; drop the shell cookie and let the client
    // discard its bearer token.
    let cookie = Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::seconds(0))
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(ApiResponse::success_with_message(
        (),
        "Logged out successfully".to_string(),
    )))
}

// ==================== PROFILE ====================

pub async fn get_profile(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn change_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<ChangePasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    request.validate()?;
    let claims = get_current_user(&http_request)?;
    let user = User::find_by_id(&app_state.db_pool, &claims.sub).await?;

    user.change_password(
        &app_state.db_pool,
        &request.current_password,
        &request.new_password,
        &auth_service,
    )
    .await?;

    log::info!("User '{}' changed their password", user.username);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password changed successfully".to_string(),
    )))
}

// ==================== ROLES ====================

#[derive(Debug, Serialize)]
pub struct RoleInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub async fn get_roles() -> ApiResult<HttpResponse> {
    let roles: Vec<RoleInfo> = UserRole::all_roles()
        .into_iter()
        .map(|role| RoleInfo {
            id: role.as_str(),
            name: role.display_name(),
            description: role.description(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(roles)))
}

// ==================== USER MANAGEMENT (ADMIN) ====================

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

fn require_user_management(http_request: &HttpRequest) -> ApiResult<Claims> {
    let claims = get_current_user(http_request)?;
    if !claims.role.can_manage_users() {
        return Err(ApiError::Forbidden("Only administrators can manage users".to_string()));
    }
    Ok(claims)
}

pub async fn get_users(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    if !claims.role.can_view_users() {
        return Err(ApiError::Forbidden("Insufficient permissions".to_string()));
    }

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY username ASC")
        .fetch_all(&app_state.db_pool)
        .await?;

    let infos: Vec<UserInfo> = users.into_iter().map(UserInfo::from).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(infos)))
}

pub async fn get_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = get_current_user(&http_request)?;
    if !claims.role.can_view_users() {
        return Err(ApiError::Forbidden("Insufficient permissions".to_string()));
    }

    let user = User::find_by_id(&app_state.db_pool, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn create_user(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    request: web::Json<RegisterRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_user_management(&http_request)?;
    request.validate()?;

    let role = request
        .role
        .as_deref()
        .map(|raw| UserRole::from_str(raw).ok_or_else(|| ApiError::bad_request("Unknown role")))
        .transpose()?
        .unwrap_or(UserRole::Member);

    let username_taken = User::find_by_username(&app_state.db_pool, &request.username)
        .await
        .is_ok();
    if username_taken {
        return Err(ApiError::bad_request("Username is already taken"));
    }

    let user = User::create(&app_state.db_pool, request.into_inner(), role, &auth_service).await?;

    log::info!("Admin created user '{}' ({})", user.username, user.role);
    Ok(HttpResponse::Created().json(ApiResponse::success(UserInfo::from(user))))
}

pub async fn update_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    request: web::Json<UpdateUserRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_user_management(&http_request)?;
    request.validate()?;
    let user_id = path.into_inner();

    let existing = User::find_by_id(&app_state.db_pool, &user_id).await?;

    let role = match request.role.as_deref() {
        Some(raw) => UserRole::from_str(raw)
            .ok_or_else(|| ApiError::bad_request("Unknown role"))?
            .as_str()
            .to_string(),
        None => existing.role.clone(),
    };

    // an admin cannot demote or deactivate themselves
    let is_active = request.is_active.unwrap_or(existing.is_active);
    if claims.sub == user_id && (!is_active || role != "admin") {
        return Err(ApiError::bad_request("Cannot demote or deactivate your own account"));
    }

    let email = request.email.clone().unwrap_or(existing.email);

    sqlx::query(
        "UPDATE users SET email = ?, role = ?, is_active = ?, updated_at = datetime('now') WHERE id = ?"
    )
        .bind(&email)
        .bind(&role)
        .bind(is_active as i32)
        .bind(&user_id)
        .execute(&app_state.db_pool)
        .await?;

    let updated = User::find_by_id(&app_state.db_pool, &user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(UserInfo::from(updated))))
}

pub async fn delete_user(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = require_user_management(&http_request)?;
    let user_id = path.into_inner();

    if claims.sub == user_id {
        return Err(ApiError::bad_request("Cannot delete your own account"));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User"));
    }

    log::info!("Admin deleted user {}", user_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "User deleted successfully".to_string(),
    )))
}

pub async fn change_user_password(
    app_state: web::Data<Arc<AppState>>,
    auth_service: web::Data<Arc<AuthService>>,
    path: web::Path<String>,
    request: web::Json<ResetPasswordRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_user_management(&http_request)?;
    request.validate()?;

    let user = User::find_by_id(&app_state.db_pool, &path.into_inner()).await?;

    let new_hash = auth_service
        .hash_password(&request.new_password)
        .map_err(|_| ApiError::ValidationError("Password does not meet the strength rules".to_string()))?;

    sqlx::query(
        "UPDATE users SET password_hash = ?, failed_login_attempts = 0, locked_until = NULL, updated_at = datetime('now') WHERE id = ?"
    )
        .bind(&new_hash)
        .bind(&user.id)
        .execute(&app_state.db_pool)
        .await?;

    log::info!("Admin reset password for '{}'", user.username);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Password reset successfully".to_string(),
    )))
}
