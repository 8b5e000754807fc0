// src/pages.rs
//! HTML entry routes and their redirect rules. The API is JWT-bearer; the
//! shell pages use the session cookie set at login purely to decide where
//! an entry lands: an unauthenticated hit on an admin path bounces to the
//! login page with a `next` parameter, an authenticated hit on `/` or
//! `/login` bounces to the dashboard (or the `next` target).

use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

use serde::Deserialize;

use crate::auth::AuthService;

pub const SESSION_COOKIE: &str = "crms_token";

// ==================== REDIRECT RULES ====================

/// Only site-relative paths survive; anything else would be an open
/// redirect.
pub fn sanitize_next(next: Option<&str>) -> Option<String> {
    let next = next?.trim();
    if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') {
        Some(next.to_string())
    } else {
        None
    }
}

/// Where an admin-prefixed entry should go. None means: serve the shell.
pub fn resolve_admin_entry(authenticated: bool, path: &str) -> Option<String> {
    if authenticated {
        None
    } else {
        Some(format!("/login?next={}", path))
    }
}

/// Where `/` and `/login` entries should go for an authenticated session.
/// None means: serve the page.
pub fn resolve_entry(authenticated: bool, next: Option<&str>) -> Option<String> {
    if authenticated {
        Some(sanitize_next(next).unwrap_or_else(|| "/admin".to_string()))
    } else {
        None
    }
}

// ==================== HANDLERS ====================

fn is_authenticated(req: &HttpRequest, auth_service: &AuthService) -> bool {
    req.cookie(SESSION_COOKIE)
        .map(|cookie| auth_service.verify_token(cookie.value()).is_ok())
        .unwrap_or(false)
}

fn redirect(target: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("Location", target))
        .finish()
}

fn shell(title: &str, body: &str) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(format!(
            "<!doctype html><html><head><meta charset=\"utf-8\"><title>{} - CRMS</title></head><body><div id=\"app\" data-page=\"{}\"></div></body></html>",
            title, body
        ))
}

#[derive(Debug, Deserialize)]
pub struct EntryQuery {
    pub next: Option<String>,
}

pub async fn page_index(
    auth_service: web::Data<Arc<AuthService>>,
    query: web::Query<EntryQuery>,
    req: HttpRequest,
) -> HttpResponse {
    let authed = is_authenticated(&req, &auth_service);
    match resolve_entry(authed, query.next.as_deref()) {
        Some(target) => redirect(&target),
        None => shell("Submit a request", "wizard"),
    }
}

pub async fn page_login(
    auth_service: web::Data<Arc<AuthService>>,
    query: web::Query<EntryQuery>,
    req: HttpRequest,
) -> HttpResponse {
    let authed = is_authenticated(&req, &auth_service);
    match resolve_entry(authed, query.next.as_deref()) {
        Some(target) => redirect(&target),
        None => shell("Sign in", "login"),
    }
}

pub async fn page_admin(
    auth_service: web::Data<Arc<AuthService>>,
    req: HttpRequest,
) -> HttpResponse {
    let authed = is_authenticated(&req, &auth_service);
    match resolve_admin_entry(authed, req.path()) {
        Some(target) => redirect(&target),
        None => shell("Dashboard", "admin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_next_accepts_relative_paths() {
        assert_eq!(sanitize_next(Some("/admin/requests")), Some("/admin/requests".to_string()));
        assert_eq!(sanitize_next(Some(" /admin ")), Some("/admin".to_string()));
    }

    #[test]
    fn test_sanitize_next_rejects_external_targets() {
        assert_eq!(sanitize_next(Some("https://evil.example")), None);
        assert_eq!(sanitize_next(Some("//evil.example")), None);
        assert_eq!(sanitize_next(Some("/\\evil")), None);
        assert_eq!(sanitize_next(None), None);
    }

    #[test]
    fn test_unauthenticated_admin_entry_redirects_to_login() {
        assert_eq!(
            resolve_admin_entry(false, "/admin/board"),
            Some("/login?next=/admin/board".to_string())
        );
        assert_eq!(resolve_admin_entry(true, "/admin/board"), None);
    }

    #[test]
    fn test_authenticated_login_entry_redirects() {
        assert_eq!(resolve_entry(true, None), Some("/admin".to_string()));
        assert_eq!(
            resolve_entry(true, Some("/admin/equipment")),
            Some("/admin/equipment".to_string())
        );
        // unsafe next falls back to the dashboard
        assert_eq!(resolve_entry(true, Some("https://evil.example")), Some("/admin".to_string()));
    }

    #[test]
    fn test_unauthenticated_public_entry_stays() {
        assert_eq!(resolve_entry(false, None), None);
        assert_eq!(resolve_entry(false, Some("/admin")), None);
    }
}
