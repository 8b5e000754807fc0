use actix_web::{
    middleware::{Compress, DefaultHeaders, Logger},
    web, App, HttpRequest, HttpResponse, HttpServer,
};
use actix_multipart::Multipart;
use actix_web_httpauth::middleware::HttpAuthentication;
use actix_web::http::header;
use actix_cors::Cors;
use std::env;
use std::sync::Arc;

use anyhow::Context;
use rand::{thread_rng, Rng, distributions::Alphanumeric};
use rand::seq::SliceRandom;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Module declarations
mod attachment_handlers;
mod audit;
mod auth;
mod auth_handlers;
mod board;
mod config;
mod db;
mod equipment_handlers;
mod error;
mod handlers;
mod item_handlers;
mod listing;
mod models;
mod monitoring;
mod note_handlers;
mod notify;
mod pages;
mod reference_handlers;
mod request_handlers;
mod song_handlers;
mod validator;
mod venue_handlers;
mod wizard;

use crate::audit::ChangeSet;
use crate::auth::{get_current_user, AuthService, jwt_middleware};
use crate::auth_handlers::{
    change_password, change_user_password, check_catalog_permission, check_request_permission,
    create_user, delete_user, get_profile, get_roles, get_user, get_users, login, logout,
    register, update_user, CatalogAction, RequestAction,
};
use crate::board::BoardCache;
use crate::config::{load_config, Config};
use crate::error::ApiResult;
use crate::handlers::{get_dashboard_stats, get_recent_activity};
use crate::models::{
    AssignMemberRequest, CreateEquipmentRequest, CreateItemRequest, CreateNoteRequest,
    CreateSongRequest, CreateVenueRequest, Request, SetArchivedRequest,
    SetEquipmentAvailabilityRequest, SetItemAvailabilityRequest, SetSongAvailabilityRequest,
    SetVenueAvailabilityRequest, UpdateEquipmentRequest, UpdateItemRequest, UpdateRequestRequest,
    UpdateRequestStatusRequest, UpdateSongRequest, UpdateVenueRequest,
};
use crate::monitoring::{start_maintenance_tasks, Metrics, RequestLogger};
use crate::notify::Notifier;

pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Config,
    pub board: BoardCache,
    pub notifier: Arc<Notifier>,
}

// ==================== REQUEST PROTECTED WRAPPERS ====================

async fn update_request_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update_data: web::Json<UpdateRequestRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_request_permission(&http_request, RequestAction::Edit)?;
    let user_id = claims.sub.clone();
    let request_id = path.into_inner();

    // Fetch old request data for comparison
    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, Request>("SELECT * FROM requests WHERE id = ?")
        .bind(&request_id)
        .fetch_one(&app_state.db_pool)
        .await
    {
        if let Some(ref new_val) = update_data.who { cs.add("who", &old.who, new_val); }
        if let Some(ref new_val) = update_data.what { cs.add("what", &old.what, new_val); }
        if let Some(ref new_val) = update_data.when_ { cs.add("when", &old.when_, new_val); }
        if let Some(ref new_val) = update_data.where_ { cs.add("where", &old.where_, new_val); }
        if let Some(ref new_val) = update_data.why { cs.add("why", &old.why, new_val); }
        if let Some(ref new_val) = update_data.how { cs.add("how", &old.how, new_val); }
        if let Some(ref new_val) = update_data.info { cs.add_opt("info", &old.info, &Some(new_val.clone())); }
        if let Some(new_val) = update_data.due_at {
            cs.add_opt(
                "due_at",
                &old.due_at.map(|d| d.to_rfc3339()),
                &Some(new_val.to_rfc3339()),
            );
        }
        if let Some(ref new_val) = update_data.priority_id { cs.add("priority", &old.priority_id, new_val); }
        if let Some(ref new_val) = update_data.type_id { cs.add("type", &old.type_id, new_val); }
    }

    let desc = if cs.has_changes() {
        format!("Request {} updated: {}", request_id, cs.to_description())
    } else {
        format!("Request {} updated", request_id)
    };

    let response = request_handlers::update_request(
        app_state.clone(),
        web::Path::from(request_id.clone()),
        update_data,
        claims.sub,
    )
    .await?;
    audit::audit_with_changes(
        &app_state.db_pool, &user_id, "edit", "request", &request_id,
        &desc, &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_request_status_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update_data: web::Json<UpdateRequestStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_request_permission(&http_request, RequestAction::Move)?;
    let user_id = claims.sub.clone();
    let request_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String,)>(
        "SELECT s.name FROM requests r JOIN statuses s ON r.status_id = s.id WHERE r.id = ?"
    ).bind(&request_id).fetch_one(&app_state.db_pool).await {
        if let Ok(new) = sqlx::query_as::<_, (String,)>(
            "SELECT name FROM statuses WHERE id = ?"
        ).bind(&update_data.status_id).fetch_one(&app_state.db_pool).await {
            cs.add("status", &old.0, &new.0);
        }
    }

    let response = request_handlers::update_request_status(
        app_state.clone(),
        web::Path::from(request_id.clone()),
        update_data,
        claims.sub,
    )
    .await?;
    audit::audit_with_changes(
        &app_state.db_pool, &user_id, "move", "request", &request_id,
        &format!("Request {} moved: {}", request_id, cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn delete_request_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_request_permission(&http_request, RequestAction::Delete)?;
    let request_id = path.into_inner();

    // Fetch data before deletion
    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String, String)>(
        "SELECT who, what FROM requests WHERE id = ?"
    ).bind(&request_id).fetch_one(&app_state.db_pool).await {
        cs.deleted("who", &old.0);
        cs.deleted("what", &old.1);
    }

    let response = request_handlers::delete_request(
        app_state.clone(),
        web::Path::from(request_id.clone()),
    )
    .await?;
    audit::audit_with_changes(
        &app_state.db_pool, &claims.sub, "delete", "request", &request_id,
        &format!("Deleted request: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn assign_member_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<AssignMemberRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_request_permission(&http_request, RequestAction::Assign)?;
    let request_id = path.into_inner();
    let assigned_user = body.user_id.clone();

    let response = request_handlers::assign_member(
        app_state.clone(),
        web::Path::from(request_id.clone()),
        body,
    )
    .await?;
    audit::audit(
        &app_state.db_pool, &claims.sub, "assign", "request", &request_id,
        &format!("Assigned member {} to request {}", assigned_user, request_id),
        &http_request,
    ).await;
    Ok(response)
}

async fn unassign_member_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    check_request_permission(&http_request, RequestAction::Assign)?;
    request_handlers::unassign_member(app_state, path).await
}

// ==================== NOTE / ATTACHMENT PROTECTED WRAPPERS ====================

async fn create_note_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    note: web::Json<CreateNoteRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    // all roles may comment; the author is taken from the session
    let claims = get_current_user(&http_request)?;
    note_handlers::create_note(app_state, path, note, claims.username).await
}

async fn delete_note_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    check_request_permission(&http_request, RequestAction::Edit)?;
    note_handlers::delete_note(app_state, path).await
}

async fn upload_attachment_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    payload: Multipart,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_request_permission(&http_request, RequestAction::Edit)?;
    attachment_handlers::upload_attachment(app_state, path, payload, Some(claims.sub)).await
}

async fn delete_attachment_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    check_request_permission(&http_request, RequestAction::Delete)?;
    attachment_handlers::delete_attachment(app_state, path).await
}

/// Wizard follow-up upload: no session, no uploader recorded
async fn upload_attachment_public(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    payload: Multipart,
) -> ApiResult<HttpResponse> {
    attachment_handlers::upload_attachment(app_state, path, payload, None).await
}

// ==================== EQUIPMENT PROTECTED WRAPPERS ====================

async fn create_equipment_protected(
    app_state: web::Data<Arc<AppState>>,
    equipment: web::Json<CreateEquipmentRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Create)?;
    let user_id = claims.sub.clone();

    let mut cs = ChangeSet::new();
    cs.created("name", &equipment.name);
    cs.created("quantity", &format!("{}", equipment.quantity));
    if let Some(ref v) = equipment.description { cs.created("description", v); }

    let response = equipment_handlers::create_equipment(app_state.clone(), equipment, claims.sub).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &user_id, "create", "equipment", "",
        &format!("Created equipment: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_equipment_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update_data: web::Json<UpdateEquipmentRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    let user_id = claims.sub.clone();
    let equipment_id = path.into_inner();

    let mut cs = ChangeSet::new();
    let mut equip_name = equipment_id.clone();

    if let Ok(old) = sqlx::query_as::<_, (String, Option<String>, i64)>(
        "SELECT name, description, quantity FROM equipment WHERE id = ?"
    ).bind(&equipment_id).fetch_one(&app_state.db_pool).await {
        equip_name = old.0.clone();
        if let Some(ref new_val) = update_data.name { cs.add("name", &old.0, new_val); }
        if let Some(ref new_val) = update_data.description { cs.add_opt("description", &old.1, &Some(new_val.clone())); }
        if let Some(new_val) = update_data.quantity { cs.add_i64("quantity", old.2, new_val); }
    }

    let desc = if cs.has_changes() {
        format!("Equipment '{}' updated: {}", equip_name, cs.to_description())
    } else {
        format!("Equipment '{}' updated", equip_name)
    };

    let response = equipment_handlers::update_equipment(
        app_state.clone(), web::Path::from(equipment_id.clone()), update_data, claims.sub,
    ).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &user_id, "edit", "equipment", &equipment_id,
        &desc, &cs, &http_request,
    ).await;
    Ok(response)
}

async fn set_equipment_availability_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetEquipmentAvailabilityRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    let user_id = claims.sub.clone();
    let equipment_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (i64,)>(
        "SELECT available FROM equipment WHERE id = ?"
    ).bind(&equipment_id).fetch_one(&app_state.db_pool).await {
        cs.add_i64("available", old.0, body.available);
    }

    let response = equipment_handlers::set_equipment_availability(
        app_state.clone(), web::Path::from(equipment_id.clone()), body, claims.sub,
    ).await?;
    if cs.has_changes() {
        audit::audit_with_changes(
            &app_state.db_pool, &user_id, "edit", "equipment", &equipment_id,
            &format!("Equipment availability changed: {}", cs.to_description()),
            &cs, &http_request,
        ).await;
    }
    Ok(response)
}

async fn set_equipment_archived_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetArchivedRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    equipment_handlers::set_equipment_archived(app_state, path, body, claims.sub).await
}

async fn delete_equipment_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Delete)?;
    let equipment_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String, i64)>(
        "SELECT name, quantity FROM equipment WHERE id = ?"
    ).bind(&equipment_id).fetch_one(&app_state.db_pool).await {
        cs.deleted("name", &old.0);
        cs.deleted("quantity", &old.1.to_string());
    }

    let response = equipment_handlers::delete_equipment(
        app_state.clone(), web::Path::from(equipment_id.clone()),
    ).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &claims.sub, "delete", "equipment", &equipment_id,
        &format!("Deleted equipment: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

// ==================== SONG PROTECTED WRAPPERS ====================

async fn create_song_protected(
    app_state: web::Data<Arc<AppState>>,
    song: web::Json<CreateSongRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Create)?;
    let user_id = claims.sub.clone();

    let mut cs = ChangeSet::new();
    cs.created("title", &song.title);
    if let Some(ref v) = song.author { cs.created("author", v); }

    let response = song_handlers::create_song(app_state.clone(), song, claims.sub).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &user_id, "create", "song", "",
        &format!("Created song: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_song_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update_data: web::Json<UpdateSongRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    song_handlers::update_song(app_state, path, update_data, claims.sub).await
}

async fn set_song_availability_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetSongAvailabilityRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    let user_id = claims.sub.clone();
    let song_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (bool, bool)>(
        "SELECT instrumental, lyrics FROM songs WHERE id = ?"
    ).bind(&song_id).fetch_one(&app_state.db_pool).await {
        if let Some(new_val) = body.instrumental { cs.add_bool("instrumental", old.0, new_val); }
        if let Some(new_val) = body.lyrics { cs.add_bool("lyrics", old.1, new_val); }
    }

    let response = song_handlers::set_song_availability(
        app_state.clone(), web::Path::from(song_id.clone()), body, claims.sub,
    ).await?;
    if cs.has_changes() {
        audit::audit_with_changes(
            &app_state.db_pool, &user_id, "edit", "song", &song_id,
            &format!("Song availability changed: {}", cs.to_description()),
            &cs, &http_request,
        ).await;
    }
    Ok(response)
}

async fn set_song_archived_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetArchivedRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    song_handlers::set_song_archived(app_state, path, body, claims.sub).await
}

async fn delete_song_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Delete)?;
    let song_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String,)>(
        "SELECT title FROM songs WHERE id = ?"
    ).bind(&song_id).fetch_one(&app_state.db_pool).await {
        cs.deleted("title", &old.0);
    }

    let response = song_handlers::delete_song(
        app_state.clone(), web::Path::from(song_id.clone()),
    ).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &claims.sub, "delete", "song", &song_id,
        &format!("Deleted song: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

// ==================== VENUE PROTECTED WRAPPERS ====================

async fn create_venue_protected(
    app_state: web::Data<Arc<AppState>>,
    venue: web::Json<CreateVenueRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Create)?;
    let user_id = claims.sub.clone();

    let mut cs = ChangeSet::new();
    cs.created("name", &venue.name);
    if let Some(ref v) = venue.location { cs.created("location", v); }
    if let Some(v) = venue.capacity { cs.created("capacity", &format!("{}", v)); }

    let response = venue_handlers::create_venue(app_state.clone(), venue, claims.sub).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &user_id, "create", "venue", "",
        &format!("Created venue: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_venue_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update_data: web::Json<UpdateVenueRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    venue_handlers::update_venue(app_state, path, update_data, claims.sub).await
}

async fn set_venue_availability_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetVenueAvailabilityRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    let user_id = claims.sub.clone();
    let venue_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (bool,)>(
        "SELECT available FROM venues WHERE id = ?"
    ).bind(&venue_id).fetch_one(&app_state.db_pool).await {
        cs.add_bool("available", old.0, body.available);
    }

    let response = venue_handlers::set_venue_availability(
        app_state.clone(), web::Path::from(venue_id.clone()), body, claims.sub,
    ).await?;
    if cs.has_changes() {
        audit::audit_with_changes(
            &app_state.db_pool, &user_id, "edit", "venue", &venue_id,
            &format!("Venue availability changed: {}", cs.to_description()),
            &cs, &http_request,
        ).await;
    }
    Ok(response)
}

async fn set_venue_archived_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetArchivedRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    venue_handlers::set_venue_archived(app_state, path, body, claims.sub).await
}

async fn delete_venue_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Delete)?;
    let venue_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String,)>(
        "SELECT name FROM venues WHERE id = ?"
    ).bind(&venue_id).fetch_one(&app_state.db_pool).await {
        cs.deleted("name", &old.0);
    }

    let response = venue_handlers::delete_venue(
        app_state.clone(), web::Path::from(venue_id.clone()),
    ).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &claims.sub, "delete", "venue", &venue_id,
        &format!("Deleted venue: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

// ==================== ITEM PROTECTED WRAPPERS ====================

async fn create_item_protected(
    app_state: web::Data<Arc<AppState>>,
    item: web::Json<CreateItemRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Create)?;
    let user_id = claims.sub.clone();

    let mut cs = ChangeSet::new();
    cs.created("name", &item.name);
    if let Some(ref v) = item.description { cs.created("description", v); }

    let response = item_handlers::create_item(app_state.clone(), item, claims.sub).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &user_id, "create", "item", "",
        &format!("Created item: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

async fn update_item_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update_data: web::Json<UpdateItemRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    item_handlers::update_item(app_state, path, update_data, claims.sub).await
}

async fn set_item_availability_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetItemAvailabilityRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    item_handlers::set_item_availability(app_state, path, body, claims.sub).await
}

async fn set_item_archived_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<SetArchivedRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Edit)?;
    item_handlers::set_item_archived(app_state, path, body, claims.sub).await
}

async fn delete_item_protected(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let claims = check_catalog_permission(&http_request, CatalogAction::Delete)?;
    let item_id = path.into_inner();

    let mut cs = ChangeSet::new();
    if let Ok(old) = sqlx::query_as::<_, (String,)>(
        "SELECT name FROM items WHERE id = ?"
    ).bind(&item_id).fetch_one(&app_state.db_pool).await {
        cs.deleted("name", &old.0);
    }

    let response = item_handlers::delete_item(
        app_state.clone(), web::Path::from(item_id.clone()),
    ).await?;
    audit::audit_with_changes(
        &app_state.db_pool, &claims.sub, "delete", "item", &item_id,
        &format!("Deleted item: {}", cs.to_description()),
        &cs, &http_request,
    ).await;
    Ok(response)
}

// ==================== MAIN ====================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (this calls load_env_file internally)
    let config = load_config()?;

    // Setup logging
    setup_logging(&config)?;

    // Validate production config
    if env::var("CRMS_ENV").as_deref() == Ok("production") {
        validate_production_config(&config)?;
    }

    config.print_startup_info();

    // Setup database
    setup_database(&config.database.url).await?;

    // Create database pool
    let pool = create_database_pool(&config.database).await?;

    // Run migrations and seed reference data
    db::run_migrations(&pool).await?;

    // Create auth service
    let auth_service = Arc::new(AuthService::new(
        &config.auth.jwt_secret,
        config.auth.token_expiration_hours,
        config.auth.bcrypt_cost,
    ));

    // Create default admin if needed
    create_default_admin_if_needed(&pool, &auth_service).await?;

    // Create notifier and app state
    let notifier = Arc::new(Notifier::new(config.notifier.clone()));
    let app_state = Arc::new(AppState {
        db_pool: pool.clone(),
        config: config.clone(),
        board: BoardCache::new(),
        notifier,
    });

    // Start maintenance tasks
    let pool_clone = pool.clone();
    tokio::spawn(async move {
        start_maintenance_tasks(pool_clone).await;
    });

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let workers = config.server.workers;
    let keep_alive = std::time::Duration::from_secs(config.server.keep_alive);
    let client_timeout = std::time::Duration::from_secs(config.server.client_timeout);
    log::info!("Starting server at http://{}", bind_address);

    // Create metrics
    let metrics_arc = Arc::new(Metrics::new());
    let metrics = web::Data::from(metrics_arc.clone());

    let server = HttpServer::new(move || {
        let cors = setup_cors(&config.security.allowed_origins);
        let auth_middleware = HttpAuthentication::bearer(jwt_middleware);
        let security_headers = setup_security_headers(&config.security);

        App::new()
            .wrap(cors)
            .wrap(security_headers)
            .wrap(Logger::default())
            .wrap(Compress::default())
            .wrap(RequestLogger::new(metrics_arc.clone()))
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(pool.clone()))
            .app_data(metrics.clone())
            .app_data(web::JsonConfig::default().limit(config.security.max_request_size))

            // Health check and metrics (no auth)
            .service(
                web::scope("/health")
                    .route("", web::get().to(monitoring::health_check))
                    .route("/live", web::get().to(monitoring::liveness_check))
                    .route("/ready", web::get().to(monitoring::readiness_check))
                    .route("/metrics", web::get().to(monitoring::metrics_endpoint))
            )

            // Auth endpoints (no authentication required)
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/register", web::post().to(register))
            )

            // Public wizard endpoints
            .service(
                web::scope("/api/v1/public")
                    .route("/meta", web::get().to(request_handlers::get_submission_meta))
                    .route("/requests", web::post().to(request_handlers::submit_request))
                    .route("/requests/check", web::post().to(request_handlers::check_submission))
                    .route("/requests/{id}/attachments", web::post().to(upload_attachment_public))
            )

            // Protected API endpoints
            .service(
                web::scope("/api/v1")
                    .wrap(auth_middleware)

                    // Auth management
                    .service(
                        web::scope("/auth")
                            .route("/profile", web::get().to(get_profile))
                            .route("/change-password", web::post().to(change_password))
                            .route("/logout", web::post().to(logout))
                            .route("/roles", web::get().to(get_roles))
                            .route("/users", web::get().to(get_users))
                            .route("/users", web::post().to(create_user))
                            .route("/users/{id}", web::get().to(get_user))
                            .route("/users/{id}", web::put().to(update_user))
                            .route("/users/{id}", web::delete().to(delete_user))
                            .route("/users/{id}/reset-password", web::put().to(change_user_password))
                    )

                    // Dashboard
                    .service(
                        web::scope("/dashboard")
                            .route("/stats", web::get().to(get_dashboard_stats))
                            .route("/recent-activity", web::get().to(get_recent_activity))
                    )

                    // Reference tables
                    .service(
                        web::scope("/statuses")
                            .route("", web::get().to(reference_handlers::get_statuses))
                    )
                    .service(
                        web::scope("/priorities")
                            .route("", web::get().to(reference_handlers::get_priorities))
                    )
                    .service(
                        web::scope("/request-types")
                            .route("", web::get().to(reference_handlers::get_request_types))
                    )

                    // Requests
                    .service(
                        web::scope("/requests")
                            .route("", web::get().to(request_handlers::get_requests))
                            .route("/board", web::get().to(request_handlers::get_request_board))
                            .route("/{id}", web::get().to(request_handlers::get_request))
                            .route("/{id}", web::put().to(update_request_protected))
                            .route("/{id}", web::delete().to(delete_request_protected))
                            .route("/{id}/status", web::put().to(update_request_status_protected))
                            .route("/{id}/notes", web::get().to(note_handlers::get_notes))
                            .route("/{id}/notes", web::post().to(create_note_protected))
                            .route("/{id}/notes/{note_id}", web::delete().to(delete_note_protected))
                            .route("/{id}/attachments", web::get().to(attachment_handlers::get_attachments))
                            .route("/{id}/attachments", web::post().to(upload_attachment_protected))
                            .route("/{id}/attachments/{attachment_id}", web::get().to(attachment_handlers::download_attachment))
                            .route("/{id}/attachments/{attachment_id}", web::delete().to(delete_attachment_protected))
                            .route("/{id}/assignees", web::post().to(assign_member_protected))
                            .route("/{id}/assignees/{user_id}", web::delete().to(unassign_member_protected))
                    )

                    // Equipment
                    .service(
                        web::scope("/equipment")
                            .route("", web::get().to(equipment_handlers::get_equipment))
                            .route("", web::post().to(create_equipment_protected))
                            .route("/{id}", web::get().to(equipment_handlers::get_equipment_by_id))
                            .route("/{id}", web::put().to(update_equipment_protected))
                            .route("/{id}", web::delete().to(delete_equipment_protected))
                            .route("/{id}/availability", web::put().to(set_equipment_availability_protected))
                            .route("/{id}/archive", web::put().to(set_equipment_archived_protected))
                    )

                    // Songs
                    .service(
                        web::scope("/songs")
                            .route("", web::get().to(song_handlers::get_songs))
                            .route("", web::post().to(create_song_protected))
                            .route("/{id}", web::get().to(song_handlers::get_song))
                            .route("/{id}", web::put().to(update_song_protected))
                            .route("/{id}", web::delete().to(delete_song_protected))
                            .route("/{id}/availability", web::put().to(set_song_availability_protected))
                            .route("/{id}/archive", web::put().to(set_song_archived_protected))
                    )

                    // Venues
                    .service(
                        web::scope("/venues")
                            .route("", web::get().to(venue_handlers::get_venues))
                            .route("", web::post().to(create_venue_protected))
                            .route("/{id}", web::get().to(venue_handlers::get_venue))
                            .route("/{id}", web::put().to(update_venue_protected))
                            .route("/{id}", web::delete().to(delete_venue_protected))
                            .route("/{id}/availability", web::put().to(set_venue_availability_protected))
                            .route("/{id}/archive", web::put().to(set_venue_archived_protected))
                    )

                    // Items
                    .service(
                        web::scope("/items")
                            .route("", web::get().to(item_handlers::get_items))
                            .route("", web::post().to(create_item_protected))
                            .route("/{id}", web::get().to(item_handlers::get_item))
                            .route("/{id}", web::put().to(update_item_protected))
                            .route("/{id}", web::delete().to(delete_item_protected))
                            .route("/{id}/availability", web::put().to(set_item_availability_protected))
                            .route("/{id}/archive", web::put().to(set_item_archived_protected))
                    )
            )

            // HTML shell routes with entry redirects
            .route("/", web::get().to(pages::page_index))
            .route("/login", web::get().to(pages::page_login))
            .route("/admin", web::get().to(pages::page_admin))
            .route("/admin/{tail:.*}", web::get().to(pages::page_admin))
    })
        .keep_alive(keep_alive)
        .client_request_timeout(client_timeout)
        .bind(&bind_address)?;

    let server = match workers {
        Some(workers) => server.workers(workers),
        None => server,
    };

    server
        .run()
        .await
        .context("Server failed to run")?;

    Ok(())
}

// ==================== HELPER FUNCTIONS ====================

pub fn setup_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::USER_AGENT,
            header::REFERER,
        ])
        .expose_headers(vec![header::CONTENT_LENGTH])
        .max_age(3600);

    let is_production = env::var("CRMS_ENV").as_deref() == Ok("production");

    if allowed_origins.contains(&"*".to_string()) {
        if is_production {
            log::error!("Wildcard CORS origin (*) is not allowed in production");
            panic!("Cannot start server with wildcard CORS in production");
        } else {
            log::warn!("Using wildcard CORS (*) in development mode");
            cors = cors.allow_any_origin().allow_any_header().allow_any_method();
        }
    } else {
        for origin in allowed_origins {
            if origin.is_empty() {
                continue;
            }
            cors = cors.allowed_origin(origin);
        }
    }

    cors
}

fn setup_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            let level = config.logging.level.as_str();
            tracing_subscriber::EnvFilter::new(level)
        });

    if config.logging.console_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::sink))
            .init();
    }

    Ok(())
}

fn validate_production_config(config: &Config) -> anyhow::Result<()> {
    if config.auth.jwt_secret == "your-secret-key-here" || config.auth.jwt_secret.len() < 32 {
        anyhow::bail!("Insecure JWT secret in production! Must be at least 32 characters.");
    }

    if config.security.allowed_origins.contains(&"*".to_string()) {
        anyhow::bail!("Wildcard CORS origins not allowed in production!");
    }

    Ok(())
}

async fn setup_database(database_url: &str) -> anyhow::Result<()> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        log::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url).await?;
    }
    Ok(())
}

async fn create_database_pool(db_config: &crate::config::DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(db_config.connect_timeout))
        .idle_timeout(std::time::Duration::from_secs(db_config.idle_timeout))
        .connect(&db_config.url)
        .await?;
    Ok(pool)
}

fn setup_security_headers(config: &crate::config::SecurityConfig) -> DefaultHeaders {
    let mut headers = DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"));

    if config.require_https {
        headers = headers.add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains; preload"
        ));
    }

    headers
}

fn generate_admin_password() -> String {
    let mut rng = thread_rng();
    let specials: Vec<char> = "!@#$%^&*-_".chars().collect();

    loop {
        let mut pwd_chars: Vec<char> = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(14)
            .map(char::from)
            .collect();
        pwd_chars.push(*specials.choose(&mut rng).unwrap());
        pwd_chars.push(*specials.choose(&mut rng).unwrap());
        pwd_chars.shuffle(&mut rng);

        let pwd: String = pwd_chars.into_iter().collect();
        let has_upper = pwd.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = pwd.chars().any(|c| c.is_ascii_lowercase());
        let has_digit = pwd.chars().any(|c| c.is_ascii_digit());
        if has_upper && has_lower && has_digit {
            return pwd;
        }
    }
}

async fn create_default_admin_if_needed(
    pool: &SqlitePool,
    auth_service: &AuthService,
) -> anyhow::Result<()> {
    let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if user_count.0 == 0 {
        use crate::auth::{RegisterRequest, UserRole};

        // Demo fallback: DEFAULT_ADMIN_PASSWORD, otherwise a generated one
        let password = env::var("DEFAULT_ADMIN_PASSWORD").unwrap_or_else(|_| {
            let pwd = generate_admin_password();
            log::warn!("Generated admin password: {}", pwd);
            pwd
        });

        let admin_request = RegisterRequest {
            username: "admin".to_string(),
            email: "admin@crms.local".to_string(),
            password: password.clone(),
            role: None,
        };

        let user = crate::auth::User::create(pool, admin_request, UserRole::Admin, auth_service)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create default admin user: {}", e))?;

        log::warn!("Default admin user created ({}):", user.id);
        log::warn!("  Username: admin");
        log::warn!("  Password: {} (CHANGE IMMEDIATELY!)", password);
    }

    Ok(())
}
