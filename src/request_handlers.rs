// src/request_handlers.rs
//! Request pipeline: wizard submission, list/board views, status moves,
//! assignment and deletion. Mutations invalidate the board cache; the
//! status move additionally patches it optimistically (see board.rs).

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::board::{build_columns, CardStatus};
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::listing::{filter_cards, parse_sort_rules, sort_cards, RequestCard};
use crate::models::{
    Assignee, AssignMemberRequest, Attachment, Item, Note, Priority, Request, RequestDetail,
    RequestEquipment, RequestRow, RequestType, Song, Status, SubmitRequestRequest,
    SubmitRequestResponse, UpdateRequestRequest, UpdateRequestStatusRequest, Venue,
};
use crate::notify::{spawn_request_created, NewRequestSummary};
use crate::wizard::{first_invalid_step, validate_step, validate_submission, Wizard, WizardStep};
use crate::AppState;

const CARD_SELECT: &str = r#"
    SELECT r.id, r.who, r.what, r.when_, r.where_, r.why, r.how, r.info,
           r.due_at, r.created_at,
           r.status_id, s.name AS status_name, s.value AS status_value, s.color AS status_color,
           r.priority_id, p.name AS priority_name, p.value AS priority_value,
           r.type_id, t.name AS type_name
    FROM requests r
    JOIN statuses s ON r.status_id = s.id
    JOIN priorities p ON r.priority_id = p.id
    JOIN request_types t ON r.type_id = t.id
"#;

// ==================== CARD LOADING ====================

/// Fetch every request with its joined names. The board views work on the
/// full set; filtering and sorting happen in memory (listing.rs).
async fn fetch_cards(pool: &SqlitePool) -> ApiResult<Vec<RequestCard>> {
    let rows: Vec<RequestRow> = sqlx::query_as(
        &format!("{} ORDER BY r.created_at DESC", CARD_SELECT)
    )
        .fetch_all(pool)
        .await?;

    let mut equipment_map: HashMap<String, Vec<RequestEquipment>> = HashMap::new();
    let equipment_rows: Vec<(String, String, String, i64)> = sqlx::query_as(
        r#"SELECT re.request_id, re.equipment_id, e.name, re.amount
           FROM request_equipment re
           JOIN equipment e ON re.equipment_id = e.id"#
    )
        .fetch_all(pool)
        .await?;
    for (request_id, equipment_id, name, amount) in equipment_rows {
        equipment_map
            .entry(request_id)
            .or_default()
            .push(RequestEquipment { equipment_id, name, amount });
    }

    let mut song_map: HashMap<String, Vec<String>> = HashMap::new();
    let song_rows: Vec<(String, String)> = sqlx::query_as(
        r#"SELECT rs.request_id, sg.title
           FROM request_songs rs
           JOIN songs sg ON rs.song_id = sg.id"#
    )
        .fetch_all(pool)
        .await?;
    for (request_id, title) in song_rows {
        song_map.entry(request_id).or_default().push(title);
    }

    let mut assignee_map: HashMap<String, Vec<String>> = HashMap::new();
    let assignee_rows: Vec<(String, String)> = sqlx::query_as(
        r#"SELECT ra.request_id, u.username
           FROM request_assignees ra
           JOIN users u ON ra.user_id = u.id"#
    )
        .fetch_all(pool)
        .await?;
    for (request_id, username) in assignee_rows {
        assignee_map.entry(request_id).or_default().push(username);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let id = row.id.clone();
            RequestCard {
                row,
                equipment: equipment_map.remove(&id).unwrap_or_default(),
                songs: song_map.remove(&id).unwrap_or_default(),
                assignees: assignee_map.remove(&id).unwrap_or_default(),
            }
        })
        .collect())
}

/// Read through the board cache
async fn load_cards(app_state: &AppState) -> ApiResult<Vec<RequestCard>> {
    if let Some(cards) = app_state.board.get() {
        return Ok(cards);
    }
    let cards = fetch_cards(&app_state.db_pool).await?;
    app_state.board.set(cards.clone());
    Ok(cards)
}

// ==================== LIST & BOARD VIEWS ====================

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    pub search: Option<String>,
    /// Comma list of `field:dir` rules, e.g. `due:asc,priority:desc`
    pub sort: Option<String>,
}

pub async fn get_requests(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<RequestListQuery>,
) -> ApiResult<HttpResponse> {
    let cards = load_cards(&app_state).await?;

    let mut cards = match query.search.as_deref() {
        Some(q) => filter_cards(&cards, q),
        None => cards,
    };

    if let Some(ref raw) = query.sort {
        let rules = parse_sort_rules(raw);
        sort_cards(&mut cards, &rules);
    }

    Ok(HttpResponse::Ok().json(ApiResponse::success(cards)))
}

pub async fn get_request_board(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<RequestListQuery>,
) -> ApiResult<HttpResponse> {
    let cards = load_cards(&app_state).await?;

    let mut cards = match query.search.as_deref() {
        Some(q) => filter_cards(&cards, q),
        None => cards,
    };

    if let Some(ref raw) = query.sort {
        let rules = parse_sort_rules(raw);
        sort_cards(&mut cards, &rules);
    }

    let statuses: Vec<Status> = sqlx::query_as("SELECT * FROM statuses ORDER BY value ASC")
        .fetch_all(&app_state.db_pool)
        .await?;

    let columns = build_columns(&statuses, &cards);
    Ok(HttpResponse::Ok().json(ApiResponse::success(columns)))
}

// ==================== DETAIL VIEW ====================

pub async fn get_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();
    let detail = load_request_detail(&app_state.db_pool, &request_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(detail)))
}

async fn load_request_detail(pool: &SqlitePool, request_id: &str) -> ApiResult<RequestDetail> {
    let request: Request = sqlx::query_as("SELECT * FROM requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::request_not_found(request_id))?;

    let status: Status = sqlx::query_as("SELECT * FROM statuses WHERE id = ?")
        .bind(&request.status_id)
        .fetch_one(pool)
        .await?;

    let priority: Priority = sqlx::query_as("SELECT * FROM priorities WHERE id = ?")
        .bind(&request.priority_id)
        .fetch_one(pool)
        .await?;

    let request_type: RequestType = sqlx::query_as("SELECT * FROM request_types WHERE id = ?")
        .bind(&request.type_id)
        .fetch_one(pool)
        .await?;

    let equipment: Vec<RequestEquipment> = sqlx::query_as(
        r#"SELECT re.equipment_id, e.name, re.amount
           FROM request_equipment re
           JOIN equipment e ON re.equipment_id = e.id
           WHERE re.request_id = ?"#
    )
        .bind(request_id)
        .fetch_all(pool)
        .await?;

    let songs: Vec<Song> = sqlx::query_as(
        r#"SELECT sg.* FROM request_songs rs
           JOIN songs sg ON rs.song_id = sg.id
           WHERE rs.request_id = ?"#
    )
        .bind(request_id)
        .fetch_all(pool)
        .await?;

    let venues: Vec<Venue> = sqlx::query_as(
        r#"SELECT v.* FROM request_venues rv
           JOIN venues v ON rv.venue_id = v.id
           WHERE rv.request_id = ?"#
    )
        .bind(request_id)
        .fetch_all(pool)
        .await?;

    let items: Vec<Item> = sqlx::query_as(
        r#"SELECT i.* FROM request_items ri
           JOIN items i ON ri.item_id = i.id
           WHERE ri.request_id = ?"#
    )
        .bind(request_id)
        .fetch_all(pool)
        .await?;

    let assignees: Vec<Assignee> = sqlx::query_as(
        r#"SELECT ra.user_id, u.username
           FROM request_assignees ra
           JOIN users u ON ra.user_id = u.id
           WHERE ra.request_id = ?"#
    )
        .bind(request_id)
        .fetch_all(pool)
        .await?;

    let notes: Vec<Note> = sqlx::query_as(
        "SELECT * FROM notes WHERE request_id = ? ORDER BY created_at ASC"
    )
        .bind(request_id)
        .fetch_all(pool)
        .await?;

    let attachments: Vec<Attachment> = sqlx::query_as(
        "SELECT * FROM attachments WHERE request_id = ? ORDER BY created_at ASC"
    )
        .bind(request_id)
        .fetch_all(pool)
        .await?;

    let flow_steps = request.flow_steps();

    Ok(RequestDetail {
        request,
        flow_steps,
        status,
        priority,
        request_type,
        equipment,
        songs,
        venues,
        items,
        assignees,
        notes,
        attachments,
    })
}

// ==================== SUBMISSION ====================

/// Reference data and catalog the wizard needs to render its steps
#[derive(Debug, Serialize)]
pub struct SubmissionMeta {
    pub request_types: Vec<RequestType>,
    pub priorities: Vec<Priority>,
    pub equipment: Vec<crate::models::Equipment>,
    pub songs: Vec<Song>,
    pub venues: Vec<Venue>,
    pub items: Vec<Item>,
}

pub async fn get_submission_meta(
    app_state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let request_types: Vec<RequestType> =
        sqlx::query_as("SELECT * FROM request_types ORDER BY value ASC")
            .fetch_all(&app_state.db_pool)
            .await?;
    let priorities: Vec<Priority> =
        sqlx::query_as("SELECT * FROM priorities ORDER BY value ASC")
            .fetch_all(&app_state.db_pool)
            .await?;
    let equipment: Vec<crate::models::Equipment> =
        sqlx::query_as("SELECT * FROM equipment WHERE archived = 0 ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?;
    let songs: Vec<Song> =
        sqlx::query_as("SELECT * FROM songs WHERE archived = 0 ORDER BY title ASC")
            .fetch_all(&app_state.db_pool)
            .await?;
    let venues: Vec<Venue> =
        sqlx::query_as("SELECT * FROM venues WHERE archived = 0 ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?;
    let items: Vec<Item> =
        sqlx::query_as("SELECT * FROM items WHERE archived = 0 ORDER BY name ASC")
            .fetch_all(&app_state.db_pool)
            .await?;

    let meta = SubmissionMeta { request_types, priorities, equipment, songs, venues, items };
    Ok(HttpResponse::Ok().json(ApiResponse::success(meta)))
}

/// Wizard submit: one request row plus one join row per selected catalog
/// association, committed atomically. The notice-period shortfall is
/// advisory and rides along in the success response; the outbound
/// notification is fire-and-forget. The wizard ends in its terminal
/// submitted state on success and stays on Review (with the error recorded)
/// on failure, so a retry resubmits the same draft.
pub async fn submit_request(
    app_state: web::Data<Arc<AppState>>,
    submission: web::Json<SubmitRequestRequest>,
) -> ApiResult<HttpResponse> {
    let submission = submission.into_inner();
    submission.validate()?;

    let mut wizard = Wizard::with_draft(submission);
    if !wizard.can_enter(WizardStep::Review)
        || !validate_step(&wizard.draft, WizardStep::Review).is_valid()
    {
        let step = first_invalid_step(&wizard.draft)
            .map(|s| s.to_string())
            .unwrap_or_else(|| WizardStep::Review.to_string());
        let gaps = validate_submission(&wizard.draft);
        return Err(ApiError::ValidationError(format!(
            "Submission incomplete at step '{}': {}",
            step,
            gaps.to_api_error()
        )));
    }

    let request_type: RequestType = sqlx::query_as("SELECT * FROM request_types WHERE id = ?")
        .bind(&wizard.draft.type_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::bad_request("Unknown request type"))?;

    let now = Utc::now();
    match insert_submission(&app_state, &wizard.draft, &request_type).await {
        Ok(id) => {
            wizard.mark_submitted(id);
            let id = wizard.submitted_id().unwrap_or_default().to_string();

            app_state.board.invalidate();
            let warning = wizard.notice_check(&request_type, now);

            spawn_request_created(
                app_state.notifier.clone(),
                NewRequestSummary {
                    id: id.clone(),
                    who: wizard.draft.who.trim().to_string(),
                    what: wizard.draft.what.trim().to_string(),
                    when_: wizard.draft.when_.trim().to_string(),
                    where_: wizard.draft.where_.trim().to_string(),
                    type_name: request_type.name.clone(),
                    due_at: wizard.draft.due_at,
                },
            );

            log::info!("Request {} submitted ({})", id, request_type.name);

            Ok(HttpResponse::Created().json(ApiResponse::success(SubmitRequestResponse {
                id,
                notice_warning: warning,
            })))
        }
        Err(e) => {
            wizard.mark_failed(e.to_string());
            log::warn!(
                "Request submission failed on step '{}': {}",
                wizard.step(),
                wizard.last_error().unwrap_or("unknown error")
            );
            Err(e)
        }
    }
}

/// Insert the request row and its join rows in one transaction. A missing
/// or archived catalog reference aborts the whole submission.
async fn insert_submission(
    app_state: &AppState,
    draft: &SubmitRequestRequest,
    request_type: &RequestType,
) -> ApiResult<String> {
    // New submissions enter the pipeline at the lowest-valued status
    let status: Status = sqlx::query_as("SELECT * FROM statuses ORDER BY value ASC LIMIT 1")
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::InternalServerError("No statuses configured".to_string()))?;

    let priority: Priority = match draft.priority_id {
        Some(ref id) => sqlx::query_as("SELECT * FROM priorities WHERE id = ?")
            .bind(id)
            .fetch_optional(&app_state.db_pool)
            .await?
            .ok_or_else(|| ApiError::bad_request("Unknown priority"))?,
        None => {
            let normal: Option<Priority> =
                sqlx::query_as("SELECT * FROM priorities WHERE name = 'Normal'")
                    .fetch_optional(&app_state.db_pool)
                    .await?;
            match normal {
                Some(priority) => priority,
                None => sqlx::query_as("SELECT * FROM priorities ORDER BY value ASC LIMIT 1")
                    .fetch_optional(&app_state.db_pool)
                    .await?
                    .ok_or_else(|| {
                        ApiError::InternalServerError("No priorities configured".to_string())
                    })?,
            }
        }
    };

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let flow = if draft.flow.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&draft.flow)
            .map_err(|e| ApiError::InternalServerError(format!("Failed to encode flow: {}", e)))?)
    };

    let mut tx = app_state.db_pool.begin().await?;

    sqlx::query(
        r#"INSERT INTO requests
           (id, who, what, when_, where_, why, how, info, due_at, flow,
            status_id, priority_id, type_id, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
    )
        .bind(&id)
        .bind(draft.who.trim())
        .bind(draft.what.trim())
        .bind(draft.when_.trim())
        .bind(draft.where_.trim())
        .bind(draft.why.trim())
        .bind(draft.how.trim())
        .bind(&draft.info)
        .bind(&draft.due_at)
        .bind(&flow)
        .bind(&status.id)
        .bind(&priority.id)
        .bind(&request_type.id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

    for selection in &draft.equipment {
        let exists: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM equipment WHERE id = ? AND archived = 0"
        )
            .bind(&selection.equipment_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown or archived equipment selected"));
        }

        sqlx::query(
            "INSERT INTO request_equipment (id, request_id, equipment_id, amount, created_at) VALUES (?, ?, ?, ?, ?)"
        )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(&selection.equipment_id)
            .bind(selection.amount)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
    }

    for song_id in &draft.songs {
        let exists: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM songs WHERE id = ? AND archived = 0"
        )
            .bind(song_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown or archived song selected"));
        }

        sqlx::query(
            "INSERT INTO request_songs (id, request_id, song_id, created_at) VALUES (?, ?, ?, ?)"
        )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(song_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
    }

    for venue_id in &draft.venues {
        let exists: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM venues WHERE id = ? AND archived = 0"
        )
            .bind(venue_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown or archived venue selected"));
        }

        sqlx::query(
            "INSERT INTO request_venues (id, request_id, venue_id, created_at) VALUES (?, ?, ?, ?)"
        )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(venue_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
    }

    for item_id in &draft.items {
        let exists: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM items WHERE id = ? AND archived = 0"
        )
            .bind(item_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown or archived item selected"));
        }

        sqlx::query(
            "INSERT INTO request_items (id, request_id, item_id, created_at) VALUES (?, ?, ?, ?)"
        )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(item_id)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    Ok(id)
}

// ==================== WIZARD STEP CHECK ====================

/// What the client wizard asks between steps: how far the draft can
/// navigate, what blocks it, and whether the due date trips the notice
/// period of the chosen request type.
#[derive(Debug, Serialize)]
pub struct WizardCheckResponse {
    pub can_submit: bool,
    pub reachable_step: WizardStep,
    pub first_invalid_step: Option<WizardStep>,
    pub validation: crate::validator::ValidationResult,
}

pub async fn check_submission(
    app_state: web::Data<Arc<AppState>>,
    submission: web::Json<SubmitRequestRequest>,
) -> ApiResult<HttpResponse> {
    let mut wizard = Wizard::with_draft(submission.into_inner());

    // drive the guarded navigation as far as the draft allows
    while wizard.advance().is_ok() {}

    let mut validation = validate_submission(&wizard.draft);
    if !wizard.draft.type_id.trim().is_empty() {
        let request_type: Option<RequestType> =
            sqlx::query_as("SELECT * FROM request_types WHERE id = ?")
                .bind(&wizard.draft.type_id)
                .fetch_optional(&app_state.db_pool)
                .await?;
        if let Some(ref request_type) = request_type {
            if let Some(warning) = wizard.notice_check(request_type, Utc::now()) {
                validation.add_warning("due", warning);
            }
        }
    }

    let response = WizardCheckResponse {
        can_submit: validation.is_valid(),
        reachable_step: wizard.step(),
        first_invalid_step: first_invalid_step(&wizard.draft),
        validation,
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

// ==================== UPDATE / DELETE ====================

pub async fn update_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateRequestRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    update.validate()?;
    let request_id = path.into_inner();

    let existing: Request = sqlx::query_as("SELECT * FROM requests WHERE id = ?")
        .bind(&request_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::request_not_found(&request_id))?;

    if let Some(ref priority_id) = update.priority_id {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM priorities WHERE id = ?")
            .bind(priority_id)
            .fetch_optional(&app_state.db_pool)
            .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown priority"));
        }
    }
    if let Some(ref type_id) = update.type_id {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM request_types WHERE id = ?")
            .bind(type_id)
            .fetch_optional(&app_state.db_pool)
            .await?;
        if exists.is_none() {
            return Err(ApiError::bad_request("Unknown request type"));
        }
    }

    let now = Utc::now();
    let who = update.who.as_ref().unwrap_or(&existing.who);
    let what = update.what.as_ref().unwrap_or(&existing.what);
    let when_ = update.when_.as_ref().unwrap_or(&existing.when_);
    let where_ = update.where_.as_ref().unwrap_or(&existing.where_);
    let why = update.why.as_ref().unwrap_or(&existing.why);
    let how = update.how.as_ref().unwrap_or(&existing.how);
    let info = update.info.clone().or(existing.info);
    let due_at = update.due_at.or(existing.due_at);
    let flow = match update.flow {
        Some(ref steps) if steps.is_empty() => None,
        Some(ref steps) => Some(serde_json::to_string(steps)
            .map_err(|e| ApiError::InternalServerError(format!("Failed to encode flow: {}", e)))?),
        None => existing.flow,
    };
    let priority_id = update.priority_id.as_ref().unwrap_or(&existing.priority_id);
    let type_id = update.type_id.as_ref().unwrap_or(&existing.type_id);

    sqlx::query(
        r#"UPDATE requests
           SET who = ?, what = ?, when_ = ?, where_ = ?, why = ?, how = ?,
               info = ?, due_at = ?, flow = ?, priority_id = ?, type_id = ?,
               updated_by = ?, updated_at = ?
           WHERE id = ?"#
    )
        .bind(who)
        .bind(what)
        .bind(when_)
        .bind(where_)
        .bind(why)
        .bind(how)
        .bind(&info)
        .bind(&due_at)
        .bind(&flow)
        .bind(priority_id)
        .bind(type_id)
        .bind(&user_id)
        .bind(&now)
        .bind(&request_id)
        .execute(&app_state.db_pool)
        .await?;

    app_state.board.invalidate();

    let detail = load_request_detail(&app_state.db_pool, &request_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(detail)))
}

/// Kanban drag-drop. The cached card is patched before the write; a failed
/// write restores the snapshot so the board reflects the backend again.
pub async fn update_request_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    update: web::Json<UpdateRequestStatusRequest>,
    user_id: String,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();

    let status: Status = sqlx::query_as("SELECT * FROM statuses WHERE id = ?")
        .bind(&update.status_id)
        .fetch_optional(&app_state.db_pool)
        .await?
        .ok_or_else(|| ApiError::status_not_found(&update.status_id))?;

    let command = app_state
        .board
        .apply_status(&request_id, CardStatus::from_status(&status));

    let result = sqlx::query(
        "UPDATE requests SET status_id = ?, updated_by = ?, updated_at = ? WHERE id = ?"
    )
        .bind(&status.id)
        .bind(&user_id)
        .bind(Utc::now())
        .bind(&request_id)
        .execute(&app_state.db_pool)
        .await;

    match result {
        Err(e) => {
            if let Some(command) = command {
                command.rollback(&app_state.board);
            }
            Err(e.into())
        }
        Ok(res) if res.rows_affected() == 0 => {
            if let Some(command) = command {
                command.rollback(&app_state.board);
            }
            Err(ApiError::request_not_found(&request_id))
        }
        Ok(_) => {
            // confirmed: the snapshot is discarded by dropping the command
            log::info!("Request {} moved to status '{}'", request_id, status.name);
            Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
                status,
                "Request status updated".to_string(),
            )))
        }
    }
}

pub async fn delete_request(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();

    let result = sqlx::query("DELETE FROM requests WHERE id = ?")
        .bind(&request_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::request_not_found(&request_id));
    }

    app_state.board.invalidate();

    log::info!("Deleted request {}", request_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Request deleted successfully".to_string(),
    )))
}

// ==================== ASSIGNEES ====================

pub async fn assign_member(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<AssignMemberRequest>,
) -> ApiResult<HttpResponse> {
    let request_id = path.into_inner();

    check_request_exists(&app_state.db_pool, &request_id).await?;

    let user: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ? AND is_active = 1")
        .bind(&body.user_id)
        .fetch_optional(&app_state.db_pool)
        .await?;
    if user.is_none() {
        return Err(ApiError::bad_request("Unknown or inactive user"));
    }

    let already: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM request_assignees WHERE request_id = ? AND user_id = ?"
    )
        .bind(&request_id)
        .bind(&body.user_id)
        .fetch_optional(&app_state.db_pool)
        .await?;
    if already.is_some() {
        return Err(ApiError::bad_request("Member is already assigned"));
    }

    sqlx::query(
        "INSERT INTO request_assignees (id, request_id, user_id, created_at) VALUES (?, ?, ?, ?)"
    )
        .bind(Uuid::new_v4().to_string())
        .bind(&request_id)
        .bind(&body.user_id)
        .bind(Utc::now())
        .execute(&app_state.db_pool)
        .await?;

    app_state.board.invalidate();

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        (),
        "Member assigned".to_string(),
    )))
}

pub async fn unassign_member(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (request_id, user_id) = path.into_inner();

    let result = sqlx::query(
        "DELETE FROM request_assignees WHERE request_id = ? AND user_id = ?"
    )
        .bind(&request_id)
        .bind(&user_id)
        .execute(&app_state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Assignment"));
    }

    app_state.board.invalidate();

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
        (),
        "Member unassigned".to_string(),
    )))
}

pub async fn check_request_exists(pool: &SqlitePool, request_id: &str) -> ApiResult<()> {
    let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM requests WHERE id = ?")
        .bind(request_id)
        .fetch_optional(pool)
        .await?;
    exists
        .map(|_| ())
        .ok_or_else(|| ApiError::request_not_found(request_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardCache;
    use crate::config::Config;
    use crate::models::EquipmentSelection;
    use crate::notify::Notifier;
    use sqlx::sqlite::SqlitePoolOptions;

    // One connection so the in-memory database is shared across queries
    async fn test_state() -> Arc<AppState> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        crate::db::run_migrations(&pool).await.expect("migrations");

        let config = Config::default();
        let notifier = Arc::new(Notifier::new(config.notifier.clone()));
        Arc::new(AppState {
            db_pool: pool,
            config,
            board: BoardCache::new(),
            notifier,
        })
    }

    async fn seed_equipment(state: &AppState, id: &str, name: &str, quantity: i64) {
        sqlx::query(
            r#"INSERT INTO equipment
               (id, name, description, quantity, available, archived, created_at, updated_at)
               VALUES (?, ?, NULL, ?, ?, 0, datetime('now'), datetime('now'))"#,
        )
        .bind(id)
        .bind(name)
        .bind(quantity)
        .bind(quantity)
        .execute(&state.db_pool)
        .await
        .expect("seed equipment");
    }

    fn draft(type_id: &str) -> SubmitRequestRequest {
        SubmitRequestRequest {
            who: "Choir".to_string(),
            what: "Stage Lighting".to_string(),
            when_: "Saturday 19:00".to_string(),
            where_: "Main hall".to_string(),
            why: "Spring concert".to_string(),
            how: "Full rig".to_string(),
            type_id: type_id.to_string(),
            ..Default::default()
        }
    }

    async fn seeded_type(state: &AppState) -> RequestType {
        sqlx::query_as("SELECT * FROM request_types ORDER BY value ASC LIMIT 1")
            .fetch_one(&state.db_pool)
            .await
            .expect("seeded request type")
    }

    #[tokio::test]
    async fn test_submission_creates_request_and_join_rows() {
        let state = test_state().await;
        seed_equipment(&state, "eq-1", "Fog Machine", 4).await;
        let request_type = seeded_type(&state).await;

        let mut draft = draft(&request_type.id);
        draft.equipment.push(EquipmentSelection {
            equipment_id: "eq-1".to_string(),
            amount: 2,
        });

        let id = insert_submission(&state, &draft, &request_type)
            .await
            .expect("submission");

        let requests: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(requests.0, 1);

        let join: (String, i64) = sqlx::query_as(
            "SELECT equipment_id, amount FROM request_equipment WHERE request_id = ?",
        )
        .bind(&id)
        .fetch_one(&state.db_pool)
        .await
        .unwrap();
        assert_eq!(join.0, "eq-1");
        assert_eq!(join.1, 2);

        // the new row enters the pipeline at the lowest-valued status
        let status_value: (i64,) = sqlx::query_as(
            "SELECT s.value FROM requests r JOIN statuses s ON r.status_id = s.id WHERE r.id = ?",
        )
        .bind(&id)
        .fetch_one(&state.db_pool)
        .await
        .unwrap();
        let min_value: (i64,) = sqlx::query_as("SELECT MIN(value) FROM statuses")
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(status_value.0, min_value.0);
    }

    #[tokio::test]
    async fn test_submission_rolls_back_on_unknown_equipment() {
        let state = test_state().await;
        let request_type = seeded_type(&state).await;

        let mut draft = draft(&request_type.id);
        draft.equipment.push(EquipmentSelection {
            equipment_id: "missing".to_string(),
            amount: 1,
        });

        let result = insert_submission(&state, &draft, &request_type).await;
        assert!(result.is_err());

        // the transaction took the request row down with it
        let requests: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
            .fetch_one(&state.db_pool)
            .await
            .unwrap();
        assert_eq!(requests.0, 0);
    }

    #[tokio::test]
    async fn test_submission_without_priority_defaults_to_normal() {
        let state = test_state().await;
        let request_type = seeded_type(&state).await;

        let id = insert_submission(&state, &draft(&request_type.id), &request_type)
            .await
            .expect("submission");

        let priority: (String,) = sqlx::query_as(
            "SELECT p.name FROM requests r JOIN priorities p ON r.priority_id = p.id WHERE r.id = ?",
        )
        .bind(&id)
        .fetch_one(&state.db_pool)
        .await
        .unwrap();
        assert_eq!(priority.0, "Normal");
    }
}
