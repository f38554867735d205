//! HTTP API for member clients.

use crate::node::NodeState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use mutuals_engine::{restore_locks, Member, MemberEdit, MemberStore, ReportSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        // Members
        .route("/api/v1/members", post(create_member))
        .route("/api/v1/members/:id", get(get_member))
        .route("/api/v1/members/:id/crushes", put(update_crushes))
        .route("/api/v1/members/:id/identity", put(update_identity))
        // Reports
        .route("/api/v1/reports/latest", get(latest_report))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(e: &mutuals_engine::Error) -> StatusCode {
    match e {
        mutuals_engine::Error::NotFound(_) => StatusCode::NOT_FOUND,
        mutuals_engine::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fail(context: &str, e: mutuals_engine::Error) -> StatusCode {
    let status = status_for(&e);
    if status.is_server_error() {
        tracing::error!("{}: {}", context, e);
    } else {
        tracing::debug!("{}: {}", context, e);
    }
    status
}

// --- Health ---

async fn health() -> &'static str {
    "OK"
}

// --- Members ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub contact: String,
}

async fn create_member(
    State(state): State<AppState>,
    Json(req): Json<CreateMemberRequest>,
) -> Result<(StatusCode, Json<Member>), StatusCode> {
    let contact = req.contact.trim().to_string();
    if contact.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut member = Member::new(String::new(), contact);
    member.id = Member::generate_id(&member.contact, member.created_at);

    state
        .storage
        .insert(member.clone())
        .map_err(|e| fail("Failed to create member", e))?;

    tracing::info!("Member signed up: {}", member.id);
    Ok((StatusCode::CREATED, Json(member)))
}

async fn get_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Member>, StatusCode> {
    match state.storage.get(&id) {
        Ok(Some(member)) => Ok(Json(member)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(fail("Failed to load member", e)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCrushesRequest {
    pub crushes: Vec<String>,
}

/// Result of a crush update: the stored record plus any locked entries the
/// client tried to drop.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCrushesResponse {
    pub member: Member,
    pub restored: Vec<String>,
}

async fn update_crushes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCrushesRequest>,
) -> Result<Json<UpdateCrushesResponse>, StatusCode> {
    let current = match state.storage.get(&id) {
        Ok(Some(member)) => member,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => return Err(fail("Failed to load member", e)),
    };

    let crushes: Vec<String> = req
        .crushes
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    let (crushes, restored) = match restore_locks(&current.locked_crushes, &crushes) {
        Some(corrected) => {
            let restored: Vec<String> = corrected
                .iter()
                .filter(|c| !crushes.contains(c))
                .cloned()
                .collect();
            tracing::warn!(
                "Member {} tried to drop {} locked crush(es); restored",
                id,
                restored.len()
            );
            (corrected, restored)
        }
        None => (crushes, Vec::new()),
    };

    let member = state
        .storage
        .apply_edit(&id, MemberEdit::SetCrushes(crushes))
        .map_err(|e| fail("Failed to update crushes", e))?;

    Ok(Json(UpdateCrushesResponse { member, restored }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIdentityRequest {
    pub identity_name: String,
}

async fn update_identity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateIdentityRequest>,
) -> Result<Json<Member>, StatusCode> {
    let name = req.identity_name.trim().to_string();
    if name.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let member = state
        .storage
        .apply_edit(&id, MemberEdit::SetIdentityName(name))
        .map_err(|e| fail("Failed to update identity", e))?;

    tracing::info!("Member {} verified as {:?}", member.id, member.identity_name);
    Ok(Json(member))
}

// --- Reports ---

async fn latest_report(State(state): State<AppState>) -> Result<Json<ReportSnapshot>, StatusCode> {
    match state.storage.latest_report() {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(fail("Failed to load report", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use mutuals_engine::{periodic_report, EngineConfig, EngineWrite, RecomputeWorker};
    use tempfile::TempDir;

    fn state() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let (recompute, _task) =
            RecomputeWorker::spawn(Arc::clone(&storage), &EngineConfig::immediate());
        let state = Arc::new(NodeState {
            storage,
            recompute,
            ambiguity: Default::default(),
        });
        (dir, state)
    }

    async fn signup(state: &AppState, contact: &str) -> Member {
        let (status, Json(member)) = create_member(
            State(Arc::clone(state)),
            Json(CreateMemberRequest {
                contact: contact.into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        member
    }

    #[tokio::test]
    async fn signup_and_fetch() {
        let (_dir, state) = state();
        let member = signup(&state, "ada@example.org").await;
        assert_eq!(member.id.len(), 32);

        let Json(fetched) = get_member(State(Arc::clone(&state)), Path(member.id.clone()))
            .await
            .unwrap();
        assert_eq!(fetched, member);
    }

    #[tokio::test]
    async fn blank_contact_is_rejected() {
        let (_dir, state) = state();
        let result = create_member(
            State(state),
            Json(CreateMemberRequest {
                contact: "  ".into(),
            }),
        )
        .await;
        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_member_is_404() {
        let (_dir, state) = state();
        let result = get_member(State(Arc::clone(&state)), Path("nobody".into())).await;
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);

        let result = update_identity(
            State(state),
            Path("nobody".into()),
            Json(UpdateIdentityRequest {
                identity_name: "Ada".into(),
            }),
        )
        .await;
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn crush_update_restores_locked_entries() {
        let (_dir, state) = state();
        let member = signup(&state, "ada@example.org").await;
        state
            .storage
            .apply_edit(&member.id, MemberEdit::SetCrushes(vec!["Bob".into()]))
            .unwrap();
        let current = state.storage.get(&member.id).unwrap().unwrap();
        state
            .storage
            .commit_batch(&[EngineWrite {
                id: member.id.clone(),
                expected_revision: current.revision,
                crushes: None,
                locked_crushes: vec!["Bob".into()],
                matches: Vec::new(),
                crush_count: 0,
            }])
            .unwrap();

        let Json(response) = update_crushes(
            State(Arc::clone(&state)),
            Path(member.id.clone()),
            Json(UpdateCrushesRequest {
                crushes: vec!["Cy".into(), " ".into()],
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.restored, vec!["Bob".to_string()]);
        assert_eq!(response.member.crushes, vec!["Cy".to_string(), "Bob".to_string()]);
    }

    #[tokio::test]
    async fn identity_update_trims_name() {
        let (_dir, state) = state();
        let member = signup(&state, "ada@example.org").await;
        let Json(updated) = update_identity(
            State(state),
            Path(member.id),
            Json(UpdateIdentityRequest {
                identity_name: "  Ada Lovelace ".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(updated.identity_name, "Ada Lovelace");
        assert_eq!(updated.revision, 1);
    }

    #[tokio::test]
    async fn latest_report_after_snapshot() {
        let (_dir, state) = state();
        let missing = latest_report(State(Arc::clone(&state))).await;
        assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);

        signup(&state, "ada@example.org").await;
        let taken = periodic_report(state.storage.as_ref(), state.ambiguity).unwrap();
        let Json(latest) = latest_report(State(state)).await.unwrap();
        assert_eq!(latest, taken);
        assert_eq!(latest.total_members, 1);
    }
}
