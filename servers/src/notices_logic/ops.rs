//! HTTP surface for operators: health, manual checks, the history reset,
//! tenant and subscriber administration, and a live look at the source.
//!
//! Mutating requests may name who made them in an `x-actor` header; it ends
//! up in the audit trail.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use lib_notify::connections::Database;
use lib_notify::core::{AdminError, CycleStatus, NoticeAdmin, SchedulerError};
use lib_notify::ingestors::SourceClient;
use lib_notify::model::{Tenant, TenantId};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

/// Actor recorded in the audit trail when a request does not name one.
const OPS_ACTOR: &str = "ops-http";
const ACTOR_HEADER: &str = "x-actor";
/// How many notices `/notices/latest` shows.
const LATEST_LIMIT: usize = 10;

#[derive(Clone)]
pub struct OpsState {
    pub admin: Arc<NoticeAdmin>,
    pub status: watch::Receiver<CycleStatus>,
    pub source: Arc<dyn SourceClient>,
    /// `None` when running on in-memory storage.
    pub database: Option<Arc<Database>>,
}

pub struct OpsError(AdminError);

impl From<AdminError> for OpsError {
    fn from(e: AdminError) -> Self {
        OpsError(e)
    }
}

impl IntoResponse for OpsError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self.0 {
            AdminError::Scheduler(SchedulerError::NoResponse) => {
                (StatusCode::GATEWAY_TIMEOUT, "SchedulerNoResponse")
            }
            AdminError::Scheduler(_) => (StatusCode::SERVICE_UNAVAILABLE, "SchedulerUnavailable"),
            AdminError::Repo(_) => (StatusCode::INTERNAL_SERVER_ERROR, "StorageError"),
            AdminError::NotConfigured(_) => (StatusCode::CONFLICT, "NotConfigured"),
            AdminError::EmptyTarget => (StatusCode::BAD_REQUEST, "InvalidRequest"),
        };
        log::error!("event=ops_request_failed kind={} error={}", error_type, self.0);
        (
            status,
            Json(json!({ "error_type": error_type, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    pub target: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberRequest {
    pub subscriber_id: String,
    pub name: String,
}

pub fn router(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/check-now", post(check_now_handler))
        .route("/history", get(history_handler))
        .route("/history/clear", post(clear_history_handler))
        .route("/notices/latest", get(latest_notices_handler))
        .route(
            "/tenants/{id}",
            get(tenant_status_handler)
                .post(join_handler)
                .put(configure_handler)
                .delete(leave_handler),
        )
        .route("/tenants/{id}/pause", post(pause_handler))
        .route("/tenants/{id}/resume", post(resume_handler))
        .route(
            "/tenants/{id}/subscribers",
            get(list_subscribers_handler)
                .post(add_subscriber_handler)
                .delete(clear_subscribers_handler),
        )
        .route(
            "/tenants/{id}/subscribers/{subscriber_id}",
            delete(remove_subscriber_handler),
        )
        .with_state(state)
}

/// Serves the router on an already bound listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: OpsState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let app = router(state);
    if let Ok(addr) = listener.local_addr() {
        log::info!("event=ops_listening addr={}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("event=ops_shutdown");
        })
        .await
}

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(OPS_ACTOR)
        .to_string()
}

fn tenant_json(tenant: &Tenant) -> serde_json::Value {
    json!({
        "tenantId": tenant.tenant_id,
        "enabled": tenant.enabled,
        "deliveryTarget": tenant.delivery_target,
    })
}

/// 200 with the latest cycle snapshot, or 503 when storage is unreachable.
async fn health_handler(State(state): State<OpsState>) -> (StatusCode, Json<serde_json::Value>) {
    let cycle = state.status.borrow().clone();

    let (status, database) = match &state.database {
        None => (StatusCode::OK, "memory".to_string()),
        Some(db) => match db.ping().await {
            Ok(()) => (StatusCode::OK, "ok".to_string()),
            Err(e) => {
                log::warn!("event=health_db_unreachable error={}", e);
                (StatusCode::SERVICE_UNAVAILABLE, format!("unreachable: {}", e))
            }
        },
    };

    let body = json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "database": database,
        "cycle": cycle,
    });
    (status, Json(body))
}

async fn check_now_handler(
    State(state): State<OpsState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), OpsError> {
    state.admin.check_now(None, &actor(&headers)).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "queued": true }))))
}

async fn history_handler(
    State(state): State<OpsState>,
) -> Result<Json<serde_json::Value>, OpsError> {
    let count = state.admin.history_count().await?;
    Ok(Json(json!({ "seen": count })))
}

async fn clear_history_handler(
    State(state): State<OpsState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, OpsError> {
    let removed = state.admin.clear_history(&actor(&headers)).await?;
    Ok(Json(json!({ "removed": removed, "rebaseline": "pending" })))
}

/// Fetches the source live. Nothing is persisted or delivered.
async fn latest_notices_handler(State(state): State<OpsState>) -> Json<serde_json::Value> {
    let notices: Vec<_> = state
        .source
        .fetch()
        .await
        .into_iter()
        .take(LATEST_LIMIT)
        .map(|notice| {
            json!({
                "title": notice.title(),
                "link": notice.link().as_str(),
                "date": notice.published_label(),
            })
        })
        .collect();
    Json(json!({ "source": state.source.name(), "notices": notices }))
}

async fn tenant_status_handler(
    State(state): State<OpsState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), OpsError> {
    let tenant_id = TenantId::from(id);
    let Some(tenant) = state.admin.tenant(&tenant_id).await? else {
        let message = format!("tenant {} is not registered", tenant_id);
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error_type": "UnknownTenant", "message": message })),
        ));
    };
    let subscribers = state.admin.list_subscribers(&tenant_id).await?;
    let seen = state.admin.history_count().await?;

    let mut body = tenant_json(&tenant);
    body["subscribers"] = json!(subscribers);
    body["seenNotices"] = json!(seen);
    Ok((StatusCode::OK, Json(body)))
}

async fn join_handler(
    State(state): State<OpsState>,
    Path(id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), OpsError> {
    let tenant = state.admin.register_tenant(&id.into(), &request.name).await?;
    Ok((StatusCode::CREATED, Json(tenant_json(&tenant))))
}

async fn leave_handler(State(state): State<OpsState>, Path(id): Path<String>) -> StatusCode {
    let tenant_id = TenantId::from(id);
    state.admin.tenant_removed(&tenant_id, tenant_id.as_str()).await;
    StatusCode::NO_CONTENT
}

async fn configure_handler(
    State(state): State<OpsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ConfigureRequest>,
) -> Result<Json<serde_json::Value>, OpsError> {
    let tenant = state
        .admin
        .configure(&id.into(), &request.target, &actor(&headers))
        .await?;
    Ok(Json(tenant_json(&tenant)))
}

async fn pause_handler(
    State(state): State<OpsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, OpsError> {
    let tenant = state.admin.pause(&id.into(), &actor(&headers)).await?;
    Ok(Json(tenant_json(&tenant)))
}

async fn resume_handler(
    State(state): State<OpsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, OpsError> {
    let tenant = state.admin.resume(&id.into(), &actor(&headers)).await?;
    Ok(Json(tenant_json(&tenant)))
}

async fn list_subscribers_handler(
    State(state): State<OpsState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, OpsError> {
    let subscribers = state.admin.list_subscribers(&id.into()).await?;
    Ok(Json(json!({ "subscribers": subscribers })))
}

/// 201 when added, 200 with `added: false` when already listed.
async fn add_subscriber_handler(
    State(state): State<OpsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SubscriberRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), OpsError> {
    let added = state
        .admin
        .add_subscriber(&id.into(), &request.subscriber_id, &request.name, &actor(&headers))
        .await?;
    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "added": added }))))
}

async fn remove_subscriber_handler(
    State(state): State<OpsState>,
    Path((id, subscriber_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), OpsError> {
    let removed = state
        .admin
        .remove_subscriber(&id.into(), &subscriber_id, &actor(&headers))
        .await?;
    let status = if removed { StatusCode::OK } else { StatusCode::NOT_FOUND };
    Ok((status, Json(json!({ "removed": removed }))))
}

async fn clear_subscribers_handler(
    State(state): State<OpsState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, OpsError> {
    let removed = state
        .admin
        .clear_subscribers(&id.into(), &actor(&headers))
        .await?;
    Ok(Json(json!({ "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use lib_notify::core::{ChangeDetector, FanoutDispatcher, RebaselineFlag, Scheduler};
    use lib_notify::delivery::webhook::WebhookTransport;
    use lib_notify::model::{AuditAction, Notice};
    use lib_notify::repository::memory::{
        MemoryAuditLog, MemorySeenNotices, MemorySubscribers, MemoryTenants,
    };
    use lib_notify::repository::{SeenNoticeStore, TenantRegistry};
    use lib_notify::retrieve::ky_http::ApiClient;
    use std::time::Duration;

    struct FixedSource(Vec<Notice>);

    #[async_trait]
    impl SourceClient for FixedSource {
        async fn fetch(&self) -> Vec<Notice> {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Fixture {
        state: OpsState,
        seen: Arc<MemorySeenNotices>,
        tenants: Arc<MemoryTenants>,
        audit: Arc<MemoryAuditLog>,
        rebaseline: RebaselineFlag,
        scheduler: Option<Scheduler>,
    }

    fn fixture_with(page: Vec<Notice>) -> Fixture {
        let seen = Arc::new(MemorySeenNotices::new());
        let tenants = Arc::new(MemoryTenants::new());
        let subscribers = Arc::new(MemorySubscribers::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let rebaseline = RebaselineFlag::new();
        let client = Arc::new(ApiClient::new("http://127.0.0.1:9").unwrap());
        let source: Arc<dyn SourceClient> = Arc::new(FixedSource(page));

        let dispatcher = FanoutDispatcher::new(
            tenants.clone(),
            subscribers.clone(),
            audit.clone(),
            Arc::new(WebhookTransport::new(client)),
        );
        let detector = ChangeDetector::new(
            source.clone(),
            seen.clone(),
            dispatcher,
            rebaseline.clone(),
        );
        let (scheduler, handle) = Scheduler::new(detector, Duration::from_secs(300));
        let status = scheduler.status();
        let admin = NoticeAdmin::new(
            tenants.clone(),
            subscribers,
            seen.clone(),
            audit.clone(),
            rebaseline.clone(),
            handle,
        );

        Fixture {
            state: OpsState {
                admin: Arc::new(admin),
                status,
                source,
                database: None,
            },
            seen,
            tenants,
            audit,
            rebaseline,
            scheduler: Some(scheduler),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Vec::new())
    }

    fn as_moderator() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("moderator-7"));
        headers
    }

    fn tenant_path(id: &str) -> Path<String> {
        Path(id.to_string())
    }

    fn configure_request(target: &str) -> Json<ConfigureRequest> {
        Json(ConfigureRequest {
            target: target.to_string(),
        })
    }

    #[tokio::test]
    async fn health_reports_the_cycle_snapshot() {
        let f = fixture();
        let (status, Json(body)) = health_handler(State(f.state.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "memory");
        assert_eq!(body["cycle"]["state"], "uninitialized");
        assert_eq!(body["cycle"]["cyclesRun"], 0);
    }

    #[tokio::test]
    async fn check_now_is_accepted_while_the_scheduler_lives() {
        let f = fixture();
        let (status, _) = check_now_handler(State(f.state.clone()), HeaderMap::new())
            .await
            .ok()
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(f
            .audit
            .entries()
            .iter()
            .any(|e| e.action == AuditAction::ManualCheck && e.actor_id.as_deref() == Some(OPS_ACTOR)));
        drop(f.scheduler);
    }

    #[tokio::test]
    async fn check_now_without_a_scheduler_is_unavailable() {
        let mut f = fixture();
        f.scheduler.take();

        let response = check_now_handler(State(f.state.clone()), HeaderMap::new())
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn clearing_history_reports_the_count_and_requests_a_baseline() {
        let f = fixture();
        let notice = Notice::new("Edital 01-2025", "https://notices.example.org/a.pdf", None).unwrap();
        f.seen.insert_if_absent(&[notice]).await.unwrap();

        let Json(before) = history_handler(State(f.state.clone())).await.ok().unwrap();
        assert_eq!(before["seen"], 1);

        let Json(body) = clear_history_handler(State(f.state.clone()), HeaderMap::new())
            .await
            .ok()
            .unwrap();
        assert_eq!(body["removed"], 1);
        assert!(f.rebaseline.is_pending());

        let Json(after) = history_handler(State(f.state.clone())).await.ok().unwrap();
        assert_eq!(after["seen"], 0);
    }

    #[tokio::test]
    async fn configured_tenant_becomes_deliverable() {
        let f = fixture();

        let (status, Json(joined)) = join_handler(
            State(f.state.clone()),
            tenant_path("guild-1"),
            Json(JoinRequest {
                name: "Campus".into(),
            }),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(joined["enabled"], false);

        let Json(configured) = configure_handler(
            State(f.state.clone()),
            tenant_path("guild-1"),
            as_moderator(),
            configure_request("https://hooks.example/guild-1"),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(configured["enabled"], true);
        assert_eq!(configured["deliveryTarget"], "https://hooks.example/guild-1");

        assert_eq!(f.tenants.list_enabled_with_target().await.unwrap().len(), 1);
        let entry = f
            .audit
            .entries()
            .into_iter()
            .find(|e| e.action == AuditAction::Configured)
            .unwrap();
        assert_eq!(entry.actor_id.as_deref(), Some("moderator-7"));
    }

    #[tokio::test]
    async fn blank_target_is_a_bad_request() {
        let f = fixture();
        let response = configure_handler(
            State(f.state.clone()),
            tenant_path("guild-1"),
            HeaderMap::new(),
            configure_request("  "),
        )
        .await
        .err()
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_delivery() {
        let f = fixture();

        let response = resume_handler(State(f.state.clone()), tenant_path("guild-1"), HeaderMap::new())
            .await
            .err()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        configure_handler(
            State(f.state.clone()),
            tenant_path("guild-1"),
            HeaderMap::new(),
            configure_request("https://hooks.example/g"),
        )
        .await
        .ok()
        .unwrap();

        let Json(paused) = pause_handler(State(f.state.clone()), tenant_path("guild-1"), HeaderMap::new())
            .await
            .ok()
            .unwrap();
        assert_eq!(paused["enabled"], false);
        assert!(f.tenants.list_enabled_with_target().await.unwrap().is_empty());

        let Json(resumed) = resume_handler(State(f.state.clone()), tenant_path("guild-1"), HeaderMap::new())
            .await
            .ok()
            .unwrap();
        assert_eq!(resumed["enabled"], true);
        assert_eq!(resumed["deliveryTarget"], "https://hooks.example/g");
    }

    #[tokio::test]
    async fn subscribers_are_managed_per_tenant() {
        let f = fixture();
        let add = |subscriber_id: &str, name: &str| {
            add_subscriber_handler(
                State(f.state.clone()),
                tenant_path("guild-1"),
                as_moderator(),
                Json(SubscriberRequest {
                    subscriber_id: subscriber_id.to_string(),
                    name: name.to_string(),
                }),
            )
        };

        let (status, _) = add("10", "Students").await.ok().unwrap();
        assert_eq!(status, StatusCode::CREATED);
        let (status, Json(again)) = add("10", "Students").await.ok().unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["added"], false);
        add("20", "Staff").await.ok().unwrap();

        let Json(listed) = list_subscribers_handler(State(f.state.clone()), tenant_path("guild-1"))
            .await
            .ok()
            .unwrap();
        assert_eq!(listed["subscribers"][0]["subscriberId"], "10");
        assert_eq!(listed["subscribers"][1]["displayName"], "Staff");

        let remove = || {
            remove_subscriber_handler(
                State(f.state.clone()),
                Path(("guild-1".to_string(), "10".to_string())),
                HeaderMap::new(),
            )
        };
        let (status, _) = remove().await.ok().unwrap();
        assert_eq!(status, StatusCode::OK);
        let (status, _) = remove().await.ok().unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let Json(cleared) =
            clear_subscribers_handler(State(f.state.clone()), tenant_path("guild-1"), HeaderMap::new())
                .await
                .ok()
                .unwrap();
        assert_eq!(cleared["removed"], 1);
    }

    #[tokio::test]
    async fn tenant_status_combines_settings_subscribers_and_history() {
        let f = fixture();

        let (status, _) = tenant_status_handler(State(f.state.clone()), tenant_path("nobody"))
            .await
            .ok()
            .unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let guild = TenantId::from("guild-1");
        f.state
            .admin
            .configure(&guild, "https://hooks.example/g", "mod")
            .await
            .unwrap();
        f.state
            .admin
            .add_subscriber(&guild, "10", "Students", "mod")
            .await
            .unwrap();
        let notice = Notice::new("Edital 01-2025", "https://notices.example.org/a.pdf", None).unwrap();
        f.seen.insert_if_absent(&[notice]).await.unwrap();

        let (status, Json(body)) = tenant_status_handler(State(f.state.clone()), tenant_path("guild-1"))
            .await
            .ok()
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], true);
        assert_eq!(body["deliveryTarget"], "https://hooks.example/g");
        assert_eq!(body["subscribers"][0]["subscriberId"], "10");
        assert_eq!(body["seenNotices"], 1);
    }

    #[tokio::test]
    async fn leaving_is_audited() {
        let f = fixture();
        let status = leave_handler(State(f.state.clone()), tenant_path("guild-1")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(f
            .audit
            .entries()
            .iter()
            .any(|e| e.action == AuditAction::TenantRemoved));
    }

    #[tokio::test]
    async fn latest_notices_are_capped_and_not_persisted() {
        let page: Vec<_> = (1..=12)
            .map(|n| {
                Notice::new(
                    &format!("Edital {:02}-2025", n),
                    &format!("https://notices.example.org/{}.pdf", n),
                    Some("Belém, 3 de março de 2025"),
                )
                .unwrap()
            })
            .collect();
        let f = fixture_with(page);

        let Json(body) = latest_notices_handler(State(f.state.clone())).await;
        let listed = body["notices"].as_array().unwrap();
        assert_eq!(listed.len(), LATEST_LIMIT);
        assert_eq!(listed[0]["title"], "Edital 01-2025");
        assert_eq!(listed[0]["link"], "https://notices.example.org/1.pdf");
        assert_eq!(listed[0]["date"], "Belém, 3 de março de 2025");
        assert_eq!(f.seen.count().await.unwrap(), 0);
    }
}
