/**
 * API REST HYDROMON - Consultation de l'état du moniteur
 *
 * RÔLE :
 * Expose en lecture seule l'état courant : dernières lectures capteurs,
 * violations en cours, règles de seuil chargées, santé du processus.
 *
 * SÉCURITÉ :
 * - Header x-api-key obligatoire sur toutes les routes sauf /health
 * - Clé attendue dans HYDROMON_API_KEY
 */

use crate::health::HealthTracker;
use crate::models::{Classification, ReadingsMap, RuleTable, Severity, ViolationMap};
use crate::state::Shared;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

/// Une lecture plus vieille que ça est marquée stale (capteur muet ?).
const STALE_AFTER: Duration = Duration::minutes(5);

#[derive(Clone)]
pub struct AppState {
    pub readings: Shared<ReadingsMap>,
    pub violations: Shared<ViolationMap>,
    pub rules: Arc<RuleTable>,
    pub health_tracker: HealthTracker,
}

#[derive(serde::Serialize)]
struct ReadingView {
    tower: &'static str,
    metric: &'static str,
    value: f64,
    observed_at: String,
    stale: bool,
    stale_for_seconds: i64,
}

#[derive(serde::Serialize)]
struct ViolationView {
    tower: &'static str,
    metric: &'static str,
    status: Classification,
    since: String,
    last_alert: Option<String>,
}

#[derive(serde::Serialize)]
struct RuleView {
    tower: &'static str,
    metric: &'static str,
    low: f64,
    high: f64,
    unit: String,
    severity: Severity,
    suggestion: String,
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path();

    // Health check toujours accessible
    if path.starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var("HYDROMON_API_KEY").unwrap_or_default();
    if expected.is_empty() {
        eprintln!("SECURITY: HYDROMON_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/readings", get(get_readings))
        .route("/violations", get(get_violations))
        .route("/rules", get(get_rules))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

async fn get_system_health(State(s): State<AppState>) -> Json<crate::health::MonitorHealth> {
    Json(s.health_tracker.get_health(s.rules.len(), &s.violations))
}

async fn get_readings(State(s): State<AppState>) -> Json<Vec<ReadingView>> {
    let now = OffsetDateTime::now_utc();
    let mut views: Vec<ReadingView> = s
        .readings
        .lock()
        .iter()
        .map(|((tower, metric), latest)| {
            let age = now - latest.observed_at;
            ReadingView {
                tower: tower.label(),
                metric: metric.label(),
                value: latest.value,
                observed_at: latest.observed_at.format(&Rfc3339).unwrap_or_default(),
                stale: age > STALE_AFTER,
                stale_for_seconds: age.whole_seconds().max(0),
            }
        })
        .collect();
    views.sort_by_key(|v| (v.tower, v.metric));
    Json(views)
}

async fn get_violations(State(s): State<AppState>) -> Json<Vec<ViolationView>> {
    let mut views: Vec<ViolationView> = s
        .violations
        .lock()
        .iter()
        .map(|((tower, metric), st)| ViolationView {
            tower: tower.label(),
            metric: metric.label(),
            status: st.status,
            since: st.since.format(&Rfc3339).unwrap_or_default(),
            last_alert: st.last_alert.and_then(|t| t.format(&Rfc3339).ok()),
        })
        .collect();
    views.sort_by_key(|v| (v.tower, v.metric));
    Json(views)
}

async fn get_rules(State(s): State<AppState>) -> Json<Vec<RuleView>> {
    let mut views: Vec<RuleView> = s
        .rules
        .iter()
        .map(|((tower, metric), rule)| RuleView {
            tower: tower.label(),
            metric: metric.label(),
            low: rule.low,
            high: rule.high,
            unit: rule.unit.clone(),
            severity: rule.severity,
            suggestion: rule.suggestion.clone(),
        })
        .collect();
    views.sort_by_key(|v| (v.tower, v.metric));
    Json(views)
}
