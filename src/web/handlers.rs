use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::{self, AppConfig};
use crate::pattern::generators;
use crate::AppState;

/// Re-read the config file, apply `mutate` to the resolved `AppConfig`, and
/// write it back atomically. Runs on a blocking thread since the file ops
/// are synchronous (same split as the controller/hardware boundary).
async fn persist(state: &AppState, mutate: impl FnOnce(&mut AppConfig) + Send + 'static) -> Result<(), String> {
    let path = state.config_path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), String> {
        let mut cfg = AppConfig::load(&path).map_err(|e| e.to_string())?;
        mutate(&mut cfg);
        config::atomic_write_config(&path, &cfg.to_json()).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

/// GET /api/layout — the currently applied, validated layout.
pub async fn get_layout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.arbiter.snapshot();
    Json(config::layout_to_json(&snapshot.layout))
}

/// PUT /api/layout — validate a new layout document, apply it, and persist
/// it to disk so a restart (or the hot-reload watcher noticing this very
/// write) comes back with the same grid.
pub async fn put_layout(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let description = match config::parse_layout(body) {
        Ok(d) => d,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": format!("invalid layout: {}", e) })),
            );
        }
    };

    if let Err(e) = state.arbiter.set_layout(description.clone()) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "success": false, "message": format!("layout rejected: {}", e) })),
        );
    }

    match persist(&state, move |cfg| cfg.layout = description).await {
        Ok(()) => {
            info!("[WEB] Layout applied and saved");
            (StatusCode::OK, Json(json!({ "success": true, "message": "layout applied" })))
        }
        Err(e) => {
            warn!("[WEB] Layout applied but failed to persist: {}", e);
            (
                StatusCode::OK,
                Json(json!({ "success": true, "message": format!("layout applied, but not saved: {}", e) })),
            )
        }
    }
}

#[derive(Deserialize)]
pub struct BrightnessBody {
    brightness: u16,
}

/// POST /api/brightness
pub async fn set_brightness(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BrightnessBody>,
) -> impl IntoResponse {
    if let Err(e) = state.arbiter.set_brightness(body.brightness) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": e.to_string() })),
        );
    }
    let brightness = body.brightness;
    match persist(&state, move |cfg| cfg.brightness = brightness).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true, "message": "brightness applied" }))),
        Err(e) => {
            warn!("[WEB] Brightness applied but failed to persist: {}", e);
            (StatusCode::OK, Json(json!({ "success": true, "message": format!("applied, not saved: {}", e) })))
        }
    }
}

/// GET /api/pattern — the currently selected pattern source.
pub async fn get_pattern(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(config::pattern_to_json(&state.arbiter.snapshot().pattern))
}

/// POST /api/pattern — switch between external frame ingestion and an
/// internal generator.
pub async fn set_pattern(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let selection = match config::parse_pattern(body) {
        Ok(s) => s,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "message": e.to_string() })),
            );
        }
    };

    if let Err(e) = state.arbiter.set_pattern(selection.clone()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": e.to_string() })),
        );
    }

    match persist(&state, move |cfg| cfg.pattern = selection).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true, "message": "pattern applied" }))),
        Err(e) => {
            warn!("[WEB] Pattern applied but failed to persist: {}", e);
            (StatusCode::OK, Json(json!({ "success": true, "message": format!("applied, not saved: {}", e) })))
        }
    }
}

/// GET /api/patterns — names the `internal(name, params)` selection accepts.
pub async fn list_patterns() -> impl IntoResponse {
    Json(json!({ "patterns": generators::available_pattern_names() }))
}

#[derive(Deserialize)]
pub struct ScheduleBody {
    awake: bool,
}

/// POST /api/schedule
pub async fn set_schedule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScheduleBody>,
) -> impl IntoResponse {
    use crate::arbiter::ScheduleState;

    state.arbiter.set_schedule(if body.awake { ScheduleState::Awake } else { ScheduleState::Asleep });
    let awake = body.awake;
    match persist(&state, move |cfg| cfg.schedule_awake = awake).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true, "message": "schedule applied" }))),
        Err(e) => {
            warn!("[WEB] Schedule applied but failed to persist: {}", e);
            (StatusCode::OK, Json(json!({ "success": true, "message": format!("applied, not saved: {}", e) })))
        }
    }
}

#[derive(Deserialize)]
pub struct PowerBody {
    ceiling_amps: f64,
    enabled: bool,
}

/// POST /api/power
pub async fn set_power(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PowerBody>,
) -> impl IntoResponse {
    if let Err(e) = state.arbiter.set_power_ceiling(body.ceiling_amps, body.enabled) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": e.to_string() })),
        );
    }
    let (ceiling_amps, enabled) = (body.ceiling_amps, body.enabled);
    match persist(&state, move |cfg| {
        cfg.power.ceiling_amps = ceiling_amps;
        cfg.power.enabled = enabled;
    })
    .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true, "message": "power ceiling applied" }))),
        Err(e) => {
            warn!("[WEB] Power ceiling applied but failed to persist: {}", e);
            (StatusCode::OK, Json(json!({ "success": true, "message": format!("applied, not saved: {}", e) })))
        }
    }
}

/// GET /api/status — the controller's latest published statistics.
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.status.snapshot();
    Json(json!({
        "fps_1s": status.fps_1s,
        "frames_emitted": status.frames_emitted,
        "b_applied": status.b_applied,
        "limited_total": status.limited_total,
        "dimension_mismatch_count": status.dimension_mismatch_count,
        "current_estimate_amps": status.current_estimate_amps,
        "pattern_name": status.pattern_name,
        "last_error": status.last_error,
        "schedule_awake": status.schedule_awake,
        "canvas_size": [status.canvas_size.0, status.canvas_size.1],
        "led_count": status.led_count,
    }))
}

/// GET /api/healthz — liveness check. Unhealthy means the controller has
/// stopped producing frames while the schedule says it should be awake.
pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.status.snapshot();
    let ok = !status.schedule_awake || status.frames_emitted == 0 || status.fps_1s > 0.0;

    let code = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        code,
        Json(json!({
            "ok": ok,
            "fps_1s": status.fps_1s,
            "frames_emitted": status.frames_emitted,
            "schedule_awake": status.schedule_awake,
            "last_error": status.last_error,
        })),
    )
}
