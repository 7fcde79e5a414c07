//! HTTP interface to a [`Simulation`].

pub mod api;
pub mod error;

pub use api::*;
pub use error::*;

use crate::engine::physics::{ActuatorConfig, ActuatorConfigPatch};
use crate::sim::{ActuatorInfo, ActuatorState, JointId, SimStatus, Simulation};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{debug, info};

pub fn router(sim: Simulation) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sim/status", get(status))
        .route("/sim/mode", post(set_step_mode))
        .route("/sim/step", post(step))
        .route("/sim/reset", post(reset))
        .route("/sim/shutdown", post(shutdown))
        .route("/actuators", get(list_actuators))
        .route("/actuators/command", post(command_actuators))
        .route("/actuators/state", get(actuator_states))
        .route("/actuators/{id}/configure", post(configure_actuator))
        .route("/actuators/{id}/position", get(actuator_position))
        .route("/actuators/{id}/velocity", get(actuator_velocity))
        .route("/sensors", get(list_sensors))
        .route("/sensors/{name}", get(sensor_data))
        .with_state(sim)
}

/// Serves `sim` on `listener` until the simulation shuts down.
pub async fn serve(listener: TcpListener, sim: Simulation) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{addr}");
    }

    let mut stop = sim.stop_signal();
    let app = router(sim);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*stop.borrow_and_update() {
                if stop.changed().await.is_err() {
                    break;
                }
            }
            info!("Server shutting down");
        })
        .await
}

async fn health(State(sim): State<Simulation>) -> Json<serde_json::Value> {
    let status = if sim.is_stopping() { "stopping" } else { "ok" };
    Json(serde_json::json!({ "status": status }))
}

async fn status(State(sim): State<Simulation>) -> Json<SimStatus> {
    Json(sim.status().await)
}

async fn set_step_mode(
    State(sim): State<Simulation>,
    Json(request): Json<StepModeRequest>,
) -> ApiResult<SimStatus> {
    sim.set_step_mode(request.mode).await?;
    Ok(Json(sim.status().await))
}

async fn step(
    State(sim): State<Simulation>,
    Json(request): Json<StepRequest>,
) -> ApiResult<StepResponse> {
    let outcome = sim.step(request.num_steps).await?;
    Ok(Json(StepResponse {
        outcome,
        sim_time: sim.status().await.sim_time,
    }))
}

async fn reset(
    State(sim): State<Simulation>,
    Json(request): Json<ResetRequest>,
) -> ApiResult<SimStatus> {
    let pose = request.into_pose().map_err(ApiError::bad_request)?;
    sim.reset(pose).await?;
    Ok(Json(sim.status().await))
}

async fn shutdown(State(sim): State<Simulation>) -> Json<serde_json::Value> {
    debug!("Shutdown requested remotely");
    sim.shutdown().await;
    Json(serde_json::json!({ "status": "shutting down" }))
}

async fn list_actuators(State(sim): State<Simulation>) -> ApiResult<Vec<ActuatorInfo>> {
    Ok(Json(sim.actuators().await?))
}

async fn command_actuators(
    State(sim): State<Simulation>,
    Json(request): Json<CommandActuatorsRequest>,
) -> ApiResult<CommandActuatorsResponse> {
    let results = sim.command_actuators(&request.pairs()).await?;
    Ok(Json(CommandActuatorsResponse { results }))
}

async fn actuator_states(
    State(sim): State<Simulation>,
    Query(query): Query<StateQuery>,
) -> ApiResult<Vec<ActuatorState>> {
    let ids = query.ids().map_err(ApiError::bad_request)?;
    Ok(Json(sim.actuator_states(ids).await?))
}

async fn configure_actuator(
    State(sim): State<Simulation>,
    Path(id): Path<JointId>,
    Json(patch): Json<ActuatorConfigPatch>,
) -> ApiResult<ActuatorConfig> {
    Ok(Json(sim.configure_actuator(id, patch).await?))
}

async fn actuator_position(
    State(sim): State<Simulation>,
    Path(id): Path<JointId>,
) -> ApiResult<ValueResponse> {
    let value = sim.actuator_position(id).await?;
    Ok(Json(ValueResponse {
        actuator_id: id,
        value,
    }))
}

async fn actuator_velocity(
    State(sim): State<Simulation>,
    Path(id): Path<JointId>,
) -> ApiResult<ValueResponse> {
    let value = sim.actuator_velocity(id).await?;
    Ok(Json(ValueResponse {
        actuator_id: id,
        value,
    }))
}

async fn list_sensors(State(sim): State<Simulation>) -> ApiResult<Vec<String>> {
    Ok(Json(sim.sensor_names().await?))
}

async fn sensor_data(
    State(sim): State<Simulation>,
    Path(name): Path<String>,
) -> ApiResult<SensorResponse> {
    let values = sim.sensor_data(&name).await?;
    Ok(Json(SensorResponse { name, values }))
}
