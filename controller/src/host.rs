use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use thermostat_common::{
    opening_id_for_topic, opening_topic, sensor_kind_for_topic, sensor_topic, switch_topic,
    thermostat::{epoch_ms, PRESET_NONE},
    ControlError, EngineAction, ExternalActionReason, HvacMode, RawContact, SensorKind,
    TargetSpec, ThermostatConfig, ThermostatEngine, TOPIC_CMD_FAN_ZONE, TOPIC_CMD_HUMIDITY,
    TOPIC_CMD_MODE, TOPIC_CMD_PRESET, TOPIC_CMD_REASON, TOPIC_CMD_TARGET,
    TOPIC_CMD_TARGET_LOW_HIGH, TOPIC_CONTROLLER_STATE, TOPIC_HEAT_PUMP_COOLING,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<ThermostatEngine>>,
    timezone: Tz,
    mqtt: AsyncClient,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const CONTROL_INTERVAL: Duration = Duration::from_secs(1);
const STATE_PUBLISH_INTERVAL: Duration = Duration::from_secs(10);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("THERMOSTAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.thermostat/config.json"));
    let config = load_config(&config_path).await.unwrap_or_else(|err| {
        warn!("failed to load thermostat config: {err:#}");
        ThermostatConfig::default()
    });

    let timezone = resolve_timezone(
        &std::env::var("THERMOSTAT_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
    );

    let engine = ThermostatEngine::new(config);
    if let Some(err) = engine.misconfiguration() {
        warn!("controller starting misconfigured: {err}");
    }

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "localhost".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("thermostat-controller-rust", mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or_default();
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or_default();
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        timezone,
        mqtt,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone());
    spawn_state_publish_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/target", post(handle_set_target))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/preset", post(handle_set_preset))
        .route("/api/reason", post(handle_set_reason))
        .route("/api/fan-zone", post(handle_set_fan_zone))
        .route("/api/humidity", post(handle_set_humidity))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn load_config(path: &Path) -> anyhow::Result<ThermostatConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => serde_json::from_slice::<ThermostatConfig>(&raw)
            .with_context(|| format!("invalid thermostat config at {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("no config at {}, using defaults", path.display());
            Ok(ThermostatConfig::default())
        }
        Err(err) => {
            Err(err).with_context(|| format!("failed to read thermostat config at {}", path.display()))
        }
    }
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let mut topics: Vec<String> = SensorKind::ALL
        .into_iter()
        .map(|kind| sensor_topic(kind).to_string())
        .collect();
    topics.push(opening_topic("+"));
    topics.extend(
        [
            TOPIC_HEAT_PUMP_COOLING,
            TOPIC_CMD_TARGET,
            TOPIC_CMD_TARGET_LOW_HIGH,
            TOPIC_CMD_HUMIDITY,
            TOPIC_CMD_MODE,
            TOPIC_CMD_PRESET,
            TOPIC_CMD_REASON,
            TOPIC_CMD_FAN_ZONE,
        ]
        .map(String::from),
    );

    for topic in &topics {
        mqtt.subscribe(topic.as_str(), QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CONTROL_INTERVAL);

        loop {
            interval.tick().await;
            let now = now_in_timezone(app_state.timezone);

            let actions = {
                let mut engine = app_state.engine.lock().await;
                engine.tick(now)
            };

            if !actions.is_empty() {
                execute_engine_actions(&app_state.mqtt, actions).await;
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATE_PUBLISH_INTERVAL);
        loop {
            interval.tick().await;

            let now_ms = epoch_ms(&now_in_timezone(app_state.timezone));
            let payload = {
                let engine = app_state.engine.lock().await;
                serde_json::to_vec(&engine.state_payload(now_ms))
            };

            match payload {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

/// Publishes switch commands without waiting on the device. A lost command is
/// corrected by the next keep-alive.
async fn execute_engine_actions(mqtt: &AsyncClient, actions: Vec<EngineAction>) {
    for action in actions {
        let (switch_ref, state) = match &action {
            EngineAction::Switch {
                role,
                switch_ref,
                state,
            } => {
                info!(role = role.as_str(), switch = %switch_ref, state = state.as_str(), "switch command");
                (switch_ref, state)
            }
            EngineAction::KeepAlive {
                role,
                switch_ref,
                state,
            } => {
                debug!(role = role.as_str(), switch = %switch_ref, state = state.as_str(), "keep-alive");
                (switch_ref, state)
            }
        };

        if let Err(err) = mqtt
            .publish(switch_topic(switch_ref), QoS::AtLeastOnce, false, state.as_str())
            .await
        {
            warn!("switch publish to {switch_ref} failed: {err}");
        }
    }
}

/// Applies one command and the tick that follows it under a single lock, so
/// every external event is serialized with the control loop.
async fn run_command<T>(
    state: &AppState,
    command: impl FnOnce(&mut ThermostatEngine, u64) -> Result<T, ControlError>,
) -> Result<T, ControlError> {
    let now = now_in_timezone(state.timezone);
    let (result, actions) = {
        let mut engine = state.engine.lock().await;
        let result = command(&mut *engine, epoch_ms(&now));
        (result, engine.tick(now))
    };

    if !actions.is_empty() {
        execute_engine_actions(&state.mqtt, actions).await;
    }
    result
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let message = message.trim();

    if let Some(kind) = sensor_kind_for_topic(&topic) {
        match message.parse::<f32>() {
            Ok(value) => {
                run_command(app_state, |engine, now_ms| {
                    Ok(engine.update_sensor(kind, value, now_ms))
                })
                .await?;
            }
            Err(_) => {
                debug!(?kind, payload = message, "sensor reported unavailable");
                run_command(app_state, |engine, _| {
                    engine.mark_sensor_unavailable(kind);
                    Ok(())
                })
                .await?;
            }
        }
        return Ok(());
    }

    if let Some(id) = opening_id_for_topic(&topic) {
        let raw = RawContact::parse(message);
        run_command(app_state, |engine, now_ms| engine.set_opening(id, raw, now_ms))
            .await
            .with_context(|| format!("opening update on {topic} rejected"))?;
        return Ok(());
    }

    match topic.as_str() {
        TOPIC_HEAT_PUMP_COOLING => {
            let cooling = parse_switch_payload(message);
            run_command(app_state, |engine, _| Ok(engine.set_heat_pump_cooling(cooling))).await?;
        }
        TOPIC_CMD_TARGET => {
            let value = message.parse::<f32>().context("invalid target payload")?;
            run_command(app_state, |engine, _| {
                engine.set_target(TargetSpec::Single(value))
            })
            .await
            .context("target rejected")?;
        }
        TOPIC_CMD_TARGET_LOW_HIGH => {
            let target = serde_json::from_str::<TargetSpec>(message)
                .context("invalid target range payload")?;
            run_command(app_state, |engine, _| engine.set_target(target))
                .await
                .context("target range rejected")?;
        }
        TOPIC_CMD_HUMIDITY => {
            let value = message.parse::<f32>().context("invalid humidity payload")?;
            run_command(app_state, |engine, _| engine.set_target_humidity(value))
                .await
                .context("target humidity rejected")?;
        }
        TOPIC_CMD_MODE => {
            let mode = HvacMode::parse(message)
                .with_context(|| format!("unknown mode `{message}`"))?;
            run_command(app_state, |engine, _| engine.set_mode(mode))
                .await
                .context("mode rejected")?;
        }
        TOPIC_CMD_PRESET => {
            run_command(app_state, |engine, _| engine.set_preset(message))
                .await
                .context("preset rejected")?;
        }
        TOPIC_CMD_REASON => {
            let reason = parse_external_reason(message)
                .with_context(|| format!("unknown reason `{message}`"))?;
            run_command(app_state, |engine, _| {
                engine.set_external_reason(reason);
                Ok(())
            })
            .await?;
        }
        TOPIC_CMD_FAN_ZONE => {
            let enabled = parse_switch_payload(message).context("invalid fan zone payload")?;
            run_command(app_state, |engine, _| Ok(engine.set_fan_zone_enabled(enabled)))
                .await?;
        }
        _ => {}
    }

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let now_ms = epoch_ms(&now_in_timezone(state.timezone));
    let status = {
        let engine = state.engine.lock().await;
        engine.status(now_ms)
    };

    Json(status)
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let target = match parse_target_params(&params) {
        Ok(target) => target,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    if let Err(err) = run_command(&state, |engine, _| engine.set_target(target)).await {
        return control_error_response(err);
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(mode) = HvacMode::parse(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use off, heat, cool, heat_cool, fan_only or dry",
        );
    };

    if let Err(err) = run_command(&state, |engine, _| engine.set_mode(mode)).await {
        return control_error_response(err);
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_preset(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let preset = params
        .get("value")
        .map(String::as_str)
        .unwrap_or(PRESET_NONE);

    if let Err(err) = run_command(&state, |engine, _| engine.set_preset(preset)).await {
        return control_error_response(err);
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_reason(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let value = params.get("value").map(String::as_str).unwrap_or("none");
    let Some(reason) = parse_external_reason(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid reason. Use presence, schedule, emergency, malfunction or none",
        );
    };

    if let Err(err) = run_command(&state, |engine, _| {
        engine.set_external_reason(reason);
        Ok(())
    })
    .await
    {
        return control_error_response(err);
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_fan_zone(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(enabled) = parse_switch_payload(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid value. Use on or off");
    };

    if let Err(err) = run_command(&state, |engine, _| Ok(engine.set_fan_zone_enabled(enabled))).await
    {
        return control_error_response(err);
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_humidity(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(humidity) = value.parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid humidity value");
    };

    if let Err(err) = run_command(&state, |engine, _| engine.set_target_humidity(humidity)).await {
        return control_error_response(err);
    }

    handle_get_status(State(state)).await.into_response()
}

fn parse_target_params(params: &HashMap<String, String>) -> Result<TargetSpec, &'static str> {
    if let Some(value) = params.get("value") {
        return value
            .parse::<f32>()
            .map(TargetSpec::Single)
            .map_err(|_| "Invalid temperature value");
    }

    match (params.get("low"), params.get("high")) {
        (Some(low), Some(high)) => {
            let (Ok(low), Ok(high)) = (low.parse::<f32>(), high.parse::<f32>()) else {
                return Err("Invalid temperature range");
            };
            Ok(TargetSpec::Range { low, high })
        }
        _ => Err("Missing 'value' or 'low'/'high' parameters"),
    }
}

fn parse_switch_payload(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// `Some(None)` clears the external reason.
fn parse_external_reason(value: &str) -> Option<Option<ExternalActionReason>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Some(None);
    }
    ExternalActionReason::parse(value).map(Some)
}

fn resolve_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        warn!("invalid timezone `{name}`, falling back to UTC");
        Tz::UTC
    })
}

fn now_in_timezone(tz: Tz) -> DateTime<FixedOffset> {
    let local = Utc::now().with_timezone(&tz);
    local.with_timezone(&local.offset().fix())
}

fn control_error_response(err: ControlError) -> axum::response::Response {
    warn!("command rejected: {err}");
    error_response(StatusCode::BAD_REQUEST, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
