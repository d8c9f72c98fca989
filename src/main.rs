//! cradlewatch
//!
//! Main entry point: wires devices, producers and the HTTP server.

use cradlewatch::{
    actuator_controller::ActuatorController,
    audio_capture::ArecordSource,
    camera_capture::V4l2Opener,
    frame_relay::FrameRelay,
    inference_client::InferenceClient,
    producers::{spawn_producer, CryProducer, FaceDirectionProducer, TemperatureProducer},
    sensor_log::{MemorySensorLogRepository, MySqlSensorLogRepository, SensorLogRepository},
    sensor_state::SensorStateStore,
    serial_link::{ActuatorPort, SerialConnector, TtyConnector, UnavailablePort},
    snapshotter::StateSnapshotter,
    state::{AppConfig, AppState},
    stream_broadcaster::StreamBroadcaster,
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MySQL when configured, otherwise a process-local store
async fn open_history(config: &AppConfig) -> anyhow::Result<Arc<dyn SensorLogRepository>> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, sensor history is kept in memory only");
        return Ok(Arc::new(MemorySensorLogRepository::new()));
    };

    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(url)
        .await?;
    tracing::info!("Database connected");

    let repo = MySqlSensorLogRepository::new(pool);
    repo.ensure_schema().await?;
    Ok(Arc::new(repo))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cradlewatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting cradlewatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env();
    config.cry.validate()?;
    tracing::info!(
        inference_url = %config.inference_url,
        audio_device = %config.audio.device,
        serial_port = %config.serial.port.display(),
        camera_indices = ?config.face.camera_indices,
        persistent_history = config.database_url.is_some(),
        "Configuration loaded"
    );

    let store = Arc::new(SensorStateStore::new());
    let history = open_history(&config).await?;

    let inference = Arc::new(InferenceClient::new(config.inference_url.clone())?);
    match inference.health_check().await {
        Ok(true) => tracing::info!("Inference service reachable"),
        Ok(false) | Err(_) => {
            tracing::warn!("Inference service not reachable yet, producers will retry")
        }
    }

    let frames = Arc::new(FrameRelay::new());

    // Serial: read half feeds the temperature producer, write half the actuator
    let actuator_port: Arc<dyn ActuatorPort> = match TtyConnector.connect(&config.serial).await {
        Ok(connection) => {
            spawn_producer(
                "temperature",
                TemperatureProducer::new(
                    store.clone(),
                    connection.reader,
                    config.temperature.clone(),
                )
                .run(),
            );
            connection.writer
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                port = %config.serial.port.display(),
                "Serial connection failed, temperature and servo disabled"
            );
            TemperatureProducer::mark_unconnected(&store);
            Arc::new(UnavailablePort)
        }
    };
    let actuator = Arc::new(ActuatorController::new(
        store.clone(),
        actuator_port,
        config.actuator.clone(),
    ));
    tracing::info!("ActuatorController initialized (disarmed)");

    spawn_producer(
        "cry",
        CryProducer::new(
            store.clone(),
            Arc::new(ArecordSource::new(config.audio.clone())),
            inference.clone(),
            config.cry.clone(),
        )
        .run(),
    );

    spawn_producer(
        "face_direction",
        FaceDirectionProducer::new(
            store.clone(),
            Arc::new(V4l2Opener::new()),
            inference.clone(),
            frames.clone(),
            config.face.clone(),
        )
        .run(),
    );

    let broadcaster = Arc::new(StreamBroadcaster::new(
        store.clone(),
        config.broadcaster.clone(),
    ));
    tokio::spawn(broadcaster.clone().run());
    tracing::info!(cadence_ms = config.broadcaster.cadence.as_millis() as u64, "StreamBroadcaster started");

    tokio::spawn(StateSnapshotter::new(store.clone(), history.clone(), config.snapshot_interval).run());

    let state = AppState {
        config: Arc::new(config),
        store,
        broadcaster,
        actuator,
        history,
        frames,
    };

    let mut app = web_api::create_router(state.clone());
    if let Some(static_dir) = &state.config.static_dir {
        let serve_dir = ServeDir::new(static_dir)
            .not_found_service(ServeFile::new(static_dir.join("index.html")));
        app = app.fallback_service(serve_dir);
        tracing::info!(static_dir = %static_dir.display(), "Static file serving enabled");
    }
    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
