pub mod abort_manager;
pub mod chat_manager;
pub mod config;
pub mod error;
pub mod logger;
pub mod observer_group_manager;
pub mod storage_manager;
pub mod transport;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

pub use config::{ApiConfig, ObserverSettings};
pub use error::ObserverError;
pub use observer_group_manager::{ButtonState, ObserverController, RoundOutcome};
pub use transport::{NoopRenderSink, RenderSink};

/// Everything an embedding application keeps alive for the session.
pub struct AppState {
    pub controller: Arc<ObserverController>,
    pub pool: storage_manager::db::DbPool,
    pub log_manager: Option<logger::LogManager>,
}

/// Load settings from `settings_file` (or the database), start logging, open the
/// database and wire the controller.
pub fn setup(settings_file: Option<&Path>, sink: Arc<dyn RenderSink>) -> anyhow::Result<AppState> {
    let bootstrap = match settings_file {
        Some(path) => ObserverSettings::from_json_file(path).map_err(anyhow::Error::msg)?,
        None => ObserverSettings::default(),
    };
    let log_manager = logger::init_logging(&bootstrap)?;

    let pool = storage_manager::db::init_pool(&bootstrap.resolved_database_path())
        .map_err(anyhow::Error::msg)
        .context("Failed to initialize database pool")?;

    let mut settings = if settings_file.is_some() {
        bootstrap
    } else {
        let conn = storage_manager::db::open_db(&pool).map_err(anyhow::Error::msg)?;
        storage_manager::settings::read_settings(&conn).map_err(anyhow::Error::msg)?
    };
    settings.apply_env_overrides();

    let missing = settings.api.missing_fields();
    if !missing.is_empty() {
        utils::log_warn(
            "setup",
            format!("API configuration incomplete: {}", missing.join(", ")),
        );
    }

    let controller = ObserverController::with_sqlite(pool.clone(), sink, settings)
        .context("Failed to build observer controller")?;
    utils::log_info("setup", "observer engine ready");

    Ok(AppState {
        controller: Arc::new(controller),
        pool,
        log_manager,
    })
}
