use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use doppel_core::{Endpoint, FaceSearchClient, LookupClient};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod source;

use config::Config;
use dbus_interface::DoppelService;
use source::V4lImageSource;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("doppeld starting");

    let config = Config::from_env().context("loading configuration")?;
    let timeout = Duration::from_secs(config.http_timeout_secs);

    let source = V4lImageSource::open(&config.camera_device, config.warmup_frames)
        .with_context(|| format!("opening camera {}", config.camera_device))?;

    let search = FaceSearchClient::new(
        Endpoint::new(&config.face_api_url, Some(config.face_api_key.clone()))
            .with_timeout(timeout),
    );
    let lookup = LookupClient::new(
        Endpoint::new(&config.lookup_api_url, config.lookup_api_key.clone())
            .with_timeout(timeout),
    );

    let engine = engine::spawn_engine(Box::new(source), Arc::new(search), Arc::new(lookup));

    let service = DoppelService::new(
        engine,
        config.camera_device.clone(),
        config.face_api_url.clone(),
        config.lookup_api_url.clone(),
    );

    let _connection = zbus::connection::Builder::session()
        .context("connecting to the session bus")?
        .name("org.doppel.Doppel1")?
        .serve_at("/org/doppel/Doppel1", service)?
        .build()
        .await
        .context("exporting the D-Bus interface")?;

    tracing::info!("doppeld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("doppeld shutting down");

    Ok(())
}
