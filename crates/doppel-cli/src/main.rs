use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doppel_hw::Camera;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "doppel", about = "Doppel face-search session CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a photo and search for matches
    Capture,
    /// Select a match candidate and look up its record
    Select {
        /// Match ID from the current candidate list
        match_id: String,
    },
    /// Show the current session
    Info,
    /// Show daemon status
    Status,
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// V4L2 device path
        #[arg(long, default_value = "/dev/video0")]
        device: String,
    },
}

// `#[zbus::proxy]` generates `DoppelProxy` from this declaration; the
// daemon side of the interface lives in doppeld.
#[zbus::proxy(
    interface = "org.doppel.Doppel1",
    default_service = "org.doppel.Doppel1",
    default_path = "/org/doppel/Doppel1"
)]
trait Doppel {
    async fn capture(&self) -> zbus::Result<String>;
    async fn select(&self, match_id: &str) -> zbus::Result<String>;
    async fn info(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Test { device } => camera_test(&device),
        command => daemon_command(command).await,
    }
}

async fn daemon_command(command: Commands) -> Result<()> {
    let connection = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let proxy = DoppelProxy::new(&connection)
        .await
        .context("connecting to doppeld (is the daemon running?)")?;

    match command {
        Commands::Capture => {
            println!("Capturing...");
            render_snapshot(&proxy.capture().await?)
        }
        Commands::Select { match_id } => {
            println!("Looking up {match_id}...");
            render_snapshot(&proxy.select(&match_id).await?)
        }
        Commands::Info => render_snapshot(&proxy.info().await?),
        Commands::Status => render_status(&proxy.status().await?),
        Commands::Test { .. } => unreachable!("handled before connecting"),
    }
}

/// Render a session snapshot: phase, any failure, the ranked candidate
/// table with the current selection marked, and the enrichment record.
fn render_snapshot(json: &str) -> Result<()> {
    let snapshot: Value = serde_json::from_str(json).context("parsing daemon reply")?;

    println!("Session: {}", snapshot["phase"].as_str().unwrap_or("unknown"));

    if let Some(failure) = snapshot.get("failure") {
        println!(
            "Failure: {} [{}]",
            failure["message"].as_str().unwrap_or("unknown"),
            failure["kind"].as_str().unwrap_or("unknown"),
        );
        println!("Run `doppel capture` to try again.");
    }

    if let Some(candidates) = snapshot["candidates"].as_array() {
        if candidates.is_empty() {
            println!("No matches.");
        } else {
            let selected = snapshot["selected"].as_str();
            println!("Matches:");
            for (rank, candidate) in candidates.iter().enumerate() {
                let id = candidate["match_id"].as_str().unwrap_or("?");
                let similarity = candidate["similarity"].as_f64().unwrap_or(0.0);
                let marker = if selected == Some(id) { "*" } else { " " };
                // Thumbnails travel base64-encoded; 3/4 recovers the byte size.
                let thumbnail = match candidate["thumbnail"].as_str() {
                    Some(encoded) => format!("  thumbnail ~{} bytes", encoded.len() * 3 / 4),
                    None => String::new(),
                };
                println!("{marker} {:>2}. {id}  {similarity:>5.1}%{thumbnail}", rank + 1);
            }
        }
    }

    if let Some(record) = snapshot["enrichment"].as_object() {
        println!("Record:");
        for (key, value) in record {
            println!("  {key}: {}", render_value(value));
        }
    }

    Ok(())
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn render_status(json: &str) -> Result<()> {
    let status: Value = serde_json::from_str(json).context("parsing daemon reply")?;
    println!("doppeld {}", status["version"].as_str().unwrap_or("?"));
    println!("  camera:  {}", status["camera"].as_str().unwrap_or("?"));
    println!("  search:  {}", status["face_api_url"].as_str().unwrap_or("?"));
    println!("  lookup:  {}", status["lookup_api_url"].as_str().unwrap_or("?"));
    println!("  session: {}", status["phase"].as_str().unwrap_or("?"));
    Ok(())
}

/// Direct camera diagnostic: enumerate devices, open one, capture a
/// single photo, and report what came back.
fn camera_test(device: &str) -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found.");
    } else {
        println!("Capture devices:");
        for info in &devices {
            println!("  {}  {} ({})", info.path, info.name, info.driver);
        }
    }

    println!("Opening {device}...");
    let camera = Camera::open(device).with_context(|| format!("opening {device}"))?;
    println!(
        "Negotiated {}x{} {:?}",
        camera.width, camera.height, camera.fourcc
    );

    let photo = camera.capture_photo().context("capturing photo")?;
    println!(
        "Captured {} bytes ({}x{}, sequence {})",
        photo.jpeg.len(),
        photo.width,
        photo.height,
        photo.sequence
    );
    match photo.estimate_brightness() {
        Some(brightness) => println!("Estimated brightness: {brightness:.1}/255"),
        None => println!("Estimated brightness: n/a (JPEG did not decode)"),
    }

    Ok(())
}
