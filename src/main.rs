use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pressdrop::api::HttpService;
use pressdrop::common::ConfigStore;
use pressdrop::health::{HealthMonitor, HealthStatus, PROBE_INTERVAL};
use pressdrop::output;
use pressdrop::score::{score, stars};
use pressdrop::session::{KeyCheck, SessionController};
use pressdrop::workflow::{
    FailureKind, OperationKind, OperationRequest, Outcome, Phase, RejectReason, ARCHIVE_EXT,
};

#[derive(Parser)]
#[command(name = "pressdrop")]
#[command(about = "Client for a remote lossless image compression service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress an image into a service archive
    Encode {
        #[arg(help = "Path to a lossless image file")]
        file: PathBuf,
        #[arg(short, long, help = "Where to write the archive")]
        output: Option<PathBuf>,
    },
    /// Recover the original image from a service archive
    Decode {
        #[arg(help = "Path to a .press archive")]
        file: PathBuf,
        #[arg(short, long, help = "Where to write the recovered image")]
        output: Option<PathBuf>,
    },
    /// Probe the service liveness endpoint
    Status {
        #[arg(long, help = "Keep probing on an interval")]
        watch: bool,
    },
    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Manage the stored service endpoint
    Endpoint {
        #[command(subcommand)]
        action: EndpointAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Validate a key against the service and store it
    Set { key: String },
    /// Forget the stored key
    Clear,
}

#[derive(Subcommand)]
enum EndpointAction {
    /// Override the service endpoint URL
    Set { url: String },
    /// Reset to the default endpoint
    Clear,
    /// Print the resolved endpoint and settings location
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store = Arc::new(ConfigStore::load()?);
    let service = Arc::new(HttpService::new());
    let controller = SessionController::new(store.clone(), service.clone());

    match cli.command {
        Commands::Encode { file, output } => {
            run_transfer(&controller, OperationKind::Encode, file, output).await
        }
        Commands::Decode { file, output } => {
            run_transfer(&controller, OperationKind::Decode, file, output).await
        }
        Commands::Status { watch } => {
            let monitor = HealthMonitor::new(service, store);
            if watch {
                watch_status(monitor).await
            } else {
                print_status(monitor.probe_once().await);
                Ok(())
            }
        }
        Commands::Key { action } => match action {
            KeyAction::Set { key } => set_key(&controller, &key).await,
            KeyAction::Clear => {
                store.clear_key()?;
                println!("API key cleared.");
                Ok(())
            }
        },
        Commands::Endpoint { action } => match action {
            EndpointAction::Set { url } => {
                controller.set_endpoint(&url)?;
                println!("Endpoint set to {}", store.get().base_url);
                Ok(())
            }
            EndpointAction::Clear => {
                controller.set_endpoint("")?;
                println!("Endpoint reset to {}", store.get().base_url);
                Ok(())
            }
            EndpointAction::Show => {
                println!("Endpoint: {}", store.get().base_url);
                println!("Settings: {}", store.path().display());
                pressdrop::common::config::show_settings(store.path(), &mut std::io::stdout())?;
                Ok(())
            }
        },
    }
}

async fn run_transfer(
    controller: &SessionController<HttpService>,
    kind: OperationKind,
    file: PathBuf,
    dest_override: Option<PathBuf>,
) -> Result<()> {
    // Fail fast before spinning anything up
    if !file.exists() {
        eprintln!("Error: File not found: {}", file.display());
        std::process::exit(1);
    }

    if controller.needs_key() {
        eprintln!("No API key stored. Run `pressdrop key set <key>` first.");
        std::process::exit(1);
    }

    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| file.display().to_string());
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let size = bytes.len() as u64;

    let request = OperationRequest {
        kind,
        file_name: file_name.clone(),
        bytes,
    };

    let pb = output::spinner(&format!(
        "{} {} ({})",
        kind.verb(),
        file_name,
        output::format_bytes(size)
    ));

    let (mut phases, handle) = controller.start(request)?;

    // The phase feed closes when the engine reaches a terminal state.
    while phases.changed().await.is_ok() {
        let phase = *phases.borrow();
        pb.set_message(phase_message(kind, phase, &file_name));
    }
    let outcome = handle.await.context("operation task panicked")?;

    controller.conclude(&outcome)?;

    match outcome {
        Outcome::Succeeded(done) => {
            let dest = dest_override.unwrap_or_else(|| PathBuf::from(&done.output_name));
            let payload_len = done.payload.len() as u64;
            tokio::fs::write(&dest, &done.payload)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;

            match done.stats {
                Some(stats) => {
                    let s = score(stats.ratio_percent);
                    output::spinner_success(
                        &pb,
                        &format!(
                            "Compressed: {} -> {} ({:.1}% smaller)",
                            file_name,
                            dest.display(),
                            stats.ratio_percent
                        ),
                    );
                    println!("{}", output::render_score(&stars(s.tier), &s));
                    println!(
                        "{} -> {}",
                        output::format_bytes(stats.original_size),
                        output::format_bytes(stats.compressed_size)
                    );
                }
                None => {
                    output::spinner_success(
                        &pb,
                        &format!(
                            "Decompressed: {} -> {} ({})",
                            file_name,
                            dest.display(),
                            output::format_bytes(payload_len)
                        ),
                    );
                }
            }
            Ok(())
        }
        Outcome::Rejected(reason) => {
            output::spinner_error(&pb, &reject_message(&reason));
            std::process::exit(1);
        }
        Outcome::Failed(failure) => {
            output::spinner_error(&pb, &failure_message(&failure));
            std::process::exit(1);
        }
    }
}

fn phase_message(kind: OperationKind, phase: Phase, file_name: &str) -> String {
    match phase {
        Phase::Idle | Phase::Validating => format!("Checking {file_name}..."),
        Phase::Transferring => format!("Uploading {file_name}..."),
        Phase::AwaitingResponse => format!("{} {file_name}...", kind.verb()),
        Phase::Done => "Finishing...".to_string(),
    }
}

fn reject_message(reason: &RejectReason) -> String {
    match reason {
        RejectReason::Unsupported { suffix: Some(s) } => format!("Unsupported file type: .{s}"),
        RejectReason::Unsupported { suffix: None } => "Unsupported file type".to_string(),
        RejectReason::TooLarge { .. } => "File too large (max 50 MB)".to_string(),
        RejectReason::LossyFormat {
            server_message: Some(msg),
        } => format!("Rejected by service: {msg}"),
        RejectReason::LossyFormat {
            server_message: None,
        } => "Lossy formats are not accepted; convert to PNG or TIFF first".to_string(),
        RejectReason::WrongExtension => format!("Please select a .{ARCHIVE_EXT} file"),
    }
}

fn failure_message(failure: &FailureKind) -> String {
    match failure {
        FailureKind::Unauthorized => {
            "API key rejected. Run `pressdrop key set <key>` to re-enter it.".to_string()
        }
        FailureKind::RateLimited => "Rate limit reached. Wait a minute and try again.".to_string(),
        FailureKind::Server { status, message } => format!("Server error (HTTP {status}): {message}"),
        FailureKind::Network { message } => format!("Network error: {message}"),
    }
}

async fn set_key(controller: &SessionController<HttpService>, key: &str) -> Result<()> {
    let pb = output::spinner("Checking key against the service...");
    let check = controller.submit_key(key).await?;
    match check {
        KeyCheck::Accepted => {
            output::spinner_success(&pb, &key_check_message(&check));
            Ok(())
        }
        KeyCheck::Rejected | KeyCheck::Unreachable { .. } => {
            output::spinner_error(&pb, &key_check_message(&check));
            std::process::exit(1);
        }
    }
}

fn key_check_message(check: &KeyCheck) -> String {
    match check {
        KeyCheck::Accepted => "Key accepted and stored.".to_string(),
        KeyCheck::Rejected => "Key rejected by the service; check it and try again.".to_string(),
        KeyCheck::Unreachable { message } => {
            format!("Could not reach server; is it running? ({message})")
        }
    }
}

fn print_status(status: HealthStatus) {
    match status {
        HealthStatus::Online => println!("Service online"),
        HealthStatus::Offline => println!("Service offline or degraded"),
        HealthStatus::Checking => println!("Checking..."),
    }
}

async fn watch_status(monitor: HealthMonitor<HttpService>) -> Result<()> {
    let (mut rx, _handle) = monitor.spawn(PROBE_INTERVAL);
    print_status(*rx.borrow());
    while rx.changed().await.is_ok() {
        print_status(*rx.borrow());
    }
    Ok(())
}
