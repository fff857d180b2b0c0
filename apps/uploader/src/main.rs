use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, ClientEvent, SelectedFile, UploaderApp};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

mod interactive;

#[derive(Parser, Debug)]
#[command(about = "Upload files through pre-signed URLs and list stored files")]
struct Args {
    /// Base URL of the credential and listing API.
    #[arg(long, global = true)]
    api_base_url: Option<String>,
    /// Per-request timeout; 0 disables it.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored files.
    List,
    /// Upload one file, then print the refreshed list.
    Upload {
        path: PathBuf,
        /// Overrides the type guessed from the file extension.
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Line-driven session on stdin.
    Interactive,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings()?;
    if let Some(api_base_url) = args.api_base_url {
        settings = settings.with_api_base_url(api_base_url);
    }
    if let Some(secs) = args.timeout_secs {
        settings = settings.with_timeout_secs(secs);
    }
    let app = UploaderApp::new(&settings)?;

    match args.command {
        Command::List => {
            app.start().await;
            for line in app.list().view().await.lines() {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Upload { path, content_type } => upload(app, &path, content_type).await,
        Command::Interactive => {
            interactive::run(app).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn upload(app: UploaderApp, path: &Path, content_type: Option<String>) -> Result<ExitCode> {
    let file = read_selected_file(path, content_type).await?;
    let printer = tokio::spawn(print_statuses(app.subscribe()));

    app.start().await;
    app.orchestrator().select_file(Some(file));
    let outcome = app.orchestrator().trigger_upload().await;

    let summary = app.orchestrator().summary();
    let list_lines = app.list().view().await.lines();
    // Closing the event channel lets the printer drain and exit.
    drop(app);
    printer.await.context("status printer stopped unexpectedly")?;

    if let Some(summary) = summary {
        println!("Uploaded file: {}", summary.file_name);
        println!("Stored key: {}", summary.key);
    }
    for line in list_lines {
        println!("{line}");
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn print_statuses(mut rx: broadcast::Receiver<ClientEvent>) {
    loop {
        match rx.recv().await {
            Ok(ClientEvent::StatusChanged(status)) => println!("{status}"),
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

pub(crate) async fn read_selected_file(
    path: &Path,
    content_type: Option<String>,
) -> Result<SelectedFile> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("'{}' does not name a file", path.display()))?;
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let content_type = content_type.unwrap_or_else(|| guess_content_type(path));
    Ok(SelectedFile::new(name, content_type, content))
}

/// Empty when the extension is unknown, the way a browser reports such files.
fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or_default()
        .to_string()
}
