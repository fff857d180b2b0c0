//! Stdin-driven session: each line is one operator action.

use std::{future::Future, path::Path, sync::Arc};

use anyhow::Result;
use client_core::{ClientEvent, UploaderApp};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::{self, error::RecvError},
    task::{JoinError, JoinSet},
};
use tracing::{error, warn};

use crate::read_selected_file;

const HELP: &str = "commands: select <path> | clear | upload | cancel | list | status | help | quit";

/// Background work queued from operator input. Finished tasks are reaped on
/// every input line so a panic is logged instead of vanishing with its handle.
#[derive(Default)]
struct BackgroundTasks {
    tasks: JoinSet<&'static str>,
}

impl BackgroundTasks {
    fn spawn(&mut self, name: &'static str, work: impl Future<Output = ()> + Send + 'static) {
        self.tasks.spawn(async move {
            work.await;
            name
        });
    }

    /// Logs every task that has already finished; returns how many failed.
    fn reap(&mut self) -> usize {
        let mut failed = 0;
        while let Some(result) = self.tasks.try_join_next() {
            failed += usize::from(!log_join(result));
        }
        failed
    }

    async fn shutdown(mut self) -> usize {
        self.tasks.abort_all();
        let mut failed = 0;
        while let Some(result) = self.tasks.join_next().await {
            failed += usize::from(!log_join(result));
        }
        failed
    }
}

fn log_join(result: Result<&'static str, JoinError>) -> bool {
    match result {
        Ok(_) => true,
        Err(err) if err.is_cancelled() => true,
        Err(err) => {
            error!(error = %err, "background task failed");
            false
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Action<'a> {
    Select(&'a str),
    Clear,
    Upload,
    Cancel,
    List,
    Status,
    Help,
    Quit,
}

fn parse_action(line: &str) -> Option<Action<'_>> {
    let line = line.trim();
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map(|(command, rest)| (command, rest.trim()))
        .unwrap_or((line, ""));
    match (command, rest) {
        ("select", path) if !path.is_empty() => Some(Action::Select(path)),
        ("clear", "") => Some(Action::Clear),
        ("upload", "") => Some(Action::Upload),
        ("cancel", "") => Some(Action::Cancel),
        ("list", "") => Some(Action::List),
        ("status", "") => Some(Action::Status),
        ("help", "") => Some(Action::Help),
        ("quit" | "exit", "") => Some(Action::Quit),
        _ => None,
    }
}

pub async fn run(app: UploaderApp) -> Result<()> {
    let app = Arc::new(app);
    let printer = tokio::spawn(print_events(app.subscribe()));

    app.start().await;
    println!("{HELP}");

    let mut background = BackgroundTasks::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        background.reap();
        if line.trim().is_empty() {
            continue;
        }
        let Some(action) = parse_action(&line) else {
            println!("unrecognized input; {HELP}");
            continue;
        };

        match action {
            Action::Select(path) => match read_selected_file(Path::new(path), None).await {
                Ok(file) => app.orchestrator().select_file(Some(file)),
                Err(err) => {
                    warn!(error = %err, "selection failed");
                    println!("could not select '{path}': {err:#}");
                }
            },
            Action::Clear => app.orchestrator().select_file(None),
            Action::Upload => {
                // Runs in the background so selection and a second trigger can race it.
                let app = Arc::clone(&app);
                background.spawn("upload", async move {
                    app.orchestrator().trigger_upload().await;
                });
            }
            Action::Cancel => {
                if !app.orchestrator().cancel_upload() {
                    println!("no upload in progress");
                }
            }
            Action::List => {
                let app = Arc::clone(&app);
                background.spawn("list refresh", async move {
                    app.list().refresh().await;
                });
            }
            Action::Status => {
                let orchestrator = app.orchestrator();
                println!("status: {}", orchestrator.status());
                println!("phase: {:?}", orchestrator.phase());
                println!(
                    "upload trigger: {}",
                    if orchestrator.trigger_enabled() {
                        "enabled"
                    } else {
                        "disabled"
                    }
                );
                if let Some(summary) = orchestrator.summary() {
                    println!("last upload: {} -> {}", summary.file_name, summary.key);
                }
            }
            Action::Help => println!("{HELP}"),
            Action::Quit => break,
        }
    }

    background.shutdown().await;
    printer.abort();
    Ok(())
}

async fn print_events(mut rx: broadcast::Receiver<ClientEvent>) {
    loop {
        match rx.recv().await {
            Ok(ClientEvent::StatusChanged(status)) => println!("{status}"),
            Ok(ClientEvent::SummaryChanged(Some(summary))) => {
                println!("Uploaded file: {}", summary.file_name);
                println!("Stored key: {}", summary.key);
            }
            Ok(ClientEvent::ListRendered(view)) => {
                for line in view.lines() {
                    println!("  {line}");
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
