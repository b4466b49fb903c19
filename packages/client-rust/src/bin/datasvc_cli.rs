//! Issues one note operation through discovery, balancing and retry.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use datasvc_client::sd::StaticBackend;
use datasvc_client::{is_unavailable, Client, SERVICE_TAG};
use datasvc_core::{CallContext, Note, NoteService, ServiceError};

/// datasvc command-line client
#[derive(Debug, Parser)]
#[command(name = "datasvc-cli", version, about, long_about = None)]
struct Cli {
    /// Consul agent used for discovery
    #[arg(long, env = "CONSUL_ADDR", default_value = "http://127.0.0.1:8500")]
    consul: String,

    /// Skip discovery and use these instances (host:port), repeatable
    #[arg(long = "instance")]
    instances: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct NoteArgs {
    #[arg(long, default_value = "")]
    author: String,
    #[arg(long, default_value = "")]
    title: String,
    #[arg(long, default_value = "")]
    text: String,
}

impl NoteArgs {
    fn into_note(self, id: String) -> Note {
        Note::new(id, self.author, self.title, self.text)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a note
    Post {
        id: String,
        #[command(flatten)]
        note: NoteArgs,
    },
    /// Print a note as JSON
    Get { id: String },
    /// Create or replace a note
    Put {
        id: String,
        #[command(flatten)]
        note: NoteArgs,
    },
    /// Update the given non-empty fields of a note
    Patch {
        id: String,
        #[command(flatten)]
        note: NoteArgs,
    },
    /// Delete a note
    Delete { id: String },
}

/// Exit status when no live instance answered (sysexits `EX_UNAVAILABLE`).
const EXIT_UNAVAILABLE: u8 = 69;

/// Runs one operation; returns the text to print on success.
async fn run(client: &Client, command: Command) -> Result<String, ServiceError> {
    let ctx = CallContext::new();
    match command {
        Command::Post { id, note } => client.post_note(&ctx, note.into_note(id)).await?,
        Command::Get { id } => {
            let note = client.get_note(&ctx, &id).await?;
            return Ok(serde_json::to_string_pretty(&note)
                .unwrap_or_else(|_| format!("{note:?}")));
        }
        Command::Put { id, note } => {
            let body = note.into_note(id.clone());
            client.put_note(&ctx, &id, body).await?;
        }
        Command::Patch { id, note } => {
            // The id stays out of the body; the path carries it.
            client.patch_note(&ctx, &id, note.into_note(String::new())).await?;
        }
        Command::Delete { id } => client.delete_note(&ctx, &id).await?,
    }
    Ok("ok".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let client = if cli.instances.is_empty() {
        Client::connect(&cli.consul)
            .await
            .context("failed to set up consul discovery")?
    } else {
        let backend = StaticBackend::from_addresses(&cli.instances, &[SERVICE_TAG]);
        Client::with_backend(Arc::new(backend)).await
    };

    match run(&client, cli.command).await {
        Ok(output) => {
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) if is_unavailable(&err) => {
            eprintln!("error: {err}");
            Ok(ExitCode::from(EXIT_UNAVAILABLE))
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}
