use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use bulk_campaign::config::ServerConfig;
use bulk_campaign::dispatch::Dispatcher;
use bulk_campaign::server::{AppState, app_routes};
use bulk_campaign::session::{HttpSessionConnector, SessionCredentials};

#[derive(Parser)]
#[command(name = "bulk-campaign", about = "Personalized bulk messaging over a messaging session")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default when no subcommand is provided).
    Serve,
    /// Run one campaign from the terminal and print the report as JSON.
    Send {
        /// CSV file with `name` and `phone` columns.
        #[arg(short, long)]
        file: PathBuf,
        /// Message template.
        #[arg(short, long, conflicts_with = "message_file", required_unless_present = "message_file")]
        message: Option<String>,
        /// Read the message template from a file.
        #[arg(long)]
        message_file: Option<PathBuf>,
        /// Messaging session name.
        #[arg(long, env = "BULK_SESSION_NAME")]
        session: String,
        /// Messaging session access key.
        #[arg(long, env = "BULK_API_KEY", hide_env_values = true)]
        api_key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env()?;

    let connector = Arc::new(HttpSessionConnector::new(&config.gateway)?);
    let dispatcher = Arc::new(Dispatcher::new(connector, config.dispatch.clone()));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, dispatcher).await,
        Commands::Send {
            file,
            message,
            message_file,
            session,
            api_key,
        } => {
            let template = match (message, message_file) {
                (Some(message), _) => message,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading template {}", path.display()))?,
                (None, None) => anyhow::bail!("either --message or --message-file is required"),
            };
            let table = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading recipients {}", file.display()))?;

            let credentials = SessionCredentials::new(session, api_key);
            let report = dispatcher
                .run_table(&credentials, &template, &table)
                .await?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

async fn serve(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.bind, config.port);

    eprintln!("📨 Bulk Campaign v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Interface: http://{}/", addr);
    eprintln!("   Gateway: {}", config.gateway.base_url);
    eprintln!("   Pacing: {:?} between messages\n", config.dispatch.pacing);

    let app = app_routes(
        AppState {
            dispatcher,
            service_name: config.service_name.clone(),
        },
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "HTTP server started");
    axum::serve(listener, app).await?;

    Ok(())
}
