//! services/tutor/src/bin/tutor.rs

use async_openai::Client;
use professor_core::ports::{Clock, IdentityProvider, SystemClock};
use professor_core::{AppState, GuestIdentityProvider, StudyApp};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutor_lib::{
    adapters::{
        AccountIdentityProvider, DbAdapter, MarkdownExporter, OpenAiAnalysisAdapter,
        OpenAiChatAdapter,
    },
    config::{AiProvider, Config},
    error::TutorError,
    terminal::{self, render, Terminal},
};

#[tokio::main]
async fn main() -> Result<(), TutorError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            // Nothing else may run without the required settings.
            eprint!("{}", render::configuration_error(&e.missing_vars()));
            return Err(e.into());
        }
    };
    // Logs go to stderr so they never interleave with the study screens.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded. Starting Professor AI...");

    // --- 2. Open Database & Run Migrations ---
    info!("Opening database at {}", config.database_url);
    let db_adapter = Arc::new(DbAdapter::connect(&config.database_url).await?);
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let client = Client::with_config(config.openai_config());
    match config.provider {
        AiProvider::OpenAi => info!("Using OpenAI models {} / {}", config.analysis_model, config.chat_model),
        AiProvider::Gemini => info!("Using Gemini models {} / {}", config.analysis_model, config.chat_model),
    }
    let analysis_adapter = Arc::new(OpenAiAnalysisAdapter::new(
        client.clone(),
        config.analysis_model.clone(),
    ));
    let chat_adapter = Arc::new(OpenAiChatAdapter::new(client, config.chat_model.clone()));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let identity: Arc<dyn IdentityProvider> = if config.accounts_enabled {
        info!("Local accounts enabled.");
        Arc::new(AccountIdentityProvider::new(
            db_adapter.clone(),
            db_adapter.clone(),
            clock.clone(),
        ))
    } else {
        Arc::new(GuestIdentityProvider::new())
    };

    // --- 4. Build the AppState ---
    let app_state = AppState {
        analysis: analysis_adapter,
        chat: chat_adapter,
        storage: db_adapter,
        identity,
        exporter: Arc::new(MarkdownExporter::new(config.export_dir.clone())),
        clock,
    };
    let mut app = StudyApp::new(app_state, config.splash_min);

    // --- 5. Run the Terminal Session ---
    let mut terminal = Terminal::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout());
    terminal::run(&mut app, &mut terminal).await?;

    info!("Session ended.");
    Ok(())
}
