use clipfactory::ai::anthropic::AnthropicClient;
use clipfactory::bot::Bot;
use clipfactory::dashboard::{self, AppState};
use clipfactory::db::Database;
use clipfactory::errors::AppResult;
use clipfactory::pipeline::Pipeline;
use clipfactory::{config, init_tracing};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(error) = run().await {
        eprintln!("fatal: {error}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let config = config::load()?;
    let data_dir = config.db_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    init_tracing(&data_dir)?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let claude = Arc::new(AnthropicClient::new(
        config.anthropic_api_key.clone(),
        config.anthropic_model.clone(),
    ));
    let pipeline = Arc::new(Pipeline::new(db, claude.clone(), claude));

    let state = Arc::new(AppState {
        pipeline: pipeline.clone(),
    });
    let router = dashboard::router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "dashboard listening");

    let bot = Bot::new(
        &config.telegram_bot_token,
        pipeline,
        config.telegram_user_id,
        config.dashboard_url.clone(),
    );

    tokio::select! {
        result = axum::serve(listener, router) => {
            result?;
        }
        _ = bot.run() => {}
    }
    Ok(())
}
