use hackathon::{
    api::start_api_server,
    observability::{init_observability, log_config_info},
    startup::Application,
    AppConfig, Result, APP_NAME, VERSION,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any config is read from the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env()?;
    init_observability(&config.observability)?;
    config.validate()?;

    info!(app_name = APP_NAME, version = VERSION, "Starting hackathon backend");
    log_config_info(&config);

    let app = Application::build(&config).await?;

    let result = start_api_server(&config.server, app.state).await;
    app.passcode_cleanup.abort();

    if let Err(e) = &result {
        error!(error = %e, "API server terminated with error");
    }
    result
}
