use clap::Parser;
use colored::*;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vodal::cli::{App, Cli};
use vodal::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    info!("Initializing VO data-access client...");

    // Initialize the application state (shared HTTP client, env config)
    let app = match App::new() {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {:?}", e);
            println!(
                "{}",
                "Error: Failed to initialize application. Check logs.".red()
            );
            return Err(e);
        },
    };

    // Handle potential errors from command execution
    if let Err(e) = app.run(cli).await {
        error!("Command execution failed: {:?}", e);
        println!(
            "{} {}",
            "Error executing command:".red(),
            e.to_string().red()
        );
        return Err(e);
    }

    Ok(())
}
