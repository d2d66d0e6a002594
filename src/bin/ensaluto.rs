use anyhow::Result;
use ensaluto::cli::{self, actions, actions::Action};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let (action, globals) = cli::start().await?;

    // Handle the action
    match action {
        Action::Server { .. } => actions::server::handle(action, &globals).await?,
    }

    cli::telemetry::shutdown_tracer();

    Ok(())
}
