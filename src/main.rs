// Entrypoint for the CLI application.
// - Sets up logging, builds the API client from the environment and checks
//   that the API answers before handing over to the menu.
// - Exits with status 1 when the API is not healthy at startup.

use anyhow::Context;
use auditoria_cli::{api::ApiClient, ui};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    // Quiet by default so log lines don't interleave with the prompts.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let api = ApiClient::from_env().context("Failed to configure audit API client")?;
    tracing::info!(base_url = %api.config().base_url, "Audit API client ready");

    ui::print_banner();
    if !ui::report_health(&api) {
        std::process::exit(1);
    }

    // Blocks until the user picks "Exit".
    ui::main_menu(api)?;
    Ok(())
}
