use anyhow::Context;
use clap::Parser;
use tracing::error;

use news_playlist_curator::{
    app::ComponentRegistry,
    config::{Cli, Config},
    observability,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    let cli = Cli::parse();
    observability::tracing::init(cli.log_level, cli.log_format)
        .context("failed to initialize tracing")?;

    let config = Config::from_cli(cli).context("failed to load configuration")?;
    let registry = ComponentRegistry::build(config).context("failed to build components")?;

    if registry.config().status_only() {
        if let Err(err) = registry.report_status().await {
            error!(error = %format!("{err:#}"), "playlist status check failed");
            return Err(err);
        }
        return Ok(());
    }

    if let Err(err) = registry.run().await {
        error!(error = %format!("{err:#}"), "curation run failed");
        return Err(err);
    }
    Ok(())
}
