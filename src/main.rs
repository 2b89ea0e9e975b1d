use anyhow::Context;
use openstack_telemetry_forwarder::app::{self, App, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args_and_env(std::env::args()).context("Failed to load configuration")?;
    app::setup_logging(config.log_level, config.log_format).context("Failed to initialize logging")?;

    let summary = App::new(config).run().await?;
    if summary.flush.failed > 0 {
        anyhow::bail!("{} batches could not be flushed", summary.flush.failed);
    }
    Ok(())
}
