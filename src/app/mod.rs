pub mod config;
pub mod input;
pub mod logging_system;
pub mod shutdown;

pub use config::{BackendKind, Config, ConfigError, LogFormat, LogLevel};
pub use input::EventReader;
pub use logging_system::{LoggingError, LoggingSystem, setup_logging};
pub use shutdown::spawn_signal_listener;

use crate::backends::{AlarmBackend, MeteringBackend, MetricBackend};
use crate::forwarder::{BatchEncoder, FlushReport, Forwarder};
use crate::identity::{AuthError, IdentityClient, KeystoneClient};
use crate::sender::{AuthenticatedSender, Backend, HttpTransport, SendError, TransportConfig};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Identity client error: {0}")]
    Auth(#[from] AuthError),
    #[error("Transport error: {0}")]
    Transport(#[from] SendError),
    #[error("Input error: {0}")]
    Input(#[from] std::io::Error),
}

/// What a run did, reported once input ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: u64,
    pub failed: u64,
    pub rejected: u64,
    pub flush: FlushReport,
}

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reads events from stdin until EOF or a shutdown signal, then flushes.
    pub async fn run(self) -> Result<RunSummary, AppError> {
        let shutdown = CancellationToken::new();
        let listener = spawn_signal_listener(shutdown.clone());

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let result = self.run_with_input(stdin, shutdown.clone()).await;

        shutdown.cancel();
        let _ = listener.await;
        result
    }

    pub async fn run_with_input<R>(
        &self,
        input: R,
        shutdown: CancellationToken,
    ) -> Result<RunSummary, AppError>
    where
        R: AsyncBufRead + Unpin,
    {
        let config = &self.config;
        info!(
            "Starting openstack-telemetry-forwarder v{}",
            env!("CARGO_PKG_VERSION")
        );
        info!(
            backend = ?config.backend,
            url_type = %config.url_type,
            batch_size = config.batch_size,
            timeout_ms = config.timeout_ms,
            timeout_retries = config.timeout_retries,
            "Configuration loaded"
        );

        let identity = KeystoneClient::new(config.credentials()?, config.timeout)?;

        match config.backend {
            BackendKind::Metering => {
                let forwarder = self.forwarder(MeteringBackend::new(), identity)?;
                run_forwarder(forwarder, input, shutdown).await
            }
            BackendKind::Alarm => {
                let forwarder = self.forwarder(AlarmBackend::new(), identity)?;
                run_forwarder(forwarder, input, shutdown).await
            }
            BackendKind::Metric => {
                let backend = MetricBackend::new(config.archive_policy.clone());
                let forwarder = self.forwarder(backend, identity)?;
                run_forwarder(forwarder, input, shutdown).await
            }
        }
    }

    fn forwarder<B, I>(&self, backend: B, identity: I) -> Result<Arc<Forwarder<B, I>>, AppError>
    where
        B: Backend + BatchEncoder,
        I: IdentityClient,
    {
        let config = &self.config;
        let transport = HttpTransport::new(TransportConfig {
            timeout: config.timeout,
            ..TransportConfig::default()
        })?;
        let sender = AuthenticatedSender::new(
            backend,
            identity,
            transport,
            config.url_type,
            config.retry_policy.clone(),
        );

        Ok(Arc::new(Forwarder::new(
            sender,
            config.units.clone(),
            config.batch_size,
            config.timeout_retries,
        )))
    }
}

/// Submits every event on its own task, then flushes once input ends or
/// `shutdown` fires. Submit errors are logged and counted.
pub async fn run_forwarder<B, I, R>(
    forwarder: Arc<Forwarder<B, I>>,
    input: R,
    shutdown: CancellationToken,
) -> Result<RunSummary, AppError>
where
    B: Backend + BatchEncoder + 'static,
    I: IdentityClient + 'static,
    R: AsyncBufRead + Unpin,
{
    let mut reader = EventReader::new(input);
    let mut tasks = JoinSet::new();
    let mut summary = RunSummary::default();

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, stopping intake");
                break;
            }
            next = reader.next_event() => next?,
        };
        let Some(event) = next else {
            info!("End of input");
            break;
        };

        summary.events += 1;
        let forwarder = Arc::clone(&forwarder);
        tasks.spawn(async move { forwarder.submit(&event).await });

        // Reap finished submits so the set does not grow with the input.
        while let Some(result) = tasks.try_join_next() {
            record_submit(result, &mut summary);
        }
    }

    while let Some(result) = tasks.join_next().await {
        record_submit(result, &mut summary);
    }

    summary.rejected = reader.rejected();
    summary.flush = forwarder.flush().await;
    info!(
        events = summary.events,
        failed = summary.failed,
        rejected = summary.rejected,
        "Forwarder stopped"
    );
    Ok(summary)
}

fn record_submit(
    result: Result<Result<usize, crate::domain::ForwarderError>, tokio::task::JoinError>,
    summary: &mut RunSummary,
) {
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            summary.failed += 1;
            error!(error = %e, "Failed to forward event");
        }
        Err(e) => {
            summary.failed += 1;
            error!(error = %e, "Submit task panicked or was cancelled");
        }
    }
}
