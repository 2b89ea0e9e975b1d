//! Entry points the collector drives: `submit` for every inbound event and
//! `flush` once at shutdown.

pub mod encoder;

pub use encoder::{BatchEncoder, OutboundRequest};

use crate::buffer::{Batch, SampleBatcher};
use crate::domain::{Event, ForwarderError, Sample};
use crate::identity::IdentityClient;
use crate::sender::{AuthenticatedSender, Backend, SendOutcome};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Outcome of a shutdown flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Batches whose requests all completed without error.
    pub sent: usize,
    pub failed: usize,
    pub samples: usize,
}

pub struct Forwarder<B, I> {
    batcher: SampleBatcher,
    sender: AuthenticatedSender<B, I>,
    units: HashMap<String, String>,
    batch_size: usize,
    timeout_retries: u32,
}

impl<B, I> Forwarder<B, I>
where
    B: Backend + BatchEncoder,
    I: IdentityClient,
{
    pub fn new(
        sender: AuthenticatedSender<B, I>,
        units: HashMap<String, String>,
        batch_size: usize,
        timeout_retries: u32,
    ) -> Self {
        Self {
            batcher: SampleBatcher::new(),
            sender,
            units,
            batch_size: batch_size.max(1),
            timeout_retries,
        }
    }

    pub fn sender(&self) -> &AuthenticatedSender<B, I> {
        &self.sender
    }

    pub fn batcher(&self) -> &SampleBatcher {
        &self.batcher
    }

    /// Derives samples from `event`, buffers them and sends any batch that
    /// became full. Returns the number of batches sent.
    pub async fn submit(&self, event: &Event) -> Result<usize, ForwarderError> {
        let samples = event.to_samples(&self.units)?;
        self.submit_samples(samples).await
    }

    pub async fn submit_samples(&self, samples: Vec<Sample>) -> Result<usize, ForwarderError> {
        let mut groups: Vec<(String, Vec<Sample>)> = Vec::new();
        for sample in samples {
            let key = self.sender.backend().batch_key(&sample);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => group.push(sample),
                None => groups.push((key, vec![sample])),
            }
        }

        // Every group is buffered before anything is sent so a failing batch
        // cannot strand the groups after it.
        let ready: Vec<Batch> = groups
            .into_iter()
            .filter_map(|(key, group)| self.batcher.add(&key, group, self.batch_size))
            .collect();

        let mut sent = 0;
        let mut first_error = None;
        for batch in ready {
            debug!(
                batch_id = batch.id(),
                key = batch.key(),
                size = batch.size(),
                "Batch ready"
            );
            match self.send_batch(&batch).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    error!(key = batch.key(), size = batch.size(), error = %e, "Failed to send batch");
                    first_error = first_error.or(Some(e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }

    /// Encodes and sends one batch. Every request is attempted; the first
    /// failure is returned once the batch is done.
    pub async fn send_batch(&self, batch: &Batch) -> Result<(), ForwarderError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut first_error = None;
        for request in self.sender.backend().encode(batch.samples())? {
            let outcome = self
                .sender
                .send(
                    &request.meter_name,
                    &request.payload,
                    &request.options,
                    self.timeout_retries,
                )
                .await;

            match outcome {
                Ok(SendOutcome::Dropped(reason)) => warn!(
                    batch_id = batch.id(),
                    meter = %request.meter_name,
                    ?reason,
                    "Dropped request"
                ),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        batch_id = batch.id(),
                        meter = %request.meter_name,
                        error = %e,
                        "Request failed"
                    );
                    first_error = first_error.or(Some(ForwarderError::from(e)));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Sends everything still buffered. Failures are logged and counted.
    pub async fn flush(&self) -> FlushReport {
        let mut report = FlushReport::default();

        for (key, samples) in self.batcher.drain_all() {
            if samples.is_empty() {
                continue;
            }
            let batch = Batch::new(key, samples);
            report.samples += batch.size();

            match self.send_batch(&batch).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(key = batch.key(), size = batch.size(), error = %e, "Failed to flush batch");
                }
            }
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            samples = report.samples,
            "Flush complete"
        );
        report
    }
}

impl<B, I> std::fmt::Debug for Forwarder<B, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("sender", &self.sender)
            .field("batch_size", &self.batch_size)
            .field("timeout_retries", &self.timeout_retries)
            .field("pending", &self.batcher.total_pending())
            .finish()
    }
}
