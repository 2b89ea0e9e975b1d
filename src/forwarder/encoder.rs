use crate::domain::{ForwarderError, Sample};
use crate::sender::SendOptions;

/// One `AuthenticatedSender::send` call worth of data.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub meter_name: String,
    pub payload: String,
    pub options: SendOptions,
}

/// How a backend groups samples into batches and turns a batch into
/// outbound requests.
pub trait BatchEncoder {
    /// Key samples are batched under. Every sample in a batch shares it.
    fn batch_key(&self, sample: &Sample) -> String;

    /// Encodes a non-empty batch. Requests are sent in the returned order.
    fn encode(&self, samples: &[Sample]) -> Result<Vec<OutboundRequest>, ForwarderError>;
}
