pub mod batcher;

pub use batcher::{Batch, SampleBatcher};
