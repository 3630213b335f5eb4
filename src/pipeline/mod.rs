//! Producer/consumer pipeline
//!
//! The decode thread and the host tick share one [`Exchange`]: a video
//! queue, an audio queue and the seek/liveness state behind a single mutex
//! with two condition variables.
//!
//! [`Exchange`]: exchange::Exchange

mod byte_queue;
pub(crate) mod consumer;
pub(crate) mod exchange;
pub(crate) mod producer;

pub use byte_queue::{ByteQueue, QueueStats};
pub use exchange::{ProducerState, QueueKind};
