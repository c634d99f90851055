//! # MiHome Gateway Layer
//!
//! Ties the RFM69 driver to the OOK and OpenThings codecs: personality
//! switching, the background receive loop, transmit scheduling and the
//! queue of requests waiting for battery powered devices to wake up.

pub mod gateway;
pub mod product;
pub mod queue;

pub use gateway::{ActivityLed, MiHome, ERROR_BACKOFF, EVENT_CAPACITY, RECEIVE_TIMEOUT};
pub use product::Product;
pub use queue::{OutgoingQueue, QueueEntry, QueuePayload, ValveState};
