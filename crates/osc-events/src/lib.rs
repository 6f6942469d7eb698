//! # Object Sync Core - Event Broker
//!
//! In-process pub/sub fan-out of domain events to SSE-style subscribers
//! (§4.11). Carries no durability: reconnecting subscribers reconcile via
//! ordinary reads.

#![forbid(unsafe_code)]

mod broker;
mod event;

pub use broker::{EventBroker, Subscription};
pub use event::{Event, EventType};
