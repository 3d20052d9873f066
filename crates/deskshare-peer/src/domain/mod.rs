//! Domain layer for deskshare-peer.
//!
//! Pure types with no I/O: configuration, the application-visible lifecycle
//! state machine, and the negotiation states.
//!
//! # What does NOT belong here?
//!
//! - Sockets, HTTP clients, or peer-connection handles
//! - Timers: the application layer decides when a timeout fires and feeds
//!   the result in as an event

pub mod config;
pub mod lifecycle;
pub mod negotiation;

pub use config::{NegotiationConfig, PeerConfig, RetryPolicy};
pub use lifecycle::{transition, LifecycleEvent, LifecycleState};
pub use negotiation::NegotiationState;
