//! # Event Bus Module
//!
//! Publish/subscribe plumbing between a printer session and its consumers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use marlinkit_core::event_bus::{EventBus, EventCategory, EventFilter, SessionEvent};
//!
//! let bus = EventBus::new();
//! let subscription = bus.subscribe(
//!     EventFilter::Categories(vec![EventCategory::Telemetry]),
//!     |event| {
//!         if let SessionEvent::Telemetry(fact) = event {
//!             println!("{:?}", fact);
//!         }
//!     },
//! );
//!
//! bus.unsubscribe(subscription);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
