//! Warden Events - In-process event bus for the Warden plugin runtime.
//!
//! This crate provides:
//! - The [`PluginEvent`] envelope carried to subscribers
//! - The [`EventHandler`] trait plugins implement to receive events
//! - The [`EventBus`] with handle-based subscriptions and fire-and-forget
//!   dispatch
//!
//! # Architecture
//!
//! Subscribers register per event-type string. Publishing snapshots the
//! current subscriber list under a read lock and spawns one detached task
//! per subscriber, so a slow or failing subscriber never delays the
//! publisher or its peers. Handler errors are logged and discarded.
//!
//! # Example
//!
//! ```rust
//! use warden_events::{EventBus, FnHandler};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let bus = EventBus::new();
//!
//! let handle = bus.subscribe(
//!     "player.connect",
//!     Arc::new(FnHandler::new("greeter", |event| async move {
//!         println!("player joined: {}", event.payload);
//!         Ok(())
//!     })),
//! );
//!
//! let delivered = bus.publish("player.connect", serde_json::json!({"name": "steve"}));
//! assert_eq!(delivered, 1);
//!
//! bus.unsubscribe(handle);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod bus;
mod event;

pub use bus::{EventBus, SubscriptionId};
pub use event::{EventHandler, FnHandler, HandlerError, PluginEvent};
