//! # Signal Bus Module
//!
//! The [`SignalBus`] facade ties the registry, the ordering engine and the
//! dispatch engine together.
//!
//! ## Overview
//!
//! - Publishers send typed values; subscribers register handlers per type
//! - Synchronous sends reach synchronous handlers, asynchronous sends reach
//!   asynchronous handlers
//! - Handlers may register, deregister and send other types while running;
//!   changes to the type being dispatched take effect after the dispatch
//! - Buses can be arranged in a hierarchy for broadcasts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signalbus_core::{signal_bus, SignalHandler};
//!
//! struct Connected { port: String }
//!
//! let handler = SignalHandler::new(|signal: &Connected| {
//!     println!("connected on {}", signal.port);
//! });
//! let token = signal_bus().register(handler)?;
//!
//! signal_bus().send(&Connected { port: "/dev/ttyUSB0".into() })?;
//!
//! signal_bus().deregister_token(&token);
//! ```

mod hierarchy;
mod pooled;
mod signal_bus;

pub use pooled::PooledSignal;
pub use signal_bus::{init_signal_bus, signal_bus, SignalBus, SignalBusBuilder};
