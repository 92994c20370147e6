//! Per-system protocol machinery for mavprims.
//!
//! A [`LinkRegistry`] owns the links and creates one [`System`] per remote
//! (system id, component id). Each system carries:
//! - A dispatch table of message handlers grouped by owner [`Token`]
//! - A timeout scheduler and a periodic-call scheduler polled from its worker tick
//! - Heartbeat loss detection and identity discovery
//! - A [`CommandEngine`] (one command in flight, retries, FIFO)
//! - A [`ParamEngine`] (one request in flight, sets before gets)
//!
//! Shutting a system down fails every pending request with
//! [`EngineError::ConnectionError`].
//!
//! Locks are never held while a handler, timeout or completion callback
//! runs, so callbacks may register and unregister freely.
//!
//! # Example
//!
//! ```no_run
//! use mavprims_system::{Command, CoreConfig, LinkRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = LinkRegistry::new(CoreConfig::default());
//! registry.add_connection("udp://:14540")?;
//!
//! if let Some(system) = registry.system() {
//!     system.send_command(Command::new(400).param(1, 1.0))?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod link;
pub mod params;
pub mod periodic;
pub mod plugin;
pub mod sender;
mod sync;
pub mod system;
pub mod timeout;
pub mod token;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{Command, CommandEngine, CommandState};
pub use config::{CommandConfig, CoreConfig, ParamConfig, SystemConfig};
pub use dispatch::{DispatchTable, MessageHandler};
pub use error::{CommandResult, EngineError, LinkError, ParamResult};
pub use events::{EventHub, SystemEvent};
pub use link::LinkRegistry;
pub use params::{ParamEngine, ParamValue};
pub use periodic::PeriodicScheduler;
pub use plugin::Plugin;
pub use sender::{FrameSender, Outbound};
pub use system::{System, SystemCore};
pub use timeout::TimeoutScheduler;
pub use token::{Token, TokenAllocator};
