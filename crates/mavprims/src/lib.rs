//! Client-side engine for the MAVLink protocol.
//!
//! mavprims talks to autopilots, cameras and other MAVLink participants over
//! UDP, TCP or serial links. It discovers remote systems from their
//! heartbeats, sends commands with acknowledgement and retry, and gets and
//! sets parameters by name.
//!
//! # Crate Structure
//!
//! - [`frame`]: v1/v2 framing, incremental decoder, common-dialect messages
//! - [`transport`]: UDP, TCP and serial links with their receive threads
//! - [`system`]: Link registry, per-system dispatch, timeouts, discovery and engines

/// Re-export frame types.
pub mod frame {
    pub use mavprims_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use mavprims_transport::*;
}

/// Re-export system types.
pub mod system {
    pub use mavprims_system::*;
}

pub use mavprims_system::{
    Command, CommandResult, CoreConfig, EngineError, LinkRegistry, ParamResult, ParamValue,
    System, SystemEvent,
};
