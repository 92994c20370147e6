use std::time::Duration;

use mavprims_frame::{ids, FrameConfig};

/// Settings for one link registry and every system it creates.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// System id stamped on every outbound frame. Default: 245.
    pub own_system_id: u8,
    /// Component id stamped on every outbound frame. Default: 190 (ground station).
    pub own_component_id: u8,
    pub system: SystemConfig,
    /// Decoder settings handed to every link.
    pub frame: FrameConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            own_system_id: 245,
            own_component_id: ids::COMP_ID_MISSIONPLANNER,
            system: SystemConfig::default(),
            frame: FrameConfig::default(),
        }
    }
}

/// Per-system timing.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Period of our own heartbeat. Default: 1 s.
    pub heartbeat_interval: Duration,
    /// Silence after which the system counts as lost. Default: 3 s.
    pub heartbeat_timeout: Duration,
    /// Worker period while connected. Default: 10 ms.
    pub tick_connected: Duration,
    /// Worker period while not connected. Default: 100 ms.
    pub tick_disconnected: Duration,
    /// AUTOPILOT_VERSION requests before falling back to the system id. Default: 3.
    pub autopilot_version_attempts: u32,
    /// How long to wait for AUTOPILOT_VERSION after a request was accepted. Default: 500 ms.
    pub autopilot_version_window: Duration,
    pub command: CommandConfig,
    pub param: ParamConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(3),
            tick_connected: Duration::from_millis(10),
            tick_disconnected: Duration::from_millis(100),
            autopilot_version_attempts: 3,
            autopilot_version_window: Duration::from_millis(500),
            command: CommandConfig::default(),
            param: ParamConfig::default(),
        }
    }
}

/// Command engine settings.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Wait for an acknowledgement before re-sending. Default: 500 ms.
    pub timeout: Duration,
    /// Re-sends after the first attempt. Default: 3.
    pub retries: u32,
    /// Default: 32.
    pub max_queued: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            retries: 3,
            max_queued: 32,
        }
    }
}

/// Parameter engine settings.
#[derive(Debug, Clone)]
pub struct ParamConfig {
    /// Wait for PARAM_VALUE before giving up. Default: 1 s.
    pub timeout: Duration,
    /// Re-sends after the first attempt. Default: 0.
    pub retries: u32,
    /// Per queue (set and get). Default: 64.
    pub max_queued: usize,
}

impl Default for ParamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            retries: 0,
            max_queued: 64,
        }
    }
}
