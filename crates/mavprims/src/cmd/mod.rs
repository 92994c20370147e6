use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Subcommand};
use mavprims_system::{CoreConfig, LinkRegistry, System, SystemEvent};

use crate::exit::{link_error, CliError, CliResult, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod command;
pub mod monitor;
pub mod param;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print discovery and connection events.
    Monitor(MonitorArgs),
    /// Send one COMMAND_LONG and wait for its acknowledgement.
    Command(CommandArgs),
    /// Read or write a parameter.
    #[command(subcommand)]
    Param(ParamCommand),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Monitor(args) => monitor::run(args, format),
        Command::Command(args) => command::run(args, format),
        Command::Param(cmd) => param::run(cmd, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Connection URLs (udp://:14540, udpout://host:port, tcp://host:port, serial:///dev/ttyX:57600).
    #[arg(required = true)]
    pub urls: Vec<String>,
    /// Stop after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CommandArgs {
    /// Connection URL.
    pub url: String,
    /// Command id (e.g. 400 for arm/disarm).
    #[arg(long)]
    pub id: u16,
    #[command(flatten)]
    pub params: CommandParams,
    /// Target component. Default: the discovered component.
    #[arg(long)]
    pub target_component: Option<u8>,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug, Default)]
pub struct CommandParams {
    #[arg(long)]
    pub param1: Option<f32>,
    #[arg(long)]
    pub param2: Option<f32>,
    #[arg(long)]
    pub param3: Option<f32>,
    #[arg(long)]
    pub param4: Option<f32>,
    #[arg(long)]
    pub param5: Option<f32>,
    #[arg(long)]
    pub param6: Option<f32>,
    #[arg(long)]
    pub param7: Option<f32>,
}

impl CommandParams {
    pub fn values(&self) -> [Option<f32>; 7] {
        [
            self.param1,
            self.param2,
            self.param3,
            self.param4,
            self.param5,
            self.param6,
            self.param7,
        ]
    }
}

#[derive(Subcommand, Debug)]
pub enum ParamCommand {
    /// Read one parameter by name.
    Get(ParamGetArgs),
    /// Write one parameter by name.
    Set(ParamSetArgs),
}

#[derive(Args, Debug)]
pub struct ParamGetArgs {
    /// Connection URL.
    pub url: String,
    /// Parameter name (at most 16 bytes).
    pub name: String,
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Args, Debug)]
pub struct ParamSetArgs {
    /// Connection URL.
    pub url: String,
    /// Parameter name (at most 16 bytes).
    pub name: String,
    /// New value.
    #[arg(allow_negative_numbers = true)]
    pub value: String,
    /// Send the value as a 32-bit integer instead of a float.
    #[arg(long)]
    pub int: bool,
    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Engine tunables shared by the request subcommands.
#[derive(Args, Debug, Default)]
pub struct EngineArgs {
    /// Wait this long for discovery (e.g. 10s).
    #[arg(long, default_value = "10s")]
    pub discover_timeout: String,
    /// Command acknowledgement timeout (e.g. 500ms).
    #[arg(long)]
    pub command_timeout: Option<String>,
    /// Command re-sends after the first attempt.
    #[arg(long)]
    pub retries: Option<u32>,
    /// Parameter reply timeout (e.g. 2s).
    #[arg(long)]
    pub param_timeout: Option<String>,
}

impl EngineArgs {
    pub fn core_config(&self) -> CliResult<CoreConfig> {
        let mut config = CoreConfig::default();
        if let Some(timeout) = &self.command_timeout {
            config.system.command.timeout = parse_duration(timeout)?;
        }
        if let Some(retries) = self.retries {
            config.system.command.retries = retries;
        }
        if let Some(timeout) = &self.param_timeout {
            config.system.param.timeout = parse_duration(timeout)?;
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Registry with its event stream, subscribed before any link is opened.
pub struct Session {
    pub registry: LinkRegistry,
    pub events: Receiver<SystemEvent>,
}

pub fn open_session(urls: &[String], config: CoreConfig) -> CliResult<Session> {
    let registry = LinkRegistry::new(config);
    let (tx, events) = mpsc::channel();
    registry.subscribe(move |event| {
        let _ = tx.send(*event);
    });
    for url in urls {
        registry
            .add_connection(url)
            .map_err(|err| link_error(&format!("open {url}"), err))?;
    }
    Ok(Session { registry, events })
}

impl Session {
    /// Block until a system is discovered, or fail after `timeout`.
    pub fn wait_for_system(&self, timeout: Duration) -> CliResult<Arc<System>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(SystemEvent::Discovered { uuid, .. }) => {
                    if let Some(system) = self.registry.system_by_uuid(uuid) {
                        return Ok(system);
                    }
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("no system discovered within {timeout:?}"),
                    ));
                }
            }
        }
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
