use mavprims_system::Command as MavCommand;

use crate::cmd::{open_session, parse_duration, CommandArgs};
use crate::exit::{engine_error, CliResult, SUCCESS};
use crate::output::{print_command_result, OutputFormat};

pub fn run(args: CommandArgs, format: OutputFormat) -> CliResult<i32> {
    let discover_timeout = parse_duration(&args.engine.discover_timeout)?;
    let session = open_session(std::slice::from_ref(&args.url), args.engine.core_config()?)?;
    let system = session.wait_for_system(discover_timeout)?;

    let mut command = MavCommand::new(args.id);
    for (index, value) in args.params.values().into_iter().enumerate() {
        if let Some(value) = value {
            command = command.param(index + 1, value);
        }
    }
    if let Some(component) = args.target_component {
        command = command.target_component(component);
    }

    let result = system.send_command(command);
    let system_id = system.system_id();
    drop(system);
    session.registry.shutdown();

    result.map_err(|err| engine_error(&format!("command {}", args.id), err))?;
    print_command_result(args.id, system_id, format);
    Ok(SUCCESS)
}
