use mavprims_system::ParamValue;

use crate::cmd::{open_session, parse_duration, ParamCommand, ParamGetArgs, ParamSetArgs};
use crate::exit::{engine_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_param, OutputFormat};

pub fn run(command: ParamCommand, format: OutputFormat) -> CliResult<i32> {
    match command {
        ParamCommand::Get(args) => get(args, format),
        ParamCommand::Set(args) => set(args, format),
    }
}

fn get(args: ParamGetArgs, format: OutputFormat) -> CliResult<i32> {
    let discover_timeout = parse_duration(&args.engine.discover_timeout)?;
    let session = open_session(std::slice::from_ref(&args.url), args.engine.core_config()?)?;
    let system = session.wait_for_system(discover_timeout)?;

    let result = system.get_param(&args.name);
    let system_id = system.system_id();
    drop(system);
    session.registry.shutdown();

    let value = result.map_err(|err| engine_error(&format!("get {}", args.name), err))?;
    print_param(&args.name, value, system_id, format);
    Ok(SUCCESS)
}

fn set(args: ParamSetArgs, format: OutputFormat) -> CliResult<i32> {
    let value = parse_value(&args.value, args.int)?;
    let discover_timeout = parse_duration(&args.engine.discover_timeout)?;
    let session = open_session(std::slice::from_ref(&args.url), args.engine.core_config()?)?;
    let system = session.wait_for_system(discover_timeout)?;

    let result = system.set_param(&args.name, value);
    let system_id = system.system_id();
    drop(system);
    session.registry.shutdown();

    result.map_err(|err| engine_error(&format!("set {}", args.name), err))?;
    print_param(&args.name, value, system_id, format);
    Ok(SUCCESS)
}

fn parse_value(input: &str, int: bool) -> CliResult<ParamValue> {
    let invalid = || CliError::new(USAGE, format!("invalid parameter value: {input}"));
    if int {
        input.parse().map(ParamValue::Int32).map_err(|_| invalid())
    } else {
        input.parse().map(ParamValue::Float).map_err(|_| invalid())
    }
}
