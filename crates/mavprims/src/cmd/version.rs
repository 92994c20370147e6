use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("mavprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: mavprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("MAVPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: async={}, serial={}, cli=true",
        cfg!(feature = "async"),
        cfg!(feature = "serial")
    );
    println!(
        "defaults: own_system_id={}, own_component_id={}",
        mavprims_system::CoreConfig::default().own_system_id,
        mavprims_system::CoreConfig::default().own_component_id
    );

    Ok(SUCCESS)
}
