use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rpcprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: rpcprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RPCPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "rustc: {}",
        option_env!("RPCPRIMS_RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("frame_magic: RP");
    println!(
        "default_max_payload: {}",
        rpcprims_frame::DEFAULT_MAX_PAYLOAD
    );

    Ok(SUCCESS)
}
