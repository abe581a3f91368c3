use rpcprims::arith;

use crate::cmd::MethodsArgs;
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_methods, OutputFormat};

pub fn run(_args: MethodsArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = arith::registry()
        .map_err(|err| CliError::new(INTERNAL, format!("registration failed: {err}")))?;
    print_methods(&registry.descriptors(), format);
    Ok(SUCCESS)
}
