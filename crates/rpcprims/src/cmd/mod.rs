use clap::{Args, Subcommand};

use rpcprims::DEFAULT_PORT;
use rpcprims_transport::DEFAULT_RPC_PATH;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod call;
pub mod methods;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the Arith RPC server.
    Serve(ServeArgs),
    /// Call a method on a running server.
    Call(CallArgs),
    /// List the methods the server registers.
    Methods(MethodsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Call(args) => call::run(args, format),
        Command::Methods(args) => methods::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on.
    #[arg(long, short = 'p', env = "RPCPRIMS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// Path of the CONNECT endpoint.
    #[arg(long, default_value = DEFAULT_RPC_PATH)]
    pub path: String,
    /// Largest call or reply payload in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Fully qualified method, e.g. Arith.Multiply.
    pub method: String,
    /// Server address.
    #[arg(long, short = 'a', env = "RPCPRIMS_ADDR", default_value = "127.0.0.1:9279")]
    pub addr: String,
    /// Path of the CONNECT endpoint.
    #[arg(long, default_value = DEFAULT_RPC_PATH)]
    pub path: String,
    /// JSON arguments.
    #[arg(long, default_value = "{}")]
    pub json: String,
    /// Treat the method as streaming and print every reply.
    #[arg(long)]
    pub stream: bool,
    /// Connect and upgrade timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Give up when no reply arrives for this long (e.g. 30s).
    #[arg(long)]
    pub reply_timeout: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MethodsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
