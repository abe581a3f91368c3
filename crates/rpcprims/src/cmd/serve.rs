use rpcprims::{Server, ServerConfig};
use rpcprims_transport::ServerLifecycle;
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{io_error, server_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let config = server_config(&args)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    runtime.block_on(async {
        let lifecycle = ServerLifecycle::new();
        let server = Server::bind_arith(&config, lifecycle.clone())
            .await
            .map_err(|err| server_error("bind failed", err))?;

        let on_signal = lifecycle.clone();
        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        info!("interrupt received, terminating");
                        on_signal.terminate();
                    }
                    Err(err) => warn!(error = %err, "signal handler setup failed"),
                },
                _ = on_signal.terminated() => {}
            }
        });

        server
            .run()
            .await
            .map_err(|err| server_error("server failed", err))?;
        lifecycle.terminate();
        Ok::<_, CliError>(SUCCESS)
    })
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    if !args.path.starts_with('/') {
        return Err(CliError::new(USAGE, "--path must start with '/'"));
    }
    let mut config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        rpc_path: args.path.clone(),
        ..ServerConfig::default()
    };
    if let Some(max) = args.max_payload {
        if max == 0 {
            return Err(CliError::new(USAGE, "--max-payload must be greater than zero"));
        }
        config.dispatcher.max_payload_size = max;
    }
    Ok(config)
}
