use std::time::Duration;

use rpcprims_frame::FrameConfig;
use rpcprims_rpc::{Client, ClientConfig, RpcError};
use rpcprims_transport::ConnectConfig;
use serde_json::Value;

use crate::cmd::CallArgs;
use crate::exit::{rpc_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_reply, print_stream_summary, OutputFormat, ReplyOutput, StreamSummary};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let params: Value = serde_json::from_str(&args.json)
        .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
    let config = client_config(&args)?;

    let mut client = Client::connect_with_config(&args.addr, &config)
        .map_err(|err| rpc_error("connect failed", err))?;

    let code = if args.stream {
        stream(&mut client, &args.method, &params, format)?
    } else {
        let seq = client
            .send_call(&args.method, &params)
            .map_err(|err| rpc_error("call failed", err))?;
        let reply: Value = client
            .wait_unary(seq)
            .map_err(|err| rpc_error("call failed", err))?;
        print_reply(
            &ReplyOutput {
                method: &args.method,
                seq,
                index: None,
                reply: &reply,
            },
            format,
        );
        SUCCESS
    };

    client
        .close()
        .map_err(|err| rpc_error("close failed", err))?;
    Ok(code)
}

/// Print every reply of a streamed call. A remote failure is reported in the
/// summary and turns into a failing exit code.
fn stream(
    client: &mut Client,
    method: &str,
    params: &Value,
    format: OutputFormat,
) -> CliResult<i32> {
    let mut replies = client
        .stream::<_, Value>(method, params)
        .map_err(|err| rpc_error("call failed", err))?;
    let seq = replies.seq();

    let mut failure = None;
    while let Some(item) = replies.next() {
        match item {
            Ok(reply) => print_reply(
                &ReplyOutput {
                    method,
                    seq,
                    index: Some(replies.delivered().saturating_sub(1)),
                    reply: &reply,
                },
                format,
            ),
            Err(RpcError::Remote { message, .. }) => failure = Some(message),
            Err(err) => return Err(rpc_error("stream failed", err)),
        }
    }

    print_stream_summary(
        &StreamSummary {
            method,
            seq,
            delivered: replies.delivered(),
            error: failure.as_deref(),
        },
        format,
    );
    Ok(if failure.is_some() { FAILURE } else { SUCCESS })
}

fn client_config(args: &CallArgs) -> CliResult<ClientConfig> {
    let timeout = parse_duration(&args.timeout)?;
    let reply_timeout = args
        .reply_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    Ok(ClientConfig {
        connect: ConnectConfig {
            path: args.path.clone(),
            timeout,
        },
        frame: FrameConfig {
            read_timeout: reply_timeout,
            ..FrameConfig::default()
        },
    })
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn reply_timeout_is_optional() {
        let args = CallArgs {
            method: "Arith.Sleep".into(),
            addr: "127.0.0.1:9279".into(),
            path: "/_rpc_".into(),
            json: "{}".into(),
            stream: false,
            timeout: "1s".into(),
            reply_timeout: None,
        };
        let config = client_config(&args).unwrap();
        assert_eq!(config.connect.timeout, Duration::from_secs(1));
        assert_eq!(config.frame.read_timeout, None);

        let config = client_config(&CallArgs {
            reply_timeout: Some("250ms".into()),
            ..args
        })
        .unwrap();
        assert_eq!(config.frame.read_timeout, Some(Duration::from_millis(250)));
    }
}
