//! The `Arith` service: integer arithmetic plus a fault-injecting stream,
//! used to exercise clients against normal replies, mid-stream failures and
//! wrongly typed frames.

use std::time::Duration;

use rpcprims_rpc::{RegistrationError, Registry, ReplyEmitter, RpcError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Service name the methods are registered under.
pub const SERVICE: &str = "Arith";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Args {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Quotient {
    pub quo: i64,
    pub rem: i64,
}

/// Sleep length in milliseconds. Zero or negative returns at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SleepArgs {
    pub duration: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IncrementArgs {
    pub num: u64,
}

/// Arguments of `Arith.Thrive`.
///
/// `error_at` and `bad_type_at` only have an effect when they fall inside
/// `0..count`; use `-1` to disable them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamingArgs {
    pub a: i64,
    pub count: i64,
    pub error_at: i64,
    pub bad_type_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct StreamingReply {
    pub c: i64,
    pub index: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ArithError {
    #[error("divide by zero")]
    DivideByZero,

    /// Injected by `Thrive` at `ErrorAt`.
    #[error("triggered error in middle")]
    TriggeredError,

    /// A reply could not be written.
    #[error(transparent)]
    Emit(#[from] RpcError),
}

/// The stateless handlers behind the `Arith` methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct Arith;

impl Arith {
    pub fn multiply(args: Args) -> i64 {
        args.a.wrapping_mul(args.b)
    }

    /// Truncating division; the remainder takes the sign of the dividend.
    pub fn divide(args: Args) -> Result<Quotient, ArithError> {
        if args.b == 0 {
            return Err(ArithError::DivideByZero);
        }
        Ok(Quotient {
            quo: args.a.wrapping_div(args.b),
            rem: args.a.wrapping_rem(args.b),
        })
    }

    pub fn increment(args: IncrementArgs) -> u64 {
        args.num.wrapping_add(1)
    }

    /// Suspend the calling task only; other calls keep running.
    pub async fn sleep(args: SleepArgs) -> bool {
        if let Ok(millis) = u64::try_from(args.duration) {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        true
    }

    /// Stream `{C: A, Index: i}` for `i` in `0..Count`.
    ///
    /// At `ErrorAt` the call fails before anything is sent for that index.
    /// At `BadTypeAt` a zero-valued `StreamingArgs` goes out first, in its own
    /// slot, followed by the regular reply for the index.
    pub async fn thrive(
        args: StreamingArgs,
        mut out: ReplyEmitter<StreamingReply>,
    ) -> Result<(), ArithError> {
        for i in 0..args.count.max(0) {
            if i == args.error_at {
                debug!(seq = out.seq(), index = i, "injecting stream error");
                return Err(ArithError::TriggeredError);
            }
            if i == args.bad_type_at {
                debug!(seq = out.seq(), index = i, "injecting mistyped reply");
                out.emit_value(&StreamingArgs::default()).await?;
            }
            out.emit(&StreamingReply { c: args.a, index: i }).await?;
        }
        Ok(())
    }
}

/// Register every `Arith` method.
pub fn register(registry: &mut Registry) -> Result<(), RegistrationError> {
    registry.register_unary(SERVICE, "Multiply", |args: Args| async move {
        Ok::<_, ArithError>(Arith::multiply(args))
    })?;
    registry.register_unary(SERVICE, "Divide", |args: Args| async move {
        Arith::divide(args)
    })?;
    registry.register_unary(SERVICE, "Sleep", |args: SleepArgs| async move {
        Ok::<_, ArithError>(Arith::sleep(args).await)
    })?;
    registry.register_unary(SERVICE, "Increment", |args: IncrementArgs| async move {
        Ok::<_, ArithError>(Arith::increment(args))
    })?;
    registry.register_streaming(SERVICE, "Thrive", Arith::thrive)?;
    Ok(())
}

/// A registry holding only the `Arith` service.
pub fn registry() -> Result<Registry, RegistrationError> {
    let mut registry = Registry::new();
    register(&mut registry)?;
    Ok(registry)
}
