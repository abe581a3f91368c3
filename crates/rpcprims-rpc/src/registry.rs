use std::collections::HashMap;
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::emitter::{ReplyChannel, ReplyEmitter};
use crate::error::{CallError, RegistrationError};

type UnaryFuture = BoxFuture<'static, Result<Value, CallError>>;
type StreamingFuture = BoxFuture<'static, Result<(), CallError>>;
type UnaryFn = dyn Fn(Value) -> UnaryFuture + Send + Sync;
type StreamingFn = dyn Fn(Value, ReplyChannel) -> StreamingFuture + Send + Sync;

/// Type-erased handler. Arguments are decoded and replies encoded inside the
/// closure, against the types fixed at registration.
pub(crate) enum MethodHandler {
    Unary(Box<UnaryFn>),
    Streaming(Box<StreamingFn>),
}

/// Whether a method answers once or streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    Streaming,
}

impl Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Unary => f.write_str("unary"),
            MethodKind::Streaming => f.write_str("streaming"),
        }
    }
}

/// A registered method. Immutable once registered.
pub struct MethodDescriptor {
    name: String,
    argument_shape: &'static str,
    reply_shape: &'static str,
    pub(crate) handler: MethodHandler,
}

impl MethodDescriptor {
    /// Fully qualified name, `Service.Method`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the argument.
    pub fn argument_shape(&self) -> &'static str {
        self.argument_shape
    }

    /// Rust type name of each reply value.
    pub fn reply_shape(&self) -> &'static str {
        self.reply_shape
    }

    pub fn kind(&self) -> MethodKind {
        match self.handler {
            MethodHandler::Unary(_) => MethodKind::Unary,
            MethodHandler::Streaming(_) => MethodKind::Streaming,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.kind() == MethodKind::Streaming
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("argument_shape", &self.argument_shape)
            .field("reply_shape", &self.reply_shape)
            .finish()
    }
}

/// Name → handler table, filled once at startup.
///
/// After registration the registry is shared read-only (behind an `Arc`) by
/// every connection, so lookups take no lock.
#[derive(Default)]
pub struct Registry {
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request/response method.
    ///
    /// The handler takes the decoded argument and resolves to the reply or an
    /// error whose `Display` text is sent to the caller.
    pub fn register_unary<A, R, E, F, Fut>(
        &mut self,
        service: &str,
        method: &str,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let name = qualified_name(service, method)?;
        let method_name = name.clone();
        let erased: Box<UnaryFn> = Box::new(move |args: Value| -> UnaryFuture {
            let name = method_name.clone();
            let call = decode_args::<A>(&name, args).map(&handler);
            Box::pin(async move {
                let reply = call?
                    .await
                    .map_err(|err| CallError::Application(err.to_string()))?;
                serde_json::to_value(reply).map_err(|err| CallError::Encode {
                    method: name,
                    reason: err.to_string(),
                })
            })
        });
        self.insert(MethodDescriptor {
            name,
            argument_shape: std::any::type_name::<A>(),
            reply_shape: std::any::type_name::<R>(),
            handler: MethodHandler::Unary(erased),
        })
    }

    /// Register a server-streamed method.
    ///
    /// The handler owns a [`ReplyEmitter`] for the duration of the call and
    /// resolves to the call's final status.
    pub fn register_streaming<A, R, E, F, Fut>(
        &mut self,
        service: &str,
        method: &str,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(A, ReplyEmitter<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        let name = qualified_name(service, method)?;
        let method_name = name.clone();
        let erased: Box<StreamingFn> =
            Box::new(move |args: Value, channel: ReplyChannel| -> StreamingFuture {
                let call = decode_args::<A>(&method_name, args)
                    .map(|args| handler(args, ReplyEmitter::new(channel)));
                Box::pin(async move {
                    call?
                        .await
                        .map_err(|err| CallError::Application(err.to_string()))
                })
            });
        self.insert(MethodDescriptor {
            name,
            argument_shape: std::any::type_name::<A>(),
            reply_shape: std::any::type_name::<R>(),
            handler: MethodHandler::Streaming(erased),
        })
    }

    /// Look up a method by its fully qualified name.
    pub fn resolve(&self, name: &str) -> Result<Arc<MethodDescriptor>, CallError> {
        self.methods
            .get(name)
            .cloned()
            .ok_or_else(|| CallError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// All registered methods, sorted by name.
    pub fn descriptors(&self) -> Vec<&MethodDescriptor> {
        let mut all: Vec<&MethodDescriptor> = self.methods.values().map(Arc::as_ref).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    fn insert(&mut self, descriptor: MethodDescriptor) -> Result<(), RegistrationError> {
        if self.methods.contains_key(&descriptor.name) {
            return Err(RegistrationError::Duplicate(descriptor.name));
        }
        self.methods.insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptors()).finish()
    }
}

fn decode_args<A: DeserializeOwned>(method: &str, args: Value) -> Result<A, CallError> {
    serde_json::from_value(args).map_err(|err| CallError::Decode {
        method: method.to_string(),
        reason: err.to_string(),
    })
}

fn qualified_name(service: &str, method: &str) -> Result<String, RegistrationError> {
    validate_name("service", service)?;
    validate_name("method", method)?;
    Ok(format!("{service}.{method}"))
}

/// Names must be exported identifiers: an uppercase ASCII letter followed by
/// ASCII letters, digits or `_`.
fn validate_name(part: &'static str, name: &str) -> Result<(), RegistrationError> {
    let invalid = |reason: &'static str| RegistrationError::InvalidName {
        part,
        name: name.to_string(),
        reason,
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("empty")),
        Some(first) if !first.is_ascii_uppercase() => {
            return Err(invalid("must start with an uppercase ASCII letter"))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only ASCII letters, digits and '_' are allowed"));
    }
    Ok(())
}
