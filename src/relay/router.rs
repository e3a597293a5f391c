//! Command name → handler registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::relay::error::RelayError;
use crate::relay::update::IncomingMessage;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RelayError>> + Send + 'a>>;

/// A command handler. Handlers do their own sends through the context.
pub type CommandHandler<C> = for<'a> fn(&'a C, &'a IncomingMessage) -> HandlerFuture<'a>;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("handler for command /{0} already registered")]
    DuplicateCommand(String),
    #[error("no handler for command /{0}")]
    UnknownCommand(String),
    #[error("error occurred when running cmd: {command}: {source}")]
    Handler {
        command: String,
        #[source]
        source: RelayError,
    },
}

pub struct CommandRouter<C> {
    commands: HashMap<String, CommandHandler<C>>,
}

impl<C> CommandRouter<C> {
    pub fn new() -> Self {
        Self { commands: HashMap::new() }
    }

    /// Register a handler. Registering the same name twice is an error; callers
    /// treat it as fatal at startup.
    pub fn register(&mut self, name: &str, handler: CommandHandler<C>) -> Result<(), RouterError> {
        if self.commands.contains_key(name) {
            return Err(RouterError::DuplicateCommand(name.to_string()));
        }
        self.commands.insert(name.to_string(), handler);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub async fn dispatch(&self, name: &str, ctx: &C, msg: &IncomingMessage) -> Result<(), RouterError> {
        let handler = self
            .commands
            .get(name)
            .ok_or_else(|| RouterError::UnknownCommand(name.to_string()))?;

        handler(ctx, msg).await.map_err(|source| RouterError::Handler {
            command: name.to_string(),
            source,
        })
    }
}

impl<C> Default for CommandRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::update::ChatKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        calls: AtomicUsize,
    }

    fn count<'a>(ctx: &'a Counter, _msg: &'a IncomingMessage) -> HandlerFuture<'a> {
        Box::pin(async move {
            ctx.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn fail<'a>(_ctx: &'a Counter, _msg: &'a IncomingMessage) -> HandlerFuture<'a> {
        Box::pin(async move { Err(RelayError::NoDestination) })
    }

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: 1,
            chat_id: 1,
            chat_kind: ChatKind::Private,
            from: None,
            text: text.to_string(),
            date: chrono::Utc::now(),
            reply_to: None,
            membership_change: false,
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut router = CommandRouter::<Counter>::new();
        router.register("start", count).unwrap();
        let err = router.register("start", fail).unwrap_err();
        assert!(matches!(err, RouterError::DuplicateCommand(ref name) if name == "start"));
        assert!(router.contains("start"));
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let mut router = CommandRouter::<Counter>::new();
        router.register("start", count).unwrap();
        let ctx = Counter::default();

        router.dispatch("start", &ctx, &message("/start")).await.unwrap();
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_names_command() {
        let mut router = CommandRouter::<Counter>::new();
        router.register("start", count).unwrap();
        let ctx = Counter::default();

        let err = router.dispatch("nope", &ctx, &message("/nope")).await.unwrap_err();
        assert!(matches!(err, RouterError::UnknownCommand(_)));
        assert!(err.to_string().contains("/nope"));
        assert_eq!(ctx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_wrapped_with_command() {
        let mut router = CommandRouter::<Counter>::new();
        router.register("broken", fail).unwrap();
        let ctx = Counter::default();

        let err = router.dispatch("broken", &ctx, &message("/broken")).await.unwrap_err();
        assert!(matches!(err, RouterError::Handler { ref command, .. } if command == "broken"));
        assert!(err.to_string().contains("broken"));
    }
}
