//! Handler registry.
//!
//! Handlers are cloned out of the registry before they run, so a handler may
//! register or remove listeners (including itself) without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::warn;

use crate::error::SocketError;
use crate::socket::MessageSocket;

/// Handle returned by every `on_*` registration; pass it to
/// [`MessageSocket::off`] to remove that listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type ConnectHandler = Arc<dyn Fn(&MessageSocket) + Send + Sync>;
pub(crate) type MessageHandler = Arc<dyn Fn(&MessageSocket, &Value) + Send + Sync>;
pub(crate) type ErrorHandler = Arc<dyn Fn(&SocketError) + Send + Sync>;
pub(crate) type CloseHandler = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct Registry {
    connect: Vec<(ListenerId, ConnectHandler)>,
    message: Vec<(ListenerId, MessageHandler)>,
    error: Vec<(ListenerId, ErrorHandler)>,
    close: Vec<(ListenerId, CloseHandler)>,
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl Listeners {
    pub(crate) fn add_connect(&self, handler: ConnectHandler) -> ListenerId {
        let id = self.next_id();
        self.lock().connect.push((id, handler));
        id
    }

    pub(crate) fn add_message(&self, handler: MessageHandler) -> ListenerId {
        let id = self.next_id();
        self.lock().message.push((id, handler));
        id
    }

    pub(crate) fn add_error(&self, handler: ErrorHandler) -> ListenerId {
        let id = self.next_id();
        self.lock().error.push((id, handler));
        id
    }

    pub(crate) fn add_close(&self, handler: CloseHandler) -> ListenerId {
        let id = self.next_id();
        self.lock().close.push((id, handler));
        id
    }

    /// Remove a listener. Returns `false` if `id` was not registered.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut registry = self.lock();
        remove_from(&mut registry.connect, id)
            || remove_from(&mut registry.message, id)
            || remove_from(&mut registry.error, id)
            || remove_from(&mut registry.close, id)
    }

    pub(crate) fn emit_connect(&self, socket: &MessageSocket) {
        let handlers = snapshot(&self.lock().connect);
        for handler in handlers {
            handler(socket);
        }
    }

    pub(crate) fn emit_message(&self, socket: &MessageSocket, message: &Value) {
        let handlers = snapshot(&self.lock().message);
        for handler in handlers {
            handler(socket, message);
        }
    }

    /// Deliver an error to every error listener, or log it when nobody listens.
    pub(crate) fn emit_error(&self, err: &SocketError) {
        let handlers = snapshot(&self.lock().error);
        if handlers.is_empty() {
            warn!(error = %err, "unhandled socket error");
            return;
        }
        for handler in handlers {
            handler(err);
        }
    }

    pub(crate) fn emit_close(&self, had_error: bool) {
        let handlers = snapshot(&self.lock().close);
        for handler in handlers {
            handler(had_error);
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn snapshot<H: Clone>(entries: &[(ListenerId, H)]) -> Vec<H> {
    entries.iter().map(|(_, handler)| handler.clone()).collect()
}

fn remove_from<H>(entries: &mut Vec<(ListenerId, H)>, id: ListenerId) -> bool {
    let before = entries.len();
    entries.retain(|(entry, _)| *entry != id);
    entries.len() != before
}
