//! Message handler capability
//!
//! The event loop calls the handler once per complete inbound frame, before
//! any ACK goes out. The message is borrowed for the duration of the call;
//! handlers that need the payload afterwards copy it.

use super::registry::ClientId;
use framelink_codec::Message;

/// Receives every framed message the server decodes
pub trait MessageHandler {
    fn on_message(&mut self, client: ClientId, message: &Message);
}

impl<F> MessageHandler for F
where
    F: FnMut(ClientId, &Message),
{
    fn on_message(&mut self, client: ClientId, message: &Message) {
        self(client, message)
    }
}

/// Handler that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl MessageHandler for NoopHandler {
    fn on_message(&mut self, _client: ClientId, _message: &Message) {}
}
