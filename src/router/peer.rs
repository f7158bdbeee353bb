//! Peer handle abstraction.
//!
//! The router addresses an inbound connection through an opaque token
//! assigned at `attach()` time, long before any WAMP session exists for it
//! (a HELLO for an unknown realm still needs somewhere to send ABORT). This
//! token is never serialized on the wire and is unrelated to the WAMP
//! session `id`, which is drawn from the global Id scope only once HELLO is
//! accepted.

use std::fmt;

use parity_ws::Sender as WsSender;

use crate::error::{Error, ErrorKind};
use crate::messages::Message;
use crate::WampResult;

pub type PeerToken = u64;

/// Everything the router needs to address one connected peer, without
/// depending on the concrete transport.
pub trait PeerSink: Send + Sync {
    fn send(&self, message: &Message) -> WampResult<()>;

    /// Tear down the underlying transport. Best-effort; errors are not
    /// actionable once the router has decided to disconnect a peer.
    fn close(&self);
}

/// Production sink backed by a `parity_ws` WebSocket sender.
pub struct WsSink {
    sender: WsSender,
}

impl WsSink {
    pub fn new(sender: WsSender) -> WsSink {
        WsSink { sender }
    }
}

impl PeerSink for WsSink {
    fn send(&self, message: &Message) -> WampResult<()> {
        let text = serde_json::to_string(message)?;
        self.sender
            .send(text)
            .map_err(|e| Error::new(ErrorKind::WSError(e)))
    }

    fn close(&self) {
        self.sender.shutdown().ok();
    }
}

impl fmt::Debug for WsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSink").finish()
    }
}

/// In-process fake peer used by router unit tests; records every message it
/// would have sent, in order, so tests can assert on outbound traffic
/// without a real socket. Tests keep their own `Arc<RecordingSink>` handle
/// alongside the one handed to `Router::attach` (coerced to `Arc<dyn
/// PeerSink>`), so there is no need to downcast a trait object back out of
/// the router to inspect it.
#[cfg(test)]
pub(crate) mod support {
    use std::sync::Mutex;

    use crate::messages::Message;
    use crate::WampResult;

    use super::PeerSink;

    #[derive(Default)]
    pub struct RecordingSink {
        sent: Mutex<Vec<Message>>,
        closed: Mutex<bool>,
    }

    impl RecordingSink {
        pub fn new() -> RecordingSink {
            RecordingSink::default()
        }

        pub fn sent(&self) -> Vec<Message> {
            self.sent.lock().unwrap().iter().map(roundtrip).collect()
        }

        pub fn was_closed(&self) -> bool {
            *self.closed.lock().unwrap()
        }
    }

    impl PeerSink for RecordingSink {
        fn send(&self, message: &Message) -> WampResult<()> {
            self.sent.lock().unwrap().push(roundtrip(message));
            Ok(())
        }

        fn close(&self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    // `Message` has no `Clone` impl (its field types aren't all `Clone`), so
    // the recorder keeps its own copy by round-tripping through JSON rather
    // than adding `Clone` derives across the wire model for test-only needs.
    fn roundtrip(message: &Message) -> Message {
        let text = serde_json::to_string(message).expect("recording sink: message must serialize");
        serde_json::from_str(&text).expect("recording sink: message must round-trip")
    }
}
