//! The transport adapter: bridges one accepted WebSocket connection to the
//! router engine. Per connection this performs the `wamp.2.json` subprotocol
//! handshake, attaches a peer handle, decodes each inbound text frame into a
//! `Message` and hands it to `Router::deliver`, and detaches exactly once on
//! close or fatal error.

use std::sync::Arc;

use log::{debug, error, trace, warn};
use parity_ws::{
    CloseCode, Error as WSError, ErrorKind as WSErrorKind, Handler, Message as WSMessage, Request,
    Response, Result as WSResult, Sender,
};

use crate::messages::Message;

use super::peer::{PeerToken, WsSink};
use super::Router;

/// The only subprotocol this router accepts. MessagePack (`wamp.2.msgpack`)
/// is a non-goal; an offer that omits `wamp.2.json` is rejected outright.
pub(crate) static WAMP_JSON: &str = "wamp.2.json";

pub(crate) struct ConnectionHandler {
    router: Router,
    sender: Sender,
    peer: PeerToken,
}

impl ConnectionHandler {
    pub(crate) fn new(router: Router, sender: Sender) -> ConnectionHandler {
        let peer = router.attach(Arc::new(WsSink::new(sender.clone())));
        ConnectionHandler { router, sender, peer }
    }

    fn terminate_connection(&mut self) -> WSResult<()> {
        self.router.detach(self.peer);
        self.sender.close(CloseCode::Normal)
    }
}

impl Handler for ConnectionHandler {
    /// Negotiate the `wamp.2.json` subprotocol. §4.5/§6: handshake rejection
    /// replies HTTP 400 if the offer doesn't include it; no other subprotocol
    /// (in particular `wamp.2.msgpack`) is ever selected.
    fn on_request(&mut self, request: &Request) -> WSResult<Response> {
        let mut response = Response::from_request(request)?;
        let protocols = request.protocols()?;
        if protocols.iter().any(|p| *p == WAMP_JSON) {
            response.set_protocol(WAMP_JSON);
            debug!("peer {}: negotiated subprotocol {}", self.peer, WAMP_JSON);
            Ok(response)
        } else {
            warn!("peer {}: handshake offered no {} subprotocol", self.peer, WAMP_JSON);
            Err(WSError::new(
                WSErrorKind::Protocol,
                format!("{} subprotocol not offered", WAMP_JSON),
            ))
        }
    }

    /// One text frame carries exactly one WAMP message (§4.5). Binary frames
    /// and anything that fails to decode are a fatal session error: the
    /// transport is closed without an in-band reply, since the peer may not
    /// be able to parse one either.
    fn on_message(&mut self, msg: WSMessage) -> WSResult<()> {
        let payload = match msg {
            WSMessage::Text(payload) => payload,
            WSMessage::Binary(_) => {
                error!("peer {}: binary frame is a protocol error under wamp.2.json", self.peer);
                return self.terminate_connection();
            }
        };

        let message: Message = match serde_json::from_str(&payload) {
            Ok(message) => message,
            Err(e) => {
                error!("peer {}: malformed WAMP message: {}", self.peer, e);
                return self.terminate_connection();
            }
        };

        trace!("peer {}: received {:?}", self.peer, message);
        if let Err(e) = self.router.deliver(self.peer, message) {
            error!("peer {}: {}", self.peer, e);
            return self.terminate_connection();
        }
        Ok(())
    }

    fn on_close(&mut self, _code: CloseCode, _reason: &str) {
        trace!("peer {}: connection closed", self.peer);
        self.router.detach(self.peer);
    }

    fn on_error(&mut self, err: WSError) {
        warn!("peer {}: transport error: {}", self.peer, err);
        self.router.detach(self.peer);
    }
}
