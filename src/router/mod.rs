//! The router engine: realms, sessions, the per-peer WAMP session state
//! machine, and the broker submodule that handles `PUBLISH` / `SUBSCRIBE` /
//! `UNSUBSCRIBE`. This is the single authority for all cross-peer state;
//! every mutation of `realms` / `sessions` / `subscriptions` / publication
//! ids is serialized through the `Mutex<RouterState>` below, which plays
//! the role of the single-owner actor described in the design notes —
//! connections run their own I/O in parallel but converge on this lock to
//! touch shared state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, info, trace, warn};
use parity_ws::listen as ws_listen;

use crate::error::{Error, ErrorKind};
use crate::messages::{
    validate_uri, ErrorDetails, HelloDetails, Message, Reason, RouterRoles, ValidationMode,
    WelcomeDetails, URI,
};
use crate::{WampResult, ID};

mod broker;
mod id;
mod messaging;
mod peer;

pub use self::peer::{PeerSink, PeerToken, WsSink};
use self::id::ScopeGenerator;

/// A router-side record coalescing every peer subscribed to one topic in
/// one realm. Invariant: never stored with an empty `subscribers` set —
/// the broker deletes it the moment the last subscriber leaves.
pub(crate) struct Subscription {
    pub(crate) id: ID,
    pub(crate) subscribers: HashSet<PeerToken>,
}

/// An administrative routing namespace. Messages never cross realms; a
/// subscription in one realm is invisible to peers sessioned into another.
pub(crate) struct Realm {
    pub(crate) subscriptions: HashMap<String, Subscription>,
    pub(crate) session_count: usize,
}

impl Realm {
    fn new() -> Realm {
        Realm {
            subscriptions: HashMap::new(),
            session_count: 0,
        }
    }
}

/// One peer's lifetime association with one realm. Its mere presence in
/// `RouterState::sessions` is what the FSM in §4.1 calls `SessionOpen`; a
/// peer with no entry is `NoSession`. The Basic Profile never holds a
/// session in `Closing` long enough to be independently observable — a
/// `GOODBYE` both replies and destroys the session in the same dispatch —
/// so that state is not materialized here.
pub(crate) struct Session {
    pub(crate) id: ID,
    pub(crate) realm: String,
    pub(crate) roles: HashSet<crate::Role>,
}

/// Router-wide settings recognized from the command line (§6).
#[derive(Clone)]
pub struct RouterConfig {
    pub validation_mode: ValidationMode,
    pub auto_create_realms: bool,
    pub default_realm: Option<String>,
    pub abort_on_protocol_violation: bool,
}

impl Default for RouterConfig {
    fn default() -> RouterConfig {
        RouterConfig {
            validation_mode: ValidationMode::default(),
            auto_create_realms: false,
            default_realm: None,
            abort_on_protocol_violation: false,
        }
    }
}

pub(crate) struct RouterState {
    pub(crate) config: RouterConfig,
    pub(crate) realms: HashMap<String, Realm>,
    pub(crate) sessions: HashMap<PeerToken, Session>,
    /// subscription id -> (realm, topic). Subscription ids are router-scope
    /// (unique across the whole process), but two different realms may
    /// legally coalesce the same topic name into independent subscriptions
    /// (§3: "at most one subscription per topic URI **per realm**"), so a
    /// lookup by id alone is not enough to find the right `Subscription` —
    /// the owning realm must be carried alongside the topic and checked
    /// against the caller's own realm before any state is mutated.
    pub(crate) subscription_index: HashMap<ID, (String, String)>,
    pub(crate) publication_ids: HashSet<ID>,
    pub(crate) id_gen: ScopeGenerator,
    peers: HashMap<PeerToken, Arc<dyn PeerSink>>,
    next_peer_token: PeerToken,
}

impl RouterState {
    fn new(config: RouterConfig) -> RouterState {
        let mut realms = HashMap::new();
        if let Some(ref default_realm) = config.default_realm {
            realms.insert(default_realm.clone(), Realm::new());
        }
        RouterState {
            config,
            realms,
            sessions: HashMap::new(),
            subscription_index: HashMap::new(),
            publication_ids: HashSet::new(),
            id_gen: ScopeGenerator::new(),
            peers: HashMap::new(),
            next_peer_token: 1,
        }
    }

    /// The live ids in the *global* scope (§3): session ids and publication
    /// ids share one number space and must not collide with each other.
    fn global_live_ids(&self) -> HashSet<ID> {
        let mut live: HashSet<ID> = self.publication_ids.clone();
        live.extend(self.sessions.values().map(|session| session.id));
        live
    }

    /// Remove every trace of `peer`'s session: the session record itself,
    /// and this peer from every subscription it belonged to, deleting any
    /// subscription that becomes empty. Idempotent — a peer with no open
    /// session is a no-op. Shared by `GOODBYE` handling and `detach`.
    fn purge_session(&mut self, peer: PeerToken) {
        let session = match self.sessions.remove(&peer) {
            Some(session) => session,
            None => return,
        };
        if let Some(realm) = self.realms.get_mut(&session.realm) {
            realm.session_count = realm.session_count.saturating_sub(1);
            let mut emptied = Vec::new();
            for (topic, subscription) in realm.subscriptions.iter_mut() {
                subscription.subscribers.remove(&peer);
                if subscription.subscribers.is_empty() {
                    emptied.push((topic.clone(), subscription.id));
                }
            }
            for (topic, subscription_id) in emptied {
                realm.subscriptions.remove(&topic);
                self.subscription_index.remove(&subscription_id);
            }
        }
        trace!("purged session {} for peer {}", session.id, peer);
    }
}

/// Send `message` to `peer` if it is still attached. Failure to write
/// (peer gone, outbound queue closed) is logged and swallowed — per §5 the
/// router never blocks on a peer and tolerates write failure rather than
/// letting one unreachable peer wedge a dispatch that touches several.
pub(crate) fn reply(state: &RouterState, peer: PeerToken, message: Message) -> WampResult<()> {
    match state.peers.get(&peer) {
        Some(sink) => {
            if let Err(e) = sink.send(&message) {
                warn!("failed to deliver {:?} to peer {}: {}", message, peer, e);
            }
            Ok(())
        }
        None => {
            debug!("dropping {:?}: peer {} is not attached", message, peer);
            Ok(())
        }
    }
}

/// WAMP v2 Basic-Profile router broker. Owns every realm, session,
/// subscription and publication id in the process; see the module
/// documentation for the concurrency model.
pub struct Router {
    state: Arc<Mutex<RouterState>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with default configuration (strict URI validation,
    /// auto-create-realms disabled, no default realm).
    #[inline]
    pub fn new() -> Router {
        Router::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Router {
        Router {
            state: Arc::new(Mutex::new(RouterState::new(config))),
        }
    }

    /// Add a realm to the router. A realm already present is left
    /// untouched (idempotent), matching the teacher's `add_realm`.
    pub fn add_realm(&self, realm: &str) {
        let mut state = self.state.lock().unwrap();
        if state.realms.contains_key(realm) {
            return;
        }
        state.realms.insert(realm.to_string(), Realm::new());
        debug!("added realm {}", realm);
    }

    /// Start listening for WebSocket connections on `url`, on a background
    /// thread, returning its `JoinHandle`.
    pub fn listen(&self, url: &str) -> JoinHandle<()> {
        let router = self.clone();
        let url = url.to_string();
        thread::spawn(move || {
            ws_listen(&url[..], |sender| {
                messaging::ConnectionHandler::new(router.clone(), sender)
            })
            .unwrap();
        })
    }

    /// Associate a newly-accepted connection with an opaque peer token. No
    /// session exists for it yet (`NoSession`, §4.1).
    pub(crate) fn attach(&self, sink: Arc<dyn PeerSink>) -> PeerToken {
        let mut state = self.state.lock().unwrap();
        let token = state.next_peer_token;
        state.next_peer_token += 1;
        state.peers.insert(token, sink);
        debug!("attached peer {}", token);
        token
    }

    /// Called exactly once by the transport adapter when a connection
    /// closes or errors. Purges any open session and forgets the peer
    /// entirely. Idempotent.
    pub(crate) fn detach(&self, peer: PeerToken) {
        let mut state = self.state.lock().unwrap();
        state.purge_session(peer);
        state.peers.remove(&peer);
        debug!("detached peer {}", peer);
    }

    /// Route one inbound decoded message through the session FSM (§4.1).
    pub(crate) fn deliver(&self, peer: PeerToken, message: Message) -> WampResult<()> {
        let mut state = self.state.lock().unwrap();
        dispatch(&mut state, peer, message)
    }

    /// Send `GOODBYE` to every open session and, after a grace period,
    /// close every transport. Used by the process launcher on shutdown.
    pub fn shutdown(&self) {
        let peers: Vec<Arc<dyn PeerSink>> = {
            let state = self.state.lock().unwrap();
            state.peers.values().cloned().collect()
        };
        for sink in &peers {
            sink.send(&Message::Goodbye(ErrorDetails::new(), Reason::SystemShutdown))
                .ok();
        }
        info!("goodbye messages sent to {} peer(s)", peers.len());
        thread::sleep(std::time::Duration::from_secs(5));
        for sink in &peers {
            sink.close();
        }
    }
}

impl Clone for Router {
    fn clone(&self) -> Router {
        Router {
            state: Arc::clone(&self.state),
        }
    }
}

unsafe impl Sync for Router {}

fn dispatch(state: &mut RouterState, peer: PeerToken, message: Message) -> WampResult<()> {
    let has_session = state.sessions.contains_key(&peer);
    match message {
        Message::Hello(realm, details) => {
            if has_session {
                // SessionOpen + HELLO: drop, no reply, session unchanged.
                trace!("ignoring repeated HELLO from peer {} with an open session", peer);
                return Ok(());
            }
            handle_hello(state, peer, realm, details)
        }
        Message::Goodbye(details, reason) => {
            if has_session {
                handle_goodbye(state, peer, details, reason)
            } else {
                // NoSession + GOODBYE: silently drop.
                Ok(())
            }
        }
        Message::Subscribe(request_id, options, topic) => {
            broker::handle_subscribe(state, peer, request_id, options, topic)
        }
        Message::Unsubscribe(request_id, subscription_id) => {
            broker::handle_unsubscribe(state, peer, request_id, subscription_id)
        }
        Message::Publish(request_id, options, topic, args, kwargs) => {
            broker::handle_publish(state, peer, request_id, options, topic, args, kwargs)
        }
        other => protocol_violation(state, peer, has_session, other),
    }
}

/// `HELLO(realm, details)` against a peer with no open session (§4.1).
fn handle_hello(state: &mut RouterState, peer: PeerToken, realm: URI, details: HelloDetails) -> WampResult<()> {
    if !validate_uri(&realm.uri, state.config.validation_mode) {
        return Err(Error::new(ErrorKind::InvalidState("invalid realm uri in HELLO")));
    }
    // §4.3: `HELLO.details.roles` must be a non-empty mapping of declared roles.
    if details.roles().is_empty() {
        return Err(Error::new(ErrorKind::InvalidState("HELLO.details.roles must be non-empty")));
    }

    let realm_name = realm.uri.clone();
    let realm_exists = state.realms.contains_key(&realm_name);
    if !realm_exists {
        if state.config.auto_create_realms {
            state.realms.insert(realm_name.clone(), Realm::new());
            debug!("auto-created realm '{}' on HELLO", realm_name);
        } else {
            warn!("HELLO for unknown realm '{}', auto-create disabled", realm_name);
            return reply(
                state,
                peer,
                Message::Abort(
                    ErrorDetails::new_with_message(&format!(
                        "The realm '{}' does not exist.",
                        realm_name
                    )),
                    Reason::NoSuchRealm,
                ),
            );
        }
    }

    let session_id = {
        let excludes = state.global_live_ids();
        state.id_gen.next(&excludes)
    };
    let roles = details.roles().declared();
    state.sessions.insert(
        peer,
        Session {
            id: session_id,
            realm: realm_name.clone(),
            roles,
        },
    );
    if let Some(realm) = state.realms.get_mut(&realm_name) {
        realm.session_count += 1;
    }
    info!("peer {} opened session {} on realm '{}'", peer, session_id, realm_name);
    reply(
        state,
        peer,
        Message::Welcome(session_id, WelcomeDetails::new(RouterRoles::new())),
    )
}

/// `GOODBYE` against a peer with an open session (§4.1): reply, then purge.
fn handle_goodbye(state: &mut RouterState, peer: PeerToken, _details: ErrorDetails, reason: Reason) -> WampResult<()> {
    info!("peer {} said goodbye ({})", peer, reason);
    reply(
        state,
        peer,
        Message::Goodbye(ErrorDetails::new(), Reason::GoodbyeAndOut),
    )?;
    state.purge_session(peer);
    Ok(())
}

/// Any message outside the set the router implements a handler for (§7.1):
/// RPC/dealer variants while a session is open, or any non-HELLO/GOODBYE
/// message before one exists. Silently dropped, or `ABORT`ed / connection
/// closed when `abort-on-protocol-violation` is configured.
fn protocol_violation(state: &mut RouterState, peer: PeerToken, has_session: bool, message: Message) -> WampResult<()> {
    warn!(
        "protocol violation from peer {} (session open: {}): {:?}",
        peer, has_session, message
    );
    if state.config.abort_on_protocol_violation {
        reply(
            state,
            peer,
            Message::Abort(
                ErrorDetails::new_with_message("Unexpected message for the current session state."),
                Reason::ProtocolViolation,
            ),
        )?;
        state.purge_session(peer);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::peer::support::RecordingSink;
    use super::{PeerToken, Router};

    /// Attach a fresh fake peer, returning its token and a handle kept
    /// outside the router so the test can inspect what it recorded.
    pub(crate) fn attach_recording(router: &Router) -> (PeerToken, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let peer = router.attach(sink.clone());
        (peer, sink)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use crate::messages::{ClientRoles, HelloDetails, Reason, URI};
    use crate::Role;

    use super::test_support::attach_recording;
    use super::*;

    fn roles_of(router: &Router, peer: PeerToken) -> HashSet<Role> {
        router.state.lock().unwrap().sessions.get(&peer).unwrap().roles.clone()
    }

    #[test]
    fn hello_on_known_realm_opens_a_session_and_welcomes() {
        let router = Router::new();
        router.add_realm("default");
        let (peer, sink) = attach_recording(&router);

        router
            .deliver(
                peer,
                Message::Hello(URI::new("default"), HelloDetails::new(ClientRoles::new())),
            )
            .unwrap();

        assert!(matches!(sink.sent().last(), Some(Message::Welcome(_, _))));
        assert_eq!(router.state.lock().unwrap().sessions.len(), 1);
    }

    #[test]
    fn hello_on_unknown_realm_aborts_without_creating_a_session() {
        let router = Router::new();
        router.add_realm("default");
        let (peer, sink) = attach_recording(&router);

        router
            .deliver(
                peer,
                Message::Hello(URI::new("unknown.realm"), HelloDetails::new(ClientRoles::new())),
            )
            .unwrap();

        match sink.sent().last() {
            Some(Message::Abort(_, Reason::NoSuchRealm)) => {}
            other => panic!("expected Abort(.., NoSuchRealm), got {:?}", other),
        }
        assert!(router.state.lock().unwrap().sessions.is_empty());
        assert_eq!(router.state.lock().unwrap().realms.len(), 1);
    }

    #[test]
    fn hello_on_unknown_realm_with_auto_create_opens_a_session() {
        let config = RouterConfig {
            auto_create_realms: true,
            ..RouterConfig::default()
        };
        let router = Router::with_config(config);
        let (peer, sink) = attach_recording(&router);

        router
            .deliver(
                peer,
                Message::Hello(URI::new("fresh.realm"), HelloDetails::new(ClientRoles::new())),
            )
            .unwrap();

        assert!(matches!(sink.sent().last(), Some(Message::Welcome(_, _))));
        assert!(router.state.lock().unwrap().realms.contains_key("fresh.realm"));
    }

    #[test]
    fn repeated_hello_on_open_session_is_a_silent_no_op() {
        let router = Router::new();
        router.add_realm("default");
        let (peer, sink) = attach_recording(&router);
        router
            .deliver(
                peer,
                Message::Hello(URI::new("default"), HelloDetails::new(ClientRoles::new())),
            )
            .unwrap();
        let session_id_before = router.state.lock().unwrap().sessions.get(&peer).unwrap().id;
        let roles_before = roles_of(&router, peer);
        let sent_before = sink.sent().len();

        router
            .deliver(
                peer,
                Message::Hello(URI::new("default"), HelloDetails::new(ClientRoles::new_basic())),
            )
            .unwrap();

        assert_eq!(router.state.lock().unwrap().sessions.len(), 1);
        assert_eq!(router.state.lock().unwrap().sessions.get(&peer).unwrap().id, session_id_before);
        assert_eq!(roles_of(&router, peer), roles_before);
        assert_eq!(sink.sent().len(), sent_before, "a repeated HELLO must not reply");
    }

    #[test]
    fn goodbye_before_hello_is_dropped_and_a_later_hello_still_welcomes() {
        let router = Router::new();
        router.add_realm("default");
        let (peer, sink) = attach_recording(&router);

        router
            .deliver(peer, Message::Goodbye(ErrorDetails::new(), Reason::GoodbyeAndOut))
            .unwrap();
        assert!(sink.sent().is_empty());

        router
            .deliver(
                peer,
                Message::Hello(URI::new("default"), HelloDetails::new(ClientRoles::new())),
            )
            .unwrap();
        assert!(matches!(sink.sent().last(), Some(Message::Welcome(_, _))));
    }

    #[test]
    fn goodbye_on_open_session_replies_and_purges() {
        let router = Router::new();
        router.add_realm("default");
        let (peer, sink) = attach_recording(&router);
        router
            .deliver(
                peer,
                Message::Hello(URI::new("default"), HelloDetails::new(ClientRoles::new())),
            )
            .unwrap();

        router
            .deliver(peer, Message::Goodbye(ErrorDetails::new(), Reason::GoodbyeAndOut))
            .unwrap();

        assert!(matches!(
            sink.sent().last(),
            Some(Message::Goodbye(_, Reason::GoodbyeAndOut))
        ));
        assert!(router.state.lock().unwrap().sessions.is_empty());
    }

    #[test]
    fn detach_purges_subscriptions_for_the_disconnected_peer() {
        use crate::messages::SubscribeOptions;

        let router = Router::new();
        router.add_realm("default");
        let (subscriber, _sink) = attach_recording(&router);
        router
            .deliver(
                subscriber,
                Message::Hello(URI::new("default"), HelloDetails::new(ClientRoles::new())),
            )
            .unwrap();
        router
            .deliver(
                subscriber,
                Message::Subscribe(1, SubscribeOptions::new(), URI::new("topic.x")),
            )
            .unwrap();
        assert_eq!(router.state.lock().unwrap().realms.get("default").unwrap().subscriptions.len(), 1);

        router.detach(subscriber);

        assert!(router.state.lock().unwrap().realms.get("default").unwrap().subscriptions.is_empty());
        assert!(router.state.lock().unwrap().sessions.is_empty());
    }

    #[test]
    fn dealer_messages_on_an_open_session_are_dropped_not_crashed() {
        use crate::messages::{CallOptions, URI as WURI};

        let router = Router::new();
        router.add_realm("default");
        let (peer, sink) = attach_recording(&router);
        router
            .deliver(
                peer,
                Message::Hello(URI::new("default"), HelloDetails::new(ClientRoles::new())),
            )
            .unwrap();

        let before = sink.sent().len();
        router
            .deliver(
                peer,
                Message::Call(2, CallOptions::new(), WURI::new("com.example.proc"), None, None),
            )
            .unwrap();
        assert_eq!(sink.sent().len(), before);
    }

    #[test]
    fn hello_with_no_declared_roles_is_rejected() {
        let router = Router::new();
        router.add_realm("default");
        let (peer, _sink) = attach_recording(&router);

        let result = router.deliver(
            peer,
            Message::Hello(URI::new("default"), HelloDetails::new(ClientRoles::default())),
        );

        assert!(result.is_err());
        assert!(router.state.lock().unwrap().sessions.is_empty());
    }

    #[test]
    fn hello_with_a_malformed_realm_uri_is_rejected() {
        let router = Router::new();
        let (peer, _sink) = attach_recording(&router);

        let result = router.deliver(
            peer,
            Message::Hello(URI::new("Not.A.Valid.Uri"), HelloDetails::new(ClientRoles::new())),
        );

        assert!(result.is_err());
        assert!(router.state.lock().unwrap().sessions.is_empty());
    }
}
