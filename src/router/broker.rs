//! Publish/subscribe routing: `SUBSCRIBE`, `UNSUBSCRIBE`, `PUBLISH`.
//!
//! Subscriptions coalesce on exact topic match within a realm — there is no
//! pattern-based matching here, unlike the dealer/broker trie this module
//! replaces. At most one subscription exists per `(realm, topic)` pair;
//! every subscriber of it shares that single subscription id.

use std::collections::HashSet;

use log::{debug, trace, warn};

use crate::error::{Error, ErrorKind};
use crate::messages::{
    validate_uri, Dict, ErrorType, EventDetails, List, Message, PublishOptions, Reason, Role,
    SubscribeOptions, URI,
};
use crate::{WampResult, ID};

use super::peer::PeerToken;
use super::{reply, Realm, RouterState, Subscription};

fn session_realm(state: &RouterState, peer: PeerToken) -> Option<String> {
    state.sessions.get(&peer).map(|session| session.realm.clone())
}

fn session_has_role(state: &RouterState, peer: PeerToken, role: Role) -> bool {
    state
        .sessions
        .get(&peer)
        .map(|session| session.roles.contains(&role))
        .unwrap_or(false)
}

fn no_role_error(error_type: ErrorType, request_id: ID, uri: &str) -> Message {
    Message::Error(
        error_type,
        request_id,
        Dict::new(),
        Reason::CustomReason(URI::new(uri)),
        None,
        None,
    )
}

pub(crate) fn handle_subscribe(
    state: &mut RouterState,
    peer: PeerToken,
    request_id: ID,
    _options: SubscribeOptions,
    topic: URI,
) -> WampResult<()> {
    let realm_name = match session_realm(state, peer) {
        Some(realm) => realm,
        None => return Ok(()), // ifSessionOpen guard: no session, silently drop
    };

    if !session_has_role(state, peer, Role::Subscriber) {
        return reply(
            state,
            peer,
            no_role_error(ErrorType::Subscribe, request_id, "akka.wamp.error.no_subscriber_role"),
        );
    }

    if !validate_uri(&topic.uri, state.config.validation_mode) {
        return Err(Error::new(ErrorKind::InvalidState("invalid topic uri in SUBSCRIBE")));
    }

    {
        let realm: &mut Realm = state
            .realms
            .get_mut(&realm_name)
            .expect("a session's realm always exists in the realms table");
        if let Some(subscription) = realm.subscriptions.get_mut(&topic.uri) {
            subscription.subscribers.insert(peer);
            let subscription_id = subscription.id;
            trace!(
                "peer {} joined existing subscription {} on '{}'",
                peer,
                subscription_id,
                topic.uri
            );
            return reply(state, peer, Message::Subscribed(request_id, subscription_id));
        }
    }

    let subscription_id = {
        let excludes: HashSet<ID> = state.subscription_index.keys().cloned().collect();
        state.id_gen.next(&excludes)
    };

    let realm: &mut Realm = state
        .realms
        .get_mut(&realm_name)
        .expect("a session's realm always exists in the realms table");
    let mut subscribers = HashSet::new();
    subscribers.insert(peer);
    realm.subscriptions.insert(
        topic.uri.clone(),
        Subscription {
            id: subscription_id,
            subscribers,
        },
    );
    state
        .subscription_index
        .insert(subscription_id, (realm_name.clone(), topic.uri.clone()));

    debug!(
        "peer {} created subscription {} on '{}'",
        peer, subscription_id, topic.uri
    );
    reply(state, peer, Message::Subscribed(request_id, subscription_id))
}

pub(crate) fn handle_unsubscribe(
    state: &mut RouterState,
    peer: PeerToken,
    request_id: ID,
    subscription_id: ID,
) -> WampResult<()> {
    let realm_name = match session_realm(state, peer) {
        Some(realm) => realm,
        None => return Ok(()),
    };

    // The index is keyed by subscription id alone but two different realms
    // may coalesce the same topic name into independent subscriptions, so an
    // id found in the index must also be checked against the caller's own
    // realm before anything is mutated — otherwise a stale or foreign id
    // could resolve, by topic string, to some other realm's subscription of
    // the same name.
    let owning_realm = state.subscription_index.get(&subscription_id).cloned();
    let topic = match owning_realm {
        Some((ref realm, ref topic)) if *realm == realm_name => topic.clone(),
        _ => {
            return reply(
                state,
                peer,
                Message::Error(
                    ErrorType::Unsubscribe,
                    request_id,
                    Dict::new(),
                    Reason::NoSuchSubscription,
                    None,
                    None,
                ),
            );
        }
    };

    if let Some(realm) = state.realms.get_mut(&realm_name) {
        let now_empty = match realm.subscriptions.get_mut(&topic) {
            Some(subscription) => {
                subscription.subscribers.remove(&peer);
                subscription.subscribers.is_empty()
            }
            None => false,
        };
        if now_empty {
            realm.subscriptions.remove(&topic);
            state.subscription_index.remove(&subscription_id);
        }
    }

    debug!("peer {} unsubscribed from subscription {}", peer, subscription_id);
    reply(state, peer, Message::Unsubscribed(request_id))
}

pub(crate) fn handle_publish(
    state: &mut RouterState,
    peer: PeerToken,
    request_id: ID,
    options: PublishOptions,
    topic: URI,
    args: Option<List>,
    kwargs: Option<Dict>,
) -> WampResult<()> {
    let realm_name = match session_realm(state, peer) {
        Some(realm) => realm,
        None => return Ok(()),
    };

    let ack = options.should_acknowledge();

    if !session_has_role(state, peer, Role::Publisher) {
        return if ack {
            reply(
                state,
                peer,
                no_role_error(ErrorType::Publish, request_id, "akka.wamp.error.no_publisher_role"),
            )
        } else {
            Ok(())
        };
    }

    if !validate_uri(&topic.uri, state.config.validation_mode) {
        return Err(Error::new(ErrorKind::InvalidState("invalid topic uri in PUBLISH")));
    }

    let publication_id = {
        let excludes = state.global_live_ids();
        state.id_gen.next(&excludes)
    };
    state.publication_ids.insert(publication_id);

    let subscription = state
        .realms
        .get(&realm_name)
        .and_then(|realm| realm.subscriptions.get(&topic.uri))
        .map(|subscription| (subscription.id, subscription.subscribers.clone()));

    if let Some((subscription_id, subscribers)) = subscription {
        for subscriber in subscribers.into_iter().filter(|&s| s != peer) {
            let event = Message::Event(
                subscription_id,
                publication_id,
                EventDetails::new(),
                args.clone(),
                kwargs.clone(),
            );
            if reply(state, subscriber, event).is_err() {
                warn!(
                    "dropping unreachable subscriber {} on subscription {}",
                    subscriber, subscription_id
                );
            }
        }
    }

    trace!("peer {} published to '{}' (publication {})", peer, topic.uri, publication_id);

    if ack {
        reply(state, peer, Message::Published(request_id, publication_id))
    } else {
        Ok(())
    }
}
