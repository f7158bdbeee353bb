use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::is_not;

/// The roles a client declares in `HELLO.Details.roles`. Each field is
/// `None` when the client did not advertise that role at all — this is how
/// a session's declared-role *subset* (§3 Role) survives the round trip,
/// rather than every peer always carrying all four roles.
#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct ClientRoles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<PublisherRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber: Option<SubscriberRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<CallerRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callee: Option<CalleeRole>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct RouterRoles {
    pub broker: BrokerRole,
}

/// A peer's role within a realm. Not carried on the wire directly; derived
/// from the `roles` dict a client advertises in `HELLO.Details` and used
/// internally to decide which message kinds a session may send.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Role {
    Publisher,
    Subscriber,
    Caller,
    Callee,
    Broker,
    Dealer,
}

/**************************
          Roles
**************************/
#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct PublisherRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<HashMap<String, bool>>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct CallerRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<HashMap<String, bool>>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct CalleeRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<HashMap<String, bool>>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct SubscriberRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<SubscriberFeatures>,
}
#[derive(Serialize, Deserialize, PartialEq, Debug, Default)]
pub struct SubscriberFeatures {
    #[serde(skip_serializing_if = "is_not", default)]
    pattern_based_subscription: bool,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct BrokerRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<BrokerFeatures>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct BrokerFeatures {
    #[serde(skip_serializing_if = "is_not", default)]
    pattern_based_subscription: bool,
}

/**************************
      Implementations
**************************/

impl RouterRoles {
    /// The set of roles this router advertises in `WELCOME.Details.roles`.
    /// Only the broker role is supported; pattern-based subscription is not
    /// implemented so the feature flag is always omitted.
    #[inline]
    pub fn new() -> RouterRoles {
        RouterRoles {
            broker: BrokerRole { features: None },
        }
    }

    #[inline]
    pub fn new_basic() -> RouterRoles {
        RouterRoles::new()
    }
}

impl ClientRoles {
    /// A client that declares all four roles (used by the router's own
    /// tests and by `examples/` callers that want "can do anything").
    #[inline]
    pub fn new() -> ClientRoles {
        ClientRoles {
            publisher: Some(PublisherRole {
                features: Some(HashMap::new()),
            }),
            subscriber: Some(SubscriberRole {
                features: Some(SubscriberFeatures {
                    pattern_based_subscription: true,
                }),
            }),
            caller: Some(CallerRole {
                features: Some(HashMap::new()),
            }),
            callee: Some(CalleeRole {
                features: Some(HashMap::new()),
            }),
        }
    }

    #[inline]
    pub fn new_basic() -> ClientRoles {
        ClientRoles {
            publisher: Some(PublisherRole {
                features: Some(HashMap::new()),
            }),
            subscriber: Some(SubscriberRole {
                features: Some(SubscriberFeatures {
                    pattern_based_subscription: false,
                }),
            }),
            caller: Some(CallerRole {
                features: Some(HashMap::new()),
            }),
            callee: Some(CalleeRole {
                features: Some(HashMap::new()),
            }),
        }
    }

    /// The declared-role subset this client advertised, per §3 Role.
    pub fn declared(&self) -> HashSet<Role> {
        let mut roles = HashSet::new();
        if self.publisher.is_some() {
            roles.insert(Role::Publisher);
        }
        if self.subscriber.is_some() {
            roles.insert(Role::Subscriber);
        }
        if self.caller.is_some() {
            roles.insert(Role::Caller);
        }
        if self.callee.is_some() {
            roles.insert(Role::Callee);
        }
        roles
    }

    /// §4.3: `HELLO.details.roles` must be a non-empty mapping.
    pub fn is_empty(&self) -> bool {
        self.publisher.is_none()
            && self.subscriber.is_none()
            && self.caller.is_none()
            && self.callee.is_none()
    }
}

impl Default for RouterRoles {
    fn default() -> RouterRoles {
        RouterRoles::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn declared_reflects_only_present_roles() {
        let roles = ClientRoles {
            publisher: Some(PublisherRole { features: None }),
            subscriber: None,
            caller: None,
            callee: None,
        };
        let declared = roles.declared();
        assert!(declared.contains(&Role::Publisher));
        assert!(!declared.contains(&Role::Subscriber));
        assert_eq!(declared.len(), 1);
    }

    #[test]
    fn empty_roles_is_rejected_by_is_empty() {
        let roles = ClientRoles {
            publisher: None,
            subscriber: None,
            caller: None,
            callee: None,
        };
        assert!(roles.is_empty());
        assert!(!ClientRoles::new().is_empty());
    }
}
