//! A WAMP v2 Basic-Profile router broker: realms, sessions and publish/subscribe
//! routing between peers. The dealer (RPC) role is not implemented; see
//! `router` for the session state machine and broker.

mod error;
mod messages;
pub mod router;

use self::error::*;

pub use messages::{Dict, List, MatchingPolicy, Reason, Role, ValidationMode, Value, URI};
pub use router::Router;

pub type WampResult<T> = Result<T, Error>;
pub type ID = u64;
