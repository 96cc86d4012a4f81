//! Wire types for the mediator: the tagged-union session protocol, the
//! pack/unpack envelope codec, and the forward-message onion codec.
//!
//! The connection-establishment handshake and mediation-coordination wire
//! formats are intentionally loose here — the core only needs a typed shape
//! to dispatch on once the envelope has been unpacked, not a byte-exact
//! Aries RFC encoding.

pub mod envelope;
pub mod forward;
pub mod messages;

pub use envelope::{recipient_kids, Envelope, EnvelopeError, KeyPair};
pub use forward::{forward_wired, ForwardMessage, FORWARD_MSG_TYPE};
pub use messages::*;
