//! Request/reply channels between the supervisor and its workers.
//!
//! Submodules:
//! - `address`: per-worker channel names and their allocator.
//! - `codec`: length-delimited framing with a maximum frame size.
//! - `transport`: the [`FrameIo`]/[`Binding`]/[`ChannelFactory`] seams and
//!   the `interprocess` local-socket implementation.
//! - `endpoint`: the responder state machine enforcing alternation.
//! - `handshake`: the readiness exchange run right after spawn.
//! - `client`: the requester side used by workers.

pub mod address;
pub mod client;
pub mod codec;
pub mod endpoint;
pub mod handshake;
pub mod transport;

pub use address::{AddressAllocator, ChannelAddress};
pub use endpoint::{EndpointState, ReplyEndpoint};
pub use transport::{Binding, ChannelFactory, FrameIo, LocalSocketFactory};
