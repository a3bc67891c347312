//! Reply endpoint with enforced receive/send alternation.
//!
//! A [`ReplyEndpoint`] is the responder side of a request/reply channel. It
//! must receive before it may send, and after sending it must receive again.
//! The current position is tracked explicitly in [`EndpointState`]; any call
//! made in the wrong state is rejected with `AppError::OutOfOrder` instead of
//! being queued or forwarded to the transport.
//!
//! ```text
//!            receive()
//!   AwaitingRequest ──────▶ AwaitingReply
//!          ▲                      │
//!          └──────── send() ──────┘
//! ```

use std::fmt::{Debug, Formatter};

use bytes::Bytes;

use super::transport::FrameIo;
use crate::{AppError, Result};

/// Position of a [`ReplyEndpoint`] in its alternation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Next legal call is `receive`.
    AwaitingRequest,
    /// A request was received; next legal call is `send`.
    AwaitingReply,
    /// The transport was dropped; nothing is legal.
    Closed,
}

/// Responder side of a strict request/reply channel.
pub struct ReplyEndpoint {
    io: Option<Box<dyn FrameIo>>,
    state: EndpointState,
}

impl ReplyEndpoint {
    /// Wrap an accepted transport. The endpoint starts in
    /// [`EndpointState::AwaitingRequest`].
    #[must_use]
    pub fn new(io: Box<dyn FrameIo>) -> Self {
        Self {
            io: Some(io),
            state: EndpointState::AwaitingRequest,
        }
    }

    /// Current alternation state.
    #[must_use]
    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// Whether a received request is still waiting for its reply.
    #[must_use]
    pub fn has_pending_request(&self) -> bool {
        self.state == EndpointState::AwaitingReply
    }

    /// Receive the next request from the peer.
    ///
    /// # Errors
    ///
    /// - `AppError::OutOfOrder` if the previous request has not been answered.
    /// - `AppError::Recv` if the endpoint is closed or the transport fails.
    pub async fn receive(&mut self) -> Result<Bytes> {
        match self.state {
            EndpointState::AwaitingRequest => {}
            EndpointState::AwaitingReply => {
                return Err(AppError::OutOfOrder(
                    "receive called while a request is still awaiting its reply".into(),
                ));
            }
            EndpointState::Closed => return Err(AppError::Recv("endpoint closed".into())),
        }

        let io = self
            .io
            .as_mut()
            .ok_or_else(|| AppError::Recv("endpoint closed".into()))?;
        let frame = io.recv_frame().await?;
        self.state = EndpointState::AwaitingReply;
        Ok(frame)
    }

    /// Answer the request received last.
    ///
    /// # Errors
    ///
    /// - `AppError::OutOfOrder` if there is no received request to answer.
    /// - `AppError::Send` if the endpoint is closed or the transport fails.
    pub async fn send(&mut self, payload: Bytes) -> Result<()> {
        match self.state {
            EndpointState::AwaitingReply => {}
            EndpointState::AwaitingRequest => {
                return Err(AppError::OutOfOrder(
                    "send called without a pending request".into(),
                ));
            }
            EndpointState::Closed => return Err(AppError::Send("endpoint closed".into())),
        }

        let io = self
            .io
            .as_mut()
            .ok_or_else(|| AppError::Send("endpoint closed".into()))?;
        io.send_frame(payload).await?;
        self.state = EndpointState::AwaitingRequest;
        Ok(())
    }

    /// Drop the transport. Idempotent.
    pub fn close(&mut self) {
        self.io = None;
        self.state = EndpointState::Closed;
    }
}

impl Debug for ReplyEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyEndpoint")
            .field("state", &self.state)
            .field("open", &self.io.is_some())
            .finish()
    }
}
