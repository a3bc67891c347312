//! Requesting side of a worker reply channel.
//!
//! Workers written in Rust use [`RequestClient`] to talk to the supervisor.
//! It mirrors the supervisor endpoint's discipline: every `send` must be
//! followed by exactly one `receive` before the next `send`.

use bytes::Bytes;

use super::handshake::{READY_ACK, READY_TOKEN};
use super::transport::{connect_local, FrameIo};
use crate::{AppError, Result};

/// Client alternation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Idle,
    AwaitingReply,
}

/// Requester peer of a [`ReplyEndpoint`](super::endpoint::ReplyEndpoint).
pub struct RequestClient {
    io: Box<dyn FrameIo>,
    state: ClientState,
}

impl RequestClient {
    /// Connect to the supervisor's bound channel address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bind` if nothing is listening on `address`.
    pub async fn connect(address: &str) -> Result<Self> {
        Ok(Self::from_io(connect_local(address).await?))
    }

    /// Wrap an already connected transport.
    #[must_use]
    pub fn from_io(io: Box<dyn FrameIo>) -> Self {
        Self {
            io,
            state: ClientState::Idle,
        }
    }

    /// Send one request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::OutOfOrder` if the previous reply was not read yet,
    /// or `AppError::Send` on transport failure.
    pub async fn send(&mut self, payload: Bytes) -> Result<()> {
        if self.state == ClientState::AwaitingReply {
            return Err(AppError::OutOfOrder(
                "send called before the previous reply was received".into(),
            ));
        }
        self.io.send_frame(payload).await?;
        self.state = ClientState::AwaitingReply;
        Ok(())
    }

    /// Read the reply to the last request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::OutOfOrder` if no request is outstanding, or
    /// `AppError::Recv` on transport failure.
    pub async fn receive(&mut self) -> Result<Bytes> {
        if self.state == ClientState::Idle {
            return Err(AppError::OutOfOrder(
                "receive called without an outstanding request".into(),
            ));
        }
        let reply = self.io.recv_frame().await?;
        self.state = ClientState::Idle;
        Ok(reply)
    }

    /// Send a request and wait for its reply.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`send`](Self::send) and
    /// [`receive`](Self::receive).
    pub async fn request(&mut self, payload: Bytes) -> Result<Bytes> {
        self.send(payload).await?;
        self.receive().await
    }

    /// Announce readiness and wait for the supervisor's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Recv` if the acknowledgement is not [`READY_ACK`].
    pub async fn announce_ready(&mut self) -> Result<()> {
        let ack = self.request(Bytes::from_static(READY_TOKEN)).await?;
        if ack.as_ref() == READY_ACK {
            Ok(())
        } else {
            Err(AppError::Recv(format!(
                "unexpected readiness acknowledgement: {}",
                String::from_utf8_lossy(&ack)
            )))
        }
    }
}
