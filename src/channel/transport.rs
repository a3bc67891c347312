//! Frame transports underneath reply endpoints.
//!
//! The supervisor never talks to sockets directly. It binds a
//! [`ChannelFactory`] address, accepts exactly one peer on the resulting
//! [`Binding`], and drives the accepted [`FrameIo`] through a
//! [`ReplyEndpoint`](super::endpoint::ReplyEndpoint). Production code uses
//! [`LocalSocketFactory`]; tests substitute in-memory fakes.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::debug;

use super::address::ChannelAddress;
use super::codec::FrameCodec;
use crate::{AppError, Result};

/// Boxed, sendable future returned by transport trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bidirectional frame stream connected to exactly one peer.
pub trait FrameIo: Send {
    /// Wait for the next complete frame from the peer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Recv` on transport failure or when the peer closed
    /// the connection.
    fn recv_frame(&mut self) -> BoxFuture<'_, Result<Bytes>>;

    /// Write one frame to the peer and flush it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Send` on transport failure.
    fn send_frame(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>>;
}

/// A bound address waiting for its worker to connect.
pub trait Binding: Send {
    /// Accept the next peer connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bind` if the listener fails.
    fn accept(&mut self) -> BoxFuture<'_, Result<Box<dyn FrameIo>>>;
}

/// Creates exclusive bindings for worker channel addresses.
pub trait ChannelFactory: Send + Sync {
    /// Bind `address` exclusively.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bind` if the address is invalid or already taken.
    fn bind(&self, address: &ChannelAddress) -> Result<Box<dyn Binding>>;
}

/// [`FrameIo`] over any async byte stream using [`FrameCodec`].
pub struct FramedIo<S> {
    framed: Framed<S, FrameCodec>,
}

impl<S> FramedIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap `stream` with length-delimited framing.
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
        }
    }
}

impl<S> FrameIo for FramedIo<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn recv_frame(&mut self) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            match self.framed.next().await {
                Some(Ok(frame)) => Ok(frame.freeze()),
                Some(Err(AppError::Io(msg))) => Err(AppError::Recv(msg)),
                Some(Err(err)) => Err(err),
                None => Err(AppError::Recv("peer closed the channel".into())),
            }
        })
    }

    fn send_frame(&mut self, frame: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.framed.send(frame).await.map_err(|err| match err {
                AppError::Io(msg) => AppError::Send(msg),
                other => other,
            })
        })
    }
}

/// Production [`ChannelFactory`] backed by `interprocess` local sockets.
///
/// Addresses live in the namespaced local-socket space: the abstract
/// namespace on Linux, a named pipe on Windows, and a socket file under the
/// temp directory elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSocketFactory;

impl ChannelFactory for LocalSocketFactory {
    fn bind(&self, address: &ChannelAddress) -> Result<Box<dyn Binding>> {
        let name = address
            .as_str()
            .to_owned()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| AppError::Bind(format!("invalid channel address '{address}': {err}")))?;

        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .map_err(|err| AppError::Bind(format!("failed to bind '{address}': {err}")))?;

        debug!(%address, "reply channel bound");

        Ok(Box::new(LocalSocketBinding {
            address: address.clone(),
            listener,
        }))
    }
}

/// Listener half of a [`LocalSocketFactory`] binding.
struct LocalSocketBinding {
    address: ChannelAddress,
    listener: interprocess::local_socket::tokio::Listener,
}

impl Binding for LocalSocketBinding {
    fn accept(&mut self) -> BoxFuture<'_, Result<Box<dyn FrameIo>>> {
        Box::pin(async move {
            let stream = self.listener.accept().await.map_err(|err| {
                AppError::Bind(format!("accept on '{}' failed: {err}", self.address))
            })?;
            debug!(address = %self.address, "worker connected to reply channel");
            Ok(Box::new(FramedIo::new(stream)) as Box<dyn FrameIo>)
        })
    }
}

/// Connect to a bound channel address as the requesting peer.
///
/// # Errors
///
/// Returns `AppError::Bind` if the name is invalid or nothing listens on it.
pub async fn connect_local(address: &str) -> Result<Box<dyn FrameIo>> {
    let name = address
        .to_owned()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Bind(format!("invalid channel address '{address}': {err}")))?;

    let stream = interprocess::local_socket::tokio::Stream::connect(name)
        .await
        .map_err(|err| AppError::Bind(format!("failed to connect to '{address}': {err}")))?;

    Ok(Box::new(FramedIo::new(stream)))
}
