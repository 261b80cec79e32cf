// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The multiplexer is transport-agnostic: anything that can be split into
//! an async read half and an async write half of length-delimited frames
//! can carry connections. TCP and Unix sockets are provided for embedding
//! and local testing; a WebSocket adapter is the HTTP layer's to supply.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};

pub trait DuplexTransport: Send + 'static {
    type Reader: AsyncRead + Send + Unpin + 'static;
    type Writer: AsyncWrite + Send + Unpin + 'static;

    fn into_split(self) -> (Self::Reader, Self::Writer);
}

impl DuplexTransport for TcpStream {
    type Reader = tokio::net::tcp::OwnedReadHalf;
    type Writer = tokio::net::tcp::OwnedWriteHalf;

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        TcpStream::into_split(self)
    }
}

impl DuplexTransport for UnixStream {
    type Reader = tokio::net::unix::OwnedReadHalf;
    type Writer = tokio::net::unix::OwnedWriteHalf;

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        UnixStream::into_split(self)
    }
}

/// In-memory pipe, used by tests to drive a full connection without a
/// socket.
impl DuplexTransport for tokio::io::DuplexStream {
    type Reader = tokio::io::ReadHalf<tokio::io::DuplexStream>;
    type Writer = tokio::io::WriteHalf<tokio::io::DuplexStream>;

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        tokio::io::split(self)
    }
}
