use futures::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_serde::formats::SymmetricalBincode;
use tokio_serde::SymmetricallyFramed;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use std::net::SocketAddr;

pub type Reader<T> =
    SymmetricallyFramed<FramedRead<TcpStream, LengthDelimitedCodec>, T, SymmetricalBincode<T>>;

pub type Writer<T> =
    SymmetricallyFramed<FramedWrite<TcpStream, LengthDelimitedCodec>, T, SymmetricalBincode<T>>;

/// The receiving end of a one-way framed connection.
pub struct Inbound<T> {
    peer: SocketAddr,
    reader: Reader<T>,
}

impl<T> Inbound<T>
where
    T: DeserializeOwned + Unpin,
{
    pub fn wrap(socket: TcpStream, peer: SocketAddr) -> Self {
        let reader = FramedRead::new(socket, LengthDelimitedCodec::new());
        Inbound { peer, reader: SymmetricallyFramed::new(reader, SymmetricalBincode::default()) }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the next frame, or `None` once the remote end has closed the connection.
    pub async fn recv(&mut self) -> std::io::Result<Option<T>> {
        self.reader.try_next().await
    }
}

/// The sending end of a one-way framed connection.
pub struct Outbound<T> {
    writer: Writer<T>,
}

impl<T> Outbound<T>
where
    T: Serialize + Unpin,
{
    pub async fn connect<A: ToSocketAddrs>(address: A) -> std::io::Result<Self> {
        let socket = TcpStream::connect(address).await?;
        let writer = FramedWrite::new(socket, LengthDelimitedCodec::new());
        Ok(Outbound { writer: SymmetricallyFramed::new(writer, SymmetricalBincode::default()) })
    }

    pub async fn send(&mut self, item: T) -> std::io::Result<()> {
        self.writer.send(item).await
    }

    /// Flushes pending frames and shuts down the write half.
    pub async fn close(mut self) -> std::io::Result<()> {
        self.writer.close().await
    }
}
