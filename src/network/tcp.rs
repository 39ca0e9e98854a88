use std::io;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::FutureExt;
use tokio::net::TcpStream;
use tracing::instrument;

use crate::{
    encode::{encode_with_length, ToByte},
    error::{Error, Result},
};

use super::{BrokerAddress, BrokerConnection};

/// TCP connection to a single Kafka broker.
///
/// Typically this would not be used directly. The [`crate::client::Client`]
/// leases these from a pool for each request.
#[derive(Debug)]
pub struct TcpConnection {
    addr: BrokerAddress,
    stream: TcpStream,
}

impl TcpConnection {
    pub fn addr(&self) -> &BrokerAddress {
        &self.addr
    }

    /// Local port of the socket, zero if it is no longer bound.
    pub fn local_port(&self) -> u16 {
        self.stream
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or_default()
    }

    #[instrument(name = "network-read", level = "trace", skip(self))]
    async fn read(&mut self, size: usize) -> Result<BytesMut> {
        let mut buf = BytesMut::zeroed(size);
        let mut index = 0_usize;
        while index < size {
            // Wait for the socket to be readable
            self.stream.readable().await?;

            // Try to read data, this may still fail with `WouldBlock`
            // if the readiness event is a false positive.
            match self.stream.try_read(&mut buf[index..]) {
                Ok(0) => {
                    tracing::error!("ERROR: {} closed the connection mid frame", self.addr);
                    return Err(Error::IoError(io::ErrorKind::UnexpectedEof));
                }
                Ok(n) => {
                    index += n;
                    tracing::trace!("Read {} bytes, {} left", n, size - index);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tracing::trace!("WouldBlock on read");
                    continue;
                }
                Err(e) => {
                    tracing::error!("ERROR: Reading on Socket {:?}", e);
                    return Err(Error::IoError(e.kind()));
                }
            }
        }
        Ok(buf)
    }

    #[instrument(name = "network-write", level = "trace", skip(self, buf))]
    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        let size = buf.len();
        let mut index = 0_usize;
        while index < size {
            // Wait for the socket to be writable
            self.stream.writable().await?;

            match self.stream.try_write(&buf[index..]) {
                Ok(n) => {
                    index += n;
                    tracing::trace!("Wrote {} bytes, {} left", n, size - index);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tracing::trace!("WouldBlock on write");
                    continue;
                }
                Err(e) => {
                    tracing::error!("ERROR: Writing to Socket {:?}", e);
                    return Err(Error::IoError(e.kind()));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for TcpConnection {
    /// Connect to a Kafka broker
    ///
    /// ### Example
    /// ```rust,ignore
    /// let conn = TcpConnection::connect(&"localhost:9092".parse()?).await?;
    /// ```
    #[instrument(level = "debug")]
    async fn connect(addr: &BrokerAddress) -> Result<Self> {
        tracing::debug!("Connecting to {}", addr);
        let stream = TcpStream::connect((addr.host.as_str(), addr.port))
            .await
            .map_err(|err| {
                tracing::error!("ERROR: Could not connect to {} {:?}", addr, err);
                Error::IoError(err.kind())
            })?;
        stream.set_nodelay(true)?;
        Ok(Self {
            addr: addr.clone(),
            stream,
        })
    }

    /// Serialize a given request and send it as one size delimited frame.
    async fn send_request<R: ToByte + Sync + Send>(&mut self, req: &R) -> Result<()> {
        let mut buffer = Vec::with_capacity(64);
        encode_with_length(&mut buffer, |buffer| req.encode(buffer))?;

        tracing::trace!("Sending bytes {}", buffer.len());
        self.write(&buffer).await
    }

    /// Receive one frame and return its body.
    async fn receive_response(&mut self) -> Result<BytesMut> {
        // figure out the message size
        let mut size = self.read(4).await?;

        let length = size.get_i32();
        if length < 0 {
            tracing::error!("ERROR: negative frame size {} from {}", length, self.addr);
            return Err(Error::IoError(io::ErrorKind::InvalidData));
        }
        tracing::trace!("Reading {} bytes", length);
        self.read(length as usize).await
    }

    // A readable socket on an idle connection means either EOF or stray
    // bytes; neither can be used for a fresh request.
    fn is_alive(&self) -> bool {
        let mut peeked = [0u8; 1];
        match self.stream.peek(&mut peeked).now_or_never() {
            None => true,
            Some(Ok(0)) => {
                tracing::debug!("Connection to {} was closed by the peer", self.addr);
                false
            }
            Some(Ok(_)) => {
                tracing::warn!("Unexpected bytes pending on idle connection to {}", self.addr);
                false
            }
            Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => true,
            Some(Err(e)) => {
                tracing::debug!("Connection to {} is broken {:?}", self.addr, e);
                false
            }
        }
    }
}
