//! Request transport.
//!
//! A [`Transport`] turns one [`RequestBody`] into one [`ResponseBody`]
//! against a given broker. The production implementation is [`Client`],
//! which leases a pooled socket for the duration of a single round trip.
//! Everything above this layer (metadata, coordinator, producer,
//! consumer) only talks to the trait, so it can be driven by a scripted
//! transport in tests.
use std::{
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::instrument;

use crate::{
    error::{Error, Result},
    network::{pool::PoolState, BrokerAddress, BrokerConnection, ConnectionFactory, TcpConnection},
    protocol::{ApiKey, ProduceResponse, Request, RequestBody, Response, ResponseBody},
    DEFAULT_CLIENT_ID,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one request to one broker and hands back its decoded response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, broker: &BrokerAddress, body: RequestBody) -> Result<ResponseBody>;
}

/// Send `body` and cast the answer into the response type expected for it.
pub async fn send<T, Resp>(
    transport: &T,
    broker: &BrokerAddress,
    body: impl Into<RequestBody>,
) -> Result<Resp>
where
    T: Transport + ?Sized,
    Resp: TryFrom<ResponseBody, Error = Error>,
{
    let body = body.into();
    let response = transport.submit(broker, body).await?;
    Resp::try_from(response)
}

/// Source of request correlation ids.
///
/// Cloning shares the counter, so one sequence can be handed to every
/// component of a client while tests keep their own.
#[derive(Debug, Clone)]
pub struct CorrelationSequence(Arc<AtomicI32>);

impl Default for CorrelationSequence {
    fn default() -> Self {
        Self::starting_at(crate::DEFAULT_CORRELATION_ID)
    }
}

impl CorrelationSequence {
    pub fn starting_at(first: i32) -> Self {
        Self(Arc::new(AtomicI32::new(first)))
    }

    /// Wraps around at `i32::MAX`.
    pub fn next(&self) -> i32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub bootstrap_addrs: Vec<BrokerAddress>,
    pub client_id: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Parse `host:port` seed addresses.
    pub fn new<T: AsRef<str>>(bootstrap_addrs: &[T]) -> Result<Self> {
        if bootstrap_addrs.is_empty() {
            tracing::error!("ERROR: no bootstrap brokers were given");
            return Err(Error::MissingBrokerConfigOptions);
        }
        let bootstrap_addrs = bootstrap_addrs
            .iter()
            .map(|addr| addr.as_ref().parse())
            .collect::<Result<Vec<BrokerAddress>>>()?;
        Ok(Self {
            bootstrap_addrs,
            client_id: DEFAULT_CLIENT_ID.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn client_id(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_owned();
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// The pooled TCP transport.
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    connections: ConnectionFactory,
    correlation: CorrelationSequence,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_sequence(config, CorrelationSequence::default())
    }

    pub fn with_sequence(config: ClientConfig, correlation: CorrelationSequence) -> Self {
        Self {
            config,
            connections: ConnectionFactory::new(),
            correlation,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn bootstrap_addrs(&self) -> &[BrokerAddress] {
        &self.config.bootstrap_addrs
    }

    pub fn pool_state(&self) -> PoolState {
        self.connections.state()
    }

    /// Close every pooled connection. The client is unusable afterwards.
    pub fn release(&self) {
        tracing::info!("Releasing all broker connections");
        self.connections.release_all();
    }
}

// one frame out, at most one frame back
async fn round_trip(
    conn: &mut TcpConnection,
    request: &Request,
    expects_response: bool,
) -> Result<Option<Bytes>> {
    conn.send_request(request).await?;
    if !expects_response {
        return Ok(None);
    }
    let frame = conn.receive_response().await?;
    Ok(Some(frame.freeze()))
}

#[async_trait]
impl Transport for Client {
    #[instrument(level = "debug", skip(self, body), fields(api = ?body.api_key()))]
    async fn submit(&self, broker: &BrokerAddress, body: RequestBody) -> Result<ResponseBody> {
        let api_key: ApiKey = body.api_key();
        let expects_response = body.expects_response();
        let correlation_id = self.correlation.next();
        let request = Request::new(correlation_id, &self.config.client_id, body);

        let mut lease = self.connections.acquire(broker).await?;
        let outcome = tokio::time::timeout(
            self.config.request_timeout,
            round_trip(lease.get_mut()?, &request, expects_response),
        )
        .await;

        let frame = match outcome {
            Err(_) => {
                tracing::warn!("{:?} request to {} timed out", api_key, broker);
                lease.mark_broken();
                return Err(Error::Timeout);
            }
            Ok(Err(err)) => {
                tracing::error!("ERROR: {:?} request to {} failed {:?}", api_key, broker, err);
                lease.mark_broken();
                return Err(err);
            }
            Ok(Ok(None)) => return Ok(ProduceResponse::default().into()),
            Ok(Ok(Some(frame))) => frame,
        };

        let response = Response::decode(api_key, frame)?;
        if response.header.correlation_id != correlation_id {
            tracing::error!(
                "ERROR: correlation mismatch on {}, expected {} got {}",
                broker,
                correlation_id,
                response.header.correlation_id
            );
            lease.mark_broken();
            return Err(Error::CorrelationMismatch {
                expected: correlation_id,
                actual: response.header.correlation_id,
            });
        }
        tracing::trace!("Received {:?} response from {}", api_key, broker);
        Ok(response.body)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn submit(&self, broker: &BrokerAddress, body: RequestBody) -> Result<ResponseBody> {
        (**self).submit(broker, body).await
    }
}
