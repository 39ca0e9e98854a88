//! Bytecode protocol requests & responses.
//!
//! This module aims to implement the bytecode protocol outlined in the
//! [Kafka Documentation](https://kafka.apache.org/protocol.html)
//!
//! The module is set up as a list of message pairs containing two files
//! each corresponding to the request and response. Every type can be
//! both encoded with [`ToByte`] and parsed back with its nom parser, so
//! the same code serves the client and the test brokers.
//!
//! All APIs are spoken at version 0.
//!
//! ### Envelopes
//! ```text
//! Request => api_key api_version correlation_id client_id payload
//!   api_key => INT16
//!   api_version => INT16
//!   correlation_id => INT32
//!   client_id => NULLABLE_STRING
//! Response => correlation_id payload
//!   correlation_id => INT32
//! ```
//!
//! The payload type of a response is not self describing; it is chosen
//! by the [`ApiKey`] of the request that produced it, see
//! [`Response::decode`].

pub mod commit_offset;
pub mod describe_groups;
pub mod fetch;
pub mod find_coordinator;
pub mod heartbeat;
pub mod join_group;
pub mod leave_group;
pub mod list_groups;
pub mod list_offsets;
pub mod message_set;
pub mod metadata;
pub mod offset_fetch;
pub mod produce;
pub mod sync_group;

use bytes::{BufMut, Bytes};
use nom::{
    combinator::map,
    error::{Error as NomError, ErrorKind},
    number::complete::{be_i16, be_i32},
    IResult,
};
use nombytes::NomBytes;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

// re exporting these for ease
pub use self::{
    commit_offset::{request::OffsetCommitRequest, response::OffsetCommitResponse},
    describe_groups::{request::DescribeGroupsRequest, response::DescribeGroupsResponse},
    fetch::{request::FetchRequest, response::FetchResponse},
    find_coordinator::{request::FindCoordinatorRequest, response::FindCoordinatorResponse},
    heartbeat::{request::HeartbeatRequest, response::HeartbeatResponse},
    join_group::{
        request::{JoinGroupRequest, Protocol, ProtocolMetadata},
        response::JoinGroupResponse,
    },
    leave_group::{request::LeaveGroupRequest, response::LeaveGroupResponse},
    list_groups::{request::ListGroupsRequest, response::ListGroupsResponse},
    list_offsets::{request::ListOffsetsRequest, response::ListOffsetsResponse},
    message_set::{Compression, Message, MessageSet, MessageSetEntry},
    metadata::{
        request::MetadataRequest,
        response::{Broker, MetadataResponse},
    },
    offset_fetch::{request::OffsetFetchRequest, response::OffsetFetchResponse},
    produce::{request::ProduceRequest, response::ProduceResponse},
    sync_group::{
        request::{Assignment, MemberAssignment, PartitionAssignment, SyncGroupRequest},
        response::SyncGroupResponse,
    },
};
use crate::{
    encode::ToByte,
    error::{Error, Result},
    parser,
};

/// Numeric identifiers of the APIs this client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum ApiKey {
    Produce = 0,
    Fetch = 1,
    Offsets = 2,
    Metadata = 3,
    OffsetCommit = 8,
    OffsetFetch = 9,
    GroupCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
    DescribeGroups = 15,
    ListGroups = 16,
}

pub const API_VERSION: i16 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRequest {
    /// The API key of this request.
    pub api_key: i16,
    /// The API version of this request.
    pub api_version: i16,
    /// The correlation ID of this request.
    pub correlation_id: i32,
    /// The client ID string.
    pub client_id: String,
}

impl HeaderRequest {
    /// Create new header request.
    ///
    /// This goes at the beginning of every single request.
    pub fn new(api_key: ApiKey, correlation_id: i32, client_id: &str) -> HeaderRequest {
        HeaderRequest {
            api_key: api_key as i16,
            api_version: API_VERSION,
            correlation_id,
            client_id: client_id.to_owned(),
        }
    }
}

impl ToByte for HeaderRequest {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.api_key.encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        Ok(())
    }
}

pub fn parse_header_request(s: NomBytes) -> IResult<NomBytes, HeaderRequest> {
    let (s, api_key) = be_i16(s)?;
    let (s, api_version) = be_i16(s)?;
    let (s, correlation_id) = be_i32(s)?;
    let (s, client_id) = parser::parse_nullable_utf8_string(s)?;
    Ok((
        s,
        HeaderRequest {
            api_key,
            api_version,
            correlation_id,
            client_id: client_id.unwrap_or_default(),
        },
    ))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderResponse {
    /// The correlation ID of this response.
    pub correlation_id: i32,
}

impl ToByte for HeaderResponse {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.correlation_id.encode(buffer)
    }
}

pub fn parse_header_response(s: NomBytes) -> IResult<NomBytes, HeaderResponse> {
    let (s, correlation_id) = be_i32(s)?;
    Ok((s, HeaderResponse { correlation_id }))
}

type RequestDecoder = fn(NomBytes) -> IResult<NomBytes, RequestBody>;
type ResponseDecoder = fn(NomBytes) -> IResult<NomBytes, ResponseBody>;

// Builds the request/response sum types, their encoders, the api key
// lookup tables and the conversions between bodies and concrete types.
macro_rules! api_bodies {
    ($($key:ident => $req:ident($req_parser:path), $resp:ident($resp_parser:path);)*) => {
        /// Every request payload this client can send.
        #[derive(Debug, Clone, PartialEq)]
        pub enum RequestBody {
            $($key($req),)*
        }

        /// Every response payload this client can receive.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ResponseBody {
            $($key($resp),)*
        }

        impl RequestBody {
            pub fn api_key(&self) -> ApiKey {
                match self {
                    $(RequestBody::$key(_) => ApiKey::$key,)*
                }
            }
        }

        impl ResponseBody {
            pub fn api_key(&self) -> ApiKey {
                match self {
                    $(ResponseBody::$key(_) => ApiKey::$key,)*
                }
            }
        }

        impl ToByte for RequestBody {
            fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
                match self {
                    $(RequestBody::$key(body) => body.encode(buffer),)*
                }
            }
        }

        impl ToByte for ResponseBody {
            fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
                match self {
                    $(ResponseBody::$key(body) => body.encode(buffer),)*
                }
            }
        }

        /// The decoder of a request payload for a given api key.
        pub fn request_decoder(api_key: ApiKey) -> RequestDecoder {
            match api_key {
                $(ApiKey::$key => |s| map($req_parser, RequestBody::$key)(s),)*
            }
        }

        /// The decoder of a response payload for a given api key.
        pub fn response_decoder(api_key: ApiKey) -> ResponseDecoder {
            match api_key {
                $(ApiKey::$key => |s| map($resp_parser, ResponseBody::$key)(s),)*
            }
        }

        $(
            impl From<$req> for RequestBody {
                fn from(body: $req) -> Self {
                    RequestBody::$key(body)
                }
            }

            impl From<$resp> for ResponseBody {
                fn from(body: $resp) -> Self {
                    ResponseBody::$key(body)
                }
            }

            impl TryFrom<ResponseBody> for $resp {
                type Error = Error;

                fn try_from(body: ResponseBody) -> Result<Self> {
                    match body {
                        ResponseBody::$key(response) => Ok(response),
                        other => Err(Error::UnexpectedResponse(other.api_key())),
                    }
                }
            }

            // this helps us cast the server response into this type
            impl TryFrom<Bytes> for $resp {
                type Error = Error;

                fn try_from(s: Bytes) -> Result<Self> {
                    tracing::trace!("Parsing {} {:?}", stringify!($resp), s);
                    let (_, response) = $resp_parser(NomBytes::new(s.clone())).map_err(|err| {
                        tracing::error!("ERROR: Failed parsing {} {:?}", stringify!($resp), err);
                        tracing::error!("ERROR: {} Bytes {:?}", stringify!($resp), s);
                        Error::ParsingError(s)
                    })?;
                    tracing::trace!("Parsed {} {:?}", stringify!($resp), response);
                    Ok(response)
                }
            }
        )*
    };
}

api_bodies! {
    Produce => ProduceRequest(produce::request::parse_produce_request),
        ProduceResponse(produce::response::parse_produce_response);
    Fetch => FetchRequest(fetch::request::parse_fetch_request),
        FetchResponse(fetch::response::parse_fetch_response);
    Offsets => ListOffsetsRequest(list_offsets::request::parse_list_offsets_request),
        ListOffsetsResponse(list_offsets::response::parse_list_offsets_response);
    Metadata => MetadataRequest(metadata::request::parse_metadata_request),
        MetadataResponse(metadata::response::parse_metadata_response);
    OffsetCommit => OffsetCommitRequest(commit_offset::request::parse_offset_commit_request),
        OffsetCommitResponse(commit_offset::response::parse_offset_commit_response);
    OffsetFetch => OffsetFetchRequest(offset_fetch::request::parse_offset_fetch_request),
        OffsetFetchResponse(offset_fetch::response::parse_offset_fetch_response);
    GroupCoordinator => FindCoordinatorRequest(find_coordinator::request::parse_find_coordinator_request),
        FindCoordinatorResponse(find_coordinator::response::parse_find_coordinator_response);
    JoinGroup => JoinGroupRequest(join_group::request::parse_join_group_request),
        JoinGroupResponse(join_group::response::parse_join_group_response);
    Heartbeat => HeartbeatRequest(heartbeat::request::parse_heartbeat_request),
        HeartbeatResponse(heartbeat::response::parse_heartbeat_response);
    LeaveGroup => LeaveGroupRequest(leave_group::request::parse_leave_group_request),
        LeaveGroupResponse(leave_group::response::parse_leave_group_response);
    SyncGroup => SyncGroupRequest(sync_group::request::parse_sync_group_request),
        SyncGroupResponse(sync_group::response::parse_sync_group_response);
    DescribeGroups => DescribeGroupsRequest(describe_groups::request::parse_describe_groups_request),
        DescribeGroupsResponse(describe_groups::response::parse_describe_groups_response);
    ListGroups => ListGroupsRequest(list_groups::request::parse_list_groups_request),
        ListGroupsResponse(list_groups::response::parse_list_groups_response);
}

impl RequestBody {
    /// Produce requests with `acks = 0` get no response frame.
    pub fn expects_response(&self) -> bool {
        !matches!(self, RequestBody::Produce(req) if req.required_acks == 0)
    }
}

/// A full request: header plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub header: HeaderRequest,
    pub body: RequestBody,
}

impl Request {
    pub fn new(correlation_id: i32, client_id: &str, body: RequestBody) -> Self {
        Self {
            header: HeaderRequest::new(body.api_key(), correlation_id, client_id),
            body,
        }
    }
}

impl ToByte for Request {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding {:?} request", self.body.api_key());
        self.header.encode(buffer)?;
        self.body.encode(buffer)
    }
}

impl TryFrom<Bytes> for Request {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        let (_, request) = parse_request(NomBytes::new(s.clone())).map_err(|err| {
            tracing::error!("ERROR: Failed parsing Request {:?}", err);
            Error::ParsingError(s)
        })?;
        Ok(request)
    }
}

pub fn parse_request(s: NomBytes) -> IResult<NomBytes, Request> {
    let (s, header) = parse_header_request(s)?;
    let api_key = ApiKey::from_i16(header.api_key)
        .ok_or_else(|| nom::Err::Failure(NomError::new(s.clone(), ErrorKind::Switch)))?;
    let (s, body) = request_decoder(api_key)(s)?;
    Ok((s, Request { header, body }))
}

/// A full response: header plus payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub header: HeaderResponse,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(correlation_id: i32, body: ResponseBody) -> Self {
        Self {
            header: HeaderResponse { correlation_id },
            body,
        }
    }

    /// Parse a response frame produced by a request with `api_key`.
    pub fn decode(api_key: ApiKey, s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing {:?} response {:?}", api_key, s);
        let decoder = response_decoder(api_key);
        let parsed = parse_header_response(NomBytes::new(s.clone()))
            .and_then(|(rest, header)| decoder(rest).map(|(rest, body)| (rest, header, body)));
        let (_, header, body) = parsed.map_err(|err| {
            tracing::error!("ERROR: Failed parsing {:?} response {:?}", api_key, err);
            tracing::error!("ERROR: Response Bytes {:?}", s);
            Error::ParsingError(s)
        })?;
        Ok(Self { header, body })
    }
}

impl ToByte for Response {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.header.encode(buffer)?;
        self.body.encode(buffer)
    }
}
