//! Every frame on the wire: one type byte, then that type's fields.
//!
//! ```text
//! +--------+------------------+
//! | Type   | Message Data     |
//! | (u8)   | (variable)       |
//! +--------+------------------+
//! ```
//!
//! There is no outer length envelope, so a frame's size is only known once its fields parse.

use crate::codec::{read_string, read_u16, read_u32, read_u8, write_string, write_u16, write_u32, write_u8};
use crate::error::CodecError;
use crate::models::Ticket;
use crate::{
    ByteString, HeartbeatInterval, MileMarker, PlateNumber, RoadId, SpeedLimit, Timestamp, MAX_STRING_LENGTH, MESSAGE_TYPE_AM_CAMERA,
    MESSAGE_TYPE_AM_DISPATCHER, MESSAGE_TYPE_ERROR, MESSAGE_TYPE_HEARTBEAT, MESSAGE_TYPE_PLATE, MESSAGE_TYPE_TICKET,
    MESSAGE_TYPE_WANT_HEARTBEAT,
};
use nom::{combinator::map, multi::length_count, sequence::tuple, IResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Error { msg: ByteString },
    Plate { plate: PlateNumber, timestamp: Timestamp },
    Ticket(Ticket),
    WantHeartbeat { interval: HeartbeatInterval },
    Heartbeat,
    IAmCamera { road: RoadId, mile: MileMarker, limit: SpeedLimit },
    IAmDispatcher { roads: Vec<RoadId> },
}

/// `Ok(None)` means the buffer does not hold a whole frame yet.
pub type DecodeResult = Result<Option<(Message, usize)>, CodecError>;

impl Message {
    /// Build an `Error` frame, cutting the reason short if it would not fit on the wire.
    pub fn error(reason: impl ToString) -> Self {
        let mut msg = reason.to_string();
        crate::utils::truncate_to_boundary(&mut msg, MAX_STRING_LENGTH);
        Self::Error { msg: msg.into_bytes() }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Self::Error { .. } => MESSAGE_TYPE_ERROR,
            Self::Plate { .. } => MESSAGE_TYPE_PLATE,
            Self::Ticket(_) => MESSAGE_TYPE_TICKET,
            Self::WantHeartbeat { .. } => MESSAGE_TYPE_WANT_HEARTBEAT,
            Self::Heartbeat => MESSAGE_TYPE_HEARTBEAT,
            Self::IAmCamera { .. } => MESSAGE_TYPE_AM_CAMERA,
            Self::IAmDispatcher { .. } => MESSAGE_TYPE_AM_DISPATCHER,
        }
    }

    /// Whether a client may legitimately send this message to the server.
    pub fn is_client_origin(&self) -> bool {
        match self {
            Self::Plate { .. } | Self::WantHeartbeat { .. } | Self::IAmCamera { .. } | Self::IAmDispatcher { .. } => true,
            Self::Error { .. } | Self::Ticket(_) | Self::Heartbeat => false,
        }
    }

    /// Decode the first frame in `input`, returning it with the number of bytes it used.
    pub fn decode(input: &[u8]) -> DecodeResult {
        let Some((&tag, body)) = input.split_first() else {
            return Ok(None);
        };
        let parsed = match tag {
            MESSAGE_TYPE_ERROR => parse_error(body),
            MESSAGE_TYPE_PLATE => parse_plate(body),
            MESSAGE_TYPE_TICKET => parse_ticket(body),
            MESSAGE_TYPE_WANT_HEARTBEAT => parse_want_heartbeat(body),
            MESSAGE_TYPE_HEARTBEAT => Ok((body, Self::Heartbeat)),
            MESSAGE_TYPE_AM_CAMERA => parse_camera(body),
            MESSAGE_TYPE_AM_DISPATCHER => parse_dispatcher(body),
            unknown => return Err(CodecError::UnknownMessageType(unknown)),
        };
        match parsed {
            Ok((remainder, message)) => Ok(Some((message, input.len() - remainder.len()))),
            Err(nom::Err::Incomplete(_)) => Ok(None),
            Err(_) => Err(CodecError::MalformedMessage),
        }
    }

    /// Decode a frame from input that is known to be finished, such as the tail of a closed stream.
    pub fn decode_complete(input: &[u8]) -> Result<(Self, usize), CodecError> {
        Self::decode(input)?.ok_or(CodecError::TruncatedStream)
    }

    /// Append this message's frame to `output`. On error `output` is left as it was.
    pub fn encode(&self, output: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = output.len();
        let written = self.encode_fields(output);
        if written.is_err() {
            output.truncate(start);
        }
        written
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut output = Vec::new();
        self.encode(&mut output)?;
        Ok(output)
    }

    fn encode_fields(&self, output: &mut Vec<u8>) -> Result<(), CodecError> {
        write_u8(output, self.tag());
        match self {
            Self::Error { msg } => write_string(output, msg)?,
            Self::Plate { plate, timestamp } => {
                write_string(output, plate)?;
                write_u32(output, *timestamp);
            },
            Self::Ticket(ticket) => {
                write_string(output, &ticket.plate)?;
                write_u16(output, ticket.road);
                write_u16(output, ticket.mile1);
                write_u32(output, ticket.timestamp1);
                write_u16(output, ticket.mile2);
                write_u32(output, ticket.timestamp2);
                write_u16(output, ticket.speed);
            },
            Self::WantHeartbeat { interval } => write_u32(output, *interval),
            Self::Heartbeat => (),
            Self::IAmCamera { road, mile, limit } => {
                write_u16(output, *road);
                write_u16(output, *mile);
                write_u16(output, *limit);
            },
            Self::IAmDispatcher { roads } => {
                let count = u8::try_from(roads.len()).map_err(|_| CodecError::Encoding(roads.len()))?;
                write_u8(output, count);
                for road in roads {
                    write_u16(output, *road);
                }
            },
        }
        Ok(())
    }
}

fn parse_error(input: &[u8]) -> IResult<&[u8], Message> {
    map(read_string, |msg| Message::Error { msg })(input)
}

fn parse_plate(input: &[u8]) -> IResult<&[u8], Message> {
    map(tuple((read_string, read_u32)), |(plate, timestamp)| Message::Plate { plate, timestamp })(input)
}

fn parse_ticket(input: &[u8]) -> IResult<&[u8], Message> {
    map(
        tuple((read_string, read_u16, read_u16, read_u32, read_u16, read_u32, read_u16)),
        |(plate, road, mile1, timestamp1, mile2, timestamp2, speed)| {
            Message::Ticket(Ticket {
                plate,
                road,
                mile1,
                timestamp1,
                mile2,
                timestamp2,
                speed,
            })
        },
    )(input)
}

fn parse_want_heartbeat(input: &[u8]) -> IResult<&[u8], Message> {
    map(read_u32, |interval| Message::WantHeartbeat { interval })(input)
}

fn parse_camera(input: &[u8]) -> IResult<&[u8], Message> {
    map(tuple((read_u16, read_u16, read_u16)), |(road, mile, limit)| Message::IAmCamera { road, mile, limit })(input)
}

fn parse_dispatcher(input: &[u8]) -> IResult<&[u8], Message> {
    map(length_count(read_u8, read_u16), |roads| Message::IAmDispatcher { roads })(input)
}
