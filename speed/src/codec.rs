//! Big-endian integers and `u8`-length-prefixed strings.
//!
//! Strings are carried as raw bytes; nothing on the wire promises they are UTF-8.
//!
//! Readers are streaming `nom` parsers: running out of input is `Incomplete`, not an error, so a
//! connection can keep buffering until a whole frame has arrived. [`complete`] converts that into
//! [`CodecError::TruncatedStream`] once no more input is coming.

use crate::error::CodecError;
use crate::{ByteString, MAX_STRING_LENGTH};
use nom::{
    combinator::map,
    multi::length_data,
    number::streaming::{be_u16, be_u32, be_u8},
    IResult,
};

pub type ByteStr<'a> = &'a [u8];

pub fn read_u8(input: ByteStr) -> IResult<ByteStr, u8> {
    be_u8(input)
}

pub fn read_u16(input: ByteStr) -> IResult<ByteStr, u16> {
    be_u16(input)
}

pub fn read_u32(input: ByteStr) -> IResult<ByteStr, u32> {
    be_u32(input)
}

pub fn read_string(input: ByteStr) -> IResult<ByteStr, ByteString> {
    map(length_data(be_u8), <[u8]>::to_vec)(input)
}

/// Map a parse result over input that will not grow any further.
pub fn complete<'a, T>(result: IResult<ByteStr<'a>, T>) -> Result<(ByteStr<'a>, T), CodecError> {
    result.map_err(|err| match err {
        nom::Err::Incomplete(_) => CodecError::TruncatedStream,
        _ => CodecError::MalformedMessage,
    })
}

pub fn write_u8(output: &mut Vec<u8>, value: u8) {
    output.push(value);
}

pub fn write_u16(output: &mut Vec<u8>, value: u16) {
    output.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u32(output: &mut Vec<u8>, value: u32) {
    output.extend_from_slice(&value.to_be_bytes());
}

/// Writes nothing at all when the string is too long for its length prefix.
pub fn write_string(output: &mut Vec<u8>, value: &[u8]) -> Result<(), CodecError> {
    if value.len() > MAX_STRING_LENGTH {
        return Err(CodecError::Encoding(value.len()));
    }
    output.push(value.len() as u8);
    output.extend_from_slice(value);
    Ok(())
}
