//! Little-endian primitives for the binary library cache.
//!
//! The cache layout is "preamble then payload"; every multi-byte value is a
//! little-endian `i32` or `f64` regardless of host byte order, so a cache
//! written on one machine validates correctly on another.

use super::error::DunbrackError;
use std::io::{Read, Write};

pub fn write_i32<W: Write>(w: &mut W, value: i32) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub fn write_f64<W: Write>(w: &mut W, value: f64) -> std::io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

pub fn write_u8<W: Write>(w: &mut W, value: u8) -> std::io::Result<()> {
    w.write_all(&[value])
}

pub fn read_i32<R: Read>(r: &mut R, context: &'static str) -> Result<i32, DunbrackError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|_| DunbrackError::TruncatedBinary { context })?;
    Ok(i32::from_le_bytes(buf))
}

pub fn read_f64<R: Read>(r: &mut R, context: &'static str) -> Result<f64, DunbrackError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)
        .map_err(|_| DunbrackError::TruncatedBinary { context })?;
    Ok(f64::from_le_bytes(buf))
}

pub fn read_u8<R: Read>(r: &mut R, context: &'static str) -> Result<u8, DunbrackError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)
        .map_err(|_| DunbrackError::TruncatedBinary { context })?;
    Ok(buf[0])
}

/// Reads an `i32` and checks it fits a `usize` count bounded by `max`.
pub fn read_count<R: Read>(
    r: &mut R,
    context: &'static str,
    max: usize,
) -> Result<usize, DunbrackError> {
    let raw = read_i32(r, context)?;
    if raw < 0 || raw as usize > max {
        return Err(DunbrackError::MalformedBinary(format!(
            "count {raw} for {context} outside 0..={max}"
        )));
    }
    Ok(raw as usize)
}
