//! Image message model and payload generation
//!
//! An image travels as transport headers carrying the metadata plus the raw
//! pixel buffer as the message payload, so the pixel bytes are never copied
//! into a wire envelope.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use imgbench_middleware::TransportMessage;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::error::{MessageError, WorkerError};

/// Frame identifier stamped on every image
pub const FRAME_ID: &str = "image_frame";

/// Encoding tag for 8-bit RGBA pixels
pub const ENCODING_RGBA8: &str = "rgba8";

pub const BYTES_PER_PIXEL: u32 = 4;

/// Header names on the wire
pub mod headers {
    pub const FRAME_ID: &str = "frame_id";
    pub const STAMP_SEC: &str = "stamp_sec";
    pub const STAMP_NANOSEC: &str = "stamp_nanosec";
    pub const ENCODING: &str = "encoding";
    pub const HEIGHT: &str = "height";
    pub const WIDTH: &str = "width";
    pub const IS_BIGENDIAN: &str = "is_bigendian";
    pub const STEP: &str = "step";
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageMessage {
    pub header: Header,
    pub encoding: String,
    pub height: u32,
    pub width: u32,
    pub is_bigendian: bool,
    /// Row length in bytes
    pub step: u32,
    pub data: Bytes,
}

impl ImageMessage {
    /// Square RGBA8 image sharing `data`
    pub fn rgba8(stamp: DateTime<Utc>, dimension: u32, data: Bytes) -> Self {
        Self {
            header: Header {
                frame_id: FRAME_ID.to_string(),
                stamp,
            },
            encoding: ENCODING_RGBA8.to_string(),
            height: dimension,
            width: dimension,
            is_bigendian: false,
            step: dimension.saturating_mul(BYTES_PER_PIXEL),
            data,
        }
    }

    /// Metadata as transport headers
    pub fn headers(&self) -> HashMap<String, String> {
        let mut out = HashMap::with_capacity(8);
        out.insert(headers::FRAME_ID.to_string(), self.header.frame_id.clone());
        out.insert(
            headers::STAMP_SEC.to_string(),
            self.header.stamp.timestamp().to_string(),
        );
        out.insert(
            headers::STAMP_NANOSEC.to_string(),
            self.header.stamp.timestamp_subsec_nanos().to_string(),
        );
        out.insert(headers::ENCODING.to_string(), self.encoding.clone());
        out.insert(headers::HEIGHT.to_string(), self.height.to_string());
        out.insert(headers::WIDTH.to_string(), self.width.to_string());
        out.insert(
            headers::IS_BIGENDIAN.to_string(),
            u8::from(self.is_bigendian).to_string(),
        );
        out.insert(headers::STEP.to_string(), self.step.to_string());
        out
    }

    /// Rebuild an image from a received transport message
    pub fn from_transport(msg: &TransportMessage) -> Result<Self, MessageError> {
        let h = &msg.headers;
        let sec: i64 = parse_header(h, headers::STAMP_SEC)?;
        let nanosec: u32 = parse_header(h, headers::STAMP_NANOSEC)?;
        let stamp = DateTime::from_timestamp(sec, nanosec).ok_or_else(|| {
            MessageError::InvalidHeader {
                name: headers::STAMP_SEC,
                value: format!("{}.{:09}", sec, nanosec),
            }
        })?;
        let height: u32 = parse_header(h, headers::HEIGHT)?;
        let width: u32 = parse_header(h, headers::WIDTH)?;
        let step: u32 = parse_header(h, headers::STEP)?;
        let is_bigendian: u8 = parse_header(h, headers::IS_BIGENDIAN)?;

        let expected = step as usize * height as usize;
        if msg.payload.len() != expected {
            return Err(MessageError::SizeMismatch {
                expected,
                actual: msg.payload.len(),
            });
        }

        Ok(Self {
            header: Header {
                frame_id: header_str(h, headers::FRAME_ID)?.to_string(),
                stamp,
            },
            encoding: header_str(h, headers::ENCODING)?.to_string(),
            height,
            width,
            is_bigendian: is_bigendian != 0,
            step,
            data: msg.payload.clone(),
        })
    }
}

fn header_str<'a>(
    headers: &'a HashMap<String, String>,
    name: &'static str,
) -> Result<&'a str, MessageError> {
    headers
        .get(name)
        .map(String::as_str)
        .ok_or(MessageError::MissingHeader(name))
}

fn parse_header<T: std::str::FromStr>(
    headers: &HashMap<String, String>,
    name: &'static str,
) -> Result<T, MessageError> {
    let raw = header_str(headers, name)?;
    raw.parse().map_err(|_| MessageError::InvalidHeader {
        name,
        value: raw.to_string(),
    })
}

/// Payload size in bytes for a square RGBA8 image, or `None` on overflow
pub fn payload_len(dimension: u32) -> Option<usize> {
    let side = usize::try_from(dimension).ok()?;
    side.checked_mul(side)?
        .checked_mul(BYTES_PER_PIXEL as usize)
}

/// Fill a buffer of `len` bytes with pseudo-random values.
///
/// A seed makes the content repeatable across runs. Fails with
/// `InvalidConfig` when the buffer cannot be allocated.
pub fn generate_payload(len: usize, seed: Option<u64>) -> Result<Bytes, WorkerError> {
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(len).map_err(|e| {
        WorkerError::InvalidConfig(format!("cannot allocate a {len} byte payload: {e}"))
    })?;
    pixels.resize(len, 0);
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed).fill_bytes(&mut pixels),
        None => rand::rng().fill_bytes(&mut pixels),
    }
    Ok(Bytes::from(pixels))
}

/// Wall-clock stamps that strictly increase between calls
#[derive(Debug, Default)]
pub struct Stamper {
    last: Option<DateTime<Utc>>,
}

impl Stamper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last {
            Some(last) if now <= last => last + chrono::Duration::nanoseconds(1),
            _ => now,
        };
        self.last = Some(stamp);
        stamp
    }
}
