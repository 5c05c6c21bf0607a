//! V2 binary decoding.

use std::convert::TryFrom;
use std::io::{self, Cursor, Read};
use std::{error, fmt};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

use super::varint::{varint_read, zig_zag_decode};
use super::{V2_COMPRESSED_COOKIE, V2_COOKIE};
use crate::{Counter, Histogram};

/// Errors that can occur while decoding a histogram.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum DecodeError {
    /// An i/o operation failed, including premature end of input.
    IoError(io::ErrorKind),
    /// The first four bytes match no supported format.
    InvalidCookie,
    /// The stream uses a feature this implementation does not support (a
    /// non-zero normalizing index offset or a non-unit integer-to-double
    /// ratio).
    UnsupportedFeature,
    /// A decoded count does not fit the requested counter type.
    UnsuitableCounterType,
    /// The header's configuration parameters are invalid.
    InvalidParameters,
    /// The decoded configuration cannot be represented in `usize` on this
    /// platform.
    UsizeTypeTooSmall,
    /// The counts payload holds more entries than the configuration allows.
    EncodedArrayTooLong,
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        DecodeError::IoError(e.kind())
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::IoError(kind) => write!(f, "i/o error while decoding: {:?}", kind),
            DecodeError::InvalidCookie => write!(f, "stream starts with an unknown cookie"),
            DecodeError::UnsupportedFeature => {
                write!(f, "stream uses an unsupported format feature")
            }
            DecodeError::UnsuitableCounterType => {
                write!(f, "a count does not fit the chosen counter type")
            }
            DecodeError::InvalidParameters => {
                write!(f, "header carries an invalid configuration")
            }
            DecodeError::UsizeTypeTooSmall => {
                write!(f, "configuration does not fit in usize on this platform")
            }
            DecodeError::EncodedArrayTooLong => {
                write!(f, "counts payload is longer than the configuration allows")
            }
        }
    }
}

impl error::Error for DecodeError {}

impl<C: Counter> Histogram<C> {
    /// Decode a histogram from `reader`, auto-detecting the plain and
    /// compressed V2 framings by their cookie.
    ///
    /// The reconstructed histogram's highest trackable value is at least
    /// `min_highest_trackable`, so decoded histograms can be sized up front
    /// for later aggregation regardless of what each snapshot carried.
    /// After the counts are restored, the total count and the min/max
    /// trackers are re-derived from the array.
    pub fn decode_from<R: Read>(
        reader: &mut R,
        min_highest_trackable: u64,
    ) -> Result<Histogram<C>, DecodeError> {
        let cookie = reader.read_u32::<LittleEndian>()?;
        match cookie {
            V2_COOKIE => Self::decode_after_cookie(reader, min_highest_trackable),
            V2_COMPRESSED_COOKIE => {
                Self::decode_compressed_after_cookie(reader, min_highest_trackable)
            }
            _ => Err(DecodeError::InvalidCookie),
        }
    }

    /// Decode a histogram from `reader`, insisting on the compressed
    /// framing.
    ///
    /// See [`decode_from`](Histogram::decode_from).
    pub fn decode_compressed_from<R: Read>(
        reader: &mut R,
        min_highest_trackable: u64,
    ) -> Result<Histogram<C>, DecodeError> {
        let cookie = reader.read_u32::<LittleEndian>()?;
        if cookie != V2_COMPRESSED_COOKIE {
            return Err(DecodeError::InvalidCookie);
        }
        Self::decode_compressed_after_cookie(reader, min_highest_trackable)
    }

    fn decode_compressed_after_cookie<R: Read>(
        reader: &mut R,
        min_highest_trackable: u64,
    ) -> Result<Histogram<C>, DecodeError> {
        let compressed_len = usize::try_from(reader.read_u32::<LittleEndian>()?)
            .map_err(|_| DecodeError::UsizeTypeTooSmall)?;
        let mut compressed = vec![0_u8; compressed_len];
        reader.read_exact(&mut compressed)?;

        let mut body = Vec::new();
        let _ = ZlibDecoder::new(&compressed[..]).read_to_end(&mut body)?;

        let mut body_reader = &body[..];
        let inner_cookie = body_reader.read_u32::<LittleEndian>()?;
        if inner_cookie != V2_COOKIE {
            return Err(DecodeError::InvalidCookie);
        }
        Self::decode_after_cookie(&mut body_reader, min_highest_trackable)
    }

    fn decode_after_cookie<R: Read>(
        reader: &mut R,
        min_highest_trackable: u64,
    ) -> Result<Histogram<C>, DecodeError> {
        let payload_len = usize::try_from(reader.read_u32::<LittleEndian>()?)
            .map_err(|_| DecodeError::UsizeTypeTooSmall)?;
        let normalizing_offset = reader.read_u32::<LittleEndian>()?;
        if normalizing_offset != 0 {
            return Err(DecodeError::UnsupportedFeature);
        }
        let digits = u8::try_from(reader.read_u32::<LittleEndian>()?)
            .map_err(|_| DecodeError::InvalidParameters)?;
        let low = reader.read_u64::<LittleEndian>()?;
        let header_high = reader.read_u64::<LittleEndian>()?;
        let int_to_double_ratio = reader.read_f64::<LittleEndian>()?;
        if int_to_double_ratio != 1.0 {
            return Err(DecodeError::UnsupportedFeature);
        }

        let high = header_high
            .max(min_highest_trackable)
            .max(low.saturating_mul(2));
        let mut h = Histogram::new_with_bounds(low, high, digits)
            .map_err(|_| DecodeError::InvalidParameters)?;

        let mut payload = vec![0_u8; payload_len];
        reader.read_exact(&mut payload)?;

        let payload_len = payload.len() as u64;
        let mut cursor = Cursor::new(payload);
        let mut index: usize = 0;
        while cursor.position() < payload_len {
            let count_or_zeros = zig_zag_decode(varint_read(&mut cursor)?);
            if count_or_zeros < 0 {
                // a run of zeros; the array starts zeroed, so just skip
                let zeros = usize::try_from(-count_or_zeros)
                    .map_err(|_| DecodeError::UsizeTypeTooSmall)?;
                index = index
                    .checked_add(zeros)
                    .ok_or(DecodeError::UsizeTypeTooSmall)?;
            } else {
                let count =
                    C::from_i64(count_or_zeros).ok_or(DecodeError::UnsuitableCounterType)?;
                h.set_count_at_index(index, count)
                    .map_err(|_| DecodeError::EncodedArrayTooLong)?;
                index = index
                    .checked_add(1)
                    .ok_or(DecodeError::UsizeTypeTooSmall)?;
            }
        }

        // re-derive total count, min and max from the restored counts
        let scan_len = index.min(h.counts_array_length());
        h.rescan(scan_len);
        Ok(h)
    }
}
