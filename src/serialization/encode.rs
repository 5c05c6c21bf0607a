//! V2 binary encoding.

use std::convert::TryFrom;
use std::io::{self, Write};
use std::{error, fmt};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::varint::{varint_write, zig_zag_encode};
use super::{V2_COMPRESSED_COOKIE, V2_COOKIE, V2_HEADER_SIZE};
use crate::{Counter, Histogram};

/// Errors that can occur while encoding a histogram.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum EncodeError {
    /// A counter above `i64::max_value()` cannot be ZigZag encoded. Only
    /// reachable through saturated 64-bit counters.
    CountNotSerializable,
    /// An i/o operation on the output failed.
    IoError(io::ErrorKind),
}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> Self {
        EncodeError::IoError(e.kind())
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EncodeError::CountNotSerializable => {
                write!(f, "a count above i64::max_value() cannot be encoded")
            }
            EncodeError::IoError(kind) => write!(f, "i/o error while encoding: {:?}", kind),
        }
    }
}

impl error::Error for EncodeError {}

impl<C: Counter> Histogram<C> {
    /// Encode this histogram into `writer` in the uncompressed V2 format.
    /// Returns the number of bytes written.
    pub fn encode_into<W: Write>(&self, writer: &mut W) -> Result<usize, EncodeError> {
        let mut body = Vec::with_capacity(V2_HEADER_SIZE + 512);
        self.encode_body(&mut body)?;
        writer.write_all(&body)?;
        Ok(body.len())
    }

    /// Encode this histogram into `writer` with the V2 body wrapped in a
    /// zlib (DEFLATE) frame. Returns the number of bytes written.
    pub fn encode_compressed_into<W: Write>(&self, writer: &mut W) -> Result<usize, EncodeError> {
        let mut body = Vec::with_capacity(V2_HEADER_SIZE + 512);
        self.encode_body(&mut body)?;

        let mut framed = Vec::with_capacity(body.len() / 2 + 8);
        framed.write_u32::<LittleEndian>(V2_COMPRESSED_COOKIE)?;
        // compressed length, patched once known
        framed.write_u32::<LittleEndian>(0)?;
        {
            let mut compressor = ZlibEncoder::new(&mut framed, Compression::default());
            compressor.write_all(&body)?;
            let _ = compressor.finish()?;
        }
        let compressed_len = framed.len() - 8;
        (&mut framed[4..8]).write_u32::<LittleEndian>(compressed_len as u32)?;

        writer.write_all(&framed)?;
        Ok(framed.len())
    }

    /// Header + counts payload, with the payload length patched in.
    fn encode_body(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        buf.write_u32::<LittleEndian>(V2_COOKIE)?;
        // payload length, patched once known
        buf.write_u32::<LittleEndian>(0)?;
        // normalizing index offset; always 0 for integer histograms
        buf.write_u32::<LittleEndian>(0)?;
        buf.write_u32::<LittleEndian>(u32::from(self.significant_value_digits()))?;
        buf.write_u64::<LittleEndian>(self.lowest_discernible_value())?;
        buf.write_u64::<LittleEndian>(self.highest_trackable_value())?;
        // integer-to-double conversion ratio; 1.0 for integer histograms
        buf.write_f64::<LittleEndian>(1.0)?;
        debug_assert_eq!(buf.len(), V2_HEADER_SIZE);

        let payload_len = self.encode_counts(buf)?;
        (&mut buf[4..8]).write_u32::<LittleEndian>(payload_len as u32)?;
        Ok(())
    }

    /// Append the counts payload: a varint per non-zero count, a negative
    /// varint for every run of more than one zero, walking only as far as
    /// the slot of the max recorded value.
    fn encode_counts(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let limit = self.index_of_clamped(self.max());
        let mut index = 0;
        let mut bytes_written = 0;
        let mut scratch = [0_u8; 9];

        while index <= limit {
            let count = self.counts[index].as_u64();
            index += 1;

            let count_or_zeros: i64 = if count == 0 {
                let mut zeros: i64 = 1;
                while index <= limit && self.counts[index] == C::zero() {
                    zeros += 1;
                    index += 1;
                }
                if zeros > 1 {
                    // a run of zeros is encoded as its negated length; the
                    // counts array is bounded well below i64 range
                    -zeros
                } else {
                    0
                }
            } else {
                i64::try_from(count).map_err(|_| EncodeError::CountNotSerializable)?
            };

            let len = varint_write(zig_zag_encode(count_or_zeros), &mut scratch);
            buf.extend_from_slice(&scratch[..len]);
            bytes_written += len;
        }

        Ok(bytes_written)
    }
}
