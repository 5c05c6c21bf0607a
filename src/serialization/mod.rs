//! Snapshot serialization and interval logs.
//!
//! Histograms serialize to the compact V2 binary format: a fixed
//! little-endian header followed by the counts array compressed with
//! run-length encoded zeros and ZigZag LEB128 varints. An optional outer
//! frame wraps the whole body in a zlib (DEFLATE) stream for archival
//! density. Both forms are understood by
//! [`Histogram::decode_from`](crate::Histogram::decode_from), which
//! dispatches on the leading cookie.
//!
//! A serialized histogram is a full-fidelity snapshot: decoded histograms
//! can be added together to aggregate intervals into longer windows, and
//! percentiles computed over the aggregate remain exact to the configured
//! precision, which no amount of stored percentile summaries can
//! provide.
//!
//! The [`interval_log`] module layers the text interval-log format on top:
//! one line per interval with a base64 payload, plus header directives for
//! start and base times.
//!
//! # Example
//!
//! ```
//! use hdrsketch::Histogram;
//!
//! let mut hist = Histogram::<u64>::new_with_max(1_000_000, 3).unwrap();
//! hist.record_n(42, 7).unwrap();
//!
//! let mut buf = Vec::new();
//! hist.encode_into(&mut buf).unwrap();
//!
//! let back = Histogram::<u64>::decode_from(&mut buf.as_slice(), 0).unwrap();
//! assert_eq!(back, hist);
//! ```

mod decode;
mod encode;
pub mod interval_log;
mod varint;

pub use self::decode::DecodeError;
pub use self::encode::EncodeError;

/// Cookie of an uncompressed V2 body.
pub(crate) const V2_COOKIE: u32 = 0x1C84_9303;
/// Cookie of the compressed outer frame.
pub(crate) const V2_COMPRESSED_COOKIE: u32 = 0x1C84_9304;
/// Fixed size of the V2 header in bytes.
pub(crate) const V2_HEADER_SIZE: usize = 40;
