//! Interval log reading and writing.
//!
//! An interval log records a sequence of histograms over time as text: a
//! few header directives, a legend, then one line per interval with a
//! base64-encoded serialized histogram. A one-hour load test logged once a
//! second, say, becomes 3 600 lines that can be replayed, filtered by tag
//! or time range, and aggregated after the fact.
//!
//! ```text
//! #[Histogram log format version 1.2]
//! #[StartTime: 1441812279.474 (2015-09-09T15:24:39.474Z)]
//! "StartTimestamp","Interval_Length","Interval_Max","Interval_Compressed_Histogram"
//! Tag=api,0.127,1.007,2.769,HISTFAAAA...
//! 1.134,1.002,0.521,HISTFAAAA...
//! ```
//!
//! Two layers are provided. [`IntervalLogIterator`] is the lazy line-level
//! scanner: it yields directives and undecoded interval lines without
//! touching the payloads, which makes skimming a large log for the
//! interesting records cheap. [`IntervalLogReader`] sits on top and yields
//! fully decoded histograms with their interval timestamps applied,
//! skipping malformed lines (optionally reporting them to an error
//! handler). Writing goes through [`IntervalLogWriter`].

use std::io;
use std::io::Write;
use std::{error, fmt, ops, str};

use chrono::{LocalResult, SecondsFormat, TimeZone, Utc};
use nom::branch::alt;
use nom::bytes::complete::{tag as literal, take_until};
use nom::character::complete::{char, line_ending, not_line_ending};
use nom::combinator::{map, map_res, opt};
use nom::number::complete::double;
use nom::sequence::{preceded, terminated};
use nom::IResult;

use super::{DecodeError, EncodeError};
use crate::{Counter, Histogram};

/// A tag labelling one interval line.
///
/// Tags are plain strings that must not contain `,`, `' '`, `\r` or `\n`,
/// since they live in one CSV column of the log line.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Tag<'a>(&'a str);

impl<'a> Tag<'a> {
    /// Wrap a string as a tag, rejecting strings with characters that would
    /// break the line format.
    pub fn new(text: &'a str) -> Option<Tag<'a>> {
        if text.is_empty()
            || text
                .chars()
                .any(|c| c == ',' || c == ' ' || c == '\r' || c == '\n')
        {
            None
        } else {
            Some(Tag(text))
        }
    }

    /// The tag's contents.
    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

impl<'a> ops::Deref for Tag<'a> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

// ****************************************************************
// Writing
// ****************************************************************

/// Errors that can occur while writing a log.
#[derive(Debug)]
pub enum IntervalLogWriterError {
    /// Serializing the histogram payload failed.
    Encode(EncodeError),
    /// An i/o operation on the sink failed.
    Io(io::ErrorKind),
}

impl From<io::Error> for IntervalLogWriterError {
    fn from(e: io::Error) -> Self {
        IntervalLogWriterError::Io(e.kind())
    }
}

impl fmt::Display for IntervalLogWriterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IntervalLogWriterError::Encode(e) => write!(f, "payload encoding failed: {}", e),
            IntervalLogWriterError::Io(kind) => write!(f, "i/o error: {:?}", kind),
        }
    }
}

impl error::Error for IntervalLogWriterError {}

/// Writes an interval log to an [`io::Write`] sink.
///
/// Header lines (format version, start time, base time, legend, comments)
/// should be written before the first interval; the writer does not enforce
/// the ordering. Interval payloads are serialized in the compressed V2
/// format. The sink is flushed when the writer is dropped.
pub struct IntervalLogWriter<'a, W: io::Write> {
    sink: &'a mut W,
    base_time_sec: f64,
    max_value_divisor: f64,
    text_buf: String,
    encode_buf: Vec<u8>,
}

impl<'a, W: io::Write> IntervalLogWriter<'a, W> {
    /// Create a writer around `sink` with a base time of 0 and a max-value
    /// divisor of 1.
    pub fn new(sink: &'a mut W) -> IntervalLogWriter<'a, W> {
        IntervalLogWriter {
            sink,
            base_time_sec: 0.0,
            max_value_divisor: 1.0,
            text_buf: String::new(),
            encode_buf: Vec::new(),
        }
    }

    /// Scale down the human-readable max column of every interval line by
    /// `divisor` (for example `1_000_000_000.0` to log nanosecond
    /// recordings with second-denominated max values). Affects only the max
    /// column; the payload is never scaled.
    pub fn set_max_value_divisor(&mut self, divisor: f64) {
        self.max_value_divisor = divisor;
    }

    /// Write the `#[Histogram log format version 1.2]` directive.
    pub fn write_log_format_version(&mut self) -> io::Result<()> {
        writeln!(self.sink, "#[Histogram log format version 1.2]")
    }

    /// Write a `#[StartTime: …]` directive, `seconds_since_epoch` rendered
    /// both numerically and as ISO-8601.
    pub fn write_start_time(&mut self, seconds_since_epoch: f64) -> io::Result<()> {
        writeln!(
            self.sink,
            "#[StartTime: {:.3} ({})]",
            seconds_since_epoch,
            iso8601(seconds_since_epoch)
        )
    }

    /// Write a `#[BaseTime: …]` directive and use `seconds_since_epoch` as
    /// the base that subsequent
    /// [`write_histogram`](IntervalLogWriter::write_histogram) calls offset
    /// their timestamps against.
    pub fn write_base_time(&mut self, seconds_since_epoch: f64) -> io::Result<()> {
        self.base_time_sec = seconds_since_epoch;
        writeln!(
            self.sink,
            "#[BaseTime: {:.3} ({})]",
            seconds_since_epoch,
            iso8601(seconds_since_epoch)
        )
    }

    /// Write a free-form comment line. The text must not contain line
    /// breaks.
    pub fn write_comment(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.sink, "#{}", text)
    }

    /// Write the CSV legend line.
    pub fn write_legend(&mut self) -> io::Result<()> {
        writeln!(
            self.sink,
            "\"StartTimestamp\",\"Interval_Length\",\"Interval_Max\",\"Interval_Compressed_Histogram\""
        )
    }

    /// Write one interval line, taking the interval's start and length from
    /// the histogram's own timestamps, offset against the writer's base
    /// time.
    pub fn write_histogram<C: Counter>(
        &mut self,
        histogram: &Histogram<C>,
        tag: Option<Tag>,
    ) -> Result<(), IntervalLogWriterError> {
        let start_sec = histogram.start_timestamp() as f64 / 1000.0 - self.base_time_sec;
        let duration_sec = histogram
            .end_timestamp()
            .saturating_sub(histogram.start_timestamp()) as f64
            / 1000.0;
        self.write_interval(start_sec, duration_sec, histogram, tag)
    }

    /// Write one interval line with an explicit start timestamp and
    /// duration, both in seconds.
    pub fn write_interval<C: Counter>(
        &mut self,
        start_timestamp: f64,
        duration: f64,
        histogram: &Histogram<C>,
        tag: Option<Tag>,
    ) -> Result<(), IntervalLogWriterError> {
        if let Some(tag) = tag {
            write!(self.sink, "Tag={},", tag.as_str())?;
        }
        write!(
            self.sink,
            "{:.3},{:.3},{:.3},",
            start_timestamp,
            duration,
            histogram.max() as f64 / self.max_value_divisor
        )?;

        self.encode_buf.clear();
        self.text_buf.clear();
        let _ = histogram
            .encode_compressed_into(&mut self.encode_buf)
            .map_err(IntervalLogWriterError::Encode)?;
        base64::encode_config_buf(&self.encode_buf, base64::STANDARD, &mut self.text_buf);

        self.sink.write_all(self.text_buf.as_bytes())?;
        self.sink.write_all(b"\n")?;
        Ok(())
    }

    /// Flush the sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl<'a, W: io::Write> Drop for IntervalLogWriter<'a, W> {
    fn drop(&mut self) {
        let _ = self.sink.flush();
    }
}

fn iso8601(seconds_since_epoch: f64) -> String {
    let millis = (seconds_since_epoch * 1000.0).round();
    if !millis.is_finite() || millis.abs() > 1e15 {
        return String::from("out of range");
    }
    match Utc.timestamp_millis_opt(millis as i64) {
        LocalResult::Single(datetime) => datetime.to_rfc3339_opts(SecondsFormat::Millis, true),
        _ => String::from("out of range"),
    }
}

// ****************************************************************
// Line-level scanning
// ****************************************************************

/// One undecoded interval line.
#[derive(Debug, PartialEq)]
pub struct IntervalLogLine<'a> {
    tag: Option<&'a str>,
    start_timestamp: f64,
    duration: f64,
    max: f64,
    encoded_histogram: &'a str,
}

impl<'a> IntervalLogLine<'a> {
    /// The line's tag, if any.
    pub fn tag(&self) -> Option<&'a str> {
        self.tag
    }

    /// Start of the interval, in seconds. Relative to the log's base time
    /// when one is present; absolute otherwise.
    pub fn start_timestamp(&self) -> f64 {
        self.start_timestamp
    }

    /// Length of the interval, in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The line's human-readable max column, as written (possibly scaled
    /// down by the writer).
    pub fn max(&self) -> f64 {
        self.max
    }

    /// The base64 payload, undecoded.
    pub fn encoded_histogram(&self) -> &'a str {
        self.encoded_histogram
    }
}

/// One recognized line of an interval log.
#[derive(Debug, PartialEq)]
pub enum LogEntry<'a> {
    /// A `#[StartTime: …]` directive, in seconds since the epoch.
    StartTime(f64),
    /// A `#[BaseTime: …]` directive, in seconds since the epoch.
    BaseTime(f64),
    /// An interval line.
    Interval(IntervalLogLine<'a>),
}

/// A line the scanner could not parse.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct LogParseError {
    /// Byte offset of the offending line in the input.
    pub offset: usize,
}

impl fmt::Display for LogParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "malformed log line at byte offset {}", self.offset)
    }
}

impl error::Error for LogParseError {}

/// Lazy, non-restartable scanner over the lines of an interval log.
///
/// Yields directives and undecoded interval lines; comments and the legend
/// are skipped silently. A malformed line yields an error carrying its byte
/// offset and is then skipped, so iteration can continue past it. Histogram
/// payloads are not touched, which keeps scanning cheap; decode them on
/// demand, or use [`IntervalLogReader`] to get decoded histograms directly.
pub struct IntervalLogIterator<'a> {
    orig_len: usize,
    input: &'a [u8],
}

impl<'a> IntervalLogIterator<'a> {
    /// Scan the UTF-8 bytes of an interval log.
    pub fn new(input: &'a [u8]) -> IntervalLogIterator<'a> {
        IntervalLogIterator {
            orig_len: input.len(),
            input,
        }
    }
}

impl<'a> Iterator for IntervalLogIterator<'a> {
    type Item = Result<LogEntry<'a>, LogParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.input.is_empty() {
                return None;
            }

            // Directives must be tried before the generic comment parser
            // swallows them.
            if let Ok((rest, entry)) = log_entry(self.input) {
                self.input = rest;
                return Some(Ok(entry));
            }

            if let Ok((rest, ())) = ignored_line(self.input) {
                self.input = rest;
                continue;
            }

            // Malformed: report the line's offset, then skip past it so the
            // next call can make progress.
            let offset = self.orig_len - self.input.len();
            match self.input.iter().position(|&b| b == b'\n') {
                Some(newline) => self.input = &self.input[newline + 1..],
                None => self.input = &[],
            }
            return Some(Err(LogParseError { offset }));
        }
    }
}

fn start_time(input: &[u8]) -> IResult<&[u8], LogEntry> {
    map(
        terminated(preceded(literal("#[StartTime: "), double), rest_of_line),
        LogEntry::StartTime,
    )(input)
}

fn base_time(input: &[u8]) -> IResult<&[u8], LogEntry> {
    map(
        terminated(preceded(literal("#[BaseTime: "), double), rest_of_line),
        LogEntry::BaseTime,
    )(input)
}

fn interval_line(input: &[u8]) -> IResult<&[u8], LogEntry> {
    let (input, tag) = opt(preceded(
        literal("Tag="),
        map_res(terminated(take_until(","), char(',')), str::from_utf8),
    ))(input)?;
    let (input, start_timestamp) = terminated(double, char(','))(input)?;
    let (input, duration) = terminated(double, char(','))(input)?;
    let (input, max) = terminated(double, char(','))(input)?;
    let (input, encoded_histogram) = map_res(not_line_ending, str::from_utf8)(input)?;
    let (input, _) = line_ending(input)?;

    Ok((
        input,
        LogEntry::Interval(IntervalLogLine {
            tag,
            start_timestamp,
            duration,
            max,
            encoded_histogram,
        }),
    ))
}

fn log_entry(input: &[u8]) -> IResult<&[u8], LogEntry> {
    alt((start_time, base_time, interval_line))(input)
}

fn comment_line(input: &[u8]) -> IResult<&[u8], ()> {
    map(preceded(literal("#"), rest_of_line), |_| ())(input)
}

fn legend_line(input: &[u8]) -> IResult<&[u8], ()> {
    map(preceded(literal("\"StartTimestamp\""), rest_of_line), |_| ())(input)
}

fn ignored_line(input: &[u8]) -> IResult<&[u8], ()> {
    alt((comment_line, legend_line))(input)
}

fn rest_of_line(input: &[u8]) -> IResult<&[u8], ()> {
    map(terminated(not_line_ending, line_ending), |_| ())(input)
}

// ****************************************************************
// Decoded reading
// ****************************************************************

/// Errors reported to an [`IntervalLogReader`]'s error handler.
#[derive(Debug)]
pub enum LogReadError {
    /// A line did not parse.
    Parse(LogParseError),
    /// An interval payload was not valid base64.
    Base64(base64::DecodeError),
    /// An interval payload did not decode as a histogram.
    Payload(DecodeError),
}

impl fmt::Display for LogReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogReadError::Parse(e) => write!(f, "{}", e),
            LogReadError::Base64(e) => write!(f, "payload is not valid base64: {}", e),
            LogReadError::Payload(e) => write!(f, "payload is not a valid histogram: {}", e),
        }
    }
}

impl error::Error for LogReadError {}

/// One decoded interval of a log.
pub struct LoggedInterval<'a> {
    histogram: Histogram<u64>,
    tag: Option<&'a str>,
    start_timestamp: f64,
    duration: f64,
}

impl<'a> LoggedInterval<'a> {
    /// The decoded histogram. Its start/end timestamps carry the interval's
    /// absolute times in milliseconds.
    pub fn histogram(&self) -> &Histogram<u64> {
        &self.histogram
    }

    /// The decoded histogram, by value.
    pub fn into_histogram(self) -> Histogram<u64> {
        self.histogram
    }

    /// The interval's tag, if any.
    pub fn tag(&self) -> Option<&'a str> {
        self.tag
    }

    /// Absolute start of the interval, in seconds since the epoch (base
    /// time applied).
    pub fn start_timestamp(&self) -> f64 {
        self.start_timestamp
    }

    /// Length of the interval, in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }
}

/// Reads an interval log as a lazy, finite, non-restartable sequence of
/// decoded histograms.
///
/// Each yielded histogram carries its interval's absolute start and end
/// times in its own timestamp fields, computed as the log's base time
/// (0 when absent) plus the line's start column. Malformed lines and
/// payloads that fail to decode are skipped; install a handler with
/// [`on_error`](IntervalLogReader::on_error) to observe them.
///
/// Logs written by older format versions read through the same path:
/// uncompressed payloads are detected by their cookie and absent base
/// times default to zero.
pub struct IntervalLogReader<'a> {
    entries: IntervalLogIterator<'a>,
    start_time: Option<f64>,
    base_time: Option<f64>,
    error_handler: Option<Box<dyn FnMut(LogReadError) + 'a>>,
}

impl<'a> IntervalLogReader<'a> {
    /// Read the UTF-8 bytes of an interval log.
    pub fn new(input: &'a [u8]) -> IntervalLogReader<'a> {
        IntervalLogReader {
            entries: IntervalLogIterator::new(input),
            start_time: None,
            base_time: None,
            error_handler: None,
        }
    }

    /// Install a handler invoked once per skipped line.
    pub fn on_error(mut self, handler: impl FnMut(LogReadError) + 'a) -> IntervalLogReader<'a> {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// The log's `#[StartTime: …]` in seconds since the epoch, once the
    /// scan has passed that directive.
    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// The log's `#[BaseTime: …]` in seconds since the epoch, once the
    /// scan has passed that directive. Treated as 0 when absent.
    pub fn base_time(&self) -> Option<f64> {
        self.base_time
    }

    fn report(&mut self, error: LogReadError) {
        if let Some(handler) = &mut self.error_handler {
            handler(error);
        }
    }

    fn decode_line(
        base_time: f64,
        line: &IntervalLogLine<'a>,
    ) -> Result<LoggedInterval<'a>, LogReadError> {
        let payload = base64::decode(line.encoded_histogram()).map_err(LogReadError::Base64)?;
        let mut histogram =
            Histogram::<u64>::decode_from(&mut payload.as_slice(), 0).map_err(LogReadError::Payload)?;

        let start = base_time + line.start_timestamp();
        let end = start + line.duration();
        histogram.set_start_timestamp((start.max(0.0) * 1000.0).round() as u64);
        histogram.set_end_timestamp((end.max(0.0) * 1000.0).round() as u64);

        Ok(LoggedInterval {
            histogram,
            tag: line.tag(),
            start_timestamp: start,
            duration: line.duration(),
        })
    }
}

impl<'a> Iterator for IntervalLogReader<'a> {
    type Item = LoggedInterval<'a>;

    fn next(&mut self) -> Option<LoggedInterval<'a>> {
        loop {
            match self.entries.next()? {
                Ok(LogEntry::StartTime(seconds)) => self.start_time = Some(seconds),
                Ok(LogEntry::BaseTime(seconds)) => self.base_time = Some(seconds),
                Ok(LogEntry::Interval(line)) => {
                    match Self::decode_line(self.base_time.unwrap_or(0.0), &line) {
                        Ok(interval) => return Some(interval),
                        Err(e) => self.report(e),
                    }
                }
                Err(e) => self.report(LogReadError::Parse(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_rejects_delimiters() {
        assert!(Tag::new("api").is_some());
        assert!(Tag::new("a,b").is_none());
        assert!(Tag::new("a b").is_none());
        assert!(Tag::new("a\nb").is_none());
        assert!(Tag::new("a\rb").is_none());
        assert!(Tag::new("").is_none());
    }

    #[test]
    fn scanner_parses_directives() {
        let log = b"#[StartTime: 1441812279.474 (2015-09-09T15:24:39.474Z)]\n\
                    #[BaseTime: 0.000 (1970-01-01T00:00:00.000Z)]\n";
        let mut scanner = IntervalLogIterator::new(&log[..]);
        assert_eq!(
            scanner.next(),
            Some(Ok(LogEntry::StartTime(1_441_812_279.474)))
        );
        assert_eq!(scanner.next(), Some(Ok(LogEntry::BaseTime(0.0))));
        assert_eq!(scanner.next(), None);
    }

    #[test]
    fn scanner_parses_interval_lines() {
        let log = b"#a comment\n\
                    \"StartTimestamp\",\"Interval_Length\",\"Interval_Max\",\"Interval_Compressed_Histogram\"\n\
                    Tag=api,0.127,1.007,2.769,AAAABBBB\n\
                    1.134,1.002,0.521,CCCCDDDD\n";
        let entries: Vec<_> = IntervalLogIterator::new(&log[..])
            .map(Result::unwrap)
            .collect();
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            LogEntry::Interval(line) => {
                assert_eq!(line.tag(), Some("api"));
                assert_eq!(line.start_timestamp(), 0.127);
                assert_eq!(line.duration(), 1.007);
                assert_eq!(line.max(), 2.769);
                assert_eq!(line.encoded_histogram(), "AAAABBBB");
            }
            other => panic!("unexpected entry {:?}", other),
        }
        match &entries[1] {
            LogEntry::Interval(line) => {
                assert_eq!(line.tag(), None);
                assert_eq!(line.start_timestamp(), 1.134);
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn scanner_skips_malformed_line_and_continues() {
        let log = b"not a log line\n0.1,0.2,0.3,AAAA\n";
        let mut scanner = IntervalLogIterator::new(&log[..]);
        assert_eq!(scanner.next(), Some(Err(LogParseError { offset: 0 })));
        match scanner.next() {
            Some(Ok(LogEntry::Interval(line))) => assert_eq!(line.encoded_histogram(), "AAAA"),
            other => panic!("unexpected entry {:?}", other),
        }
        assert_eq!(scanner.next(), None);
    }

    #[test]
    fn writer_emits_expected_line_shapes() {
        let mut hist = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        hist.record(5_000).unwrap();

        let mut out = Vec::new();
        {
            let mut writer = IntervalLogWriter::new(&mut out);
            writer.write_log_format_version().unwrap();
            writer.write_start_time(1_441_812_279.474).unwrap();
            writer.write_comment("hello").unwrap();
            writer.write_legend().unwrap();
            writer
                .write_interval(0.5, 1.0, &hist, Tag::new("api"))
                .unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("#[Histogram log format version 1.2]"));
        assert!(lines
            .next()
            .unwrap()
            .starts_with("#[StartTime: 1441812279.474 (2015-09-09T"));
        assert_eq!(lines.next(), Some("#hello"));
        assert!(lines.next().unwrap().starts_with("\"StartTimestamp\""));
        let interval = lines.next().unwrap();
        assert!(interval.starts_with("Tag=api,0.500,1.000,"));
        assert_eq!(interval.split(',').count(), 5);
    }

    #[test]
    fn writer_max_value_divisor_scales_max_column() {
        let mut hist = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        hist.record(1_000_000_000).unwrap();

        let mut out = Vec::new();
        {
            let mut writer = IntervalLogWriter::new(&mut out);
            writer.set_max_value_divisor(1_000_000_000.0);
            writer.write_interval(0.0, 1.0, &hist, None).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        // ~1.0, not ~1e9
        let max_column: f64 = text.split(',').nth(2).unwrap().parse().unwrap();
        assert!(max_column > 0.9 && max_column < 1.1);
    }
}
