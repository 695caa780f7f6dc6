//! Key-value record and its text line format.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::num::ParseIntError;
use std::str;
use std::str::FromStr;

/// Maximum record value length in bytes.
pub const MAX_VALUE_LEN: usize = 32;

/// Maximum input line length in bytes, line terminator included.
pub const MAX_LINE_LEN: usize = 1024;

/// Record parsing error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseRecordError {
    /// Line holds nothing but whitespace.
    Empty,
    /// Line holds a key but no value.
    MissingValue(String),
    /// Key is not a non-negative integer.
    InvalidKey(String, ParseIntError),
    /// Value is longer than [`MAX_VALUE_LEN`].
    ValueTooLong(usize),
    /// No line terminator within [`MAX_LINE_LEN`] bytes.
    LineTooLong,
    /// Line is not valid UTF-8.
    InvalidUtf8(str::Utf8Error),
}

impl Error for ParseRecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            ParseRecordError::InvalidKey(_, err) => Some(err),
            ParseRecordError::InvalidUtf8(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for ParseRecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            ParseRecordError::Empty => write!(f, "empty record line"),
            ParseRecordError::MissingValue(line) => write!(f, "record value missing: {:?}", line),
            ParseRecordError::InvalidKey(key, err) => write!(f, "invalid record key {:?}: {}", key, err),
            ParseRecordError::ValueTooLong(len) => {
                write!(f, "record value too long: {} bytes (max {})", len, MAX_VALUE_LEN)
            }
            ParseRecordError::LineTooLong => write!(f, "record line longer than {} bytes", MAX_LINE_LEN),
            ParseRecordError::InvalidUtf8(err) => write!(f, "record line is not valid UTF-8: {}", err),
        }
    }
}

/// A record ordered by `key`. The value is payload only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub key: u64,
    pub value: String,
}

impl Record {
    pub fn new(key: u64, value: impl Into<String>) -> Self {
        Record {
            key,
            value: value.into(),
        }
    }

    /// Parses a raw line as read from the channel.
    /// Returns `None` for a whitespace-only line.
    pub fn from_line(line: &[u8]) -> Result<Option<Self>, ParseRecordError> {
        if line.len() >= MAX_LINE_LEN && line.last() != Some(&b'\n') {
            return Err(ParseRecordError::LineTooLong);
        }

        let line = str::from_utf8(line).map_err(ParseRecordError::InvalidUtf8)?;
        match line.parse() {
            Ok(record) => Ok(Some(record)),
            Err(ParseRecordError::Empty) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Writes the record as a `<key> <value>` line.
    pub fn write_line<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "{} {}", self.key, self.value)
    }
}

impl FromStr for Record {
    type Err = ParseRecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseRecordError::Empty);
        }

        let (key, value) = line
            .split_once(|c: char| c.is_ascii_whitespace())
            .ok_or_else(|| ParseRecordError::MissingValue(line.to_string()))?;

        let key = key
            .parse()
            .map_err(|err| ParseRecordError::InvalidKey(key.to_string(), err))?;

        let value = value.trim_start();
        if value.len() > MAX_VALUE_LEN {
            return Err(ParseRecordError::ValueTooLong(value.len()));
        }

        return Ok(Record::new(key, value));
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.value)
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{ParseRecordError, Record, MAX_LINE_LEN};

    #[rstest]
    #[case("5 abc", Record::new(5, "abc"))]
    #[case("17 0M1804289383\n", Record::new(17, "0M1804289383"))]
    #[case("  42\t\tvalue with spaces \r\n", Record::new(42, "value with spaces"))]
    #[case("0 x", Record::new(0, "x"))]
    fn test_parse(#[case] line: &str, #[case] expected: Record) {
        assert_eq!(line.parse::<Record>(), Ok(expected));
    }

    #[rstest]
    #[case("")]
    #[case("   \n")]
    fn test_parse_empty(#[case] line: &str) {
        assert_eq!(line.parse::<Record>(), Err(ParseRecordError::Empty));
        assert_eq!(Record::from_line(line.as_bytes()), Ok(None));
    }

    #[rstest]
    #[case("12")]
    #[case("-3 negative")]
    #[case("abc def")]
    #[case("1 0123456789012345678901234567890123456789")]
    fn test_parse_malformed(#[case] line: &str) {
        assert!(line.parse::<Record>().is_err(), "{:?} accepted", line);
    }

    #[test]
    fn test_line_too_long() {
        let line = format!("1 {}", "x".repeat(MAX_LINE_LEN));
        let line = &line.as_bytes()[..MAX_LINE_LEN];

        assert_eq!(Record::from_line(line), Err(ParseRecordError::LineTooLong));
    }

    #[test]
    fn test_invalid_utf8() {
        let result = Record::from_line(b"1 \xff\xfe\n");
        assert!(matches!(result, Err(ParseRecordError::InvalidUtf8(_))));
    }

    #[test]
    fn test_write_line() {
        let mut buf = Vec::new();
        Record::new(9, "nine").write_line(&mut buf).unwrap();
        assert_eq!(buf, b"9 nine\n");
    }
}
