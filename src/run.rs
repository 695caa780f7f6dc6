use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use crate::record::{ParseRecordError, Record};

/// Run file error.
#[derive(Debug)]
pub enum RunError {
    /// Common I/O error.
    IO(io::Error),
    /// Malformed run file line.
    Parse(ParseRecordError),
    /// Record serialization error.
    Encode(rmp_serde::encode::Error),
    /// Record deserialization error.
    Decode(rmp_serde::decode::Error),
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            RunError::IO(err) => err,
            RunError::Parse(err) => err,
            RunError::Encode(err) => err,
            RunError::Decode(err) => err,
        })
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            RunError::IO(err) => write!(f, "run file I/O failed: {}", err),
            RunError::Parse(err) => write!(f, "run file record malformed: {}", err),
            RunError::Encode(err) => write!(f, "run record serialization error: {}", err),
            RunError::Decode(err) => write!(f, "run record deserialization error: {}", err),
        }
    }
}

impl From<io::Error> for RunError {
    fn from(err: io::Error) -> Self {
        RunError::IO(err)
    }
}

/// External run interface. Provides methods for writing a sorted run to the file system and reading it back.
pub trait ExternalRun: Sized + Iterator<Item = Result<Record, RunError>> {
    /// Writes records to a new run file. Returns the number of records written.
    fn create(
        path: &Path,
        records: impl IntoIterator<Item = Record>,
        buf_size: Option<usize>,
    ) -> Result<u64, RunError> {
        let mut run_writer = Self::writer(path, buf_size)?;

        let mut count = 0;
        for record in records.into_iter() {
            Self::dump(&mut run_writer, &record)?;
            count += 1;
        }
        run_writer.flush()?;

        return Ok(count);
    }

    /// Creates a buffered writer for a new run file.
    fn writer(path: &Path, buf_size: Option<usize>) -> Result<io::BufWriter<fs::File>, RunError> {
        let file = fs::File::create(path)?;

        return Ok(match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        });
    }

    /// Opens an existing run file for reading.
    fn open(path: &Path, buf_size: Option<usize>) -> Result<Self, RunError> {
        let file = fs::File::open(path)?;
        let file_len = file.metadata()?.len();

        let run_reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(Self::new(run_reader.take(file_len)));
    }

    /// Creates an instance of an external run.
    fn new(reader: io::Take<io::BufReader<fs::File>>) -> Self;

    /// Dumps one record to a run file.
    fn dump<W: Write>(run_writer: &mut W, record: &Record) -> Result<(), RunError>;
}

/// Text run implementation.
/// It stores records as `<key> <value>` lines, the same format as the sort input and output.
pub struct TextRun {
    reader: io::Take<io::BufReader<fs::File>>,
    line: String,
}

impl ExternalRun for TextRun {
    fn new(reader: io::Take<io::BufReader<fs::File>>) -> Self {
        TextRun {
            reader,
            line: String::new(),
        }
    }

    fn dump<W: Write>(run_writer: &mut W, record: &Record) -> Result<(), RunError> {
        record.write_line(run_writer)?;
        return Ok(());
    }
}

impl Iterator for TextRun {
    type Item = Result<Record, RunError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) => None,
            Ok(_) => Some(self.line.parse().map_err(RunError::Parse)),
            Err(err) => Some(Err(RunError::IO(err))),
        }
    }
}

/// RMP (Rust MessagePack) external run implementation.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
pub struct RmpRun {
    reader: io::Take<io::BufReader<fs::File>>,
}

impl ExternalRun for RmpRun {
    fn new(reader: io::Take<io::BufReader<fs::File>>) -> Self {
        RmpRun { reader }
    }

    fn dump<W: Write>(run_writer: &mut W, record: &Record) -> Result<(), RunError> {
        rmp_serde::encode::write(run_writer, record).map_err(RunError::Encode)
    }
}

impl Iterator for RmpRun {
    type Item = Result<Record, RunError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.limit() == 0 {
            None
        } else {
            match rmp_serde::decode::from_read(&mut self.reader) {
                Ok(record) => Some(Ok(record)),
                Err(err) => Some(Err(RunError::Decode(err))),
            }
        }
    }
}
