//! Run generation.
//!
//! The ingestion task streams raw source bytes into the job channel. Run builders drain the channel line by
//! line, each filling, sorting and persisting one run per claimed run index until the channel is closed.

use std::io;
use std::io::prelude::*;

use crate::buffer::RunBufferBuilder;
use crate::channel::Role;
use crate::job::JobContext;
use crate::record::{Record, MAX_LINE_LEN};
use crate::run::ExternalRun;
use crate::sort::SortError;

/// Size of the chunks the ingestion task reads from the source.
pub const INGEST_CHUNK_SIZE: usize = 1024;

/// Streams the input into the job channel as the channel producer.
/// Returns the number of bytes ingested.
pub fn ingest<R: Read>(ctx: &JobContext, mut input: R) -> Result<u64, SortError> {
    let channel = ctx.channel();
    let _producer = channel.registration(Role::Producer);

    let mut buf = [0; INGEST_CHUNK_SIZE];
    let mut ingested = 0;

    loop {
        let len = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(SortError::IO(err)),
        };

        if channel.write_all(&buf[..len]).is_err() {
            log::warn!("no run builder left, ingestion stopped after {} bytes", ingested);
            break;
        }
        ingested += len as u64;
    }

    log::debug!("ingestion done ({} bytes)", ingested);
    return Ok(ingested);
}

/// Builds sorted runs from the job channel as a channel consumer.
/// Returns the number of runs persisted by this builder.
pub fn build_runs<C: ExternalRun>(
    ctx: &JobContext,
    buffer_builder: &RunBufferBuilder,
    rw_buf_size: Option<usize>,
) -> Result<usize, SortError> {
    let channel = ctx.channel();
    let _consumer = channel.registration(Role::Consumer);

    let mut line = Vec::with_capacity(MAX_LINE_LEN);
    let mut built = 0;

    while !ctx.is_failed() {
        let index = ctx.claim_index();
        let mut buffer = buffer_builder.build();

        while !buffer.is_full() {
            line.clear();
            if channel.read_line(&mut line, MAX_LINE_LEN).is_err() {
                break;
            }
            match Record::from_line(&line).map_err(SortError::InputError)? {
                Some(record) => buffer.push(record),
                None => log::trace!("blank line skipped"),
            }
        }

        if buffer.is_empty() {
            log::debug!("run {} got no records, input exhausted", index);
            break;
        }

        log::debug!("sorting run {} ({} records) ...", index, buffer.len());
        buffer.sort();

        let path = ctx.run_path(ctx.round(), index);
        let records = C::create(&path, buffer, rw_buf_size).map_err(SortError::Run)?;
        ctx.record_run(index, records);
        log::debug!("run {} saved to {}", index, path.display());

        built += 1;
    }

    return Ok(built);
}
