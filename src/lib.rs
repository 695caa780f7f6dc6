//! `kv-ext-sort` is an external sort of `<key> <value>` text records.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts runs of data that each fit in RAM, during the second pass it merges the sorted runs
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Pipelined run generation:**
//!   an ingestion thread streams the source through a bounded rendezvous channel to one or more run builder
//!   threads, so reading the input overlaps with sorting and spilling runs.
//! * **Linear-time run sort:**
//!   runs are sorted by a stable LSD radix sort over the decimal digits of the integer keys.
//! * **Loser tree merge:**
//!   sorted runs are merged with a tournament tree in *log(k)* comparisons per record. When there are more runs
//!   than the merge fan-in, runs are merged in rounds until the final merge fits.
//! * **Pluggable run format:**
//!   run files use the text line format by default, MessagePack run files are available through [`RmpRun`].
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path;
//!
//! use kv_ext_sort::{ExternalSorter, ExternalSorterBuilder};
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!     let output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());
//!
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_run_capacity(100_000)
//!         .with_fan_in(64)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter.sort_into(input_reader, output_writer).unwrap();
//!     println!("{} records sorted in {} runs", summary.records, summary.runs);
//! }
//! ```

pub mod buffer;
pub mod channel;
pub mod generation;
pub mod job;
pub mod merger;
pub mod radix;
pub mod record;
pub mod run;
pub mod sort;

pub use buffer::{RunBuffer, RunBufferBuilder};
pub use channel::{Channel, ChannelClosed, Role};
pub use merger::{LoserTreeMerger, MergeError, MergeSource};
pub use record::{ParseRecordError, Record};
pub use run::{ExternalRun, RmpRun, RunError, TextRun};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortSummary, SortedStream};
