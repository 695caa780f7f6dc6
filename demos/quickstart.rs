use std::fs;
use std::io;
use std::path;

use env_logger;
use log;

use kv_ext_sort::{ExternalSorter, ExternalSorterBuilder};

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
    let output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());

    let sorter: ExternalSorter = ExternalSorterBuilder::new()
        .with_tmp_dir(path::Path::new("./"))
        .with_run_capacity(1_000_000)
        .with_threads_number(2)
        .build()
        .unwrap();

    let summary = sorter.sort_into(input_reader, output_writer).unwrap();
    log::info!("{} records sorted in {} merge passes", summary.records, summary.merge_passes);
}
