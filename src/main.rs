use std::fs;
use std::io;
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use kv_ext_sort::{ExternalRun, ExternalSorter, ExternalSorterBuilder, RmpRun, TextRun};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let run_format: RunFormat = arg_parser.value_of_t_or_exit("run_format");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let run_capacity: usize = arg_parser.value_of_t_or_exit("run_capacity");
    let fan_in: usize = arg_parser.value_of_t_or_exit("fan_in");
    let channel_size = arg_parser.value_of("channel_size").expect("value is defaulted");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream = match fs::File::open(input) {
        Ok(file) => io::BufReader::new(file),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let output_stream = match fs::File::create(output) {
        Ok(file) => file,
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_run_capacity(run_capacity)
        .with_fan_in(fan_in)
        .with_channel_size(channel_size.parse::<ByteSize>().expect("value is pre-validated").as_u64() as usize);

    if let Some(threads) = threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    match run_format {
        RunFormat::Text => sort::<TextRun>(sorter_builder, input_stream, output_stream),
        RunFormat::Msgpack => sort::<RmpRun>(sorter_builder.with_run_format(), input_stream, output_stream),
    }
}

fn sort<C: ExternalRun>(sorter_builder: ExternalSorterBuilder<C>, input: io::BufReader<fs::File>, output: fs::File) {
    let sorter: ExternalSorter<C> = match sorter_builder.build() {
        Ok(sorter) => sorter,
        Err(err) => {
            log::error!("sorter initialization error: {}", err);
            process::exit(1);
        }
    };

    match sorter.sort_into(input, output) {
        Ok(summary) => log::info!(
            "{} records sorted ({} runs, {} merge passes)",
            summary.records,
            summary.runs,
            summary.merge_passes
        ),
        Err(err) => {
            log::error!("data sorting error: {}", err);
            process::exit(1);
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum RunFormat {
    Text,
    Msgpack,
}

impl RunFormat {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        RunFormat::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for RunFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <RunFormat as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("kv-ext-sort")
        .about("external sorter of <key> <value> records")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("run_capacity")
                .short('c')
                .long("run-capacity")
                .help("number of records per sorted run")
                .takes_value(true)
                .default_value("10000"),
        )
        .arg(
            clap::Arg::new("fan_in")
                .short('f')
                .long("fan-in")
                .help("maximum number of runs merged at once")
                .takes_value(true)
                .default_value("100"),
        )
        .arg(
            clap::Arg::new("channel_size")
                .short('b')
                .long("channel-size")
                .help("size of the buffer between the reader and the run builders")
                .takes_value(true)
                .default_value("1MiB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Channel size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("run_format")
                .short('r')
                .long("run-format")
                .help("temporary run file format")
                .takes_value(true)
                .default_value("text")
                .possible_values(RunFormat::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of run builder threads")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
