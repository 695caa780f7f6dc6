//! External sorter.

use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Mutex;

use crate::buffer::RunBufferBuilder;
use crate::channel::DEFAULT_CHANNEL_SIZE;
use crate::generation::{build_runs, ingest};
use crate::job::{JobContext, RunFile};
use crate::merger::{LoserTreeMerger, MergeError, MergeSource};
use crate::record::{ParseRecordError, Record};
use crate::run::{ExternalRun, RunError, TextRun};

/// Default maximum number of runs merged in one pass.
pub const DEFAULT_FAN_IN: usize = 100;

/// Upper bound of the run ledger pre-allocation derived from the records hint.
const MAX_RUNS_HINT: usize = 1 << 16;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Common I/O error.
    IO(io::Error),
    /// Run file error.
    Run(RunError),
    /// Run merging error.
    Merge(MergeError<RunError>),
    /// Malformed input record.
    InputError(ParseRecordError),
    /// Sorter configuration rejected.
    InvalidConfig(&'static str),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            SortError::TempDir(err) => err,
            SortError::ThreadPoolBuildError(err) => err,
            SortError::IO(err) => err,
            SortError::Run(err) => err,
            SortError::Merge(err) => err,
            SortError::InputError(err) => err,
            SortError::InvalidConfig(_) => return None,
        })
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::Run(err) => write!(f, "run file error: {}", err),
            SortError::Merge(err) => write!(f, "run merging error: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::InvalidConfig(reason) => write!(f, "invalid sorter configuration: {}", reason),
        }
    }
}

/// Sort job statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortSummary {
    /// Number of records ingested.
    pub records: u64,
    /// Number of initial sorted runs.
    pub runs: usize,
    /// Number of merge passes including the final one.
    pub merge_passes: usize,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<C = TextRun>
where
    C: ExternalRun,
{
    /// Number of run builder threads.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Run buffer builder.
    buffer_builder: RunBufferBuilder,
    /// Maximum number of runs merged in one pass.
    fan_in: usize,
    /// Channel capacity in bytes.
    channel_size: usize,
    /// Expected total number of records.
    records_hint: Option<u64>,

    /// External run type.
    external_run_type: PhantomData<C>,
}

impl<C> ExternalSorterBuilder<C>
where
    C: ExternalRun,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<C>, SortError> {
        ExternalSorter::new(
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.buffer_builder,
            self.rw_buf_size,
            self.fan_in,
            self.channel_size,
            self.records_hint,
        )
    }

    /// Sets number of threads building runs in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder<C> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<C> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets run buffer builder.
    pub fn with_buffer(mut self, buffer_builder: RunBufferBuilder) -> ExternalSorterBuilder<C> {
        self.buffer_builder = buffer_builder;
        return self;
    }

    /// Sets number of records per run.
    pub fn with_run_capacity(mut self, run_capacity: usize) -> ExternalSorterBuilder<C> {
        self.buffer_builder = RunBufferBuilder::new(run_capacity, false);
        return self;
    }

    /// Sets maximum number of runs merged in one pass.
    pub fn with_fan_in(mut self, fan_in: usize) -> ExternalSorterBuilder<C> {
        self.fan_in = fan_in;
        return self;
    }

    /// Sets channel capacity in bytes.
    pub fn with_channel_size(mut self, channel_size: usize) -> ExternalSorterBuilder<C> {
        self.channel_size = channel_size;
        return self;
    }

    /// Sets expected total number of records.
    pub fn with_records_hint(mut self, records_hint: u64) -> ExternalSorterBuilder<C> {
        self.records_hint = Some(records_hint);
        return self;
    }

    /// Sets run file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<C> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Switches the run file format, keeping the rest of the configuration.
    pub fn with_run_format<D: ExternalRun>(self) -> ExternalSorterBuilder<D> {
        ExternalSorterBuilder {
            threads_number: self.threads_number,
            tmp_dir: self.tmp_dir,
            rw_buf_size: self.rw_buf_size,
            buffer_builder: self.buffer_builder,
            fan_in: self.fan_in,
            channel_size: self.channel_size,
            records_hint: self.records_hint,
            external_run_type: PhantomData,
        }
    }
}

impl<C> Default for ExternalSorterBuilder<C>
where
    C: ExternalRun,
{
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            buffer_builder: RunBufferBuilder::default(),
            fan_in: DEFAULT_FAN_IN,
            channel_size: DEFAULT_CHANNEL_SIZE,
            records_hint: None,
            external_run_type: PhantomData,
        }
    }
}

/// External sorter.
pub struct ExternalSorter<C = TextRun>
where
    C: ExternalRun,
{
    /// Run generation thread pool: one ingestion task plus the run builders.
    thread_pool: rayon::ThreadPool,
    /// Number of run builder threads.
    threads_number: usize,
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// Run buffer builder.
    buffer_builder: RunBufferBuilder,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Maximum number of runs merged in one pass.
    fan_in: usize,
    /// Channel capacity in bytes.
    channel_size: usize,
    /// Expected total number of records.
    records_hint: Option<u64>,
    // the pool is sized for a single job
    job_lock: Mutex<()>,

    /// External run type.
    external_run_type: PhantomData<C>,
}

impl<C> ExternalSorter<C>
where
    C: ExternalRun,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads building runs in parallel. If the parameter is [`None`]
    ///   a single run builder is used.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `buffer_builder` - Run buffer builder, sets the number of records per run.
    /// * `rw_buf_size` - Run files read/write buffer size.
    /// * `fan_in` - Maximum number of runs merged in one pass, at least 2.
    /// * `channel_size` - Capacity of the channel between ingestion and run builders in bytes.
    /// * `records_hint` - Expected total number of records.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        buffer_builder: RunBufferBuilder,
        rw_buf_size: Option<usize>,
        fan_in: usize,
        channel_size: usize,
        records_hint: Option<u64>,
    ) -> Result<Self, SortError> {
        let threads_number = threads_number.unwrap_or(1);
        if threads_number == 0 {
            return Err(SortError::InvalidConfig("at least one run builder thread required"));
        }
        if buffer_builder.capacity() == 0 {
            return Err(SortError::InvalidConfig("run capacity must be positive"));
        }
        if fan_in < 2 {
            return Err(SortError::InvalidConfig("merge fan-in must be at least 2"));
        }
        if channel_size == 0 {
            return Err(SortError::InvalidConfig("channel size must be positive"));
        }

        return Ok(ExternalSorter {
            threads_number,
            buffer_builder,
            rw_buf_size,
            fan_in,
            channel_size,
            records_hint,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
            job_lock: Mutex::new(()),
            external_run_type: PhantomData,
        });
    }

    fn init_thread_pool(threads_number: usize) -> Result<rayon::ThreadPool, SortError> {
        log::info!("initializing thread-pool (run builders: {})", threads_number);

        // every run builder and the ingestion task block on the channel, so each needs its own thread
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads_number + 1)
            .thread_name(|idx| format!("kv-ext-sort-{}", idx))
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Sorts records read from the input.
    /// Returns a stream performing the final merge of the sorted runs.
    ///
    /// # Arguments
    /// * `input` - Input stream of `<key> <value>` lines
    pub fn sort<R>(&self, input: R) -> Result<SortedStream<C>, SortError>
    where
        R: Read + Send,
    {
        let runs_hint = runs_hint(self.records_hint, self.buffer_builder.capacity());

        let mut ctx = JobContext::new(self.tmp_dir.path(), self.channel_size, runs_hint)
            .map_err(|err| SortError::TempDir(err))?;

        self.generate_runs(&ctx, input);
        if let Some(err) = ctx.take_failure() {
            return Err(err);
        }

        let runs = ctx.take_runs();
        let mut summary = SortSummary {
            records: runs.iter().map(|run| run.records).sum(),
            runs: runs.len(),
            merge_passes: 0,
        };
        log::info!("{} records split into {} sorted runs", summary.records, summary.runs);

        let runs = self.cascade(&mut ctx, runs, &mut summary)?;
        if !runs.is_empty() {
            summary.merge_passes += 1;
        }

        log::info!("final merge of {} runs", runs.len());
        let merger = self.open_merger(&runs)?;

        return Ok(SortedStream {
            merger,
            summary,
            _job_dir: ctx.into_dir(),
        });
    }

    /// Sorts records read from the input and writes them to the output as `<key> <value>` lines.
    ///
    /// # Arguments
    /// * `input` - Input stream of `<key> <value>` lines
    /// * `output` - Output the sorted lines are written to
    pub fn sort_into<R, W>(&self, input: R, output: W) -> Result<SortSummary, SortError>
    where
        R: Read + Send,
        W: Write,
    {
        let mut sorted = self.sort(input)?;
        let mut output_writer = io::BufWriter::new(output);

        for record in &mut sorted {
            record?.write_line(&mut output_writer).map_err(SortError::IO)?;
        }
        output_writer.flush().map_err(SortError::IO)?;

        log::info!("external sort done");

        return Ok(sorted.summary());
    }

    fn generate_runs<R>(&self, ctx: &JobContext, input: R)
    where
        R: Read + Send,
    {
        let _job = self.job_lock.lock().unwrap_or_else(|err| err.into_inner());
        let threads_number = self.threads_number;
        let buffer_builder = self.buffer_builder;
        let rw_buf_size = self.rw_buf_size;

        log::debug!("generating runs ...");
        self.thread_pool.scope(|scope| {
            scope.spawn(move |_| {
                if let Err(err) = ingest(ctx, input) {
                    ctx.fail(err);
                }
            });

            for _ in 0..threads_number {
                scope.spawn(move |_| match build_runs::<C>(ctx, &buffer_builder, rw_buf_size) {
                    Ok(built) => log::debug!("run builder done ({} runs)", built),
                    Err(err) => ctx.fail(err),
                });
            }
        });
        log::debug!("run generation done");
    }

    /// Merges runs in rounds of at most `fan_in` runs until no more than `fan_in` runs are left.
    fn cascade(
        &self,
        ctx: &mut JobContext,
        mut runs: Vec<RunFile>,
        summary: &mut SortSummary,
    ) -> Result<Vec<RunFile>, SortError> {
        while runs.len() > self.fan_in {
            let round = ctx.next_round();
            log::info!("merge round {}: {} runs", round, runs.len());

            let mut merged = Vec::with_capacity((runs.len() + self.fan_in - 1) / self.fan_in);
            for (index, group) in runs.chunks(self.fan_in).enumerate() {
                let path = ctx.run_path(round, index);
                let records = self.merge_group(group, &path)?;
                log::debug!("{} runs merged into {} ({} records)", group.len(), path.display(), records);

                merged.push(RunFile { index, path, records });
                remove_runs(group);
            }

            summary.merge_passes += 1;
            runs = merged;
        }

        return Ok(runs);
    }

    fn merge_group(&self, group: &[RunFile], path: &Path) -> Result<u64, SortError> {
        let merger = self.open_merger(group)?;
        let mut run_writer = C::writer(path, self.rw_buf_size).map_err(SortError::Run)?;

        for record in merger {
            let record = record.map_err(SortError::Merge)?;
            C::dump(&mut run_writer, &record).map_err(SortError::Run)?;
        }
        run_writer.flush().map_err(SortError::IO)?;

        return Ok(group.iter().map(|run| run.records).sum());
    }

    fn open_merger(&self, runs: &[RunFile]) -> Result<LoserTreeMerger<C>, SortError> {
        let mut sources = Vec::with_capacity(runs.len());
        for run in runs {
            let external_run = C::open(&run.path, self.rw_buf_size).map_err(SortError::Run)?;
            sources.push(MergeSource::new(external_run, run.records));
        }

        return Ok(LoserTreeMerger::new(sources));
    }
}

/// Expected number of initial runs, capped at [`MAX_RUNS_HINT`].
fn runs_hint(records_hint: Option<u64>, run_capacity: usize) -> usize {
    return match records_hint {
        Some(records) if run_capacity > 0 => {
            let runs = records.div_ceil(run_capacity as u64);
            usize::try_from(runs).unwrap_or(usize::MAX).min(MAX_RUNS_HINT)
        }
        _ => 0,
    };
}

fn remove_runs(runs: &[RunFile]) {
    for run in runs {
        if let Err(err) = fs::remove_file(&run.path) {
            log::warn!("run file {} not removed: {}", run.path.display(), err);
        }
    }
}

/// Sorted record stream. Performs the final merge lazily and removes the job's run files when dropped.
pub struct SortedStream<C>
where
    C: ExternalRun,
{
    merger: LoserTreeMerger<C>,
    summary: SortSummary,
    _job_dir: tempfile::TempDir,
}

impl<C> SortedStream<C>
where
    C: ExternalRun,
{
    pub fn summary(&self) -> SortSummary {
        self.summary
    }
}

impl<C> Iterator for SortedStream<C>
where
    C: ExternalRun,
{
    type Item = Result<Record, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.merger.next().map(|record| record.map_err(SortError::Merge))
    }
}

impl<C> Debug for SortedStream<C>
where
    C: ExternalRun,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedStream")
            .field("summary", &self.summary)
            .field("active_runs", &self.merger.active())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::io;
    use std::path::Path;

    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{runs_hint, ExternalSorter, ExternalSorterBuilder, SortError, SortSummary, MAX_RUNS_HINT};
    use crate::record::Record;
    use crate::run::RmpRun;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn sorter(tmp_dir: &Path, run_capacity: usize, fan_in: usize, threads: usize) -> ExternalSorter {
        ExternalSorterBuilder::new()
            .with_run_capacity(run_capacity)
            .with_fan_in(fan_in)
            .with_channel_size(64)
            .with_threads_number(threads)
            .with_tmp_dir(tmp_dir)
            .build()
            .unwrap()
    }

    fn to_input(records: &[Record]) -> String {
        records.iter().map(|record| format!("{}\n", record)).collect()
    }

    fn random_records(count: usize) -> Vec<Record> {
        let mut rng = rand::thread_rng();
        Vec::from_iter((0..count).map(|i| Record::new(rng.gen_range(0..10_000), format!("{}M{}", i, rng.gen::<u16>()))))
    }

    fn sort_string(sorter: &ExternalSorter, input: &str) -> (String, SortSummary) {
        let mut output = Vec::new();
        let summary = sorter.sort_into(input.as_bytes(), &mut output).unwrap();
        (String::from_utf8(output).unwrap(), summary)
    }

    fn parse_output(output: &str) -> Vec<Record> {
        Vec::from_iter(output.lines().map(|line| line.parse().unwrap()))
    }

    fn multiset(records: &[Record]) -> HashMap<Record, usize> {
        let mut counts = HashMap::new();
        for record in records {
            *counts.entry(record.clone()).or_insert(0) += 1;
        }
        counts
    }

    #[rstest]
    fn test_small_scenario(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 3, 2, 1);
        let (output, summary) = sort_string(&sorter, "5 a\n3 b\n3 c\n9 d\n1 e\n");

        assert_eq!(output, "1 e\n3 b\n3 c\n5 a\n9 d\n");
        assert_eq!(
            summary,
            SortSummary {
                records: 5,
                runs: 2,
                merge_passes: 1
            }
        );
    }

    #[rstest]
    fn test_default_config_small_input(tmp_dir: tempfile::TempDir) {
        for _ in 0..20 {
            let sorter: ExternalSorter = ExternalSorterBuilder::new().with_tmp_dir(tmp_dir.path()).build().unwrap();
            let (output, summary) = sort_string(&sorter, "5 a\n3 b\n");

            assert_eq!(output, "3 b\n5 a\n");
            assert_eq!(summary.records, 2);
        }
    }

    #[rstest]
    #[case("7 a 2 b\n", "7 a 2 b\n")]
    #[case("12 ab\n", "12 ab\n")]
    #[case("9 longer value\n1 x\n", "1 x\n9 longer value\n")]
    fn test_lines_longer_than_channel(tmp_dir: tempfile::TempDir, #[case] input: &str, #[case] expected: &str) {
        let sorter: ExternalSorter = ExternalSorterBuilder::new()
            .with_channel_size(4)
            .with_threads_number(2)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let (output, summary) = sort_string(&sorter, input);
        assert_eq!(output, expected);
        assert_eq!(summary.records, expected.lines().count() as u64);
    }

    #[rstest]
    #[case(None, 10, 0)]
    #[case(Some(0), 10, 0)]
    #[case(Some(25), 10, 3)]
    #[case(Some(30), 10, 3)]
    #[case(Some(u64::MAX), 10, MAX_RUNS_HINT)]
    #[case(Some(u64::MAX), 1, MAX_RUNS_HINT)]
    fn test_runs_hint(#[case] records: Option<u64>, #[case] capacity: usize, #[case] expected: usize) {
        assert_eq!(runs_hint(records, capacity), expected);
    }

    #[rstest]
    fn test_huge_records_hint(tmp_dir: tempfile::TempDir) {
        let sorter: ExternalSorter = ExternalSorterBuilder::new()
            .with_records_hint(u64::MAX)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        assert_eq!(sort_string(&sorter, "2 b\n1 a\n").0, "1 a\n2 b\n");
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 1)]
    #[case(9, 1)]
    #[case(10, 1)]
    #[case(11, 1)]
    #[case(250, 1)]
    #[case(250, 3)]
    #[case(1000, 4)]
    fn test_external_sorter(tmp_dir: tempfile::TempDir, #[case] count: usize, #[case] threads: usize) {
        let records = random_records(count);
        let sorter = sorter(tmp_dir.path(), 10, 3, threads);

        let (output, summary) = sort_string(&sorter, &to_input(&records));
        let sorted = parse_output(&output);

        assert!(sorted.windows(2).all(|pair| pair[0].key <= pair[1].key));
        assert_eq!(multiset(&sorted), multiset(&records));
        assert_eq!(summary.records, count as u64);
    }

    #[rstest]
    #[case(3, 1)]
    #[case(4, 2)]
    #[case(9, 2)]
    #[case(10, 3)]
    #[case(27, 3)]
    #[case(28, 4)]
    fn test_merge_passes(tmp_dir: tempfile::TempDir, #[case] runs: usize, #[case] expected_passes: usize) {
        let run_capacity = 5;
        let fan_in = 3;
        let records = random_records(runs * run_capacity);
        let sorter = sorter(tmp_dir.path(), run_capacity, fan_in, 1);

        let (output, summary) = sort_string(&sorter, &to_input(&records));

        assert_eq!(summary.runs, runs);
        assert_eq!(summary.merge_passes, expected_passes);
        assert_eq!(parse_output(&output).len(), records.len());
    }

    #[rstest]
    fn test_empty_input(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 10, 3, 2);
        let (output, summary) = sort_string(&sorter, "");

        assert_eq!(output, "");
        assert_eq!(summary, SortSummary::default());
    }

    #[rstest]
    fn test_sorted_input_reproduced(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 7, 2, 1);
        let records = random_records(100);

        let (once, _) = sort_string(&sorter, &to_input(&records));
        let (twice, _) = sort_string(&sorter, &once);

        assert_eq!(twice, once);
    }

    #[rstest]
    fn test_external_sorter_stability(tmp_dir: tempfile::TempDir) {
        let input_sorted = Vec::from_iter((0..20u64).flat_map(|key| (0..5).map(move |seq| Record::new(key, seq.to_string()))));

        let mut input_shuffled = input_sorted.clone();
        input_shuffled.shuffle(&mut rand::thread_rng());
        // order by value so equal keys arrive with ascending sequence numbers
        input_shuffled.sort_by(|a, b| a.value.cmp(&b.value));

        let sorter = sorter(tmp_dir.path(), 8, 3, 1);
        let (output, _) = sort_string(&sorter, &to_input(&input_shuffled));

        assert_eq!(parse_output(&output), input_sorted);
    }

    #[rstest]
    fn test_rmp_runs(tmp_dir: tempfile::TempDir) {
        let records = random_records(200);
        let sorter: ExternalSorter<RmpRun> = ExternalSorterBuilder::new()
            .with_run_capacity(9)
            .with_fan_in(4)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();

        let sorted: Result<Vec<Record>, SortError> = sorter.sort(to_input(&records).as_bytes()).unwrap().collect();
        let sorted = sorted.unwrap();

        assert!(sorted.windows(2).all(|pair| pair[0].key <= pair[1].key));
        assert_eq!(multiset(&sorted), multiset(&records));
    }

    #[rstest]
    fn test_run_files_removed(tmp_dir: tempfile::TempDir) {
        let sorter = sorter(tmp_dir.path(), 2, 2, 1);
        sort_string(&sorter, "4 a\n3 b\n2 c\n1 d\n0 e\n");

        let leftovers = walk(tmp_dir.path());
        assert!(leftovers.is_empty(), "leftover files: {:?}", leftovers);
    }

    fn walk(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                files.extend(walk(&path));
            } else {
                files.push(path);
            }
        }
        files
    }

    #[rstest]
    #[case("1 a\n2\n3 c\n")]
    #[case("1 a\n-2 b\n")]
    #[case("x y\n")]
    fn test_malformed_input(tmp_dir: tempfile::TempDir, #[case] input: &str) {
        let sorter = sorter(tmp_dir.path(), 2, 2, 2);
        let result = sorter.sort_into(input.as_bytes(), io::sink());

        assert!(matches!(result, Err(SortError::InputError(_))));
    }

    #[rstest]
    #[case(0, 3, 64)]
    #[case(10, 1, 64)]
    #[case(10, 3, 0)]
    fn test_invalid_config(
        tmp_dir: tempfile::TempDir,
        #[case] run_capacity: usize,
        #[case] fan_in: usize,
        #[case] channel_size: usize,
    ) {
        let result: Result<ExternalSorter, _> = ExternalSorterBuilder::new()
            .with_run_capacity(run_capacity)
            .with_fan_in(fan_in)
            .with_channel_size(channel_size)
            .with_tmp_dir(tmp_dir.path())
            .build();

        assert!(matches!(result, Err(SortError::InvalidConfig(_))));
    }
}
