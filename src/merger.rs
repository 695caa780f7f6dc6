//! Loser tree merger.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::mem;

use crate::record::Record;

/// Merge error.
#[derive(Debug)]
pub enum MergeError<E> {
    /// A source failed to produce its next record.
    Source(E),
    /// A source ended before producing the number of records it was created with.
    Truncated { source: usize, expected: u64, read: u64 },
}

impl<E: Error + 'static> Error for MergeError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            MergeError::Source(err) => Some(err),
            MergeError::Truncated { .. } => None,
        }
    }
}

impl<E: Error> Display for MergeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            MergeError::Source(err) => write!(f, "merge source error: {}", err),
            MergeError::Truncated { source, expected, read } => write!(
                f,
                "merge source {} truncated: {} of {} records read",
                source, read, expected
            ),
        }
    }
}

enum Head {
    Active(Record),
    Exhausted,
}

/// One sorted input of a merge: the record source, its current head record and read progress.
pub struct MergeSource<S> {
    // dropped as soon as the last record is read
    source: Option<S>,
    head: Head,
    read: u64,
    total: u64,
}

impl<S, E> MergeSource<S>
where
    S: Iterator<Item = Result<Record, E>>,
{
    /// Creates a merge source that yields exactly `total` records from `source`.
    pub fn new(source: S, total: u64) -> Self {
        MergeSource {
            source: Some(source),
            head: Head::Exhausted,
            read: 0,
            total,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.head, Head::Exhausted)
    }

    /// Moves to the next record and returns the previous head.
    fn advance(&mut self, position: usize) -> Result<Option<Record>, MergeError<E>> {
        let next = if self.read < self.total {
            match self.source.as_mut().and_then(|source| source.next()) {
                Some(Ok(record)) => {
                    self.read += 1;
                    Head::Active(record)
                }
                Some(Err(err)) => return Err(MergeError::Source(err)),
                None => {
                    return Err(MergeError::Truncated {
                        source: position,
                        expected: self.total,
                        read: self.read,
                    })
                }
            }
        } else {
            self.source = None;
            Head::Exhausted
        };

        return Ok(match mem::replace(&mut self.head, next) {
            Head::Active(record) => Some(record),
            Head::Exhausted => None,
        });
    }
}

/// Returns `true` if `candidate` wins the match against `opponent`.
/// Exhausted sources lose to every active one; equal keys go to the lower source position.
fn beats<S>(sources: &[MergeSource<S>], candidate: usize, opponent: usize) -> bool {
    match (&sources[candidate].head, &sources[opponent].head) {
        (Head::Active(a), Head::Active(b)) => (a.key, candidate) < (b.key, opponent),
        (Head::Active(_), Head::Exhausted) => true,
        (Head::Exhausted, Head::Active(_)) => false,
        (Head::Exhausted, Head::Exhausted) => candidate < opponent,
    }
}

/// Tournament tree over `k` merge sources.
///
/// Leaf `i` hangs below slot `(k + i) / 2`. Each internal slot keeps the loser of the match played there,
/// slot `0` keeps the overall winner: the source holding the smallest head record.
pub struct LoserTree {
    slots: Vec<Option<usize>>,
}

impl LoserTree {
    /// Builds the tree by folding every leaf up from a tree of empty slots.
    pub fn build<S>(sources: &[MergeSource<S>]) -> Self {
        let mut tree = LoserTree {
            slots: vec![None; sources.len()],
        };
        for leaf in (0..sources.len()).rev() {
            tree.adjust(sources, leaf);
        }
        return tree;
    }

    /// Source holding the minimum head record.
    pub fn winner(&self) -> Option<usize> {
        self.slots.first().copied().flatten()
    }

    /// Replays the matches on the path from `leaf` to the root after the head of `leaf` has changed.
    pub fn adjust<S>(&mut self, sources: &[MergeSource<S>], leaf: usize) {
        let mut winner = Some(leaf);
        let mut slot = (sources.len() + leaf) / 2;

        while slot > 0 {
            let candidate = match winner {
                Some(candidate) => candidate,
                None => break,
            };

            match self.slots[slot] {
                // first arrival parks and waits for the other subtree
                None => {
                    self.slots[slot] = Some(candidate);
                    winner = None;
                }
                Some(opponent) if !beats(sources, candidate, opponent) => {
                    self.slots[slot] = Some(candidate);
                    winner = Some(opponent);
                }
                Some(_) => {}
            }
            slot /= 2;
        }

        self.slots[0] = winner;
    }
}

/// Loser tree merger implementation.
/// Merges multiple sorted sources into a single sorted output.
/// Time complexity is *m* \* log(*k*) where *m* is the number of records and *k* is the number of sources.
/// Records with equal keys are emitted in source order.
pub struct LoserTreeMerger<S> {
    sources: Vec<MergeSource<S>>,
    tree: LoserTree,
    active: usize,
    initiated: bool,
}

impl<S, E> LoserTreeMerger<S>
where
    S: Iterator<Item = Result<Record, E>>,
{
    /// Creates an instance of a loser tree merger.
    /// Source records should be sorted by key in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `sources` - Sources to be merged in a single sorted one
    pub fn new<I>(sources: I) -> Self
    where
        I: IntoIterator<Item = MergeSource<S>>,
    {
        return LoserTreeMerger {
            sources: Vec::from_iter(sources),
            tree: LoserTree { slots: Vec::new() },
            active: 0,
            initiated: false,
        };
    }

    /// Number of sources that still hold records.
    pub fn active(&self) -> usize {
        self.active
    }

    fn init(&mut self) -> Result<(), MergeError<E>> {
        for (position, source) in self.sources.iter_mut().enumerate() {
            source.advance(position)?;
        }
        self.active = self.sources.iter().filter(|source| !source.is_exhausted()).count();
        self.tree = LoserTree::build(&self.sources);

        return Ok(());
    }

    fn fail(&mut self, err: MergeError<E>) -> Option<Result<Record, MergeError<E>>> {
        self.active = 0;
        self.sources.clear();
        return Some(Err(err));
    }
}

impl<S, E> Iterator for LoserTreeMerger<S>
where
    S: Iterator<Item = Result<Record, E>>,
{
    type Item = Result<Record, MergeError<E>>;

    /// Returns the next record from the sources in ascending key order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            if let Err(err) = self.init() {
                return self.fail(err);
            }
        }

        if self.active == 0 {
            self.sources.clear();
            return None;
        }

        let winner = self.tree.winner()?;
        let record = match self.sources[winner].advance(winner) {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(err) => return self.fail(err),
        };

        if self.sources[winner].is_exhausted() {
            self.active -= 1;
        }
        self.tree.adjust(&self.sources, winner);

        return Some(Ok(record));
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, ErrorKind};

    use rand::Rng;
    use rstest::*;

    use super::{LoserTreeMerger, MergeError, MergeSource};
    use crate::record::Record;

    type VecSource = std::vec::IntoIter<Result<Record, io::Error>>;

    fn source(keys: &[u64], tag: &str) -> MergeSource<VecSource> {
        let records = Vec::from_iter(
            keys.iter()
                .enumerate()
                .map(|(i, key)| Ok(Record::new(*key, format!("{}{}", tag, i)))),
        );
        let total = records.len() as u64;
        MergeSource::new(records.into_iter(), total)
    }

    fn merged_keys(sources: Vec<MergeSource<VecSource>>) -> Vec<u64> {
        let merged: Result<Vec<Record>, _> = LoserTreeMerger::new(sources).collect();
        Vec::from_iter(merged.unwrap().into_iter().map(|record| record.key))
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![vec![], vec![]], vec![])]
    #[case(vec![vec![2, 4]], vec![2, 4])]
    #[case(vec![vec![4, 5, 7], vec![1, 6], vec![3], vec![]], vec![1, 3, 4, 5, 6, 7])]
    #[case(vec![vec![], vec![3, 3, 5], vec![1, 9]], vec![1, 3, 3, 5, 9])]
    #[case(vec![vec![0, 0], vec![0], vec![0, 1]], vec![0, 0, 0, 0, 1])]
    fn test_merger(#[case] runs: Vec<Vec<u64>>, #[case] expected: Vec<u64>) {
        let sources = Vec::from_iter(runs.iter().map(|keys| source(keys, "")));
        assert_eq!(merged_keys(sources), expected);
    }

    #[test]
    fn test_merger_equal_keys_follow_source_order() {
        let sources = vec![source(&[1, 2, 2], "a"), source(&[1, 2], "b"), source(&[0, 2], "c")];

        let merged: Result<Vec<Record>, _> = LoserTreeMerger::new(sources).collect();
        let values = Vec::from_iter(merged.unwrap().into_iter().map(|record| record.value));

        assert_eq!(values, vec!["c0", "a0", "b0", "a1", "a2", "b1", "c1"]);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(7)]
    #[case(16)]
    #[case(100)]
    fn test_merger_random_runs(#[case] k: usize) {
        let mut rng = rand::thread_rng();
        let runs = Vec::from_iter((0..k).map(|_| {
            let len = rng.gen_range(0..50);
            let mut keys = Vec::from_iter((0..len).map(|_| rng.gen_range(0..1000u64)));
            keys.sort();
            keys
        }));

        let mut expected = runs.concat();
        expected.sort();

        let sources = Vec::from_iter(runs.iter().map(|keys| source(keys, "")));
        assert_eq!(merged_keys(sources), expected);
    }

    #[test]
    fn test_merger_source_error() {
        let failing = vec![
            Ok(Record::new(3, "x")),
            Err(io::Error::new(ErrorKind::Other, "test error")),
        ];
        let sources = vec![MergeSource::new(failing.into_iter(), 2), source(&[1, 2], "")];

        let merged = Vec::from_iter(LoserTreeMerger::new(sources));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].as_ref().unwrap().key, 1);
        assert_eq!(merged[1].as_ref().unwrap().key, 2);
        assert!(matches!(merged[2], Err(MergeError::Source(_))));
    }

    #[test]
    fn test_merger_truncated_source() {
        let short = vec![Ok(Record::new(1, "x"))];
        let sources = vec![source(&[0], ""), MergeSource::new(short.into_iter(), 3)];

        let merged = Vec::from_iter(LoserTreeMerger::new(sources));
        assert_eq!(merged.len(), 2);
        assert!(matches!(
            merged[1],
            Err(MergeError::Truncated {
                source: 1,
                expected: 3,
                read: 1
            })
        ));
    }
}
