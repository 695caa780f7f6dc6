//! LSD radix sort for run records.
//!
//! Records are distributed into ten buckets by one decimal digit of the key per pass, least significant digit
//! first, and collected back in bucket order. Appending to a bucket keeps the relative order of records with
//! the same digit, so every pass and therefore the whole sort is stable. The number of passes is the decimal
//! width of the largest key, giving *n* \* *d* time for *n* records and *d* digits.

use crate::record::Record;

const RADIX: u64 = 10;

/// Decimal width of `value` (`0` is one digit wide).
pub fn digit_count(mut value: u64) -> u32 {
    let mut count = 1;
    while value >= RADIX {
        value /= RADIX;
        count += 1;
    }
    count
}

/// Sorts records by key in ascending order, keeping the input order of equal keys.
pub fn radix_sort(records: &mut Vec<Record>) {
    let max_key = match records.iter().map(|record| record.key).max() {
        Some(max_key) => max_key,
        None => return,
    };

    let mut buckets: [Vec<Record>; RADIX as usize] = std::array::from_fn(|_| Vec::new());

    for pass in 0..digit_count(max_key) {
        let divisor = RADIX.pow(pass);

        for record in records.drain(..) {
            let digit = (record.key / divisor % RADIX) as usize;
            buckets[digit].push(record);
        }

        // draining leaves every bucket empty for the next pass
        for bucket in buckets.iter_mut() {
            records.extend(bucket.drain(..));
        }
    }
}

#[cfg(test)]
mod test {
    use rand::seq::SliceRandom;
    use rand::Rng;
    use rstest::*;

    use super::{digit_count, radix_sort};
    use crate::record::Record;

    #[rstest]
    #[case(0, 1)]
    #[case(9, 1)]
    #[case(10, 2)]
    #[case(999, 3)]
    #[case(1000, 4)]
    #[case(u64::MAX, 20)]
    fn test_digit_count(#[case] value: u64, #[case] expected: u32) {
        assert_eq!(digit_count(value), expected);
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![7], vec![7])]
    #[case(vec![5, 3, 3, 9, 1], vec![1, 3, 3, 5, 9])]
    #[case(vec![100, 10, 1, 0, 1000], vec![0, 1, 10, 100, 1000])]
    #[case(vec![u64::MAX, 0, u64::MAX - 1], vec![0, u64::MAX - 1, u64::MAX])]
    fn test_radix_sort(#[case] keys: Vec<u64>, #[case] expected: Vec<u64>) {
        let mut records = Vec::from_iter(keys.into_iter().map(|key| Record::new(key, "v")));
        radix_sort(&mut records);

        let actual = Vec::from_iter(records.into_iter().map(|record| record.key));
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_radix_sort_random() {
        let mut rng = rand::thread_rng();
        let mut records = Vec::from_iter((0..1000).map(|i| Record::new(rng.gen_range(0..1_000_000), i.to_string())));

        let mut expected = records.clone();
        expected.sort_by_key(|record| record.key);

        radix_sort(&mut records);
        assert_eq!(records, expected);
    }

    #[test]
    fn test_radix_sort_stability() {
        let input_sorted = (0..20).flat_map(|key| (0..5).map(move |seq| Record::new(key * 37, seq.to_string())));

        let mut input_shuffled = Vec::from_iter(input_sorted.clone());
        input_shuffled.shuffle(&mut rand::thread_rng());
        // order by value so equal keys arrive with ascending sequence numbers
        input_shuffled.sort_by(|a, b| a.value.cmp(&b.value));

        radix_sort(&mut input_shuffled);
        assert_eq!(input_shuffled, Vec::from_iter(input_sorted));
    }
}
