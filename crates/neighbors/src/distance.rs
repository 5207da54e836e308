//! DistanceComputer - L1 distance from each local viewer to the query.
//!
//! Only the comparison columns `0..m-1` take part; the target column is
//! skipped. Rows are independent, so a slice is split across the rayon pool.

use data_loader::Rating;
use rayon::prelude::*;

/// Rows per rayon task. Small slices are computed inline.
const PARALLEL_MIN_ROWS: usize = 1024;

/// Manhattan distance `sum |query[j] - row[j]|` over `query.len()` columns.
///
/// `row` may be longer than `query` (it usually carries the target rating
/// as its last element); the extra tail is ignored.
pub fn manhattan(query: &[Rating], row: &[Rating]) -> f64 {
    query
        .iter()
        .zip(row)
        .map(|(q, r)| (q - r).abs())
        .sum()
}

/// Distance for every row of a row-major block of width `items`.
///
/// Returns one value per row, in row order. An empty block yields an empty
/// vector.
pub fn distances(rows: &[Rating], items: usize, query: &[Rating]) -> Vec<f64> {
    if rows.is_empty() || items == 0 {
        return Vec::new();
    }

    let row_count = rows.len() / items;
    if row_count < PARALLEL_MIN_ROWS {
        return rows
            .chunks_exact(items)
            .map(|row| manhattan(query, row))
            .collect();
    }

    rows.par_chunks_exact(items)
        .with_min_len(PARALLEL_MIN_ROWS / 4)
        .map(|row| manhattan(query, row))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manhattan_basic() {
        assert_eq!(manhattan(&[1.0, 2.0, 3.0, 4.0], &[2.0, 2.0, 2.0, 2.0, 2.0]), 4.0);
        assert_eq!(manhattan(&[1.0, 2.0, 3.0, 4.0], &[5.0, 4.0, 3.0, 2.0, 5.0]), 8.0);
    }

    #[test]
    fn test_target_column_ignored() {
        let query = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(manhattan(&query, &[1.0, 2.0, 3.0, 4.0, 5.0]), 0.0);
        assert_eq!(manhattan(&query, &[1.0, 2.0, 3.0, 4.0, 1.0]), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let a = [0.5, 4.0, 2.5];
        let b = [3.0, 1.0, 5.0];
        assert_eq!(manhattan(&a, &b), manhattan(&b, &a));
        assert_eq!(manhattan(&a, &b), 8.0);
    }

    #[test]
    fn test_distances_per_row() {
        let rows = [
            1.0, 2.0, 3.0, 4.0, 5.0, //
            2.0, 2.0, 2.0, 2.0, 2.0, //
            1.0, 2.0, 3.0, 4.0, 1.0, //
            5.0, 4.0, 3.0, 2.0, 5.0,
        ];
        let result = distances(&rows, 5, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(result, vec![0.0, 4.0, 0.0, 8.0]);
    }

    #[test]
    fn test_empty_slice() {
        assert!(distances(&[], 5, &[1.0, 2.0, 3.0, 4.0]).is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let items = 6;
        let rows: Vec<Rating> = (0..PARALLEL_MIN_ROWS * 3 * items)
            .map(|i| ((i * 7) % 10) as Rating * 0.5)
            .collect();
        let query = [1.0, 2.5, 0.5, 5.0, 3.0];

        let parallel = distances(&rows, items, &query);
        let sequential: Vec<f64> = rows
            .chunks_exact(items)
            .map(|row| manhattan(&query, row))
            .collect();
        assert_eq!(parallel, sequential);
    }
}
