//! Core domain types for a ratings dataset.
//!
//! A dataset is a dense matrix of viewers (rows) by items (columns). The last
//! column is the target item whose rating gets predicted; every other column
//! is a comparison item.

use crate::error::{DataLoadError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

// =============================================================================
// Type Aliases
// =============================================================================

/// Index of a viewer (row) in the rating matrix, `0..n`
pub type ViewerId = usize;

/// A single rating value
pub type Rating = f64;

// =============================================================================
// Rating Matrix
// =============================================================================

/// Dense `n x m` rating matrix stored row-major.
///
/// Immutable once built: the constructors validate the shape, and no method
/// hands out mutable access.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingMatrix {
    viewers: usize,
    items: usize,
    values: Vec<Rating>,
}

impl RatingMatrix {
    /// Build a matrix from row-major values.
    ///
    /// Fails with `InvalidDimensions` if either dimension is zero or
    /// `values.len() != viewers * items`.
    pub fn new(viewers: usize, items: usize, values: Vec<Rating>) -> Result<Self> {
        if viewers == 0 || items == 0 {
            return Err(DataLoadError::InvalidDimensions(format!(
                "matrix must have at least one viewer and one item, got {}x{}",
                viewers, items
            )));
        }
        let expected = viewers.checked_mul(items).ok_or_else(|| {
            DataLoadError::InvalidDimensions(format!("{}x{} overflows usize", viewers, items))
        })?;
        if values.len() != expected {
            return Err(DataLoadError::InvalidDimensions(format!(
                "{}x{} matrix needs {} values, got {}",
                viewers,
                items,
                expected,
                values.len()
            )));
        }
        Ok(Self {
            viewers,
            items,
            values,
        })
    }

    /// Build a matrix from a list of equal-length rows
    pub fn from_rows(rows: &[Vec<Rating>]) -> Result<Self> {
        let items = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != items) {
            return Err(DataLoadError::InvalidDimensions(format!(
                "row {} has {} items, expected {}",
                idx,
                row.len(),
                items
            )));
        }
        let values = rows.iter().flatten().copied().collect();
        Self::new(rows.len(), items, values)
    }

    /// Number of viewers (`n`)
    pub fn viewers(&self) -> usize {
        self.viewers
    }

    /// Number of items per viewer (`m`), target column included
    pub fn items(&self) -> usize {
        self.items
    }

    /// Number of comparison items (`m - 1`)
    pub fn comparison_items(&self) -> usize {
        self.items - 1
    }

    /// Index of the target column (`m - 1`)
    pub fn target_column(&self) -> usize {
        self.items - 1
    }

    /// All ratings of one viewer, or None if out of range
    pub fn row(&self, viewer: ViewerId) -> Option<&[Rating]> {
        if viewer >= self.viewers {
            return None;
        }
        let start = viewer * self.items;
        Some(&self.values[start..start + self.items])
    }

    /// The viewer's rating for the target item
    pub fn target_rating(&self, viewer: ViewerId) -> Option<Rating> {
        self.row(viewer).map(|row| row[self.items - 1])
    }

    /// Contiguous block of rows `range.start..range.end`, row-major.
    ///
    /// Returns None if the range reaches past the last viewer.
    pub fn rows(&self, range: Range<ViewerId>) -> Option<&[Rating]> {
        if range.start > range.end || range.end > self.viewers {
            return None;
        }
        Some(&self.values[range.start * self.items..range.end * self.items])
    }

    /// The whole row-major buffer
    pub fn as_slice(&self) -> &[Rating] {
        &self.values
    }

    /// Mean of the target column over every viewer
    pub fn target_mean(&self) -> Rating {
        let total: Rating = (0..self.viewers)
            .filter_map(|viewer| self.target_rating(viewer))
            .sum();
        total / self.viewers as Rating
    }
}

// =============================================================================
// Query Vector
// =============================================================================

/// The querying user's known ratings for every comparison item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryVector(Vec<Rating>);

impl QueryVector {
    pub fn new(ratings: Vec<Rating>) -> Self {
        Self(ratings)
    }

    /// Parse comma- and/or whitespace-separated ratings, e.g. `"1, 2 3.5,4"`.
    pub fn parse(input: &str) -> Result<Self> {
        let ratings = input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .enumerate()
            .map(|(idx, token)| parse_rating(token, &format!("query[{}]", idx)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(ratings))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Rating] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Rating> {
        self.0
    }
}

impl From<Vec<Rating>> for QueryVector {
    fn from(ratings: Vec<Rating>) -> Self {
        Self(ratings)
    }
}

/// Parse one finite rating value
pub(crate) fn parse_rating(token: &str, field: &str) -> Result<Rating> {
    let value: Rating = token.parse().map_err(|_| DataLoadError::InvalidValue {
        field: field.to_string(),
        value: token.to_string(),
    })?;
    if !value.is_finite() {
        return Err(DataLoadError::InvalidValue {
            field: field.to_string(),
            value: token.to_string(),
        });
    }
    Ok(value)
}
