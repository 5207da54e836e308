//! Parser for ratings files.
//!
//! Format:
//! ```text
//! n m
//! rating[0][0] rating[0][1] ... rating[0][m-1]
//! ...
//! rating[n-1][0] ... rating[n-1][m-1]
//! ```
//!
//! Tokens are whitespace separated and line breaks carry no meaning, so a
//! row may be wrapped across lines. Line numbers are tracked only for error
//! messages.

use crate::error::{DataLoadError, Result};
use crate::types::{parse_rating, RatingMatrix};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read and parse a ratings file from disk
pub fn load_ratings(path: &Path) -> Result<RatingMatrix> {
    let content = fs::read_to_string(path)?;
    let matrix = parse_ratings(&content)?;
    debug!(
        "Loaded {} viewers x {} items from {}",
        matrix.viewers(),
        matrix.items(),
        path.display()
    );
    Ok(matrix)
}

/// Parse the contents of a ratings file
pub fn parse_ratings(content: &str) -> Result<RatingMatrix> {
    let mut tokens = content
        .lines()
        .enumerate()
        .flat_map(|(idx, line)| line.split_whitespace().map(move |token| (idx + 1, token)));

    let viewers = parse_dimension(tokens.next(), "n")?;
    let items = parse_dimension(tokens.next(), "m")?;
    if viewers == 0 || items == 0 {
        return Err(DataLoadError::InvalidDimensions(format!(
            "header declares {}x{}, both must be non-zero",
            viewers, items
        )));
    }
    let expected = viewers.checked_mul(items).ok_or_else(|| {
        DataLoadError::InvalidDimensions(format!("{}x{} overflows usize", viewers, items))
    })?;

    // The header is untrusted; every value takes at least two bytes of content
    let mut values = Vec::with_capacity(expected.min(content.len() / 2 + 1));
    let mut last_line = 1;
    while let Some((line, token)) = tokens.next() {
        last_line = line;
        if values.len() == expected {
            return Err(DataLoadError::FieldCountMismatch {
                expected,
                found: expected + 1 + tokens.count(),
                line,
            });
        }
        let row = values.len() / items;
        let col = values.len() % items;
        values.push(parse_rating(token, &format!("rating[{}][{}]", row, col)).map_err(
            |e| match e {
                DataLoadError::InvalidValue { field, value } => DataLoadError::ParseError {
                    line,
                    reason: format!("invalid {}: {}", field, value),
                },
                other => other,
            },
        )?);
    }

    if values.len() != expected {
        return Err(DataLoadError::FieldCountMismatch {
            expected,
            found: values.len(),
            line: last_line,
        });
    }

    RatingMatrix::new(viewers, items, values)
}

fn parse_dimension(token: Option<(usize, &str)>, name: &str) -> Result<usize> {
    let (line, token) = token.ok_or_else(|| DataLoadError::ParseError {
        line: 1,
        reason: format!("missing header field {}", name),
    })?;
    token.parse().map_err(|e| DataLoadError::ParseError {
        line,
        reason: format!("invalid header field {} '{}': {}", name, token, e),
    })
}
