//! # Data Loader Crate
//!
//! Loads a dense ratings file into a [`RatingMatrix`] and parses the querying
//! user's partial rating vector.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (RatingMatrix, QueryVector)
//! - **parser**: Parse `n m` ratings files into a RatingMatrix
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{load_ratings, QueryVector};
//! use std::path::Path;
//!
//! let matrix = load_ratings(Path::new("data/ratings.txt"))?;
//! let query = QueryVector::parse("4, 3.5, 5, 2")?;
//!
//! println!("{} viewers rated {} items", matrix.viewers(), matrix.items());
//! ```

// Public modules
pub mod error;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use parser::{load_ratings, parse_ratings};
pub use types::{QueryVector, Rating, RatingMatrix, ViewerId};
