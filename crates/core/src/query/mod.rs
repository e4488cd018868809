//! Query criteria, canonical digests, and row matching.

mod hashing;
mod matching;
mod types;

pub use hashing::{canonical_query, digest_params, query_digest};
pub use matching::{apply_query, compare_rows, compare_values, row_is_trashed, row_matches};
pub use types::{is_valid_field_name, Criteria, Direction, Filter, OrderBy, Page, Query};
