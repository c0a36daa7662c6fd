mod hash;
mod spec;

pub use hash::filter_hash;
pub use spec::{matches_any_exclude, matching_selection};
