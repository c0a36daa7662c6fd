mod client;
mod model;

pub use client::{DownstreamLibrary, SonarrClient};
pub use model::{AddResult, DownstreamParams, DownstreamSeriesLookup, ExistingSeries, ValidatedDownstreamParams};
