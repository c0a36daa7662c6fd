mod client;
mod model;

pub use client::{TvMazeClient, UpstreamCatalog};
pub use model::{CountryRef, Externals, NetworkRef, Rating, UpstreamShow};
