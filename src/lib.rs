#![forbid(unsafe_code)]

//! YouTube metadata warehouse: harvests channel, video, playlist and comment
//! metadata from the YouTube Data API v3 and persists it into a local SQLite
//! database so the bundled browser UI can run canned analytic reports over it.

pub mod config;
pub mod harvest;
pub mod mapper;
pub mod reports;
pub mod security;
pub mod store;
pub mod youtube;
