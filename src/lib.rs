pub mod cache;
pub mod cli;
pub mod config;
pub mod conflict;
pub mod context;
pub mod flock;
pub mod matcher;
pub mod model;
pub mod pattern;
pub mod report;
pub mod repository;
pub mod resolve;
pub mod resolver;
pub mod retrieve;
pub mod settings;
pub mod version;

mod api;

pub use api::{Trellis, TrellisBuilder};
