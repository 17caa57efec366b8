pub mod benchmark;
pub mod cache;
pub mod logging;
pub mod pipeline;
pub mod profile;
pub mod providers;
pub mod resolve;
pub mod schema;
pub mod scoring;
