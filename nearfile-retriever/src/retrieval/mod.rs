pub mod engine;
pub mod ingest;
pub mod loader;
pub mod locator;
pub mod scoring;
