pub mod config;
pub mod ingest;
pub mod measurements;
pub mod retrieval;
