pub mod config;
pub mod errors;
pub mod ingestor;
pub mod job_scheduling;
pub mod models;
pub mod observability;
pub mod services;
pub mod sources;
pub mod supervisor;
pub mod window;
