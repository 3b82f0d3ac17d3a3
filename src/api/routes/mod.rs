pub mod demo;
pub mod health;
pub mod ingest;
pub mod metrics;
pub mod register;
pub mod rules;
pub mod stats;
