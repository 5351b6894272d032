pub mod batches;
pub mod clustering;
pub mod codes;
pub mod consolidation;
pub mod orders;
pub mod ranking;
pub mod scoring;
pub mod sweeper;
