pub mod archive;
pub mod job;
pub mod snapshot;
