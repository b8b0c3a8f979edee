pub mod archive;
pub mod capture;
pub mod dispatcher;
pub mod export;
pub mod queue;
pub mod render;
pub mod retention;
pub mod storage;
pub mod store;
