pub mod aggregator;
pub mod config;
pub mod feed;
pub mod storage;
pub mod util;
