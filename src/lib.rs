pub mod cli;
pub mod config;
pub mod core;
pub mod extractors;
pub mod server;
pub mod utils;

pub use config::Config;
pub use core::{DownloadRequest, Downloader, Result, Transport, Tv5Error};
pub use extractors::Tv5Extractor;
