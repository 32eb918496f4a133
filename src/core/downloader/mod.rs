pub mod client;
pub mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{is_present, DownloadTask, Downloader, FetchOutcome, RetryPolicy};
pub use pool::{BatchReport, DownloadPool, ProgressFn};
