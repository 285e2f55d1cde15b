mod batch;
mod client;
mod fetcher;

pub use batch::{sha1_hex, sha1_matches, DownloadEntry, DownloadPool};
pub use client::{HttpFetcher, RetryPolicy};
pub use fetcher::{fetch_json, fetch_text, not_found_as, DownloadOutcome, Fetcher};
