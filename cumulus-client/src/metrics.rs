//! Transfer counters
//!
//! The library only records; installing an exporter is up to the binary.

use metrics::{counter, describe_counter};

/// Metric names as constants
pub mod names {
    pub const BYTES_UPLOADED: &str = "cumulus_bytes_uploaded_total";
    pub const BYTES_DOWNLOADED: &str = "cumulus_bytes_downloaded_total";
    pub const PIECES_STORED: &str = "cumulus_pieces_stored_total";
    pub const PIECE_FAILURES: &str = "cumulus_piece_failures_total";
    pub const UPLOADS: &str = "cumulus_uploads_total";
}

/// Register metric descriptions with whatever recorder is installed
pub fn describe_metrics() {
    describe_counter!(names::BYTES_UPLOADED, "Bytes sent to storage providers");
    describe_counter!(names::BYTES_DOWNLOADED, "Bytes fetched from storage providers");
    describe_counter!(names::PIECES_STORED, "Pieces acknowledged by a provider");
    describe_counter!(
        names::PIECE_FAILURES,
        "Piece transfers that failed, by storage strategy"
    );
    describe_counter!(names::UPLOADS, "Finished uploads, by result");
}

pub fn record_piece_stored(bytes: u64) {
    counter!(names::PIECES_STORED).increment(1);
    counter!(names::BYTES_UPLOADED).increment(bytes);
}

pub fn record_piece_failure(strategy: &'static str) {
    counter!(names::PIECE_FAILURES, "strategy" => strategy).increment(1);
}

pub fn record_bytes_downloaded(bytes: u64) {
    counter!(names::BYTES_DOWNLOADED).increment(bytes);
}

pub fn record_upload(result: &'static str) {
    counter!(names::UPLOADS, "result" => result).increment(1);
}
