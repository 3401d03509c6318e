//! Common test utilities and helpers

use logkeep::{FileSink, LogLevel, LogRecord};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a file sink writing into a fresh temporary directory
#[allow(dead_code)]
pub fn create_test_file_sink() -> (FileSink, PathBuf, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("records.log");
    let sink = FileSink::new(&path).expect("Failed to create FileSink");
    (sink, path, temp_dir)
}

/// Deterministic record number `i`: levels cycle, services alternate
pub fn sample_record(i: usize) -> LogRecord {
    LogRecord::new(
        i as i64,
        if i % 2 == 0 { "auth" } else { "billing" },
        LogLevel::ALL[i % LogLevel::ALL.len()],
        format!("Test message number {} with some additional text to make it realistic", i),
    )
}

/// Write `num_records` sample records straight to a file in the line format
#[allow(dead_code)]
pub fn create_log_with_records(dir: &Path, name: &str, num_records: usize) -> PathBuf {
    let log_path = dir.join(name);

    let mut file = BufWriter::new(File::create(&log_path).expect("Failed to create log file"));
    for i in 0..num_records {
        file.write_all(sample_record(i).to_line().as_bytes())
            .expect("Failed to write record");
    }

    file.flush().expect("Failed to flush file");
    log_path
}

/// Read every line of a record file, asserting each one decodes
#[allow(dead_code)]
pub fn read_all_records(path: &Path) -> Vec<LogRecord> {
    let content = std::fs::read_to_string(path).expect("Failed to read log file");
    content
        .lines()
        .enumerate()
        .map(|(i, line)| {
            LogRecord::parse_line(line)
                .unwrap_or_else(|| panic!("Failed to decode line {}: {:?}", i, line))
        })
        .collect()
}

/// Helper to measure execution time
#[allow(dead_code)]
pub fn measure_time<F, R>(f: F) -> (R, std::time::Duration)
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    let duration = start.elapsed();
    (result, duration)
}
