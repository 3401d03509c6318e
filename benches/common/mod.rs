//! Common utilities for benchmarks

use logkeep::{LogLevel, LogRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::path::PathBuf;

const SERVICES: [&str; 4] = ["auth", "billing", "search", "gateway"];

/// Generate `count` reproducible records with mixed services and levels
pub fn random_records(count: usize, seed: u64) -> Vec<LogRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            LogRecord::new(
                i as i64,
                SERVICES[rng.gen_range(0..SERVICES.len())],
                LogLevel::ALL[rng.gen_range(0..LogLevel::ALL.len())],
                format!(
                    "Request {} finished with some additional text to make it realistic: {}",
                    i,
                    "x".repeat(rng.gen_range(0..64))
                ),
            )
        })
        .collect()
}

/// Create a record file with `num_records` random records
pub fn create_record_file(dir: &Path, num_records: usize) -> PathBuf {
    let path = dir.join(format!("records-{}.log", num_records));
    let mut file = BufWriter::new(File::create(&path).expect("Failed to create record file"));

    for record in random_records(num_records, 42) {
        file.write_all(record.to_line().as_bytes())
            .expect("Failed to write record");
    }

    file.flush().expect("Failed to flush file");
    path
}
