//! Text/binary classification and oversize exclusion.

use std::fmt;

/// Number of leading bytes inspected by the binary heuristic.
pub const SAMPLE_LEN: usize = 4096;

/// Why a file was left out of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooLarge,
    Binary,
    /// The host reported a directory where a file was expected.
    NotAFile,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::TooLarge => "too large",
            SkipReason::Binary => "binary file",
            SkipReason::NotAFile => "not a file",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Text(String),
    Skipped(SkipReason),
}

/// Size check first, then the binary heuristic, then lossy UTF-8 decoding.
pub fn classify(bytes: &[u8], max_size: u64) -> Classification {
    if bytes.len() as u64 > max_size {
        return Classification::Skipped(SkipReason::TooLarge);
    }
    if is_binary(bytes) {
        return Classification::Skipped(SkipReason::Binary);
    }
    Classification::Text(String::from_utf8_lossy(bytes).into_owned())
}

/// A null byte anywhere in the sample, or more than 30% control bytes, means binary.
pub fn is_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(SAMPLE_LEN)];
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let control = sample.iter().filter(|&&b| is_control(b)).count();
    // control / len > 0.3, kept in integers so the boundary is exact.
    control * 10 > sample.len() * 3
}

fn is_control(b: u8) -> bool {
    b < 7 || (b > 13 && b < 32) || b == 255
}
