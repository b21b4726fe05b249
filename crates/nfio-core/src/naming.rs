//! On-disk file naming.

/// Build the physical file path for a file number: the prefix followed by
/// the number as a fixed-width, zero-padded 5-digit decimal.
///
/// This is the one on-disk contract that must stay bit-exact so readers
/// written independently of this protocol can locate the files.
pub fn file_name(prefix: &str, file_number: i32) -> String {
    format!("{prefix}{file_number:05}")
}
