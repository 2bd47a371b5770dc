//! Security validation constants and helpers
//!
//! Header fields come straight off untrusted media, so every size and offset
//! derived from them goes through these checks before anything is allocated.

use crate::Error;

/// Maximum partition entry array we'll read or build (4 MiB)
///
/// A standard array is 128 entries of 128 bytes (16 KiB).
pub const MAX_PARTITION_ARRAY_SIZE: usize = 4 * 1024 * 1024;

/// Maximum file size for memory mapping (16 GB - practical limit for most systems)
pub const MAX_MMAP_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// Validate that a size is within allocation limits
///
/// # Security
/// Prevents memory exhaustion from a forged partition count
pub fn validate_allocation_size(size: u64, limit: usize, context: &str) -> crate::Result<usize> {
    if size > limit as u64 {
        return Err(Error::invalid_zone_table(format!(
            "{} size {} exceeds limit {}",
            context, size, limit
        )));
    }

    size.try_into().map_err(|_| {
        Error::invalid_zone_table(format!("{} size exceeds platform limits", context))
    })
}

/// Safely multiply two u64 values with overflow checking
pub fn checked_multiply_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| Error::invalid_zone_table(format!("{}: multiplication overflow", context)))
}

/// Safely add two u64 values with overflow checking
pub fn checked_add_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| Error::invalid_zone_table(format!("{}: addition overflow", context)))
}

/// Safely subtract two u64 values with underflow checking
pub fn checked_sub_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_sub(b)
        .ok_or_else(|| Error::invalid_zone_table(format!("{}: subtraction underflow", context)))
}

/// Size in bytes of a partition entry array, validated against the allocation limit
pub fn partition_array_size(count: u32, entry_size: u32) -> crate::Result<usize> {
    let size = (count as u64) * (entry_size as u64);
    validate_allocation_size(size, MAX_PARTITION_ARRAY_SIZE, "Partition entry array")
}
