//! Allocation of the large per-process arrays
//!
//! There is no checkpoint to fall back to while the initial guess is being
//! built, so failing to allocate is fatal for the process.

use tracing::error;

/// Allocate `len` copies of `value`, or log and terminate the process.
pub fn alloc_or_exit<T: Clone>(len: usize, value: T, what: &str) -> Vec<T> {
    let mut buf = Vec::new();
    if let Err(e) = buf.try_reserve_exact(len) {
        error!(
            "Memory allocation failed for {} ({} elements of {} bytes): {}",
            what,
            len,
            std::mem::size_of::<T>(),
            e
        );
        std::process::exit(1);
    }
    buf.resize(len, value);
    buf
}

/// `a * b`, or log and terminate the process if the element count overflows.
pub fn checked_len(a: usize, b: usize, what: &str) -> usize {
    match a.checked_mul(b) {
        Some(n) => n,
        None => {
            error!("Memory allocation failed for {}: {} x {} overflows", what, a, b);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_fills_value() {
        let v = alloc_or_exit(5, 0.25f64, "test buffer");
        assert_eq!(v, vec![0.25; 5]);
        assert_eq!(checked_len(3, 4, "test"), 12);
    }
}
