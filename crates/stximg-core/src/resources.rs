//! Resource reservations for one stage run.
//!
//! Every field degrades independently to "unspecified" (let the execution
//! environment pick a default) when its prerequisite input is absent;
//! estimation itself never fails.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

/// Fixed floor reserved for outputs, regardless of inputs (MiB).
pub const OUTPUT_STORAGE_FLOOR_MIB: u64 = 1000;

/// Memory reserved per requested worker process (MiB).
///
/// Empirical working-set model: each process carries roughly a 20-tile
/// window at ~24 MiB per tile.
pub const MEMORY_PER_PROCESS_MIB: u64 = 20 * 24;

/// Divisor mapping input data size to a memory floor.
///
/// For large inputs the data-proportional term dominates the per-process
/// term: reserve at least 1/75th of the input size.
pub const MEMORY_DIR_SIZE_DIVISOR: u64 = 75;

/// Resource reservations for the external processing job.
///
/// Computed once immediately before invocation and passed to the execution
/// environment alongside the invocation, never as executable flags.
/// `None` means "unspecified": the environment chooses its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceEstimate {
    /// Temporary storage for the working directory (MiB).
    pub temporary_storage_mib: Option<u64>,
    /// Storage reserved for outputs (MiB); always at least the fixed floor.
    pub output_storage_mib: u64,
    /// CPU cores; unspecified means "use all available".
    pub cpu_cores: Option<u32>,
    /// Memory reservation (MiB).
    pub memory_mib: Option<u64>,
}

/// Computes the reservation set from input size and requested parallelism.
///
/// - temporary storage mirrors the input directory size when known;
/// - output storage is the fixed [`OUTPUT_STORAGE_FLOOR_MIB`];
/// - cores mirror the requested process count when known;
/// - memory is `max(n_processes * MEMORY_PER_PROCESS_MIB,
///   dir_size / MEMORY_DIR_SIZE_DIVISOR)`, unspecified without a process
///   count.
#[must_use]
pub fn estimate(dir_size_mib: Option<u64>, n_processes: Option<u32>) -> ResourceEstimate {
    let memory_mib = n_processes.map(|processes| {
        let per_process = u64::from(processes) * MEMORY_PER_PROCESS_MIB;
        let data_floor = dir_size_mib.unwrap_or(0) / MEMORY_DIR_SIZE_DIVISOR;
        per_process.max(data_floor)
    });

    let estimate = ResourceEstimate {
        temporary_storage_mib: dir_size_mib,
        output_storage_mib: OUTPUT_STORAGE_FLOOR_MIB,
        cpu_cores: n_processes,
        memory_mib,
    };

    if dir_size_mib.is_none() {
        info!("input size unknown, deferring temporary storage to platform default");
    }
    if n_processes.is_none() {
        info!("process count unknown, deferring cores and memory to platform default");
    }
    debug!(?estimate, "resource estimate computed");
    estimate
}

/// Measures the total size of a directory tree, in MiB (rounded up).
///
/// Convenience for callers that want to feed [`estimate`] from the input
/// directory when no size was supplied upstream.
///
/// # Errors
///
/// Returns the first IO error encountered while walking the tree.
pub fn measure_dir_size_mib(root: &Path) -> io::Result<u64> {
    let mut total_bytes: u64 = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                pending.push(entry.path());
            } else {
                total_bytes = total_bytes.saturating_add(metadata.len());
            }
        }
    }
    Ok(total_bytes.div_ceil(1024 * 1024))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_per_process_term_dominates_small_inputs() {
        let estimate = estimate(Some(7500), Some(5));
        assert_eq!(estimate.temporary_storage_mib, Some(7500));
        assert_eq!(estimate.output_storage_mib, 1000);
        assert_eq!(estimate.cpu_cores, Some(5));
        // max(5 * 480, 7500 / 75) = max(2400, 100)
        assert_eq!(estimate.memory_mib, Some(2400));
    }

    #[test]
    fn test_data_term_dominates_large_inputs() {
        let estimate = estimate(Some(300_000), Some(2));
        // max(2 * 480, 300000 / 75) = max(960, 4000)
        assert_eq!(estimate.memory_mib, Some(4000));
    }

    #[test]
    fn test_all_unspecified_keeps_output_floor() {
        let estimate = estimate(None, None);
        assert_eq!(estimate.temporary_storage_mib, None);
        assert_eq!(estimate.cpu_cores, None);
        assert_eq!(estimate.memory_mib, None);
        assert_eq!(estimate.output_storage_mib, OUTPUT_STORAGE_FLOOR_MIB);
    }

    #[test]
    fn test_memory_unspecified_without_process_count() {
        let estimate = estimate(Some(7500), None);
        assert_eq!(estimate.temporary_storage_mib, Some(7500));
        assert_eq!(estimate.memory_mib, None);
    }

    #[test]
    fn test_memory_with_process_count_but_unknown_size() {
        let estimate = estimate(None, Some(3));
        assert_eq!(estimate.memory_mib, Some(3 * MEMORY_PER_PROCESS_MIB));
    }

    #[test]
    fn test_measure_dir_size_rounds_up() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("fov_000");
        std::fs::create_dir(&nested).unwrap();
        let mut file = std::fs::File::create(nested.join("tile.bin")).unwrap();
        file.write_all(&[0u8; 1500]).unwrap();

        // 1500 bytes is far below 1 MiB but must round up, not to zero.
        assert_eq!(measure_dir_size_mib(dir.path()).unwrap(), 1);
    }

    #[test]
    fn test_measure_empty_dir_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(measure_dir_size_mib(dir.path()).unwrap(), 0);
    }
}
