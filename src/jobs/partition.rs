//! Round-robin partitioning of jobs across workers.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("partition count must be positive, got {0}")]
    InvalidPartitionCount(usize),
}

/// Jobs split into one ordered sub-sequence per worker.
///
/// Built once per orchestration run and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobBatch<T> {
    partitions: Vec<Vec<T>>,
}

impl<T> JobBatch<T> {
    /// Wraps partitions that were assigned earlier, e.g. read back from disk.
    pub(crate) fn from_partitions(partitions: Vec<Vec<T>>) -> Self {
        Self { partitions }
    }

    pub fn partitions(&self) -> &[Vec<T>] {
        &self.partitions
    }

    pub fn partition(&self, index: usize) -> Option<&[T]> {
        self.partitions.get(index).map(Vec::as_slice)
    }

    /// Number of partitions (the worker count).
    pub fn worker_count(&self) -> usize {
        self.partitions.len()
    }

    /// Total number of jobs across all partitions.
    pub fn job_count(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.partitions.iter().map(Vec::len).collect()
    }

    pub fn into_partitions(self) -> Vec<Vec<T>> {
        self.partitions
    }
}

impl<T: Clone> JobBatch<T> {
    /// Re-interleaves the partitions, recovering the original job order.
    pub fn interleave(&self) -> Vec<T> {
        let mut jobs = Vec::with_capacity(self.job_count());
        let longest = self.partitions.first().map_or(0, Vec::len);
        for round in 0..longest {
            for part in &self.partitions {
                if let Some(job) = part.get(round) {
                    jobs.push(job.clone());
                }
            }
        }
        jobs
    }
}

/// Splits `jobs` into `n` partitions, sending job `i` to partition `i % n`.
///
/// Every job lands in exactly one partition, partition sizes differ by at
/// most one, and relative order is preserved inside each partition. The
/// result depends only on the inputs. Partitions may be empty when there are
/// fewer jobs than workers.
///
/// # Errors
///
/// [`PartitionError::InvalidPartitionCount`] when `n == 0`.
///
/// # Example
///
/// ```
/// use epbatch::jobs::partition;
///
/// let batch = partition(&[1, 2, 3, 4, 5], 2)?;
/// assert_eq!(batch.partitions(), &[vec![1, 3, 5], vec![2, 4]]);
/// # Ok::<(), epbatch::jobs::PartitionError>(())
/// ```
pub fn partition<T: Clone>(jobs: &[T], n: usize) -> Result<JobBatch<T>, PartitionError> {
    if n == 0 {
        return Err(PartitionError::InvalidPartitionCount(n));
    }

    let mut partitions: Vec<Vec<T>> = (0..n)
        .map(|k| Vec::with_capacity(jobs.len() / n + usize::from(k < jobs.len() % n)))
        .collect();
    for (i, job) in jobs.iter().enumerate() {
        partitions[i % n].push(job.clone());
    }

    Ok(JobBatch { partitions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_partitions_rejected() {
        assert_eq!(
            partition(&[1, 2, 3], 0).unwrap_err(),
            PartitionError::InvalidPartitionCount(0)
        );
    }

    #[test]
    fn test_balance_and_interleave() {
        for len in 0..40usize {
            let jobs: Vec<usize> = (0..len).collect();
            for n in 1..9 {
                let batch = partition(&jobs, n).unwrap();
                assert_eq!(batch.worker_count(), n);
                assert_eq!(batch.job_count(), len);
                let sizes = batch.sizes();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1, "len={} n={} sizes={:?}", len, n, sizes);
                assert_eq!(batch.interleave(), jobs);
            }
        }
    }

    #[test]
    fn test_order_within_partition() {
        let jobs: Vec<char> = "abcdefg".chars().collect();
        let batch = partition(&jobs, 3).unwrap();
        assert_eq!(batch.partition(0).unwrap(), &['a', 'd', 'g']);
        assert_eq!(batch.partition(1).unwrap(), &['b', 'e']);
        assert_eq!(batch.partition(2).unwrap(), &['c', 'f']);
        assert!(batch.partition(3).is_none());
    }

    #[test]
    fn test_deterministic() {
        let jobs: Vec<String> = (0..25).map(|i| format!("job{}", i)).collect();
        assert_eq!(partition(&jobs, 4).unwrap(), partition(&jobs, 4).unwrap());
    }

    #[test]
    fn test_more_workers_than_jobs() {
        let batch = partition(&[7], 3).unwrap();
        assert_eq!(batch.sizes(), vec![1, 0, 0]);
    }
}
