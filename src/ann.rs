use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::collections::{HashMap, HashSet};

use crate::config::Number;

const SEED: u64 = 42;
const MIN_PROJECTIONS: usize = 2;
const MAX_PROJECTIONS: usize = 16;
const MIN_TABLES: usize = 1;
const MAX_TABLES: usize = 8;

/// Random-projection LSH over the flat index, proposing candidate ids that
/// the caller scores exactly. Seeded, so identical corpora hash identically.
pub struct RandomProjectionIndex {
    random_vectors: Vec<Vec<Number>>,
    hash_tables: Vec<HashMap<u64, Vec<usize>>>,
    num_tables: usize,
    num_projections: usize,
}

impl RandomProjectionIndex {
    pub fn new(dim: usize, data_size: usize) -> Self {
        let (num_projections, num_tables) = Self::calculate_params(data_size);
        tracing::debug!(num_projections, num_tables, "sizing projection index");

        let mut rng = StdRng::seed_from_u64(SEED);
        let normal = Normal::new(0.0, 1.0).expect("valid normal distribution parameters");

        let random_vectors: Vec<Vec<Number>> = (0..num_tables * num_projections)
            .map(|_| normal.sample_iter(&mut rng).take(dim).collect())
            .collect();

        RandomProjectionIndex {
            random_vectors,
            hash_tables: vec![HashMap::new(); num_tables],
            num_tables,
            num_projections,
        }
    }

    fn calculate_params(data_size: usize) -> (usize, usize) {
        let log_size = (data_size.max(1) as f64).log2() as usize;
        let num_projections = (log_size + 2).clamp(MIN_PROJECTIONS, MAX_PROJECTIONS);
        let num_tables = (log_size / 2 + 2).clamp(MIN_TABLES, MAX_TABLES);
        (num_projections, num_tables)
    }

    fn hash_vector(&self, vector: &[Number], table_index: usize) -> u64 {
        let start = table_index * self.num_projections;
        let end = start + self.num_projections;

        self.random_vectors[start..end]
            .iter()
            .map(|rv| {
                rv.iter()
                    .zip(vector.iter())
                    .map(|(&a, &b)| a * b)
                    .sum::<Number>()
            })
            .enumerate()
            .fold(
                0u64,
                |acc, (i, proj)| {
                    if proj >= 0.0 {
                        acc | (1 << i)
                    } else {
                        acc
                    }
                },
            )
    }

    pub fn add(&mut self, vector: &[Number], id: usize) {
        for i in 0..self.num_tables {
            let hash = self.hash_vector(vector, i);
            self.hash_tables[i].entry(hash).or_default().push(id);
        }
    }

    /// Candidate ids for `query`, drawn from the query's bucket and every
    /// single-bit-flip neighbor bucket in each table (multi-probe).
    pub fn candidates(&self, query: &[Number], limit: usize) -> Vec<usize> {
        let mut candidates = HashSet::new();

        for i in 0..self.num_tables {
            let query_hash = self.hash_vector(query, i);

            if let Some(bucket) = self.hash_tables[i].get(&query_hash) {
                candidates.extend(bucket);
            }

            for j in 0..self.num_projections {
                let neighbor_hash = query_hash ^ (1 << j);
                if let Some(bucket) = self.hash_tables[i].get(&neighbor_hash) {
                    candidates.extend(bucket);
                }
            }
        }

        tracing::trace!(count = candidates.len(), "projection candidates");
        let mut candidates: Vec<usize> = candidates.into_iter().collect();
        candidates.sort_unstable();
        candidates.truncate(limit);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_ops::normalize_vector;

    fn seeded_vectors(count: usize, dim: usize) -> Vec<Vec<Number>> {
        let mut rng = StdRng::seed_from_u64(99);
        (0..count)
            .map(|_| {
                let mut v: Vec<Number> = (0..dim).map(|_| rng.gen::<Number>() - 0.5).collect();
                normalize_vector(&mut v);
                v
            })
            .collect()
    }

    #[test]
    fn candidates_are_valid_ids() {
        let vectors = seeded_vectors(50, 16);
        let mut index = RandomProjectionIndex::new(16, vectors.len());
        for (id, v) in vectors.iter().enumerate() {
            index.add(v, id);
        }

        let candidates = index.candidates(&vectors[3], 100);
        assert!(candidates.iter().all(|&id| id < vectors.len()));
    }

    #[test]
    fn indexed_vector_is_its_own_candidate() {
        let vectors = seeded_vectors(50, 16);
        let mut index = RandomProjectionIndex::new(16, vectors.len());
        for (id, v) in vectors.iter().enumerate() {
            index.add(v, id);
        }

        // A vector always hashes into its own bucket.
        let candidates = index.candidates(&vectors[7], usize::MAX);
        assert!(candidates.contains(&7));
    }

    #[test]
    fn params_scale_with_data_size() {
        let (small_proj, small_tables) = RandomProjectionIndex::calculate_params(4);
        let (large_proj, large_tables) = RandomProjectionIndex::calculate_params(1 << 20);
        assert!(small_proj <= large_proj);
        assert!(small_tables <= large_tables);
        assert!(large_proj <= MAX_PROJECTIONS);
        assert!(large_tables <= MAX_TABLES);
    }
}
