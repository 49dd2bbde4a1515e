//! Explicit worker pool for batched cut evaluation.
//!
//! The pool is created once per run and handed to whatever needs to fan out
//! work. There is no process-wide pool: with `threads <= 1` everything runs on
//! the calling thread, otherwise jobs run on a private `rayon` pool.

use crate::error::{FlipCutError, Result};
use crate::flow::{FlowNetwork, MaxFlowAlgorithm, StCut};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

pub struct WorkerPool {
    pool: Option<ThreadPool>,
    threads: usize,
}

impl WorkerPool {
    /// # Errors
    /// `ThreadPool` if rayon cannot spawn the workers.
    pub fn new(threads: usize) -> Result<Self> {
        if threads <= 1 {
            return Ok(WorkerPool { pool: None, threads: 1 });
        }
        let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
        Ok(WorkerPool { pool: Some(pool), threads })
    }

    /// Single-threaded pool.
    pub fn sequential() -> Self {
        WorkerPool { pool: None, threads: 1 }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Apply `f` to every item, keeping input order in the output.
    pub fn map<I, T, F>(&self, items: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> Result<T> + Sync + Send,
    {
        match &self.pool {
            None => items.into_iter().map(f).collect(),
            Some(pool) => pool.install(|| items.into_par_iter().map(f).collect()),
        }
    }

    /// Minimum cut over a batch of (source, sink) pairs.
    ///
    /// The batch is split into one contiguous chunk per worker and each
    /// worker solves its chunk on a private copy of `network`. Returns the
    /// index of the winning pair with its cut; ties go to the lowest index,
    /// so the answer does not depend on the number of threads.
    pub fn min_st_cut(
        &self,
        network: &FlowNetwork,
        algorithm: MaxFlowAlgorithm,
        pairs: &[(usize, usize)],
    ) -> Result<(usize, StCut)> {
        if pairs.is_empty() {
            return Err(FlipCutError::EmptyNetwork(network.node_count()));
        }
        let chunk = pairs.len().div_ceil(self.threads).max(1);

        let solve_chunk = |(ci, batch): (usize, &[(usize, usize)])| -> Result<(usize, StCut)> {
            let network = network.clone();
            let mut best: Option<(usize, StCut)> = None;
            for (i, &(s, t)) in batch.iter().enumerate() {
                let cut = algorithm.min_st_cut(&network, s, t)?;
                if best.as_ref().is_none_or(|(_, b)| cut.value < b.value) {
                    best = Some((ci * chunk + i, cut));
                }
            }
            best.ok_or(FlipCutError::EmptyNetwork(network.node_count()))
        };

        let winners: Vec<(usize, StCut)> = match &self.pool {
            None => pairs.chunks(chunk).enumerate().map(solve_chunk).collect::<Result<_>>()?,
            Some(pool) => pool.install(|| {
                pairs.par_chunks(chunk).enumerate().map(solve_chunk).collect::<Result<_>>()
            })?,
        };

        winners
            .into_iter()
            .min_by_key(|(idx, cut)| (cut.value, *idx))
            .ok_or(FlipCutError::EmptyNetwork(network.node_count()))
    }
}
