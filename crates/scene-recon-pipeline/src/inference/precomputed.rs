//! Offline adapter that replays pairwise predictions stored as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};

use scene_recon_core::{Pair, PairwiseResult};

use super::{PairInput, PairwiseModel};

/// Serves pairwise predictions exported by an external model run.
///
/// Predictions live in one directory, one file per ordered pair, named
/// `pair_{a}_{b}.json` and holding a serialized [`PairwiseResult`].
#[derive(Debug, Clone)]
pub struct PrecomputedPairs {
    dir: PathBuf,
}

impl PrecomputedPairs {
    /// # Errors
    ///
    /// Returns an error if `dir` is not a directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure!(
            dir.is_dir(),
            "prediction directory {} does not exist",
            dir.display()
        );
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds the prediction for `pair`.
    pub fn path_for(&self, pair: &Pair) -> PathBuf {
        self.dir.join(Self::file_name(pair))
    }

    pub fn file_name(pair: &Pair) -> String {
        format!("pair_{}_{}.json", pair.view_a, pair.view_b)
    }

    /// Write a prediction where [`PrecomputedPairs`] will look for it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn store(dir: &Path, result: &PairwiseResult) -> Result<PathBuf> {
        let path = dir.join(Self::file_name(&result.pair));
        let json = serde_json::to_string(result)?;
        fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    fn load(&self, pair: &Pair) -> Result<PairwiseResult> {
        let path = self.path_for(pair);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("missing prediction for pair {pair:?} at {}", path.display()))?;
        let mut result: PairwiseResult = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        ensure!(
            result.pair.view_a == pair.view_a && result.pair.view_b == pair.view_b,
            "{} holds pair ({}, {})",
            path.display(),
            result.pair.view_a,
            result.pair.view_b
        );
        result.pair.symmetric = pair.symmetric;
        Ok(result)
    }
}

impl PairwiseModel for PrecomputedPairs {
    fn name(&self) -> &str {
        "precomputed-pairs"
    }

    fn infer_batch(&mut self, batch: &[PairInput<'_>]) -> Result<Vec<PairwiseResult>> {
        batch.iter().map(|input| self.load(&input.pair)).collect()
    }
}
