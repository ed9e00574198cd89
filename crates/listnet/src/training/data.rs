//! Ranking dataset: loading, validation, train/validation split, and
//! minibatch planning.
//!
//! A dataset is one flat list of items. Each item has a fixed-width feature
//! row and a non-negative relevance grade. The on-disk format is JSONL:
//!
//! ```text
//! {"features": [0.1, 0.0, 3.2], "relevance": 2}
//! {"features": [0.4, 1.0, 0.7], "relevance": 0}
//! ```

use std::collections::BTreeMap;
use std::io::BufRead;
use std::ops::Range;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{ensure_same_len, RankingError};

/// One line of a ranking JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingItemJson {
    pub features: Vec<f32>,
    pub relevance: f32,
}

/// Feature rows with one relevance grade each.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingDataset {
    features: Vec<Vec<f32>>,
    relevance: Vec<f32>,
}

impl RankingDataset {
    /// Build a dataset, checking it is non-empty, rectangular, and that
    /// every row has a grade.
    pub fn new(features: Vec<Vec<f32>>, relevance: Vec<f32>) -> Result<Self, RankingError> {
        ensure_same_len(features.len(), relevance.len())?;
        if features.is_empty() {
            return Err(RankingError::Empty("dataset has no items"));
        }
        let width = features[0].len();
        if width == 0 {
            return Err(RankingError::Empty("feature rows have no columns"));
        }
        if let Some((row, r)) = features.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(RankingError::RaggedFeatures {
                row,
                expected: width,
                actual: r.len(),
            });
        }
        Ok(Self { features, relevance })
    }

    /// Load a dataset from a JSONL file. Blank lines are skipped.
    pub fn from_jsonl(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open dataset {}: {e}", path.display()))?;
        let reader = std::io::BufReader::new(file);

        let mut features = Vec::new();
        let mut relevance = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let item: RankingItemJson = serde_json::from_str(&line).map_err(|e| {
                anyhow::anyhow!("Failed to parse {} line {}: {e}", path.display(), line_no + 1)
            })?;
            features.push(item.features);
            relevance.push(item.relevance);
        }

        let dataset = Self::new(features, relevance)
            .map_err(|e| anyhow::anyhow!("Invalid dataset {}: {e}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            items = dataset.len(),
            width = dataset.width(),
            "Loaded ranking dataset"
        );
        Ok(dataset)
    }

    /// Write the dataset as JSONL.
    pub fn to_jsonl(&self, path: &Path) -> anyhow::Result<()> {
        use std::io::Write;

        let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        for (features, &relevance) in self.features.iter().zip(&self.relevance) {
            let item = RankingItemJson {
                features: features.clone(),
                relevance,
            };
            serde_json::to_writer(&mut writer, &item)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.relevance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relevance.is_empty()
    }

    /// Number of feature columns.
    pub fn width(&self) -> usize {
        self.features[0].len()
    }

    pub fn features(&self) -> &[Vec<f32>] {
        &self.features
    }

    pub fn relevance(&self) -> &[f32] {
        &self.relevance
    }

    /// Relevance grades widened to f64, for the NDCG metric.
    pub fn relevance_f64(&self) -> Vec<f64> {
        self.relevance.iter().map(|&r| r as f64).collect()
    }

    /// Grades at the given indices.
    pub fn relevance_at(&self, indices: &[usize]) -> Vec<f32> {
        indices.iter().map(|&i| self.relevance[i]).collect()
    }

    /// New dataset holding the rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, RankingError> {
        Self::new(
            indices.iter().map(|&i| self.features[i].clone()).collect(),
            self.relevance_at(indices),
        )
    }

    /// Shuffle and split into `(train, validation)`.
    ///
    /// The first `floor(len * train_ratio)` shuffled rows go to train, the
    /// rest to validation.
    ///
    /// # Errors
    /// Fails if `train_ratio` is outside `(0, 1)` or either side would be empty.
    pub fn split(&self, train_ratio: f64, rng: &mut impl Rng) -> anyhow::Result<(Self, Self)> {
        if !(train_ratio > 0.0 && train_ratio < 1.0) {
            anyhow::bail!("train ratio must be in (0, 1), got {train_ratio}");
        }
        let n_train = (self.len() as f64 * train_ratio).floor() as usize;
        if n_train == 0 || n_train == self.len() {
            anyhow::bail!(
                "Cannot split {} items at ratio {train_ratio}: one side would be empty",
                self.len()
            );
        }

        let order = permutation(self.len(), rng);
        let train = self.subset(&order[..n_train])?;
        let validation = self.subset(&order[n_train..])?;
        tracing::info!(
            train = train.len(),
            validation = validation.len(),
            "Split dataset"
        );
        Ok((train, validation))
    }

    /// Summary statistics for reporting.
    pub fn summary(&self) -> DatasetSummary {
        let n = self.len() as f64;
        let min = self.relevance.iter().copied().fold(f32::INFINITY, f32::min);
        let max = self.relevance.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = self.relevance.iter().map(|&r| r as f64).sum::<f64>() / n;

        let mut grade_counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in &self.relevance {
            *grade_counts.entry(format!("{r}")).or_default() += 1;
        }
        let zero_relevance = self.relevance.iter().filter(|&&r| r == 0.0).count();

        DatasetSummary {
            items: self.len(),
            width: self.width(),
            relevance_min: min as f64,
            relevance_max: max as f64,
            relevance_mean: mean,
            zero_relevance,
            grade_counts,
        }
    }
}

/// Summary statistics of a ranking dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub items: usize,
    pub width: usize,
    pub relevance_min: f64,
    pub relevance_max: f64,
    pub relevance_mean: f64,
    /// Items with relevance exactly 0.
    pub zero_relevance: usize,
    /// Item count per distinct relevance grade.
    pub grade_counts: BTreeMap<String, usize>,
}

/// Random permutation of `0..n`.
pub fn permutation(n: usize, rng: &mut impl Rng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order
}

/// Contiguous ranges covering `0..n` in steps of `batch_size`. The last
/// range is shorter when `batch_size` does not divide `n`.
///
/// # Panics
/// Panics if `batch_size` is 0.
pub fn minibatch_ranges(n: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    assert!(batch_size > 0, "batch_size must be > 0");
    (0..n)
        .step_by(batch_size)
        .map(move |start| start..(start + batch_size).min(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn make_dataset(n: usize) -> RankingDataset {
        let features = (0..n).map(|i| vec![i as f32, (i * 2) as f32]).collect();
        let relevance = (0..n).map(|i| (i % 4) as f32).collect();
        RankingDataset::new(features, relevance).unwrap()
    }

    #[test]
    fn test_new_validates() {
        assert_eq!(
            RankingDataset::new(vec![vec![1.0], vec![2.0]], vec![1.0]).unwrap_err(),
            RankingError::ShapeMismatch { expected: 2, actual: 1 }
        );
        assert!(matches!(
            RankingDataset::new(vec![], vec![]).unwrap_err(),
            RankingError::Empty(_)
        ));
        assert_eq!(
            RankingDataset::new(vec![vec![1.0, 2.0], vec![3.0]], vec![0.0, 1.0]).unwrap_err(),
            RankingError::RaggedFeatures { row: 1, expected: 2, actual: 1 }
        );
    }

    #[test]
    fn test_jsonl_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        let dataset = make_dataset(5);

        dataset.to_jsonl(&path).unwrap();
        let loaded = RankingDataset::from_jsonl(&path).unwrap();
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn test_jsonl_skips_blank_and_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, r#"{{"features": [1.0, 2.0], "relevance": 1}}"#).unwrap();
            writeln!(f).unwrap();
            writeln!(f, r#"{{"features": [3.0, 4.0], "relevance": 0}}"#).unwrap();
        }
        let loaded = RankingDataset::from_jsonl(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.relevance(), &[1.0, 0.0]);

        let bad = dir.path().join("bad.jsonl");
        {
            let mut f = std::fs::File::create(&bad).unwrap();
            writeln!(f, r#"{{"features": [1.0], "relevance": 1}}"#).unwrap();
            writeln!(f, "not json").unwrap();
        }
        let err = RankingDataset::from_jsonl(&bad).unwrap_err().to_string();
        assert!(err.contains("line 2"), "unexpected error: {err}");
    }

    #[test]
    fn test_jsonl_rejects_ragged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.jsonl");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, r#"{{"features": [1.0, 2.0], "relevance": 1}}"#).unwrap();
            writeln!(f, r#"{{"features": [3.0], "relevance": 0}}"#).unwrap();
        }
        let err = RankingDataset::from_jsonl(&path).unwrap_err().to_string();
        assert!(err.contains("Ragged"), "unexpected error: {err}");
    }

    #[test]
    fn test_split_partitions_all_rows() {
        let dataset = make_dataset(20);
        let mut rng = StdRng::seed_from_u64(7);
        let (train, validation) = dataset.split(0.75, &mut rng).unwrap();

        assert_eq!(train.len(), 15);
        assert_eq!(validation.len(), 5);

        // Column 0 carries the original row index
        let mut seen: Vec<usize> = train
            .features()
            .iter()
            .chain(validation.features())
            .map(|r| r[0] as usize)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_rejects_empty_side() {
        let dataset = make_dataset(3);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(dataset.split(0.1, &mut rng).is_err());
        assert!(dataset.split(1.0, &mut rng).is_err());
        assert!(dataset.split(0.0, &mut rng).is_err());
    }

    #[test]
    fn test_minibatches_cover_each_index_once() {
        for (n, batch) in [(10, 3), (10, 5), (7, 10), (1, 1), (100, 20)] {
            let mut rng = StdRng::seed_from_u64(n as u64);
            let perm = permutation(n, &mut rng);

            let mut rebuilt: Vec<usize> = minibatch_ranges(n, batch)
                .flat_map(|r| perm[r].to_vec())
                .collect();
            assert_eq!(rebuilt.len(), n, "n={n} batch={batch}");
            rebuilt.sort_unstable();
            assert_eq!(rebuilt, (0..n).collect::<Vec<_>>(), "n={n} batch={batch}");
        }
    }

    #[test]
    fn test_minibatch_ranges_shape() {
        let ranges: Vec<_> = minibatch_ranges(10, 4).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..10]);
        assert_eq!(minibatch_ranges(0, 4).count(), 0);
    }

    #[test]
    fn test_summary() {
        let summary = make_dataset(8).summary();
        assert_eq!(summary.items, 8);
        assert_eq!(summary.width, 2);
        assert_eq!(summary.relevance_min, 0.0);
        assert_eq!(summary.relevance_max, 3.0);
        assert!((summary.relevance_mean - 1.5).abs() < 1e-12);
        assert_eq!(summary.zero_relevance, 2);
        assert_eq!(summary.grade_counts.get("2"), Some(&2));
    }
}
