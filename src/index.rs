//! Exact flat inner-product vector index.
//!
//! Stores unit-norm embedding vectors row-major in one contiguous buffer
//! and answers top-k queries by scoring every row. Nothing is approximated
//! or quantized; for corpora in the tens of thousands of chunks a full scan
//! is a few milliseconds, and exactness keeps dedup thresholds meaningful.
//!
//! Row order is load-bearing: row `i` here corresponds to row `i` of the
//! metadata store built in the same run. Both artifacts carry the same
//! snapshot id so a mismatched pair is refused at load.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Error, Result};

/// File magic for the on-disk index format.
pub const INDEX_MAGIC: [u8; 4] = *b"DVXI";
/// Bumped on any layout change; readers refuse other versions.
pub const FORMAT_VERSION: u32 = 1;
/// The only metric this index speaks. Inner product over unit-norm vectors
/// is cosine similarity.
pub const METRIC_INNER_PRODUCT: u32 = 0;

/// One search hit: index row plus its inner-product score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    pub row: usize,
    pub score: f32,
}

/// Immutable flat vector index. Built once per snapshot; a rebuild produces
/// a new value rather than mutating this one.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dim: usize,
    rows: usize,
    /// Row-major, `rows * dim` values.
    data: Vec<f32>,
    snapshot: Uuid,
}

impl VectorIndex {
    /// Build an index from embedding rows, all of the same dimension.
    ///
    /// # Errors
    ///
    /// `Integrity` if `vectors` is empty or any row disagrees with the
    /// first row's dimension.
    pub fn build(vectors: Vec<Vec<f32>>, snapshot: Uuid) -> Result<Self> {
        let dim = match vectors.first() {
            Some(first) => first.len(),
            None => {
                return Err(Error::Integrity(
                    "cannot build an index from zero vectors".into(),
                ))
            }
        };
        if dim == 0 {
            return Err(Error::Integrity("embedding dimension must be > 0".into()));
        }

        let rows = vectors.len();
        let mut data = Vec::with_capacity(rows * dim);
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dim {
                return Err(Error::Integrity(format!(
                    "vector at row {} has dimension {}, index dimension is {}",
                    i,
                    vector.len(),
                    dim
                )));
            }
            data.extend_from_slice(vector);
        }

        Ok(Self {
            dim,
            rows,
            data,
            snapshot,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn snapshot_id(&self) -> Uuid {
        self.snapshot
    }

    /// The vector stored at `row`. Panics on an out-of-range row, which the
    /// callers rule out by construction (rows come from `search` results or
    /// `0..len()` loops).
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.dim..(row + 1) * self.dim]
    }

    /// Score every row against `query` and return the top `k` by inner
    /// product, highest first. Equal scores order by lower row, so results
    /// are fully deterministic for a given snapshot. `k` larger than the
    /// row count returns every row ranked.
    ///
    /// # Errors
    ///
    /// `Integrity` if the query dimension does not match the index, which
    /// means the snapshot and the configured embedding no longer agree.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRow>> {
        if query.len() != self.dim {
            return Err(Error::Integrity(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dim
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<ScoredRow> = (0..self.rows)
            .map(|row| {
                let score = self
                    .row(row)
                    .iter()
                    .zip(query.iter())
                    .map(|(x, y)| x * y)
                    .sum();
                ScoredRow { row, score }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.row.cmp(&b.row))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// [`VectorIndex::search`] for several queries at once: one ranked list
    /// per query row, in query order. Used by the duplicate scan, which
    /// works through the index one batch of rows at a time.
    pub fn search_batch(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<ScoredRow>>> {
        queries.iter().map(|query| self.search(query, k)).collect()
    }

    /// Write the index to `path`.
    ///
    /// Layout, all little-endian: magic, format version (u32), metric
    /// (u32), dimension (u32), row count (u64), snapshot id (16 bytes),
    /// then `rows * dim` f32 values row-major.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);

        w.write_all(&INDEX_MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        w.write_all(&METRIC_INNER_PRODUCT.to_le_bytes())?;
        w.write_all(&(self.dim as u32).to_le_bytes())?;
        w.write_all(&(self.rows as u64).to_le_bytes())?;
        w.write_all(self.snapshot.as_bytes())?;
        for &value in &self.data {
            w.write_all(&value.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }

    /// Read an index written by [`VectorIndex::save`], validating the header
    /// and the exact byte count of the vector payload.
    ///
    /// # Errors
    ///
    /// `Integrity` for a missing file, wrong magic or version, or a payload
    /// that does not match the header's `rows * dim`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Integrity(format!("cannot open index file {}: {}", path.display(), e))
        })?;
        let mut r = BufReader::new(file);

        let magic: [u8; 4] = read_array(&mut r, "magic")?;
        if magic != INDEX_MAGIC {
            return Err(Error::Integrity(format!(
                "{} is not an index file (bad magic)",
                path.display()
            )));
        }
        let version = u32::from_le_bytes(read_array(&mut r, "format version")?);
        if version != FORMAT_VERSION {
            return Err(Error::Integrity(format!(
                "unsupported index format version {}",
                version
            )));
        }
        let metric = u32::from_le_bytes(read_array(&mut r, "metric")?);
        if metric != METRIC_INNER_PRODUCT {
            return Err(Error::Integrity(format!("unsupported metric {}", metric)));
        }
        let dim = u32::from_le_bytes(read_array(&mut r, "dimension")?) as usize;
        if dim == 0 {
            return Err(Error::Integrity("index header has zero dimension".into()));
        }
        let rows = u64::from_le_bytes(read_array(&mut r, "row count")?) as usize;
        let snapshot = Uuid::from_bytes(read_array(&mut r, "snapshot id")?);

        let expected_bytes = rows
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                Error::Integrity("index header row/dimension counts overflow".into())
            })?;

        let mut payload = Vec::new();
        r.read_to_end(&mut payload)?;
        if payload.len() != expected_bytes {
            return Err(Error::Integrity(format!(
                "index file has {} vector bytes, expected {} ({} rows x {} dims)",
                payload.len(),
                expected_bytes,
                rows,
                dim
            )));
        }

        let data: Vec<f32> = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self {
            dim,
            rows,
            data,
            snapshot,
        })
    }
}

fn read_array<const N: usize>(r: &mut impl Read, what: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)
        .map_err(|e| Error::Integrity(format!("index file truncated reading {}: {}", what, e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_rows() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.6, 0.8, 0.0],
        ]
    }

    fn build(vectors: Vec<Vec<f32>>) -> VectorIndex {
        VectorIndex::build(vectors, Uuid::new_v4()).unwrap()
    }

    #[test]
    fn build_rejects_empty_and_ragged_input() {
        assert!(matches!(
            VectorIndex::build(Vec::new(), Uuid::new_v4()),
            Err(Error::Integrity(_))
        ));
        let ragged = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        assert!(matches!(
            VectorIndex::build(ragged, Uuid::new_v4()),
            Err(Error::Integrity(_))
        ));
    }

    #[test]
    fn search_ranks_by_inner_product_descending() {
        let index = build(unit_rows());
        let hits = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        // Row 0 scores 1.0, row 2 scores 0.6, row 1 scores 0.0.
        assert_eq!(hits[0].row, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].row, 2);
        assert!((hits[1].score - 0.6).abs() < 1e-6);
        assert_eq!(hits[2].row, 1);
    }

    #[test]
    fn searching_a_stored_vector_returns_itself_first() {
        let index = build(unit_rows());
        let query: Vec<f32> = index.row(2).to_vec();
        let hits = index.search(&query, 1).unwrap();
        assert_eq!(hits[0].row, 2);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn k_beyond_row_count_returns_all_rows() {
        let index = build(unit_rows());
        let hits = index.search(&[0.0, 1.0, 0.0], 50).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn k_zero_returns_nothing() {
        let index = build(unit_rows());
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_break_toward_the_lower_row() {
        let vectors = vec![
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
        ];
        let index = build(vectors);
        let hits = index.search(&[1.0, 0.0, 0.0], 3).unwrap();
        // Rows 1 and 2 tie at 1.0; the lower row wins the earlier rank.
        assert_eq!(hits[0].row, 1);
        assert_eq!(hits[1].row, 2);
        assert_eq!(hits[2].row, 0);
    }

    #[test]
    fn query_dimension_mismatch_is_an_integrity_error() {
        let index = build(unit_rows());
        let err = index.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn batch_search_matches_single_queries() {
        let index = build(unit_rows());
        let queries = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.6, 0.8, 0.0]];
        let batched = index.search_batch(&queries, 2).unwrap();
        assert_eq!(batched.len(), queries.len());
        for (query, hits) in queries.iter().zip(&batched) {
            assert_eq!(hits, &index.search(query, 2).unwrap());
        }
    }

    #[test]
    fn save_load_preserves_rankings_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.dvx");
        let snapshot = Uuid::new_v4();
        let index = VectorIndex::build(unit_rows(), snapshot).unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.dim(), 3);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.snapshot_id(), snapshot);

        let query = [0.6, 0.8, 0.0];
        assert_eq!(
            index.search(&query, 3).unwrap(),
            loaded.search(&query, 3).unwrap()
        );
    }

    #[test]
    fn truncated_file_is_an_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.dvx");
        build(unit_rows()).save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 5);
        std::fs::write(&path, &bytes).unwrap();

        let err = VectorIndex::load(&path).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn wrong_magic_is_an_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.dvx");
        std::fs::write(&path, b"NOPE-not-an-index-file").unwrap();
        let err = VectorIndex::load(&path).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[test]
    fn missing_file_is_an_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = VectorIndex::load(&dir.path().join("absent.dvx")).unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }
}
