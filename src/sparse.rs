use itertools::izip;

use crate::error::{Error, Result};

/// A sparse matrix in compressed sparse column format.
///
/// The nonzeros of column `c` are at positions `jc[c]..jc[c + 1]` of `ir` (their rows)
/// and `pr` (their values). Pattern-only matrices use `T = ()`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CscMatrix<T> {
    rows: usize,
    ir: Vec<usize>,
    jc: Vec<usize>,
    pr: Vec<T>,
}

impl<T: Copy> CscMatrix<T> {
    /// Builds a matrix from its raw parts, validating their consistency.
    pub fn new(rows: usize, ir: Vec<usize>, jc: Vec<usize>, pr: Vec<T>) -> Result<Self> {
        let invalid = |msg: String| Err(Error::InvalidNetwork(msg));
        let Some(&nnz) = jc.last() else {
            return invalid("the column pointers are empty".to_owned());
        };
        if jc[0] != 0 || !jc.is_sorted() {
            return invalid(format!("the column pointers {jc:?} are not ascending from 0"));
        }
        if ir.len() != nnz || pr.len() != nnz {
            return invalid(format!(
                "expected {nnz} nonzeros, got {} row indices and {} values",
                ir.len(),
                pr.len()
            ));
        }
        if let Some(row) = ir.iter().find(|&&row| row >= rows) {
            return invalid(format!("row index {row} is out of bounds for {rows} rows"));
        }
        Ok(CscMatrix { rows, ir, jc, pr })
    }

    /// Builds a matrix from its columns, each a list of `(row, value)` pairs.
    pub fn from_columns<C>(rows: usize, columns: impl IntoIterator<Item = C>) -> Result<Self>
    where
        C: IntoIterator<Item = (usize, T)>,
    {
        let mut ir = Vec::new();
        let mut jc = vec![0];
        let mut pr = Vec::new();
        for column in columns {
            for (row, value) in column {
                ir.push(row);
                pr.push(value);
            }
            jc.push(ir.len());
        }
        Self::new(rows, ir, jc, pr)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.jc.len() - 1
    }

    pub fn nnz(&self) -> usize {
        self.ir.len()
    }

    /// Iterates over the `(row, value)` pairs of a column.
    pub fn column(&self, col: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = self.jc[col]..self.jc[col + 1];
        izip!(&self.ir[range.clone()], &self.pr[range]).map(|(&row, &value)| (row, value))
    }

    /// The rows holding a nonzero in the column.
    pub fn column_rows(&self, col: usize) -> &[usize] {
        &self.ir[self.jc[col]..self.jc[col + 1]]
    }
}

impl CscMatrix<()> {
    /// Builds a pattern-only matrix from row indices and column pointers.
    pub fn pattern(rows: usize, ir: Vec<usize>, jc: Vec<usize>) -> Result<Self> {
        let pr = vec![(); ir.len()];
        Self::new(rows, ir, jc, pr)
    }
}
