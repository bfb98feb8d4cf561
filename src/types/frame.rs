use chrono::{DateTime, Utc};
use ndarray::Array2;

use crate::error::{PipelineError, Result};

/// Columns with this prefix are diagnostics only and never reach a model.
pub const DEBUG_PREFIX: &str = "%";

/// Column-oriented numeric table sharing its row index with a candle series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    index: Vec<DateTime<Utc>>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl FeatureFrame {
    pub fn new(index: Vec<DateTime<Utc>>) -> Self {
        Self {
            index,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Insert a column, replacing any existing column of the same name.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(PipelineError::ColumnLength {
                name,
                expected: self.len(),
                actual: values.len(),
            });
        }
        match self.position(&name) {
            Some(pos) => self.columns[pos] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.position(name).map(|pos| self.columns[pos].as_slice())
    }

    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.get(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<f64>> {
        let pos = self.position(name)?;
        self.names.remove(pos);
        Some(self.columns.remove(pos))
    }

    /// Copy of the frame without columns whose name starts with `prefix`.
    pub fn without_prefixed(&self, prefix: &str) -> FeatureFrame {
        let mut out = FeatureFrame::new(self.index.clone());
        for (name, col) in self.names.iter().zip(&self.columns) {
            if !name.starts_with(prefix) {
                out.names.push(name.clone());
                out.columns.push(col.clone());
            }
        }
        out
    }

    /// Copy of the frame restricted to the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> FeatureFrame {
        FeatureFrame {
            index: rows.iter().map(|&r| self.index[r]).collect(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|col| rows.iter().map(|&r| col[r]).collect())
                .collect(),
        }
    }

    pub fn head(&self, n: usize) -> FeatureFrame {
        let rows: Vec<usize> = (0..n.min(self.len())).collect();
        self.select_rows(&rows)
    }

    pub fn tail(&self, n: usize) -> FeatureFrame {
        let start = self.len().saturating_sub(n);
        let rows: Vec<usize> = (start..self.len()).collect();
        self.select_rows(&rows)
    }

    /// Names of columns holding at least one infinite value.
    pub fn check_inf(&self) -> Vec<String> {
        self.names
            .iter()
            .zip(&self.columns)
            .filter(|(_, col)| col.iter().any(|v| v.is_infinite()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Replace NaN and infinite values, returning how many were replaced.
    pub fn fill_non_finite(&mut self, value: f64) -> usize {
        let mut replaced = 0;
        for col in &mut self.columns {
            for v in col.iter_mut().filter(|v| !v.is_finite()) {
                *v = value;
                replaced += 1;
            }
        }
        replaced
    }

    /// Rows x columns matrix in column-name order.
    pub fn to_matrix(&self) -> Array2<f64> {
        let (rows, cols) = (self.len(), self.width());
        Array2::from_shape_fn((rows, cols), |(r, c)| self.columns[c][r])
    }

    pub fn from_matrix(
        index: Vec<DateTime<Utc>>,
        names: Vec<String>,
        matrix: &Array2<f64>,
    ) -> Result<FeatureFrame> {
        if matrix.ncols() != names.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: names.len(),
                actual: matrix.ncols(),
            });
        }
        if matrix.nrows() != index.len() {
            return Err(PipelineError::ColumnLength {
                name: "<matrix>".to_string(),
                expected: index.len(),
                actual: matrix.nrows(),
            });
        }
        let columns = matrix.columns().into_iter().map(|c| c.to_vec()).collect();
        Ok(FeatureFrame {
            index,
            names,
            columns,
        })
    }
}
