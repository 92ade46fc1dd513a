use crate::SearchError;

/// Row-major storage for fixed-dimension vectors; row `i` belongs to internal id `i`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlatVectors {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatVectors {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(dimension: usize, rows: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(dimension * rows),
        }
    }

    /// Append a row; its internal id is the previous row count.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize, SearchError> {
        if vector.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let id = self.len();
        self.data.extend_from_slice(vector);
        Ok(id)
    }

    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: usize) -> Option<&[f32]> {
        let start = id.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Raw row-major buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
