//! Record Loader: pairs person records with their embedding vectors.

use core_types::{EmbeddingVector, PersonRecord};
use rayon::prelude::*;
use thiserror::Error;
use tracing::warn;

/// A record whose embedding reference resolved to a vector of the right width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedPair<'a> {
    pub record: &'a PersonRecord,
    pub vector: &'a [f32],
}

/// Non-fatal reason a record was left out of the build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationWarning {
    #[error(
        "record {position} ({person_id}): embedding index {index} is out of range (have {available})"
    )]
    IndexOutOfRange {
        position: usize,
        person_id: String,
        index: i64,
        available: usize,
    },
    #[error(
        "record {position} ({person_id}): embedding {index} has {actual} values, expected {expected}"
    )]
    WrongDimension {
        position: usize,
        person_id: String,
        index: usize,
        expected: usize,
        actual: usize,
    },
}

impl ValidationWarning {
    /// External id of the skipped person.
    pub fn person_id(&self) -> &str {
        match self {
            Self::IndexOutOfRange { person_id, .. } | Self::WrongDimension { person_id, .. } => {
                person_id
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadOutcome<'a> {
    /// Accepted pairs in input order.
    pub pairs: Vec<ValidatedPair<'a>>,
    /// One entry per skipped record, in input order.
    pub warnings: Vec<ValidationWarning>,
}

/// Validate every record against `embeddings`.
///
/// Records are checked in parallel, but the output keeps input order so
/// internal ids assigned downstream follow the input file. Inputs are
/// borrowed, never modified.
pub fn load_pairs<'a>(
    records: &'a [PersonRecord],
    embeddings: &'a [EmbeddingVector],
    dimension: usize,
) -> LoadOutcome<'a> {
    let checked: Vec<Result<ValidatedPair<'a>, ValidationWarning>> = records
        .par_iter()
        .enumerate()
        .map(|(position, record)| validate(position, record, embeddings, dimension))
        .collect();

    let mut outcome = LoadOutcome {
        pairs: Vec::with_capacity(checked.len()),
        warnings: Vec::new(),
    };
    for item in checked {
        match item {
            Ok(pair) => outcome.pairs.push(pair),
            Err(warning) => {
                warn!(person_id = warning.person_id(), "{warning}; skipping record");
                outcome.warnings.push(warning);
            }
        }
    }
    outcome
}

fn validate<'a>(
    position: usize,
    record: &'a PersonRecord,
    embeddings: &'a [EmbeddingVector],
    dimension: usize,
) -> Result<ValidatedPair<'a>, ValidationWarning> {
    let vector = usize::try_from(record.embedding_index)
        .ok()
        .and_then(|i| embeddings.get(i).map(|v| (i, v)));
    let Some((index, vector)) = vector else {
        return Err(ValidationWarning::IndexOutOfRange {
            position,
            person_id: record.id.clone(),
            index: record.embedding_index,
            available: embeddings.len(),
        });
    };
    if vector.dimension() != dimension {
        return Err(ValidationWarning::WrongDimension {
            position,
            person_id: record.id.clone(),
            index,
            expected: dimension,
            actual: vector.dimension(),
        });
    }
    Ok(ValidatedPair {
        record,
        vector: vector.as_slice(),
    })
}
