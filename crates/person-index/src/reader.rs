use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use core_serialization::{SerializationError, StoreManifest, decode_vector_into, read_manifest};
use core_types::{EmbeddingVector, IndexedDocument, InternalId, Metric, StoredFields};
use semantic_index::{FlatVectors, Neighbor, SearchError};
use tantivy::collector::DocSetCollector;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{DocAddress, Index, IndexReader, ReloadPolicy, Searcher, TantivyDocument, Term};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::analysis::{analyze, register_person_analyzer};
use crate::{PersonFields, StoreError};

/// Text fields of a stored person.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextField {
    Id,
    Bio,
    Category,
    ResumeHtml,
}

/// Read-only handle on a committed person store.
///
/// Opening loads every vector into memory in internal-id order; stored text
/// fields are fetched from the index on demand. The handle is immutable and
/// may be shared across threads.
pub struct PersonStore {
    path: PathBuf,
    index: Index,
    searcher: Searcher,
    fields: PersonFields,
    manifest: StoreManifest,
    /// `addresses[i]` locates the document with internal id `i`.
    addresses: Vec<DocAddress>,
    vectors: FlatVectors,
}

impl std::fmt::Debug for PersonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonStore")
            .field("path", &self.path)
            .field("documents", &self.addresses.len())
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl PersonStore {
    /// Open the committed store at `path`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the directory is missing or was never committed,
    /// `EmptyIndex` when it holds no documents, `Corrupt` when documents and
    /// manifest disagree.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.is_dir() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let manifest = match read_manifest(path) {
            Ok(m) => m,
            Err(SerializationError::MissingInput(_)) => {
                return Err(StoreError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let index = Index::open_in_dir(path)?;
        register_person_analyzer(index.tokenizers());
        let fields = PersonFields::from_schema(&index.schema())?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let searcher = reader.searcher();

        let num_docs = searcher.num_docs();
        if num_docs != manifest.document_count {
            return Err(StoreError::Corrupt(format!(
                "manifest lists {} documents, index holds {num_docs}",
                manifest.document_count
            )));
        }
        if num_docs == 0 {
            return Err(StoreError::EmptyIndex(path.to_path_buf()));
        }

        let (addresses, vectors) = load_vectors(&searcher, fields, &manifest)?;
        info!(
            path = %path.display(),
            documents = addresses.len(),
            dimension = manifest.dimension,
            metric = %manifest.metric,
            "opened person store"
        );

        Ok(Self {
            path: path.to_path_buf(),
            index,
            searcher,
            fields,
            manifest,
            addresses,
            vectors,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document_count(&self) -> u64 {
        self.addresses.len() as u64
    }

    pub const fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    /// Metric the store was built for.
    pub const fn metric(&self) -> Metric {
        self.manifest.metric
    }

    pub const fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    pub const fn vectors(&self) -> &FlatVectors {
        &self.vectors
    }

    /// Stored text fields of the document with internal id `id`.
    pub fn fields(&self, id: InternalId) -> Result<StoredFields, StoreError> {
        let doc = self.fetch(id)?;
        let f = self.fields;
        Ok(StoredFields {
            id: text(&doc, f.id),
            bio: text(&doc, f.bio),
            category: text(&doc, f.category),
            resume_html: text(&doc, f.resume_html),
        })
    }

    /// Fields plus vector of the document with internal id `id`.
    pub fn document(&self, id: InternalId) -> Result<IndexedDocument, StoreError> {
        let fields = self.fields(id)?;
        let vector = self
            .vectors
            .get(id.as_usize())
            .ok_or(StoreError::UnknownDocument(id))?;
        Ok(IndexedDocument {
            internal_id: id,
            fields,
            vector: EmbeddingVector(vector.to_vec()),
        })
    }

    /// k-nearest-neighbor search; `metric` defaults to the one recorded at build time.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        metric: Option<Metric>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Neighbor>, SearchError> {
        semantic_index::search(
            &self.vectors,
            query,
            k,
            metric.unwrap_or(self.manifest.metric),
            cancel,
        )
    }

    /// Internal ids of documents whose `field` contains every term of `text`
    /// after analysis. Always empty for the stored-only résumé field.
    pub fn find_text(&self, field: TextField, text: &str) -> Result<Vec<InternalId>, StoreError> {
        let field = match field {
            TextField::Id => self.fields.id,
            TextField::Bio => self.fields.bio,
            TextField::Category => self.fields.category,
            TextField::ResumeHtml => return Ok(Vec::new()),
        };
        let terms = analyze(self.index.tokenizers(), text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|t| {
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(field, t),
                    IndexRecordOption::Basic,
                ));
                (Occur::Must, query)
            })
            .collect();
        let hits = self.searcher.search(&BooleanQuery::new(clauses), &DocSetCollector)?;

        let mut ids = BTreeSet::new();
        for addr in hits {
            let doc: TantivyDocument = self.searcher.doc(addr)?;
            ids.insert(internal_id_of(&doc, self.fields.internal_id)?);
        }
        debug!(terms = ?terms, matches = ids.len(), "text lookup");
        Ok(ids.into_iter().collect())
    }

    fn fetch(&self, id: InternalId) -> Result<TantivyDocument, StoreError> {
        let addr = self
            .addresses
            .get(id.as_usize())
            .copied()
            .ok_or(StoreError::UnknownDocument(id))?;
        Ok(self.searcher.doc(addr)?)
    }
}

fn text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn internal_id_of(doc: &TantivyDocument, field: Field) -> Result<InternalId, StoreError> {
    doc.get_first(field)
        .and_then(|v| v.as_u64())
        .map(InternalId)
        .ok_or_else(|| StoreError::Corrupt("document without internal_id".into()))
}

/// Walk every live document and lay vectors out by internal id.
fn load_vectors(
    searcher: &Searcher,
    fields: PersonFields,
    manifest: &StoreManifest,
) -> Result<(Vec<DocAddress>, FlatVectors), StoreError> {
    let count = manifest.document_count as usize;
    let mut slots: Vec<Option<(DocAddress, Vec<f32>)>> = vec![None; count];

    for (segment_ord, segment) in searcher.segment_readers().iter().enumerate() {
        for doc_id in segment.doc_ids_alive() {
            let addr = DocAddress::new(segment_ord as u32, doc_id);
            let doc: TantivyDocument = searcher.doc(addr)?;
            let id = internal_id_of(&doc, fields.internal_id)?;
            let bytes = doc
                .get_first(fields.embedding)
                .and_then(|v| v.as_bytes())
                .ok_or_else(|| StoreError::Corrupt(format!("document {id} has no embedding")))?;

            let mut vector = Vec::with_capacity(manifest.dimension);
            decode_vector_into(bytes, &mut vector)?;
            if vector.len() != manifest.dimension {
                return Err(StoreError::Corrupt(format!(
                    "document {id} has a {}-d vector, manifest says {}",
                    vector.len(),
                    manifest.dimension
                )));
            }

            let slot = slots
                .get_mut(id.as_usize())
                .ok_or_else(|| StoreError::Corrupt(format!("internal id {id} out of range")))?;
            if slot.replace((addr, vector)).is_some() {
                return Err(StoreError::Corrupt(format!("internal id {id} appears twice")));
            }
        }
    }

    let mut addresses = Vec::with_capacity(count);
    let mut vectors = FlatVectors::with_capacity(manifest.dimension, count);
    for (i, slot) in slots.into_iter().enumerate() {
        let (addr, vector) =
            slot.ok_or_else(|| StoreError::Corrupt(format!("internal id #{i} is missing")))?;
        addresses.push(addr);
        vectors
            .push(&vector)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    }
    Ok((addresses, vectors))
}
