use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use core_serialization::{STORE_FORMAT_VERSION, StoreManifest, encode_vector, write_manifest};
use core_types::{EMBEDDING_DIM, InternalId, Metric, PersonRecord};
use tantivy::{Index, IndexWriter, doc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::register_person_analyzer;
use crate::{PersonFields, StoreError, person_schema};

/// Knobs for a batch build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub dimension: usize,
    /// Similarity recorded in the manifest and used by default at query time.
    pub metric: Metric,
    pub writer_memory_bytes: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
            metric: Metric::DotProduct,
            writer_memory_bytes: 50_000_000,
        }
    }
}

/// Remove everything at `path`; absent paths are fine.
pub fn clear_store(path: &Path) -> Result<(), StoreError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(path)(e)),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path).map_err(StoreError::io(path))
    } else {
        fs::remove_file(path).map_err(StoreError::io(path))
    }
}

/// Exclusive-write marker next to the store; removed on drop.
#[derive(Debug)]
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(StoreError::Locked(path)),
            Err(e) => Err(StoreError::io(&path)(e)),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release build lock");
        }
    }
}

/// Staging directory that is deleted unless it was promoted to the store path.
#[derive(Debug)]
struct StagingDir {
    path: PathBuf,
    promoted: bool,
}

impl StagingDir {
    fn promote(mut self, target: &Path) -> Result<(), StoreError> {
        fs::rename(&self.path, target).map_err(StoreError::io(target))?;
        self.promoted = true;
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.promoted && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to discard staging store");
            } else {
                debug!(path = %self.path.display(), "discarded uncommitted staging store");
            }
        }
    }
}

/// Append-only writer for a fresh person store.
///
/// Documents are written into a hidden staging directory beside the target;
/// [`IndexBuilder::commit`] makes the tantivy commit durable, writes the
/// manifest and renames the staging directory onto the target path. Dropping
/// the builder without committing discards everything it wrote.
pub struct IndexBuilder {
    // Field order matters: the writer must close before the staging dir is removed.
    writer: IndexWriter,
    fields: PersonFields,
    options: BuildOptions,
    next_id: u64,
    target: PathBuf,
    staging: StagingDir,
    _lock: BuildLock,
}

impl IndexBuilder {
    /// Take the build lock, clear whatever is stored at `target` and open an
    /// empty staging store.
    pub fn create(target: &Path, options: BuildOptions) -> Result<Self, StoreError> {
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                StoreError::Corrupt(format!("store path {} has no directory name", target.display()))
            })?
            .to_string();
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(StoreError::io(&parent))?;

        let lock = BuildLock::acquire(parent.join(format!(".{name}.lock")))?;

        if target.exists() {
            info!(path = %target.display(), "clearing existing person store");
        }
        clear_store(target)?;

        let staging_path = parent.join(format!(".{name}.staging-{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&staging_path).map_err(StoreError::io(&staging_path))?;
        let staging = StagingDir {
            path: staging_path,
            promoted: false,
        };

        let index = Index::create_in_dir(&staging.path, person_schema())?;
        register_person_analyzer(index.tokenizers());
        let fields = PersonFields::from_schema(&index.schema())?;
        // One indexing thread keeps segment layout deterministic for identical inputs.
        let writer: IndexWriter = index.writer_with_num_threads(1, options.writer_memory_bytes)?;

        debug!(staging = %staging.path.display(), target = %target.display(), "opened staging store");
        Ok(Self {
            writer,
            fields,
            options,
            next_id: 0,
            target: target.to_path_buf(),
            staging,
            _lock: lock,
        })
    }

    /// Append one person; its internal id is the number of documents added before it.
    pub fn add(&mut self, record: &PersonRecord, vector: &[f32]) -> Result<InternalId, StoreError> {
        if vector.len() != self.options.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.options.dimension,
                actual: vector.len(),
            });
        }

        let internal_id = self.next_id;
        let f = self.fields;
        self.writer.add_document(doc!(
            f.internal_id => internal_id,
            f.id => record.id.clone(),
            f.bio => record.bio.clone(),
            f.category => record.category.clone(),
            f.resume_html => record.resume_html.clone(),
            f.embedding => encode_vector(vector)
        ))?;
        self.next_id += 1;
        Ok(InternalId(internal_id))
    }

    pub const fn len(&self) -> u64 {
        self.next_id
    }

    pub const fn is_empty(&self) -> bool {
        self.next_id == 0
    }

    /// Durably commit and publish the store. Returns the written manifest.
    pub fn commit(self) -> Result<StoreManifest, StoreError> {
        let Self {
            mut writer,
            options,
            next_id,
            target,
            staging,
            _lock,
            ..
        } = self;

        writer.commit()?;
        writer.wait_merging_threads()?;

        let manifest = StoreManifest {
            format_version: STORE_FORMAT_VERSION,
            dimension: options.dimension,
            metric: options.metric,
            document_count: next_id,
            built_at_ms: now_ms(),
        };
        write_manifest(&staging.path, &manifest)?;

        // Anything that appeared at the target since create() is replaced.
        clear_store(&target)?;
        staging.promote(&target)?;

        info!(path = %target.display(), documents = next_id, metric = %options.metric, "person store committed");
        Ok(manifest)
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
