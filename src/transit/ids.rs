use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Failure to read or write the identifier mapping file.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("failed to read id mapping {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("id mapping {path:?} assigns id {id} to both {first:?} and {second:?}")]
    DuplicateId {
        path: PathBuf,
        id: u64,
        first: String,
        second: String,
    },
    #[error("failed to write id mapping {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingRow {
    key: String,
    id: u64,
}

/// Hands out stable numeric ids for GTFS entity keys.
///
/// Keys seen in earlier runs keep their id; new keys get the next free one.
/// The mapping lives in a `key,id` CSV file.
#[derive(Debug)]
pub struct IdGenerator {
    path: PathBuf,
    ids: HashMap<String, u64>,
    next_id: u64,
}

impl IdGenerator {
    /// Loads the mapping at `path`. A missing file starts an empty mapping.
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let mut ids = HashMap::new();
        let mut owners: HashMap<u64, String> = HashMap::new();

        if path.exists() {
            let read_err = |source| MappingError::Read {
                path: path.to_path_buf(),
                source,
            };
            let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
            for row in reader.deserialize() {
                let row: MappingRow = row.map_err(read_err)?;
                if let Some(first) = owners.get(&row.id) {
                    if *first != row.key {
                        return Err(MappingError::DuplicateId {
                            path: path.to_path_buf(),
                            id: row.id,
                            first: first.clone(),
                            second: row.key,
                        });
                    }
                }
                owners.insert(row.id, row.key.clone());
                ids.insert(row.key, row.id);
            }
            info!(path = %path.display(), entries = ids.len(), "Loaded id mapping");
        } else {
            debug!(path = %path.display(), "No id mapping yet, starting empty");
        }

        let next_id = ids.values().max().map_or(1, |max| max + 1);
        Ok(Self {
            path: path.to_path_buf(),
            ids,
            next_id,
        })
    }

    /// Opens a staging area for new keys. Nothing reaches the mapping until
    /// [`IdStage::commit`]; dropping the stage discards its keys.
    pub fn stage(&mut self) -> IdStage<'_> {
        IdStage {
            ids: self,
            staged: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    /// Rewrites the mapping file, ordered by id.
    pub fn save(&self) -> Result<(), MappingError> {
        let write_err = |source| MappingError::Write {
            path: self.path.clone(),
            source,
        };

        let mut rows: Vec<_> = self.ids.iter().collect();
        rows.sort_by_key(|(_, id)| **id);

        let mut writer = csv::Writer::from_path(&self.path).map_err(write_err)?;
        for (key, id) in rows {
            writer
                .serialize(MappingRow {
                    key: key.clone(),
                    id: *id,
                })
                .map_err(write_err)?;
        }
        writer.flush().map_err(|e| write_err(e.into()))?;

        info!(path = %self.path.display(), entries = self.ids.len(), "Saved id mapping");
        Ok(())
    }
}

/// Pending id assignments for one feed.
#[derive(Debug)]
pub struct IdStage<'a> {
    ids: &'a mut IdGenerator,
    staged: HashMap<String, u64>,
}

impl IdStage<'_> {
    /// Returns the id for `key`, reserving the next free one if it is new.
    pub fn make_id(&mut self, key: &str) -> u64 {
        if let Some(id) = self.ids.ids.get(key).or_else(|| self.staged.get(key)) {
            return *id;
        }
        let id = self.ids.next_id + self.staged.len() as u64;
        self.staged.insert(key.to_string(), id);
        id
    }

    pub fn commit(self) {
        let added = self.staged.len();
        self.ids.next_id += added as u64;
        self.ids.ids.extend(self.staged);
        debug!(added, entries = self.ids.len(), "Committed new ids");
    }
}
