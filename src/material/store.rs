use crate::error::{Error, Result};
use crate::material::KeyMaterial;
use crate::FileSystem;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const KEY_MATERIAL_FILE_PREFIX: &str = "_KEY_MATERIAL_FOR_";
const TEMP_FILE_PREFIX: &str = "_TMP";
const KEY_MATERIAL_FILE_SUFFIX: &str = ".json";

/// Path of the sidecar key material document for a container file
pub fn sidecar_path(file_path: &Path) -> Result<PathBuf> {
    derived_path(file_path, "")
}

/// Path used to stage a rewritten sidecar document before it replaces the original
pub fn temp_sidecar_path(file_path: &Path) -> Result<PathBuf> {
    derived_path(file_path, TEMP_FILE_PREFIX)
}

fn derived_path(file_path: &Path, prefix: &str) -> Result<PathBuf> {
    let file_name = file_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "cannot derive key material path from {}",
                file_path.display()
            ))
        })?;

    Ok(file_path.with_file_name(format!(
        "{}{}{}{}",
        prefix, KEY_MATERIAL_FILE_PREFIX, file_name, KEY_MATERIAL_FILE_SUFFIX
    )))
}

/// Sidecar document holding the key material of one container file.
///
/// The document is a JSON object mapping key references to serialized key
/// material. Changes are only written by [`save`](Self::save).
pub struct FileKeyMaterialStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    temp_path: PathBuf,
    materials: BTreeMap<String, String>,
}

impl fmt::Debug for FileKeyMaterialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileKeyMaterialStore")
            .field("path", &self.path)
            .field("key_references", &self.materials.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FileKeyMaterialStore {
    /// Creates an empty store for the given container file
    pub fn new(file_path: &Path, fs: Arc<dyn FileSystem>) -> Result<Self> {
        Ok(Self {
            fs,
            path: sidecar_path(file_path)?,
            temp_path: temp_sidecar_path(file_path)?,
            materials: BTreeMap::new(),
        })
    }

    /// Loads the sidecar document of a container file; `None` if there is none
    pub async fn load(file_path: &Path, fs: Arc<dyn FileSystem>) -> Result<Option<Self>> {
        let mut store = Self::new(file_path, fs)?;
        let Some(contents) = store.fs.read_file(&store.path).await? else {
            return Ok(None);
        };

        store.materials = serde_json::from_slice(&contents).map_err(|e| {
            Error::KeyMaterial(format!(
                "malformed key material document {}: {}",
                store.path.display(),
                e
            ))
        })?;
        log::debug!(
            "loaded {} key references from {}",
            store.materials.len(),
            store.path.display()
        );

        Ok(Some(store))
    }

    /// Path of the sidecar document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds or replaces the key material for a key reference
    pub fn add_key_material(&mut self, key_reference: &str, material: &KeyMaterial) -> Result<()> {
        self.materials
            .insert(key_reference.to_string(), material.serialize()?);
        Ok(())
    }

    /// Key material for a key reference
    pub fn key_material(&self, key_reference: &str) -> Result<KeyMaterial> {
        let json = self.materials.get(key_reference).ok_or_else(|| {
            Error::KeyMaterial(format!(
                "key reference '{}' not found in {}",
                key_reference,
                self.path.display()
            ))
        })?;
        KeyMaterial::parse(json)
    }

    /// All key references in the document
    pub fn key_references(&self) -> Vec<String> {
        self.materials.keys().cloned().collect()
    }

    fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.materials)?)
    }

    /// Writes the document to the sidecar path.
    ///
    /// The document is staged in a temporary file and then moved over the sidecar,
    /// so readers never see a partial document. On failure the temporary file is
    /// removed and any existing sidecar is untouched.
    pub async fn save(&self) -> Result<()> {
        let contents = self.to_json()?;

        let result = async {
            self.fs.write_file(&self.temp_path, &contents).await?;
            self.fs.rename_file(&self.temp_path, &self.path).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = self.fs.delete_file(&self.temp_path).await {
                log::warn!(
                    "failed to remove {}: {}",
                    self.temp_path.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        log::debug!("wrote key material to {}", self.path.display());
        Ok(())
    }
}
