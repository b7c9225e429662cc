//! On-disk template files.
//!
//! Files are bincode blobs written through a temp file in the target
//! directory and renamed into place, so a crash never leaves a truncated
//! template file behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::EngineError;
use crate::templates::{AdaptedTemplates, IntTemplates};
use crate::unicharset::UnicharSet;

/// Pre-trained templates together with the character set they index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PretrainedBundle {
    pub unicharset: UnicharSet,
    pub templates: IntTemplates,
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        bincode::serialize_into(&mut writer, value)?;
        writer.flush()?;
    }
    temp.persist(path).map_err(|source| EngineError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "wrote template file");
    Ok(())
}

fn read<T: DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

pub fn save_adapted_templates<P: AsRef<Path>>(path: P, templates: &AdaptedTemplates) -> Result<(), EngineError> {
    write_atomic(path.as_ref(), templates)
}

pub fn load_adapted_templates<P: AsRef<Path>>(path: P) -> Result<AdaptedTemplates, EngineError> {
    read(path.as_ref())
}

pub fn save_pretrained<P: AsRef<Path>>(path: P, bundle: &PretrainedBundle) -> Result<(), EngineError> {
    write_atomic(path.as_ref(), bundle)
}

pub fn load_pretrained<P: AsRef<Path>>(path: P) -> Result<PretrainedBundle, EngineError> {
    let mut bundle: PretrainedBundle = read(path.as_ref())?;
    bundle.unicharset.reindex();
    Ok(bundle)
}
