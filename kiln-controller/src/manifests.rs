//! Seeding the store from JSON resource files

use anyhow::{Context, Result};
use kiln_core::Object;
use kiln_store::ObjectStore;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A file holds either one resource or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    Many(Vec<Object>),
    One(Box<Object>),
}

/// Parses the resources of one manifest file
pub fn parse_manifest(contents: &str) -> Result<Vec<Object>> {
    let manifest: Manifest = serde_json::from_str(contents)?;
    Ok(match manifest {
        Manifest::Many(objects) => objects,
        Manifest::One(object) => vec![*object],
    })
}

/// Creates every resource found in the `*.json` files of `dir`
///
/// Files are applied in name order. Returns the number of created objects.
pub async fn load_dir(store: &dyn ObjectStore, dir: &Path) -> Result<usize> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read manifest directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut created = 0;
    for path in files {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let objects = parse_manifest(&contents)
            .with_context(|| format!("Invalid manifest {}", path.display()))?;

        for object in objects {
            let kind = object.kind();
            let name = object.meta().name.clone();
            store
                .create(object)
                .await
                .with_context(|| format!("Failed to create {} {} from {}", kind, name, path.display()))?;
            debug!(%kind, name = %name, "Seeded object");
            created += 1;
        }
    }

    info!(count = created, dir = %dir.display(), "Loaded manifests");
    Ok(created)
}
