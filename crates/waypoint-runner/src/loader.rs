//! Loading process definitions from a directory.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

use waypoint_core::domain::serialization::{load_from_file, DefinitionFormat};
use waypoint_core::{ProcessDefinition, Repositories};

/// Load, validate and save every definition file in `dir`, in file name order.
///
/// Files with other extensions are ignored. The first unreadable or invalid
/// definition aborts the load.
pub async fn load_definitions(
    dir: &Path,
    repositories: &Repositories,
) -> anyhow::Result<Vec<ProcessDefinition>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Cannot read directory {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if DefinitionFormat::from_path(&path).is_some() {
            paths.push(path);
        } else {
            debug!(path = %path.display(), "Skipping non-definition file");
        }
    }
    paths.sort();

    let mut saved = Vec::with_capacity(paths.len());
    for path in paths {
        let definition = load_from_file(&path)
            .await
            .with_context(|| format!("Cannot parse {}", path.display()))?;
        definition
            .validate()
            .with_context(|| format!("Invalid definition in {}", path.display()))?;
        let stored = repositories.definitions.save(&definition).await?;
        debug!(
            definition_id = %stored.id,
            version = stored.version,
            path = %path.display(),
            "Definition loaded"
        );
        saved.push(stored);
    }
    Ok(saved)
}
