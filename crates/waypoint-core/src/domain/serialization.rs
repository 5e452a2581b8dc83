use std::path::Path;

use crate::domain::process_definition::ProcessDefinition;
use crate::CoreError;

/// On-disk format of a process definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    /// JSON document
    Json,
    /// YAML document
    Yaml,
}

impl DefinitionFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Some(DefinitionFormat::Json),
            Some("yaml") | Some("yml") => Some(DefinitionFormat::Yaml),
            _ => None,
        }
    }
}

/// Serialize a definition to pretty-printed JSON
pub fn to_json(definition: &ProcessDefinition) -> Result<String, CoreError> {
    Ok(serde_json::to_string_pretty(definition)?)
}

/// Parse a definition from JSON
pub fn from_json(json: &str) -> Result<ProcessDefinition, CoreError> {
    Ok(serde_json::from_str(json)?)
}

/// Serialize a definition to YAML
pub fn to_yaml(definition: &ProcessDefinition) -> Result<String, CoreError> {
    Ok(serde_yaml::to_string(definition)?)
}

/// Parse a definition from YAML
pub fn from_yaml(yaml: &str) -> Result<ProcessDefinition, CoreError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Parse a definition in the given format
pub fn parse(content: &str, format: DefinitionFormat) -> Result<ProcessDefinition, CoreError> {
    match format {
        DefinitionFormat::Json => from_json(content),
        DefinitionFormat::Yaml => from_yaml(content),
    }
}

/// Load a definition from a `.json`, `.yaml` or `.yml` file
pub async fn load_from_file(path: impl AsRef<Path>) -> Result<ProcessDefinition, CoreError> {
    let path = path.as_ref();
    let format = DefinitionFormat::from_path(path).ok_or_else(|| {
        CoreError::SerializationError(format!(
            "Unsupported definition file extension: {}",
            path.display()
        ))
    })?;
    let content = tokio::fs::read_to_string(path).await?;
    parse(&content, format)
}

/// Write a definition to a file, choosing the format from the extension
pub async fn save_to_file(
    definition: &ProcessDefinition,
    path: impl AsRef<Path>,
) -> Result<(), CoreError> {
    let path = path.as_ref();
    let content = match DefinitionFormat::from_path(path) {
        Some(DefinitionFormat::Yaml) => to_yaml(definition)?,
        Some(DefinitionFormat::Json) => to_json(definition)?,
        None => {
            return Err(CoreError::SerializationError(format!(
                "Unsupported definition file extension: {}",
                path.display()
            )))
        }
    };
    tokio::fs::write(path, content).await?;
    Ok(())
}
