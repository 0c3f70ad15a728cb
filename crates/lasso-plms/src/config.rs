//! Model configuration: which checkpoints to run and where their matrices go.
use crate::EmbedError;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Model names
pub const LASSO_ESM: &str = "LassoESM";
pub const VANILLA_ESM: &str = "VanillaESM";
pub const PEPTIDE_ESM: &str = "PeptideESM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    /// HuggingFace repo id or a local checkpoint directory.
    pub model_path: String,
    /// Artifact file name, relative to the extractor's output directory.
    pub output_file: String,
}

/// Immutable, ordered set of models. Names are unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ModelConfiguration {
    models: Vec<ModelSpec>,
}

impl ModelConfiguration {
    pub fn new(models: Vec<ModelSpec>) -> Result<Self, EmbedError> {
        for (idx, spec) in models.iter().enumerate() {
            if models[..idx].iter().any(|m| m.name == spec.name) {
                return Err(EmbedError::resource(
                    &spec.model_path,
                    format!("model name {} is configured twice", spec.name),
                ));
            }
        }
        Ok(Self { models })
    }

    /// The three checkpoints compared in the LassoESM study. Output files are
    /// `<target>_<ModelName>.safetensors`.
    pub fn lasso_defaults(target: &str) -> Self {
        let models = [
            (LASSO_ESM, "ShuklaGroupIllinois/LassoESM"),
            (VANILLA_ESM, "facebook/esm2_t33_650M_UR50D"),
            (PEPTIDE_ESM, "ShuklaGroupIllinois/PeptideESM2_650M"),
        ]
        .into_iter()
        .map(|(name, model_path)| ModelSpec {
            name: name.to_string(),
            model_path: model_path.to_string(),
            output_file: format!("{target}_{name}.safetensors"),
        })
        .collect();
        Self { models }
    }

    /// Read a JSON list of `{name, model_path, output_file}` objects.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EmbedError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| EmbedError::resource(&display, e))?;
        let models: Vec<ModelSpec> =
            serde_json::from_str(&text).map_err(|e| EmbedError::resource(&display, e))?;
        Self::new(models)
    }

    pub fn get(&self, name: &str) -> Result<&ModelSpec, EmbedError> {
        self.models
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| EmbedError::Configuration {
                name: name.to_string(),
                available: self.names().map(str::to_string).collect(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.iter()
    }

    /// Keep only the named models, in the order requested.
    pub fn select(&self, names: &[String]) -> Result<Self, EmbedError> {
        let models = names
            .iter()
            .map(|n| self.get(n).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModelConfiguration::lasso_defaults("Ubonodin");
        let names: Vec<_> = config.names().collect();
        assert_eq!(names, vec![LASSO_ESM, VANILLA_ESM, PEPTIDE_ESM]);
        let vanilla = config.get(VANILLA_ESM).unwrap();
        assert_eq!(vanilla.model_path, "facebook/esm2_t33_650M_UR50D");
        assert_eq!(vanilla.output_file, "Ubonodin_VanillaESM.safetensors");
    }

    #[test]
    fn test_unknown_model() {
        let config = ModelConfiguration::lasso_defaults("Ubonodin");
        match config.get("ProtBert") {
            Err(EmbedError::Configuration { name, available }) => {
                assert_eq!(name, "ProtBert");
                assert_eq!(available.len(), 3);
            }
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let spec = ModelSpec {
            name: "A".into(),
            model_path: "x".into(),
            output_file: "a.safetensors".into(),
        };
        assert!(ModelConfiguration::new(vec![spec.clone(), spec]).is_err());
    }

    #[test]
    fn test_json_round_trip() -> anyhow::Result<()> {
        let config = ModelConfiguration::lasso_defaults("Fusilassin");
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("models.json");
        std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
        let loaded = ModelConfiguration::from_json_file(&path)?;
        assert_eq!(loaded, config);

        let subset = loaded.select(&[PEPTIDE_ESM.to_string()])?;
        assert_eq!(subset.names().collect::<Vec<_>>(), vec![PEPTIDE_ESM]);
        Ok(())
    }
}
