//! Central registry of the equipment manuals the assistant can index.
//! One definition per PDF; the indexer and the CLI both read from here so
//! metadata stays consistent between ingestion and retrieval.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Definition of a single equipment manual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualDefinition {
    pub pdf_path: PathBuf,
    pub equipment_type: String,
    pub equipment_brand: String,
    pub equipment_model: String,
    pub manual_type: String,
    pub title: String,
    pub language: String,
    /// Priority tier (1 = highest).
    pub tier: u8,
}

impl ManualDefinition {
    pub fn exists(&self) -> bool {
        self.pdf_path.exists()
    }
}

/// Registry of all available equipment manuals.
#[derive(Debug, Clone)]
pub struct ManualRegistry {
    manuals: Vec<ManualDefinition>,
}

impl ManualRegistry {
    /// The builtin manual set, rooted at `manuals_dir`.
    pub fn builtin(manuals_dir: &Path) -> Self {
        let def = |path: &str,
                   equipment_type: &str,
                   brand: &str,
                   model: &str,
                   manual_type: &str,
                   title: &str,
                   tier: u8| ManualDefinition {
            pdf_path: manuals_dir.join(path),
            equipment_type: equipment_type.to_string(),
            equipment_brand: brand.to_string(),
            equipment_model: model.to_string(),
            manual_type: manual_type.to_string(),
            title: title.to_string(),
            language: "en".to_string(),
            tier,
        };

        Self {
            manuals: vec![
                def(
                    "pos/V400m POS Manual.pdf",
                    "POS",
                    "V400m",
                    "V400m",
                    "software",
                    "V400m POS Manual",
                    3,
                ),
                def(
                    "coffee/Coffee Maker Manual.pdf",
                    "Coffee_Maker",
                    "Metos",
                    "M200 / MT200",
                    "operation",
                    "Coffee Maker Manual",
                    1,
                ),
                def(
                    "kitchen/Vulcan Installation & Operation Manual.pdf",
                    "Oven",
                    "Vulcan",
                    "VC4GD",
                    "operation",
                    "Vulcan Installation & Operation Manual",
                    2,
                ),
                def(
                    "kitchen/Pitco Fryer Manual.pdf",
                    "Fryer",
                    "Pitco",
                    "SG14",
                    "operation",
                    "Pitco Fryer Manual",
                    2,
                ),
            ],
        }
    }

    pub fn from_manuals(manuals: Vec<ManualDefinition>) -> Self {
        Self { manuals }
    }

    pub fn all(&self) -> &[ManualDefinition] {
        &self.manuals
    }

    pub fn available(&self) -> Vec<&ManualDefinition> {
        self.manuals.iter().filter(|m| m.exists()).collect()
    }

    pub fn missing(&self) -> Vec<&ManualDefinition> {
        self.manuals.iter().filter(|m| !m.exists()).collect()
    }

    pub fn by_equipment_type(&self, equipment_type: &str) -> Vec<&ManualDefinition> {
        self.manuals
            .iter()
            .filter(|m| m.equipment_type == equipment_type)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_four_manuals() {
        let registry = ManualRegistry::builtin(Path::new("manuals"));
        assert_eq!(registry.all().len(), 4);
        assert_eq!(registry.by_equipment_type("Coffee_Maker").len(), 1);
    }

    #[test]
    fn missing_files_are_reported_not_dropped() {
        let registry = ManualRegistry::builtin(Path::new("/nonexistent"));
        assert_eq!(registry.available().len(), 0);
        assert_eq!(registry.missing().len(), registry.all().len());
    }
}
