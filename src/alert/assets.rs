use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

/// The distraction categories a reaction asset can exist for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertCategory {
    Side,
    Up,
    Phone,
    Talking,
}

impl AlertCategory {
    pub const ALL: [AlertCategory; 4] = [
        AlertCategory::Side,
        AlertCategory::Up,
        AlertCategory::Phone,
        AlertCategory::Talking,
    ];

    /// File-name suffix for this category's asset.
    pub fn suffix(self) -> &'static str {
        match self {
            AlertCategory::Side => "side",
            AlertCategory::Up => "up",
            AlertCategory::Phone => "phone",
            AlertCategory::Talking => "talking",
        }
    }

    /// Map a distraction label onto a category via fixed keywords.
    ///
    /// Eyes-closed checks run before the phone keywords so "eyes closed /
    /// looking down" lands on Up, not Phone. Talking maps to a category only
    /// while talking inclusion is enabled; an unmatched label maps to
    /// nothing, which downstream treats as "no alert".
    pub fn resolve(label: &str, include_talking: bool) -> Option<Self> {
        let label = label.trim().to_lowercase();
        if label.contains("left") || label.contains("right") {
            return Some(AlertCategory::Side);
        }
        if label.contains("up") || label.contains("eyes closed") || label.contains("eyes-closed") {
            return Some(AlertCategory::Up);
        }
        if label.contains("phone") || label.contains("book") || label.contains("down") {
            return Some(AlertCategory::Phone);
        }
        if label.contains("talking") {
            return include_talking.then_some(AlertCategory::Talking);
        }
        None
    }
}

/// Per-character reaction audio, keyed by `(character, category)`.
///
/// On disk the layout is `{base}/{character}/{character}_{suffix}.mp3`, one
/// directory per character skin. A missing asset is a normal condition: the
/// scheduler drops the alert instead of erroring.
#[derive(Debug, Clone, Default)]
pub struct AssetCatalog {
    assets: HashMap<(String, AlertCategory), PathBuf>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog by scanning a characters directory.
    pub fn scan(base_dir: &Path) -> Result<Self> {
        let mut catalog = Self::new();
        if !base_dir.exists() {
            log::warn!(
                "reaction asset directory {} does not exist; alerts will be dropped",
                base_dir.display()
            );
            return Ok(catalog);
        }

        let entries = fs::read_dir(base_dir)
            .with_context(|| format!("Failed to list asset directory {}", base_dir.display()))?;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(character) = entry.file_name().to_str().map(str::to_lowercase) else {
                continue;
            };
            for category in AlertCategory::ALL {
                let file = entry
                    .path()
                    .join(format!("{}_{}.mp3", character, category.suffix()));
                if file.is_file() {
                    catalog.insert(&character, category, file);
                }
            }
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, character: &str, category: AlertCategory, path: PathBuf) {
        self.assets
            .insert((character.to_lowercase(), category), path);
    }

    pub fn lookup(&self, character: &str, category: AlertCategory) -> Option<&PathBuf> {
        self.assets.get(&(character.to_lowercase(), category))
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
