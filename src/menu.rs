use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::MenuError;

const BUNDLED_MENU: &str = include_str!("../data/menu.json");

/// One dish or drink on offer. Price is in rupiah.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub category: String,
    pub price: u64,
    pub composition: String,
}

/// Read-only, ordered list of menu items loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct MenuStore {
    items: Vec<MenuItem>,
}

impl MenuStore {
    /// The menu compiled into the binary.
    pub fn bundled() -> Result<Self, MenuError> {
        Self::from_json(BUNDLED_MENU)
    }

    pub fn from_json(json: &str) -> Result<Self, MenuError> {
        let items: Vec<MenuItem> = serde_json::from_str(json)?;
        Ok(Self { items })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MenuError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| MenuError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json(&json)?;
        info!("Loaded {} menu items from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
