//! Product catalog models.

use serde::{Deserialize, Serialize};

/// A product record as returned by the catalog.
///
/// The matching engine never mutates these; it only reads and ranks them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCandidate {
    /// Unique product identifier
    pub id: String,
    /// Display name (e.g., "Paracetamol 500mg")
    pub name: String,
    /// Generic / molecule name (e.g., "Acetaminophen")
    #[serde(default)]
    pub generic_name: Option<String>,
    /// Manufacturer or brand owner
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Unit price
    pub price: f64,
    /// Whether the product can currently be ordered
    #[serde(default)]
    pub in_stock: bool,
    /// Units on hand
    #[serde(default)]
    pub stock_quantity: u32,
    /// Whether dispensing requires a valid prescription
    #[serde(default)]
    pub requires_prescription: bool,
    /// Product image references (URLs or storage keys)
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Whether this product is listed
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CatalogCandidate {
    /// Create a new in-stock, active product with required fields.
    pub fn new(id: String, name: String, price: f64) -> Self {
        Self {
            id,
            name,
            generic_name: None,
            manufacturer: None,
            price,
            in_stock: true,
            stock_quantity: 0,
            requires_prescription: false,
            image_urls: Vec::new(),
            active: true,
        }
    }

    /// Whether this product has at least one image reference.
    pub fn has_image(&self) -> bool {
        self.image_urls.iter().any(|url| !url.trim().is_empty())
    }

    /// Generic name, if present and non-blank.
    pub fn generic(&self) -> Option<&str> {
        self.generic_name
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }

    /// Check whether the display name differs from the generic name.
    ///
    /// Products without a generic name are never considered "generic" matches.
    pub fn is_branded_generic(&self) -> bool {
        match self.generic() {
            Some(generic) => !generic.eq_ignore_ascii_case(self.name.trim()),
            None => false,
        }
    }
}
