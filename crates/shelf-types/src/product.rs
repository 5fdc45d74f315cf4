use serde::{Deserialize, Serialize};

/// Retail and wholesale price for every product in a category.
///
/// Prices are kept as decimal strings (e.g. `"12.50"`) exactly as the
/// commerce system receives them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub retail: String,
    pub wholesale: String,
}

impl Price {
    pub fn new(retail: impl Into<String>, wholesale: impl Into<String>) -> Self {
        Self {
            retail: retail.into(),
            wholesale: wholesale.into(),
        }
    }
}

impl Default for Price {
    fn default() -> Self {
        Self::new("0.00", "0.00")
    }
}

/// A catalog product.
///
/// Only `description` and `external_id` are serialized; the title,
/// category and subcategory are implied by where the record is stored,
/// and the price is attached from the category when the product is read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(skip)]
    pub title: String,
    #[serde(skip)]
    pub category: String,
    #[serde(skip)]
    pub subcategory: String,
    pub description: String,
    /// Identifier assigned by the external commerce system.
    #[serde(rename = "id", default)]
    pub external_id: String,
    #[serde(skip)]
    pub price: Option<Price>,
}

impl Product {
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            subcategory: subcategory.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = id.into();
        self
    }

    /// Serialize the stored portion of the product.
    pub fn to_record(&self) -> Result<Vec<u8>, crate::TypeError> {
        serde_json::to_vec(self).map_err(|e| crate::TypeError::Serialization(e.to_string()))
    }

    /// Rebuild a product from its stored record and storage location.
    pub fn from_record(
        title: &str,
        category: &str,
        subcategory: &str,
        record: &[u8],
    ) -> Result<Self, crate::TypeError> {
        let mut product: Product = serde_json::from_slice(record)
            .map_err(|e| crate::TypeError::Serialization(e.to_string()))?;
        product.title = title.to_string();
        product.category = category.to_string();
        product.subcategory = subcategory.to_string();
        Ok(product)
    }
}
