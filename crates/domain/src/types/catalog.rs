//! Catalog row types
//!
//! Every catalog row keeps the provider payload verbatim in `raw` as the
//! authoritative snapshot; the remaining fields are normalized convenience
//! columns derived from it. Normalized columns and join rows can always be
//! recomputed from `raw` (that is what the repair passes do).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::EntityType;
use super::sync::RelationshipKind;

/// One page of results as returned by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPage {
    pub items: Vec<Value>,
    /// Total result count reported by the provider, when present.
    pub total: Option<u64>,
    /// Whether another page exists after this one.
    pub has_more: bool,
}

/// Result of an upsert keyed by external id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Normalized product row.
///
/// The column set follows the provider's product payload: trade codes
/// (EAN/GTIN variants, ARTG, PBS, SNOMED) and the three price tiers are
/// promoted out of `raw` for querying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub name_en: Option<String>,
    pub seo_name_en: Option<String>,
    pub status: Option<String>,
    pub ean: Vec<String>,
    pub ean_gtin8: Option<String>,
    pub ean_gtin12: Option<String>,
    pub ean_gtin13: Option<String>,
    pub ean_gtin14: Option<String>,
    pub artg_id: Option<String>,
    pub pbs: Option<String>,
    pub fred: Option<String>,
    pub z_code: Option<String>,
    pub snomed_mp: Option<String>,
    pub snomed_mpp: Option<String>,
    pub snomed_mpuu: Option<String>,
    pub snomed_ctpp: Option<String>,
    pub snomed_tp: Option<String>,
    pub snomed_tpp: Option<String>,
    pub snomed_tpuu: Option<String>,
    pub public_price: Option<f64>,
    pub pharmacist_price: Option<f64>,
    pub manufacturer_price: Option<f64>,
    pub requires_legal_text: Option<bool>,
    pub biocide: Option<bool>,
    pub replacement: Option<String>,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub raw: Value,
}

/// Normalized brand row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandRecord {
    pub id: i64,
    pub name: Option<String>,
    pub raw: Value,
}

/// Normalized organization row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub id: i64,
    pub name: Option<String>,
    pub org_type: Option<String>,
    pub raw: Value,
}

/// Normalized public category row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub name_en: Option<String>,
    pub parent: Option<i64>,
    pub order_index: Option<i64>,
    pub raw: Value,
}

/// Normalized media row.
///
/// `storage_path` is owned by the external media pipeline and is never
/// derived from `raw`; upserts must preserve it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: i64,
    pub media_type: Option<String>,
    pub photo_type: Option<String>,
    pub storage_path: Option<String>,
    pub raw: Value,
}

/// Normalized active ingredient row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveIngredientRecord {
    pub id: i64,
    pub name_en: Option<String>,
    pub raw: Value,
}

/// Normalized product family row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFamilyRecord {
    pub id: i64,
    pub name_en: Option<String>,
    pub raw: Value,
}

/// A catalog row as a tagged variant: one strongly-typed projection per
/// entity type, each carrying the canonical untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum CatalogRecord {
    Product(ProductRecord),
    Brand(BrandRecord),
    Organization(OrganizationRecord),
    Category(CategoryRecord),
    Media(MediaRecord),
    ActiveIngredient(ActiveIngredientRecord),
    ProductFamily(ProductFamilyRecord),
}

impl CatalogRecord {
    /// The entity type of this record.
    pub fn entity_type(&self) -> EntityType {
        match self {
            CatalogRecord::Product(_) => EntityType::Product,
            CatalogRecord::Brand(_) => EntityType::Brand,
            CatalogRecord::Organization(_) => EntityType::Organization,
            CatalogRecord::Category(_) => EntityType::Category,
            CatalogRecord::Media(_) => EntityType::Media,
            CatalogRecord::ActiveIngredient(_) => EntityType::ActiveIngredient,
            CatalogRecord::ProductFamily(_) => EntityType::ProductFamily,
        }
    }

    /// External id as a string, regardless of the underlying id type.
    pub fn external_id(&self) -> String {
        match self {
            CatalogRecord::Product(p) => p.id.clone(),
            CatalogRecord::Brand(b) => b.id.to_string(),
            CatalogRecord::Organization(o) => o.id.to_string(),
            CatalogRecord::Category(c) => c.id.to_string(),
            CatalogRecord::Media(m) => m.id.to_string(),
            CatalogRecord::ActiveIngredient(a) => a.id.to_string(),
            CatalogRecord::ProductFamily(f) => f.id.to_string(),
        }
    }
}

/// A relationship edge embedded in a catalog item, extracted during
/// projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedRelationship {
    pub kind: RelationshipKind,
    /// External id of the owning row (product id, or category id for
    /// parent edges).
    pub source_id: String,
    /// Raw embedded payload; carries at minimum the target `id`.
    pub data: Value,
}

impl EmbeddedRelationship {
    /// Target row id carried in the embedded payload.
    pub fn target_id(&self) -> Option<i64> {
        self.data.get("id").and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn record_entity_types_round_trip() {
        let record = CatalogRecord::Brand(BrandRecord {
            id: 7,
            name: Some("Nixoderm".into()),
            raw: json!({"id": 7}),
        });
        assert_eq!(record.entity_type(), EntityType::Brand);
        assert_eq!(record.external_id(), "7");
    }

    #[test]
    fn product_external_id_is_verbatim() {
        let record = CatalogRecord::Product(ProductRecord {
            id: "M4F00AB".into(),
            raw: json!({"id": "M4F00AB"}),
            ..ProductRecord::default()
        });
        assert_eq!(record.external_id(), "M4F00AB");
    }

    #[test]
    fn embedded_relationship_target_id() {
        let edge = EmbeddedRelationship {
            kind: RelationshipKind::Organization,
            source_id: "M4F00AB".into(),
            data: json!({"id": 31, "type": "manufacturer"}),
        };
        assert_eq!(edge.target_id(), Some(31));
    }
}
