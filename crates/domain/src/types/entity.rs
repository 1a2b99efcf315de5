//! Catalog entity types
//!
//! An entity type is an immutable identifier for one independently
//! synchronized catalog category. It drives which table, endpoint, and
//! request shape a sync task targets.

use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// A logical catalog category synchronized independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
    Brand,
    Organization,
    Category,
    Media,
    ActiveIngredient,
    ProductFamily,
}

impl_domain_status_conversions!(EntityType {
    Product => "product",
    Brand => "brand",
    Organization => "organization",
    Category => "category",
    Media => "media",
    ActiveIngredient => "active_ingredient",
    ProductFamily => "product_family"
});

impl EntityType {
    /// All entity types, in sync priority order (reference data first so
    /// product relationships resolve without deferral where possible).
    pub const ALL: [EntityType; 7] = [
        EntityType::Brand,
        EntityType::Organization,
        EntityType::Category,
        EntityType::Media,
        EntityType::ActiveIngredient,
        EntityType::ProductFamily,
        EntityType::Product,
    ];

    /// Whether external ids for this entity type are strings.
    ///
    /// Products use opaque string ids assigned by the provider; every other
    /// entity type uses numeric ids.
    pub fn has_string_ids(self) -> bool {
        matches!(self, EntityType::Product)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn parses_all_identifiers() {
        for entity in EntityType::ALL {
            assert_eq!(EntityType::from_str(&entity.to_string()).unwrap(), entity);
        }
    }

    #[test]
    fn rejects_unknown_identifier() {
        assert!(EntityType::from_str("supplier").is_err());
    }

    #[test]
    fn products_sync_last() {
        assert_eq!(EntityType::ALL.last(), Some(&EntityType::Product));
    }
}
