//! Raw payload projection
//!
//! Pure functions from a provider item (`serde_json::Value`) to the
//! normalized record for its entity type, plus extraction of the
//! relationship edges embedded in the item. Repair and backfill re-run these
//! against stored `raw` snapshots, so nothing here may read anything but the
//! item itself.

use pimsync_domain::{
    ActiveIngredientRecord, BrandRecord, CatalogRecord, CategoryRecord, EmbeddedRelationship,
    EntityType, MediaRecord, OrganizationRecord, PimSyncError, ProductFamilyRecord, ProductRecord,
    RelationshipKind, Result,
};
use serde_json::Value;

/// Project a raw provider item into the normalized record for its entity
/// type.
///
/// Fails with `InvalidInput` when the item is not an object or lacks a
/// usable id; every other field is optional.
pub fn project(entity_type: EntityType, item: &Value) -> Result<CatalogRecord> {
    if !item.is_object() {
        return Err(PimSyncError::InvalidInput(format!(
            "{entity_type} item is not a JSON object"
        )));
    }

    let record = match entity_type {
        EntityType::Product => CatalogRecord::Product(project_product(item)?),
        EntityType::Brand => CatalogRecord::Brand(BrandRecord {
            id: numeric_id(entity_type, item)?,
            name: str_field(item, "name"),
            raw: item.clone(),
        }),
        EntityType::Organization => CatalogRecord::Organization(OrganizationRecord {
            id: numeric_id(entity_type, item)?,
            name: str_field(item, "name"),
            org_type: str_field(item, "type"),
            raw: item.clone(),
        }),
        EntityType::Category => CatalogRecord::Category(CategoryRecord {
            id: numeric_id(entity_type, item)?,
            name_en: localized_name(item, "name"),
            parent: item.get("parent").and_then(|p| p.get("id")).and_then(Value::as_i64),
            order_index: i64_field(item, "orderIndex"),
            raw: item.clone(),
        }),
        EntityType::Media => CatalogRecord::Media(MediaRecord {
            id: numeric_id(entity_type, item)?,
            media_type: str_field(item, "type"),
            photo_type: str_field(item, "photoType"),
            // Owned by the media pipeline, never projected from raw.
            storage_path: None,
            raw: item.clone(),
        }),
        EntityType::ActiveIngredient => CatalogRecord::ActiveIngredient(ActiveIngredientRecord {
            id: numeric_id(entity_type, item)?,
            name_en: localized_name(item, "name"),
            raw: item.clone(),
        }),
        EntityType::ProductFamily => CatalogRecord::ProductFamily(ProductFamilyRecord {
            id: numeric_id(entity_type, item)?,
            name_en: localized_name(item, "name"),
            raw: item.clone(),
        }),
    };

    Ok(record)
}

/// Extract the relationship edges embedded in a raw item.
///
/// Products embed brand, category, organization, and media references;
/// categories embed their parent link. Family references stay in `raw` only
/// (the store has no product↔family join table).
pub fn embedded_relationships(entity_type: EntityType, item: &Value) -> Vec<EmbeddedRelationship> {
    let mut edges = Vec::new();

    match entity_type {
        EntityType::Product => {
            let Some(source_id) = item.get("id").and_then(Value::as_str) else {
                return edges;
            };
            collect_array_edges(&mut edges, item, "brands", RelationshipKind::Brand, source_id);
            collect_array_edges(
                &mut edges,
                item,
                "publicCategories",
                RelationshipKind::Category,
                source_id,
            );
            collect_array_edges(
                &mut edges,
                item,
                "organizations",
                RelationshipKind::Organization,
                source_id,
            );
            collect_array_edges(&mut edges, item, "media", RelationshipKind::Media, source_id);
        }
        EntityType::Category => {
            if let (Some(id), Some(parent)) = (
                item.get("id").and_then(Value::as_i64),
                item.get("parent").filter(|p| p.is_object()),
            ) {
                edges.push(EmbeddedRelationship {
                    kind: RelationshipKind::CategoryParent,
                    source_id: id.to_string(),
                    data: parent.clone(),
                });
            }
        }
        _ => {}
    }

    edges
}

fn project_product(item: &Value) -> Result<ProductRecord> {
    let id = item
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PimSyncError::InvalidInput("product item missing string id".into()))?;

    let snomed = item.get("snomed");
    let meta = item.get("meta");

    Ok(ProductRecord {
        id: id.to_string(),
        name_en: localized_name(item, "name"),
        seo_name_en: localized_name(item, "seoName"),
        status: str_field(item, "status"),
        ean: item
            .get("ean")
            .and_then(Value::as_array)
            .map(|codes| {
                codes.iter().filter_map(Value::as_str).map(str::to_string).collect()
            })
            .unwrap_or_default(),
        ean_gtin8: str_field(item, "eanGtin8"),
        ean_gtin12: str_field(item, "eanGtin12"),
        ean_gtin13: str_field(item, "eanGtin13"),
        ean_gtin14: str_field(item, "eanGtin14"),
        artg_id: str_field(item, "artgId"),
        pbs: str_field(item, "pbs"),
        fred: str_field(item, "fred"),
        z_code: str_field(item, "zCode"),
        snomed_mp: nested_str(snomed, "mp"),
        snomed_mpp: nested_str(snomed, "mpp"),
        snomed_mpuu: nested_str(snomed, "mpuu"),
        snomed_ctpp: nested_str(snomed, "ctpp"),
        snomed_tp: nested_str(snomed, "tp"),
        snomed_tpp: nested_str(snomed, "tpp"),
        snomed_tpuu: nested_str(snomed, "tpuu"),
        public_price: price_field(item, "publicPrice"),
        pharmacist_price: price_field(item, "pharmacistPrice"),
        manufacturer_price: price_field(item, "manufacturerPrice"),
        requires_legal_text: item.get("requiresLegalText").and_then(Value::as_bool),
        biocide: item.get("biocide").and_then(Value::as_bool),
        replacement: str_field(item, "replacement"),
        created_at: meta.and_then(|m| m.get("createdAt")).and_then(Value::as_i64),
        updated_at: meta.and_then(|m| m.get("updatedAt")).and_then(Value::as_i64),
        raw: item.clone(),
    })
}

fn collect_array_edges(
    edges: &mut Vec<EmbeddedRelationship>,
    item: &Value,
    key: &str,
    kind: RelationshipKind,
    source_id: &str,
) {
    if let Some(entries) = item.get(key).and_then(Value::as_array) {
        for entry in entries.iter().filter(|e| e.is_object()) {
            edges.push(EmbeddedRelationship {
                kind,
                source_id: source_id.to_string(),
                data: entry.clone(),
            });
        }
    }
}

fn numeric_id(entity_type: EntityType, item: &Value) -> Result<i64> {
    item.get("id").and_then(Value::as_i64).ok_or_else(|| {
        PimSyncError::InvalidInput(format!("{entity_type} item missing numeric id"))
    })
}

fn str_field(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(Value::as_str).map(str::to_string)
}

fn i64_field(item: &Value, key: &str) -> Option<i64> {
    item.get(key).and_then(Value::as_i64)
}

fn nested_str(container: Option<&Value>, key: &str) -> Option<String> {
    container.and_then(|c| c.get(key)).and_then(Value::as_str).map(str::to_string)
}

/// Localized name accessor: `{"name": {"en": "..."}}`.
fn localized_name(item: &Value, key: &str) -> Option<String> {
    item.get(key).and_then(|n| n.get("en")).and_then(Value::as_str).map(str::to_string)
}

/// Provider prices arrive in cents.
fn price_field(item: &Value, key: &str) -> Option<f64> {
    item.get(key).and_then(Value::as_f64).map(|cents| cents / 100.0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn product_item() -> Value {
        json!({
            "id": "M4F00AB",
            "name": {"en": "Paracetamol 500mg 20 Tablets"},
            "seoName": {"en": "paracetamol-500mg-20-tablets"},
            "status": "active",
            "ean": ["9312345678901"],
            "eanGtin13": "9312345678901",
            "artgId": "AUST R 12345",
            "snomed": {"mp": "21433011000036107", "tpp": "53274011000036106"},
            "publicPrice": 1299,
            "pharmacistPrice": 850,
            "requiresLegalText": false,
            "biocide": false,
            "meta": {"createdAt": 1700000000, "updatedAt": 1710000000},
            "brands": [{"id": 12}],
            "publicCategories": [{"id": 3}, {"id": 7}],
            "organizations": [{"id": 31, "type": "manufacturer"}],
            "media": [{"id": 410, "type": "photo"}]
        })
    }

    #[test]
    fn projects_product_columns() {
        let record = project(EntityType::Product, &product_item()).unwrap();
        let CatalogRecord::Product(product) = record else {
            panic!("expected product record");
        };
        assert_eq!(product.id, "M4F00AB");
        assert_eq!(product.name_en.as_deref(), Some("Paracetamol 500mg 20 Tablets"));
        assert_eq!(product.ean, vec!["9312345678901".to_string()]);
        assert_eq!(product.snomed_mp.as_deref(), Some("21433011000036107"));
        assert_eq!(product.public_price, Some(12.99));
        assert_eq!(product.pharmacist_price, Some(8.50));
        assert_eq!(product.manufacturer_price, None);
        assert_eq!(product.requires_legal_text, Some(false));
        assert_eq!(product.created_at, Some(1_700_000_000));
        assert_eq!(product.raw, product_item());
    }

    #[test]
    fn product_without_id_fails() {
        let err = project(EntityType::Product, &json!({"name": {"en": "x"}})).unwrap_err();
        assert!(matches!(err, PimSyncError::InvalidInput(_)));
    }

    #[test]
    fn non_object_item_fails() {
        let err = project(EntityType::Brand, &json!("not an object")).unwrap_err();
        assert!(matches!(err, PimSyncError::InvalidInput(_)));
    }

    #[test]
    fn projects_category_parent_and_order() {
        let item = json!({
            "id": 7,
            "name": {"en": "Pain Relief"},
            "parent": {"id": 2},
            "orderIndex": 4
        });
        let CatalogRecord::Category(category) = project(EntityType::Category, &item).unwrap()
        else {
            panic!("expected category record");
        };
        assert_eq!(category.parent, Some(2));
        assert_eq!(category.order_index, Some(4));
    }

    #[test]
    fn media_storage_path_never_projected() {
        let item = json!({"id": 410, "type": "photo", "photoType": "packshot",
                          "storagePath": "should-be-ignored"});
        let CatalogRecord::Media(media) = project(EntityType::Media, &item).unwrap() else {
            panic!("expected media record");
        };
        assert_eq!(media.storage_path, None);
        assert_eq!(media.photo_type.as_deref(), Some("packshot"));
    }

    #[test]
    fn extracts_product_edges() {
        let edges = embedded_relationships(EntityType::Product, &product_item());
        assert_eq!(edges.len(), 5);
        let categories: Vec<_> = edges
            .iter()
            .filter(|e| e.kind == RelationshipKind::Category)
            .filter_map(EmbeddedRelationship::target_id)
            .collect();
        assert_eq!(categories, vec![3, 7]);
        assert!(edges.iter().all(|e| e.source_id == "M4F00AB"));
    }

    #[test]
    fn extracts_category_parent_edge() {
        let item = json!({"id": 7, "parent": {"id": 2}});
        let edges = embedded_relationships(EntityType::Category, &item);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, RelationshipKind::CategoryParent);
        assert_eq!(edges[0].target_id(), Some(2));
    }

    #[test]
    fn root_category_has_no_parent_edge() {
        let item = json!({"id": 1, "name": {"en": "Root"}, "parent": null});
        assert!(embedded_relationships(EntityType::Category, &item).is_empty());
    }

    #[test]
    fn reference_entities_have_no_edges() {
        let item = json!({"id": 12, "name": "Brand"});
        assert!(embedded_relationships(EntityType::Brand, &item).is_empty());
    }

    #[test]
    fn projection_is_pure_and_repeatable() {
        let item = product_item();
        assert_eq!(
            project(EntityType::Product, &item).unwrap(),
            project(EntityType::Product, &item).unwrap()
        );
    }
}
