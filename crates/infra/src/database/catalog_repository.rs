//! SQLite-backed implementation of the catalog store port.
//!
//! One table per entity type plus the four product join tables. Upserts are
//! keyed by external id with `INSERT ... ON CONFLICT DO UPDATE`; `raw_data`
//! is always overwritten with the latest provider snapshot. Join row writes
//! are idempotent (`INSERT OR IGNORE`) so duplicate and out-of-order task
//! deliveries are harmless.

use std::sync::Arc;

use async_trait::async_trait;
use pimsync_core::CatalogStore;
use pimsync_domain::{
    BrandRecord, CatalogRecord, CategoryRecord, EntityType, MediaRecord, OrganizationRecord,
    PimSyncError, ProductRecord, RelationshipKind, Result, UpsertOutcome,
};
use rusqlite::params;
use serde_json::Value;
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository {
    db: Arc<DbManager>,
}

impl SqliteCatalogRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn row_exists(conn: &rusqlite::Connection, entity_type: EntityType, external_id: &str) -> Result<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table(entity_type));
        conn.query_row(&sql, params![external_id], |row| row.get::<_, bool>(0))
            .map_err(map_sql_error)
    }

    fn upsert_record(conn: &rusqlite::Connection, record: &CatalogRecord) -> Result<()> {
        match record {
            CatalogRecord::Product(p) => upsert_product(conn, p),
            CatalogRecord::Brand(b) => upsert_brand(conn, b),
            CatalogRecord::Organization(o) => upsert_organization(conn, o),
            CatalogRecord::Category(c) => upsert_category(conn, c),
            CatalogRecord::Media(m) => upsert_media(conn, m),
            CatalogRecord::ActiveIngredient(a) => {
                upsert_named(conn, ACTIVE_INGREDIENT_UPSERT_SQL, a.id, &a.name_en, &a.raw)
            }
            CatalogRecord::ProductFamily(f) => {
                upsert_named(conn, PRODUCT_FAMILY_UPSERT_SQL, f.id, &f.name_en, &f.raw)
            }
        }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogRepository {
    async fn upsert(&self, record: &CatalogRecord) -> Result<UpsertOutcome> {
        let db = Arc::clone(&self.db);
        let record = record.clone();

        task::spawn_blocking(move || -> Result<UpsertOutcome> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            let existed =
                Self::row_exists(&tx, record.entity_type(), &record.external_id())?;
            Self::upsert_record(&tx, &record)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(if existed { UpsertOutcome::Updated } else { UpsertOutcome::Inserted })
        })
        .await
        .map_err(map_join_error)?
    }

    async fn exists(&self, entity_type: EntityType, external_id: &str) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let external_id = external_id.to_string();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            Self::row_exists(&conn, entity_type, &external_id)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn link(&self, kind: RelationshipKind, product_id: &str, target_id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);
        let product_id = product_id.to_string();
        let (join_table, target_column) = join_table(kind)?;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let sql = format!(
                "INSERT OR IGNORE INTO {join_table} (product_id, {target_column})
                 VALUES (?1, ?2)"
            );
            conn.execute(&sql, params![product_id, target_id]).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn unlink(&self, kind: RelationshipKind, product_id: &str, target_id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);
        let product_id = product_id.to_string();
        let (join_table, target_column) = join_table(kind)?;

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let sql = format!(
                "DELETE FROM {join_table} WHERE product_id = ?1 AND {target_column} = ?2"
            );
            conn.execute(&sql, params![product_id, target_id]).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn links_of(&self, kind: RelationshipKind, product_id: &str) -> Result<Vec<i64>> {
        let db = Arc::clone(&self.db);
        let product_id = product_id.to_string();
        let (join_table, target_column) = join_table(kind)?;

        task::spawn_blocking(move || -> Result<Vec<i64>> {
            let conn = db.get_connection()?;
            let sql = format!(
                "SELECT {target_column} FROM {join_table}
                 WHERE product_id = ?1 ORDER BY {target_column} ASC"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let result = stmt
                .query_map(params![product_id], |row| row.get(0))
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<i64>>>()
                .map_err(map_sql_error);
            result
        })
        .await
        .map_err(map_join_error)?
    }

    async fn set_category_parent(&self, category_id: i64, parent: Option<i64>) -> Result<bool> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE public_categories SET parent = ?1
                     WHERE id = ?2 AND parent IS NOT ?1",
                    params![parent, category_id],
                )
                .map_err(map_sql_error)?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn product_raw_rows(&self) -> Result<Vec<(String, Value)>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<(String, Value)>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare("SELECT id, raw_data FROM products WHERE raw_data IS NOT NULL")
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;

            rows.into_iter()
                .map(|(id, raw)| parse_raw(&raw).map(|value| (id, value)))
                .collect()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn category_raw_rows(&self) -> Result<Vec<(i64, Value)>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<(i64, Value)>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare("SELECT id, raw_data FROM public_categories WHERE raw_data IS NOT NULL")
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(map_sql_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql_error)?;

            rows.into_iter()
                .map(|(id, raw)| parse_raw(&raw).map(|value| (id, value)))
                .collect()
        })
        .await
        .map_err(map_join_error)?
    }

    async fn count(&self, entity_type: EntityType) -> Result<i64> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<i64> {
            let conn = db.get_connection()?;
            let sql = format!("SELECT COUNT(*) FROM {}", table(entity_type));
            conn.query_row(&sql, [], |row| row.get(0)).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn table(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Product => "products",
        EntityType::Brand => "brands",
        EntityType::Organization => "organizations",
        EntityType::Category => "public_categories",
        EntityType::Media => "media",
        EntityType::ActiveIngredient => "active_ingredients",
        EntityType::ProductFamily => "product_families",
    }
}

fn join_table(kind: RelationshipKind) -> Result<(&'static str, &'static str)> {
    match kind {
        RelationshipKind::Brand => Ok(("product_brands", "brand_id")),
        RelationshipKind::Category => Ok(("product_categories", "category_id")),
        RelationshipKind::Organization => Ok(("product_organizations", "organization_id")),
        RelationshipKind::Media => Ok(("product_media", "media_id")),
        RelationshipKind::CategoryParent => Err(PimSyncError::InvalidInput(
            "category parent links are a column, not a join row".into(),
        )),
    }
}

fn parse_raw(raw: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| PimSyncError::Database(format!("stored raw_data is not valid JSON: {e}")))
}

fn to_json(value: &Value) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| PimSyncError::Internal(format!("failed to serialize raw_data: {e}")))
}

fn upsert_product(conn: &rusqlite::Connection, p: &ProductRecord) -> Result<()> {
    let ean_json = serde_json::to_string(&p.ean)
        .map_err(|e| PimSyncError::Internal(format!("failed to serialize ean list: {e}")))?;
    conn.execute(
        PRODUCT_UPSERT_SQL,
        params![
            p.id,
            p.name_en,
            p.seo_name_en,
            p.status,
            ean_json,
            p.ean_gtin8,
            p.ean_gtin12,
            p.ean_gtin13,
            p.ean_gtin14,
            p.artg_id,
            p.pbs,
            p.fred,
            p.z_code,
            p.snomed_mp,
            p.snomed_mpp,
            p.snomed_mpuu,
            p.snomed_ctpp,
            p.snomed_tp,
            p.snomed_tpp,
            p.snomed_tpuu,
            p.public_price,
            p.pharmacist_price,
            p.manufacturer_price,
            p.requires_legal_text,
            p.biocide,
            p.replacement,
            p.created_at,
            p.updated_at,
            to_json(&p.raw)?,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn upsert_brand(conn: &rusqlite::Connection, b: &BrandRecord) -> Result<()> {
    conn.execute(BRAND_UPSERT_SQL, params![b.id, b.name, to_json(&b.raw)?])
        .map_err(map_sql_error)?;
    Ok(())
}

fn upsert_organization(conn: &rusqlite::Connection, o: &OrganizationRecord) -> Result<()> {
    conn.execute(
        ORGANIZATION_UPSERT_SQL,
        params![o.id, o.name, o.org_type, to_json(&o.raw)?],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn upsert_category(conn: &rusqlite::Connection, c: &CategoryRecord) -> Result<()> {
    conn.execute(
        CATEGORY_UPSERT_SQL,
        params![c.id, c.name_en, c.parent, c.order_index, to_json(&c.raw)?],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn upsert_media(conn: &rusqlite::Connection, m: &MediaRecord) -> Result<()> {
    conn.execute(
        MEDIA_UPSERT_SQL,
        params![m.id, m.media_type, m.photo_type, m.storage_path, to_json(&m.raw)?],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn upsert_named(
    conn: &rusqlite::Connection,
    sql: &str,
    id: i64,
    name_en: &Option<String>,
    raw: &Value,
) -> Result<()> {
    conn.execute(sql, params![id, name_en, to_json(raw)?]).map_err(map_sql_error)?;
    Ok(())
}

const PRODUCT_UPSERT_SQL: &str = "INSERT INTO products (
        id, name_en, seo_name_en, status, ean,
        ean_gtin8, ean_gtin12, ean_gtin13, ean_gtin14,
        artg_id, pbs, fred, z_code,
        snomed_mp, snomed_mpp, snomed_mpuu, snomed_ctpp,
        snomed_tp, snomed_tpp, snomed_tpuu,
        public_price, pharmacist_price, manufacturer_price,
        requires_legal_text, biocide, replacement,
        created_at, updated_at, raw_data
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
        ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29
    )
    ON CONFLICT(id) DO UPDATE SET
        name_en = excluded.name_en,
        seo_name_en = excluded.seo_name_en,
        status = excluded.status,
        ean = excluded.ean,
        ean_gtin8 = excluded.ean_gtin8,
        ean_gtin12 = excluded.ean_gtin12,
        ean_gtin13 = excluded.ean_gtin13,
        ean_gtin14 = excluded.ean_gtin14,
        artg_id = excluded.artg_id,
        pbs = excluded.pbs,
        fred = excluded.fred,
        z_code = excluded.z_code,
        snomed_mp = excluded.snomed_mp,
        snomed_mpp = excluded.snomed_mpp,
        snomed_mpuu = excluded.snomed_mpuu,
        snomed_ctpp = excluded.snomed_ctpp,
        snomed_tp = excluded.snomed_tp,
        snomed_tpp = excluded.snomed_tpp,
        snomed_tpuu = excluded.snomed_tpuu,
        public_price = excluded.public_price,
        pharmacist_price = excluded.pharmacist_price,
        manufacturer_price = excluded.manufacturer_price,
        requires_legal_text = excluded.requires_legal_text,
        biocide = excluded.biocide,
        replacement = excluded.replacement,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        raw_data = excluded.raw_data";

const BRAND_UPSERT_SQL: &str = "INSERT INTO brands (id, name, raw_data)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        raw_data = excluded.raw_data";

const ORGANIZATION_UPSERT_SQL: &str = "INSERT INTO organizations (id, name, type, raw_data)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        type = excluded.type,
        raw_data = excluded.raw_data";

const CATEGORY_UPSERT_SQL: &str =
    "INSERT INTO public_categories (id, name_en, parent, order_index, raw_data)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(id) DO UPDATE SET
        name_en = excluded.name_en,
        parent = excluded.parent,
        order_index = excluded.order_index,
        raw_data = excluded.raw_data";

// storage_path is deliberately absent from the update list: it belongs to
// the media pipeline and must survive catalog refreshes.
const MEDIA_UPSERT_SQL: &str =
    "INSERT INTO media (id, type, photo_type, storage_path, raw_data)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(id) DO UPDATE SET
        type = excluded.type,
        photo_type = excluded.photo_type,
        raw_data = excluded.raw_data";

const ACTIVE_INGREDIENT_UPSERT_SQL: &str =
    "INSERT INTO active_ingredients (id, name_en, raw_data)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(id) DO UPDATE SET
        name_en = excluded.name_en,
        raw_data = excluded.raw_data";

const PRODUCT_FAMILY_UPSERT_SQL: &str =
    "INSERT INTO product_families (id, name_en, raw_data)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(id) DO UPDATE SET
        name_en = excluded.name_en,
        raw_data = excluded.raw_data";
