//! Shared helpers for infra integration tests.

use std::sync::Arc;

use pimsync_infra::database::DbManager;
use serde_json::{json, Value};
use tempfile::TempDir;

/// An on-disk database that lives as long as the test.
pub struct TestDb {
    // Held so the directory outlives the pool.
    _dir: TempDir,
    pub manager: Arc<DbManager>,
}

/// Create a migrated database in a fresh temp directory.
pub fn setup_db() -> TestDb {
    let dir = TempDir::new().expect("temp dir created");
    let manager = DbManager::open(dir.path().join("pimsync.db"), 4).expect("database opened");
    TestDb { _dir: dir, manager }
}

/// A provider product item referencing one organization.
#[allow(dead_code)]
pub fn product_item(id: &str, org_id: i64) -> Value {
    json!({
        "id": id,
        "name": {"en": format!("Product {id}")},
        "status": "active",
        "publicPrice": 1299,
        "organizations": [{"id": org_id, "type": "manufacturer"}]
    })
}

/// A provider organization item.
#[allow(dead_code)]
pub fn organization_item(id: i64) -> Value {
    json!({"id": id, "name": format!("Org {id}"), "type": "manufacturer"})
}

/// A provider brand item.
#[allow(dead_code)]
pub fn brand_item(id: i64) -> Value {
    json!({"id": id, "name": format!("Brand {id}")})
}
