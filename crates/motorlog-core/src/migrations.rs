//! The application's migration sequence
//!
//! Declared in a fixed order; later steps may assume earlier ones have
//! run. Names are stable forever; a renamed step would re-run as a new
//! one on every existing database.

use async_trait::async_trait;
use motorlog_store::{Migration, StoreError, StoreHandle};
use tracing::debug;

/// All migrations, in the order they ship.
pub fn migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateBaseSchema),
        Box::new(BackfillFillUpTotalPrice),
        Box::new(DefaultPhotoContentType),
    ]
}

/// Tables and indexes for every collection, including the blob store's
/// metadata and chunk tables.
struct CreateBaseSchema;

#[async_trait]
impl Migration for CreateBaseSchema {
    fn name(&self) -> &'static str {
        "create-base-schema"
    }

    async fn apply(&self, db: &StoreHandle) -> Result<(), StoreError> {
        debug!("Defining base tables and indexes");
        db.execute(
            "DEFINE TABLE IF NOT EXISTS vehicles SCHEMALESS;
             DEFINE TABLE IF NOT EXISTS fill_ups SCHEMALESS;
             DEFINE TABLE IF NOT EXISTS vehicle_events SCHEMALESS;
             DEFINE TABLE IF NOT EXISTS photos SCHEMALESS;
             DEFINE TABLE IF NOT EXISTS files SCHEMALESS;
             DEFINE TABLE IF NOT EXISTS file_chunks SCHEMALESS;

             DEFINE INDEX IF NOT EXISTS idx_fill_up_vehicle ON TABLE fill_ups COLUMNS vehicle_id;
             DEFINE INDEX IF NOT EXISTS idx_fill_up_vehicle_date ON TABLE fill_ups COLUMNS vehicle_id, filled_at;
             DEFINE INDEX IF NOT EXISTS idx_event_vehicle ON TABLE vehicle_events COLUMNS vehicle_id;
             DEFINE INDEX IF NOT EXISTS idx_photo_vehicle ON TABLE photos COLUMNS vehicle_id;
             DEFINE INDEX IF NOT EXISTS idx_file_name ON TABLE files COLUMNS file_name UNIQUE;
             DEFINE INDEX IF NOT EXISTS idx_chunk_upload_seq ON TABLE file_chunks COLUMNS upload_id, seq UNIQUE;",
        )
        .await
    }
}

/// Early releases stored only `liters` and `price_per_liter`;
/// `total_price` was computed in the UI. It is part of the stored shape
/// now, so older documents get it filled in once.
struct BackfillFillUpTotalPrice;

#[async_trait]
impl Migration for BackfillFillUpTotalPrice {
    fn name(&self) -> &'static str {
        "backfill-fill-up-total-price"
    }

    async fn apply(&self, db: &StoreHandle) -> Result<(), StoreError> {
        debug!("Backfilling fill_ups.total_price");
        db.execute(
            "UPDATE fill_ups SET total_price = liters * price_per_liter WHERE total_price = NONE",
        )
        .await
    }
}

/// Photos imported before content types were recorded default to JPEG,
/// which is what every camera upload of that era actually was.
struct DefaultPhotoContentType;

#[async_trait]
impl Migration for DefaultPhotoContentType {
    fn name(&self) -> &'static str {
        "default-photo-content-type"
    }

    async fn apply(&self, db: &StoreHandle) -> Result<(), StoreError> {
        debug!("Defaulting photos.content_type");
        db.execute(
            "UPDATE photos SET content_type = 'image/jpeg' WHERE content_type = NONE OR content_type = ''",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn declared_names_are_unique() {
        let names: Vec<&str> = migrations().iter().map(|m| m.name()).collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len());
    }

    #[test]
    fn schema_creation_comes_first() {
        assert_eq!(migrations()[0].name(), "create-base-schema");
    }
}
