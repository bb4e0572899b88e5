//! End-to-end snapshot tests: export from a live database, restore into
//! an empty one, and the failure modes in between.

use futures::stream::TryStreamExt;
use motorlog_core::backup::{export_snapshot, import_snapshot, BackupError, SNAPSHOT_FILE};
use motorlog_core::migrations::migrations;
use motorlog_core::model::{FillUp, Photo, Vehicle, VehicleEvent};
use motorlog_store::{
    stream_from_bytes, ContentType, DocumentId, FileName, Filter, Migrator, StoreHandle,
};

async fn fresh_db() -> StoreHandle {
    let db = StoreHandle::connect_memory().await.unwrap();
    Migrator::new(migrations()).unwrap().run(&db).await.unwrap();
    db
}

fn civic() -> Vehicle {
    Vehicle {
        vin: Some("JHMFC1650KX012345".to_string()),
        ..Vehicle::new("Civic", "Honda", "Civic", 2019)
    }
}

fn fill_up(vehicle_id: &DocumentId) -> FillUp {
    FillUp {
        vehicle_id: vehicle_id.clone(),
        filled_at: "2025-06-14T17:42:00Z".parse().unwrap(),
        odometer_km: 48_350,
        liters: 41.7,
        price_per_liter: 1.89,
        total_price: 78.81,
        partial: false,
    }
}

fn inspection(vehicle_id: &DocumentId) -> VehicleEvent {
    VehicleEvent {
        vehicle_id: vehicle_id.clone(),
        occurred_at: "2025-03-02T10:00:00Z".parse().unwrap(),
        kind: "inspection".to_string(),
        odometer_km: Some(47_100),
        notes: None,
        cost: Some(120.0),
    }
}

fn photo(vehicle_id: &DocumentId) -> Photo {
    Photo {
        vehicle_id: vehicle_id.clone(),
        file_name: FileName::new("photo-42.jpg").unwrap(),
        content_type: ContentType::new("image/jpeg").unwrap(),
        title: Some("Front left".to_string()),
        taken_at: None,
    }
}

fn photo_bytes() -> Vec<u8> {
    (0..10_000).map(|i| (i % 249) as u8).collect()
}

/// Populate a database with one vehicle and its attachments; returns the
/// vehicle's id.
async fn populate(db: &StoreHandle) -> DocumentId {
    let vehicle_id = db.collection::<Vehicle>().insert(&civic()).await.unwrap();
    db.collection::<FillUp>()
        .insert(&fill_up(&vehicle_id))
        .await
        .unwrap();
    db.collection::<VehicleEvent>()
        .insert(&inspection(&vehicle_id))
        .await
        .unwrap();
    db.collection::<Photo>()
        .insert(&photo(&vehicle_id))
        .await
        .unwrap();
    db.blobs()
        .put(
            &FileName::new("photo-42.jpg").unwrap(),
            &ContentType::new("image/jpeg").unwrap(),
            stream_from_bytes(photo_bytes()),
        )
        .await
        .unwrap();
    vehicle_id
}

#[tokio::test]
async fn export_then_import_round_trips_everything() {
    let source = fresh_db().await;
    let vehicle_id = populate(&source).await;

    let dir = tempfile::tempdir().unwrap();
    let exported = export_snapshot(&source, dir.path()).await.unwrap();
    assert_eq!(exported.documents, 4);
    assert_eq!(exported.files, 1);

    let target = fresh_db().await;
    let imported = import_snapshot(&target, dir.path()).await.unwrap();
    assert_eq!(imported.documents, 4);
    assert_eq!(imported.files, 1);

    // The vehicle is reachable under its original id and decodes to the
    // same value.
    let restored = target
        .collection::<Vehicle>()
        .find_by_id(&vehicle_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.value, civic());

    // Dependent records survived with their references intact.
    let fill_ups = target
        .collection::<FillUp>()
        .find_many(&Filter::all().eq("vehicle_id", vehicle_id.as_str()))
        .await
        .unwrap();
    assert_eq!(fill_ups.len(), 1);
    assert_eq!(fill_ups[0].value, fill_up(&vehicle_id));

    let events = target.collection::<VehicleEvent>().all().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].value, inspection(&vehicle_id));

    // Blob content came back byte for byte.
    let file = target
        .blobs()
        .get(&FileName::new("photo-42.jpg").unwrap())
        .await
        .unwrap();
    let content = file
        .content
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
        .unwrap();
    assert_eq!(content, photo_bytes());
}

#[tokio::test]
async fn missing_artifact_aborts_before_any_write() {
    let source = fresh_db().await;
    populate(&source).await;

    let dir = tempfile::tempdir().unwrap();
    export_snapshot(&source, dir.path()).await.unwrap();

    // The archive lost the photo on its way to us.
    std::fs::remove_file(dir.path().join("photo-42.jpg")).unwrap();

    let target = fresh_db().await;
    let err = import_snapshot(&target, dir.path()).await.unwrap_err();
    assert!(matches!(
        err,
        BackupError::MissingBackupFile { ref file_name } if file_name == "photo-42.jpg"
    ));

    // Nothing was persisted.
    assert_eq!(
        target.collection::<Vehicle>().count(&Filter::all()).await.unwrap(),
        0
    );
    assert_eq!(
        target.collection::<Photo>().count(&Filter::all()).await.unwrap(),
        0
    );
    assert!(target.blobs().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn import_refuses_a_non_empty_target() {
    let source = fresh_db().await;
    populate(&source).await;

    let dir = tempfile::tempdir().unwrap();
    export_snapshot(&source, dir.path()).await.unwrap();

    // The target already has data of its own.
    let target = fresh_db().await;
    target
        .collection::<Vehicle>()
        .insert(&Vehicle::new("Old Faithful", "Opel", "Vectra", 1998))
        .await
        .unwrap();

    let err = import_snapshot(&target, dir.path()).await.unwrap_err();
    assert!(matches!(
        err,
        BackupError::TargetNotEmpty {
            collection: "vehicles",
            ..
        }
    ));
}

#[tokio::test]
async fn unreadable_snapshot_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(SNAPSHOT_FILE), b"not a snapshot").unwrap();

    let target = fresh_db().await;
    let err = import_snapshot(&target, dir.path()).await.unwrap_err();
    assert!(matches!(err, BackupError::Malformed(_)));
}

#[tokio::test]
async fn tampered_document_fails_decode_with_path() {
    let source = fresh_db().await;
    populate(&source).await;

    let dir = tempfile::tempdir().unwrap();
    export_snapshot(&source, dir.path()).await.unwrap();

    // Hand-edit the snapshot: the vehicle's year stops being a number.
    let raw = std::fs::read_to_string(dir.path().join(SNAPSHOT_FILE)).unwrap();
    let tampered = raw.replace("\"2019\"", "\"twenty nineteen\"");
    assert_ne!(raw, tampered);
    std::fs::write(dir.path().join(SNAPSHOT_FILE), tampered).unwrap();

    let target = fresh_db().await;
    let err = import_snapshot(&target, dir.path()).await.unwrap_err();
    match err {
        BackupError::Decode(decode) => {
            assert_eq!(decode.path, "year");
            assert_eq!(decode.expected, "an integer");
        }
        other => panic!("expected Decode, got {other:?}"),
    }
}

#[tokio::test]
async fn exporting_an_empty_database_yields_an_importable_snapshot() {
    let source = fresh_db().await;
    let dir = tempfile::tempdir().unwrap();
    let exported = export_snapshot(&source, dir.path()).await.unwrap();
    assert_eq!(exported.documents, 0);
    assert_eq!(exported.files, 0);

    let target = fresh_db().await;
    let imported = import_snapshot(&target, dir.path()).await.unwrap();
    assert_eq!(imported.documents, 0);
}
