//! Behavioral tests for the migration engine: ordering, idempotence,
//! stop-on-failure, resumability.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use motorlog_store::{
    Filter, Migration, MigrationError, MigrationRecord, Migrator, StoreError, StoreHandle,
};

/// Test migration that records its execution in a shared log and can be
/// told to fail.
struct Step {
    name: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
    fail: Arc<AtomicBool>,
}

impl Step {
    fn new(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Box<Self> {
        Box::new(Self {
            name,
            log: Arc::clone(log),
            fail: Arc::new(AtomicBool::new(false)),
        })
    }

    fn failing(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> (Box<Self>, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(true));
        let step = Box::new(Self {
            name,
            log: Arc::clone(log),
            fail: Arc::clone(&fail),
        });
        (step, fail)
    }
}

#[async_trait]
impl Migration for Step {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn apply(&self, _db: &StoreHandle) -> Result<(), StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("index build failed".to_string()));
        }
        self.log.lock().unwrap().push(self.name);
        Ok(())
    }
}

fn three_steps(log: &Arc<Mutex<Vec<&'static str>>>) -> Vec<Box<dyn Migration>> {
    vec![
        Step::new("create-vehicle-tables", log),
        Step::new("backfill-total-price", log),
        Step::new("photo-content-type-default", log),
    ]
}

#[tokio::test]
async fn applies_in_declared_order() {
    let db = StoreHandle::connect_memory().await.unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let migrator = Migrator::new(three_steps(&log)).unwrap();
    let report = migrator.run(&db).await.unwrap();

    assert_eq!(
        report.applied,
        vec![
            "create-vehicle-tables",
            "backfill-total-price",
            "photo-content-type-default"
        ]
    );
    assert!(report.skipped.is_empty());
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "create-vehicle-tables",
            "backfill-total-price",
            "photo-content-type-default"
        ]
    );
}

#[tokio::test]
async fn second_run_performs_zero_writes() {
    let db = StoreHandle::connect_memory().await.unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let migrator = Migrator::new(three_steps(&log)).unwrap();
    migrator.run(&db).await.unwrap();

    let records = db.collection::<MigrationRecord>();
    let before = records.find_many(&Filter::all()).await.unwrap();

    let report = migrator.run(&db).await.unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 3);

    // Applied-set unchanged, no step bodies re-ran.
    let after = records.find_many(&Filter::all()).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn failure_stops_the_run_before_later_steps() {
    let db = StoreHandle::connect_memory().await.unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (broken, _fail) = Step::failing("backfill-total-price", &log);
    let steps: Vec<Box<dyn Migration>> = vec![
        Step::new("create-vehicle-tables", &log),
        broken,
        Step::new("photo-content-type-default", &log),
    ];

    let migrator = Migrator::new(steps).unwrap();
    let err = migrator.run(&db).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::Step { ref name, .. } if name == "backfill-total-price"
    ));

    // Only the first step ran; the failed one left no record and the
    // third was never attempted.
    assert_eq!(*log.lock().unwrap(), vec!["create-vehicle-tables"]);
    let applied: Vec<String> = db
        .collection::<MigrationRecord>()
        .find_many(&Filter::all())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.value.name)
        .collect();
    assert_eq!(applied, vec!["create-vehicle-tables"]);
}

#[tokio::test]
async fn resuming_after_a_failure_skips_completed_steps() {
    let db = StoreHandle::connect_memory().await.unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    let (broken, fail) = Step::failing("backfill-total-price", &log);
    let steps: Vec<Box<dyn Migration>> = vec![
        Step::new("create-vehicle-tables", &log),
        broken,
        Step::new("photo-content-type-default", &log),
    ];
    let migrator = Migrator::new(steps).unwrap();
    migrator.run(&db).await.unwrap_err();

    // Next startup: the underlying cause is fixed.
    fail.store(false, Ordering::SeqCst);
    let report = migrator.run(&db).await.unwrap();

    assert_eq!(report.skipped, vec!["create-vehicle-tables"]);
    assert_eq!(
        report.applied,
        vec!["backfill-total-price", "photo-content-type-default"]
    );
    // The completed first step did not run a second time.
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "create-vehicle-tables",
            "backfill-total-price",
            "photo-content-type-default"
        ]
    );
}

#[tokio::test]
async fn status_reports_applied_and_pending() {
    let db = StoreHandle::connect_memory().await.unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let migrator = Migrator::new(three_steps(&log)).unwrap();

    let status = migrator.status(&db).await.unwrap();
    assert!(status.applied.is_empty());
    assert_eq!(status.pending.len(), 3);

    migrator.run(&db).await.unwrap();

    let status = migrator.status(&db).await.unwrap();
    assert_eq!(status.applied.len(), 3);
    assert!(status.pending.is_empty());
    assert_eq!(status.applied[0].name, "create-vehicle-tables");
}

/// A migration that actually touches the database: defines a table and
/// writes through a collection, the way real schema steps do.
struct DefineTables;

#[async_trait]
impl Migration for DefineTables {
    fn name(&self) -> &'static str {
        "define-audit-table"
    }

    async fn apply(&self, db: &StoreHandle) -> Result<(), StoreError> {
        db.execute(
            "DEFINE TABLE IF NOT EXISTS audit_log SCHEMALESS;
             DEFINE INDEX IF NOT EXISTS idx_audit_at ON TABLE audit_log COLUMNS at;",
        )
        .await
    }
}

#[tokio::test]
async fn migrations_can_run_schema_statements() {
    let db = StoreHandle::connect_memory().await.unwrap();
    let migrator = Migrator::new(vec![Box::new(DefineTables)]).unwrap();

    let report = migrator.run(&db).await.unwrap();
    assert_eq!(report.applied, vec!["define-audit-table"]);

    // Defining again via a second run is skipped entirely.
    let report = migrator.run(&db).await.unwrap();
    assert_eq!(report.skipped, vec!["define-audit-table"]);
}
