//! Forward-only migration engine
//!
//! Migrations are a fixed, compile-time-declared sequence of named steps.
//! The set of names recorded in the `schema_migrations` collection is the
//! durable cursor of progress: membership decides whether a step runs,
//! declared order decides when, so later steps may assume earlier ones
//! have completed.
//!
//! The engine runs once at startup, before any application traffic. A
//! step failure stops the run without recording completion, so the next
//! start retries from the failed step. Names are never reused or renamed
//! after release; a rename would make the engine treat the step as new
//! and run it again. That constraint is enforced in review, not here.
//!
//! Running two migrator instances concurrently against one database is
//! out of scope; deployments run exactly one. The unique index on the
//! record name turns a lost race into a storage error rather than a
//! silent double-apply.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{MigrationError, StoreError};
use crate::handle::StoreHandle;
use crate::schema::{Document, Field, Shape, StructShape};

/// Completion record for one migration. Created exactly once when the
/// step succeeds; never mutated or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

impl Document for MigrationRecord {
    const COLLECTION: &'static str = "schema_migrations";

    fn shape() -> StructShape {
        StructShape::new(
            "MigrationRecord",
            vec![
                Field::new("name", Shape::String),
                Field::new("applied_at", Shape::Timestamp),
            ],
        )
    }
}

/// One named, one-time transformation of stored data.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Stable unique name. Once shipped, never reused or renamed.
    fn name(&self) -> &'static str;

    /// Apply the transformation. Runs at most once per database.
    async fn apply(&self, db: &StoreHandle) -> Result<(), StoreError>;
}

/// Outcome of a migrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Names applied during this run, in execution order.
    pub applied: Vec<&'static str>,
    /// Names skipped because they were already recorded.
    pub skipped: Vec<&'static str>,
}

/// Applied/pending view without side effects.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatus {
    /// Records already present, in application order.
    pub applied: Vec<MigrationRecord>,
    /// Declared names not yet applied, in declared order.
    pub pending: Vec<&'static str>,
}

/// Evaluates a declared migration sequence against a database.
pub struct Migrator {
    steps: Vec<Box<dyn Migration>>,
}

impl Migrator {
    /// Build a migrator over a declared step order. Rejects duplicate
    /// names up front.
    pub fn new(steps: Vec<Box<dyn Migration>>) -> Result<Self, MigrationError> {
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name()) {
                return Err(MigrationError::DuplicateName(step.name().to_string()));
            }
        }
        Ok(Self { steps })
    }

    /// Apply all outstanding migrations in declared order.
    ///
    /// Already-applied names are skipped; each success is recorded before
    /// the next step starts; the first failure stops the run. When
    /// everything is already applied the run performs zero writes.
    #[instrument(skip_all, fields(declared = self.steps.len()))]
    pub async fn run(&self, db: &StoreHandle) -> Result<MigrationReport, MigrationError> {
        self.ensure_state_collection(db).await?;

        let records = db.collection::<MigrationRecord>();
        let applied: HashSet<String> = self
            .load_applied(db)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();

        let mut report = MigrationReport {
            applied: Vec::new(),
            skipped: Vec::new(),
        };

        for step in &self.steps {
            let name = step.name();
            if applied.contains(name) {
                debug!(migration = name, "Already applied, skipping");
                report.skipped.push(name);
                continue;
            }

            info!(migration = name, "Applying migration");
            step.apply(db).await.map_err(|source| MigrationError::Step {
                name: name.to_string(),
                source,
            })?;

            records
                .insert(&MigrationRecord {
                    name: name.to_string(),
                    applied_at: Utc::now(),
                })
                .await
                .map_err(MigrationError::State)?;
            report.applied.push(name);
            info!(migration = name, "Migration applied");
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Migration run complete"
        );
        Ok(report)
    }

    /// Report applied and pending names without writing anything.
    pub async fn status(&self, db: &StoreHandle) -> Result<MigrationStatus, MigrationError> {
        self.ensure_state_collection(db).await?;

        let applied = self.load_applied(db).await?;
        let names: HashSet<&str> = applied.iter().map(|r| r.name.as_str()).collect();
        let pending = self
            .steps
            .iter()
            .map(|s| s.name())
            .filter(|n| !names.contains(n))
            .collect();

        Ok(MigrationStatus { applied, pending })
    }

    async fn load_applied(&self, db: &StoreHandle) -> Result<Vec<MigrationRecord>, MigrationError> {
        let records = db.collection::<MigrationRecord>();
        let stored = records
            .find_many(&crate::collection::Filter::all().order_by("applied_at"))
            .await
            .map_err(MigrationError::State)?;
        Ok(stored.into_iter().map(|s| s.value).collect())
    }

    /// The state collection is created on demand; the unique name index
    /// is what makes completion records collision-proof.
    async fn ensure_state_collection(&self, db: &StoreHandle) -> Result<(), MigrationError> {
        db.execute(
            "DEFINE TABLE IF NOT EXISTS schema_migrations SCHEMALESS;
             DEFINE INDEX IF NOT EXISTS idx_migration_name ON TABLE schema_migrations COLUMNS name UNIQUE;",
        )
        .await
        .map_err(MigrationError::State)
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Migration for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn apply(&self, _db: &StoreHandle) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_names_rejected_at_construction() {
        let err = Migrator::new(vec![
            Box::new(Named("add-vehicles")),
            Box::new(Named("add-vehicles")),
        ])
        .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateName(name) if name == "add-vehicles"));
    }

    #[test]
    fn distinct_names_accepted() {
        let migrator = Migrator::new(vec![
            Box::new(Named("add-vehicles")),
            Box::new(Named("add-fill-ups")),
        ])
        .unwrap();
        assert!(format!("{migrator:?}").contains("add-fill-ups"));
    }
}
