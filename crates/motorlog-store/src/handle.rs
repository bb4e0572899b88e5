//! Database connection handle and lifecycle
//!
//! The handle is created once at process startup and passed explicitly to
//! everything that needs storage; there is no global lookup. It wraps the
//! engine-generic client, so the same code runs against an in-memory
//! engine (tests, local use) or a remote endpoint (deployments).

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::blob::BlobStore;
use crate::collection::Collection;
use crate::error::StoreError;
use crate::schema::Document;

/// Connection configuration for a remote database endpoint
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint URL (e.g. "ws://localhost:8000" or a cloud WebSocket URL)
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "motorlog")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether to authenticate as a root user instead of a database user
    pub is_root: bool,
}

impl StoreConfig {
    /// Create a configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: "motorlog".to_string(),
            database: "main".to_string(),
            is_root: false,
        }
    }

    /// Set a custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set a custom database name
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Authenticate as a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - MOTORLOG_DB_ENDPOINT (required)
    /// - MOTORLOG_DB_USERNAME (required)
    /// - MOTORLOG_DB_PASSWORD (required)
    /// - MOTORLOG_DB_NAMESPACE (optional, default: "motorlog")
    /// - MOTORLOG_DB_DATABASE (optional, default: "main")
    /// - MOTORLOG_DB_ROOT (optional, default: "false")
    pub fn from_env() -> Result<Self, String> {
        let endpoint =
            std::env::var("MOTORLOG_DB_ENDPOINT").map_err(|_| "MOTORLOG_DB_ENDPOINT not set")?;
        let username =
            std::env::var("MOTORLOG_DB_USERNAME").map_err(|_| "MOTORLOG_DB_USERNAME not set")?;
        let password =
            std::env::var("MOTORLOG_DB_PASSWORD").map_err(|_| "MOTORLOG_DB_PASSWORD not set")?;
        let namespace =
            std::env::var("MOTORLOG_DB_NAMESPACE").unwrap_or_else(|_| "motorlog".to_string());
        let database =
            std::env::var("MOTORLOG_DB_DATABASE").unwrap_or_else(|_| "main".to_string());
        let is_root = std::env::var("MOTORLOG_DB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// Handle to the document store.
///
/// Cloning is cheap; every clone shares one underlying connection. The
/// connection is released when the last clone is dropped; [`close`]
/// makes that release an explicit, logged step on shutdown paths.
///
/// [`close`]: StoreHandle::close
#[derive(Clone)]
pub struct StoreHandle {
    db: Surreal<Any>,
}

impl StoreHandle {
    /// Connect to an in-memory database (tests, local single-process use)
    #[instrument(skip_all)]
    pub async fn connect_memory() -> Result<Self, StoreError> {
        info!("Connecting to in-memory document store");

        let db = surrealdb::engine::any::connect("mem://")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        db.use_ns("motorlog")
            .use_db("main")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(StoreHandle { db })
    }

    /// Connect to a remote endpoint
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        info!("Connecting to document store (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StoreError::Connection(format!("failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StoreError::Connection(format!("root authentication failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StoreError::Connection(format!("database authentication failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StoreError::Connection(format!("failed to select namespace/database: {e}"))
            })?;

        info!("Document store connected");
        Ok(StoreHandle { db })
    }

    /// Connect using environment variables, falling back to in-memory
    ///
    /// If MOTORLOG_DB_ENDPOINT is set, connects to that endpoint with the
    /// configured credentials. Otherwise uses an in-memory database.
    #[instrument(skip_all)]
    pub async fn connect_from_env() -> Result<Self, StoreError> {
        match StoreConfig::from_env() {
            Ok(config) => Self::connect(config).await,
            Err(_) => {
                info!("No endpoint configured, using in-memory database");
                Self::connect_memory().await
            }
        }
    }

    /// Typed handle to a collection, bound to `T`'s declared schema
    pub fn collection<T: Document>(&self) -> Collection<T> {
        Collection::new(self.db.clone())
    }

    /// Handle to the blob store
    pub fn blobs(&self) -> BlobStore {
        BlobStore::new(self.db.clone())
    }

    /// Run raw statements against the store (table/index definitions,
    /// set-based updates in migrations). Per-statement errors are checked
    /// and surfaced.
    #[instrument(skip_all)]
    pub async fn execute(&self, sql: &str) -> Result<(), StoreError> {
        debug!("Executing raw statements");
        let response = self.db.query(sql).await?;
        response.check()?;
        Ok(())
    }

    /// Release the connection explicitly.
    ///
    /// Collections and blob stores created from this handle keep the
    /// connection alive until they are dropped too; `close` exists so
    /// shutdown paths release and log deterministically rather than
    /// relying on drop order.
    pub async fn close(self) -> Result<(), StoreError> {
        info!("Closing document store connection");
        drop(self.db);
        Ok(())
    }
}
