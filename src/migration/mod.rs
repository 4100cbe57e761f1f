//! Version migration
//!
//! Stored payloads carry the version they were written at. On read, a
//! [`MigrationManager`] checks that version against the active
//! [`CompatibilityStrategy`] and, if it is stale, applies a chain of
//! [`DataMigration`]s up to the current version.

pub mod compatibility;
mod graph;

pub use compatibility::CompatibilityStrategy;

use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::codec::{DATA_KEY, VERSION_KEY};
use crate::error::VersionCompatibilityError;
use crate::version::VersionInfo;
use graph::MigrationGraph;

/// Error type returned by custom migration transforms
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Custom transform over a whole envelope
pub type MigrationFn = Arc<dyn Fn(JsonValue) -> Result<JsonValue, BoxError> + Send + Sync>;

/// What a migration does to the payload
#[derive(Clone)]
pub enum MigrationKind {
    /// `(old, new)` key renames inside `data`; absent keys are skipped
    RenameFields(Vec<(String, String)>),
    /// Defaults for keys absent from `data`; present keys are left alone
    AddFields(Vec<(String, JsonValue)>),
    /// Keys dropped from `data` when present
    RemoveFields(Vec<String>),
    /// Arbitrary transform of the whole envelope
    Custom(MigrationFn),
}

impl fmt::Debug for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationKind::RenameFields(renames) => {
                f.debug_tuple("RenameFields").field(renames).finish()
            }
            MigrationKind::AddFields(fields) => f.debug_tuple("AddFields").field(fields).finish(),
            MigrationKind::RemoveFields(fields) => {
                f.debug_tuple("RemoveFields").field(fields).finish()
            }
            MigrationKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One upgrade step between two versions
#[derive(Debug, Clone)]
pub struct DataMigration {
    pub from: VersionInfo,
    pub to: VersionInfo,
    pub kind: MigrationKind,
    pub description: Option<String>,
}

impl DataMigration {
    pub fn new(from: VersionInfo, to: VersionInfo, kind: MigrationKind) -> Self {
        Self {
            from,
            to,
            kind,
            description: None,
        }
    }

    pub fn rename_fields<I, K, V>(from: VersionInfo, to: VersionInfo, renames: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let renames = renames.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self::new(from, to, MigrationKind::RenameFields(renames))
    }

    pub fn add_fields<I, K, V>(from: VersionInfo, to: VersionInfo, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<JsonValue>,
    {
        let defaults = defaults.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self::new(from, to, MigrationKind::AddFields(defaults))
    }

    pub fn remove_fields<I, K>(from: VersionInfo, to: VersionInfo, fields: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::new(
            from,
            to,
            MigrationKind::RemoveFields(fields.into_iter().map(Into::into).collect()),
        )
    }

    pub fn custom<F>(from: VersionInfo, to: VersionInfo, transform: F) -> Self
    where
        F: Fn(JsonValue) -> Result<JsonValue, BoxError> + Send + Sync + 'static,
    {
        Self::new(from, to, MigrationKind::Custom(Arc::new(transform)))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Apply this step and stamp the payload with the target version
    pub fn apply(&self, payload: JsonValue) -> Result<JsonValue, VersionCompatibilityError> {
        let mut payload = match &self.kind {
            MigrationKind::Custom(transform) => {
                transform(payload).map_err(|e| self.failed(e.to_string()))?
            }
            kind => {
                let mut payload = payload;
                let data = payload
                    .get_mut(DATA_KEY)
                    .and_then(JsonValue::as_object_mut)
                    .ok_or_else(|| self.failed("payload has no data object".to_string()))?;
                apply_field_changes(kind, data);
                payload
            }
        };

        let envelope = payload
            .as_object_mut()
            .ok_or_else(|| self.failed("migration produced a non-object payload".to_string()))?;
        envelope.insert(VERSION_KEY.to_string(), JsonValue::String(self.to.to_string()));
        Ok(payload)
    }

    fn failed(&self, reason: String) -> VersionCompatibilityError {
        VersionCompatibilityError::MigrationFailed {
            from: self.from.to_string(),
            to: self.to.to_string(),
            reason,
        }
    }
}

fn apply_field_changes(kind: &MigrationKind, data: &mut Map<String, JsonValue>) {
    match kind {
        MigrationKind::RenameFields(renames) => {
            for (old, new) in renames {
                if let Some(value) = data.remove(old) {
                    data.insert(new.clone(), value);
                }
            }
        }
        MigrationKind::AddFields(defaults) => {
            for (key, default) in defaults {
                data.entry(key.clone()).or_insert_with(|| default.clone());
            }
        }
        MigrationKind::RemoveFields(fields) => {
            for key in fields {
                data.remove(key);
            }
        }
        MigrationKind::Custom(_) => {}
    }
}

/// Upgrades stored payloads to the current version
#[derive(Debug, Clone)]
pub struct MigrationManager {
    current: VersionInfo,
    strategy: CompatibilityStrategy,
    migrations: Vec<DataMigration>,
    graph: MigrationGraph,
}

impl MigrationManager {
    pub fn new(current: VersionInfo) -> Self {
        Self {
            current,
            strategy: CompatibilityStrategy::default(),
            migrations: Vec::new(),
            graph: MigrationGraph::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: CompatibilityStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn current_version(&self) -> VersionInfo {
        self.current
    }

    pub fn strategy(&self) -> CompatibilityStrategy {
        self.strategy
    }

    /// Registered migrations in registration order
    pub fn migrations(&self) -> &[DataMigration] {
        &self.migrations
    }

    /// Register an upgrade step; downgrades and no-op steps are rejected
    pub fn register(
        &mut self,
        migration: DataMigration,
    ) -> Result<&mut Self, VersionCompatibilityError> {
        if migration.to <= migration.from {
            return Err(VersionCompatibilityError::InvalidMigration {
                from: migration.from.to_string(),
                to: migration.to.to_string(),
                reason: "migrations must move to a higher version".to_string(),
            });
        }
        debug!(
            from = %migration.from,
            to = %migration.to,
            kind = ?migration.kind,
            "registering migration"
        );
        self.graph.add_migration(migration.from, migration.to, self.migrations.len());
        self.migrations.push(migration);
        Ok(self)
    }

    /// Steps leading from `from` to `to`
    ///
    /// Returns the first path found, which is not necessarily the shortest.
    pub fn find_path(
        &self,
        from: VersionInfo,
        to: VersionInfo,
    ) -> Result<Vec<&DataMigration>, VersionCompatibilityError> {
        if from == to {
            return Ok(Vec::new());
        }
        self.graph
            .find_path(from, to)
            .map(|indices| indices.into_iter().map(|i| &self.migrations[i]).collect())
            .ok_or_else(|| VersionCompatibilityError::NoMigrationPath {
                from: from.to_string(),
                to: to.to_string(),
            })
    }

    /// Version a payload declares
    pub fn payload_version(payload: &JsonValue) -> Result<VersionInfo, VersionCompatibilityError> {
        match payload.get(VERSION_KEY) {
            None | Some(JsonValue::Null) => Err(VersionCompatibilityError::MissingVersion),
            Some(JsonValue::String(raw)) => VersionInfo::parse(raw),
            Some(other) => Err(VersionCompatibilityError::InvalidVersion(other.to_string())),
        }
    }

    /// Bring a payload up to the current version
    ///
    /// A payload already at the current version is returned unchanged.
    pub fn migrate_data(&self, payload: JsonValue) -> Result<JsonValue, VersionCompatibilityError> {
        let found = Self::payload_version(&payload)?;
        if found == self.current {
            return Ok(payload);
        }
        self.strategy.check(&found, &self.current)?;

        let path = self.find_path(found, self.current)?;
        info!(from = %found, to = %self.current, steps = path.len(), "migrating payload");

        path.into_iter().try_fold(payload, |payload, step| {
            debug!(from = %step.from, to = %step.to, "applying migration");
            step.apply(payload)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const V1_0: VersionInfo = VersionInfo::new(1, 0, 0);
    const V1_1: VersionInfo = VersionInfo::new(1, 1, 0);
    const V2_0: VersionInfo = VersionInfo::new(2, 0, 0);

    fn payload(version: &str, data: JsonValue) -> JsonValue {
        json!({
            "__schema_version__": version,
            "__format__": "json",
            "__type__": "Point",
            "__module__": "geo",
            "data": data,
        })
    }

    fn chained() -> MigrationManager {
        let mut manager = MigrationManager::new(V2_0);
        manager
            .register(DataMigration::add_fields(V1_0, V1_1, [("x", 0)]))
            .unwrap()
            .register(DataMigration::rename_fields(V1_1, V2_0, [("x", "y")]))
            .unwrap();
        manager
    }

    #[test]
    fn test_chained_migration() {
        let migrated = chained().migrate_data(payload("1.0.0", json!({}))).unwrap();
        assert_eq!(migrated["data"], json!({ "y": 0 }));
        assert_eq!(migrated["__schema_version__"], "2.0.0");
    }

    #[test]
    fn test_current_version_is_unchanged() {
        let original = payload("2.0.0", json!({ "anything": [1, 2] }));
        assert_eq!(chained().migrate_data(original.clone()).unwrap(), original);
    }

    #[test]
    fn test_add_never_overwrites() {
        let step = DataMigration::add_fields(V1_0, V1_1, [("x", 0)]);
        let migrated = step.apply(payload("1.0.0", json!({ "x": 7 }))).unwrap();
        assert_eq!(migrated["data"]["x"], 7);
    }

    #[test]
    fn test_rename_and_remove_skip_absent_keys() {
        let rename = DataMigration::rename_fields(V1_0, V1_1, [("gone", "new")]);
        let migrated = rename.apply(payload("1.0.0", json!({ "a": 1 }))).unwrap();
        assert_eq!(migrated["data"], json!({ "a": 1 }));

        let remove = DataMigration::remove_fields(V1_0, V1_1, ["a", "gone"]);
        let migrated = remove.apply(payload("1.0.0", json!({ "a": 1, "b": 2 }))).unwrap();
        assert_eq!(migrated["data"], json!({ "b": 2 }));
    }

    #[test]
    fn test_custom_is_restamped() {
        let step = DataMigration::custom(V1_0, V1_1, |mut p| {
            p["__schema_version__"] = json!("9.9.9");
            p["data"]["touched"] = json!(true);
            Ok(p)
        });
        let migrated = step.apply(payload("1.0.0", json!({}))).unwrap();
        assert_eq!(migrated["__schema_version__"], "1.1.0");
        assert_eq!(migrated["data"]["touched"], true);
    }

    #[test]
    fn test_custom_failure_is_reported() {
        let step = DataMigration::custom(V1_0, V1_1, |_| Err("boom".into()));
        let err = step.apply(payload("1.0.0", json!({}))).unwrap_err();
        assert_eq!(
            err,
            VersionCompatibilityError::MigrationFailed {
                from: "1.0.0".into(),
                to: "1.1.0".into(),
                reason: "boom".into(),
            }
        );
    }

    #[test]
    fn test_missing_and_invalid_versions() {
        let manager = chained();
        let mut p = payload("1.0.0", json!({}));
        p.as_object_mut().unwrap().remove("__schema_version__");
        assert_eq!(manager.migrate_data(p), Err(VersionCompatibilityError::MissingVersion));

        assert!(matches!(
            manager.migrate_data(payload("1.0", json!({}))),
            Err(VersionCompatibilityError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_strategy_gates_migration() {
        let strict = chained().with_strategy(CompatibilityStrategy::Strict);
        assert!(matches!(
            strict.migrate_data(payload("1.0.0", json!({}))),
            Err(VersionCompatibilityError::Incompatible { .. })
        ));

        // newer than current: compatible under forward, but nothing migrates down
        let forward = chained().with_strategy(CompatibilityStrategy::Forward);
        assert!(matches!(
            forward.migrate_data(payload("3.0.0", json!({}))),
            Err(VersionCompatibilityError::NoMigrationPath { .. })
        ));
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let manager = MigrationManager::new(V2_0);
        assert_eq!(
            manager.migrate_data(payload("1.0.0", json!({}))),
            Err(VersionCompatibilityError::NoMigrationPath {
                from: "1.0.0".into(),
                to: "2.0.0".into(),
            })
        );
    }

    #[test]
    fn test_downgrade_registration_is_rejected() {
        let mut manager = MigrationManager::new(V2_0);
        assert!(matches!(
            manager.register(DataMigration::remove_fields(V1_1, V1_0, ["x"])),
            Err(VersionCompatibilityError::InvalidMigration { .. })
        ));
        assert!(manager.migrations().is_empty());
    }

    #[test]
    fn test_find_path_exposes_steps() {
        let manager = chained();
        let path = manager.find_path(V1_0, V2_0).unwrap();
        let hops: Vec<_> = path.iter().map(|m| (m.from, m.to)).collect();
        assert_eq!(hops, vec![(V1_0, V1_1), (V1_1, V2_0)]);
        assert!(manager.find_path(V2_0, V2_0).unwrap().is_empty());
    }
}
