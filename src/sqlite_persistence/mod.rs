mod migrations;

pub use migrations::{
    migrate_schema, schema_version, MigrationStep, MIGRATION_STEPS, SCHEMA_BASELINE, SCHEMA_TARGET,
};
