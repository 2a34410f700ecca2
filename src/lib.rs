pub mod cli;
pub mod core;
pub mod render;
pub mod source;
pub mod translate;
pub mod validator;

// Re-export commonly used types
pub use core::config::MigratorSettings;
pub use core::error::{MigrateError, MigrateResult};
pub use core::registry::IdentifierRegistry;
pub use core::strategy::{TranslationMode, Warnings};
pub use render::render;
pub use source::PromtailConfig;
pub use translate::graph::{ComponentGraph, ComponentGraphBuilder};
pub use translate::{Migration, NodeExporterMigrator, PromtailMigrator};
pub use validator::{ExternalValidator, ValidationOutcome};
