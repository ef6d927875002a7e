//! # confman - configuration document library
//!
//! A mutable object model over `app.config`-style XML configuration files.
//!
//! ## Features
//!
//! - Application settings and connection strings as key/value maps
//! - Declared sections in single-tag, name-value, dictionary or custom form
//! - Nested section groups with declarations kept in sync with content
//! - Typed dictionary values covering fifteen primitive kinds
//! - Optional auto-save after every mutation, with timestamped backups
//!
//! ## Quick Start
//!
//! ```rust
//! use confman::{Configuration, PropertyMap, TypedValue};
//!
//! let mut config = Configuration::new();
//! config.app_settings()?.insert("theme", "dark")?;
//!
//! let mut sections = config.config_sections()?;
//! let mut registry = sections.sections_mut();
//! let mut limits = registry.get_or_add_dictionary("limits")?;
//! limits.insert("retries", 3i32)?;
//! assert_eq!(limits.get("retries"), Some(&TypedValue::I32(3)));
//! # Ok::<(), confman::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`config`] - The document facade and its top-level regions
//! - [`properties`] - Property sets and connection descriptors
//! - [`section`] - Section and group registries
//! - [`value`] - Typed dictionary values
//! - [`storage`] - Document persistence
//! - [`options`] - Library options loaded from TOML
//! - [`error`] - Error types and result definitions

#[macro_use]
extern crate log;

/// The document facade.
pub mod config;

/// Error types and result definitions for configuration operations.
pub mod error;

/// Library options.
pub mod options;

/// Property sets backed by document nodes.
pub mod properties;

/// Declared sections and section groups.
pub mod section;

/// Document persistence.
pub mod storage;

/// Typed values of dictionary sections.
pub mod value;

mod xml;

pub use config::{ConfigSections, ConfigSectionsMut, Configuration};
pub use error::{Error, Result};
pub use options::Options;
pub use properties::{
    Attributes, AttributesMut, ConnectionValue, Properties, PropertiesMut, PropertyMap,
    ProviderKind, ProviderResolver,
};
pub use section::{
    CustomSection, Group, GroupMut, GroupRegistry, GroupRegistryMut, Section, SectionKind,
    SectionMut, SectionRegistry, SectionRegistryMut, SectionValues,
};
pub use storage::{FileStorage, Storage};
pub use value::{TypedValue, ValueKind};
