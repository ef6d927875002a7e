//! Flat key/value property sets backed by document nodes.
//!
//! Four shapes share one contract, [`PropertyMap`]:
//!
//! - [`Properties<String>`] - `<add key=".." value=".." />` rows, used by
//!   `appSettings` and name-value sections.
//! - [`Properties<TypedValue>`](crate::TypedValue) - rows with a `type`
//!   attribute, used by dictionary sections.
//! - [`Properties<ConnectionValue>`] - `<add name=".." connectionString=".."
//!   providerName=".." />` rows of `connectionStrings`.
//! - [`Attributes`] - attributes directly on the content node, used by
//!   single-tag sections.
//!
//! Read access goes through the plain data types. Mutation goes through the
//! `*Mut` views, which pair the data with the document and its save policy;
//! every mutation updates the in-memory map and the backing node together.

/// Plain-key attribute set of single-tag sections.
pub mod attributes;

/// Connection descriptors and provider resolution.
pub mod connection;

/// Child-row property sets.
pub mod rows;

pub use attributes::{Attributes, AttributesMut};
pub use connection::{ConnectionValue, ProviderKind, ProviderResolver};
pub use rows::{Properties, PropertiesMut, RowValue};

use crate::error::Result;

/// Common contract of every property set.
pub trait PropertyMap {
    /// Value type stored under each key.
    type Value;

    fn get(&self, key: &str) -> Option<&Self::Value>;

    /// Creates or replaces `key` when `value` is present, removes it otherwise.
    ///
    /// Removing an absent key is a no-op and does not trigger a save.
    fn set(&mut self, key: &str, value: Option<Self::Value>) -> Result<()>;

    /// Removes `key`, returning whether it was present.
    fn remove(&mut self, key: &str) -> Result<bool>;

    /// Removes every entry and its backing node.
    fn clear(&mut self) -> Result<()>;

    fn len(&self) -> usize;

    fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
