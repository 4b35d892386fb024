//! Data layer interface.
//!
//! Records are supplied by an external collaborator consumed through
//! the narrow [`DataQuery`] trait. [`store::JsonStore`] is the built-in
//! implementation backed by a JSON file; tests and the CLI both use it.

pub mod store;
pub mod types;

pub use store::JsonStore;
pub use types::{DataError, DataEvent, Record};

use std::sync::mpsc::Sender;

/// The narrow query surface this engine requires of a data layer.
///
/// Implementations answer "all records of type T" and deliver change
/// notifications; nothing else crosses the boundary.
pub trait DataQuery: Send + Sync {
    /// All records of the given type.
    ///
    /// Unknown type names are an error, not an empty set: a binding on
    /// a type the data layer has never heard of is a template mistake
    /// worth reporting.
    fn all_of_type(&self, type_name: &str) -> Result<Vec<Record>, DataError>;

    /// Register a channel for record change notifications.
    ///
    /// Default implementation drops the sender: static data sources
    /// never notify.
    fn subscribe(&self, sender: Sender<DataEvent>) {
        let _ = sender;
    }
}
