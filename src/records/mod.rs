//! Record schemas and the partial-update merge engine.
//!
//! Every record type is declared once with [`define_entity!`], which yields a
//! marker type implementing [`Entity`] and a typed change set whose fields are
//! [`Patch`] values. Creation and updates for all of them go through the same
//! two generic routines in [`merge`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::auth::Role;

/// A stored row: column name to scalar or JSON value
pub type Record = Map<String, Value>;

/// Columns stamped by the server; caller input for them is never read
pub const SYSTEM_FIELDS: &[&str] = &["id", "tenant_id", "created_at", "updated_at"];

pub const TENANT_FIELD: &str = "tenant_id";
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Schema and policy for one persisted record type
pub trait Entity: Send + Sync + 'static {
    type Changes: Changeset + DeserializeOwned + Send + 'static;

    const TABLE: &'static str;
    /// Route prefix, e.g. `/api/patients`
    const PATH: &'static str;
    /// Human-readable singular name used in error messages
    const LABEL: &'static str;
    const FIELDS: &'static [&'static str];
    const REQUIRED: &'static [&'static str];
    /// Roles allowed to create and update; empty admits every role
    const WRITERS: &'static [Role];
    /// Roles allowed to delete; empty admits every role
    const DELETERS: &'static [Role];

    /// Values applied on create for fields the caller left unset
    fn defaults() -> Vec<(&'static str, Value)>;
}

/// A typed sparse update, flattened to column/patch pairs in schema order
pub trait Changeset {
    fn into_changes(self) -> Vec<(&'static str, Patch<Value>)>;
}

macro_rules! column_name {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident, $column:literal) => {
        $column
    };
}

/// Declares a record type: a marker struct implementing [`Entity`] and its
/// change set struct. `field = "column": Type` maps a Rust-reserved column name.
/// Omitting `deleters` declares a type that has no delete route.
macro_rules! define_entity {
    (
        $(#[$meta:meta])*
        $vis:vis struct $entity:ident / $changes:ident {
            table: $table:literal,
            path: $path:literal,
            label: $label:literal,
            required: [$($required:literal),* $(,)?],
            writers: [$($writer:ident),* $(,)?],
            $(deleters: [$($deleter:ident),* $(,)?],)?
            defaults: { $($default_column:literal : $default:literal),* $(,)? },
            fields: { $($field:ident $(= $column:literal)? : $ty:ty),* $(,)? } $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $entity;

        #[doc = concat!("Typed change set for `", $table, "`")]
        #[derive(Debug, Default, serde::Deserialize)]
        $vis struct $changes {
            $(
                #[serde(default)]
                $(#[serde(rename = $column)])?
                pub $field: $crate::records::Patch<$ty>,
            )*
        }

        impl $crate::records::Changeset for $changes {
            fn into_changes(self) -> Vec<(&'static str, $crate::records::Patch<serde_json::Value>)> {
                vec![
                    $( (column_name!($field $(, $column)?), self.$field.into_json()), )*
                ]
            }
        }

        impl $crate::records::Entity for $entity {
            type Changes = $changes;

            const TABLE: &'static str = $table;
            const PATH: &'static str = $path;
            const LABEL: &'static str = $label;
            const FIELDS: &'static [&'static str] = &[$(column_name!($field $(, $column)?)),*];
            const REQUIRED: &'static [&'static str] = &[$($required),*];
            const WRITERS: &'static [$crate::auth::Role] = &[$($crate::auth::Role::$writer),*];
            const DELETERS: &'static [$crate::auth::Role] = &[$($($crate::auth::Role::$deleter),*)?];

            fn defaults() -> Vec<(&'static str, serde_json::Value)> {
                vec![$(($default_column, serde_json::json!($default))),*]
            }
        }
    };
}

pub mod entities;
pub mod merge;
pub mod patch;

pub use merge::{build_new, merge, merge_fields, parse_changes, MergeError, Merged};
pub use patch::Patch;
