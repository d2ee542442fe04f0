use serde::{Deserialize, Serialize};

/// A user-defined save-path category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Unique, case-sensitive category name.
    pub name: String,
    /// Default save path applied to torrents added under this category.
    pub save_path: String,
    /// Display color, as an opaque string (e.g. a hex code); empty if unset.
    pub color: String,
}
