//! Domain model.

use serde::{Deserialize, Serialize};

/// A musician as shown on the search page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Musician {
    /// Backend identifier, unique per musician
    pub id: u32,
    /// Display name, matched by the search query
    pub name: String,
    /// Path of the musician's photo
    pub photo_url: String,
}

impl Musician {
    /// Create a musician
    pub fn new(id: u32, name: impl Into<String>, photo_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            photo_url: photo_url.into(),
        }
    }
}
