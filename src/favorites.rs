//! Favorites: persisted `{id, text, position}` records with set semantics.
//!
//! Storage itself is an opaque async key-value store behind
//! [`FavoritesStore`]. Toggling is a plain read-modify-write; two surfaces
//! toggling at once can lose an update (last write wins).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Storage key holding the favorites list.
pub const FAVORITES_KEY: &str = "favorites";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteEntry {
    pub id: String,
    pub text: String,
    pub position: f64,
}

/// De-duplicated favorites, keyed by id. Keeps first-seen order so the
/// persisted list stays stable across rewrites.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoriteSet {
    entries: Vec<FavoriteEntry>,
    ids: HashSet<String>,
}

impl FavoriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a stored list, dropping duplicate ids.
    pub fn from_entries(entries: impl IntoIterator<Item = FavoriteEntry>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            set.insert(entry);
        }
        set
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, entry: FavoriteEntry) -> bool {
        if !self.ids.insert(entry.id.clone()) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.entries.retain(|e| e.id != id);
        true
    }

    /// Flip membership of `entry.id`. Returns true if it is now a favorite.
    pub fn toggle(&mut self, entry: FavoriteEntry) -> bool {
        if self.remove(&entry.id) {
            false
        } else {
            self.insert(entry)
        }
    }

    pub fn entries(&self) -> &[FavoriteEntry] {
        &self.entries
    }
}

/// Opaque async persistence for the favorites key.
#[allow(async_fn_in_trait)]
pub trait FavoritesStore {
    /// Stored list; an absent key reads as empty.
    async fn load(&self) -> Result<Vec<FavoriteEntry>>;
    async fn save(&self, entries: &[FavoriteEntry]) -> Result<()>;
}

/// Read the store as a de-duplicated set.
pub async fn load_set<S: FavoritesStore>(store: &S) -> Result<FavoriteSet> {
    Ok(FavoriteSet::from_entries(store.load().await?))
}

/// Read-modify-write toggle. Returns the new membership of `entry.id`.
pub async fn toggle_favorite<S: FavoritesStore>(store: &S, entry: FavoriteEntry) -> Result<bool> {
    let mut set = load_set(store).await?;
    let id = entry.id.clone();
    let now_favorite = set.toggle(entry);
    store.save(set.entries()).await?;
    log::debug!(
        "[Favorites] {} {}",
        if now_favorite { "added" } else { "removed" },
        id
    );
    Ok(now_favorite)
}
