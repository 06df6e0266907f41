//! Game id → draw source registry

use lotto_common::GameConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::connector::SourceConnector;
use crate::source::{ArchiveSource, DrawSource};

/// Sources keyed by game id, iterated in id order
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn DrawSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`ArchiveSource`] per game, all sharing `connector`
    pub fn from_games(games: &[GameConfig], connector: Arc<SourceConnector>) -> Self {
        let mut registry = Self::new();
        for game in games {
            registry.register(Arc::new(ArchiveSource::new(game.clone(), connector.clone())));
        }
        registry
    }

    /// Add a source, replacing any previous source for the same game
    pub fn register(&mut self, source: Arc<dyn DrawSource>) {
        self.sources.insert(source.game().id.clone(), source);
    }

    pub fn get(&self, game_id: &str) -> Option<Arc<dyn DrawSource>> {
        self.sources.get(game_id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
