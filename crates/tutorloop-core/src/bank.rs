//! In-memory item bank serving items to sessions.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ContentUnavailable;
use crate::model::{DifficultyTier, Item, ItemType};
use crate::parser::{load_item_sets, ItemSet};
use crate::traits::ContentProvider;

/// A fixed pool of items. Each item is served at most once.
///
/// Requests prefer the exact tier and otherwise take the nearest tier,
/// easier first on a tie. Items keep their file order within a tier.
#[derive(Debug)]
pub struct ItemBank {
    items: Vec<Item>,
    served: Mutex<HashSet<String>>,
}

impl ItemBank {
    /// Items worth 0 marks are left out; they could never be scored.
    pub fn new(mut items: Vec<Item>) -> Self {
        items.retain(|item| {
            if item.marks == 0 {
                tracing::warn!(item = %item.id, "leaving out item worth 0 marks");
            }
            item.marks > 0
        });
        Self {
            items,
            served: Mutex::new(HashSet::new()),
        }
    }

    /// Merge several item sets into one bank.
    pub fn from_sets(sets: Vec<ItemSet>) -> Self {
        Self::new(sets.into_iter().flat_map(|s| s.items).collect())
    }

    /// Load a bank from a TOML file or a directory of them.
    pub fn load(path: &Path) -> Result<Self> {
        let bank = Self::from_sets(load_item_sets(path)?);
        if bank.is_empty() {
            anyhow::bail!("no items found in {}", path.display());
        }
        Ok(bank)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.items.iter().map(|i| i.topic.clone()).collect();
        topics.sort();
        topics.dedup();
        topics
    }

    /// Items not yet served for a topic and type.
    pub fn remaining(&self, topic: &str, item_type: ItemType) -> usize {
        let served = self.served.lock().unwrap_or_else(|e| e.into_inner());
        self.items
            .iter()
            .filter(|i| matches(i, topic, item_type) && !served.contains(&i.id))
            .count()
    }
}

fn matches(item: &Item, topic: &str, item_type: ItemType) -> bool {
    item.item_type == item_type && item.topic.eq_ignore_ascii_case(topic)
}

#[async_trait]
impl ContentProvider for ItemBank {
    async fn get_item(
        &self,
        topic: &str,
        tier: DifficultyTier,
        item_type: ItemType,
    ) -> Result<Item, ContentUnavailable> {
        let mut served = self.served.lock().unwrap_or_else(|e| e.into_inner());
        let chosen = self
            .items
            .iter()
            .filter(|i| matches(i, topic, item_type) && !served.contains(&i.id))
            .min_by_key(|i| (i.tier.distance(tier), i.tier));

        match chosen {
            Some(item) => {
                if item.tier != tier {
                    tracing::debug!(item = %item.id, requested = %tier, served = %item.tier, "no item at requested tier, using nearest");
                }
                served.insert(item.id.clone());
                Ok(item.clone())
            }
            None => Err(ContentUnavailable {
                topic: topic.to_string(),
                tier,
                item_type,
                reason: "no unused items left for this topic and type".into(),
            }),
        }
    }
}
