//! Entity chains of one mention list.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::types::Mention;

/// All mentions of one entity label.
#[derive(Debug, Clone, Serialize)]
pub struct Chain<'a> {
    /// 1-based index in first-seen order.
    pub index: usize,
    /// Shared entity label.
    pub entity: &'a str,
    /// Distinct mentions, in list order.
    pub mentions: Vec<&'a Mention>,
}

impl<'a> Chain<'a> {
    /// Number of distinct mentions.
    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    /// Whether the chain is empty. Chains built by [`ChainIndex`] never are.
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }
}

/// Chains of a mention list, keyed by label and by list index.
///
/// Unlabelled mentions belong to no chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainIndex<'a> {
    chains: Vec<Chain<'a>>,
    #[serde(skip)]
    by_entity: HashMap<&'a str, usize>,
    #[serde(skip)]
    by_index: Vec<Option<usize>>,
}

impl<'a> ChainIndex<'a> {
    /// Group `mentions` by entity label.
    ///
    /// Labels are numbered 1, 2, 3, … in order of first appearance. A mention
    /// listed twice is stored once, but both list indices map to the chain.
    pub fn build(mentions: &'a [Mention]) -> Self {
        let mut chains: Vec<Chain<'a>> = Vec::new();
        let mut members: Vec<HashSet<&'a Mention>> = Vec::new();
        let mut by_entity: HashMap<&'a str, usize> = HashMap::new();
        let mut by_index = Vec::with_capacity(mentions.len());

        for mention in mentions {
            let Some(entity) = mention.entity() else {
                by_index.push(None);
                continue;
            };
            let slot = *by_entity.entry(entity).or_insert_with(|| {
                chains.push(Chain {
                    index: chains.len() + 1,
                    entity,
                    mentions: Vec::new(),
                });
                members.push(HashSet::new());
                chains.len() - 1
            });
            if members[slot].insert(mention) {
                chains[slot].mentions.push(mention);
            }
            by_index.push(Some(slot));
        }

        Self {
            chains,
            by_entity,
            by_index,
        }
    }

    /// Chain of an entity label.
    pub fn get(&self, entity: &str) -> Option<&Chain<'a>> {
        self.by_entity.get(entity).map(|&slot| &self.chains[slot])
    }

    /// Chain of the mention at `index` in the indexed list.
    pub fn chain_of(&self, index: usize) -> Option<&Chain<'a>> {
        self.by_index
            .get(index)
            .copied()
            .flatten()
            .map(|slot| &self.chains[slot])
    }

    /// Chain a mention would belong to, by its label.
    pub fn chain_for(&self, mention: &Mention) -> Option<&Chain<'a>> {
        mention.entity().and_then(|e| self.get(e))
    }

    /// Chains in index order.
    pub fn chains(&self) -> &[Chain<'a>] {
        &self.chains
    }

    /// Labels in index order.
    pub fn entities(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.chains.iter().map(|c| c.entity)
    }

    /// Number of chains.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no mention carries a label.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
