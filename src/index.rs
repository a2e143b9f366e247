//! Item to rule lookup for recommendation queries.
//!
//! Rules are put in query order once (lift, then confidence, both descending,
//! then consequent and antecedent ascending) and numbered in that order. Each
//! item keeps two bitmaps of rule numbers: rules whose antecedent is exactly
//! that item, and rules whose antecedent contains it. Because bitmaps iterate
//! in ascending order, reading a bitmap yields rules already ranked, and
//! intersecting bitmaps answers multi-item queries without a rule scan.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// used for per-item rule sets
use roaring::RoaringTreemap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::construct::{Item, ItemHasher, Itemset};
use crate::error::{CartwiseError, Result};
use crate::rules::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// The antecedent is exactly the queried item.
    Exact,
    /// The antecedent contains the queried item.
    #[default]
    Contains,
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryMode::Exact => f.write_str("exact"),
            QueryMode::Contains => f.write_str("contains"),
        }
    }
}

// Same names as `FromStr`, so settings accept any letter case.
impl<'de> Deserialize<'de> for QueryMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for QueryMode {
    type Err = CartwiseError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(QueryMode::Exact),
            "contains" => Ok(QueryMode::Contains),
            _ => Err(CartwiseError::invalid_argument("mode", s, "one of exact, contains")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationIndex {
    rules: Vec<Rule>,
    exact: HashMap<Item, RoaringTreemap, ItemHasher>,
    contains: HashMap<Item, RoaringTreemap, ItemHasher>,
}

impl RecommendationIndex {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| {
            b.lift()
                .total_cmp(&a.lift())
                .then_with(|| b.confidence().total_cmp(&a.confidence()))
                .then_with(|| a.consequent().cmp(b.consequent()))
                .then_with(|| a.antecedent().cmp(b.antecedent()))
        });
        let mut exact: HashMap<Item, RoaringTreemap, ItemHasher> = HashMap::default();
        let mut contains: HashMap<Item, RoaringTreemap, ItemHasher> = HashMap::default();
        for (id, rule) in rules.iter().enumerate() {
            let antecedent = rule.antecedent();
            if antecedent.len() == 1 {
                exact.entry(antecedent.first()).or_default().insert(id as u64);
            }
            for item in antecedent.iter() {
                contains.entry(*item).or_default().insert(id as u64);
            }
        }
        Self {
            rules,
            exact,
            contains,
        }
    }

    /// All rules in query order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of items that appear in at least one antecedent.
    pub fn item_count(&self) -> usize {
        self.contains.len()
    }

    fn bitmap(&self, item: Item, mode: QueryMode) -> Option<&RoaringTreemap> {
        match mode {
            QueryMode::Exact => self.exact.get(&item),
            QueryMode::Contains => self.contains.get(&item),
        }
    }

    fn resolve<'a>(&'a self, ids: impl Iterator<Item = u64> + 'a) -> impl Iterator<Item = &'a Rule> + 'a {
        ids.filter_map(|id| self.rules.get(id as usize))
    }

    /// Rules for `item`, ranked. Empty when nothing matches.
    pub fn query(&self, item: Item, mode: QueryMode) -> Vec<&Rule> {
        match self.bitmap(item, mode) {
            Some(ids) => self.resolve(ids.iter()).collect(),
            None => Vec::new(),
        }
    }

    /// The consequents of [`query`](Self::query) paired with their lift.
    pub fn recommendations(&self, item: Item, mode: QueryMode) -> Vec<(&Itemset, f64)> {
        self.query(item, mode)
            .into_iter()
            .map(|rule| (rule.consequent(), rule.lift()))
            .collect()
    }

    /// Rules whose antecedent contains every one of `items`, ranked.
    pub fn query_all(&self, items: &[Item]) -> Vec<&Rule> {
        let mut members = items.iter();
        let Some(first) = members.next().and_then(|item| self.contains.get(item)) else {
            return Vec::new();
        };
        let mut ids = first.clone();
        for item in members {
            match self.contains.get(item) {
                Some(other) => ids &= other,
                None => return Vec::new(),
            }
        }
        self.resolve(ids.into_iter()).collect()
    }

    /// The best ranked rule for `item`.
    pub fn top(&self, item: Item, mode: QueryMode) -> Option<&Rule> {
        self.bitmap(item, mode)
            .and_then(RoaringTreemap::min)
            .and_then(|id| self.rules.get(id as usize))
    }
}

pub fn build_index(rules: Vec<Rule>) -> RecommendationIndex {
    RecommendationIndex::new(rules)
}
