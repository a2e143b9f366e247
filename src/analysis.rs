//! One complete analysis run: encode, mine, derive rules, build the index.
//!
//! An [`Analysis`] owns everything the run produced and nothing else; a new
//! dataset or new settings always means a new run. On top of the item-level
//! structures it answers label-level questions (what goes with "milk", which
//! offer to make, which products sell most) and produces plain serializable
//! views for whatever presents the results.

use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::config::Settings;
use crate::construct::Vocabulary;
use crate::encode::Dataset;
use crate::error::Result;
use crate::index::{QueryMode, RecommendationIndex};
use crate::interface::CancelToken;
use crate::mine::FrequentItemsets;
use crate::rules::{Metric, Rule};

/// A rule expressed in labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub antecedent: Vec<String>,
    pub consequent: Vec<String>,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
}

/// A rule with every metric, expressed in labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleView {
    pub antecedent: Vec<String>,
    pub consequent: Vec<String>,
    pub antecedent_support: f64,
    pub consequent_support: f64,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub leverage: f64,
    /// `None` stands for an infinite conviction.
    pub conviction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemsetView {
    pub items: Vec<String>,
    pub support: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub transactions: usize,
    pub items: usize,
    pub frequent_itemsets: usize,
    pub largest_itemset: usize,
    pub rules: usize,
    pub min_support: f64,
    pub metric: Metric,
    pub min_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    dataset: Dataset,
    frequent: FrequentItemsets,
    rules: Vec<Rule>,
    index: RecommendationIndex,
    metric: Metric,
    min_threshold: f64,
    default_mode: QueryMode,
}

impl Analysis {
    pub fn run<R, T, S>(raw_transactions: R, settings: &Settings) -> Result<Self>
    where
        R: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::run_cancellable(raw_transactions, settings, &CancelToken::new())
    }

    pub fn run_cancellable<R, T, S>(
        raw_transactions: R,
        settings: &Settings,
        cancel: &CancelToken,
    ) -> Result<Self>
    where
        R: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        settings.validate()?;
        let dataset = settings.encoder().encode(raw_transactions);
        Self::from_dataset(dataset, settings, cancel)
    }

    pub fn from_dataset(dataset: Dataset, settings: &Settings, cancel: &CancelToken) -> Result<Self> {
        let started = Instant::now();
        let miner = settings.miner()?;
        let generator = settings.rule_generator()?;
        let frequent = miner.mine_cancellable(dataset.transactions(), cancel)?;
        let rules = generator.generate(&frequent)?;
        let index = RecommendationIndex::new(rules.clone());
        info!(
            transactions = dataset.len(),
            items = dataset.vocabulary().len(),
            frequent = frequent.len(),
            rules = rules.len(),
            ms = started.elapsed().as_secs_f64() * 1000.0,
            "analysis complete"
        );
        Ok(Self {
            dataset,
            frequent,
            rules,
            index,
            metric: generator.metric(),
            min_threshold: generator.min_threshold(),
            default_mode: settings.index.default_mode,
        })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
    pub fn vocabulary(&self) -> &Vocabulary {
        self.dataset.vocabulary()
    }
    pub fn frequent_itemsets(&self) -> &FrequentItemsets {
        &self.frequent
    }
    /// Rules ranked by the configured metric.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
    pub fn index(&self) -> &RecommendationIndex {
        &self.index
    }

    fn recommendation(&self, rule: &Rule) -> Recommendation {
        let vocabulary = self.vocabulary();
        Recommendation {
            antecedent: vocabulary.describe(rule.antecedent()),
            consequent: vocabulary.describe(rule.consequent()),
            support: rule.support(),
            confidence: rule.confidence(),
            lift: rule.lift(),
        }
    }

    /// Recommendations for a product label, best first. An unknown label or
    /// a label without rules gives an empty list.
    pub fn recommend(&self, label: &str, mode: QueryMode) -> Vec<Recommendation> {
        let Some(item) = self.vocabulary().item(label) else {
            return Vec::new();
        };
        self.index
            .query(item, mode)
            .into_iter()
            .map(|rule| self.recommendation(rule))
            .collect()
    }

    /// Recommendations using the configured default mode.
    pub fn recommend_default(&self, label: &str) -> Vec<Recommendation> {
        self.recommend(label, self.default_mode)
    }

    /// Recommendations for a basket: rules whose antecedent holds every label.
    pub fn recommend_for_basket(&self, labels: &[&str]) -> Vec<Recommendation> {
        let Some(itemset) = self.vocabulary().itemset(labels) else {
            return Vec::new();
        };
        self.index
            .query_all(itemset.items())
            .into_iter()
            .map(|rule| self.recommendation(rule))
            .collect()
    }

    /// The single best cross-sell for a product, if any rule mentions it.
    pub fn best_offer(&self, label: &str) -> Option<Recommendation> {
        let item = self.vocabulary().item(label)?;
        self.index
            .top(item, QueryMode::Contains)
            .map(|rule| self.recommendation(rule))
    }

    /// The `n` most purchased products with their transaction counts.
    pub fn popular_items(&self, n: usize) -> Vec<(String, u64)> {
        let vocabulary = self.vocabulary();
        self.dataset
            .item_counts()
            .into_iter()
            .take(n)
            .filter_map(|(item, count)| vocabulary.label(item).map(|label| (label.to_owned(), count)))
            .collect()
    }

    pub fn itemset_views(&self) -> Vec<ItemsetView> {
        let vocabulary = self.vocabulary();
        self.frequent
            .iter()
            .map(|f| ItemsetView {
                items: vocabulary.describe(&f.itemset),
                support: f.support,
            })
            .collect()
    }

    pub fn rule_views(&self) -> Vec<RuleView> {
        let vocabulary = self.vocabulary();
        self.rules
            .iter()
            .map(|rule| RuleView {
                antecedent: vocabulary.describe(rule.antecedent()),
                consequent: vocabulary.describe(rule.consequent()),
                antecedent_support: rule.antecedent_support(),
                consequent_support: rule.consequent_support(),
                support: rule.support(),
                confidence: rule.confidence(),
                lift: rule.lift(),
                leverage: rule.leverage(),
                conviction: Some(rule.conviction()).filter(|c| c.is_finite()),
            })
            .collect()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            transactions: self.dataset.len(),
            items: self.vocabulary().len(),
            frequent_itemsets: self.frequent.len(),
            largest_itemset: self.frequent.max_size(),
            rules: self.rules.len(),
            min_support: self.frequent.min_support(),
            metric: self.metric,
            min_threshold: self.min_threshold,
        }
    }
}
