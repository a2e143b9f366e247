//! Association rule derivation.
//!
//! Every frequent itemset `S` with at least two items is split into an
//! antecedent `A` (a non-empty proper subset) and the consequent `S - A`.
//! Supports of both sides come from the frequent table, which always has
//! them because of downward closure. A miss means the table is broken and
//! aborts the run.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::construct::{ItemHasher, Itemset};
use crate::error::{CartwiseError, Result};
use crate::mine::{Frequent, FrequentItemsets, join_level};

pub const DEFAULT_EXHAUSTIVE_SPLIT_CAP: usize = 10;

// Masks are u64, so exhaustive enumeration cannot go past this.
const MAX_EXHAUSTIVE_SIZE: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Support,
    Confidence,
    #[default]
    Lift,
    Leverage,
    Conviction,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Support,
        Metric::Confidence,
        Metric::Lift,
        Metric::Leverage,
        Metric::Conviction,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Support => "support",
            Metric::Confidence => "confidence",
            Metric::Lift => "lift",
            Metric::Leverage => "leverage",
            Metric::Conviction => "conviction",
        }
    }

    pub fn value(&self, rule: &Rule) -> f64 {
        match self {
            Metric::Support => rule.support,
            Metric::Confidence => rule.confidence,
            Metric::Lift => rule.lift,
            Metric::Leverage => rule.leverage,
            Metric::Conviction => rule.conviction,
        }
    }

    /// Checks that `threshold` lies in the range the metric can take.
    pub fn validate_threshold(&self, threshold: f64) -> Result<()> {
        let (valid, constraint) = match self {
            Metric::Support | Metric::Confidence => {
                (threshold > 0.0 && threshold <= 1.0, "a fraction in (0, 1]")
            }
            Metric::Lift | Metric::Conviction => {
                (threshold.is_finite() && threshold > 0.0, "a finite value > 0")
            }
            // leverage never exceeds 0.25
            Metric::Leverage => (threshold > 0.0 && threshold <= 0.25, "a value in (0, 0.25]"),
        };
        if valid {
            Ok(())
        } else {
            Err(CartwiseError::invalid_argument(
                format!("min_threshold ({})", self.name()),
                threshold,
                constraint,
            ))
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Same names as `FromStr`, so settings accept any letter case.
impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Metric {
    type Err = CartwiseError;
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                CartwiseError::invalid_argument(
                    "metric",
                    s,
                    "one of support, confidence, lift, leverage, conviction",
                )
            })
    }
}

/// An association rule `antecedent => consequent` with its metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    antecedent: Itemset,
    consequent: Itemset,
    antecedent_support: f64,
    consequent_support: f64,
    support: f64,
    confidence: f64,
    lift: f64,
    leverage: f64,
    conviction: f64,
}

impl Rule {
    /// Derives the metrics from absolute counts over `transaction_count`
    /// transactions. Counts must be non-zero, as they are for frequent itemsets.
    ///
    /// Every metric is one integer ratio rounded once, so rules with equal
    /// exact metrics compare equal and a metric exactly at a threshold passes.
    pub fn from_counts(
        antecedent: Itemset,
        consequent: Itemset,
        union_count: u64,
        antecedent_count: u64,
        consequent_count: u64,
        transaction_count: u64,
    ) -> Self {
        let (u, a, c, n) = (
            union_count as i128,
            antecedent_count as i128,
            consequent_count as i128,
            transaction_count as i128,
        );
        let ratio = |numerator: i128, denominator: i128| numerator as f64 / denominator as f64;
        let support = ratio(u, n);
        let antecedent_support = ratio(a, n);
        let consequent_support = ratio(c, n);
        let confidence = ratio(u, a);
        let lift = ratio(u * n, a * c);
        let leverage = ratio(u * n - a * c, n * n);
        let conviction = if u >= a {
            f64::INFINITY
        } else {
            ratio((n - c) * a, n * (a - u))
        };
        Self {
            antecedent,
            consequent,
            antecedent_support,
            consequent_support,
            support,
            confidence,
            lift,
            leverage,
            conviction,
        }
    }
    pub fn antecedent(&self) -> &Itemset {
        &self.antecedent
    }
    pub fn consequent(&self) -> &Itemset {
        &self.consequent
    }
    pub fn antecedent_support(&self) -> f64 {
        self.antecedent_support
    }
    pub fn consequent_support(&self) -> f64 {
        self.consequent_support
    }
    pub fn support(&self) -> f64 {
        self.support
    }
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
    pub fn lift(&self) -> f64 {
        self.lift
    }
    pub fn leverage(&self) -> f64 {
        self.leverage
    }
    /// Infinite when the rule never fails (confidence 1).
    pub fn conviction(&self) -> f64 {
        self.conviction
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} => {} (support={:.3}, confidence={:.3}, lift={:.3})",
            self.antecedent, self.consequent, self.support, self.confidence, self.lift
        )
    }
}

#[derive(Debug, Clone)]
pub struct RuleGenerator {
    metric: Metric,
    min_threshold: f64,
    exhaustive_split_cap: usize,
}

impl RuleGenerator {
    pub fn new(metric: Metric, min_threshold: f64) -> Result<Self> {
        metric.validate_threshold(min_threshold)?;
        Ok(Self {
            metric,
            min_threshold,
            exhaustive_split_cap: DEFAULT_EXHAUSTIVE_SPLIT_CAP,
        })
    }

    /// Itemsets with more items than `cap` use the pruned traversal when
    /// ranking by confidence.
    pub fn with_exhaustive_split_cap(mut self, cap: usize) -> Self {
        self.exhaustive_split_cap = cap;
        self
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn min_threshold(&self) -> f64 {
        self.min_threshold
    }

    /// Rules ordered by the ranking metric, highest first, ties by
    /// antecedent and then consequent.
    pub fn generate(&self, frequent: &FrequentItemsets) -> Result<Vec<Rule>> {
        let splittable: Vec<&Frequent> = frequent.iter().filter(|f| f.itemset.len() >= 2).collect();

        #[cfg(feature = "parallel")]
        let per_itemset: Vec<Vec<Rule>> = splittable
            .par_iter()
            .map(|f| self.rules_for(f, frequent))
            .collect::<Result<_>>()?;

        #[cfg(not(feature = "parallel"))]
        let per_itemset: Vec<Vec<Rule>> = splittable
            .iter()
            .map(|f| self.rules_for(f, frequent))
            .collect::<Result<_>>()?;

        let mut rules: Vec<Rule> = per_itemset.into_iter().flatten().collect();
        rules.sort_by(|a, b| {
            self.metric
                .value(b)
                .total_cmp(&self.metric.value(a))
                .then_with(|| a.antecedent.cmp(&b.antecedent))
                .then_with(|| a.consequent.cmp(&b.consequent))
        });
        info!(
            itemsets = splittable.len(),
            rules = rules.len(),
            metric = %self.metric,
            min_threshold = self.min_threshold,
            "rules generated"
        );
        Ok(rules)
    }

    fn rules_for(&self, frequent: &Frequent, table: &FrequentItemsets) -> Result<Vec<Rule>> {
        if self.metric == Metric::Confidence && frequent.itemset.len() > self.exhaustive_split_cap {
            debug!(itemset = %frequent.itemset, "pruned split traversal");
            self.pruned(frequent, table)
        } else {
            self.exhaustive(frequent, table)
        }
    }

    // All 2^n - 2 splits.
    fn exhaustive(&self, frequent: &Frequent, table: &FrequentItemsets) -> Result<Vec<Rule>> {
        let items = frequent.itemset.items();
        let n = items.len();
        if n > MAX_EXHAUSTIVE_SIZE {
            return Err(CartwiseError::invalid_argument(
                "itemset size",
                n,
                format!("at most {MAX_EXHAUSTIVE_SIZE} items for exhaustive rule enumeration"),
            ));
        }
        let full: u64 = (1u64 << n) - 1;
        let mut rules = Vec::new();
        for mask in 1..full {
            let (left, right): (Vec<_>, Vec<_>) = items
                .iter()
                .enumerate()
                .partition(|(position, _)| mask & (1u64 << position) != 0);
            let antecedent = Itemset::from_sorted(left.into_iter().map(|(_, item)| *item).collect());
            let consequent = Itemset::from_sorted(right.into_iter().map(|(_, item)| *item).collect());
            let rule = derive(frequent, antecedent, consequent, table)?;
            if self.metric.value(&rule) >= self.min_threshold {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    // Confidence only falls as the consequent grows, so consequents are grown
    // level by level from the ones that passed and a failed consequent is
    // never extended. Produces exactly the rules `exhaustive` would.
    fn pruned(&self, frequent: &Frequent, table: &FrequentItemsets) -> Result<Vec<Rule>> {
        let itemset = &frequent.itemset;
        let mut rules = Vec::new();
        let mut passing: Vec<Itemset> = Vec::new();
        for item in itemset.iter() {
            let consequent = Itemset::single(*item);
            let Some(antecedent) = itemset.difference(&consequent) else {
                continue;
            };
            let rule = derive(frequent, antecedent, consequent.clone(), table)?;
            if rule.confidence >= self.min_threshold {
                rules.push(rule);
                passing.push(consequent);
            }
        }
        while !passing.is_empty() && passing[0].len() + 1 < itemset.len() {
            let known: HashSet<&Itemset, ItemHasher> = passing.iter().collect();
            let candidates = join_level(&passing, |consequent| known.contains(consequent));
            let mut next = Vec::new();
            for consequent in candidates {
                let Some(antecedent) = itemset.difference(&consequent) else {
                    continue;
                };
                let rule = derive(frequent, antecedent, consequent.clone(), table)?;
                if rule.confidence >= self.min_threshold {
                    rules.push(rule);
                    next.push(consequent);
                }
            }
            passing = next;
        }
        Ok(rules)
    }
}

fn derive(
    frequent: &Frequent,
    antecedent: Itemset,
    consequent: Itemset,
    table: &FrequentItemsets,
) -> Result<Rule> {
    let antecedent_count = recorded_count(table, &antecedent, &frequent.itemset)?;
    let consequent_count = recorded_count(table, &consequent, &frequent.itemset)?;
    Ok(Rule::from_counts(
        antecedent,
        consequent,
        frequent.count,
        antecedent_count,
        consequent_count,
        table.transaction_count(),
    ))
}

fn recorded_count(table: &FrequentItemsets, subset: &Itemset, parent: &Itemset) -> Result<u64> {
    match table.count(subset) {
        Some(count) if count > 0 => Ok(count),
        _ => Err(CartwiseError::InternalConsistency(format!(
            "subset {subset} of frequent itemset {parent} has no recorded support"
        ))),
    }
}

/// Generates rules from `frequent`, keeping those whose `metric` is at least
/// `min_threshold`. The support denominator is the table's transaction count.
pub fn generate_rules(frequent: &FrequentItemsets, metric: Metric, min_threshold: f64) -> Result<Vec<Rule>> {
    RuleGenerator::new(metric, min_threshold)?.generate(frequent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;
    use crate::mine::mine;

    fn groceries() -> crate::encode::Dataset {
        encode(vec![
            vec!["milk", "bread"],
            vec!["milk", "bread", "eggs"],
            vec!["bread"],
            vec!["milk"],
        ])
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn metric_names_parse_case_insensitively() {
        assert_eq!("Lift".parse::<Metric>().unwrap(), Metric::Lift);
        assert_eq!(" conviction ".parse::<Metric>().unwrap(), Metric::Conviction);
        assert!(matches!(
            "zhang".parse::<Metric>(),
            Err(CartwiseError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn thresholds_are_validated_per_metric() {
        assert!(Metric::Confidence.validate_threshold(0.0).is_err());
        assert!(Metric::Confidence.validate_threshold(1.2).is_err());
        assert!(Metric::Support.validate_threshold(1.0).is_ok());
        assert!(Metric::Lift.validate_threshold(1.0).is_ok());
        assert!(Metric::Lift.validate_threshold(f64::INFINITY).is_err());
        assert!(Metric::Leverage.validate_threshold(0.25).is_ok());
        assert!(Metric::Leverage.validate_threshold(0.0).is_err());
        assert!(Metric::Leverage.validate_threshold(-0.1).is_err());
        assert!(Metric::Leverage.validate_threshold(0.3).is_err());
        for metric in Metric::ALL {
            assert!(metric.validate_threshold(f64::NAN).is_err());
        }
    }

    #[test]
    fn metrics_for_milk_implies_bread_and_eggs() {
        let dataset = groceries();
        let frequent = mine(dataset.transactions(), 0.25).unwrap();
        let rules = generate_rules(&frequent, Metric::Confidence, 0.1).unwrap();
        let vocabulary = dataset.vocabulary();
        let milk = vocabulary.itemset(&["milk"]).unwrap();
        let bread_eggs = vocabulary.itemset(&["bread", "eggs"]).unwrap();
        let rule = rules
            .iter()
            .find(|r| r.antecedent() == &milk && r.consequent() == &bread_eggs)
            .expect("rule {milk} => {bread, eggs}");
        assert!(close(rule.support(), 0.25));
        assert!(close(rule.antecedent_support(), 0.75));
        assert!(close(rule.confidence(), 1.0 / 3.0));
        assert!(close(rule.lift(), 4.0 / 3.0));
        assert!(close(rule.leverage(), 0.25 - 0.75 * 0.25));
        assert!(close(rule.conviction(), 0.75 / (2.0 / 3.0)));
    }

    #[test]
    fn metric_exactly_at_threshold_is_kept() {
        // a in 5 of 8, c in 3, together 3: lift of either direction is 24/15
        let mut rows = vec![vec!["a", "c"]; 3];
        rows.extend(vec![vec!["a"]; 2]);
        rows.extend(vec![Vec::new(); 3]);
        let dataset = encode(rows);
        let frequent = mine(dataset.transactions(), 0.25).unwrap();
        let rules = generate_rules(&frequent, Metric::Lift, 1.6).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.lift() == 1.6));
        let a_to_c = &rules[0];
        assert_eq!(a_to_c.antecedent().items(), &[0]);
        assert_eq!(a_to_c.leverage(), 9.0 / 64.0);
        assert_eq!(a_to_c.conviction(), 25.0 / 16.0);
        assert!(rules[1].conviction().is_infinite());
    }

    #[test]
    fn certain_rules_have_infinite_conviction() {
        let dataset = groceries();
        let frequent = mine(dataset.transactions(), 0.25).unwrap();
        let rules = generate_rules(&frequent, Metric::Confidence, 1.0).unwrap();
        assert!(!rules.is_empty());
        assert!(rules.iter().all(|r| r.confidence() == 1.0 && r.conviction().is_infinite()));
    }

    #[test]
    fn ordered_by_metric_then_sides() {
        let dataset = groceries();
        let frequent = mine(dataset.transactions(), 0.25).unwrap();
        let rules = generate_rules(&frequent, Metric::Lift, 0.5).unwrap();
        for pair in rules.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.lift() >= b.lift());
            if a.lift() == b.lift() {
                assert!((a.antecedent(), a.consequent()) < (b.antecedent(), b.consequent()));
            }
        }
    }

    #[test]
    fn pruned_traversal_matches_exhaustive() {
        let dataset = encode(vec![
            vec!["a", "b", "c", "d"],
            vec!["a", "b", "c"],
            vec!["a", "b", "d"],
            vec!["a", "c", "d"],
            vec!["b", "c", "d"],
            vec!["a", "b", "c", "d"],
            vec!["a", "b"],
        ]);
        let frequent = mine(dataset.transactions(), 0.2).unwrap();
        for threshold in [0.3, 0.6, 0.8, 1.0] {
            let exhaustive = RuleGenerator::new(Metric::Confidence, threshold)
                .unwrap()
                .generate(&frequent)
                .unwrap();
            let pruned = RuleGenerator::new(Metric::Confidence, threshold)
                .unwrap()
                .with_exhaustive_split_cap(1)
                .generate(&frequent)
                .unwrap();
            assert_eq!(exhaustive, pruned, "threshold {threshold}");
        }
    }

    #[test]
    fn missing_subset_is_an_internal_consistency_error() {
        let broken = FrequentItemsets::from_counts(
            vec![
                (Itemset::single(0), 2),
                (Itemset::new(vec![0, 1]).unwrap(), 1),
            ],
            4,
            0.25,
        );
        let result = generate_rules(&broken, Metric::Lift, 1.0);
        assert!(matches!(result, Err(CartwiseError::InternalConsistency(_))));
    }

    #[test]
    fn empty_table_gives_no_rules() {
        let frequent = FrequentItemsets::default();
        assert!(generate_rules(&frequent, Metric::Lift, 1.0).unwrap().is_empty());
    }
}
