//! Turns raw label rows into a canonical [`Dataset`].
//!
//! Each raw transaction is a sequence of labels. Labels are trimmed, empty
//! labels and missing-value markers are dropped, duplicates collapse, and
//! every remaining label is interned into the [`Vocabulary`] in order of
//! first appearance. Alongside the horizontal transaction list the dataset
//! keeps a vertical view: one bitmap of transaction ids per item, which is
//! what arbitrary support lookups intersect.

use std::collections::HashSet;

// used for per-item transaction sets
use roaring::RoaringTreemap;

use crate::construct::{Item, ItemHasher, Itemset, Transaction, Vocabulary};

/// Labels the ingestion layer uses for empty cells.
pub const DEFAULT_MISSING_MARKERS: [&str; 4] = ["Unknown", "nan", "NaN", "None"];

#[derive(Debug, Clone)]
pub struct Encoder {
    missing_markers: HashSet<String, ItemHasher>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::with_missing_markers(DEFAULT_MISSING_MARKERS)
    }

    pub fn with_missing_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            missing_markers: markers
                .into_iter()
                .map(|marker| marker.as_ref().trim().to_owned())
                .collect(),
        }
    }

    pub fn is_missing(&self, label: &str) -> bool {
        label.is_empty() || self.missing_markers.contains(label)
    }

    pub fn encode<R, T, S>(&self, raw_transactions: R) -> Dataset
    where
        R: IntoIterator<Item = T>,
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocabulary = Vocabulary::new();
        let mut transactions = Vec::new();
        let mut tidsets: Vec<RoaringTreemap> = Vec::new();
        for (tid, row) in raw_transactions.into_iter().enumerate() {
            let mut items = Vec::new();
            for label in row {
                let label = label.as_ref().trim();
                if self.is_missing(label) {
                    continue;
                }
                let (item, previously_kept) = vocabulary.keep(label);
                if !previously_kept {
                    tidsets.push(RoaringTreemap::new());
                }
                items.push(item);
            }
            let transaction = Transaction::new(items);
            for item in transaction.items() {
                tidsets[*item as usize].insert(tid as u64);
            }
            transactions.push(transaction);
        }
        Dataset {
            vocabulary,
            transactions,
            tidsets,
        }
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes with the default missing-value markers.
pub fn encode<R, T, S>(raw_transactions: R) -> Dataset
where
    R: IntoIterator<Item = T>,
    T: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Encoder::new().encode(raw_transactions)
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    vocabulary: Vocabulary,
    transactions: Vec<Transaction>,
    tidsets: Vec<RoaringTreemap>,
}

impl Dataset {
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }
    pub fn into_parts(self) -> (Vocabulary, Vec<Transaction>) {
        (self.vocabulary, self.transactions)
    }
    /// Number of transactions, empty ones included.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
    pub fn tidset(&self, item: Item) -> Option<&RoaringTreemap> {
        self.tidsets.get(item as usize)
    }
    pub fn item_count(&self, item: Item) -> u64 {
        self.tidset(item).map_or(0, RoaringTreemap::len)
    }
    /// Items with the number of transactions containing them, most
    /// frequent first and ties in item order.
    pub fn item_counts(&self) -> Vec<(Item, u64)> {
        let mut counts: Vec<(Item, u64)> = self
            .tidsets
            .iter()
            .enumerate()
            .map(|(item, tids)| (item as Item, tids.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts
    }
    /// Number of transactions that are supersets of `itemset`.
    pub fn count(&self, itemset: &Itemset) -> u64 {
        let mut members = itemset.iter();
        let Some(first) = members.next().and_then(|item| self.tidset(*item)) else {
            return 0;
        };
        let mut tids = first.clone();
        for item in members {
            match self.tidset(*item) {
                Some(other) => tids &= other,
                None => return 0,
            }
            if tids.is_empty() {
                return 0;
            }
        }
        tids.len()
    }
    pub fn support(&self, itemset: &Itemset) -> f64 {
        if self.transactions.is_empty() {
            return 0.0;
        }
        self.count(itemset) as f64 / self.transactions.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groceries() -> Dataset {
        encode(vec![
            vec!["milk", "bread"],
            vec!["milk", "bread", "eggs"],
            vec!["bread"],
            vec!["milk"],
        ])
    }

    #[test]
    fn vocabulary_in_first_appearance_order() {
        let dataset = groceries();
        assert_eq!(dataset.vocabulary().labels(), vec!["milk", "bread", "eggs"]);
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.transactions()[1].items(), &[0, 1, 2]);
    }

    #[test]
    fn missing_markers_duplicates_and_blanks_are_dropped() {
        let dataset = encode(vec![
            vec!["milk", " milk ", "Unknown"],
            vec!["", "nan", "   "],
            vec!["eggs", "NaN", "None"],
        ]);
        assert_eq!(dataset.vocabulary().labels(), vec!["milk", "eggs"]);
        assert_eq!(dataset.transactions()[0].items(), &[0]);
        // Retained as an empty transaction, still part of the denominator.
        assert!(dataset.transactions()[1].is_empty());
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn custom_markers() {
        let encoder = Encoder::with_missing_markers(["-"]);
        let dataset = encoder.encode(vec![vec!["-", "Unknown"]]);
        assert_eq!(dataset.vocabulary().labels(), vec!["Unknown"]);
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let dataset = encode(Vec::<Vec<String>>::new());
        assert!(dataset.is_empty());
        assert!(dataset.vocabulary().is_empty());
        assert!(dataset.item_counts().is_empty());
    }

    #[test]
    fn supports_from_bitmaps() {
        let dataset = groceries();
        let vocabulary = dataset.vocabulary();
        let milk_bread = vocabulary.itemset(&["milk", "bread"]).unwrap();
        assert_eq!(dataset.count(&milk_bread), 2);
        assert_eq!(dataset.support(&milk_bread), 0.5);
        let all = vocabulary.itemset(&["milk", "bread", "eggs"]).unwrap();
        assert_eq!(dataset.support(&all), 0.25);
        assert_eq!(dataset.support(&Itemset::single(99)), 0.0);
    }

    #[test]
    fn item_counts_most_frequent_first() {
        let dataset = groceries();
        assert_eq!(dataset.item_counts(), vec![(0, 3), (1, 3), (2, 1)]);
    }
}
