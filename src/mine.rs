//! Level-wise (Apriori) frequent itemset mining.
//!
//! Level 1 counts single items. Every later level joins the survivors of the
//! previous level that share all but their last item, prunes candidates with
//! an infrequent (k-1)-subset, and counts what is left in one pass over the
//! transactions. Transactions are first projected onto the frequent items so
//! later passes never look at items that cannot take part in a candidate.
//!
//! Counting is sharded over disjoint transaction ranges; shard counts are
//! summed, so the result does not depend on how the shards are scheduled.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info};

use crate::construct::{Item, ItemHasher, Itemset, Transaction};
use crate::error::{CartwiseError, Result};
use crate::interface::CancelToken;

pub const DEFAULT_SHARD_SIZE: usize = 4096;

/// A frequent itemset with its absolute and relative support.
#[derive(Debug, Clone, PartialEq)]
pub struct Frequent {
    pub itemset: Itemset,
    pub count: u64,
    pub support: f64,
}

/// Every frequent itemset of one mining run, ordered by size and then by
/// item sequence.
#[derive(Debug, Clone, Default)]
pub struct FrequentItemsets {
    frequent: Vec<Frequent>,
    lookup: HashMap<Itemset, usize, ItemHasher>,
    transaction_count: u64,
    min_support: f64,
}

impl FrequentItemsets {
    /// Builds the table from absolute counts, e.g. when frequent itemsets come
    /// from somewhere other than [`Miner`]. Nothing checks downward closure
    /// here; rule generation reports a missing subset as an internal
    /// consistency error.
    pub fn from_counts(
        mut counts: Vec<(Itemset, u64)>,
        transaction_count: u64,
        min_support: f64,
    ) -> Self {
        counts.sort_unstable_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
        counts.dedup_by(|a, b| a.0 == b.0);
        let mut frequent = Vec::with_capacity(counts.len());
        let mut lookup = HashMap::default();
        for (itemset, count) in counts {
            let support = if transaction_count == 0 {
                0.0
            } else {
                count as f64 / transaction_count as f64
            };
            lookup.insert(itemset.clone(), frequent.len());
            frequent.push(Frequent {
                itemset,
                count,
                support,
            });
        }
        Self {
            frequent,
            lookup,
            transaction_count,
            min_support,
        }
    }
    pub fn len(&self) -> usize {
        self.frequent.len()
    }
    pub fn is_empty(&self) -> bool {
        self.frequent.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Frequent> {
        self.frequent.iter()
    }
    pub fn as_slice(&self) -> &[Frequent] {
        &self.frequent
    }
    pub fn get(&self, itemset: &Itemset) -> Option<&Frequent> {
        self.lookup.get(itemset).map(|position| &self.frequent[*position])
    }
    pub fn contains(&self, itemset: &Itemset) -> bool {
        self.lookup.contains_key(itemset)
    }
    pub fn support(&self, itemset: &Itemset) -> Option<f64> {
        self.get(itemset).map(|frequent| frequent.support)
    }
    pub fn count(&self, itemset: &Itemset) -> Option<u64> {
        self.get(itemset).map(|frequent| frequent.count)
    }
    /// The support denominator of the run.
    pub fn transaction_count(&self) -> u64 {
        self.transaction_count
    }
    pub fn min_support(&self) -> f64 {
        self.min_support
    }
    /// Frequent itemsets of exactly `size` items.
    pub fn level(&self, size: usize) -> impl Iterator<Item = &Frequent> {
        self.frequent.iter().filter(move |f| f.itemset.len() == size)
    }
    pub fn max_size(&self) -> usize {
        self.frequent.last().map_or(0, |f| f.itemset.len())
    }
}

#[derive(Debug, Clone)]
pub struct Miner {
    min_support: f64,
    max_len: Option<usize>,
    shard_size: usize,
}

impl Miner {
    pub fn new(min_support: f64) -> Result<Self> {
        validate_min_support(min_support)?;
        Ok(Self {
            min_support,
            max_len: None,
            shard_size: DEFAULT_SHARD_SIZE,
        })
    }

    /// Stops the search after itemsets of `max_len` items.
    pub fn with_max_len(mut self, max_len: Option<usize>) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_shard_size(mut self, shard_size: usize) -> Self {
        self.shard_size = shard_size.max(1);
        self
    }

    pub fn min_support(&self) -> f64 {
        self.min_support
    }

    pub fn mine(&self, transactions: &[Transaction]) -> Result<FrequentItemsets> {
        self.mine_cancellable(transactions, &CancelToken::new())
    }

    pub fn mine_cancellable(
        &self,
        transactions: &[Transaction],
        cancel: &CancelToken,
    ) -> Result<FrequentItemsets> {
        let started = Instant::now();
        let transaction_count = transactions.len() as u64;
        if cancel.is_cancelled() {
            return Err(CartwiseError::Cancelled);
        }
        if transaction_count == 0 || self.max_len == Some(0) {
            return Ok(FrequentItemsets::from_counts(Vec::new(), transaction_count, self.min_support));
        }

        // ------------- level 1 -------------
        let item_counts = count_items(transactions);
        let level_1: Vec<(Itemset, u64)> = item_counts
            .iter()
            .enumerate()
            .filter(|(_, count)| self.is_frequent(**count, transaction_count))
            .map(|(item, count)| (Itemset::single(item as Item), *count))
            .collect();
        debug!(level = 1, candidates = item_counts.len(), frequent = level_1.len(), "level complete");
        if level_1.is_empty() {
            info!(transactions = transaction_count, frequent = 0, "mining complete");
            return Ok(FrequentItemsets::from_counts(Vec::new(), transaction_count, self.min_support));
        }

        let frequent_items: HashSet<Item, ItemHasher> =
            level_1.iter().map(|(itemset, _)| itemset.first()).collect();
        let projected: Vec<Vec<Item>> = transactions
            .iter()
            .map(|t| {
                t.items()
                    .iter()
                    .copied()
                    .filter(|item| frequent_items.contains(item))
                    .collect()
            })
            .collect();

        let mut previous: Vec<Itemset> = level_1.iter().map(|(itemset, _)| itemset.clone()).collect();
        let mut levels = vec![level_1];
        let mut k = 2;
        loop {
            if cancel.is_cancelled() {
                debug!(level = k, "cancelled");
                return Err(CartwiseError::Cancelled);
            }
            if self.max_len.is_some_and(|max_len| k > max_len) {
                break;
            }
            let known: HashSet<&Itemset, ItemHasher> = previous.iter().collect();
            let candidates = join_level(&previous, |subset| known.contains(subset));
            if candidates.is_empty() {
                debug!(level = k, "no candidates");
                break;
            }
            let counts = self.count_candidates(&projected, &candidates, k);
            let level: Vec<(Itemset, u64)> = candidates
                .into_iter()
                .zip(counts)
                .filter(|(_, count)| self.is_frequent(*count, transaction_count))
                .collect();
            debug!(level = k, frequent = level.len(), "level complete");
            if level.is_empty() {
                break;
            }
            previous = level.iter().map(|(itemset, _)| itemset.clone()).collect();
            levels.push(level);
            k += 1;
        }

        let frequent = FrequentItemsets::from_counts(levels.concat(), transaction_count, self.min_support);
        info!(
            transactions = transaction_count,
            frequent = frequent.len(),
            max_size = frequent.max_size(),
            ms = started.elapsed().as_secs_f64() * 1000.0,
            "mining complete"
        );
        Ok(frequent)
    }

    // Non-strict: a support equal to the threshold is frequent. Both sides are
    // correctly rounded, so exact fractions such as 2/4 compare equal to 0.5.
    fn is_frequent(&self, count: u64, transaction_count: u64) -> bool {
        count as f64 / transaction_count as f64 >= self.min_support
    }

    fn count_candidates(&self, projected: &[Vec<Item>], candidates: &[Itemset], k: usize) -> Vec<u64> {
        let positions: HashMap<&[Item], usize, ItemHasher> = candidates
            .iter()
            .enumerate()
            .map(|(position, candidate)| (candidate.items(), position))
            .collect();
        let count_shard = |shard: &[Vec<Item>]| {
            let mut counts = vec![0u64; candidates.len()];
            for items in shard {
                count_transaction(items, k, candidates, &positions, &mut counts);
            }
            counts
        };
        let merge = |mut a: Vec<u64>, b: Vec<u64>| {
            for (x, y) in a.iter_mut().zip(b) {
                *x += y;
            }
            a
        };

        #[cfg(feature = "parallel")]
        let counts = projected
            .par_chunks(self.shard_size)
            .map(count_shard)
            .reduce(|| vec![0u64; candidates.len()], merge);

        #[cfg(not(feature = "parallel"))]
        let counts = projected
            .chunks(self.shard_size)
            .map(count_shard)
            .fold(vec![0u64; candidates.len()], merge);

        counts
    }
}

/// Mines `transactions` with default miner settings.
pub fn mine(transactions: &[Transaction], min_support: f64) -> Result<FrequentItemsets> {
    Miner::new(min_support)?.mine(transactions)
}

pub fn validate_min_support(min_support: f64) -> Result<()> {
    if min_support > 0.0 && min_support <= 1.0 {
        Ok(())
    } else {
        Err(CartwiseError::invalid_argument("min_support", min_support, "a fraction in (0, 1]"))
    }
}

fn count_items(transactions: &[Transaction]) -> Vec<u64> {
    let mut counts: Vec<u64> = Vec::new();
    for transaction in transactions {
        for item in transaction.items() {
            let item = *item as usize;
            if item >= counts.len() {
                counts.resize(item + 1, 0);
            }
            counts[item] += 1;
        }
    }
    counts
}

// A transaction either enumerates its own k-subsets and looks them up, or
// tests every candidate, whichever touches fewer sets.
fn count_transaction(
    items: &[Item],
    k: usize,
    candidates: &[Itemset],
    positions: &HashMap<&[Item], usize, ItemHasher>,
    counts: &mut [u64],
) {
    if items.len() < k {
        return;
    }
    if binomial(items.len(), k) <= candidates.len() as u64 {
        for_each_combination(items, k, |subset| {
            if let Some(position) = positions.get(subset) {
                counts[*position] += 1;
            }
        });
    } else {
        for (position, candidate) in candidates.iter().enumerate() {
            if candidate.is_subset_of(items) {
                counts[position] += 1;
            }
        }
    }
}

/// Apriori join: pairs of sorted (k-1)-itemsets sharing their first k-2 items
/// yield one k-itemset each, which is kept only if every (k-1)-subset is
/// `known`. The prefix join produces every k-set exactly once, so the output
/// has no duplicates and inherits the input's sort order.
pub(crate) fn join_level<F>(previous: &[Itemset], known: F) -> Vec<Itemset>
where
    F: Fn(&Itemset) -> bool,
{
    let mut sorted: Vec<&Itemset> = previous.iter().collect();
    sorted.sort_unstable();
    let mut candidates = Vec::new();
    for (i, left) in sorted.iter().enumerate() {
        let prefix = &left.items()[..left.len() - 1];
        for right in sorted[i + 1..].iter() {
            if &right.items()[..right.len() - 1] != prefix {
                break;
            }
            let mut items = left.items().to_vec();
            items.push(right.items()[right.len() - 1]);
            let candidate = Itemset::from_sorted(items);
            // dropping either of the last two items gives back a parent
            let pruned = (0..candidate.len() - 2).any(|position| {
                candidate
                    .without(position)
                    .is_some_and(|subset| !known(&subset))
            });
            if !pruned {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

pub(crate) fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k) as u64;
    let n = n as u64;
    let mut result: u64 = 1;
    for i in 0..k {
        result = result.saturating_mul(n - i) / (i + 1);
    }
    result
}

fn for_each_combination<F>(items: &[Item], k: usize, mut visit: F)
where
    F: FnMut(&[Item]),
{
    let n = items.len();
    if k == 0 || k > n {
        return;
    }
    let mut indices: Vec<usize> = (0..k).collect();
    let mut subset: Vec<Item> = indices.iter().map(|i| items[*i]).collect();
    loop {
        visit(&subset);
        // rightmost index that can still move
        let Some(i) = (0..k).rev().find(|i| indices[*i] != *i + n - k) else {
            return;
        };
        indices[i] += 1;
        for j in i + 1..k {
            indices[j] = indices[j - 1] + 1;
        }
        for j in i..k {
            subset[j] = items[indices[j]];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;

    fn transactions(rows: &[&[Item]]) -> Vec<Transaction> {
        rows.iter().map(|row| Transaction::new(row.to_vec())).collect()
    }

    fn itemset(items: &[Item]) -> Itemset {
        Itemset::new(items.to_vec()).unwrap()
    }

    #[test]
    fn min_support_must_be_a_fraction() {
        for bad in [0.0, -0.1, 1.0001, f64::NAN] {
            assert!(matches!(
                Miner::new(bad),
                Err(CartwiseError::InvalidArgument { .. })
            ));
        }
        assert!(Miner::new(1.0).is_ok());
    }

    #[test]
    fn groceries_at_half_and_sixty_percent() {
        let dataset = encode(vec![
            vec!["milk", "bread"],
            vec!["milk", "bread", "eggs"],
            vec!["bread"],
            vec!["milk"],
        ]);
        let frequent = mine(dataset.transactions(), 0.5).unwrap();
        let found: Vec<(Vec<Item>, f64)> = frequent
            .iter()
            .map(|f| (f.itemset.items().to_vec(), f.support))
            .collect();
        assert_eq!(
            found,
            vec![(vec![0], 0.75), (vec![1], 0.75), (vec![0, 1], 0.5)]
        );

        let frequent = mine(dataset.transactions(), 0.6).unwrap();
        assert_eq!(frequent.len(), 2);
        assert_eq!(frequent.level(2).count(), 0);
    }

    #[test]
    fn threshold_is_inclusive() {
        let rows = transactions(&[&[1, 2], &[1], &[2], &[3]]);
        let frequent = mine(&rows, 0.25).unwrap();
        assert!(frequent.contains(&itemset(&[1, 2])));
        let frequent = mine(&rows, 0.26).unwrap();
        assert!(!frequent.contains(&itemset(&[1, 2])));
        assert!(!frequent.contains(&itemset(&[3])));
    }

    #[test]
    fn single_transaction_yields_power_set() {
        let rows = transactions(&[&[0, 1, 2]]);
        let frequent = mine(&rows, 1.0).unwrap();
        assert_eq!(frequent.len(), 7);
        assert!(frequent.iter().all(|f| f.support == 1.0));
        let order: Vec<Vec<Item>> = frequent.iter().map(|f| f.itemset.items().to_vec()).collect();
        assert_eq!(
            order,
            vec![
                vec![0],
                vec![1],
                vec![2],
                vec![0, 1],
                vec![0, 2],
                vec![1, 2],
                vec![0, 1, 2]
            ]
        );
    }

    #[test]
    fn one_empty_transaction() {
        let dataset = encode(vec![Vec::<&str>::new()]);
        let frequent = mine(dataset.transactions(), 0.01).unwrap();
        assert!(frequent.is_empty());
        assert_eq!(frequent.transaction_count(), 1);
    }

    #[test]
    fn max_len_stops_the_search() {
        let rows = transactions(&[&[0, 1, 2], &[0, 1, 2]]);
        let frequent = Miner::new(0.5).unwrap().with_max_len(Some(2)).mine(&rows).unwrap();
        assert_eq!(frequent.max_size(), 2);
        assert_eq!(frequent.len(), 6);
    }

    #[test]
    fn shard_size_does_not_change_counts() {
        let rows = transactions(&[&[0, 1, 2], &[0, 1], &[1, 2], &[0, 2], &[0, 1, 2, 3], &[3]]);
        let whole = Miner::new(0.3).unwrap().mine(&rows).unwrap();
        let sharded = Miner::new(0.3).unwrap().with_shard_size(1).mine(&rows).unwrap();
        assert_eq!(whole.as_slice(), sharded.as_slice());
    }

    #[test]
    fn cancelled_before_start() {
        let rows = transactions(&[&[0, 1]]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = Miner::new(0.5).unwrap().mine_cancellable(&rows, &cancel);
        assert!(matches!(result, Err(CartwiseError::Cancelled)));
    }

    #[test]
    fn join_prunes_infrequent_subsets() {
        // {1,2,3} needs {2,3}, which is missing
        let previous = vec![itemset(&[1, 2]), itemset(&[1, 3]), itemset(&[1, 4]), itemset(&[3, 4])];
        let known: HashSet<Itemset> = previous.iter().cloned().collect();
        let candidates = join_level(&previous, |s| known.contains(s));
        assert_eq!(candidates, vec![itemset(&[1, 3, 4])]);
    }

    #[test]
    fn combinations_in_lexical_order() {
        let mut seen = Vec::new();
        for_each_combination(&[1, 2, 3, 4], 2, |s| seen.push(s.to_vec()));
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[0], vec![1, 2]);
        assert_eq!(seen[5], vec![3, 4]);
        assert_eq!(binomial(4, 2), 6);
        assert_eq!(binomial(2, 3), 0);
    }
}
