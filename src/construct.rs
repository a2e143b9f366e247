// used to keep the one-to-one mapping between labels and their assigned items
use bimap::BiMap;

// other keepers use HashSet or HashMap
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

use serde::Serialize;

// used to print out readable forms of a construct
use std::fmt;

// ------------- Item -------------
// Items are dense indexes handed out in order of first appearance,
// so they double as positions in per-item vectors.
pub type Item = u32;

pub type ItemHasher = BuildHasherDefault<SeaHasher>;

// ------------- Itemset -------------
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct Itemset {
    items: Vec<Item>,
}
impl Itemset {
    /// Sorts and deduplicates the given items. An itemset has at least one
    /// member, so `None` is returned for an empty input.
    pub fn new(mut items: Vec<Item>) -> Option<Self> {
        items.sort_unstable();
        items.dedup();
        if items.is_empty() {
            return None;
        }
        Some(Self { items })
    }
    pub fn single(item: Item) -> Self {
        Self { items: vec![item] }
    }
    // The caller guarantees the items are strictly ascending and non-empty.
    pub(crate) fn from_sorted(items: Vec<Item>) -> Self {
        debug_assert!(!items.is_empty());
        debug_assert!(items.windows(2).all(|w| w[0] < w[1]));
        Self { items }
    }
    pub fn items(&self) -> &[Item] {
        &self.items
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn first(&self) -> Item {
        self.items[0]
    }
    pub fn contains(&self, item: Item) -> bool {
        self.items.binary_search(&item).is_ok()
    }
    pub fn is_subset_of(&self, other: &[Item]) -> bool {
        is_sorted_subset(&self.items, other)
    }
    /// The itemset with the member at `position` removed, or `None` when
    /// that would leave it empty.
    pub fn without(&self, position: usize) -> Option<Self> {
        if self.items.len() < 2 {
            return None;
        }
        let mut items = self.items.clone();
        items.remove(position);
        Some(Self { items })
    }
    /// Members of `self` that are not in `other`, or `None` if nothing remains.
    pub fn difference(&self, other: &Itemset) -> Option<Self> {
        let items: Vec<Item> = self
            .items
            .iter()
            .copied()
            .filter(|item| !other.contains(*item))
            .collect();
        if items.is_empty() { None } else { Some(Self { items }) }
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }
}
impl fmt::Display for Itemset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let members: Vec<String> = self.items.iter().map(|i| i.to_string()).collect();
        write!(f, "{{{}}}", members.join(","))
    }
}

// Merge walk over two ascending slices.
pub(crate) fn is_sorted_subset(needles: &[Item], haystack: &[Item]) -> bool {
    if needles.len() > haystack.len() {
        return false;
    }
    let mut rest = haystack.iter();
    'outer: for needle in needles {
        for candidate in rest.by_ref() {
            if candidate == needle {
                continue 'outer;
            }
            if candidate > needle {
                return false;
            }
        }
        return false;
    }
    true
}

// ------------- Transaction -------------
// Unlike an itemset a transaction may be empty; it still counts
// towards the support denominator.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Transaction {
    items: Vec<Item>,
}
impl Transaction {
    pub fn new(mut items: Vec<Item>) -> Self {
        items.sort_unstable();
        items.dedup();
        Self { items }
    }
    pub fn items(&self) -> &[Item] {
        &self.items
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn contains(&self, item: Item) -> bool {
        self.items.binary_search(&item).is_ok()
    }
    pub fn contains_all(&self, itemset: &Itemset) -> bool {
        itemset.is_subset_of(&self.items)
    }
}

// ------------- Vocabulary -------------
// Keeps labels and hands out items. Once the encoder is done with it
// the mapping is never changed again.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    kept: BiMap<String, Item>,
}
impl Vocabulary {
    pub fn new() -> Self {
        Self { kept: BiMap::new() }
    }
    pub(crate) fn keep(&mut self, label: &str) -> (Item, bool) {
        if let Some(item) = self.kept.get_by_left(label) {
            return (*item, true);
        }
        let item = self.kept.len() as Item;
        self.kept.insert(label.to_owned(), item);
        (item, false)
    }
    pub fn item(&self, label: &str) -> Option<Item> {
        self.kept.get_by_left(label).copied()
    }
    pub fn label(&self, item: Item) -> Option<&str> {
        self.kept.get_by_right(&item).map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    /// Labels in item order, which is the order of first appearance.
    pub fn labels(&self) -> Vec<&str> {
        (0..self.kept.len() as Item)
            .filter_map(|item| self.label(item))
            .collect()
    }
    /// Labels in alphabetical order, as offered for selection.
    pub fn sorted_labels(&self) -> Vec<&str> {
        let mut labels = self.labels();
        labels.sort_unstable();
        labels
    }
    /// Resolves labels to an itemset. Unknown labels make the whole lookup fail.
    pub fn itemset(&self, labels: &[&str]) -> Option<Itemset> {
        let items = labels
            .iter()
            .map(|label| self.item(label))
            .collect::<Option<Vec<Item>>>()?;
        Itemset::new(items)
    }
    pub fn describe(&self, itemset: &Itemset) -> Vec<String> {
        itemset
            .iter()
            .map(|item| {
                self.label(*item)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("#{item}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn itemset_is_sorted_and_deduplicated() {
        let itemset = Itemset::new(vec![3, 1, 3, 2]).unwrap();
        assert_eq!(itemset.items(), &[1, 2, 3]);
        assert_eq!(itemset.to_string(), "{1,2,3}");
        assert!(Itemset::new(vec![]).is_none());
    }

    #[test]
    fn subset_walk() {
        assert!(is_sorted_subset(&[1, 3], &[0, 1, 2, 3]));
        assert!(!is_sorted_subset(&[1, 4], &[0, 1, 2, 3]));
        assert!(!is_sorted_subset(&[0, 1, 2], &[0, 1]));
        assert!(is_sorted_subset(&[], &[]));
    }

    #[test]
    fn without_and_difference() {
        let itemset = Itemset::new(vec![1, 2, 3]).unwrap();
        assert_eq!(itemset.without(1).unwrap().items(), &[1, 3]);
        assert!(Itemset::single(7).without(0).is_none());
        let other = Itemset::new(vec![2]).unwrap();
        assert_eq!(itemset.difference(&other).unwrap().items(), &[1, 3]);
        assert!(other.difference(&itemset).is_none());
    }

    #[test]
    fn vocabulary_keeps_first_appearance_order() {
        let mut vocabulary = Vocabulary::new();
        assert_eq!(vocabulary.keep("milk"), (0, false));
        assert_eq!(vocabulary.keep("bread"), (1, false));
        assert_eq!(vocabulary.keep("milk"), (0, true));
        assert_eq!(vocabulary.labels(), vec!["milk", "bread"]);
        assert_eq!(vocabulary.sorted_labels(), vec!["bread", "milk"]);
        assert_eq!(vocabulary.label(1), Some("bread"));
        assert_eq!(vocabulary.item("eggs"), None);
        assert_eq!(vocabulary.itemset(&["milk", "bread"]).unwrap().items(), &[0, 1]);
        assert!(vocabulary.itemset(&["milk", "eggs"]).is_none());
    }
}
