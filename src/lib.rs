//! Cartwise – market-basket analysis with Apriori and association rules.
//!
//! Cartwise turns a list of shopping transactions into three things:
//! * Frequent itemsets: every set of products bought together in at least a
//!   minimum share (*support*) of all transactions.
//! * Association rules `A → C` between disjoint frequent itemsets, scored by
//!   support, confidence, lift, leverage and conviction.
//! * A recommendation index answering "what goes with this product?" in rule
//!   rank order.
//!
//! Product labels are owned by a "keeper", the [`construct::Vocabulary`], which
//! keeps each label once and hands out a dense integer [`construct::Item`] for
//! it. Everything downstream works on sorted items.
//!
//! ## Modules
//! * [`construct`] – Items, itemsets, transactions and the vocabulary.
//! * [`encode`] – Raw label transactions to an encoded [`encode::Dataset`].
//! * [`mine`] – Level-wise Apriori mining into [`mine::FrequentItemsets`].
//! * [`rules`] – Rule derivation, metrics and ranking.
//! * [`index`] – The item to rule [`index::RecommendationIndex`].
//! * [`analysis`] – The whole pipeline with label-level queries.
//! * [`config`] – Layered [`config::Settings`].
//! * [`interface`] – Cancellation and background runs.
//!
//! ## Quick Start
//! ```
//! use cartwise::{Analysis, QueryMode, Settings};
//! let mut settings = Settings::default();
//! settings.mining.min_support = 0.5;
//! let baskets = vec![
//!     vec!["milk", "bread"],
//!     vec!["milk", "bread", "eggs"],
//!     vec!["bread"],
//!     vec!["milk"],
//! ];
//! let analysis = Analysis::run(baskets, &settings).unwrap();
//! assert_eq!(analysis.frequent_itemsets().len(), 3);
//! let offers = analysis.recommend("milk", QueryMode::Contains);
//! assert!(offers.iter().all(|o| o.antecedent.contains(&"milk".to_string())));
//! ```
//!
//! ## Feature flags
//! * `parallel` (default) – shard support counting and rule derivation with rayon.

pub mod analysis;
pub mod config;
pub mod construct;
pub mod encode;
pub mod error;
pub mod index;
pub mod interface;
pub mod mine;
pub mod rules;

pub use analysis::{Analysis, ItemsetView, Recommendation, RuleView, Summary};
pub use config::Settings;
pub use construct::{Item, Itemset, Transaction, Vocabulary};
pub use encode::{Dataset, Encoder, encode};
pub use error::{CartwiseError, Result};
pub use index::{QueryMode, RecommendationIndex, build_index};
pub use interface::{AnalysisHandle, AnalysisRunner, CancelToken, RunId};
pub use mine::{Frequent, FrequentItemsets, Miner, mine};
pub use rules::{Metric, Rule, RuleGenerator, generate_rules};
