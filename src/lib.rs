//! # fta-rs: qualitative fault tree analysis in Rust
//!
//! **`fta-rs`** enumerates the minimal cut sets (MCS) of a fault tree: the
//! minimal combinations of basic-event failures that force the top event.
//! The tree is compiled into an indexed Boolean graph (a propositional
//! DAG), normalized, and analyzed with the MOCUS top-down expansion backed
//! by a zero-suppressed BDD container that stores families of cut sets
//! compactly.
//!
//! ## Key Ideas
//!
//! - **Indexed nodes**: every gate, variable, and constant carries a small
//!   integer identity. Variables are dense in `1..=V`; gates start above a
//!   reserved base, so an edge's kind is visible from its magnitude alone.
//! - **Signed edges**: literal polarity lives on the edge, not on the
//!   node, which keeps shared children canonical and makes De Morgan a
//!   pure sign flip.
//! - **Modules**: independent sub-trees are detected from DFS visit times
//!   and analyzed separately, then their cut sets are substituted back.
//! - **ZBDD cut sets**: families of cut sets are stored zero-suppressed
//!   and hash-consed; subsumption, complement elimination, and truncation
//!   are recursive set operations with memoization.
//!
//! ## Basic Usage
//!
//! ```rust
//! use fta_rs::model::{BasicEvent, Formula, Gate};
//! use fta_rs::{BooleanGraph, Mocus, Operator, Preprocessor, Settings};
//!
//! // Top = AND(pump, OR(valve, relay))
//! let pump = BasicEvent::new("pump");
//! let valve = BasicEvent::new("valve");
//! let relay = BasicEvent::new("relay");
//! let mut backup = Formula::new(Operator::Or);
//! backup.add_basic_event(&valve);
//! backup.add_basic_event(&relay);
//! let mut top = Formula::new(Operator::And);
//! top.add_basic_event(&pump);
//! top.add_formula(backup);
//! let top = Gate::new("top", top);
//!
//! let mut graph = BooleanGraph::new(&top, false).unwrap();
//! Preprocessor::new(&mut graph).run();
//!
//! let mut mocus = Mocus::new(&graph, Settings::default());
//! mocus.analyze();
//! assert_eq!(mocus.products(), &[vec![1, 2], vec![1, 3]]);
//!
//! // Indices map back to the model through the graph.
//! assert_eq!(graph.get_basic_event(1).id(), "pump");
//! ```
//!
//! ## Core Components
//!
//! - **[`graph`]**: the indexed Boolean graph and its construction.
//! - **[`gate`]**: the mutable gate algebra (duplicates, complements,
//!   coalescing, De Morgan).
//! - **[`preprocessor`]**: normalization and module detection.
//! - **[`zbdd`]**: the cut-set container.
//! - **[`mocus`]**: the module-by-module expansion driver.

pub mod debug;
pub mod error;
pub mod gate;
pub mod graph;
pub mod mocus;
pub mod model;
pub mod node;
pub mod preprocessor;
pub mod settings;
pub mod storage;
pub mod vertex;
pub mod zbdd;

pub use error::Error;
pub use gate::Operator;
pub use graph::BooleanGraph;
pub use mocus::Mocus;
pub use preprocessor::Preprocessor;
pub use settings::Settings;
