//! The MOCUS cut-set generation driver.
//!
//! The driver walks the marked modules of a preprocessed graph in
//! post-order. Each module gets its own [`CutSetContainer`]: the module's
//! top gate is converted and merged, then the lowest remaining
//! intermediate gate is repeatedly extracted and expanded until only
//! variable and module literals remain. Sub-modules are analyzed
//! recursively and joined back into their parents.
//!
//! Pre-condition: the graph is normalized (constants propagated, negations
//! on variable edges only) and modules are marked; see
//! [`Preprocessor::run`][crate::preprocessor::Preprocessor::run].
//!
//! Termination: expanding a gate removes its literal before the expansion
//! re-introduces only deeper gates of the module, and the module DAG is
//! acyclic, so the set of expandable gate literals shrinks monotonically.

use std::collections::HashMap;

use log::debug;

use crate::gate::{Operator, State};
use crate::graph::BooleanGraph;
use crate::node::GateRef;
use crate::settings::Settings;
use crate::zbdd::CutSetContainer;

pub struct Mocus<'a> {
    graph: &'a BooleanGraph,
    settings: Settings,
    products: Vec<Vec<i32>>,
    truncated: bool,
    analyzed: bool,
}

impl<'a> Mocus<'a> {
    pub fn new(graph: &'a BooleanGraph, settings: Settings) -> Self {
        Self {
            graph,
            settings,
            products: Vec::new(),
            truncated: false,
            analyzed: false,
        }
    }

    /// Generates the minimal cut sets of the graph.
    pub fn analyze(&mut self) {
        debug!("start minimal cut set generation");
        let root = self.graph.root().clone();
        let state = root.borrow().state();
        match state {
            // A constant graph needs no analysis.
            State::Null => self.products = Vec::new(),
            State::Unity => self.products = vec![Vec::new()],
            State::Normal => {
                if root.borrow().operator() == Operator::Null {
                    // A pass-through root is its single literal.
                    let r = root.borrow();
                    let &literal = r.children().iter().next().expect("pass-through child");
                    assert!(
                        r.variable_children().contains_key(&literal),
                        "Pass-through root over a non-variable"
                    );
                    self.products = vec![vec![literal]];
                } else {
                    let container = self.analyze_module(&root);
                    self.truncated = container.truncated();
                    self.products = container.products().collect();
                }
            }
        }
        self.analyzed = true;
        debug!("found {} minimal cut sets", self.products.len());
    }

    /// The minimal cut sets as sorted lists of signed variable indices.
    pub fn products(&self) -> &[Vec<i32>] {
        assert!(self.analyzed, "Analysis is not done");
        &self.products
    }

    /// True if the order limit truncated the result; the products are then
    /// a subset of the true family.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Finds the cut sets of one module.
    fn analyze_module(&self, gate: &GateRef) -> CutSetContainer {
        assert!(gate.borrow().is_module(), "Expected a module gate");
        debug!("finding cut sets from module G{}", gate.borrow().index());

        // The gate map over the module's interior grows lazily as
        // intermediate gates are discovered during expansion.
        let mut gates: HashMap<i32, GateRef> = gate
            .borrow()
            .gate_children()
            .values()
            .map(|sub| (sub.borrow().index(), sub.clone()))
            .collect();

        let mut container = CutSetContainer::new(self.settings, self.graph.num_variables());
        let top = container.convert_gate(&gate.borrow());
        container.merge(top);

        loop {
            let next_gate = container.get_next_gate();
            if next_gate == 0 {
                break;
            }
            debug!("expanding gate G{}", next_gate);
            let inter_gate = gates
                .get(&next_gate)
                .cloned()
                .unwrap_or_else(|| panic!("G{} is missing from the module map", next_gate));
            for sub in inter_gate.borrow().gate_children().values() {
                let index = sub.borrow().index();
                gates.entry(index).or_insert_with(|| sub.clone());
            }
            let converted = container.convert_gate(&inter_gate.borrow());
            let extracted = container.extract_intermediate_cut_sets(next_gate);
            let expanded = container.expand_gate(converted, extracted);
            container.merge(expanded);
        }

        container.minimize();
        if !self.graph.coherent() {
            container.eliminate_complements();
            container.minimize();
        }
        for module in container.gather_modules() {
            let module_gate = gates
                .get(&module)
                .cloned()
                .unwrap_or_else(|| panic!("Module G{} is missing from the module map", module));
            let sub_result = self.analyze_module(&module_gate);
            container.join_module(module, sub_result);
        }
        container.eliminate_constant_modules();
        container.minimize();
        container
    }
}
