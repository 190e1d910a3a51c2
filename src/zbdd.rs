//! Zero-suppressed BDD container for families of cut sets.
//!
//! A family is a DAG of decision vertices over signed literals. The
//! variable order is fixed for the container's lifetime: `|literal|`
//! ascending, and at equal absolute value the positive literal before the
//! negative one. Gate literals draw their indices from above the variable
//! range, so they always order after every variable and sit deep in the
//! diagram, which preserves sharing while intermediate gates are expanded
//! top-down.
//!
//! Terminals are the empty family and the family of only the empty set.
//! The zero-suppression rule eliminates any vertex whose high branch is
//! the empty family, which makes the representation canonical together
//! with hash consing in the storage.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, warn};

use crate::gate::{Gate, Operator, State};
use crate::settings::Settings;
use crate::storage::{SetNode, VertexStorage};
use crate::vertex::Vertex;

/// Position of a signed literal in the fixed ZBDD order.
///
/// `|literal|` ascending; positive before negative at the same magnitude.
pub(crate) fn order_key(literal: i32) -> u64 {
    ((literal.unsigned_abs() as u64) << 1) | (literal < 0) as u64
}

/// Folds two identities into one hash word (Szudzik pairing).
///
/// Vertex indices and literal order keys are small and dense, so the
/// pairing stays collision-free until its products wrap; the vertex
/// storage and the operation cache both key on such pairs.
pub(crate) fn mix(a: u64, b: u64) -> u64 {
    if a < b {
        // b * b + a
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        // a * a + a + b
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

/// Memoization keys for the recursive set operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum OpKey {
    Union(Vertex, Vertex),
    Product(Vertex, Vertex),
    Subsume(Vertex, Vertex),
    Minimize(Vertex),
    Complements(Vertex),
    Subset0(Vertex, i32),
    Subset1(Vertex, i32),
    Prune(Vertex, u32),
}

impl OpKey {
    /// The operation tag mixed with the operand identities; literals
    /// enter through their order keys so that signs hash apart.
    fn hash(self) -> u64 {
        let (tag, a, b) = match self {
            OpKey::Union(f, g) => (1, f.index() as u64, g.index() as u64),
            OpKey::Product(f, g) => (2, f.index() as u64, g.index() as u64),
            OpKey::Subsume(f, g) => (3, f.index() as u64, g.index() as u64),
            OpKey::Minimize(f) => (4, f.index() as u64, 0),
            OpKey::Complements(f) => (5, f.index() as u64, 0),
            OpKey::Subset0(f, literal) => (6, f.index() as u64, order_key(literal)),
            OpKey::Subset1(f, literal) => (7, f.index() as u64, order_key(literal)),
            OpKey::Prune(f, slots) => (8, f.index() as u64, slots as u64),
        };
        mix(mix(tag, a), b)
    }
}

/// Direct-mapped memo table for the recursive set operations.
///
/// Cut-set vertices are never reclaimed, so a cached result stays valid
/// for the container's lifetime; a colliding key simply displaces the
/// older entry.
struct OpCache {
    entries: Vec<Option<(OpKey, Vertex)>>,
    bitmask: u64,
}

impl OpCache {
    /// Creates a table of `2^bits` slots.
    fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Cache bits should be in the range 0..=31");
        let size = 1usize << bits;
        Self {
            entries: vec![None; size],
            bitmask: (size - 1) as u64,
        }
    }

    fn slot(&self, key: OpKey) -> usize {
        (key.hash() & self.bitmask) as usize
    }

    fn get(&self, key: OpKey) -> Option<Vertex> {
        match self.entries[self.slot(key)] {
            Some((cached, result)) if cached == key => Some(result),
            _ => None,
        }
    }

    fn insert(&mut self, key: OpKey, result: Vertex) {
        let slot = self.slot(key);
        self.entries[slot] = Some((key, result));
    }
}

/// The ZBDD of cut sets for one analysis module.
///
/// The container accumulates an expansion-in-progress family: cut sets may
/// contain variable literals, expandable intermediate-gate literals, and
/// module literals awaiting substitution. The MOCUS driver drains the
/// intermediate gates, then the modules, until only variables remain.
pub struct CutSetContainer {
    storage: RefCell<VertexStorage>,
    cache: RefCell<OpCache>,
    count_cache: RefCell<HashMap<Vertex, u64>>,
    settings: Settings,
    /// Any `|literal|` above this bound is a gate.
    gate_index_bound: i32,
    root: Vertex,
    zero: Vertex,
    one: Vertex,
    /// Modules whose sub-results were constant: true for unity.
    constant_modules: HashMap<i32, bool>,
    truncated: bool,
}

impl CutSetContainer {
    pub fn new(settings: Settings, num_variables: usize) -> Self {
        let mut storage = VertexStorage::new(16);
        let zero = storage.alloc();
        let one = storage.alloc();
        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(OpCache::new(16)),
            count_cache: RefCell::new(HashMap::new()),
            settings,
            gate_index_bound: num_variables as i32,
            root: zero,
            zero,
            one,
            constant_modules: HashMap::new(),
            truncated: false,
        }
    }

    /// The empty family.
    pub fn zero(&self) -> Vertex {
        self.zero
    }

    /// The family containing only the empty set.
    pub fn one(&self) -> Vertex {
        self.one
    }

    pub fn is_zero(&self, vertex: Vertex) -> bool {
        vertex == self.zero
    }

    pub fn is_one(&self, vertex: Vertex) -> bool {
        vertex == self.one
    }

    pub fn is_terminal(&self, vertex: Vertex) -> bool {
        self.is_zero(vertex) || self.is_one(vertex)
    }

    /// The accumulated family.
    pub fn root(&self) -> Vertex {
        self.root
    }

    /// True if the order limit ever truncated the family.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    fn is_gate(&self, literal: i32) -> bool {
        literal.unsigned_abs() as i32 > self.gate_index_bound
    }

    fn node(&self, vertex: Vertex) -> SetNode {
        *self.storage.borrow().node(vertex)
    }

    fn mk_node(&self, literal: i32, module: bool, low: Vertex, high: Vertex) -> Vertex {
        assert_ne!(literal, 0, "Literal must not be zero");
        // Zero-suppression.
        if high == self.zero {
            return low;
        }
        debug_assert!(
            self.is_terminal(low) || order_key(literal) < order_key(self.node(low).literal),
            "Order violation on the low branch"
        );
        debug_assert!(
            self.is_terminal(high) || order_key(literal) < order_key(self.node(high).literal),
            "Order violation on the high branch"
        );
        let vertex = self
            .storage
            .borrow_mut()
            .put(SetNode::new(literal, module, low, high));
        vertex
    }

    /// The family of one singleton set.
    fn single(&self, literal: i32, module: bool) -> Vertex {
        self.mk_node(literal, module, self.zero, self.one)
    }
}

// The recursive set algebra.
impl CutSetContainer {
    fn union_of(&self, f: Vertex, g: Vertex) -> Vertex {
        if f == self.zero {
            return g;
        }
        if g == self.zero || f == g {
            return f;
        }
        if f == self.one {
            return self.union_one(g);
        }
        if g == self.one {
            return self.union_one(f);
        }

        let (f, g) = if f.index() <= g.index() { (f, g) } else { (g, f) };
        let key = OpKey::Union(f, g);
        if let Some(result) = self.cache.borrow().get(key) {
            return result;
        }

        let fnode = self.node(f);
        let gnode = self.node(g);
        let forder = order_key(fnode.literal);
        let gorder = order_key(gnode.literal);
        let result = if forder < gorder {
            let low = self.union_of(fnode.low, g);
            self.mk_node(fnode.literal, fnode.module, low, fnode.high)
        } else if gorder < forder {
            let low = self.union_of(f, gnode.low);
            self.mk_node(gnode.literal, gnode.module, low, gnode.high)
        } else {
            debug_assert_eq!(fnode.literal, gnode.literal);
            let low = self.union_of(fnode.low, gnode.low);
            let high = self.union_of(fnode.high, gnode.high);
            self.mk_node(fnode.literal, fnode.module, low, high)
        };

        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// Adds the empty set to a non-terminal family.
    fn union_one(&self, f: Vertex) -> Vertex {
        let node = self.node(f);
        let low = self.union_of(node.low, self.one);
        self.mk_node(node.literal, node.module, low, node.high)
    }

    /// The AND-product of two families: pairwise set unions.
    fn product_of(&self, f: Vertex, g: Vertex) -> Vertex {
        if f == self.zero || g == self.zero {
            return self.zero;
        }
        if f == self.one {
            return g;
        }
        if g == self.one {
            return f;
        }

        let (f, g) = if f.index() <= g.index() { (f, g) } else { (g, f) };
        let key = OpKey::Product(f, g);
        if let Some(result) = self.cache.borrow().get(key) {
            return result;
        }

        let fnode = self.node(f);
        let gnode = self.node(g);
        let forder = order_key(fnode.literal);
        let gorder = order_key(gnode.literal);
        let result = if forder < gorder {
            let low = self.product_of(fnode.low, g);
            let high = self.product_of(fnode.high, g);
            self.mk_node(fnode.literal, fnode.module, low, high)
        } else if gorder < forder {
            let low = self.product_of(f, gnode.low);
            let high = self.product_of(f, gnode.high);
            self.mk_node(gnode.literal, gnode.module, low, high)
        } else {
            debug_assert_eq!(fnode.literal, gnode.literal);
            let low = self.product_of(fnode.low, gnode.low);
            let both = self.product_of(fnode.high, gnode.high);
            let f_only = self.product_of(fnode.high, gnode.low);
            let g_only = self.product_of(fnode.low, gnode.high);
            let high = self.union_of(self.union_of(both, f_only), g_only);
            self.mk_node(fnode.literal, fnode.module, low, high)
        };

        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// The sub-family of sets that do not contain the literal.
    fn subset0(&self, f: Vertex, literal: i32) -> Vertex {
        if self.is_terminal(f) {
            return f;
        }
        let node = self.node(f);
        let top = order_key(node.literal);
        let target = order_key(literal);
        if top == target {
            return node.low;
        }
        if top > target {
            return f;
        }

        let key = OpKey::Subset0(f, literal);
        if let Some(result) = self.cache.borrow().get(key) {
            return result;
        }
        let low = self.subset0(node.low, literal);
        let high = self.subset0(node.high, literal);
        let result = self.mk_node(node.literal, node.module, low, high);
        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// The sub-family of sets containing the literal, with it removed.
    fn subset1(&self, f: Vertex, literal: i32) -> Vertex {
        if self.is_terminal(f) {
            return self.zero;
        }
        let node = self.node(f);
        let top = order_key(node.literal);
        let target = order_key(literal);
        if top == target {
            return node.high;
        }
        if top > target {
            return self.zero;
        }

        let key = OpKey::Subset1(f, literal);
        if let Some(result) = self.cache.borrow().get(key) {
            return result;
        }
        let low = self.subset1(node.low, literal);
        let high = self.subset1(node.high, literal);
        let result = self.mk_node(node.literal, node.module, low, high);
        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// True iff the family contains the empty set.
    fn contains_empty(&self, f: Vertex) -> bool {
        let mut vertex = f;
        loop {
            if vertex == self.one {
                return true;
            }
            if vertex == self.zero {
                return false;
            }
            vertex = self.node(vertex).low;
        }
    }

    /// Removes from `f` every set that is a superset of some set in `g`.
    fn subsume(&self, f: Vertex, g: Vertex) -> Vertex {
        if g == self.one {
            return self.zero; // The empty set subsumes everything.
        }
        if f == self.zero || g == self.zero {
            return f;
        }
        if f == self.one {
            // The empty set is only a superset of itself.
            return if self.contains_empty(g) { self.zero } else { self.one };
        }

        let key = OpKey::Subsume(f, g);
        if let Some(result) = self.cache.borrow().get(key) {
            return result;
        }

        let fnode = self.node(f);
        let gnode = self.node(g);
        let forder = order_key(fnode.literal);
        let gorder = order_key(gnode.literal);
        let result = if gorder < forder {
            // The top of g cannot occur in f; only g's offset can subsume.
            self.subsume(f, gnode.low)
        } else if forder < gorder {
            let low = self.subsume(fnode.low, g);
            let high = self.subsume(fnode.high, g);
            self.mk_node(fnode.literal, fnode.module, low, high)
        } else {
            debug_assert_eq!(fnode.literal, gnode.literal);
            let low = self.subsume(fnode.low, gnode.low);
            let high = self.subsume(self.subsume(fnode.high, gnode.high), gnode.low);
            self.mk_node(fnode.literal, fnode.module, low, high)
        };

        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// Subsumption reduction: keeps only the minimal sets of the family.
    fn minimize_family(&self, f: Vertex) -> Vertex {
        if self.is_terminal(f) {
            return f;
        }
        let key = OpKey::Minimize(f);
        if let Some(result) = self.cache.borrow().get(key) {
            return result;
        }

        let node = self.node(f);
        let low = self.minimize_family(node.low);
        let high = self.minimize_family(node.high);
        // A set with the literal is redundant if the same set without it
        // is already in the family.
        let high = self.subsume(high, low);
        let result = self.mk_node(node.literal, node.module, low, high);

        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// Drops every set that contains both a variable and its complement.
    fn complements_free(&self, f: Vertex) -> Vertex {
        if self.is_terminal(f) {
            return f;
        }
        let key = OpKey::Complements(f);
        if let Some(result) = self.cache.borrow().get(key) {
            return result;
        }

        let node = self.node(f);
        let low = self.complements_free(node.low);
        let mut high = self.complements_free(node.high);
        if node.literal > 0 && !self.is_gate(node.literal) {
            // The complement orders directly below the positive literal.
            high = self.subset0(high, -node.literal);
        }
        let result = self.mk_node(node.literal, node.module, low, high);

        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// Keeps only the sets of at most `slots` literals.
    fn prune_family(&self, f: Vertex, slots: usize) -> Vertex {
        if self.is_terminal(f) {
            return f;
        }
        if slots == 0 {
            return if self.contains_empty(f) { self.one } else { self.zero };
        }
        let key = OpKey::Prune(f, slots as u32);
        if let Some(result) = self.cache.borrow().get(key) {
            return result;
        }

        let node = self.node(f);
        let low = self.prune_family(node.low, slots);
        let high = self.prune_family(node.high, slots - 1);
        let result = self.mk_node(node.literal, node.module, low, high);

        self.cache.borrow_mut().insert(key, result);
        result
    }

    /// The number of sets in the family.
    pub fn count(&self, f: Vertex) -> u64 {
        if f == self.zero {
            return 0;
        }
        if f == self.one {
            return 1;
        }
        if let Some(&result) = self.count_cache.borrow().get(&f) {
            return result;
        }
        let node = self.node(f);
        let result = self.count(node.low) + self.count(node.high);
        self.count_cache.borrow_mut().insert(f, result);
        result
    }
}

// The cut-set interface driven by MOCUS.
impl CutSetContainer {
    /// One-level expansion of a gate's operator into a family.
    ///
    /// Gate children become gate literals (module-flagged when the child
    /// is a module); variable children become signed variable literals.
    /// The graph must be normalized: no NAND/NOR/XOR gates, no negative
    /// gate edges, no constants.
    pub fn convert_gate(&self, gate: &Gate) -> Vertex {
        assert_eq!(
            gate.state(),
            State::Normal,
            "Constant gates are resolved before conversion"
        );
        debug!("converting G{} ({})", gate.index(), gate.operator());
        match gate.operator() {
            Operator::And => {
                let mut family = self.one;
                for &index in gate.children() {
                    let (literal, module) = self.child_literal(gate, index);
                    let singleton = self.single(literal, module);
                    family = self.product_of(family, singleton);
                }
                family
            }
            Operator::Or => {
                let mut family = self.zero;
                for &index in gate.children() {
                    let (literal, module) = self.child_literal(gate, index);
                    let singleton = self.single(literal, module);
                    family = self.union_of(family, singleton);
                }
                family
            }
            Operator::Atleast => {
                let vote = gate.vote_number();
                assert!(vote > 1, "Unnormalized ATLEAST vote number");
                let literals: Vec<(i32, bool)> = gate
                    .children()
                    .iter()
                    .map(|&index| self.child_literal(gate, index))
                    .collect();
                self.convert_atleast(&literals, vote as usize)
            }
            Operator::Null => {
                let &index = gate.children().iter().next().expect("NULL gate child");
                let (literal, module) = self.child_literal(gate, index);
                self.single(literal, module)
            }
            Operator::Not => {
                let &index = gate.children().iter().next().expect("NOT gate child");
                assert!(
                    gate.variable_children().contains_key(&index),
                    "NOT over a gate requires normalization"
                );
                self.single(-index, false)
            }
            operator => panic!(
                "G{} with operator {} requires normalization",
                gate.index(),
                operator
            ),
        }
    }

    /// The union of the products of all size-`k` subsets.
    fn convert_atleast(&self, literals: &[(i32, bool)], k: usize) -> Vertex {
        if k == 0 {
            return self.one;
        }
        if literals.len() < k {
            return self.zero;
        }
        let (&(literal, module), rest) = literals.split_first().unwrap();
        let sub = self.convert_atleast(rest, k - 1);
        let singleton = self.single(literal, module);
        let with_first = self.product_of(singleton, sub);
        let without = self.convert_atleast(rest, k);
        self.union_of(with_first, without)
    }

    fn child_literal(&self, gate: &Gate, index: i32) -> (i32, bool) {
        if let Some(sub) = gate.gate_children().get(&index) {
            assert!(index > 0, "Negative gate edges require normalization");
            (index, sub.borrow().is_module())
        } else if gate.variable_children().contains_key(&index) {
            (index, false)
        } else {
            panic!(
                "Constant child {} of G{} must be propagated before analysis",
                index,
                gate.index()
            );
        }
    }

    /// Unions a family into the accumulated cut sets.
    pub fn merge(&mut self, family: Vertex) {
        self.root = self.union_of(self.root, family);
        self.apply_limits();
    }

    /// Rewrites gate-containing cut sets with the gate's one-level family.
    pub fn expand_gate(&self, gate_family: Vertex, cut_sets: Vertex) -> Vertex {
        self.product_of(gate_family, cut_sets)
    }

    /// Returns and removes the sub-family of cut sets containing the gate.
    ///
    /// The returned sets no longer carry the gate literal, so expansion is
    /// a plain family product.
    pub fn extract_intermediate_cut_sets(&mut self, gate_index: i32) -> Vertex {
        assert!(self.is_gate(gate_index), "G{} is not a gate literal", gate_index);
        debug!("extracting cut sets with G{}", gate_index);
        let extracted = self.subset1(self.root, gate_index);
        self.root = self.subset0(self.root, gate_index);
        extracted
    }

    /// The lowest expandable gate index in the family, 0 if none remain.
    ///
    /// Lowest first means shallow gates expand before the deeper gates
    /// they introduce, preserving maximal sharing.
    pub fn get_next_gate(&self) -> i32 {
        let mut stack = vec![self.root];
        let mut visited = HashSet::new();
        let mut next = 0;
        while let Some(vertex) = stack.pop() {
            if self.is_terminal(vertex) || !visited.insert(vertex) {
                continue;
            }
            let node = self.node(vertex);
            if self.is_gate(node.literal) && !node.module && (next == 0 || node.literal < next) {
                next = node.literal;
            }
            stack.push(node.low);
            stack.push(node.high);
        }
        next
    }

    /// The module gate indices present in the family.
    pub fn gather_modules(&self) -> BTreeSet<i32> {
        let mut stack = vec![self.root];
        let mut visited = HashSet::new();
        let mut modules = BTreeSet::new();
        while let Some(vertex) = stack.pop() {
            if self.is_terminal(vertex) || !visited.insert(vertex) {
                continue;
            }
            let node = self.node(vertex);
            if node.module {
                debug_assert!(self.is_gate(node.literal));
                modules.insert(node.literal);
            }
            stack.push(node.low);
            stack.push(node.high);
        }
        modules
    }

    /// Substitutes a module literal with the module's own cut sets.
    ///
    /// A constant sub-result is recorded for
    /// [`eliminate_constant_modules`][Self::eliminate_constant_modules]
    /// instead of being substituted in place.
    pub fn join_module(&mut self, module_index: i32, sub: CutSetContainer) {
        assert!(self.is_gate(module_index));
        debug!("joining module G{}", module_index);
        self.truncated |= sub.truncated;
        if sub.is_terminal(sub.root()) {
            self.constant_modules
                .insert(module_index, sub.is_one(sub.root()));
            return;
        }
        let family = self.import_family(&sub, sub.root(), &mut HashMap::new());
        let extracted = self.subset1(self.root, module_index);
        let rest = self.subset0(self.root, module_index);
        let joined = self.product_of(extracted, family);
        self.root = self.union_of(rest, joined);
        self.apply_limits();
    }

    /// Copies a family from another container into this one.
    ///
    /// Both containers share the same literal order, so the copy keeps
    /// the structure vertex for vertex.
    fn import_family(
        &self,
        other: &CutSetContainer,
        vertex: Vertex,
        imported: &mut HashMap<Vertex, Vertex>,
    ) -> Vertex {
        if other.is_zero(vertex) {
            return self.zero;
        }
        if other.is_one(vertex) {
            return self.one;
        }
        if let Some(&copy) = imported.get(&vertex) {
            return copy;
        }
        let node = other.node(vertex);
        let low = self.import_family(other, node.low, imported);
        let high = self.import_family(other, node.high, imported);
        let copy = self.mk_node(node.literal, node.module, low, high);
        imported.insert(vertex, copy);
        copy
    }

    /// Sweeps the modules whose sub-results were constant: a null module
    /// kills its cut sets, a unity module simply vanishes from them.
    pub fn eliminate_constant_modules(&mut self) {
        let modules: Vec<(i32, bool)> = self.constant_modules.drain().collect();
        for (module, unity) in modules {
            debug!("eliminating constant module G{}", module);
            if unity {
                let with = self.subset1(self.root, module);
                let without = self.subset0(self.root, module);
                self.root = self.union_of(without, with);
            } else {
                self.root = self.subset0(self.root, module);
            }
        }
    }

    /// Removes every cut set that is a strict superset of another.
    pub fn minimize(&mut self) {
        self.root = self.minimize_family(self.root);
    }

    /// Cancels the contradictory cut sets of a non-coherent family.
    pub fn eliminate_complements(&mut self) {
        self.root = self.complements_free(self.root);
    }

    fn apply_limits(&mut self) {
        let limit = self.settings.limit_order();
        let pruned = self.prune_family(self.root, limit);
        if pruned != self.root {
            if !self.truncated {
                warn!("truncating cut sets beyond order {}", limit);
            }
            self.truncated = true;
            self.root = pruned;
        }
    }

    /// Iterates the cut sets of the accumulated family, each as a list of
    /// signed indices ordered by absolute value.
    pub fn products(&self) -> Products<'_> {
        Products {
            container: self,
            stack: vec![(self.root, Vec::new())],
        }
    }
}

/// Iterator over the cut sets of a family.
pub struct Products<'a> {
    container: &'a CutSetContainer,
    stack: Vec<(Vertex, Vec<i32>)>,
}

impl Iterator for Products<'_> {
    type Item = Vec<i32>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((vertex, set)) = self.stack.pop() {
            if self.container.is_zero(vertex) {
                continue;
            }
            if self.container.is_one(vertex) {
                return Some(set);
            }
            let node = self.container.node(vertex);
            self.stack.push((node.low, set.clone()));
            let mut with_literal = set;
            with_literal.push(node.literal);
            self.stack.push((node.high, with_literal));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;
    use crate::node::{Node, NodeIndexer, Variable, VariableRef};
    use std::rc::Rc;

    fn container(num_variables: usize) -> CutSetContainer {
        CutSetContainer::new(Settings::default(), num_variables)
    }

    fn family(container: &CutSetContainer, sets: &[&[i32]]) -> Vertex {
        let mut result = container.zero();
        for set in sets {
            let mut product = container.one();
            for &literal in *set {
                let singleton = container.single(literal, false);
                product = container.product_of(product, singleton);
            }
            result = container.union_of(result, product);
        }
        result
    }

    fn sets_of(container: &CutSetContainer) -> Vec<Vec<i32>> {
        container.products().collect()
    }

    #[test]
    fn test_mix_is_injective_on_small_identities() {
        // Vertex indices and order keys are small; the pairing must keep
        // them apart well past any realistic cache key.
        let mut seen = std::collections::HashSet::new();
        for a in 0..64u64 {
            for b in 0..64u64 {
                assert!(seen.insert(mix(a, b)));
            }
        }
    }

    #[test]
    fn test_op_keys_hash_apart() {
        let f = Vertex::new(3);
        let g = Vertex::new(7);
        let keys = [
            OpKey::Union(f, g),
            OpKey::Union(g, f),
            OpKey::Product(f, g),
            OpKey::Subsume(f, g),
            OpKey::Subsume(g, f),
            OpKey::Minimize(f),
            OpKey::Complements(f),
            OpKey::Subset0(f, 2),
            OpKey::Subset0(f, -2),
            OpKey::Subset1(f, 2),
            OpKey::Prune(f, 2),
        ];
        let mut seen = std::collections::HashSet::new();
        for key in keys {
            assert!(seen.insert(key.hash()), "collision for {:?}", key);
        }
    }

    #[test]
    fn test_op_cache_memoizes_and_displaces() {
        let mut cache = OpCache::new(2);
        let f = Vertex::new(3);
        let g = Vertex::new(4);

        cache.insert(OpKey::Union(f, g), f);
        assert_eq!(cache.get(OpKey::Union(f, g)), Some(f));
        assert_eq!(cache.get(OpKey::Product(f, g)), None);

        // A key landing in the same slot displaces the older entry.
        cache.insert(OpKey::Subset0(f, 2), g);
        assert_eq!(cache.get(OpKey::Subset0(f, 2)), Some(g));
        assert_eq!(cache.get(OpKey::Union(f, g)), None);
    }

    #[test]
    fn test_terminals() {
        let zbdd = container(3);
        assert_eq!(zbdd.count(zbdd.zero()), 0);
        assert_eq!(zbdd.count(zbdd.one()), 1);
        assert!(zbdd.is_terminal(zbdd.zero()));
        assert!(zbdd.is_terminal(zbdd.one()));
    }

    #[test]
    fn test_union_and_count() {
        let mut zbdd = container(3);
        let f = family(&zbdd, &[&[1], &[2, 3]]);
        zbdd.merge(f);
        assert_eq!(zbdd.count(zbdd.root()), 2);
        assert_eq!(sets_of(&zbdd), vec![vec![1], vec![2, 3]]);
    }

    #[test]
    fn test_union_is_idempotent() {
        let zbdd = container(3);
        let f = family(&zbdd, &[&[1, 2], &[3]]);
        assert_eq!(zbdd.union_of(f, f), f);
        assert_eq!(zbdd.union_of(f, zbdd.zero()), f);
    }

    #[test]
    fn test_product_distributes() {
        let zbdd = container(4);
        let f = family(&zbdd, &[&[1], &[2]]);
        let g = family(&zbdd, &[&[3], &[4]]);
        let product = zbdd.product_of(f, g);
        assert_eq!(zbdd.count(product), 4);
        let expected = family(&zbdd, &[&[1, 3], &[1, 4], &[2, 3], &[2, 4]]);
        assert_eq!(product, expected);
    }

    #[test]
    fn test_product_absorbs_duplicates() {
        let zbdd = container(2);
        let f = family(&zbdd, &[&[1]]);
        let g = family(&zbdd, &[&[1, 2]]);
        let product = zbdd.product_of(f, g);
        assert_eq!(product, family(&zbdd, &[&[1, 2]]));
    }

    #[test]
    fn test_subsets() {
        let zbdd = container(3);
        let f = family(&zbdd, &[&[1, 2], &[2, 3], &[3]]);
        let with_two = zbdd.subset1(f, 2);
        assert_eq!(with_two, family(&zbdd, &[&[1], &[3]]));
        let without_two = zbdd.subset0(f, 2);
        assert_eq!(without_two, family(&zbdd, &[&[3]]));
    }

    #[test]
    fn test_minimize_removes_supersets() {
        let mut zbdd = container(3);
        let f = family(&zbdd, &[&[1], &[1, 2], &[2, 3]]);
        zbdd.merge(f);
        zbdd.minimize();
        assert_eq!(sets_of(&zbdd), vec![vec![1], vec![2, 3]]);

        // Minimization is idempotent.
        let minimal = zbdd.root();
        zbdd.minimize();
        assert_eq!(zbdd.root(), minimal);
    }

    #[test]
    fn test_minimize_keeps_empty_set_only() {
        let mut zbdd = container(2);
        let f = zbdd.union_of(family(&zbdd, &[&[1], &[1, 2]]), zbdd.one());
        zbdd.merge(f);
        zbdd.minimize();
        assert_eq!(sets_of(&zbdd), vec![Vec::<i32>::new()]);
    }

    #[test]
    fn test_eliminate_complements() {
        let mut zbdd = container(3);
        let f = family(&zbdd, &[&[1, -1], &[2, -3], &[2, -2, 3]]);
        zbdd.merge(f);
        zbdd.eliminate_complements();
        zbdd.minimize();
        assert_eq!(sets_of(&zbdd), vec![vec![2, -3]]);

        // The pair is idempotent.
        let stable = zbdd.root();
        zbdd.eliminate_complements();
        zbdd.minimize();
        assert_eq!(zbdd.root(), stable);
    }

    #[test]
    fn test_signed_literal_order() {
        let mut zbdd = container(2);
        let f = family(&zbdd, &[&[1, -2], &[-1, 2]]);
        zbdd.merge(f);
        assert_eq!(sets_of(&zbdd), vec![vec![1, -2], vec![-1, 2]]);
    }

    #[test]
    fn test_truncation_by_order_limit() {
        let settings = Settings::new().with_limit_order(2).unwrap();
        let mut zbdd = CutSetContainer::new(settings, 4);
        let f = family(&zbdd, &[&[1], &[2, 3, 4]]);
        zbdd.merge(f);
        assert!(zbdd.truncated());
        assert_eq!(sets_of(&zbdd), vec![vec![1]]);
    }

    fn gate_with_variables(
        operator: Operator,
        vote: i32,
        count: usize,
    ) -> (crate::node::GateRef, Vec<VariableRef>) {
        let indexer = Rc::new(NodeIndexer::new());
        let gate = Gate::new(operator, &indexer);
        gate.borrow_mut().set_vote_number(vote);
        let variables: Vec<VariableRef> =
            (0..count).map(|_| Variable::new(&indexer)).collect();
        for variable in &variables {
            let index = variable.borrow().index();
            gate.borrow_mut()
                .add_child(index, Node::Variable(variable.clone()));
        }
        (gate, variables)
    }

    #[test]
    fn test_convert_and_gate() {
        let (gate, _variables) = gate_with_variables(Operator::And, 0, 3);
        let mut zbdd = container(3);
        let converted = zbdd.convert_gate(&gate.borrow());
        zbdd.merge(converted);
        assert_eq!(sets_of(&zbdd), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_convert_or_gate() {
        let (gate, _variables) = gate_with_variables(Operator::Or, 0, 3);
        let mut zbdd = container(3);
        let converted = zbdd.convert_gate(&gate.borrow());
        zbdd.merge(converted);
        assert_eq!(sets_of(&zbdd), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_convert_atleast_gate() {
        let (gate, _variables) = gate_with_variables(Operator::Atleast, 2, 3);
        let mut zbdd = container(3);
        let converted = zbdd.convert_gate(&gate.borrow());
        zbdd.merge(converted);
        assert_eq!(sets_of(&zbdd), vec![vec![1, 2], vec![1, 3], vec![2, 3]]);
    }

    #[test]
    fn test_expand_intermediate_gate() {
        // Top = AND(1, G) where G = OR(2, 3); G is an intermediate gate.
        let indexer = Rc::new(NodeIndexer::new());
        let top = Gate::new(Operator::And, &indexer);
        let sub = Gate::new(Operator::Or, &indexer);
        let variables: Vec<VariableRef> =
            (0..3).map(|_| Variable::new(&indexer)).collect();
        top.borrow_mut()
            .add_child(1, Node::Variable(variables[0].clone()));
        let sub_index = sub.borrow().index();
        top.borrow_mut().add_child(sub_index, Node::Gate(sub.clone()));
        sub.borrow_mut()
            .add_child(2, Node::Variable(variables[1].clone()));
        sub.borrow_mut()
            .add_child(3, Node::Variable(variables[2].clone()));

        let mut zbdd = container(3);
        let converted = zbdd.convert_gate(&top.borrow());
        zbdd.merge(converted);
        assert_eq!(zbdd.get_next_gate(), sub_index);

        let extracted = zbdd.extract_intermediate_cut_sets(sub_index);
        let converted = zbdd.convert_gate(&sub.borrow());
        let expanded = zbdd.expand_gate(converted, extracted);
        zbdd.merge(expanded);
        assert_eq!(zbdd.get_next_gate(), 0);
        assert_eq!(sets_of(&zbdd), vec![vec![1, 2], vec![1, 3]]);
    }

    #[test]
    fn test_module_literals_and_join() {
        // Top = AND(1, M) with M a module whose cut sets are {2}, {3, 4}.
        let indexer = Rc::new(NodeIndexer::new());
        let top = Gate::new(Operator::And, &indexer);
        let module = Gate::new(Operator::Or, &indexer);
        module.borrow_mut().turn_module();
        let variables: Vec<VariableRef> =
            (0..4).map(|_| Variable::new(&indexer)).collect();
        top.borrow_mut()
            .add_child(1, Node::Variable(variables[0].clone()));
        let module_index = module.borrow().index();
        top.borrow_mut()
            .add_child(module_index, Node::Gate(module.clone()));

        let mut zbdd = container(4);
        let converted = zbdd.convert_gate(&top.borrow());
        zbdd.merge(converted);
        // Modules are not expandable gates.
        assert_eq!(zbdd.get_next_gate(), 0);
        assert_eq!(zbdd.gather_modules().into_iter().collect::<Vec<_>>(), vec![module_index]);

        let mut sub = container(4);
        let results = family(&sub, &[&[2], &[3, 4]]);
        sub.merge(results);
        zbdd.join_module(module_index, sub);
        zbdd.minimize();
        assert_eq!(sets_of(&zbdd), vec![vec![1, 2], vec![1, 3, 4]]);
    }

    #[test]
    fn test_constant_module_elimination() {
        let indexer = Rc::new(NodeIndexer::new());
        let top = Gate::new(Operator::Or, &indexer);
        let module = Gate::new(Operator::And, &indexer);
        module.borrow_mut().turn_module();
        let variables: Vec<VariableRef> =
            (0..2).map(|_| Variable::new(&indexer)).collect();
        top.borrow_mut()
            .add_child(1, Node::Variable(variables[0].clone()));
        let module_index = module.borrow().index();
        top.borrow_mut()
            .add_child(module_index, Node::Gate(module.clone()));

        // A module whose sub-result is the empty family: its cut sets die.
        let mut zbdd = container(2);
        let converted = zbdd.convert_gate(&top.borrow());
        zbdd.merge(converted);
        let sub = container(2);
        zbdd.join_module(module_index, sub);
        zbdd.eliminate_constant_modules();
        zbdd.minimize();
        assert_eq!(sets_of(&zbdd), vec![vec![1]]);

        // A module whose sub-result is {∅}: it vanishes from its sets.
        let mut zbdd = container(2);
        let converted = zbdd.convert_gate(&top.borrow());
        zbdd.merge(converted);
        let mut sub = container(2);
        let one = sub.one();
        sub.merge(one);
        zbdd.join_module(module_index, sub);
        zbdd.eliminate_constant_modules();
        zbdd.minimize();
        assert_eq!(sets_of(&zbdd), vec![Vec::<i32>::new()]);
    }
}
