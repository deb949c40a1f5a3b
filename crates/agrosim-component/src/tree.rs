//! Explicit arena of components and their lifecycle traversal.
//!
//! Components never own their sub-components. A crop made of phenology,
//! assimilation and partitioning is inserted as a [`Subtree`]; the tree
//! records parent/child links and drives every lifecycle call itself.
//!
//! # Traversal order
//!
//! - `initialize`: pre-order (a parent before its children).
//! - `calc_rates`, `integrate`, `finalize`: post-order (children before
//!   their parent), so a parent aggregates values its children have just
//!   published.
//!
//! Roots are visited in [`Placement`] order; siblings in insertion order.

use agrosim_core::{ComponentId, Day, DrivingData, Outbox, ParameterSet, Signal};
use agrosim_kiosk::{Phase, VariableKiosk};
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::component::Component;
use crate::context::{
    FinalizeContext, InitContext, IntegrateContext, OverrideContext, RateContext, SignalContext,
};
use crate::error::{ComponentError, ComponentFailure};

/// Increments applied by an external state override, keyed by variable.
pub type Increments = IndexMap<String, f64>;

/// Lifecycle status of a component in the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Inserted, not yet initialized.
    Created,
    /// Initialized; receives rate and integrate calls.
    Active,
    /// Finalized; receives no further calls.
    Finalized,
}

/// Where to insert a [`Subtree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// As the first root: runs before all existing roots.
    First,
    /// As the last root.
    Last,
    /// As the last child of an existing component.
    ChildOf(ComponentId),
}

/// A component together with the components nested under it.
pub struct Subtree {
    component: Box<dyn Component>,
    children: Vec<Subtree>,
}

impl Subtree {
    /// A subtree with no children.
    pub fn new(component: impl Component) -> Self {
        Self::boxed(Box::new(component))
    }

    /// A subtree from an already boxed component.
    pub fn boxed(component: Box<dyn Component>) -> Self {
        Self {
            component,
            children: Vec::new(),
        }
    }

    /// Append a child subtree.
    pub fn with_child(mut self, child: Subtree) -> Self {
        self.children.push(child);
        self
    }

    /// Total number of components in the subtree.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(Subtree::len).sum::<usize>()
    }

    /// Always `false`: a subtree holds at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }
}

struct Node {
    component: Box<dyn Component>,
    parent: Option<ComponentId>,
    children: SmallVec<[ComponentId; 4]>,
    status: Lifecycle,
}

/// Arena of components with explicit traversal order.
#[derive(Default)]
pub struct ComponentTree {
    nodes: IndexMap<ComponentId, Node>,
    roots: Vec<ComponentId>,
    post_order: Vec<ComponentId>,
    next_id: u32,
}

impl ComponentTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no components.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is in the tree.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Name of component `id`.
    pub fn name(&self, id: ComponentId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.component.name())
    }

    /// Lifecycle status of component `id`.
    pub fn status(&self, id: ComponentId) -> Option<Lifecycle> {
        self.nodes.get(&id).map(|n| n.status)
    }

    /// Parent of component `id`.
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Root components in traversal order.
    pub fn roots(&self) -> &[ComponentId] {
        &self.roots
    }

    /// Every component, children before parents.
    pub fn post_order(&self) -> &[ComponentId] {
        &self.post_order
    }

    /// Insert `subtree` and return the id of its root component.
    pub fn insert(
        &mut self,
        placement: Placement,
        subtree: Subtree,
    ) -> Result<ComponentId, ComponentError> {
        let parent = match placement {
            Placement::ChildOf(id) if !self.nodes.contains_key(&id) => {
                return Err(ComponentError::UnknownComponent { id });
            }
            Placement::ChildOf(id) => Some(id),
            Placement::First | Placement::Last => None,
        };
        let root = self.insert_node(parent, subtree);
        match placement {
            Placement::First => self.roots.insert(0, root),
            Placement::Last => self.roots.push(root),
            Placement::ChildOf(parent) => {
                if let Some(node) = self.nodes.get_mut(&parent) {
                    node.children.push(root);
                }
            }
        }
        self.rebuild_order();
        Ok(root)
    }

    fn insert_node(&mut self, parent: Option<ComponentId>, subtree: Subtree) -> ComponentId {
        let id = ComponentId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                component: subtree.component,
                parent,
                children: SmallVec::new(),
                status: Lifecycle::Created,
            },
        );
        for child in subtree.children {
            let child_id = self.insert_node(Some(id), child);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children.push(child_id);
            }
        }
        id
    }

    /// Remove component `id` and everything below it.
    ///
    /// Returns the removed ids, children first.
    pub fn remove(&mut self, id: ComponentId) -> Result<Vec<ComponentId>, ComponentError> {
        if !self.nodes.contains_key(&id) {
            return Err(ComponentError::UnknownComponent { id });
        }
        let removed = self.collect_post_order(id);
        if let Some(parent) = self.parent(id) {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children.retain(|c| *c != id);
            }
        } else {
            self.roots.retain(|r| *r != id);
        }
        for rid in &removed {
            self.nodes.shift_remove(rid);
        }
        self.rebuild_order();
        Ok(removed)
    }

    fn rebuild_order(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            order.extend(self.collect_post_order(*root));
        }
        self.post_order = order;
    }

    fn collect_post_order(&self, root: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().map(|c| (*c, false)));
            }
        }
        out
    }

    fn collect_pre_order(&self, root: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Initialize every not-yet-initialized component under `root`,
    /// parents first.
    pub fn initialize(
        &mut self,
        root: ComponentId,
        day: Day,
        kiosk: &mut VariableKiosk,
        params: &ParameterSet,
        outbox: &mut Outbox,
    ) -> Result<(), ComponentFailure> {
        for id in self.collect_pre_order(root) {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.status != Lifecycle::Created {
                continue;
            }
            let mut ctx = InitContext::new(id, day, kiosk, params, outbox);
            node.component
                .initialize(&mut ctx)
                .map_err(|e| failure(node, id, Phase::Setup, e))?;
            node.status = Lifecycle::Active;
            debug!(component = node.component.name(), %id, %day, "component initialized");
        }
        Ok(())
    }

    /// Compute rates on every active component.
    pub fn calc_rates(
        &mut self,
        day: Day,
        drv: &DrivingData,
        kiosk: &mut VariableKiosk,
        outbox: &mut Outbox,
    ) -> Result<(), ComponentFailure> {
        for id in &self.post_order {
            let Some(node) = active(&mut self.nodes, *id) else {
                continue;
            };
            let mut ctx = RateContext::new(*id, day, kiosk, drv, outbox);
            node.component
                .calc_rates(&mut ctx)
                .map_err(|e| failure(node, *id, Phase::Rates, e))?;
            trace!(component = node.component.name(), "rates computed");
        }
        Ok(())
    }

    /// Integrate states on every active component.
    pub fn integrate(
        &mut self,
        day: Day,
        delta: f64,
        kiosk: &mut VariableKiosk,
        outbox: &mut Outbox,
    ) -> Result<(), ComponentFailure> {
        for id in &self.post_order {
            let Some(node) = active(&mut self.nodes, *id) else {
                continue;
            };
            let mut ctx = IntegrateContext::new(*id, day, kiosk, delta, outbox);
            node.component
                .integrate(&mut ctx)
                .map_err(|e| failure(node, *id, Phase::Integrate, e))?;
            trace!(component = node.component.name(), "states integrated");
        }
        Ok(())
    }

    /// Finalize every active component under `root`, or the whole tree
    /// when `root` is `None`. Finalized components receive no further calls.
    pub fn finalize(
        &mut self,
        root: Option<ComponentId>,
        day: Day,
        kiosk: &mut VariableKiosk,
        outbox: &mut Outbox,
    ) -> Result<(), ComponentFailure> {
        let order = match root {
            Some(root) => self.collect_post_order(root),
            None => self.post_order.clone(),
        };
        for id in order {
            let Some(node) = active(&mut self.nodes, id) else {
                continue;
            };
            let mut ctx = FinalizeContext::new(id, day, kiosk, outbox);
            node.component
                .finalize(&mut ctx)
                .map_err(|e| failure(node, id, Phase::Finalize, e))?;
            node.status = Lifecycle::Finalized;
            debug!(component = node.component.name(), %id, %day, "component finalized");
        }
        Ok(())
    }

    /// Deliver `signal` to every active component subscribed to its topic.
    ///
    /// Returns how many components received it.
    pub fn deliver(
        &mut self,
        signal: &Signal,
        day: Day,
        kiosk: &VariableKiosk,
        outbox: &mut Outbox,
    ) -> Result<usize, ComponentFailure> {
        let kind = signal.kind();
        let mut delivered = 0;
        for id in &self.post_order {
            let Some(node) = active(&mut self.nodes, *id) else {
                continue;
            };
            if !node.component.subscriptions().contains(&kind) {
                continue;
            }
            let mut ctx = SignalContext::new(*id, day, kiosk, outbox);
            node.component
                .on_signal(signal, &mut ctx)
                .map_err(|e| failure(node, *id, Phase::Scheduling, e))?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Route an external override of `name` to component `owner`.
    pub fn set_variable(
        &mut self,
        owner: ComponentId,
        name: &str,
        value: f64,
        day: Day,
        kiosk: &mut VariableKiosk,
        outbox: &mut Outbox,
    ) -> Result<Increments, ComponentFailure> {
        let Some(node) = active(&mut self.nodes, owner) else {
            return Err(ComponentFailure {
                name: self.name(owner).unwrap_or_default().to_owned(),
                id: owner,
                phase: Phase::Override,
                source: ComponentError::UnknownComponent { id: owner },
            });
        };
        let mut ctx = OverrideContext::new(owner, day, kiosk, outbox);
        node.component
            .set_variable(name, value, &mut ctx)
            .map_err(|e| failure(node, owner, Phase::Override, e))
    }
}

impl std::fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<(ComponentId, &str, Lifecycle)> = self
            .post_order
            .iter()
            .filter_map(|id| {
                self.nodes
                    .get(id)
                    .map(|n| (*id, n.component.name(), n.status))
            })
            .collect();
        f.debug_struct("ComponentTree")
            .field("components", &names)
            .finish()
    }
}

fn active(nodes: &mut IndexMap<ComponentId, Node>, id: ComponentId) -> Option<&mut Node> {
    nodes
        .get_mut(&id)
        .filter(|n| n.status == Lifecycle::Active)
}

fn failure(node: &Node, id: ComponentId, phase: Phase, source: ComponentError) -> ComponentFailure {
    ComponentFailure {
        name: node.component.name().to_owned(),
        id,
        phase,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use agrosim_core::EngineId;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Tracer {
        name: &'static str,
        log: Log,
    }

    impl Tracer {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: Rc::clone(log),
            }
        }

        fn record(&self, op: &str) {
            self.log.borrow_mut().push(format!("{op}:{}", self.name));
        }
    }

    impl Component for Tracer {
        fn name(&self) -> &str {
            self.name
        }

        fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
            self.record("init");
            Ok(())
        }

        fn calc_rates(&mut self, _ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
            self.record("rates");
            Ok(())
        }

        fn integrate(&mut self, _ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
            self.record("integrate");
            Ok(())
        }

        fn finalize(&mut self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ComponentError> {
            self.record("finalize");
            Ok(())
        }
    }

    fn day() -> Day {
        Day::from_ymd_opt(2002, 4, 1).unwrap()
    }

    fn crop(log: &Log) -> Subtree {
        Subtree::new(Tracer::new("crop", log))
            .with_child(Subtree::new(Tracer::new("pheno", log)))
            .with_child(
                Subtree::new(Tracer::new("leaves", log))
                    .with_child(Subtree::new(Tracer::new("leaf_age", log))),
            )
    }

    #[test]
    fn traversal_orders() {
        let log = Log::default();
        let mut tree = ComponentTree::new();
        let soil = tree
            .insert(Placement::Last, Subtree::new(Tracer::new("soil", &log)))
            .unwrap();
        let crop_id = tree.insert(Placement::First, crop(&log)).unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.roots(), &[crop_id, soil]);

        let mut kiosk = VariableKiosk::new(EngineId::next());
        let params = ParameterSet::new();
        let mut outbox = Outbox::new();
        tree.initialize(crop_id, day(), &mut kiosk, &params, &mut outbox)
            .unwrap();
        tree.initialize(soil, day(), &mut kiosk, &params, &mut outbox)
            .unwrap();
        tree.calc_rates(day(), &DrivingData::default(), &mut kiosk, &mut outbox)
            .unwrap();

        assert_eq!(
            *log.borrow(),
            [
                "init:crop",
                "init:pheno",
                "init:leaves",
                "init:leaf_age",
                "init:soil",
                "rates:pheno",
                "rates:leaf_age",
                "rates:leaves",
                "rates:crop",
                "rates:soil",
            ]
        );
    }

    #[test]
    fn finalized_components_are_skipped() {
        let log = Log::default();
        let mut tree = ComponentTree::new();
        let crop_id = tree.insert(Placement::Last, crop(&log)).unwrap();
        let mut kiosk = VariableKiosk::new(EngineId::next());
        let params = ParameterSet::new();
        let mut outbox = Outbox::new();
        tree.initialize(crop_id, day(), &mut kiosk, &params, &mut outbox)
            .unwrap();
        tree.finalize(Some(crop_id), day(), &mut kiosk, &mut outbox)
            .unwrap();
        log.borrow_mut().clear();

        tree.calc_rates(day(), &DrivingData::default(), &mut kiosk, &mut outbox)
            .unwrap();
        tree.integrate(day(), 1.0, &mut kiosk, &mut outbox).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(tree.status(crop_id), Some(Lifecycle::Finalized));
    }

    #[test]
    fn remove_drops_whole_subtree() {
        let log = Log::default();
        let mut tree = ComponentTree::new();
        let soil = tree
            .insert(Placement::Last, Subtree::new(Tracer::new("soil", &log)))
            .unwrap();
        let crop_id = tree.insert(Placement::Last, crop(&log)).unwrap();
        let removed = tree.remove(crop_id).unwrap();
        assert_eq!(removed.len(), 4);
        assert_eq!(removed.last(), Some(&crop_id));
        assert_eq!(tree.post_order(), &[soil]);
        assert!(matches!(
            tree.remove(crop_id),
            Err(ComponentError::UnknownComponent { .. })
        ));
    }

    #[test]
    fn ids_are_not_reused() {
        let log = Log::default();
        let mut tree = ComponentTree::new();
        let a = tree
            .insert(Placement::Last, Subtree::new(Tracer::new("a", &log)))
            .unwrap();
        tree.remove(a).unwrap();
        let b = tree
            .insert(Placement::Last, Subtree::new(Tracer::new("b", &log)))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn child_of_unknown_parent_fails() {
        let log = Log::default();
        let mut tree = ComponentTree::new();
        let err = tree
            .insert(
                Placement::ChildOf(ComponentId(42)),
                Subtree::new(Tracer::new("x", &log)),
            )
            .unwrap_err();
        assert_eq!(err, ComponentError::UnknownComponent { id: ComponentId(42) });
    }

    #[test]
    fn override_of_finalized_component_names_it() {
        let log = Log::default();
        let mut tree = ComponentTree::new();
        let crop_id = tree.insert(Placement::Last, crop(&log)).unwrap();
        let mut kiosk = VariableKiosk::new(EngineId::next());
        let params = ParameterSet::new();
        let mut outbox = Outbox::new();
        tree.initialize(crop_id, day(), &mut kiosk, &params, &mut outbox)
            .unwrap();
        tree.finalize(Some(crop_id), day(), &mut kiosk, &mut outbox)
            .unwrap();

        let failure = tree
            .set_variable(crop_id, "LAI", 1.0, day(), &mut kiosk, &mut outbox)
            .unwrap_err();
        assert_eq!(failure.name, "crop");
        assert_eq!(failure.id, crop_id);
        assert_eq!(
            failure.source,
            ComponentError::UnknownComponent { id: crop_id }
        );
    }
}
