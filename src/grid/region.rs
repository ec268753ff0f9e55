//! Regions
//!
//! A region owns the fields, nodes and elements of a mesh together with the shared bases,
//! shapes and time series they use. Objects are addressed by generation-checked handles and
//! indexed by identifier.

use crate::element::basis::{Basis, BasisType};
use crate::element::shape::{Shape, ShapeType};
use crate::evaluation::ElementFieldValues;
use crate::field::{CmFieldType, Field, FieldBuilder, FieldType};
use crate::grid::arena::{Arena, ElementHandle, FieldHandle, NodeHandle};
use crate::grid::element::{Element, ElementBuilder};
use crate::grid::node::{new_node_field, NodalValueKey, Node, NodeFieldLayout};
use crate::time::{TimeSeries, TimeSeriesSet};
use crate::traits::ChangeObserver;
use crate::types::{ElementCategory, ElementIdentifier, Error, FeValue, Result, Value, ValueType};
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::rc::Rc;

fn removed_object<T>(object: Option<T>) -> Result<T> {
    object.ok_or_else(|| Error::InvalidArgument("the object is not in this region".to_string()))
}

/// Options for a region
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOptions {
    /// Tolerance used when clamping xi into an element and finding faces
    xi_tolerance: FeValue,
    /// Whether nodal values at times between stored times are interpolated
    time_interpolation: bool,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            xi_tolerance: 1e-6,
            time_interpolation: true,
        }
    }
}

impl RegionOptions {
    /// Create options with the default values
    pub fn new() -> Self {
        Self::default()
    }

    /// The xi tolerance
    pub fn xi_tolerance(&self) -> FeValue {
        self.xi_tolerance
    }

    /// Set the xi tolerance
    pub fn set_xi_tolerance(&mut self, tolerance: FeValue) -> &mut Self {
        self.xi_tolerance = tolerance;
        self
    }

    /// Are nodal values interpolated in time?
    pub fn time_interpolation(&self) -> bool {
        self.time_interpolation
    }

    /// Set whether nodal values are interpolated in time
    pub fn set_time_interpolation(&mut self, interpolate: bool) -> &mut Self {
        self.time_interpolation = interpolate;
        self
    }
}

/// A change to an object
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Change {
    /// The object was added
    Added,
    /// The definition or values of the object changed
    Changed,
    /// The identifier of the object changed
    IdentifierChanged,
    /// Both the identifier and the definition or values of the object changed
    IdentifierAndDefinitionChanged,
    /// The object was removed
    Removed,
}

impl Change {
    /// Did the identifier change?
    pub fn identifier_changed(&self) -> bool {
        matches!(
            self,
            Change::IdentifierChanged | Change::IdentifierAndDefinitionChanged
        )
    }

    /// Did the definition or values change?
    pub fn definition_changed(&self) -> bool {
        matches!(
            self,
            Change::Changed | Change::IdentifierAndDefinitionChanged
        )
    }

    /// The change recorded when `later` follows this change, or None if the object is
    /// left unchanged
    fn then(self, later: Change) -> Option<Change> {
        Some(match (self, later) {
            (Change::Added, Change::Removed) => return None,
            (Change::Added, _) => Change::Added,
            (_, Change::Removed) | (Change::Removed, _) => Change::Removed,
            (a, b) if a == b => a,
            _ => Change::IdentifierAndDefinitionChanged,
        })
    }
}

/// The changes to one kind of object, in the order the objects were first changed
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectChanges<T: Copy + Eq + Hash> {
    entries: Vec<(T, Change)>,
    index: HashMap<T, usize>,
}

impl<T: Copy + Eq + Hash> Default for ObjectChanges<T> {
    fn default() -> Self {
        Self {
            entries: vec![],
            index: HashMap::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> ObjectChanges<T> {
    fn record(&mut self, object: T, change: Change) {
        let Some(&i) = self.index.get(&object) else {
            self.index.insert(object, self.entries.len());
            self.entries.push((object, change));
            return;
        };
        match self.entries[i].1.then(change) {
            Some(combined) => self.entries[i].1 = combined,
            None => {
                self.entries.remove(i);
                self.index.remove(&object);
                for (o, _) in &self.entries[i..] {
                    if let Some(j) = self.index.get_mut(o) {
                        *j -= 1;
                    }
                }
            }
        }
    }

    /// The changed objects
    pub fn entries(&self) -> &[(T, Change)] {
        &self.entries
    }

    /// The change to an object, if any
    pub fn get(&self, object: T) -> Option<Change> {
        self.index.get(&object).map(|i| self.entries[*i].1)
    }

    /// Is there no change?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The changes made to a region since observers were last notified
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangeLog {
    fields: ObjectChanges<FieldHandle>,
    nodes: ObjectChanges<NodeHandle>,
    elements: ObjectChanges<ElementHandle>,
}

impl ChangeLog {
    /// The changed fields
    pub fn fields(&self) -> &[(FieldHandle, Change)] {
        self.fields.entries()
    }

    /// The changed nodes
    pub fn nodes(&self) -> &[(NodeHandle, Change)] {
        self.nodes.entries()
    }

    /// The changed elements
    pub fn elements(&self) -> &[(ElementHandle, Change)] {
        self.elements.entries()
    }

    /// The change to a field, if any
    pub fn field_change(&self, field: FieldHandle) -> Option<Change> {
        self.fields.get(field)
    }

    /// The change to a node, if any
    pub fn node_change(&self, node: NodeHandle) -> Option<Change> {
        self.nodes.get(node)
    }

    /// The change to an element, if any
    pub fn element_change(&self, element: ElementHandle) -> Option<Change> {
        self.elements.get(element)
    }

    /// Is the log empty?
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.nodes.is_empty() && self.elements.is_empty()
    }
}

/// A region
#[derive(Default)]
pub struct Region {
    options: RegionOptions,
    bases: HashMap<BasisType, Rc<Basis>>,
    shapes: HashMap<ShapeType, Rc<Shape>>,
    unspecified_shapes: HashMap<usize, Rc<Shape>>,
    time_series: TimeSeriesSet,
    fields: Arena<Field>,
    field_names: BTreeMap<String, FieldHandle>,
    nodes: Arena<Node>,
    node_identifiers: BTreeMap<i32, NodeHandle>,
    elements: Arena<Element>,
    element_identifiers: BTreeMap<ElementIdentifier, ElementHandle>,
    changes: ChangeLog,
    change_depth: usize,
    observers: Vec<Rc<RefCell<dyn ChangeObserver>>>,
}

impl Region {
    /// Create an empty region
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty region with options
    pub fn with_options(options: RegionOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// The options
    pub fn options(&self) -> &RegionOptions {
        &self.options
    }

    /// The options, for modification
    pub fn options_mut(&mut self) -> &mut RegionOptions {
        &mut self.options
    }

    // Bases, shapes and time series

    /// The basis with a description, created if it does not exist
    pub fn get_basis(&mut self, basis_type: &BasisType) -> Rc<Basis> {
        Rc::clone(
            self.bases
                .entry(basis_type.clone())
                .or_insert_with(|| Rc::new(Basis::new(basis_type.clone()))),
        )
    }

    /// The number of distinct bases
    pub fn number_of_bases(&self) -> usize {
        self.bases.len()
    }

    /// The shape with a type, created if it does not exist
    pub fn get_shape(&mut self, shape_type: &ShapeType) -> Rc<Shape> {
        Rc::clone(
            self.shapes
                .entry(shape_type.clone())
                .or_insert_with(|| Rc::new(Shape::new(shape_type.clone()))),
        )
    }

    /// The unspecified shape of a dimension
    pub fn get_unspecified_shape(&mut self, dimension: usize) -> Rc<Shape> {
        Rc::clone(
            self.unspecified_shapes
                .entry(dimension)
                .or_insert_with(|| Rc::new(Shape::unspecified(dimension))),
        )
    }

    /// The time series with exactly these times, created if it does not exist
    pub fn get_time_series(&mut self, times: &[FeValue]) -> Result<Rc<TimeSeries>> {
        self.time_series.get_or_create_matching(times)
    }

    /// The time series of the region
    pub fn time_series(&self) -> &TimeSeriesSet {
        &self.time_series
    }

    // Change notification

    /// Add an observer notified of changes
    pub fn add_observer(&mut self, observer: Rc<RefCell<dyn ChangeObserver>>) {
        self.observers.push(observer);
    }

    /// Start a batch of changes; observers are notified when the batch ends
    pub fn begin_change(&mut self) {
        self.change_depth += 1;
    }

    /// End a batch of changes
    pub fn end_change(&mut self) {
        self.change_depth = self.change_depth.saturating_sub(1);
        self.notify();
    }

    fn notify(&mut self) {
        if self.change_depth > 0 || self.changes.is_empty() {
            return;
        }
        let changes = std::mem::take(&mut self.changes);
        for observer in &self.observers {
            observer.borrow_mut().region_changed(&changes);
        }
    }

    fn field_changed(&mut self, field: FieldHandle, change: Change) {
        self.changes.fields.record(field, change);
        self.notify();
    }

    fn node_changed(&mut self, node: NodeHandle, change: Change) {
        self.changes.nodes.record(node, change);
        self.notify();
    }

    fn element_changed(&mut self, element: ElementHandle, change: Change) {
        self.changes.elements.record(element, change);
        self.notify();
    }

    // Fields

    /// Add a field; its name must not be used by another field of the region
    pub fn add_field(&mut self, field: Field) -> Result<FieldHandle> {
        if self.field_names.contains_key(field.name()) {
            return Err(Error::InvalidArgument(format!(
                "a field named '{}' already exists",
                field.name()
            )));
        }
        let field = self.share_field_structures(None, field)?;
        let name = field.name().to_string();
        let handle = self.fields.insert(field);
        self.field_names.insert(name, handle);
        debug!("Added field {handle:?}");
        self.field_changed(handle, Change::Added);
        Ok(handle)
    }

    /// Check the indexer of a field, which replaces the field `handle` if given, and share
    /// its time series
    fn share_field_structures(
        &mut self,
        handle: Option<FieldHandle>,
        field: Field,
    ) -> Result<Field> {
        if let FieldType::Indexed { indexer, .. } = field.field_type() {
            let valid = self
                .fields
                .get(*indexer)
                .map(|f| f.number_of_components() == 1 && f.value_type() == ValueType::Int)
                .unwrap_or(false);
            if !valid {
                return Err(Error::InvalidArgument(format!(
                    "the indexer of field '{}' must be a single component integer field of \
                     the region",
                    field.name()
                )));
            }
            if let Some(handle) = handle {
                self.check_indexer_chain(handle, *indexer, field.name())?;
            }
        }
        match field.time_series() {
            Some(series) if !self.time_series.contains(series) => {
                let series = self.time_series.get_or_create_matching(series.times())?;
                FieldBuilder::from_field(&field)
                    .time_series(Some(series))
                    .build()
            }
            _ => Ok(field),
        }
    }

    /// Follow the indexers from `indexer` and fail if they lead back to `field`
    fn check_indexer_chain(
        &self,
        field: FieldHandle,
        mut indexer: FieldHandle,
        name: &str,
    ) -> Result<()> {
        for _ in 0..=self.fields.len() {
            if indexer == field {
                return Err(Error::InvalidArgument(format!(
                    "field '{name}' cannot be indexed by itself"
                )));
            }
            match self.fields.get(indexer).map(Field::field_type) {
                Some(FieldType::Indexed { indexer: next, .. }) => indexer = *next,
                _ => return Ok(()),
            }
        }
        Err(Error::InvalidArgument(format!(
            "the indexers of field '{name}' form a cycle"
        )))
    }

    /// A field
    pub fn field(&self, field: FieldHandle) -> Option<&Field> {
        self.fields.get(field)
    }

    fn require_field(&self, field: FieldHandle) -> Result<&Field> {
        self.fields
            .get(field)
            .ok_or_else(|| Error::InvalidArgument("the field is not in this region".to_string()))
    }

    /// Find a field by name
    pub fn find_field_by_name(&self, name: &str) -> Option<FieldHandle> {
        self.field_names.get(name).copied()
    }

    /// The fields, in name order
    pub fn fields(&self) -> impl Iterator<Item = (FieldHandle, &Field)> {
        self.field_names
            .values()
            .filter_map(|h| self.fields.get(*h).map(|f| (*h, f)))
    }

    /// The number of fields
    pub fn number_of_fields(&self) -> usize {
        self.fields.len()
    }

    /// Is a field used by a node, an element or an indexed field?
    pub fn is_field_in_use(&self, field: FieldHandle) -> bool {
        self.nodes.iter().any(|(_, n)| n.has_field(field))
            || self.elements.iter().any(|(_, e)| e.has_field(field))
            || self.fields.iter().any(|(_, f)| {
                matches!(f.field_type(), FieldType::Indexed { indexer, .. } if *indexer == field)
            })
    }

    /// Rename a field
    pub fn rename_field(&mut self, field: FieldHandle, name: &str) -> Result<()> {
        let old = self.require_field(field)?.name().to_string();
        if old == name {
            return Ok(());
        }
        if name.is_empty() || self.field_names.contains_key(name) {
            return Err(Error::InvalidArgument(format!(
                "cannot rename field '{old}' to '{name}'"
            )));
        }
        if let Some(f) = self.fields.get_mut(field) {
            f.set_name(name);
        }
        self.field_names.remove(&old);
        self.field_names.insert(name.to_string(), field);
        self.field_changed(field, Change::IdentifierChanged);
        Ok(())
    }

    /// Replace the definition of a field
    ///
    /// A field in use may only be given a definition with the same structure. The name
    /// of the new definition is ignored.
    pub fn modify_field(&mut self, field: FieldHandle, definition: Field) -> Result<()> {
        let existing = self.require_field(field)?;
        let name = existing.name().to_string();
        if self.is_field_in_use(field) && !existing.has_same_structure(&definition) {
            warn!("Cannot change the structure of field '{name}' while it is in use");
            return Err(Error::IncompatibleStructure(format!(
                "field '{name}' is in use"
            )));
        }
        let mut definition = self.share_field_structures(Some(field), definition)?;
        definition.set_name(&name);
        if let Some(f) = self.fields.get_mut(field) {
            *f = definition;
        }
        self.field_changed(field, Change::Changed);
        Ok(())
    }

    /// Remove a field that is not in use
    pub fn remove_field(&mut self, field: FieldHandle) -> Result<Field> {
        self.require_field(field)?;
        if self.is_field_in_use(field) {
            return Err(Error::IncompatibleStructure(
                "cannot remove a field in use".to_string(),
            ));
        }
        let removed = self
            .fields
            .remove(field)
            .ok_or_else(|| Error::InvalidArgument("the field is not in this region".to_string()))?;
        self.field_names.remove(removed.name());
        self.field_changed(field, Change::Removed);
        Ok(removed)
    }

    /// The field used for coordinates by default
    ///
    /// This is the first coordinate field by name, or else the first general real field with
    /// at most three components.
    pub fn default_coordinate_field(&self) -> Option<FieldHandle> {
        self.fields()
            .find(|(_, f)| f.cm_field_type() == CmFieldType::Coordinate)
            .or_else(|| {
                self.fields().find(|(_, f)| {
                    f.is_general()
                        && f.value_type() == ValueType::FeValue
                        && f.number_of_components() <= 3
                })
            })
            .map(|(h, _)| h)
    }

    // Nodes

    fn check_node(&self, node: &Node) -> Result<()> {
        for node_field in node.fields() {
            let field = self.require_field(node_field.field())?;
            if !field.is_general()
                || field.number_of_components() != node_field.layout().number_of_components()
                || field.value_type() != node_field.storage().value_type()
            {
                return Err(Error::IncompatibleStructure(format!(
                    "node {} does not match the definition of field '{}'",
                    node.identifier(),
                    field.name()
                )));
            }
        }
        Ok(())
    }

    /// Add a node; its identifier must not be used by another node of the region
    pub fn add_node(&mut self, mut node: Node) -> Result<NodeHandle> {
        if self.node_identifiers.contains_key(&node.identifier()) {
            return Err(Error::InvalidArgument(format!(
                "node {} already exists",
                node.identifier()
            )));
        }
        self.check_node(&node)?;
        node.share_time_series(&mut self.time_series)?;
        let identifier = node.identifier();
        let handle = self.nodes.insert(node);
        self.node_identifiers.insert(identifier, handle);
        self.node_changed(handle, Change::Added);
        Ok(handle)
    }

    /// Merge a node into the node with the same identifier, or add it if there is none
    ///
    /// Nothing is changed if the merge fails.
    pub fn merge_node(&mut self, mut node: Node) -> Result<NodeHandle> {
        let Some(handle) = self.find_node(node.identifier()) else {
            return self.add_node(node);
        };
        self.check_node(&node)?;
        node.share_time_series(&mut self.time_series)?;
        let existing = removed_object(self.nodes.get(handle))?;
        let merged = existing.merged(&node, &mut self.time_series)?;
        if let Some(n) = self.nodes.get_mut(handle) {
            *n = merged;
        }
        debug!("Merged node {}", node.identifier());
        self.node_changed(handle, Change::Changed);
        Ok(handle)
    }

    /// A node
    pub fn node(&self, node: NodeHandle) -> Option<&Node> {
        self.nodes.get(node)
    }

    fn require_node(&self, node: NodeHandle) -> Result<&Node> {
        self.nodes
            .get(node)
            .ok_or_else(|| Error::InvalidArgument("the node is not in this region".to_string()))
    }

    fn require_node_mut(&mut self, node: NodeHandle) -> Result<&mut Node> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| Error::InvalidArgument("the node is not in this region".to_string()))
    }

    /// Find a node by identifier
    pub fn find_node(&self, identifier: i32) -> Option<NodeHandle> {
        self.node_identifiers.get(&identifier).copied()
    }

    /// The nodes, in identifier order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.node_identifiers
            .values()
            .filter_map(|h| self.nodes.get(*h).map(|n| (*h, n)))
    }

    /// The number of nodes
    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The nodes satisfying a predicate, in identifier order
    pub fn nodes_where(&self, predicate: impl Fn(&Node) -> bool) -> Vec<NodeHandle> {
        self.nodes()
            .filter(|(_, n)| predicate(n))
            .map(|(h, _)| h)
            .collect()
    }

    /// The smallest unused node identifier not less than `start`
    pub fn next_free_node_identifier(&self, start: i32) -> i32 {
        let mut identifier = start;
        while self.node_identifiers.contains_key(&identifier) {
            identifier += 1;
        }
        identifier
    }

    /// Change the identifier of a node
    pub fn change_node_identifier(&mut self, node: NodeHandle, identifier: i32) -> Result<()> {
        let old = self.require_node(node)?.identifier();
        if old == identifier {
            return Ok(());
        }
        if self.node_identifiers.contains_key(&identifier) {
            return Err(Error::InvalidArgument(format!(
                "node {identifier} already exists"
            )));
        }
        self.require_node_mut(node)?.set_identifier(identifier);
        self.node_identifiers.remove(&old);
        self.node_identifiers.insert(identifier, node);
        self.node_changed(node, Change::IdentifierChanged);
        Ok(())
    }

    /// Remove a node that no element references
    pub fn remove_node(&mut self, node: NodeHandle) -> Result<Node> {
        self.require_node(node)?;
        if let Some((_, element)) = self.elements.iter().find(|(_, e)| e.references_node(node)) {
            return Err(Error::IncompatibleStructure(format!(
                "the node is used by {}",
                element.identifier()
            )));
        }
        let removed = removed_object(self.nodes.remove(node))?;
        self.node_identifiers.remove(&removed.identifier());
        self.node_changed(node, Change::Removed);
        Ok(removed)
    }

    /// Define a field on a node of the region
    pub fn define_field_at_node(
        &mut self,
        node: NodeHandle,
        field: FieldHandle,
        layout: NodeFieldLayout,
        time_series: Option<Rc<TimeSeries>>,
    ) -> Result<()> {
        let definition = self.require_field(field)?;
        if !definition.is_general()
            || layout.number_of_components() != definition.number_of_components()
        {
            return Err(Error::InvalidArgument(format!(
                "cannot define field '{}' at a node with this layout",
                definition.name()
            )));
        }
        let time_series = match time_series.or_else(|| definition.time_series().cloned()) {
            Some(series) => Some(self.time_series.get_or_create_matching(series.times())?),
            None => None,
        };
        let definition = self.require_field(field)?;
        let node_field = new_node_field(field, definition, layout, time_series);
        self.require_node_mut(node)?.define_field(node_field)?;
        self.node_changed(node, Change::Changed);
        Ok(())
    }

    /// Remove a field from a node of the region
    ///
    /// Fails if an element uses the field's values at the node.
    pub fn undefine_field_at_node(&mut self, node: NodeHandle, field: FieldHandle) -> Result<()> {
        self.require_node(node)?;
        if let Some((_, element)) = self
            .elements
            .iter()
            .find(|(_, e)| e.field_uses_node(field, node))
        {
            return Err(Error::IncompatibleStructure(format!(
                "the field is used at the node by {}",
                element.identifier()
            )));
        }
        self.require_node_mut(node)?.undefine_field(field)?;
        self.node_changed(node, Change::Changed);
        Ok(())
    }

    /// The fields defined on a node
    pub fn fields_at_node(&self, node: NodeHandle) -> Result<Vec<FieldHandle>> {
        Ok(self.require_node(node)?.fields().map(|f| f.field()).collect())
    }

    /// Get a value at a node
    ///
    /// Between stored times the value is interpolated if the region options allow it,
    /// otherwise the time must be one of the stored times.
    pub fn nodal_value(
        &self,
        node: NodeHandle,
        field: FieldHandle,
        key: &NodalValueKey,
        time: FeValue,
    ) -> Result<Value> {
        let node = self.require_node(node)?;
        if self.options.time_interpolation {
            node.value(field, key, time)
        } else {
            node.value_exact(field, key, time)
        }
    }

    /// Set a value at a node at a stored time
    pub fn set_nodal_value(
        &mut self,
        node: NodeHandle,
        field: FieldHandle,
        key: &NodalValueKey,
        time: FeValue,
        value: Value,
    ) -> Result<()> {
        self.require_node_mut(node)?
            .set_value(field, key, time, value)?;
        self.node_changed(node, Change::Changed);
        Ok(())
    }

    /// Replace all the stored values of a field at a node
    pub fn set_nodal_values(
        &mut self,
        node: NodeHandle,
        field: FieldHandle,
        values: &[Value],
    ) -> Result<()> {
        self.require_node_mut(node)?.set_values(field, values)?;
        self.node_changed(node, Change::Changed);
        Ok(())
    }

    // Elements

    fn check_element(&self, element: &Element) -> Result<()> {
        if let Some(i) = element
            .nodes()
            .iter()
            .flatten()
            .position(|n| !self.nodes.contains(*n))
        {
            return Err(Error::InvalidArgument(format!(
                "node {} of {} is not in this region",
                i + 1,
                element.identifier()
            )));
        }
        for element_field in element.fields() {
            let field = self.require_field(element_field.field())?;
            if !field.is_general()
                || field.number_of_components() != element_field.components().len()
                || field.value_type() != element_field.grid_values().value_type()
            {
                return Err(Error::IncompatibleStructure(format!(
                    "{} does not match the definition of field '{}'",
                    element.identifier(),
                    field.name()
                )));
            }
        }
        let related = element
            .faces()
            .iter()
            .flatten()
            .chain(element.parents().iter().map(|(p, _)| p));
        if related.into_iter().any(|e| !self.elements.contains(*e)) {
            return Err(Error::InvalidArgument(format!(
                "a face or parent of {} is not in this region",
                element.identifier()
            )));
        }
        Ok(())
    }

    fn share_element_structures(&mut self, element: &mut Element) {
        let Self {
            bases,
            shapes,
            unspecified_shapes,
            ..
        } = self;
        element.share_structures(
            |shape| match shape.shape_type() {
                Some(shape_type) => Rc::clone(
                    shapes
                        .entry(shape_type.clone())
                        .or_insert_with(|| Rc::clone(shape)),
                ),
                None => Rc::clone(
                    unspecified_shapes
                        .entry(shape.dimension())
                        .or_insert_with(|| Rc::clone(shape)),
                ),
            },
            |basis| {
                Rc::clone(
                    bases
                        .entry(basis.basis_type().clone())
                        .or_insert_with(|| Rc::clone(basis)),
                )
            },
        );
    }

    fn link_faces(&mut self, handle: ElementHandle) {
        let Some(element) = self.elements.get(handle) else {
            return;
        };
        let links = element
            .faces()
            .iter()
            .enumerate()
            .filter_map(|(face, e)| e.map(|e| (face, e)))
            .collect::<Vec<_>>();
        let parents = element.parents().to_vec();
        for (face, face_element) in links {
            if let Some(f) = self.elements.get_mut(face_element) {
                f.add_parent(handle, face);
            }
        }
        // A parent keeps its existing face; the link back to it is dropped
        let mut unlinked = vec![];
        for (parent, face) in parents {
            let linked = match self.elements.get_mut(parent) {
                Some(p) => match p.face(face) {
                    Some(existing) => existing == handle,
                    None => p.set_face(face, Some(handle)).is_ok(),
                },
                None => false,
            };
            if !linked {
                unlinked.push((parent, face));
            }
        }
        if let Some(element) = self.elements.get_mut(handle) {
            for (parent, face) in unlinked {
                warn!(
                    "{} is not face {face} of its parent, the link is dropped",
                    element.identifier()
                );
                element.remove_parent_link(parent, face);
            }
        }
    }

    /// Add an element; its identifier must not be used by another element of the region
    pub fn add_element(&mut self, mut element: Element) -> Result<ElementHandle> {
        if self.element_identifiers.contains_key(&element.identifier()) {
            return Err(Error::InvalidArgument(format!(
                "{} already exists",
                element.identifier()
            )));
        }
        self.check_element(&element)?;
        self.share_element_structures(&mut element);
        let identifier = element.identifier();
        let handle = self.elements.insert(element);
        self.element_identifiers.insert(identifier, handle);
        self.link_faces(handle);
        self.element_changed(handle, Change::Added);
        Ok(handle)
    }

    /// Merge an element into the element with the same identifier, or add it if there is none
    ///
    /// Nothing is changed if the merge fails.
    pub fn merge_element(&mut self, element: Element) -> Result<ElementHandle> {
        let Some(handle) = self.find_element(element.identifier()) else {
            return self.add_element(element);
        };
        self.check_element(&element)?;
        let mut merged = self.require_element(handle)?.merged(&element)?;
        self.share_element_structures(&mut merged);
        if let Some(e) = self.elements.get_mut(handle) {
            *e = merged;
        }
        self.link_faces(handle);
        debug!("Merged {}", element.identifier());
        self.element_changed(handle, Change::Changed);
        Ok(handle)
    }

    /// An element
    pub fn element(&self, element: ElementHandle) -> Option<&Element> {
        self.elements.get(element)
    }

    fn require_element(&self, element: ElementHandle) -> Result<&Element> {
        self.elements.get(element).ok_or_else(|| {
            Error::InvalidArgument("the element is not in this region".to_string())
        })
    }

    fn require_element_mut(&mut self, element: ElementHandle) -> Result<&mut Element> {
        self.elements.get_mut(element).ok_or_else(|| {
            Error::InvalidArgument("the element is not in this region".to_string())
        })
    }

    /// Find an element by identifier
    pub fn find_element(&self, identifier: ElementIdentifier) -> Option<ElementHandle> {
        self.element_identifiers.get(&identifier).copied()
    }

    /// The elements, in identifier order
    pub fn elements(&self) -> impl Iterator<Item = (ElementHandle, &Element)> {
        self.element_identifiers
            .values()
            .filter_map(|h| self.elements.get(*h).map(|e| (*h, e)))
    }

    /// The number of elements
    pub fn number_of_elements(&self) -> usize {
        self.elements.len()
    }

    /// The elements satisfying a predicate, in identifier order
    pub fn elements_where(&self, predicate: impl Fn(&Element) -> bool) -> Vec<ElementHandle> {
        self.elements()
            .filter(|(_, e)| predicate(e))
            .map(|(h, _)| h)
            .collect()
    }

    /// The elements referencing a node, in identifier order
    pub fn elements_using_node(&self, node: NodeHandle) -> Vec<ElementHandle> {
        self.elements_where(|e| e.references_node(node))
    }

    /// Is an element top level, with no parents?
    pub fn is_top_level(&self, element: ElementHandle) -> Result<bool> {
        Ok(self.require_element(element)?.is_top_level())
    }

    /// The fields defined directly on an element
    pub fn fields_at_element(&self, element: ElementHandle) -> Result<Vec<FieldHandle>> {
        Ok(self
            .require_element(element)?
            .fields()
            .map(|f| f.field())
            .collect())
    }

    /// The smallest unused element number of a category not less than `start`
    pub fn next_free_element_number(&self, category: ElementCategory, start: i32) -> i32 {
        let mut number = start;
        while self
            .element_identifiers
            .contains_key(&ElementIdentifier::new(category, number))
        {
            number += 1;
        }
        number
    }

    /// Change the identifier of an element
    pub fn change_element_identifier(
        &mut self,
        element: ElementHandle,
        identifier: ElementIdentifier,
    ) -> Result<()> {
        let old = self.require_element(element)?.identifier();
        if old == identifier {
            return Ok(());
        }
        if self.element_identifiers.contains_key(&identifier) {
            return Err(Error::InvalidArgument(format!("{identifier} already exists")));
        }
        self.require_element_mut(element)?.set_identifier(identifier);
        self.element_identifiers.remove(&old);
        self.element_identifiers.insert(identifier, element);
        self.element_changed(element, Change::IdentifierChanged);
        Ok(())
    }

    /// Remove an element
    ///
    /// The element is removed from the faces of its parents; faces left without a parent
    /// are removed too.
    pub fn remove_element(&mut self, element: ElementHandle) -> Result<Element> {
        self.require_element(element)?;
        self.begin_change();
        let mut queue = VecDeque::from([element]);
        let mut first = None;
        while let Some(handle) = queue.pop_front() {
            let Some(removed) = self.elements.remove(handle) else {
                continue;
            };
            self.element_identifiers.remove(&removed.identifier());
            for (parent, _) in removed.parents() {
                if let Some(p) = self.elements.get_mut(*parent) {
                    p.clear_face_references(handle);
                }
            }
            for face in removed.faces().iter().flatten() {
                if let Some(f) = self.elements.get_mut(*face) {
                    f.remove_parent(handle);
                    if f.is_top_level() {
                        queue.push_back(*face);
                    }
                }
            }
            self.element_changed(handle, Change::Removed);
            if first.is_none() {
                first = Some(removed);
            }
        }
        self.end_change();
        removed_object(first)
    }

    /// Set a face of an element
    ///
    /// The face element must have one dimension fewer than the element. Any previous face is
    /// unlinked from the element but not removed.
    pub fn set_element_face(
        &mut self,
        element: ElementHandle,
        face: usize,
        face_element: ElementHandle,
    ) -> Result<()> {
        let parent = self.require_element(element)?;
        let child = self.require_element(face_element)?;
        if child.dimension() + 1 != parent.dimension() {
            return Err(Error::InvalidArgument(format!(
                "{} cannot be a face of {}",
                child.identifier(),
                parent.identifier()
            )));
        }
        let previous = parent.face(face);
        self.require_element_mut(element)?
            .set_face(face, Some(face_element))?;
        if let Some(previous) = previous.filter(|p| *p != face_element) {
            if let Some(p) = self.elements.get_mut(previous) {
                p.remove_parent(element);
            }
        }
        self.require_element_mut(face_element)?
            .add_parent(element, face);
        self.element_changed(element, Change::Changed);
        self.element_changed(face_element, Change::Changed);
        Ok(())
    }

    /// Create elements for the faces of an element that have none, and for their faces
    ///
    /// Returns the created elements. New faces are not shared with other elements.
    pub fn define_faces(&mut self, element: ElementHandle) -> Result<Vec<ElementHandle>> {
        let mut created = vec![];
        self.begin_change();
        let result = self.define_faces_recursive(element, &mut created);
        self.end_change();
        result.map(|_| created)
    }

    fn define_faces_recursive(
        &mut self,
        element: ElementHandle,
        created: &mut Vec<ElementHandle>,
    ) -> Result<()> {
        let parent = self.require_element(element)?;
        let shape = Rc::clone(parent.shape());
        if shape.dimension() < 2 || !shape.is_specified() {
            return Ok(());
        }
        let category = ElementCategory::for_face_of_dimension(shape.dimension() - 1);
        for face in 0..shape.number_of_faces() {
            let existing = self.require_element(element)?.face(face);
            let face_element = match existing {
                Some(e) => e,
                None => {
                    let face_shape = self.get_shape(&shape.face_shape_type(face)?);
                    let number = self.next_free_element_number(category, 1);
                    let identifier = ElementIdentifier::new(category, number);
                    let new = ElementBuilder::new(identifier, face_shape).finalize();
                    let handle = self.add_element(new)?;
                    self.set_element_face(element, face, handle)?;
                    created.push(handle);
                    handle
                }
            };
            self.define_faces_recursive(face_element, created)?;
        }
        Ok(())
    }

    /// Set a scale factor of an element
    pub fn set_scale_factor(
        &mut self,
        element: ElementHandle,
        index: usize,
        value: FeValue,
    ) -> Result<()> {
        self.require_element_mut(element)?
            .set_scale_factor(index, value)?;
        self.element_changed(element, Change::Changed);
        Ok(())
    }

    /// Set the value at a grid point of a grid based component on an element
    pub fn set_grid_value(
        &mut self,
        element: ElementHandle,
        field: FieldHandle,
        component: usize,
        grid_point: usize,
        value: Value,
    ) -> Result<()> {
        self.require_element_mut(element)?
            .set_grid_value(field, component, grid_point, value)?;
        self.element_changed(element, Change::Changed);
        Ok(())
    }

    /// The elements with any ancestor relationship to an element: its parents, their
    /// parents and so on, each listed once in breadth first order
    pub fn ancestors(&self, element: ElementHandle) -> Result<Vec<ElementHandle>> {
        let mut visited = HashSet::from([element]);
        let mut queue = VecDeque::from([element]);
        let mut ancestors = vec![];
        while let Some(handle) = queue.pop_front() {
            for (parent, _) in self.require_element(handle)?.parents() {
                if visited.insert(*parent) {
                    ancestors.push(*parent);
                    queue.push_back(*parent);
                }
            }
        }
        Ok(ancestors)
    }

    // Evaluation

    /// The values of the components of a field at a node at a time
    ///
    /// General fields give the first version of each component's value.
    pub fn evaluate_at_node(
        &self,
        node: NodeHandle,
        field: FieldHandle,
        time: FeValue,
    ) -> Result<Vec<FeValue>> {
        let definition = self.require_field(field)?;
        let numeric = |value: Value| {
            value.as_fe_value().ok_or_else(|| {
                Error::InvalidArgument(format!("field '{}' is not numeric", definition.name()))
            })
        };
        (0..definition.number_of_components())
            .map(|component| match definition.field_type() {
                FieldType::Constant(_) => numeric(definition.constant_value(component)?),
                FieldType::Indexed { indexer, .. } => {
                    let index = self.evaluate_at_node(node, *indexer, time)?[0].round() as i32;
                    numeric(definition.indexed_value(component, index)?)
                }
                FieldType::General => numeric(self.nodal_value(
                    node,
                    field,
                    &NodalValueKey::value(component),
                    time,
                )?),
            })
            .collect()
    }

    /// The values of the components of a field at a point in an element at a time, and
    /// optionally the derivatives of each component with respect to xi
    ///
    /// Points outside the element by less than the region's xi tolerance are moved into
    /// the element. The Jacobian is stored by component, with xi varying fastest.
    pub fn evaluate_in_element(
        &self,
        element: ElementHandle,
        field: FieldHandle,
        xi: &[FeValue],
        time: FeValue,
        want_jacobian: bool,
    ) -> Result<(Vec<FeValue>, Option<Vec<FeValue>>)> {
        let shape = self.require_element(element)?.shape();
        let mut xi = xi.to_vec();
        if shape.is_specified() {
            shape.clamp_xi(&mut xi, self.options.xi_tolerance)?;
        }
        let mut cache = ElementFieldValues::new();
        cache.calculate(self, element, field, time, want_jacobian, None)?;
        let n = cache.number_of_components();
        let mut values = vec![0.0; n];
        if want_jacobian {
            let mut jacobian = vec![0.0; n * xi.len()];
            cache.evaluate(None, &xi, &mut values, Some(&mut jacobian))?;
            Ok((values, Some(jacobian)))
        } else {
            cache.evaluate(None, &xi, &mut values, None)?;
            Ok((values, None))
        }
    }
}
