//! Elements

use crate::element::basis::{Basis, BasisType};
use crate::element::shape::Shape;
use crate::field::Field;
use crate::grid::arena::{ElementHandle, FieldHandle, NodeHandle};
use crate::grid::maps::ElementFieldComponent;
use crate::grid::value_storage::ValueStorage;
use crate::types::{ElementIdentifier, Error, FeValue, Result, Value};
use log::warn;
use std::rc::Rc;

/// What a set of scale factors is for
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum ScaleFactorSetIdentifier {
    /// Scale factors used with a basis
    Basis(BasisType),
    /// Scale factors identified by name
    Name(String),
}

/// A set of consecutive scale factors of an element
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct ScaleFactorSet {
    /// The identifier
    pub identifier: ScaleFactorSetIdentifier,
    /// The number of scale factors
    pub count: usize,
}

/// The definition of a field on an element
#[derive(Debug, PartialEq, Clone)]
pub struct ElementField {
    field: FieldHandle,
    components: Vec<ElementFieldComponent>,
    grid_values: ValueStorage,
}

impl ElementField {
    /// The field
    pub fn field(&self) -> FieldHandle {
        self.field
    }

    /// The components
    pub fn components(&self) -> &[ElementFieldComponent] {
        &self.components
    }

    /// A component
    pub fn component(&self, component: usize) -> Option<&ElementFieldComponent> {
        self.components.get(component)
    }

    /// The values stored at grid points for grid based components
    pub fn grid_values(&self) -> &ValueStorage {
        &self.grid_values
    }

    /// Is any component grid based?
    pub fn is_grid_based(&self) -> bool {
        self.components.iter().any(|c| c.grid_map().is_some())
    }
}

/// An element
#[derive(Debug, Clone)]
pub struct Element {
    identifier: ElementIdentifier,
    shape: Rc<Shape>,
    nodes: Vec<Option<NodeHandle>>,
    scale_factor_sets: Vec<ScaleFactorSet>,
    scale_factors: Vec<FeValue>,
    fields: Vec<ElementField>,
    faces: Vec<Option<ElementHandle>>,
    parents: Vec<(ElementHandle, usize)>,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.shape.dimension() == other.shape.dimension()
            && self.shape.shape_type() == other.shape.shape_type()
            && self.nodes == other.nodes
            && self.scale_factor_sets == other.scale_factor_sets
            && self.scale_factors == other.scale_factors
            && self.fields == other.fields
            && self.faces == other.faces
            && self.parents == other.parents
    }
}

impl Element {
    /// The identifier
    pub fn identifier(&self) -> ElementIdentifier {
        self.identifier
    }

    pub(crate) fn set_identifier(&mut self, identifier: ElementIdentifier) {
        self.identifier = identifier;
    }

    /// The shape
    pub fn shape(&self) -> &Rc<Shape> {
        &self.shape
    }

    /// The topological dimension
    pub fn dimension(&self) -> usize {
        self.shape.dimension()
    }

    /// The number of nodes
    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// A node
    pub fn node(&self, index: usize) -> Option<NodeHandle> {
        self.nodes.get(index).copied().flatten()
    }

    /// The nodes; a position is None if no node has been set there
    pub fn nodes(&self) -> &[Option<NodeHandle>] {
        &self.nodes
    }

    /// Does the element reference a node?
    pub fn references_node(&self, node: NodeHandle) -> bool {
        self.nodes.contains(&Some(node))
    }

    /// The scale factor sets
    pub fn scale_factor_sets(&self) -> &[ScaleFactorSet] {
        &self.scale_factor_sets
    }

    /// The number of scale factors
    pub fn number_of_scale_factors(&self) -> usize {
        self.scale_factors.len()
    }

    /// A scale factor
    pub fn scale_factor(&self, index: usize) -> Option<FeValue> {
        self.scale_factors.get(index).copied()
    }

    /// The scale factors
    pub fn scale_factors(&self) -> &[FeValue] {
        &self.scale_factors
    }

    /// Set a scale factor
    pub fn set_scale_factor(&mut self, index: usize, value: FeValue) -> Result<()> {
        let n = self.scale_factors.len();
        let slot = self.scale_factors.get_mut(index).ok_or_else(|| {
            Error::InvalidArgument(format!("scale factor {index} out of range for {n}"))
        })?;
        *slot = value;
        Ok(())
    }

    /// The fields defined on this element, in the order they were defined
    pub fn fields(&self) -> impl Iterator<Item = &ElementField> {
        self.fields.iter()
    }

    /// The definition of a field on this element
    pub fn field(&self, field: FieldHandle) -> Option<&ElementField> {
        self.fields.iter().find(|f| f.field == field)
    }

    /// Is a field defined directly on this element?
    pub fn has_field(&self, field: FieldHandle) -> bool {
        self.field(field).is_some()
    }

    /// Does a field defined on this element use a node?
    pub fn field_uses_node(&self, field: FieldHandle, node: NodeHandle) -> bool {
        let Some(element_field) = self.field(field) else {
            return false;
        };
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == Some(node))
            .any(|(i, _)| element_field.components.iter().any(|c| c.uses_node(i)))
    }

    fn grid_storage_index(
        &self,
        field: FieldHandle,
        component: usize,
        grid_point: usize,
    ) -> Result<usize> {
        let element_field = self
            .field(field)
            .ok_or_else(|| {
                Error::NotFound(format!("field is not defined on {}", self.identifier))
            })?;
        let grid = element_field
            .component(component)
            .and_then(|c| c.grid_map())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "component {} is not grid based on {}",
                    component + 1,
                    self.identifier
                ))
            })?;
        if grid_point >= grid.number_of_values() {
            return Err(Error::InvalidArgument(format!(
                "grid point {grid_point} out of range for {} points",
                grid.number_of_values()
            )));
        }
        Ok(grid.value_index() + grid_point)
    }

    /// The value at a grid point of a grid based component
    pub fn grid_value(
        &self,
        field: FieldHandle,
        component: usize,
        grid_point: usize,
    ) -> Result<Value> {
        let index = self.grid_storage_index(field, component, grid_point)?;
        self.field(field)
            .and_then(|f| f.grid_values.get(index))
            .ok_or_else(|| Error::InvalidArgument(format!("grid value {index} out of range")))
    }

    /// Set the value at a grid point of a grid based component
    pub fn set_grid_value(
        &mut self,
        field: FieldHandle,
        component: usize,
        grid_point: usize,
        value: Value,
    ) -> Result<()> {
        let index = self.grid_storage_index(field, component, grid_point)?;
        let element_field = self
            .fields
            .iter_mut()
            .find(|f| f.field == field)
            .ok_or_else(|| Error::NotFound("field is not defined".to_string()))?;
        element_field.grid_values.set(index, value)
    }

    /// All the grid point values of a grid based component, xi1 fastest
    pub fn grid_values(&self, field: FieldHandle, component: usize) -> Result<Vec<Value>> {
        let first = self.grid_storage_index(field, component, 0)?;
        let count = self
            .field(field)
            .and_then(|f| f.component(component))
            .and_then(|c| c.grid_map())
            .map(|g| g.number_of_values())
            .unwrap_or(0);
        let storage = self
            .field(field)
            .map(|f| &f.grid_values)
            .ok_or_else(|| Error::NotFound("field is not defined".to_string()))?;
        (first..first + count)
            .map(|i| {
                storage
                    .get(i)
                    .ok_or_else(|| Error::InvalidArgument(format!("grid value {i} out of range")))
            })
            .collect()
    }

    /// Set all the grid point values of a grid based component
    ///
    /// Nothing is changed if any value is rejected.
    pub fn set_grid_values(
        &mut self,
        field: FieldHandle,
        component: usize,
        values: &[Value],
    ) -> Result<()> {
        let first = self.grid_storage_index(field, component, 0)?;
        let count = self.grid_values(field, component)?.len();
        if values.len() != count {
            return Err(Error::InvalidArgument(format!(
                "expected {count} grid values, got {}",
                values.len()
            )));
        }
        let element_field = self
            .fields
            .iter_mut()
            .find(|f| f.field == field)
            .ok_or_else(|| Error::NotFound("field is not defined".to_string()))?;
        let mut storage = element_field.grid_values.clone();
        for (i, v) in values.iter().enumerate() {
            storage.set(first + i, v.clone())?;
        }
        element_field.grid_values = storage;
        Ok(())
    }

    /// The faces, one entry per face of the shape
    pub fn faces(&self) -> &[Option<ElementHandle>] {
        &self.faces
    }

    /// A face
    pub fn face(&self, face: usize) -> Option<ElementHandle> {
        self.faces.get(face).copied().flatten()
    }

    /// The parents and the number of this element among each parent's faces
    pub fn parents(&self) -> &[(ElementHandle, usize)] {
        &self.parents
    }

    /// Is this a top level element, with no parents?
    pub fn is_top_level(&self) -> bool {
        self.parents.is_empty()
    }

    pub(crate) fn share_structures(
        &mut self,
        shape: impl FnOnce(&Rc<Shape>) -> Rc<Shape>,
        mut basis: impl FnMut(&Rc<Basis>) -> Rc<Basis>,
    ) {
        self.shape = shape(&self.shape);
        for component in self.fields.iter_mut().flat_map(|f| f.components.iter_mut()) {
            if let ElementFieldComponent::NodeBased { basis: b, .. } = component {
                *b = basis(b);
            }
        }
    }

    pub(crate) fn set_face(&mut self, face: usize, element: Option<ElementHandle>) -> Result<()> {
        let n = self.faces.len();
        let slot = self.faces.get_mut(face).ok_or_else(|| {
            Error::InvalidArgument(format!("face {face} out of range for {n} faces"))
        })?;
        *slot = element;
        Ok(())
    }

    pub(crate) fn add_parent(&mut self, parent: ElementHandle, face: usize) {
        if !self.parents.contains(&(parent, face)) {
            self.parents.push((parent, face));
        }
    }

    pub(crate) fn remove_parent(&mut self, parent: ElementHandle) {
        self.parents.retain(|(p, _)| *p != parent);
    }

    pub(crate) fn remove_parent_link(&mut self, parent: ElementHandle, face: usize) {
        self.parents.retain(|link| *link != (parent, face));
    }

    pub(crate) fn clear_face_references(&mut self, element: ElementHandle) {
        for face in self.faces.iter_mut() {
            if *face == Some(element) {
                *face = None;
            }
        }
    }

    /// Merge the definition of another element into a copy of this element
    ///
    /// The shape, nodes and scale factors are taken from the source where this element has
    /// none; otherwise they must agree in number, and set nodes and scale factor values are
    /// taken from the source. Fields only defined on the source are added; for fields
    /// defined on both, this element's layout is kept and the source's grid values are
    /// copied. Fails without creating an element if anything is incompatible.
    pub fn merged(&self, source: &Element) -> Result<Element> {
        let incompatible = |reason: &str| {
            warn!(
                "Cannot merge {} into {}: {reason}",
                source.identifier, self.identifier
            );
            Err(Error::IncompatibleStructure(format!(
                "cannot merge {}: {reason}",
                source.identifier
            )))
        };
        if self.shape.dimension() != source.shape.dimension() {
            return incompatible("different dimensions");
        }
        if self.shape.is_specified()
            && source.shape.is_specified()
            && self.shape.shape_type() != source.shape.shape_type()
        {
            return incompatible("different shapes");
        }
        if !self.nodes.is_empty()
            && !source.nodes.is_empty()
            && self.nodes.len() != source.nodes.len()
        {
            return incompatible("different numbers of nodes");
        }
        if !self.scale_factor_sets.is_empty()
            && !source.scale_factor_sets.is_empty()
            && self.scale_factor_sets != source.scale_factor_sets
        {
            return incompatible("different scale factor sets");
        }

        let mut merged = self.clone();
        if !merged.shape.is_specified() && source.shape.is_specified() {
            merged.shape = Rc::clone(&source.shape);
            merged.faces = source.faces.clone();
        }
        if merged.nodes.is_empty() {
            merged.nodes = source.nodes.clone();
        } else {
            for (target, node) in merged.nodes.iter_mut().zip(&source.nodes) {
                if node.is_some() {
                    *target = *node;
                }
            }
        }
        if merged.scale_factor_sets.is_empty() {
            merged.scale_factor_sets = source.scale_factor_sets.clone();
        }
        if source.scale_factors.len() == merged.scale_factors.len() {
            merged.scale_factors = source.scale_factors.clone();
        } else if merged.scale_factors.is_empty() {
            merged.scale_factors = source.scale_factors.clone();
        }

        for source_field in &source.fields {
            match merged.fields.iter_mut().find(|f| f.field == source_field.field) {
                None => {
                    if source_field
                        .components
                        .iter()
                        .any(|c| c.required_number_of_nodes() > merged.nodes.len())
                    {
                        return incompatible("field needs nodes the element does not have");
                    }
                    merged.fields.push(source_field.clone());
                }
                Some(target) => {
                    if target.components.len() != source_field.components.len() {
                        return incompatible("different numbers of components");
                    }
                    if target.grid_values.value_type() != source_field.grid_values.value_type() {
                        return incompatible("different value types");
                    }
                    if target.components == source_field.components {
                        target.grid_values = source_field.grid_values.clone();
                    }
                }
            }
        }

        for (face, element) in source.faces.iter().enumerate() {
            if element.is_some() && face < merged.faces.len() {
                merged.faces[face] = *element;
            }
        }
        for (parent, face) in &source.parents {
            merged.add_parent(*parent, *face);
        }
        Ok(merged)
    }
}

/// Builder for an [Element]
///
/// The node count and scale factor sets may each be set once.
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    element: Element,
    nodes_set: bool,
    scale_factors_set: bool,
}

impl ElementBuilder {
    /// Start building an element with a shape
    pub fn new(identifier: ElementIdentifier, shape: Rc<Shape>) -> Self {
        let faces = vec![None; shape.number_of_faces()];
        Self {
            element: Element {
                identifier,
                shape,
                nodes: vec![],
                scale_factor_sets: vec![],
                scale_factors: vec![],
                fields: vec![],
                faces,
                parents: vec![],
            },
            nodes_set: false,
            scale_factors_set: false,
        }
    }

    /// Start building an element with the shape, nodes, scale factors and fields of a template
    ///
    /// Faces and parents are not copied.
    pub fn from_template(identifier: ElementIdentifier, template: &Element) -> Self {
        let mut builder = Self::new(identifier, Rc::clone(&template.shape));
        builder.element.nodes = template.nodes.clone();
        builder.element.scale_factor_sets = template.scale_factor_sets.clone();
        builder.element.scale_factors = template.scale_factors.clone();
        builder.element.fields = template.fields.clone();
        builder.nodes_set = !template.nodes.is_empty();
        builder.scale_factors_set = !template.scale_factor_sets.is_empty();
        builder
    }

    /// Set the number of nodes
    pub fn set_number_of_nodes(&mut self, number_of_nodes: usize) -> Result<&mut Self> {
        if self.nodes_set {
            return Err(Error::InvalidArgument(format!(
                "the number of nodes of {} has already been set",
                self.element.identifier
            )));
        }
        self.element.nodes = vec![None; number_of_nodes];
        self.nodes_set = true;
        Ok(self)
    }

    /// Set a node
    pub fn set_node(&mut self, index: usize, node: NodeHandle) -> Result<&mut Self> {
        let n = self.element.nodes.len();
        let slot = self.element.nodes.get_mut(index).ok_or_else(|| {
            Error::InvalidArgument(format!("node {index} out of range for {n} nodes"))
        })?;
        *slot = Some(node);
        Ok(self)
    }

    /// Set the scale factor sets; the scale factors start at one
    pub fn set_scale_factor_sets(&mut self, sets: Vec<ScaleFactorSet>) -> Result<&mut Self> {
        if self.scale_factors_set {
            return Err(Error::InvalidArgument(format!(
                "the scale factor sets of {} have already been set",
                self.element.identifier
            )));
        }
        let count = sets.iter().map(|s| s.count).sum();
        self.element.scale_factor_sets = sets;
        self.element.scale_factors = vec![1.0; count];
        self.scale_factors_set = true;
        Ok(self)
    }

    /// Set a scale factor
    pub fn set_scale_factor(&mut self, index: usize, value: FeValue) -> Result<&mut Self> {
        self.element.set_scale_factor(index, value)?;
        Ok(self)
    }

    /// Define a field on the element
    ///
    /// There must be one component per field component. Node based components need a
    /// basis suited to the element's shape and may only use nodes and scale factors the
    /// element has; grid based components of the field must all have the same grid.
    pub fn define_field(
        &mut self,
        field: FieldHandle,
        definition: &Field,
        components: Vec<ElementFieldComponent>,
    ) -> Result<&mut Self> {
        let element = &self.element;
        let identifier = element.identifier;
        if element.has_field(field) {
            return Err(Error::InvalidArgument(format!(
                "field '{}' is already defined on {identifier}",
                definition.name()
            )));
        }
        if !definition.is_general() {
            return Err(Error::InvalidArgument(format!(
                "{} field '{}' cannot be defined on elements",
                definition.field_type().name(),
                definition.name()
            )));
        }
        if components.len() != definition.number_of_components() {
            return Err(Error::InvalidArgument(format!(
                "field '{}' has {} components but {} were given",
                definition.name(),
                definition.number_of_components(),
                components.len()
            )));
        }
        let shape_type = element.shape.shape_type().ok_or_else(|| {
            Error::IncompatibleStructure(format!(
                "cannot define fields on {identifier}: its shape is unspecified"
            ))
        })?;
        let mut grid: Option<&[usize]> = None;
        let mut grid_size = 0;
        for component in &components {
            match component {
                ElementFieldComponent::NodeBased { basis, .. } => {
                    if let Err(e) = shape_type.check_basis(basis.basis_type()) {
                        warn!(
                            "Basis '{}' is incompatible with {identifier}",
                            basis.basis_type()
                        );
                        return Err(e);
                    }
                    if component.required_number_of_nodes() > element.nodes.len() {
                        return Err(Error::InvalidArgument(format!(
                            "{identifier} has {} nodes but node {} is used",
                            element.nodes.len(),
                            component.required_number_of_nodes()
                        )));
                    }
                    if component.required_number_of_scale_factors() > element.scale_factors.len() {
                        return Err(Error::InvalidArgument(format!(
                            "{identifier} has {} scale factors but scale factor {} is used",
                            element.scale_factors.len(),
                            component.required_number_of_scale_factors()
                        )));
                    }
                }
                ElementFieldComponent::GridBased(map) => {
                    if map.number_in_xi().len() != element.dimension() {
                        return Err(Error::InvalidArgument(format!(
                            "a grid on {identifier} needs {} directions",
                            element.dimension()
                        )));
                    }
                    match grid {
                        Some(g) if g != map.number_in_xi() => {
                            return Err(Error::InvalidArgument(
                                "grid based components must share a grid".to_string(),
                            ))
                        }
                        _ => grid = Some(map.number_in_xi()),
                    }
                    grid_size = grid_size.max(map.value_index() + map.number_of_values());
                }
            }
        }
        let grid_values = ValueStorage::new(definition.value_type(), grid_size);
        self.element.fields.push(ElementField {
            field,
            components,
            grid_values,
        });
        Ok(self)
    }

    /// Remove a field from the element
    pub fn undefine_field(&mut self, field: FieldHandle) -> Result<&mut Self> {
        let position = self
            .element
            .fields
            .iter()
            .position(|f| f.field == field)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "field is not defined on {}",
                    self.element.identifier
                ))
            })?;
        self.element.fields.remove(position);
        Ok(self)
    }

    /// Set the value at a grid point of a grid based component
    pub fn set_grid_value(
        &mut self,
        field: FieldHandle,
        component: usize,
        grid_point: usize,
        value: Value,
    ) -> Result<&mut Self> {
        self.element
            .set_grid_value(field, component, grid_point, value)?;
        Ok(self)
    }

    /// The element being built
    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Finish building the element
    pub fn finalize(self) -> Element {
        self.element
    }
}
