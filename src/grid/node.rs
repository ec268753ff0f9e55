//! Nodes
//!
//! A node stores, for each field defined on it, a flat array of values. The values of a
//! component are stored version by version, each version holding the value followed by
//! its derivatives; the components are stored one after another. If the field varies in
//! time, each value is an array with one entry per time of the node field's time series.

use crate::field::Field;
use crate::grid::arena::FieldHandle;
use crate::grid::value_storage::ValueStorage;
use crate::time::{TimeSeries, TimeSeriesSet};
use crate::types::{Error, FeValue, NodalValueType, Result, Value};
use log::warn;
use paste::paste;
use std::rc::Rc;

/// The address of a value within a node field
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct NodalValueKey {
    /// Component
    pub component: usize,
    /// Version
    pub version: usize,
    /// Value or derivative
    pub nodal_value_type: NodalValueType,
}

impl NodalValueKey {
    /// Create a key
    pub fn new(component: usize, version: usize, nodal_value_type: NodalValueType) -> Self {
        Self {
            component,
            version,
            nodal_value_type,
        }
    }

    /// The key of the first version of the value of a component
    pub fn value(component: usize) -> Self {
        Self::new(component, 0, NodalValueType::Value)
    }
}

/// The storage layout of one component of a field at a node
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NodeFieldComponent {
    versions: usize,
    derivatives: Vec<NodalValueType>,
}

impl NodeFieldComponent {
    fn new() -> Self {
        Self {
            versions: 1,
            derivatives: vec![],
        }
    }

    /// The number of versions
    pub fn number_of_versions(&self) -> usize {
        self.versions
    }

    /// The derivatives stored for each version, in storage order
    pub fn derivatives(&self) -> &[NodalValueType] {
        &self.derivatives
    }

    /// The number of values stored
    pub fn number_of_values(&self) -> usize {
        self.versions * (1 + self.derivatives.len())
    }

    fn offset(&self, version: usize, nodal_value_type: NodalValueType) -> Option<usize> {
        if version >= self.versions {
            return None;
        }
        let type_index = if nodal_value_type == NodalValueType::Value {
            0
        } else {
            1 + self
                .derivatives
                .iter()
                .position(|d| *d == nodal_value_type)?
        };
        Some(version * (1 + self.derivatives.len()) + type_index)
    }
}

/// The storage layout of a field at a node
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NodeFieldLayout {
    components: Vec<NodeFieldComponent>,
}

impl NodeFieldLayout {
    /// Create a layout with one version and no derivatives in each component
    pub fn new(number_of_components: usize) -> Self {
        Self {
            components: vec![NodeFieldComponent::new(); number_of_components],
        }
    }

    fn selected(&mut self, component: Option<usize>) -> Result<&mut [NodeFieldComponent]> {
        match component {
            None => Ok(&mut self.components),
            Some(c) => {
                let n = self.components.len();
                self.components
                    .get_mut(c..c + 1)
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!("component {c} out of range for {n}"))
                    })
            }
        }
    }

    /// Store a derivative in one component, or all components if `component` is None
    pub fn define_derivative(
        &mut self,
        component: Option<usize>,
        nodal_value_type: NodalValueType,
    ) -> Result<()> {
        if nodal_value_type == NodalValueType::Value {
            return Err(Error::InvalidArgument(
                "the value is always stored".to_string(),
            ));
        }
        for c in self.selected(component)? {
            if !c.derivatives.contains(&nodal_value_type) {
                c.derivatives.push(nodal_value_type);
                c.derivatives.sort();
            }
        }
        Ok(())
    }

    /// Set the number of versions in one component, or all components if `component` is None
    pub fn define_versions(&mut self, component: Option<usize>, versions: usize) -> Result<()> {
        if versions == 0 {
            return Err(Error::InvalidArgument(
                "there must be at least one version".to_string(),
            ));
        }
        for c in self.selected(component)? {
            c.versions = versions;
        }
        Ok(())
    }

    /// The number of components
    pub fn number_of_components(&self) -> usize {
        self.components.len()
    }

    /// The layout of a component
    pub fn component(&self, component: usize) -> Option<&NodeFieldComponent> {
        self.components.get(component)
    }

    /// The total number of values
    pub fn number_of_values(&self) -> usize {
        self.components
            .iter()
            .map(NodeFieldComponent::number_of_values)
            .sum()
    }

    /// The index in the flat value array of the first value of a component
    pub fn component_offset(&self, component: usize) -> Option<usize> {
        (component < self.components.len()).then(|| {
            self.components[..component]
                .iter()
                .map(NodeFieldComponent::number_of_values)
                .sum()
        })
    }

    /// The index of a value in the flat value array
    pub fn value_index(&self, key: &NodalValueKey) -> Option<usize> {
        let start = self.components[..key.component.min(self.components.len())]
            .iter()
            .map(NodeFieldComponent::number_of_values)
            .sum::<usize>();
        let offset = self
            .components
            .get(key.component)?
            .offset(key.version, key.nodal_value_type)?;
        Some(start + offset)
    }

    /// The keys of all the values, in storage order
    pub fn keys(&self) -> Vec<NodalValueKey> {
        let mut keys = vec![];
        for (component, c) in self.components.iter().enumerate() {
            for version in 0..c.versions {
                keys.push(NodalValueKey::new(component, version, NodalValueType::Value));
                keys.extend(
                    c.derivatives
                        .iter()
                        .map(|d| NodalValueKey::new(component, version, *d)),
                );
            }
        }
        keys
    }
}

/// The values of a field at a node
#[derive(Debug, PartialEq, Clone)]
pub struct NodeField {
    field: FieldHandle,
    layout: NodeFieldLayout,
    time_series: Option<Rc<TimeSeries>>,
    values: ValueStorage,
}

impl NodeField {
    fn new(
        field: FieldHandle,
        definition: &Field,
        layout: NodeFieldLayout,
        time_series: Option<Rc<TimeSeries>>,
    ) -> Self {
        let times = time_series.as_ref().map(|t| t.number_of_times()).unwrap_or(1);
        let values = ValueStorage::new(definition.value_type(), layout.number_of_values() * times);
        Self {
            field,
            layout,
            time_series,
            values,
        }
    }

    /// The field
    pub fn field(&self) -> FieldHandle {
        self.field
    }

    /// The storage layout
    pub fn layout(&self) -> &NodeFieldLayout {
        &self.layout
    }

    /// The time series, if the values vary in time
    pub fn time_series(&self) -> Option<&Rc<TimeSeries>> {
        self.time_series.as_ref()
    }

    /// The stored values, time fastest
    pub fn storage(&self) -> &ValueStorage {
        &self.values
    }

    fn number_of_times(&self) -> usize {
        self.time_series
            .as_ref()
            .map(|t| t.number_of_times())
            .unwrap_or(1)
    }

    fn index(&self, key: &NodalValueKey) -> Result<usize> {
        self.layout.value_index(key).ok_or_else(|| {
            Error::NotFound(format!(
                "{} of version {} of component {} is not stored",
                key.nodal_value_type,
                key.version + 1,
                key.component + 1
            ))
        })
    }

    /// The value at an index of the flat value array at a time, interpolating between stored times
    ///
    /// Times outside the series take the value at the nearest end.
    pub fn value_at(&self, value_index: usize, time: FeValue) -> Result<Value> {
        if value_index >= self.layout.number_of_values() {
            return Err(Error::InvalidArgument(format!(
                "value index {value_index} out of range"
            )));
        }
        let n = self.number_of_times();
        match &self.time_series {
            None => self.values.interpolate(value_index, value_index, 0.0),
            Some(series) => {
                let i = series.interpolation_for_time(time);
                self.values.interpolate(
                    value_index * n + i.index_one,
                    value_index * n + i.index_two,
                    i.xi,
                )
            }
        }
    }

    fn component_value_index(&self, component: usize, index: usize) -> Result<usize> {
        let out_of_range = || {
            Error::InvalidArgument(format!(
                "value {} of component {} out of range",
                index + 1,
                component + 1
            ))
        };
        let count = self
            .layout
            .component(component)
            .map(NodeFieldComponent::number_of_values)
            .ok_or_else(out_of_range)?;
        if index >= count {
            return Err(out_of_range());
        }
        let offset = self
            .layout
            .component_offset(component)
            .ok_or_else(out_of_range)?;
        Ok(offset + index)
    }

    /// The value at an index within the values of a component, interpolated at a time
    pub fn component_value_at(
        &self,
        component: usize,
        index: usize,
        time: FeValue,
    ) -> Result<Value> {
        self.value_at(self.component_value_index(component, index)?, time)
    }

    /// The value at an index within the values of a component at a time that must be in
    /// the time series
    pub fn component_value_exact(
        &self,
        component: usize,
        index: usize,
        time: FeValue,
    ) -> Result<Value> {
        let storage_index =
            self.exact_index(self.component_value_index(component, index)?, time)?;
        self.values.get(storage_index).ok_or_else(|| {
            Error::InvalidArgument(format!("storage index {storage_index} out of range"))
        })
    }

    /// The storage index of a value at a time that must be in the time series
    fn exact_index(&self, value_index: usize, time: FeValue) -> Result<usize> {
        match &self.time_series {
            None => Ok(value_index),
            Some(series) => {
                let t = series.index_for_time(time).ok_or_else(|| {
                    Error::NotFound(format!("time {time} is not in the time series"))
                })?;
                Ok(value_index * series.number_of_times() + t)
            }
        }
    }
}

/// A node
#[derive(Debug, PartialEq, Clone)]
pub struct Node {
    identifier: i32,
    fields: Vec<NodeField>,
}

macro_rules! typed_value_accessors {
    ($(($name:ident, $variant:ident, $t:ty)),*) => {
        paste! {
            $(
                #[doc = concat!("Get a ", stringify!($name), " value, interpolating in time")]
                pub fn [<get_ $name _value>](
                    &self,
                    field: FieldHandle,
                    key: &NodalValueKey,
                    time: FeValue,
                ) -> Result<$t> {
                    match self.value(field, key, time)? {
                        Value::$variant(v) => Ok(v),
                        other => Err(Error::InvalidArgument(format!(
                            "expected a {} value, found a {} value",
                            stringify!($name),
                            other.value_type()
                        ))),
                    }
                }

                #[doc = concat!("Set a ", stringify!($name), " value at a stored time")]
                pub fn [<set_ $name _value>](
                    &mut self,
                    field: FieldHandle,
                    key: &NodalValueKey,
                    time: FeValue,
                    value: $t,
                ) -> Result<()> {
                    self.set_value(field, key, time, Value::$variant(value))
                }
            )*
        }
    };
}

impl Node {
    /// The identifier
    pub fn identifier(&self) -> i32 {
        self.identifier
    }

    pub(crate) fn set_identifier(&mut self, identifier: i32) {
        self.identifier = identifier;
    }

    /// The fields defined on this node, in the order they were defined
    pub fn fields(&self) -> impl Iterator<Item = &NodeField> {
        self.fields.iter()
    }

    /// The values of a field at this node
    pub fn field(&self, field: FieldHandle) -> Option<&NodeField> {
        self.fields.iter().find(|f| f.field == field)
    }

    fn field_mut(&mut self, field: FieldHandle) -> Result<&mut NodeField> {
        let identifier = self.identifier;
        self.fields
            .iter_mut()
            .find(|f| f.field == field)
            .ok_or_else(|| Error::NotFound(format!("field is not defined at node {identifier}")))
    }

    fn require_field(&self, field: FieldHandle) -> Result<&NodeField> {
        self.field(field).ok_or_else(|| {
            Error::NotFound(format!("field is not defined at node {}", self.identifier))
        })
    }

    /// Is a field defined on this node?
    pub fn has_field(&self, field: FieldHandle) -> bool {
        self.field(field).is_some()
    }

    /// Is a value stored for a field at this node?
    pub fn has_value(&self, field: FieldHandle, key: &NodalValueKey) -> bool {
        self.field(field)
            .map(|f| f.layout.value_index(key).is_some())
            .unwrap_or(false)
    }

    /// Get a value, interpolating between stored times
    ///
    /// The time is ignored if the field does not vary in time at this node.
    pub fn value(&self, field: FieldHandle, key: &NodalValueKey, time: FeValue) -> Result<Value> {
        let node_field = self.require_field(field)?;
        node_field.value_at(node_field.index(key)?, time)
    }

    /// Get a value at a time that must be one of the stored times
    pub fn value_exact(
        &self,
        field: FieldHandle,
        key: &NodalValueKey,
        time: FeValue,
    ) -> Result<Value> {
        let node_field = self.require_field(field)?;
        let index = node_field.exact_index(node_field.index(key)?, time)?;
        node_field
            .values
            .get(index)
            .ok_or_else(|| Error::InvalidArgument(format!("storage index {index} out of range")))
    }

    /// Get a value at an index of the time series
    pub fn value_at_time_index(
        &self,
        field: FieldHandle,
        key: &NodalValueKey,
        time_index: usize,
    ) -> Result<Value> {
        let node_field = self.require_field(field)?;
        let n = node_field.number_of_times();
        if time_index >= n {
            return Err(Error::InvalidArgument(format!(
                "time index {time_index} out of range for {n} times"
            )));
        }
        let index = node_field.index(key)? * n + time_index;
        node_field
            .values
            .get(index)
            .ok_or_else(|| Error::InvalidArgument(format!("storage index {index} out of range")))
    }

    /// Set a value at a time that must be one of the stored times
    ///
    /// The time is ignored if the field does not vary in time at this node.
    pub fn set_value(
        &mut self,
        field: FieldHandle,
        key: &NodalValueKey,
        time: FeValue,
        value: Value,
    ) -> Result<()> {
        let node_field = self.field_mut(field)?;
        let index = node_field.exact_index(node_field.index(key)?, time)?;
        node_field.values.set(index, value)
    }

    /// Set a value at an index of the time series
    pub fn set_value_at_time_index(
        &mut self,
        field: FieldHandle,
        key: &NodalValueKey,
        time_index: usize,
        value: Value,
    ) -> Result<()> {
        let node_field = self.field_mut(field)?;
        let n = node_field.number_of_times();
        if time_index >= n {
            return Err(Error::InvalidArgument(format!(
                "time index {time_index} out of range for {n} times"
            )));
        }
        let index = node_field.index(key)? * n + time_index;
        node_field.values.set(index, value)
    }

    typed_value_accessors!(
        (fe_value, FeValue, FeValue),
        (double, Double, f64),
        (float, Float, f32),
        (int, Int, i32),
        (short, Short, i16),
        (string, String, String)
    );

    /// Get a value converted to a string
    pub fn value_as_string(
        &self,
        field: FieldHandle,
        key: &NodalValueKey,
        time: FeValue,
    ) -> Result<String> {
        Ok(self.value(field, key, time)?.to_string())
    }

    /// All the stored values of a field, in storage order with time fastest
    pub fn values(&self, field: FieldHandle) -> Result<Vec<Value>> {
        let node_field = self.require_field(field)?;
        Ok((0..node_field.values.len())
            .filter_map(|i| node_field.values.get(i))
            .collect())
    }

    /// Replace all the stored values of a field
    ///
    /// The values must have the field's value type and be given in storage order. Nothing
    /// is changed if any value is rejected.
    pub fn set_values(&mut self, field: FieldHandle, values: &[Value]) -> Result<()> {
        let node_field = self.field_mut(field)?;
        if values.len() != node_field.values.len() {
            return Err(Error::InvalidArgument(format!(
                "expected {} values, got {}",
                node_field.values.len(),
                values.len()
            )));
        }
        let mut storage = node_field.values.clone();
        for (i, v) in values.iter().enumerate() {
            storage.set(i, v.clone())?;
        }
        node_field.values = storage;
        Ok(())
    }

    /// The minimum and maximum over time of a numeric value
    pub fn time_range_of_value(
        &self,
        field: FieldHandle,
        key: &NodalValueKey,
    ) -> Result<(FeValue, FeValue)> {
        let node_field = self.require_field(field)?;
        let n = node_field.number_of_times();
        let start = node_field.index(key)? * n;
        node_field.values.min_max(start..start + n)
    }

    pub(crate) fn share_time_series(&mut self, set: &mut TimeSeriesSet) -> Result<()> {
        for node_field in &mut self.fields {
            if let Some(series) = &node_field.time_series {
                if !set.contains(series) {
                    node_field.time_series = Some(set.get_or_create_matching(series.times())?);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn define_field(&mut self, node_field: NodeField) -> Result<()> {
        if self.has_field(node_field.field) {
            return Err(Error::InvalidArgument(format!(
                "field is already defined at node {}",
                self.identifier
            )));
        }
        self.fields.push(node_field);
        Ok(())
    }

    pub(crate) fn undefine_field(&mut self, field: FieldHandle) -> Result<NodeField> {
        let position = self
            .fields
            .iter()
            .position(|f| f.field == field)
            .ok_or_else(|| {
                Error::NotFound(format!("field is not defined at node {}", self.identifier))
            })?;
        Ok(self.fields.remove(position))
    }

    /// Merge the fields and values of another node into a copy of this node
    ///
    /// Fields only defined on the source are added. For fields defined on both, this
    /// node's layout is kept and every value stored in both takes the source value. Time
    /// series are merged and the values remapped to the merged series. Fails without
    /// creating a node if any field is defined incompatibly.
    pub fn merged(&self, source: &Node, time_series: &mut TimeSeriesSet) -> Result<Node> {
        for source_field in &source.fields {
            if let Some(existing) = self.field(source_field.field) {
                let incompatible = |reason: &str| {
                    warn!(
                        "Cannot merge node {} into node {}: {reason}",
                        source.identifier, self.identifier
                    );
                    Err(Error::IncompatibleStructure(format!(
                        "cannot merge node {}: {reason}",
                        source.identifier
                    )))
                };
                if existing.layout.number_of_components()
                    != source_field.layout.number_of_components()
                {
                    return incompatible("different numbers of components");
                }
                if existing.values.value_type() != source_field.values.value_type() {
                    return incompatible("different value types");
                }
                if existing.time_series.is_some() != source_field.time_series.is_some() {
                    return incompatible("different time variation");
                }
            }
        }

        let mut merged = self.clone();
        for source_field in &source.fields {
            if !merged.has_field(source_field.field) {
                merged.fields.push(source_field.clone());
                continue;
            }
            let target = merged.field_mut(source_field.field)?;
            if let (Some(existing_series), Some(source_series)) =
                (target.time_series.clone(), source_field.time_series.as_ref())
            {
                let series = time_series.merge(&existing_series, source_series)?;
                if !Rc::ptr_eq(&series, &existing_series) {
                    remap_times(target, series)?;
                }
            }
            let target_times = target.number_of_times();
            let source_times = source_field.number_of_times();
            let time_indices = match (&target.time_series, &source_field.time_series) {
                (Some(t), Some(s)) => s.indices_in(t)?,
                _ => vec![0],
            };
            for key in source_field.layout.keys() {
                let Some(target_index) = target.layout.value_index(&key) else {
                    continue;
                };
                let Some(source_index) = source_field.layout.value_index(&key) else {
                    continue;
                };
                for (source_time, target_time) in time_indices.iter().enumerate() {
                    target.values.copy_from(
                        target_index * target_times + target_time,
                        &source_field.values,
                        source_index * source_times + source_time,
                    )?;
                }
            }
        }
        Ok(merged)
    }
}

/// Move the values of a node field onto a time series containing all its current times
fn remap_times(node_field: &mut NodeField, series: Rc<TimeSeries>) -> Result<()> {
    let old_times = node_field.number_of_times();
    let indices = match &node_field.time_series {
        Some(old) => old.indices_in(&series)?,
        None => vec![0],
    };
    let new_times = series.number_of_times();
    let number_of_values = node_field.layout.number_of_values();
    let mut values =
        ValueStorage::new(node_field.values.value_type(), number_of_values * new_times);
    for v in 0..number_of_values {
        for (old, new) in indices.iter().enumerate() {
            values.copy_from(v * new_times + new, &node_field.values, v * old_times + old)?;
        }
    }
    node_field.values = values;
    node_field.time_series = Some(series);
    Ok(())
}

/// Builder for a [Node]
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    /// Start building a node with no fields
    pub fn new(identifier: i32) -> Self {
        Self {
            node: Node {
                identifier,
                fields: vec![],
            },
        }
    }

    /// Start building a node with the fields and values of a template node
    pub fn from_template(identifier: i32, template: &Node) -> Self {
        Self {
            node: Node {
                identifier,
                fields: template.fields.clone(),
            },
        }
    }

    /// Define a field on the node
    ///
    /// If `time_series` is None the field's own time series, if any, is used. Values start at zero.
    pub fn define_field(
        &mut self,
        field: FieldHandle,
        definition: &Field,
        layout: NodeFieldLayout,
        time_series: Option<Rc<TimeSeries>>,
    ) -> Result<&mut Self> {
        if !definition.is_general() {
            return Err(Error::InvalidArgument(format!(
                "{} field '{}' cannot be defined at nodes",
                definition.field_type().name(),
                definition.name()
            )));
        }
        if layout.number_of_components() != definition.number_of_components() {
            return Err(Error::InvalidArgument(format!(
                "field '{}' has {} components but the layout has {}",
                definition.name(),
                definition.number_of_components(),
                layout.number_of_components()
            )));
        }
        let time_series = time_series.or_else(|| definition.time_series().cloned());
        self.node
            .define_field(NodeField::new(field, definition, layout, time_series))?;
        Ok(self)
    }

    /// Remove a field from the node
    pub fn undefine_field(&mut self, field: FieldHandle) -> Result<&mut Self> {
        self.node.undefine_field(field)?;
        Ok(self)
    }

    /// Set a value
    pub fn set_value(
        &mut self,
        field: FieldHandle,
        key: &NodalValueKey,
        time: FeValue,
        value: Value,
    ) -> Result<&mut Self> {
        self.node.set_value(field, key, time, value)?;
        Ok(self)
    }

    /// Set all the values of a field, in the order of [Node::values]
    pub fn set_values(&mut self, field: FieldHandle, values: &[Value]) -> Result<&mut Self> {
        self.node.set_values(field, values)?;
        Ok(self)
    }

    /// The node being built
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Finish building the node
    pub fn finalize(self) -> Node {
        self.node
    }
}

pub(crate) fn new_node_field(
    field: FieldHandle,
    definition: &Field,
    layout: NodeFieldLayout,
    time_series: Option<Rc<TimeSeries>>,
) -> NodeField {
    NodeField::new(field, definition, layout, time_series)
}
