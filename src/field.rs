//! Field definitions

use crate::grid::arena::FieldHandle;
use crate::time::TimeSeries;
use crate::types::{CoordinateSystem, Error, Result, Value, ValueType};
use std::rc::Rc;

/// How a field is used in modelling
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum CmFieldType {
    /// A material or structural property
    Anatomical,
    /// A geometric coordinate field
    Coordinate,
    /// Any other field
    General,
}

impl CmFieldType {
    /// The name of this type
    pub fn name(&self) -> &'static str {
        match self {
            CmFieldType::Anatomical => "anatomical",
            CmFieldType::Coordinate => "coordinate",
            CmFieldType::General => "field",
        }
    }

    /// Create a type from its name
    pub fn from_name(name: &str) -> Option<Self> {
        [
            CmFieldType::Anatomical,
            CmFieldType::Coordinate,
            CmFieldType::General,
        ]
        .into_iter()
        .find(|t| t.name() == name)
    }
}

/// Where the values of a field are stored
#[derive(Debug, PartialEq, Clone)]
pub enum FieldType {
    /// One value per component, the same everywhere
    Constant(Vec<Value>),
    /// A table of values per component, looked up by the integer value of an indexer field
    ///
    /// The values are stored component by component; index 1 selects the first value.
    Indexed {
        /// The indexer field
        indexer: FieldHandle,
        /// The number of values per component
        number_of_indexed_values: usize,
        /// The values
        values: Vec<Value>,
    },
    /// Values stored at nodes and elements
    General,
}

impl FieldType {
    /// The name of this type
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Constant(_) => "constant",
            FieldType::Indexed { .. } => "indexed",
            FieldType::General => "general",
        }
    }
}

/// A field
#[derive(Debug, PartialEq, Clone)]
pub struct Field {
    name: String,
    component_names: Vec<String>,
    value_type: ValueType,
    field_type: FieldType,
    coordinate_system: CoordinateSystem,
    cm_field_type: CmFieldType,
    time_series: Option<Rc<TimeSeries>>,
}

impl Field {
    /// The name of the field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The number of components
    pub fn number_of_components(&self) -> usize {
        self.component_names.len()
    }

    /// The name of a component
    pub fn component_name(&self, component: usize) -> Option<&str> {
        self.component_names.get(component).map(|s| s.as_str())
    }

    /// The names of the components
    pub fn component_names(&self) -> &[String] {
        &self.component_names
    }

    /// The type of the values
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Where the values are stored
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// The coordinate system
    pub fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    /// How the field is used in modelling
    pub fn cm_field_type(&self) -> CmFieldType {
        self.cm_field_type
    }

    /// The default time series for values of this field
    pub fn time_series(&self) -> Option<&Rc<TimeSeries>> {
        self.time_series.as_ref()
    }

    /// Are the values of this field stored at nodes and elements?
    pub fn is_general(&self) -> bool {
        self.field_type == FieldType::General
    }

    /// Can values of this field be evaluated as floating point numbers?
    pub fn is_numeric(&self) -> bool {
        self.value_type.is_numeric()
    }

    /// Do this and another field have the same storage structure?
    ///
    /// Fields with the same structure can be merged into one another.
    pub fn has_same_structure(&self, other: &Field) -> bool {
        self.number_of_components() == other.number_of_components()
            && self.value_type == other.value_type
            && self.field_type.name() == other.field_type.name()
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// The value of a component of a constant field
    pub fn constant_value(&self, component: usize) -> Result<Value> {
        match &self.field_type {
            FieldType::Constant(values) => values.get(component).cloned().ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "component {component} out of range for field '{}'",
                    self.name
                ))
            }),
            _ => Err(Error::InvalidArgument(format!(
                "field '{}' is not constant",
                self.name
            ))),
        }
    }

    /// The value of a component of an indexed field for an index, starting at 1
    pub fn indexed_value(&self, component: usize, index: i32) -> Result<Value> {
        match &self.field_type {
            FieldType::Indexed {
                number_of_indexed_values,
                values,
                ..
            } => {
                if component >= self.number_of_components() {
                    return Err(Error::InvalidArgument(format!(
                        "component {component} out of range for field '{}'",
                        self.name
                    )));
                }
                if index < 1 || index as usize > *number_of_indexed_values {
                    return Err(Error::InvalidArgument(format!(
                        "index {index} out of range 1..={number_of_indexed_values} for field '{}'",
                        self.name
                    )));
                }
                Ok(values[component * number_of_indexed_values + index as usize - 1].clone())
            }
            _ => Err(Error::InvalidArgument(format!(
                "field '{}' is not indexed",
                self.name
            ))),
        }
    }
}

/// Builder for a [Field]
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    name: String,
    component_names: Vec<String>,
    value_type: ValueType,
    field_type: FieldType,
    coordinate_system: CoordinateSystem,
    cm_field_type: CmFieldType,
    time_series: Option<Rc<TimeSeries>>,
}

impl FieldBuilder {
    /// Create a builder for a general real field with numbered components
    pub fn new(name: &str, number_of_components: usize) -> Self {
        Self {
            name: name.to_string(),
            component_names: (1..=number_of_components).map(|i| i.to_string()).collect(),
            value_type: ValueType::FeValue,
            field_type: FieldType::General,
            coordinate_system: CoordinateSystem::default(),
            cm_field_type: CmFieldType::General,
            time_series: None,
        }
    }

    /// Create a builder with the definition of an existing field
    pub fn from_field(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            component_names: field.component_names.clone(),
            value_type: field.value_type,
            field_type: field.field_type.clone(),
            coordinate_system: field.coordinate_system,
            cm_field_type: field.cm_field_type,
            time_series: field.time_series.clone(),
        }
    }

    /// Set the component names
    pub fn component_names(mut self, names: &[&str]) -> Self {
        self.component_names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set the value type
    pub fn value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Set the coordinate system
    pub fn coordinate_system(mut self, coordinate_system: CoordinateSystem) -> Self {
        self.coordinate_system = coordinate_system;
        self
    }

    /// Set the modelling type
    pub fn cm_field_type(mut self, cm_field_type: CmFieldType) -> Self {
        self.cm_field_type = cm_field_type;
        self
    }

    /// Set the default time series
    pub fn time_series(mut self, time_series: Option<Rc<TimeSeries>>) -> Self {
        self.time_series = time_series;
        self
    }

    /// Make the field constant with the given component values
    pub fn constant(mut self, values: Vec<Value>) -> Self {
        self.field_type = FieldType::Constant(values);
        self
    }

    /// Make the field indexed
    pub fn indexed(
        mut self,
        indexer: FieldHandle,
        number_of_indexed_values: usize,
        values: Vec<Value>,
    ) -> Self {
        self.field_type = FieldType::Indexed {
            indexer,
            number_of_indexed_values,
            values,
        };
        self
    }

    /// Create the field
    pub fn build(self) -> Result<Field> {
        if self.name.is_empty() {
            return Err(Error::InvalidArgument("a field needs a name".to_string()));
        }
        if self.component_names.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "field '{}' needs at least one component",
                self.name
            )));
        }
        let expected = match &self.field_type {
            FieldType::Constant(values) => Some((values, self.component_names.len())),
            FieldType::Indexed {
                number_of_indexed_values,
                values,
                ..
            } => {
                if *number_of_indexed_values == 0 {
                    return Err(Error::InvalidArgument(format!(
                        "indexed field '{}' needs at least one value per component",
                        self.name
                    )));
                }
                Some((values, self.component_names.len() * number_of_indexed_values))
            }
            FieldType::General => None,
        };
        if let Some((values, count)) = expected {
            if values.len() != count {
                return Err(Error::InvalidArgument(format!(
                    "field '{}' needs {count} values, got {}",
                    self.name,
                    values.len()
                )));
            }
            if let Some(v) = values.iter().find(|v| v.value_type() != self.value_type) {
                return Err(Error::InvalidArgument(format!(
                    "field '{}' has {} values but was given a {} value",
                    self.name,
                    self.value_type,
                    v.value_type()
                )));
            }
        }
        Ok(Field {
            name: self.name,
            component_names: self.component_names,
            value_type: self.value_type,
            field_type: self.field_type,
            coordinate_system: self.coordinate_system,
            cm_field_type: self.cm_field_type,
            time_series: self.time_series,
        })
    }
}
