//! Cached values for evaluating a field in an element

use crate::element::basis::Basis;
use crate::element::shape::AffineXiMap;
use crate::evaluation::assembly::assemble_coefficients;
use crate::evaluation::inheritance::find_defining_element;
use crate::field::FieldType;
use crate::grid::arena::{ElementHandle, FieldHandle};
use crate::grid::maps::{ElementFieldComponent, GridMap};
use crate::grid::region::Region;
use crate::types::{Error, FeValue, Result, Value};
use itertools::Itertools;
use log::debug;
use std::rc::Rc;

#[derive(Debug, Clone)]
enum ComponentValues {
    Basis {
        basis: Rc<Basis>,
        coefficients: Vec<FeValue>,
    },
    Grid {
        map: GridMap,
        values: Vec<Value>,
    },
    Constant(Value),
    Indexed(Vec<Value>),
}

/// The values needed to evaluate a field in one element at one time
///
/// The cache is built by [ElementFieldValues::calculate] and can then be evaluated at any
/// number of points. Basis coefficients are assembled in the element defining the field,
/// which may be an ancestor of the element.
#[derive(Debug, Clone, Default)]
pub struct ElementFieldValues {
    element: Option<ElementHandle>,
    field: Option<FieldHandle>,
    time: FeValue,
    top_level: Option<ElementHandle>,
    defining_element: Option<ElementHandle>,
    xi_map: Option<AffineXiMap>,
    dimension: usize,
    components: Vec<ComponentValues>,
    indexer: Option<Box<ElementFieldValues>>,
    derivatives_calculated: bool,
    no_modify: bool,
}

impl ElementFieldValues {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the cache
    ///
    /// The no modify flag is kept.
    pub fn clear(&mut self) {
        let no_modify = self.no_modify;
        *self = Self {
            no_modify,
            ..Self::default()
        };
    }

    /// Was the cache calculated for a field on an element at a time, with the same top level
    /// element?
    pub fn is_for_element_and_time(
        &self,
        element: ElementHandle,
        field: FieldHandle,
        time: FeValue,
        top_level: Option<ElementHandle>,
    ) -> bool {
        self.element == Some(element)
            && self.field == Some(field)
            && self.time == time
            && self.top_level == top_level
    }

    /// The element the cache was calculated for
    pub fn element(&self) -> Option<ElementHandle> {
        self.element
    }

    /// The field the cache was calculated for
    pub fn field(&self) -> Option<FieldHandle> {
        self.field
    }

    /// The element whose definition of the field was used
    pub fn defining_element(&self) -> Option<ElementHandle> {
        self.defining_element
    }

    /// Can derivatives be evaluated?
    pub fn derivatives_calculated(&self) -> bool {
        self.derivatives_calculated
    }

    /// Are adjustments of the coefficients skipped?
    pub fn no_modify(&self) -> bool {
        self.no_modify
    }

    /// Skip adjustments of the coefficients, to work with the raw nodal values
    pub fn set_no_modify(&mut self, no_modify: bool) {
        self.no_modify = no_modify;
    }

    /// The number of components
    pub fn number_of_components(&self) -> usize {
        self.components.len()
    }

    /// The basis coefficients of a node based component
    pub fn coefficients(&self, component: usize) -> Option<&[FeValue]> {
        match self.components.get(component)? {
            ComponentValues::Basis { coefficients, .. } => Some(coefficients),
            _ => None,
        }
    }

    /// The basis of a node based component
    pub fn basis(&self, component: usize) -> Option<&Rc<Basis>> {
        match self.components.get(component)? {
            ComponentValues::Basis { basis, .. } => Some(basis),
            _ => None,
        }
    }

    /// Calculate the values for evaluating a field in an element at a time
    ///
    /// If the field is not defined on the element it is inherited from an ancestor, which
    /// is `top_level` if given. Derivatives can only be evaluated if `want_derivatives` is
    /// set and no component is grid based. On failure the cache is left empty.
    pub fn calculate(
        &mut self,
        region: &Region,
        element: ElementHandle,
        field: FieldHandle,
        time: FeValue,
        want_derivatives: bool,
        top_level: Option<ElementHandle>,
    ) -> Result<()> {
        self.clear();
        let definition = region
            .field(field)
            .ok_or_else(|| Error::InvalidArgument("the field is not in this region".to_string()))?;
        let dimension = region
            .element(element)
            .ok_or_else(|| Error::InvalidArgument("the element is not in this region".to_string()))?
            .dimension();

        let mut defining_element = element;
        let mut xi_map = None;
        let mut indexer = None;
        let components = match definition.field_type() {
            FieldType::Constant(values) => {
                values.iter().cloned().map(ComponentValues::Constant).collect()
            }
            FieldType::Indexed {
                indexer: indexer_field,
                number_of_indexed_values,
                values,
            } => {
                let mut indexer_values = ElementFieldValues::new();
                indexer_values.calculate(region, element, *indexer_field, time, false, top_level)?;
                indexer = Some(Box::new(indexer_values));
                values
                    .chunks(*number_of_indexed_values)
                    .map(|table| ComponentValues::Indexed(table.to_vec()))
                    .collect()
            }
            FieldType::General => {
                let defining = find_defining_element(region, element, field, top_level)?;
                defining_element = defining.element;
                if defining.element != element {
                    xi_map = Some(defining.xi_map);
                }
                let source = region.element(defining.element).ok_or_else(|| {
                    Error::InvalidArgument("the element is not in this region".to_string())
                })?;
                let element_field = source.field(field).ok_or_else(|| {
                    Error::NotFound(format!("field is not defined on {}", source.identifier()))
                })?;
                element_field
                    .components()
                    .iter()
                    .enumerate()
                    .map(|(number, component)| -> Result<ComponentValues> {
                        match component {
                            ElementFieldComponent::NodeBased { basis, modify, .. } => {
                                let mut coefficients = assemble_coefficients(
                                    region, source, field, number, component, time,
                                )?;
                                if let (Some(mode), false) = (modify, self.no_modify) {
                                    basis.modify_theta_in_xi1(*mode, &mut coefficients)?;
                                }
                                Ok(ComponentValues::Basis {
                                    basis: Rc::clone(basis),
                                    coefficients,
                                })
                            }
                            ElementFieldComponent::GridBased(map) => {
                                let values = (0..map.number_of_values())
                                    .map(|i| {
                                        element_field
                                            .grid_values()
                                            .get(map.value_index() + i)
                                            .ok_or_else(|| {
                                                Error::InvalidArgument(format!(
                                                    "grid value {} out of range",
                                                    map.value_index() + i
                                                ))
                                            })
                                    })
                                    .collect::<Result<Vec<_>>>()?;
                                Ok(ComponentValues::Grid {
                                    map: map.clone(),
                                    values,
                                })
                            }
                        }
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        let has_grid = components
            .iter()
            .any(|c| matches!(c, ComponentValues::Grid { .. }));
        debug!("Calculated values of field {field:?} on element {element:?} at time {time}");
        self.element = Some(element);
        self.field = Some(field);
        self.time = time;
        self.top_level = top_level;
        self.defining_element = Some(defining_element);
        self.xi_map = xi_map;
        self.dimension = dimension;
        self.components = components;
        self.indexer = indexer;
        self.derivatives_calculated = want_derivatives && !has_grid;
        Ok(())
    }

    fn check_calculated(&self) -> Result<()> {
        if self.field.is_none() {
            return Err(Error::InvalidArgument(
                "element field values have not been calculated".to_string(),
            ));
        }
        Ok(())
    }

    fn selected(&self, component: Option<usize>) -> Result<Vec<usize>> {
        match component {
            None => Ok((0..self.components.len()).collect()),
            Some(c) if c < self.components.len() => Ok(vec![c]),
            Some(c) => Err(Error::InvalidArgument(format!(
                "component {c} out of range for {} components",
                self.components.len()
            ))),
        }
    }

    fn defining_xi(&self, xi: &[FeValue]) -> Result<Vec<FeValue>> {
        if xi.len() != self.dimension {
            return Err(Error::InvalidArgument(format!(
                "expected {} xi coordinates, got {}",
                self.dimension,
                xi.len()
            )));
        }
        match &self.xi_map {
            Some(map) => map.apply(xi),
            None => Ok(xi.to_vec()),
        }
    }

    fn indexed_value(&self, table: &[Value], xi: &[FeValue]) -> Result<Value> {
        let indexer = self
            .indexer
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("indexer values are missing".to_string()))?;
        let mut index = [0.0];
        indexer.evaluate(Some(0), xi, &mut index, None)?;
        let index = index[0].round() as i64;
        usize::try_from(index - 1)
            .ok()
            .and_then(|i| table.get(i))
            .cloned()
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "index {index} out of range 1..={}",
                    table.len()
                ))
            })
    }

    /// Evaluate the field at a point of the element
    ///
    /// `values` receives the value of the selected component, or of every component if
    /// `component` is None. If given, `jacobian` receives the derivatives of each of those
    /// components with respect to the element's xi, xi varying fastest.
    pub fn evaluate(
        &self,
        component: Option<usize>,
        xi: &[FeValue],
        values: &mut [FeValue],
        mut jacobian: Option<&mut [FeValue]>,
    ) -> Result<()> {
        self.check_calculated()?;
        let selected = self.selected(component)?;
        let dimension = self.dimension;
        if values.len() < selected.len() {
            return Err(Error::InvalidArgument(format!(
                "space for {} values is needed",
                selected.len()
            )));
        }
        if let Some(jacobian) = &jacobian {
            if selected
                .iter()
                .any(|c| matches!(self.components[*c], ComponentValues::Grid { .. }))
            {
                return Err(Error::InvalidArgument(
                    "grid based fields have no derivatives".to_string(),
                ));
            }
            if !self.derivatives_calculated {
                return Err(Error::InvalidArgument(
                    "derivatives were not calculated".to_string(),
                ));
            }
            if jacobian.len() < selected.len() * dimension {
                return Err(Error::InvalidArgument(format!(
                    "space for {} derivatives is needed",
                    selected.len() * dimension
                )));
            }
        }
        let local_xi = self.defining_xi(xi)?;
        let nderivs = if jacobian.is_some() { 1 } else { 0 };

        for (k, c) in selected.iter().enumerate() {
            let mut local_derivatives = vec![];
            values[k] = match &self.components[*c] {
                ComponentValues::Basis {
                    basis,
                    coefficients,
                } => {
                    let shape = basis.tabulate_array_shape(nderivs);
                    let mut table = vec![0.0; shape[0] * shape[1]];
                    basis.tabulate(&local_xi, nderivs, &mut table)?;
                    let n = shape[1];
                    for row in 1..shape[0] {
                        local_derivatives.push(
                            coefficients
                                .iter()
                                .zip(&table[row * n..(row + 1) * n])
                                .map(|(a, b)| a * b)
                                .sum::<FeValue>(),
                        );
                    }
                    coefficients
                        .iter()
                        .zip(&table[..n])
                        .map(|(a, b)| a * b)
                        .sum()
                }
                ComponentValues::Grid { map, values } => grid_value(map, values, &local_xi)?,
                ComponentValues::Constant(value) => numeric(value)?,
                ComponentValues::Indexed(table) => numeric(&self.indexed_value(table, xi)?)?,
            };
            if let Some(jacobian) = jacobian.as_deref_mut() {
                let row = &mut jacobian[k * dimension..(k + 1) * dimension];
                if local_derivatives.is_empty() {
                    row.fill(0.0);
                    continue;
                }
                match &self.xi_map {
                    None => row.copy_from_slice(&local_derivatives),
                    Some(map) => {
                        for (e, entry) in row.iter_mut().enumerate() {
                            *entry = local_derivatives
                                .iter()
                                .enumerate()
                                .map(|(d, v)| v * map.matrix_entry(d, e))
                                .sum();
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate a component as an integer
    ///
    /// Grid based components take the value at the nearest grid point; blended values are
    /// rounded.
    pub fn evaluate_int(&self, component: usize, xi: &[FeValue]) -> Result<i32> {
        self.check_calculated()?;
        self.selected(Some(component))?;
        let value = match &self.components[component] {
            ComponentValues::Grid { map, values } => {
                numeric(&nearest_grid_value(map, values, &self.defining_xi(xi)?)?)?
            }
            _ => {
                let mut value = [0.0];
                self.evaluate(Some(component), xi, &mut value, None)?;
                value[0]
            }
        };
        Ok(value.round() as i32)
    }

    /// Evaluate a component as a string
    ///
    /// Grid based components take the value at the nearest grid point.
    pub fn evaluate_as_string(&self, component: usize, xi: &[FeValue]) -> Result<String> {
        self.check_calculated()?;
        self.selected(Some(component))?;
        Ok(match &self.components[component] {
            ComponentValues::Grid { map, values } => {
                nearest_grid_value(map, values, &self.defining_xi(xi)?)?.to_string()
            }
            ComponentValues::Constant(value) => value.to_string(),
            ComponentValues::Indexed(table) => self.indexed_value(table, xi)?.to_string(),
            ComponentValues::Basis { .. } => {
                let mut value = [0.0];
                self.evaluate(Some(component), xi, &mut value, None)?;
                value[0].to_string()
            }
        })
    }
}

fn numeric(value: &Value) -> Result<FeValue> {
    value.as_fe_value().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{} values cannot be evaluated as numbers",
            value.value_type()
        ))
    })
}

/// The cell of the grid containing a point in each direction and the position in that cell
fn grid_cell(map: &GridMap, xi: &[FeValue]) -> Vec<(usize, FeValue)> {
    map.number_in_xi()
        .iter()
        .zip(xi)
        .map(|(n, x)| {
            let scaled = x.clamp(0.0, 1.0) * *n as FeValue;
            let cell = (scaled.floor() as usize).min(n - 1);
            (cell, scaled - cell as FeValue)
        })
        .collect()
}

/// Interpolate grid values multilinearly
fn grid_value(map: &GridMap, values: &[Value], xi: &[FeValue]) -> Result<FeValue> {
    let cell = grid_cell(map, xi);
    let mut result = 0.0;
    for corner in cell
        .iter()
        .map(|_| [false, true])
        .multi_cartesian_product()
    {
        let weight = cell
            .iter()
            .zip(&corner)
            .map(|((_, local), upper)| if *upper { *local } else { 1.0 - local })
            .product::<FeValue>();
        if weight == 0.0 {
            continue;
        }
        let point = cell
            .iter()
            .zip(&corner)
            .map(|((i, _), upper)| i + usize::from(*upper))
            .collect::<Vec<_>>();
        result += weight * numeric(&values[map.grid_point_offset(&point)?])?;
    }
    Ok(result)
}

fn nearest_grid_value(map: &GridMap, values: &[Value], xi: &[FeValue]) -> Result<Value> {
    let point = map
        .number_in_xi()
        .iter()
        .zip(xi)
        .map(|(n, x)| (x.clamp(0.0, 1.0) * *n as FeValue).round() as usize)
        .collect::<Vec<_>>();
    values
        .get(map.grid_point_offset(&point)?)
        .cloned()
        .ok_or_else(|| Error::InvalidArgument("grid point out of range".to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::basis::ThetaModifyMode;
    use crate::element::shape::ShapeType;
    use crate::field::FieldBuilder;
    use crate::grid::element::ElementBuilder;
    use crate::grid::node::{NodalValueKey, NodeBuilder, NodeFieldLayout};
    use crate::types::{ElementIdentifier, ValueType};
    use approx::*;
    use std::f64::consts::PI;

    /// A square with a 2x2 interval grid field whose value at grid point k is k + 1
    fn grid_square(region: &mut Region) -> (FieldHandle, ElementHandle) {
        let field = region
            .add_field(FieldBuilder::new("temperature", 1).build().unwrap())
            .unwrap();
        let definition = region.field(field).unwrap().clone();
        let shape = region.get_shape(&ShapeType::line(2).unwrap());
        let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
        builder
            .define_field(
                field,
                &definition,
                vec![ElementFieldComponent::grid_based(vec![2, 2], 0).unwrap()],
            )
            .unwrap();
        for k in 0..9 {
            builder
                .set_grid_value(field, 0, k, Value::FeValue(k as FeValue + 1.0))
                .unwrap();
        }
        let element = region.add_element(builder.finalize()).unwrap();
        (field, element)
    }

    #[test]
    fn test_grid_field() {
        let mut region = Region::new();
        let (field, element) = grid_square(&mut region);
        assert_eq!(
            region
                .element(element)
                .unwrap()
                .grid_values(field, 0)
                .unwrap()
                .len(),
            9
        );
        let mut cache = ElementFieldValues::new();
        cache
            .calculate(&region, element, field, 0.0, true, None)
            .unwrap();
        assert!(!cache.derivatives_calculated());
        let mut value = [0.0];
        cache.evaluate(None, &[0.0, 0.0], &mut value, None).unwrap();
        assert_eq!(value[0], 1.0);
        cache.evaluate(None, &[1.0, 0.5], &mut value, None).unwrap();
        assert_eq!(value[0], 6.0);
        // Between grid points 0, 1, 3 and 4
        cache
            .evaluate(None, &[0.25, 0.25], &mut value, None)
            .unwrap();
        assert_relative_eq!(value[0], 0.25 * (1.0 + 2.0 + 4.0 + 5.0));

        let mut jacobian = [0.0; 2];
        assert!(cache
            .evaluate(None, &[0.0, 0.0], &mut value, Some(&mut jacobian))
            .is_err());
        assert_eq!(cache.evaluate_int(0, &[0.4, 0.0]).unwrap(), 2);
        assert_eq!(cache.evaluate_as_string(0, &[1.0, 1.0]).unwrap(), "9");
    }

    #[test]
    fn test_string_grid_field() {
        let mut region = Region::new();
        let field = region
            .add_field(
                FieldBuilder::new("label", 1)
                    .value_type(ValueType::String)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let definition = region.field(field).unwrap().clone();
        let shape = region.get_shape(&ShapeType::line(1).unwrap());
        let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
        builder
            .define_field(
                field,
                &definition,
                vec![ElementFieldComponent::grid_based(vec![1], 0).unwrap()],
            )
            .unwrap()
            .set_grid_value(field, 0, 0, Value::String("left".to_string()))
            .unwrap()
            .set_grid_value(field, 0, 1, Value::String("right".to_string()))
            .unwrap();
        let element = region.add_element(builder.finalize()).unwrap();
        let mut cache = ElementFieldValues::new();
        cache
            .calculate(&region, element, field, 0.0, false, None)
            .unwrap();
        assert_eq!(cache.evaluate_as_string(0, &[0.2]).unwrap(), "left");
        assert_eq!(cache.evaluate_as_string(0, &[0.7]).unwrap(), "right");
        let mut value = [0.0];
        assert!(cache.evaluate(None, &[0.2], &mut value, None).is_err());
    }

    /// A line with cubic Hermite values at two nodes
    fn hermite_line(
        region: &mut Region,
        values: [[FeValue; 2]; 2],
    ) -> (FieldHandle, ElementHandle) {
        let field = region
            .add_field(FieldBuilder::new("u", 1).build().unwrap())
            .unwrap();
        let definition = region.field(field).unwrap().clone();
        let mut nodes = vec![];
        for (i, [value, derivative]) in values.into_iter().enumerate() {
            let mut layout = NodeFieldLayout::new(1);
            layout
                .define_derivative(None, crate::types::NodalValueType::DS1)
                .unwrap();
            let mut builder = NodeBuilder::new(i as i32 + 1);
            builder
                .define_field(field, &definition, layout, None)
                .unwrap()
                .set_values(field, &[Value::FeValue(value), Value::FeValue(derivative)])
                .unwrap();
            nodes.push(region.add_node(builder.finalize()).unwrap());
        }
        let shape = region.get_shape(&ShapeType::line(1).unwrap());
        let basis = region.get_basis(&"c.Hermite".parse().unwrap());
        let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
        builder.set_number_of_nodes(2).unwrap();
        builder.set_node(0, nodes[0]).unwrap();
        builder.set_node(1, nodes[1]).unwrap();
        builder
            .define_field(
                field,
                &definition,
                vec![ElementFieldComponent::node_based_unscaled(basis).unwrap()],
            )
            .unwrap();
        let element = region.add_element(builder.finalize()).unwrap();
        (field, element)
    }

    #[test]
    fn test_hermite_values_and_derivatives() {
        let mut region = Region::new();
        // u = x^2 has u(0) = 0, u'(0) = 0, u(1) = 1, u'(1) = 2
        let (field, element) = hermite_line(&mut region, [[0.0, 0.0], [1.0, 2.0]]);
        let mut cache = ElementFieldValues::new();
        cache
            .calculate(&region, element, field, 0.0, true, None)
            .unwrap();
        assert!(cache.is_for_element_and_time(element, field, 0.0, None));
        assert!(!cache.is_for_element_and_time(element, field, 1.0, None));
        let other = region
            .add_field(FieldBuilder::new("v", 1).build().unwrap())
            .unwrap();
        assert!(!cache.is_for_element_and_time(element, other, 0.0, None));
        assert_eq!(cache.coefficients(0).unwrap(), &[0.0, 0.0, 1.0, 2.0]);
        for x in [0.0, 0.3, 0.5, 0.8, 1.0] {
            let mut value = [0.0];
            let mut jacobian = [0.0];
            cache
                .evaluate(Some(0), &[x], &mut value, Some(&mut jacobian))
                .unwrap();
            assert_relative_eq!(value[0], x * x, epsilon = 1e-13);
            assert_relative_eq!(jacobian[0], 2.0 * x, epsilon = 1e-13);
        }
        assert_eq!(cache.evaluate_int(0, &[0.8]).unwrap(), 1);
        assert!(cache.evaluate(Some(1), &[0.5], &mut [0.0], None).is_err());
        assert!(cache.evaluate(None, &[0.5, 0.5], &mut [0.0], None).is_err());
    }

    #[test]
    fn test_jacobian_needs_derivatives() {
        let mut region = Region::new();
        let (field, element) = hermite_line(&mut region, [[0.0, 1.0], [1.0, 1.0]]);
        let mut cache = ElementFieldValues::new();
        cache
            .calculate(&region, element, field, 0.0, false, None)
            .unwrap();
        let mut jacobian = [0.0];
        assert!(cache
            .evaluate(None, &[0.5], &mut [0.0], Some(&mut jacobian))
            .is_err());
        cache.clear();
        assert!(cache.evaluate(None, &[0.5], &mut [0.0], None).is_err());
        assert_eq!(cache.element(), None);
    }

    #[test]
    fn test_inherited_evaluation() {
        let mut region = Region::new();
        let field = region
            .add_field(FieldBuilder::new("coordinates", 2).build().unwrap())
            .unwrap();
        let definition = region.field(field).unwrap().clone();
        let mut nodes = vec![];
        for (i, (x, y)) in [(0.0, 0.0), (2.0, 0.0), (0.0, 3.0), (2.0, 3.0)]
            .into_iter()
            .enumerate()
        {
            let mut builder = NodeBuilder::new(i as i32 + 1);
            builder
                .define_field(field, &definition, NodeFieldLayout::new(2), None)
                .unwrap()
                .set_values(field, &[Value::FeValue(x), Value::FeValue(y)])
                .unwrap();
            nodes.push(region.add_node(builder.finalize()).unwrap());
        }
        let shape = region.get_shape(&ShapeType::line(2).unwrap());
        let basis = region.get_basis(&"l.Lagrange*l.Lagrange".parse().unwrap());
        let component = ElementFieldComponent::node_based_unscaled(basis).unwrap();
        let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
        builder.set_number_of_nodes(4).unwrap();
        for (i, n) in nodes.iter().enumerate() {
            builder.set_node(i, *n).unwrap();
        }
        builder
            .define_field(field, &definition, vec![component.clone(), component])
            .unwrap();
        let element = region.add_element(builder.finalize()).unwrap();
        region.define_faces(element).unwrap();
        // Face 3 is xi2 = 1, parameterised by xi1
        let face = region.element(element).unwrap().face(3).unwrap();

        let mut cache = ElementFieldValues::new();
        cache
            .calculate(&region, face, field, 0.0, true, None)
            .unwrap();
        assert_eq!(cache.defining_element(), Some(element));
        let mut values = [0.0; 2];
        let mut jacobian = [0.0; 2];
        cache
            .evaluate(None, &[0.25], &mut values, Some(&mut jacobian))
            .unwrap();
        assert_relative_eq!(values[0], 0.5, epsilon = 1e-14);
        assert_relative_eq!(values[1], 3.0, epsilon = 1e-14);
        assert_relative_eq!(jacobian[0], 2.0, epsilon = 1e-14);
        assert_relative_eq!(jacobian[1], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_constant_and_indexed_fields() {
        let mut region = Region::new();
        let (_, element) = grid_square(&mut region);
        let gravity = region
            .add_field(
                FieldBuilder::new("gravity", 2)
                    .constant(vec![Value::FeValue(0.0), Value::FeValue(-9.8)])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let mut cache = ElementFieldValues::new();
        cache
            .calculate(&region, element, gravity, 0.0, true, None)
            .unwrap();
        let mut values = [0.0; 2];
        let mut jacobian = [1.0; 4];
        cache
            .evaluate(None, &[0.3, 0.3], &mut values, Some(&mut jacobian))
            .unwrap();
        assert_eq!(values, [0.0, -9.8]);
        assert_eq!(jacobian, [0.0; 4]);

        let material = region
            .add_field(
                FieldBuilder::new("material", 1)
                    .value_type(ValueType::Int)
                    .constant(vec![Value::Int(2)])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let stiffness = region
            .add_field(
                FieldBuilder::new("stiffness", 1)
                    .indexed(material, 3, vec![
                        Value::FeValue(10.0),
                        Value::FeValue(20.0),
                        Value::FeValue(30.0),
                    ])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        cache
            .calculate(&region, element, stiffness, 0.0, false, None)
            .unwrap();
        let mut value = [0.0];
        cache.evaluate(None, &[0.5, 0.5], &mut value, None).unwrap();
        assert_eq!(value[0], 20.0);
        assert_eq!(cache.evaluate_as_string(0, &[0.5, 0.5]).unwrap(), "20");
    }

    #[test]
    fn test_theta_modification() {
        let mut region = Region::new();
        let field = region
            .add_field(FieldBuilder::new("theta", 1).build().unwrap())
            .unwrap();
        let definition = region.field(field).unwrap().clone();
        let mut nodes = vec![];
        for (i, theta) in [1.5 * PI, 0.25 * PI].into_iter().enumerate() {
            let mut builder = NodeBuilder::new(i as i32 + 1);
            builder
                .define_field(field, &definition, NodeFieldLayout::new(1), None)
                .unwrap()
                .set_value(field, &NodalValueKey::value(0), 0.0, Value::FeValue(theta))
                .unwrap();
            nodes.push(region.add_node(builder.finalize()).unwrap());
        }
        let shape = region.get_shape(&ShapeType::line(1).unwrap());
        let basis = region.get_basis(&"l.Lagrange".parse().unwrap());
        let component = ElementFieldComponent::node_based_unscaled(basis)
            .unwrap()
            .with_modify(ThetaModifyMode::IncreasingInXi1)
            .unwrap();
        let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
        builder.set_number_of_nodes(2).unwrap();
        builder.set_node(0, nodes[0]).unwrap();
        builder.set_node(1, nodes[1]).unwrap();
        builder
            .define_field(field, &definition, vec![component])
            .unwrap();
        let element = region.add_element(builder.finalize()).unwrap();

        let mut cache = ElementFieldValues::new();
        cache
            .calculate(&region, element, field, 0.0, false, None)
            .unwrap();
        let coefficients = cache.coefficients(0).unwrap();
        assert_relative_eq!(coefficients[0], 1.5 * PI);
        assert_relative_eq!(coefficients[1], 2.25 * PI);

        cache.set_no_modify(true);
        cache
            .calculate(&region, element, field, 0.0, false, None)
            .unwrap();
        assert!(cache.no_modify());
        assert_relative_eq!(cache.coefficients(0).unwrap()[1], 0.25 * PI);
    }
}
