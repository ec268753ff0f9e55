//! Assembly of basis coefficients from node values and scale factors

use crate::grid::arena::FieldHandle;
use crate::grid::element::Element;
use crate::grid::maps::{ElementFieldComponent, LinearWeight, NodeMap};
use crate::grid::node::NodeField;
use crate::grid::region::Region;
use crate::types::{Error, FeValue, Result};

fn nodal_value(
    node_field: &NodeField,
    component: usize,
    index: usize,
    time: FeValue,
    interpolate: bool,
) -> Result<FeValue> {
    let value = if interpolate {
        node_field.component_value_at(component, index, time)?
    } else {
        node_field.component_value_exact(component, index, time)?
    };
    value.as_fe_value().ok_or_else(|| {
        Error::InvalidArgument(format!(
            "{} values cannot be used as basis coefficients",
            node_field.storage().value_type()
        ))
    })
}

fn scale_factor(element: &Element, index: usize) -> Result<FeValue> {
    element.scale_factor(index).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "scale factor {index} out of range for {}",
            element.identifier()
        ))
    })
}

/// Assemble the basis coefficients of a node based component of a field on an element
///
/// Node value indices count from the first value of `component_number` at the node.
/// A standard map gives each coefficient as a node value, or zero if no value is mapped,
/// multiplied by a scale factor, or one if no scale factor is mapped. A general map gives
/// each coefficient as a weighted sum of node values. Values of time varying fields are
/// interpolated at `time` if the region options allow it; otherwise `time` must be one of
/// the stored times.
pub fn assemble_coefficients(
    region: &Region,
    element: &Element,
    field: FieldHandle,
    component_number: usize,
    component: &ElementFieldComponent,
    time: FeValue,
) -> Result<Vec<FeValue>> {
    let ElementFieldComponent::NodeBased { basis, maps, .. } = component else {
        return Err(Error::InvalidArgument(
            "grid based components have no basis coefficients".to_string(),
        ));
    };
    let interpolate = region.options().time_interpolation();
    let mut coefficients = Vec::with_capacity(basis.number_of_functions());
    for map in maps {
        let node = element
            .node(map.node_index())
            .and_then(|n| region.node(n))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "node {} of {} is not set",
                    map.node_index() + 1,
                    element.identifier()
                ))
            })?;
        let node_field = node.field(field).ok_or_else(|| {
            Error::NotFound(format!(
                "field is not defined at node {} of {}",
                node.identifier(),
                element.identifier()
            ))
        })?;
        match map {
            NodeMap::Standard(map) => {
                for (value_index, scale_index) in map
                    .nodal_value_indices()
                    .iter()
                    .zip(map.scale_factor_indices())
                {
                    let value = match value_index {
                        Some(i) => {
                            nodal_value(node_field, component_number, *i, time, interpolate)?
                        }
                        None => 0.0,
                    };
                    coefficients.push(match scale_index {
                        Some(s) => value * scale_factor(element, *s)?,
                        None => value,
                    });
                }
            }
            NodeMap::General(map) => {
                for combination in map.combinations() {
                    let mut sum = 0.0;
                    for term in combination {
                        let value = nodal_value(
                            node_field,
                            component_number,
                            term.nodal_value_index,
                            time,
                            interpolate,
                        )?;
                        sum += match term.weight {
                            LinearWeight::Unit => value,
                            LinearWeight::ScaleFactor(s) => value * scale_factor(element, s)?,
                            LinearWeight::Constant(c) => value * c,
                        };
                    }
                    coefficients.push(sum);
                }
            }
        }
    }
    Ok(coefficients)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::shape::ShapeType;
    use crate::field::FieldBuilder;
    use crate::grid::element::{ElementBuilder, ScaleFactorSet, ScaleFactorSetIdentifier};
    use crate::grid::maps::{GeneralNodeMap, LinearTerm, StandardNodeMap};
    use crate::grid::node::{NodalValueKey, NodeBuilder, NodeFieldLayout};
    use crate::types::{ElementIdentifier, NodalValueType, Value};

    /// A line element on two nodes storing a value and a derivative, with two scale factors
    fn setup(region: &mut Region) -> (FieldHandle, crate::grid::arena::ElementHandle) {
        let field = region
            .add_field(FieldBuilder::new("u", 1).build().unwrap())
            .unwrap();
        let definition = region.field(field).unwrap().clone();
        let mut nodes = vec![];
        for (i, (value, derivative)) in [(0.1, 0.7), (0.3, 1.9)].into_iter().enumerate() {
            let mut layout = NodeFieldLayout::new(1);
            layout
                .define_derivative(None, NodalValueType::DS1)
                .unwrap();
            let mut builder = NodeBuilder::new(i as i32 + 1);
            builder
                .define_field(field, &definition, layout, None)
                .unwrap()
                .set_value(field, &NodalValueKey::value(0), 0.0, Value::FeValue(value))
                .unwrap()
                .set_value(
                    field,
                    &NodalValueKey::new(0, 0, NodalValueType::DS1),
                    0.0,
                    Value::FeValue(derivative),
                )
                .unwrap();
            nodes.push(region.add_node(builder.finalize()).unwrap());
        }
        let shape = region.get_shape(&ShapeType::line(1).unwrap());
        let basis = region.get_basis(&"c.Hermite".parse().unwrap());
        let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
        builder
            .set_number_of_nodes(2)
            .unwrap()
            .set_node(0, nodes[0])
            .unwrap()
            .set_node(1, nodes[1])
            .unwrap()
            .set_scale_factor_sets(vec![ScaleFactorSet {
                identifier: ScaleFactorSetIdentifier::Basis(basis.basis_type().clone()),
                count: 2,
            }])
            .unwrap()
            .set_scale_factor(0, 2.0)
            .unwrap()
            .set_scale_factor(1, 3.0)
            .unwrap();
        let component = ElementFieldComponent::node_based(
            basis,
            vec![
                NodeMap::Standard(StandardNodeMap::from_offsets(0, &[0, 1], &[-1, 0]).unwrap()),
                NodeMap::Standard(StandardNodeMap::from_offsets(1, &[0, 1], &[-1, 1]).unwrap()),
            ],
        )
        .unwrap();
        builder
            .define_field(field, &definition, vec![component])
            .unwrap();
        let element = region.add_element(builder.finalize()).unwrap();
        (field, element)
    }

    #[test]
    fn test_standard_map() {
        let mut region = Region::new();
        let (field, element) = setup(&mut region);
        let element = region.element(element).unwrap();
        let component = &element.field(field).unwrap().components()[0];
        let coefficients =
            assemble_coefficients(&region, element, field, 0, component, 0.0).unwrap();
        // Unit scale factors leave values exactly unchanged
        assert_eq!(coefficients[0], 0.1);
        assert_eq!(coefficients[1], 0.7 * 2.0);
        assert_eq!(coefficients[2], 0.3);
        assert_eq!(coefficients[3], 1.9 * 3.0);
    }

    #[test]
    fn test_absent_value_is_zero() {
        let mut region = Region::new();
        let (field, element) = setup(&mut region);
        let element = region.element(element).unwrap().clone();
        let basis = element.field(field).unwrap().components()[0]
            .basis()
            .unwrap()
            .clone();
        let component = ElementFieldComponent::node_based(
            basis,
            vec![
                NodeMap::Standard(StandardNodeMap::from_offsets(0, &[-1, 1], &[0, -1]).unwrap()),
                NodeMap::General(GeneralNodeMap::new(
                    1,
                    vec![
                        vec![],
                        vec![
                            LinearTerm {
                                nodal_value_index: 0,
                                weight: LinearWeight::Constant(2.0),
                            },
                            LinearTerm {
                                nodal_value_index: 1,
                                weight: LinearWeight::ScaleFactor(1),
                            },
                        ],
                    ],
                )),
            ],
        )
        .unwrap();
        let coefficients =
            assemble_coefficients(&region, &element, field, 0, &component, 0.0).unwrap();
        assert_eq!(coefficients[0], 0.0);
        assert_eq!(coefficients[1], 0.7);
        assert_eq!(coefficients[2], 0.0);
        assert_eq!(coefficients[3], 0.3 * 2.0 + 1.9 * 3.0);
    }

    #[test]
    fn test_undefined_at_node() {
        let mut region = Region::new();
        let (_, element) = setup(&mut region);
        let other = region
            .add_field(FieldBuilder::new("v", 1).build().unwrap())
            .unwrap();
        let element = region.element(element).unwrap();
        let component = element.fields().next().unwrap().components()[0].clone();
        assert!(assemble_coefficients(&region, element, other, 0, &component, 0.0)
            .unwrap_err()
            .is_not_found());
    }
}
