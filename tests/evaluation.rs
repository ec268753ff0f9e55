use approx::assert_relative_eq;
use fefield::element::shape::ShapeType;
use fefield::evaluation::{top_level_element_and_xi, ElementFieldValues};
use fefield::field::FieldBuilder;
use fefield::grid::arena::{ElementHandle, FieldHandle};
use fefield::grid::element::ElementBuilder;
use fefield::grid::maps::ElementFieldComponent;
use fefield::grid::node::{NodeBuilder, NodeFieldLayout};
use fefield::grid::region::Region;
use fefield::types::{ElementIdentifier, FeValue, NodalValueType, Value};
use rand::{Rng, SeedableRng};

/// Add an element on new nodes, with the same basis for every component
///
/// `node_values` holds, for each node, the values of the field at that node.
fn element_with_nodes(
    region: &mut Region,
    field: FieldHandle,
    shape: &str,
    basis: &str,
    layout: &NodeFieldLayout,
    node_values: &[Vec<FeValue>],
) -> ElementHandle {
    let definition = region.field(field).unwrap().clone();
    let first = region.next_free_node_identifier(1);
    let mut nodes = vec![];
    for (i, values) in node_values.iter().enumerate() {
        let mut builder = NodeBuilder::new(first + i as i32);
        builder
            .define_field(field, &definition, layout.clone(), None)
            .unwrap()
            .set_values(
                field,
                &values.iter().map(|v| Value::FeValue(*v)).collect::<Vec<_>>(),
            )
            .unwrap();
        nodes.push(region.add_node(builder.finalize()).unwrap());
    }
    let shape = region.get_shape(&shape.parse::<ShapeType>().unwrap());
    let basis = region.get_basis(&basis.parse().unwrap());
    let component = ElementFieldComponent::node_based_unscaled(basis).unwrap();
    let number = region.next_free_element_number(fefield::types::ElementCategory::Element, 1);
    let mut builder = ElementBuilder::new(ElementIdentifier::element(number), shape);
    builder.set_number_of_nodes(nodes.len()).unwrap();
    for (i, n) in nodes.iter().enumerate() {
        builder.set_node(i, *n).unwrap();
    }
    builder
        .define_field(
            field,
            &definition,
            vec![component; definition.number_of_components()],
        )
        .unwrap();
    region.add_element(builder.finalize()).unwrap()
}

#[test]
fn test_triangle_coordinates() {
    let mut region = Region::new();
    let field = region
        .add_field(FieldBuilder::new("coordinates", 2).build().unwrap())
        .unwrap();
    let element = element_with_nodes(
        &mut region,
        field,
        "simplex(2)*simplex",
        "l.simplex(2)*l.simplex",
        &NodeFieldLayout::new(2),
        &[vec![0.0, 0.0], vec![2.0, 0.0], vec![0.0, 1.0]],
    );
    let (values, jacobian) = region
        .evaluate_in_element(element, field, &[0.25, 0.5], 0.0, true)
        .unwrap();
    assert_relative_eq!(values[0], 0.5, epsilon = 1e-14);
    assert_relative_eq!(values[1], 0.5, epsilon = 1e-14);
    let jacobian = jacobian.unwrap();
    for (j, expected) in jacobian.iter().zip([2.0, 0.0, 0.0, 1.0]) {
        assert_relative_eq!(*j, expected, epsilon = 1e-14);
    }
    // Outside the triangle by more than the tolerance
    assert!(region
        .evaluate_in_element(element, field, &[0.75, 0.5], 0.0, false)
        .is_err());
}

#[test]
fn test_bicubic_hermite_reproduces_cubic() {
    // f(x, y) = x^2 y on the unit square
    let f = |x: FeValue, y: FeValue| x * x * y;
    let mut region = Region::new();
    let field = region
        .add_field(FieldBuilder::new("f", 1).build().unwrap())
        .unwrap();
    let mut layout = NodeFieldLayout::new(1);
    layout.define_derivative(None, NodalValueType::DS1).unwrap();
    layout.define_derivative(None, NodalValueType::DS2).unwrap();
    layout
        .define_derivative(None, NodalValueType::D2DS1DS2)
        .unwrap();
    let node_values = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
        .iter()
        .map(|(x, y)| vec![f(*x, *y), 2.0 * x * y, x * x, 2.0 * x])
        .collect::<Vec<_>>();
    let element = element_with_nodes(
        &mut region,
        field,
        "line*line",
        "c.Hermite*c.Hermite",
        &layout,
        &node_values,
    );

    let mut cache = ElementFieldValues::new();
    cache
        .calculate(&region, element, field, 0.0, true, None)
        .unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let xi = [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)];
        let mut value = [0.0];
        let mut jacobian = [0.0; 2];
        cache
            .evaluate(None, &xi, &mut value, Some(&mut jacobian))
            .unwrap();
        assert_relative_eq!(value[0], f(xi[0], xi[1]), epsilon = 1e-12);
        assert_relative_eq!(jacobian[0], 2.0 * xi[0] * xi[1], epsilon = 1e-12);
        assert_relative_eq!(jacobian[1], xi[0] * xi[0], epsilon = 1e-12);
    }
}

#[test]
fn test_line_of_cube_inherits_coordinates() {
    let mut region = Region::new();
    let field = region
        .add_field(FieldBuilder::new("coordinates", 3).build().unwrap())
        .unwrap();
    let corners = (0..8)
        .map(|i| vec![(i & 1) as FeValue, ((i >> 1) & 1) as FeValue, ((i >> 2) & 1) as FeValue])
        .collect::<Vec<_>>();
    let cube = element_with_nodes(
        &mut region,
        field,
        "line*line*line",
        "l.Lagrange*l.Lagrange*l.Lagrange",
        &NodeFieldLayout::new(3),
        &corners,
    );
    region.define_faces(cube).unwrap();

    let lines = region.elements_where(|e| e.dimension() == 1);
    assert_eq!(lines.len(), 24);
    for line in lines {
        assert!(region.element(line).unwrap().fields().next().is_none());
        for t in [0.0, 0.3, 1.0] {
            let (top, xi) = top_level_element_and_xi(&region, line, &[t], None).unwrap();
            assert_eq!(top, cube);
            let (values, jacobian) = region
                .evaluate_in_element(line, field, &[t], 0.0, true)
                .unwrap();
            for (v, x) in values.iter().zip(&xi) {
                assert_relative_eq!(*v, *x, epsilon = 1e-14);
            }
            // A unit tangent along one of the axes
            let jacobian = jacobian.unwrap();
            assert_relative_eq!(
                jacobian.iter().map(|j| j.abs()).sum::<FeValue>(),
                1.0,
                epsilon = 1e-14
            );
        }
    }
}

#[test]
fn test_forced_top_level_element() {
    let mut region = Region::new();
    let field = region
        .add_field(FieldBuilder::new("u", 1).build().unwrap())
        .unwrap();
    let left = element_with_nodes(
        &mut region,
        field,
        "line*line",
        "l.Lagrange*l.Lagrange",
        &NodeFieldLayout::new(1),
        &[vec![0.0], vec![1.0], vec![0.0], vec![1.0]],
    );
    let right = element_with_nodes(
        &mut region,
        field,
        "line*line",
        "l.Lagrange*l.Lagrange",
        &NodeFieldLayout::new(1),
        &[vec![5.0], vec![5.0], vec![5.0], vec![5.0]],
    );
    // Share the xi1 = 1 face of the left element as the xi1 = 0 face of the right one
    region.define_faces(left).unwrap();
    let shared = region.element(left).unwrap().face(1).unwrap();
    region.set_element_face(right, 0, shared).unwrap();
    assert_eq!(region.ancestors(shared).unwrap().len(), 2);

    let mut cache = ElementFieldValues::new();
    cache
        .calculate(&region, shared, field, 0.0, false, Some(right))
        .unwrap();
    assert_eq!(cache.defining_element(), Some(right));
    let mut value = [0.0];
    cache.evaluate(None, &[0.5], &mut value, None).unwrap();
    assert_relative_eq!(value[0], 5.0);

    cache
        .calculate(&region, shared, field, 0.0, false, Some(left))
        .unwrap();
    assert!(cache.is_for_element_and_time(shared, field, 0.0, Some(left)));
    cache.evaluate(None, &[0.5], &mut value, None).unwrap();
    assert_relative_eq!(value[0], 1.0);
}

#[test]
fn test_time_varying_coordinates() {
    let mut region = Region::new();
    let times = region.get_time_series(&[0.0, 2.0]).unwrap();
    let field = region
        .add_field(
            FieldBuilder::new("x", 1)
                .time_series(Some(times))
                .build()
                .unwrap(),
        )
        .unwrap();
    // Values are stored time fastest: node 1 stays at 0, node 2 moves from 1 to 3
    let element = element_with_nodes(
        &mut region,
        field,
        "line",
        "l.Lagrange",
        &NodeFieldLayout::new(1),
        &[vec![0.0, 0.0], vec![1.0, 3.0]],
    );
    for (time, expected) in [(0.0, 0.5), (1.0, 1.0), (2.0, 1.5), (10.0, 1.5), (-1.0, 0.5)] {
        let (values, _) = region
            .evaluate_in_element(element, field, &[0.5], time, false)
            .unwrap();
        assert_relative_eq!(values[0], expected, epsilon = 1e-14);
    }
}
