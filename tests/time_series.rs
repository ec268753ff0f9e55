use approx::assert_relative_eq;
use fefield::element::shape::ShapeType;
use fefield::field::FieldBuilder;
use fefield::grid::element::ElementBuilder;
use fefield::grid::maps::ElementFieldComponent;
use fefield::grid::node::{NodalValueKey, NodeBuilder, NodeFieldLayout};
use fefield::grid::region::{Region, RegionOptions};
use fefield::time::{TimeSeries, TimeSeriesSet};
use fefield::types::{ElementIdentifier, Value};
use std::rc::Rc;

#[test]
fn test_interpolation_bracketing() {
    let series = TimeSeries::new(&[0.0, 2.0, 4.0]).unwrap();
    let inside = series.interpolation_for_time(1.0);
    assert_eq!((inside.index_one, inside.index_two), (0, 1));
    assert_relative_eq!(inside.xi, 0.5);
    let before = series.interpolation_for_time(-1.0);
    assert_eq!((before.index_one, before.index_two, before.xi), (0, 0, 0.0));
    assert!(!before.in_range);
    let after = series.interpolation_for_time(10.0);
    assert_eq!((after.index_one, after.index_two, after.xi), (2, 2, 0.0));
}

#[test]
fn test_merged_series_are_shared() {
    let mut set = TimeSeriesSet::new();
    let a = set.get_or_create_matching(&[0.0, 1.0]).unwrap();
    let b = set.get_or_create_matching(&[0.5, 1.0, 2.0]).unwrap();
    let union = set.merge(&a, &b).unwrap();
    assert_eq!(union.times(), &[0.0, 0.5, 1.0, 2.0]);
    assert!(Rc::ptr_eq(&union, &set.merge(&b, &a).unwrap()));
    assert!(Rc::ptr_eq(&a, &set.merge(&a, &a).unwrap()));
    assert_eq!(set.len(), 3);
    // Inputs are unchanged
    assert_eq!(a.times(), &[0.0, 1.0]);
}

/// A region with one node storing u = 10 t at times 0, 1 and 2
fn region_with_options(options: RegionOptions) -> Region {
    let mut region = Region::with_options(options);
    let times = region.get_time_series(&[0.0, 1.0, 2.0]).unwrap();
    let u = region
        .add_field(
            FieldBuilder::new("u", 1)
                .time_series(Some(times))
                .build()
                .unwrap(),
        )
        .unwrap();
    let definition = region.field(u).unwrap().clone();
    let mut builder = NodeBuilder::new(1);
    builder
        .define_field(u, &definition, NodeFieldLayout::new(1), None)
        .unwrap()
        .set_values(
            u,
            &[Value::FeValue(0.0), Value::FeValue(10.0), Value::FeValue(20.0)],
        )
        .unwrap();
    region.add_node(builder.finalize()).unwrap();
    region
}

#[test]
fn test_nodal_values_between_times() {
    let region = region_with_options(RegionOptions::default());
    let u = region.find_field_by_name("u").unwrap();
    let node = region.find_node(1).unwrap();
    let key = NodalValueKey::value(0);
    assert_eq!(
        region.nodal_value(node, u, &key, 1.5).unwrap(),
        Value::FeValue(15.0)
    );
    assert_eq!(
        region.nodal_value(node, u, &key, 1.0).unwrap(),
        Value::FeValue(10.0)
    );
    assert_eq!(region.evaluate_at_node(node, u, 0.25).unwrap(), vec![2.5]);
    assert_eq!(region.time_series().len(), 1);
    assert_eq!(
        region.node(node).unwrap().time_range_of_value(u, &key).unwrap(),
        (0.0, 20.0)
    );
}

#[test]
fn test_exact_times_only() {
    let mut options = RegionOptions::default();
    options.set_time_interpolation(false);
    let region = region_with_options(options);
    let u = region.find_field_by_name("u").unwrap();
    let node = region.find_node(1).unwrap();
    let key = NodalValueKey::value(0);
    assert!(region
        .nodal_value(node, u, &key, 1.5)
        .unwrap_err()
        .is_not_found());
    assert_eq!(
        region.nodal_value(node, u, &key, 2.0).unwrap(),
        Value::FeValue(20.0)
    );
}

#[test]
fn test_element_evaluation_at_exact_times_only() {
    let mut options = RegionOptions::default();
    options.set_time_interpolation(false);
    let mut region = region_with_options(options);
    let u = region.find_field_by_name("u").unwrap();
    let definition = region.field(u).unwrap().clone();
    let mut builder = NodeBuilder::new(2);
    builder
        .define_field(u, &definition, NodeFieldLayout::new(1), None)
        .unwrap()
        .set_values(
            u,
            &[Value::FeValue(0.0), Value::FeValue(30.0), Value::FeValue(60.0)],
        )
        .unwrap();
    let second = region.add_node(builder.finalize()).unwrap();
    let first = region.find_node(1).unwrap();
    let shape = region.get_shape(&ShapeType::line(1).unwrap());
    let basis = region.get_basis(&"l.Lagrange".parse().unwrap());
    let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
    builder
        .set_number_of_nodes(2)
        .unwrap()
        .set_node(0, first)
        .unwrap()
        .set_node(1, second)
        .unwrap()
        .define_field(
            u,
            &definition,
            vec![ElementFieldComponent::node_based_unscaled(basis).unwrap()],
        )
        .unwrap();
    let element = region.add_element(builder.finalize()).unwrap();

    assert!(region
        .evaluate_in_element(element, u, &[0.5], 0.5, false)
        .unwrap_err()
        .is_not_found());
    let (values, _) = region
        .evaluate_in_element(element, u, &[0.5], 1.0, false)
        .unwrap();
    assert_relative_eq!(values[0], 20.0);

    region.options_mut().set_time_interpolation(true);
    let (values, _) = region
        .evaluate_in_element(element, u, &[0.5], 0.5, false)
        .unwrap();
    assert_relative_eq!(values[0], 10.0);
}
