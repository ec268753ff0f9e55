use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fefield::element::shape::ShapeType;
use fefield::evaluation::ElementFieldValues;
use fefield::field::FieldBuilder;
use fefield::grid::arena::{ElementHandle, FieldHandle};
use fefield::grid::element::ElementBuilder;
use fefield::grid::maps::ElementFieldComponent;
use fefield::grid::node::{NodeBuilder, NodeFieldLayout};
use fefield::grid::region::Region;
use fefield::types::{ElementIdentifier, FeValue, Value};
use itertools::Itertools;

/// A hexahedron of the given Lagrange order with nodes on a regular lattice
fn lagrange_cube(order: usize, basis: &str) -> (Region, ElementHandle, FieldHandle) {
    let mut region = Region::new();
    let field = region
        .add_field(FieldBuilder::new("coordinates", 3).build().unwrap())
        .unwrap();
    let definition = region.field(field).unwrap().clone();
    let mut nodes = vec![];
    for ((k, j), i) in (0..=order)
        .cartesian_product(0..=order)
        .cartesian_product(0..=order)
    {
        let mut builder = NodeBuilder::new(nodes.len() as i32 + 1);
        let values = [i, j, k]
            .iter()
            .map(|n| Value::FeValue(*n as FeValue / order as FeValue))
            .collect::<Vec<_>>();
        builder
            .define_field(field, &definition, NodeFieldLayout::new(3), None)
            .unwrap()
            .set_values(field, &values)
            .unwrap();
        nodes.push(region.add_node(builder.finalize()).unwrap());
    }
    let shape = region.get_shape(&ShapeType::line(3).unwrap());
    let basis = region.get_basis(&basis.parse().unwrap());
    let component = ElementFieldComponent::node_based_unscaled(basis).unwrap();
    let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
    builder.set_number_of_nodes(nodes.len()).unwrap();
    for (i, n) in nodes.iter().enumerate() {
        builder.set_node(i, *n).unwrap();
    }
    builder
        .define_field(field, &definition, vec![component; 3])
        .unwrap();
    let element = region.add_element(builder.finalize()).unwrap();
    (region, element, field)
}

pub fn evaluation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation");
    group.sample_size(20);

    let points = (0..1000)
        .map(|i| {
            [
                (i % 10) as FeValue / 9.0,
                ((i / 10) % 10) as FeValue / 9.0,
                (i / 100) as FeValue / 9.0,
            ]
        })
        .collect::<Vec<_>>();

    for (order, basis) in [
        (1, "l.Lagrange*l.Lagrange*l.Lagrange"),
        (2, "q.Lagrange*q.Lagrange*q.Lagrange"),
        (3, "c.Lagrange*c.Lagrange*c.Lagrange"),
    ] {
        let (region, element, field) = lagrange_cube(order, basis);

        group.bench_function(format!("Calculate {basis} coefficients"), |b| {
            b.iter(|| {
                let mut cache = ElementFieldValues::new();
                cache
                    .calculate(&region, element, field, 0.0, true, None)
                    .unwrap();
                black_box(cache)
            })
        });

        let mut cache = ElementFieldValues::new();
        cache
            .calculate(&region, element, field, 0.0, true, None)
            .unwrap();
        group.bench_function(
            format!("Evaluate {basis} with derivatives at {} points", points.len()),
            |b| {
                let mut values = [0.0; 3];
                let mut jacobian = [0.0; 9];
                b.iter(|| {
                    for xi in &points {
                        cache
                            .evaluate(None, xi, &mut values, Some(&mut jacobian))
                            .unwrap();
                        black_box(&values);
                    }
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, evaluation_benchmark);
criterion_main!(benches);
