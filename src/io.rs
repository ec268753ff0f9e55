//! Import and export of regions as flat records
//!
//! Records refer to fields by name, nodes by identifier and elements by identifier, and
//! describe bases and shapes by their text descriptions, so a set of records is enough to
//! rebuild a region. Reading and writing any particular file format is left to callers.

use crate::element::basis::{BasisType, ThetaModifyMode};
use crate::element::shape::ShapeType;
use crate::field::{CmFieldType, Field, FieldBuilder, FieldType};
use crate::grid::arena::FieldHandle;
use crate::grid::element::{Element, ElementBuilder, ScaleFactorSet};
use crate::grid::maps::{ElementFieldComponent, NodeMap};
use crate::grid::node::{Node, NodeBuilder, NodeFieldLayout};
use crate::grid::region::Region;
use crate::types::{
    CoordinateSystem, ElementIdentifier, Error, FeValue, NodalValueType, Result, Value, ValueType,
};
use log::{debug, warn};

/// How the values of a field are stored
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTypeRecord {
    /// One value per component
    Constant(Vec<Value>),
    /// Values per component looked up by an indexer field
    Indexed {
        /// The name of the indexer field
        indexer: String,
        /// The number of values per component
        number_of_indexed_values: usize,
        /// The values, component by component
        values: Vec<Value>,
    },
    /// Values stored at nodes and elements
    General,
}

/// The definition of a field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRecord {
    /// Name
    pub name: String,
    /// Component names
    pub component_names: Vec<String>,
    /// Value type
    pub value_type: ValueType,
    /// Coordinate system
    pub coordinate_system: CoordinateSystem,
    /// CM field type
    pub cm_field_type: CmFieldType,
    /// The times of a time varying field
    pub times: Option<Vec<FeValue>>,
    /// Storage
    pub field_type: FieldTypeRecord,
}

/// The layout of one component of a field at a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeComponentRecord {
    /// Number of versions
    pub versions: usize,
    /// The derivatives stored with each version
    pub derivatives: Vec<NodalValueType>,
}

/// A field at a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFieldRecord {
    /// The name of the field
    pub field: String,
    /// The layout of each component
    pub components: Vec<NodeComponentRecord>,
    /// The times of time varying values
    pub times: Option<Vec<FeValue>>,
    /// All the values, in storage order with time fastest
    pub values: Vec<Value>,
}

/// A node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// Identifier
    pub identifier: i32,
    /// Fields
    pub fields: Vec<NodeFieldRecord>,
}

/// A component of a field on an element
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentRecord {
    /// Assembled from node values and blended with a basis
    NodeBased {
        /// The description of the basis
        basis: String,
        /// The node maps
        maps: Vec<NodeMap>,
        /// Theta modification
        modify: Option<ThetaModifyMode>,
    },
    /// Values at a regular grid of points
    GridBased {
        /// The number of intervals in each xi direction
        number_in_xi: Vec<usize>,
        /// The index of the first value in the element's grid values
        value_index: usize,
        /// The values at the grid points, xi1 varying fastest
        values: Vec<Value>,
    },
}

/// A field on an element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFieldRecord {
    /// The name of the field
    pub field: String,
    /// The components
    pub components: Vec<ComponentRecord>,
}

/// An element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    /// Identifier
    pub identifier: ElementIdentifier,
    /// The description of the shape, or None if it is unspecified
    pub shape: Option<String>,
    /// Dimension
    pub dimension: usize,
    /// The identifiers of the nodes
    pub nodes: Vec<Option<i32>>,
    /// Scale factor sets
    pub scale_factor_sets: Vec<ScaleFactorSet>,
    /// Scale factors
    pub scale_factors: Vec<FeValue>,
    /// Fields
    pub fields: Vec<ElementFieldRecord>,
    /// The identifiers of the faces
    pub faces: Vec<Option<ElementIdentifier>>,
}

/// The records describing a region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionRecords {
    /// Fields; indexer fields come before the fields indexed by them
    pub fields: Vec<FieldRecord>,
    /// Nodes, in identifier order
    pub nodes: Vec<NodeRecord>,
    /// Elements, in identifier order
    pub elements: Vec<ElementRecord>,
}

fn field_name(region: &Region, field: FieldHandle) -> Result<String> {
    region
        .field(field)
        .map(|f| f.name().to_string())
        .ok_or_else(|| Error::InvalidArgument("the field is not in this region".to_string()))
}

fn export_field(region: &Region, field: &Field) -> Result<FieldRecord> {
    let field_type = match field.field_type() {
        FieldType::Constant(values) => FieldTypeRecord::Constant(values.clone()),
        FieldType::Indexed {
            indexer,
            number_of_indexed_values,
            values,
        } => FieldTypeRecord::Indexed {
            indexer: field_name(region, *indexer)?,
            number_of_indexed_values: *number_of_indexed_values,
            values: values.clone(),
        },
        FieldType::General => FieldTypeRecord::General,
    };
    Ok(FieldRecord {
        name: field.name().to_string(),
        component_names: field.component_names().to_vec(),
        value_type: field.value_type(),
        coordinate_system: *field.coordinate_system(),
        cm_field_type: field.cm_field_type(),
        times: field.time_series().map(|s| s.times().to_vec()),
        field_type,
    })
}

fn export_node(region: &Region, node: &Node) -> Result<NodeRecord> {
    let fields = node
        .fields()
        .map(|node_field| -> Result<NodeFieldRecord> {
            let layout = node_field.layout();
            Ok(NodeFieldRecord {
                field: field_name(region, node_field.field())?,
                components: (0..layout.number_of_components())
                    .filter_map(|c| layout.component(c))
                    .map(|c| NodeComponentRecord {
                        versions: c.number_of_versions(),
                        derivatives: c.derivatives().to_vec(),
                    })
                    .collect(),
                times: node_field.time_series().map(|s| s.times().to_vec()),
                values: node.values(node_field.field())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(NodeRecord {
        identifier: node.identifier(),
        fields,
    })
}

fn export_element(region: &Region, element: &Element) -> Result<ElementRecord> {
    let mut fields = vec![];
    for element_field in element.fields() {
        let components = element_field
            .components()
            .iter()
            .enumerate()
            .map(|(c, component)| -> Result<ComponentRecord> {
                Ok(match component {
                    ElementFieldComponent::NodeBased {
                        basis,
                        maps,
                        modify,
                    } => ComponentRecord::NodeBased {
                        basis: basis.basis_type().to_string(),
                        maps: maps.clone(),
                        modify: *modify,
                    },
                    ElementFieldComponent::GridBased(map) => ComponentRecord::GridBased {
                        number_in_xi: map.number_in_xi().to_vec(),
                        value_index: map.value_index(),
                        values: element.grid_values(element_field.field(), c)?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        fields.push(ElementFieldRecord {
            field: field_name(region, element_field.field())?,
            components,
        });
    }
    let nodes = element
        .nodes()
        .iter()
        .map(|n| n.and_then(|n| region.node(n)).map(Node::identifier))
        .collect();
    let faces = element
        .faces()
        .iter()
        .map(|f| f.and_then(|f| region.element(f)).map(Element::identifier))
        .collect();
    Ok(ElementRecord {
        identifier: element.identifier(),
        shape: element.shape().shape_type().map(ShapeType::to_string),
        dimension: element.dimension(),
        nodes,
        scale_factor_sets: element.scale_factor_sets().to_vec(),
        scale_factors: element.scale_factors().to_vec(),
        fields,
        faces,
    })
}

/// Describe a region as flat records
pub fn export_region(region: &Region) -> Result<RegionRecords> {
    let mut fields = region
        .fields()
        .map(|(_, f)| export_field(region, f))
        .collect::<Result<Vec<_>>>()?;
    // Indexer fields are never indexed themselves, so a stable partition orders them first
    fields.sort_by_key(|f| matches!(f.field_type, FieldTypeRecord::Indexed { .. }));
    let nodes = region
        .nodes()
        .map(|(_, n)| export_node(region, n))
        .collect::<Result<Vec<_>>>()?;
    let elements = region
        .elements()
        .map(|(_, e)| export_element(region, e))
        .collect::<Result<Vec<_>>>()?;
    Ok(RegionRecords {
        fields,
        nodes,
        elements,
    })
}

fn find_field(region: &Region, name: &str) -> Result<FieldHandle> {
    region
        .find_field_by_name(name)
        .ok_or_else(|| Error::NotFound(format!("no field named '{name}'")))
}

fn import_field(region: &mut Region, record: &FieldRecord) -> Result<FieldHandle> {
    let names = record
        .component_names
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>();
    let time_series = record
        .times
        .as_ref()
        .map(|times| region.get_time_series(times))
        .transpose()?;
    let mut builder = FieldBuilder::new(&record.name, names.len())
        .component_names(&names)
        .value_type(record.value_type)
        .coordinate_system(record.coordinate_system)
        .cm_field_type(record.cm_field_type)
        .time_series(time_series);
    builder = match &record.field_type {
        FieldTypeRecord::Constant(values) => builder.constant(values.clone()),
        FieldTypeRecord::Indexed {
            indexer,
            number_of_indexed_values,
            values,
        } => builder.indexed(
            find_field(region, indexer)?,
            *number_of_indexed_values,
            values.clone(),
        ),
        FieldTypeRecord::General => builder,
    };
    let field = builder.build()?;
    match region.find_field_by_name(&record.name) {
        Some(existing) => {
            let matches = region
                .field(existing)
                .map(|f| f.has_same_structure(&field))
                .unwrap_or(false);
            if !matches {
                warn!("Imported field '{}' does not match the existing field", record.name);
                return Err(Error::IncompatibleStructure(format!(
                    "field '{}' is already defined differently",
                    record.name
                )));
            }
            Ok(existing)
        }
        None => region.add_field(field),
    }
}

fn import_node(region: &mut Region, record: &NodeRecord) -> Result<()> {
    let mut builder = NodeBuilder::new(record.identifier);
    for field_record in &record.fields {
        let field = find_field(region, &field_record.field)?;
        let definition = region
            .field(field)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no field named '{}'", field_record.field)))?;
        let mut layout = NodeFieldLayout::new(field_record.components.len());
        for (c, component) in field_record.components.iter().enumerate() {
            layout.define_versions(Some(c), component.versions)?;
            for derivative in &component.derivatives {
                layout.define_derivative(Some(c), *derivative)?;
            }
        }
        let time_series = field_record
            .times
            .as_ref()
            .map(|times| region.get_time_series(times))
            .transpose()?;
        builder
            .define_field(field, &definition, layout, time_series)?
            .set_values(field, &field_record.values)?;
    }
    region.merge_node(builder.finalize())?;
    Ok(())
}

fn import_component(
    region: &mut Region,
    record: &ComponentRecord,
) -> Result<ElementFieldComponent> {
    match record {
        ComponentRecord::NodeBased {
            basis,
            maps,
            modify,
        } => {
            let basis = region.get_basis(&basis.parse::<BasisType>()?);
            let component = ElementFieldComponent::node_based(basis, maps.clone())?;
            match modify {
                Some(mode) => component.with_modify(*mode),
                None => Ok(component),
            }
        }
        ComponentRecord::GridBased {
            number_in_xi,
            value_index,
            ..
        } => ElementFieldComponent::grid_based(number_in_xi.clone(), *value_index),
    }
}

fn import_element(region: &mut Region, record: &ElementRecord) -> Result<()> {
    let shape = match &record.shape {
        Some(description) => region.get_shape(&description.parse::<ShapeType>()?),
        None => region.get_unspecified_shape(record.dimension),
    };
    let mut builder = ElementBuilder::new(record.identifier, shape);
    if !record.nodes.is_empty() {
        builder.set_number_of_nodes(record.nodes.len())?;
        for (i, identifier) in record.nodes.iter().enumerate() {
            if let Some(identifier) = identifier {
                let node = region
                    .find_node(*identifier)
                    .ok_or_else(|| Error::NotFound(format!("node {identifier} is not defined")))?;
                builder.set_node(i, node)?;
            }
        }
    }
    if !record.scale_factor_sets.is_empty() {
        builder.set_scale_factor_sets(record.scale_factor_sets.clone())?;
        for (i, value) in record.scale_factors.iter().enumerate() {
            builder.set_scale_factor(i, *value)?;
        }
    }
    for field_record in &record.fields {
        let field = find_field(region, &field_record.field)?;
        let definition = region
            .field(field)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no field named '{}'", field_record.field)))?;
        let components = field_record
            .components
            .iter()
            .map(|c| import_component(region, c))
            .collect::<Result<Vec<_>>>()?;
        builder.define_field(field, &definition, components)?;
        for (c, component) in field_record.components.iter().enumerate() {
            if let ComponentRecord::GridBased { values, .. } = component {
                for (point, value) in values.iter().enumerate() {
                    builder.set_grid_value(field, c, point, value.clone())?;
                }
            }
        }
    }
    region.merge_element(builder.finalize())?;
    Ok(())
}

fn import_faces(region: &mut Region, record: &ElementRecord) -> Result<()> {
    let element = region
        .find_element(record.identifier)
        .ok_or_else(|| Error::NotFound(format!("{} is not defined", record.identifier)))?;
    for (face, identifier) in record.faces.iter().enumerate() {
        let Some(identifier) = identifier else {
            continue;
        };
        let face_element = region
            .find_element(*identifier)
            .ok_or_else(|| Error::NotFound(format!("{identifier} is not defined")))?;
        let current = region.element(element).and_then(|e| e.face(face));
        if current != Some(face_element) {
            region.set_element_face(element, face, face_element)?;
        }
    }
    Ok(())
}

/// Add the objects described by records to a region
///
/// Fields are added unless a field with the same name and structure exists; nodes and
/// elements are merged into any existing objects with the same identifiers. Changes are
/// reported to observers as one batch. Records are applied in order and import stops at
/// the first that fails.
pub fn import_region(region: &mut Region, records: &RegionRecords) -> Result<()> {
    region.begin_change();
    let result = import_records(region, records);
    region.end_change();
    result
}

fn import_records(region: &mut Region, records: &RegionRecords) -> Result<()> {
    for record in &records.fields {
        import_field(region, record)?;
    }
    for record in &records.nodes {
        import_node(region, record)?;
    }
    for record in &records.elements {
        import_element(region, record)?;
    }
    for record in &records.elements {
        import_faces(region, record)?;
    }
    debug!(
        "Imported {} fields, {} nodes and {} elements",
        records.fields.len(),
        records.nodes.len(),
        records.elements.len()
    );
    Ok(())
}
