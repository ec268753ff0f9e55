//! Maps from stored values to the basis coefficients of an element field component

use crate::element::basis::{Basis, ThetaModifyMode};
use crate::types::{Error, FeValue, Result};
use std::rc::Rc;

/// A map taking values of one node, each optionally multiplied by a scale factor of the element
///
/// Each entry gives one basis coefficient. Value indices count from the first value of the
/// component at the node. An absent value index contributes zero; an absent scale factor
/// index means a unit scale factor.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StandardNodeMap {
    node_index: usize,
    nodal_value_indices: Vec<Option<usize>>,
    scale_factor_indices: Vec<Option<usize>>,
}

impl StandardNodeMap {
    /// Create a map
    pub fn new(
        node_index: usize,
        nodal_value_indices: Vec<Option<usize>>,
        scale_factor_indices: Vec<Option<usize>>,
    ) -> Result<Self> {
        if nodal_value_indices.len() != scale_factor_indices.len() {
            return Err(Error::InvalidArgument(format!(
                "{} nodal value indices but {} scale factor indices",
                nodal_value_indices.len(),
                scale_factor_indices.len()
            )));
        }
        Ok(Self {
            node_index,
            nodal_value_indices,
            scale_factor_indices,
        })
    }

    /// Create a map from offsets where a negative offset means absent
    pub fn from_offsets(
        node_index: usize,
        nodal_value_offsets: &[i32],
        scale_factor_offsets: &[i32],
    ) -> Result<Self> {
        let convert = |offsets: &[i32]| {
            offsets
                .iter()
                .map(|o| usize::try_from(*o).ok())
                .collect::<Vec<_>>()
        };
        Self::new(
            node_index,
            convert(nodal_value_offsets),
            convert(scale_factor_offsets),
        )
    }

    /// A map with unit scale factors taking the first `count` values of the node
    pub fn unscaled(node_index: usize, count: usize) -> Self {
        Self {
            node_index,
            nodal_value_indices: (0..count).map(Some).collect(),
            scale_factor_indices: vec![None; count],
        }
    }

    /// The index of the node in the element's node list
    pub fn node_index(&self) -> usize {
        self.node_index
    }

    /// The index of the value used for each coefficient within the node's values of the field
    pub fn nodal_value_indices(&self) -> &[Option<usize>] {
        &self.nodal_value_indices
    }

    /// The index of the scale factor used for each coefficient
    pub fn scale_factor_indices(&self) -> &[Option<usize>] {
        &self.scale_factor_indices
    }

    /// The number of coefficients
    pub fn number_of_coefficients(&self) -> usize {
        self.nodal_value_indices.len()
    }
}

/// The weight of a term of a linear combination
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum LinearWeight {
    /// One
    Unit,
    /// A scale factor of the element
    ScaleFactor(usize),
    /// A fixed number
    Constant(FeValue),
}

/// A term of a linear combination: a weighted value of a node
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct LinearTerm {
    /// The index of the value within the node's values of the component
    pub nodal_value_index: usize,
    /// The weight
    pub weight: LinearWeight,
}

/// A map where each coefficient is a linear combination of values of one node
#[derive(Debug, PartialEq, Clone)]
pub struct GeneralNodeMap {
    node_index: usize,
    combinations: Vec<Vec<LinearTerm>>,
}

impl GeneralNodeMap {
    /// Create a map with one linear combination per coefficient
    ///
    /// An empty combination gives a zero coefficient.
    pub fn new(node_index: usize, combinations: Vec<Vec<LinearTerm>>) -> Self {
        Self {
            node_index,
            combinations,
        }
    }

    /// The index of the node in the element's node list
    pub fn node_index(&self) -> usize {
        self.node_index
    }

    /// The linear combinations
    pub fn combinations(&self) -> &[Vec<LinearTerm>] {
        &self.combinations
    }

    /// The number of coefficients
    pub fn number_of_coefficients(&self) -> usize {
        self.combinations.len()
    }

    fn scale_factor_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.combinations
            .iter()
            .flatten()
            .filter_map(|term| match term.weight {
                LinearWeight::ScaleFactor(i) => Some(i),
                _ => None,
            })
    }
}

/// A node to element map
#[derive(Debug, PartialEq, Clone)]
pub enum NodeMap {
    /// Values multiplied by scale factors
    Standard(StandardNodeMap),
    /// Linear combinations of values
    General(GeneralNodeMap),
}

impl NodeMap {
    /// The index of the node in the element's node list
    pub fn node_index(&self) -> usize {
        match self {
            NodeMap::Standard(map) => map.node_index(),
            NodeMap::General(map) => map.node_index(),
        }
    }

    /// The number of coefficients
    pub fn number_of_coefficients(&self) -> usize {
        match self {
            NodeMap::Standard(map) => map.number_of_coefficients(),
            NodeMap::General(map) => map.number_of_coefficients(),
        }
    }

    /// The largest scale factor index used, if any
    pub fn max_scale_factor_index(&self) -> Option<usize> {
        match self {
            NodeMap::Standard(map) => map.scale_factor_indices.iter().flatten().max().copied(),
            NodeMap::General(map) => map.scale_factor_indices().max(),
        }
    }
}

/// Values stored at the points of a regular grid in xi
///
/// The grid has `number_in_xi[d]` intervals in direction d. Its values are stored in the
/// element from `value_index`, with xi1 varying fastest.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GridMap {
    number_in_xi: Vec<usize>,
    value_index: usize,
}

impl GridMap {
    /// Create a grid map
    pub fn new(number_in_xi: Vec<usize>, value_index: usize) -> Result<Self> {
        if number_in_xi.contains(&0) {
            return Err(Error::InvalidArgument(format!(
                "a grid needs at least one interval in each direction: {number_in_xi:?}"
            )));
        }
        Ok(Self {
            number_in_xi,
            value_index,
        })
    }

    /// The number of intervals in each direction
    pub fn number_in_xi(&self) -> &[usize] {
        &self.number_in_xi
    }

    /// The index of the first value in the element's grid value storage
    pub fn value_index(&self) -> usize {
        self.value_index
    }

    /// The number of grid points
    pub fn number_of_values(&self) -> usize {
        self.number_in_xi.iter().map(|n| n + 1).product()
    }

    /// The offset from the first value of a grid point
    pub fn grid_point_offset(&self, point: &[usize]) -> Result<usize> {
        if point.len() != self.number_in_xi.len() {
            return Err(Error::InvalidArgument(format!(
                "expected {} grid indices, got {}",
                self.number_in_xi.len(),
                point.len()
            )));
        }
        let mut offset = 0;
        let mut stride = 1;
        for (p, n) in point.iter().zip(&self.number_in_xi) {
            if p > n {
                return Err(Error::InvalidArgument(format!(
                    "grid index {p} out of range 0..={n}"
                )));
            }
            offset += p * stride;
            stride *= n + 1;
        }
        Ok(offset)
    }
}

/// How one component of a field is given on an element
#[derive(Debug, Clone)]
pub enum ElementFieldComponent {
    /// Basis coefficients assembled from node values
    NodeBased {
        /// The basis
        basis: Rc<Basis>,
        /// The maps, giving the coefficients in order
        maps: Vec<NodeMap>,
        /// Adjustment applied to the coefficients before blending
        modify: Option<ThetaModifyMode>,
    },
    /// Values at grid points, interpolated without a basis
    GridBased(GridMap),
}

impl PartialEq for ElementFieldComponent {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ElementFieldComponent::NodeBased {
                    basis,
                    maps,
                    modify,
                },
                ElementFieldComponent::NodeBased {
                    basis: other_basis,
                    maps: other_maps,
                    modify: other_modify,
                },
            ) => {
                basis.basis_type() == other_basis.basis_type()
                    && maps == other_maps
                    && modify == other_modify
            }
            (ElementFieldComponent::GridBased(a), ElementFieldComponent::GridBased(b)) => a == b,
            _ => false,
        }
    }
}

impl ElementFieldComponent {
    /// A component assembled from node values
    ///
    /// The maps must give one coefficient per basis function.
    pub fn node_based(basis: Rc<Basis>, maps: Vec<NodeMap>) -> Result<Self> {
        let count = maps.iter().map(NodeMap::number_of_coefficients).sum::<usize>();
        if count != basis.number_of_functions() {
            return Err(Error::InvalidArgument(format!(
                "basis '{}' has {} functions but the maps give {count} coefficients",
                basis.basis_type(),
                basis.number_of_functions()
            )));
        }
        Ok(ElementFieldComponent::NodeBased {
            basis,
            maps,
            modify: None,
        })
    }

    /// A component assembled with standard unscaled maps, taking one value per basis
    /// function from each of the element's nodes in order
    pub fn node_based_unscaled(basis: Rc<Basis>) -> Result<Self> {
        let maps = (0..basis.number_of_nodes())
            .map(|node| {
                basis
                    .number_of_functions_per_node(node)
                    .map(|count| NodeMap::Standard(StandardNodeMap::unscaled(node, count)))
                    .ok_or_else(|| Error::InvalidArgument(format!("no functions at node {node}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::node_based(basis, maps)
    }

    /// A component stored at grid points
    pub fn grid_based(number_in_xi: Vec<usize>, value_index: usize) -> Result<Self> {
        Ok(ElementFieldComponent::GridBased(GridMap::new(
            number_in_xi,
            value_index,
        )?))
    }

    /// Set the adjustment applied to the assembled coefficients
    pub fn with_modify(self, mode: ThetaModifyMode) -> Result<Self> {
        match self {
            ElementFieldComponent::NodeBased { basis, maps, .. } => {
                Ok(ElementFieldComponent::NodeBased {
                    basis,
                    maps,
                    modify: Some(mode),
                })
            }
            ElementFieldComponent::GridBased(_) => Err(Error::InvalidArgument(
                "grid based components cannot be modified".to_string(),
            )),
        }
    }

    /// The basis, if node based
    pub fn basis(&self) -> Option<&Rc<Basis>> {
        match self {
            ElementFieldComponent::NodeBased { basis, .. } => Some(basis),
            ElementFieldComponent::GridBased(_) => None,
        }
    }

    /// The grid map, if grid based
    pub fn grid_map(&self) -> Option<&GridMap> {
        match self {
            ElementFieldComponent::GridBased(map) => Some(map),
            ElementFieldComponent::NodeBased { .. } => None,
        }
    }

    /// The node maps; empty if grid based
    pub fn node_maps(&self) -> &[NodeMap] {
        match self {
            ElementFieldComponent::NodeBased { maps, .. } => maps,
            ElementFieldComponent::GridBased(_) => &[],
        }
    }

    /// The number of nodes the element needs for this component
    pub fn required_number_of_nodes(&self) -> usize {
        self.node_maps()
            .iter()
            .map(|m| m.node_index() + 1)
            .max()
            .unwrap_or(0)
    }

    /// The number of scale factors the element needs for this component
    pub fn required_number_of_scale_factors(&self) -> usize {
        self.node_maps()
            .iter()
            .filter_map(NodeMap::max_scale_factor_index)
            .map(|i| i + 1)
            .max()
            .unwrap_or(0)
    }

    /// Does this component use a node of the element?
    pub fn uses_node(&self, node_index: usize) -> bool {
        self.node_maps().iter().any(|m| m.node_index() == node_index)
    }
}
