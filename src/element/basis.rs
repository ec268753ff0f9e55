//! Basis functions
//!
//! A basis is a tensor product over groups of xi directions. Unlinked directions form
//! groups of one and use a 1D family; simplex and polygon directions are linked into a
//! group that uses a single multi-dimensional family. The basis functions are grouped by
//! node, with the nodes numbered with the first group varying fastest and the functions
//! within a node numbered the same way (value, d/dxi1, d/dxi2, d2/dxi1dxi2 for bicubic
//! Hermite).

use crate::element::linkage::{Linkage, XiLink};
use crate::element::polynomials::{
    simplex_lattice, tabulate_cubic_hermite, tabulate_fourier, tabulate_hermite_lagrange,
    tabulate_lagrange, tabulate_lagrange_hermite, tabulate_monomials, tabulate_polygon,
    tabulate_simplex,
};
use crate::types::{Error, FeValue, NodalValueType, Result};
use itertools::Itertools;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// The interpolation family used in one xi direction
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum BasisFunctionType {
    /// A single constant function
    Constant,
    /// Linear Lagrange
    LinearLagrange,
    /// Quadratic Lagrange
    QuadraticLagrange,
    /// Cubic Lagrange
    CubicLagrange,
    /// Cubic Hermite
    CubicHermite,
    /// Quadratic with a value at 0 and a value and derivative at 1
    LagrangeHermite,
    /// Quadratic with a value and derivative at 0 and a value at 1
    HermiteLagrange,
    /// Linear simplex (linked to other directions)
    LinearSimplex,
    /// Quadratic simplex (linked to other directions)
    QuadraticSimplex,
    /// Linear polygon (linked to one other direction)
    Polygon,
    /// Monomials up to the given order
    Monomial(usize),
    /// Fourier series up to the given order
    Fourier(usize),
    /// No type set
    Unspecified,
}

impl BasisFunctionType {
    /// Is this a simplex type?
    pub fn is_simplex(&self) -> bool {
        matches!(
            self,
            BasisFunctionType::LinearSimplex | BasisFunctionType::QuadraticSimplex
        )
    }

    /// Can this type be linked to other directions?
    pub fn is_linkable(&self) -> bool {
        self.is_simplex() || *self == BasisFunctionType::Polygon
    }

    fn name(&self) -> String {
        match self {
            BasisFunctionType::Constant => "constant".to_string(),
            BasisFunctionType::LinearLagrange => "l.Lagrange".to_string(),
            BasisFunctionType::QuadraticLagrange => "q.Lagrange".to_string(),
            BasisFunctionType::CubicLagrange => "c.Lagrange".to_string(),
            BasisFunctionType::CubicHermite => "c.Hermite".to_string(),
            BasisFunctionType::LagrangeHermite => "LagrangeHermite".to_string(),
            BasisFunctionType::HermiteLagrange => "HermiteLagrange".to_string(),
            BasisFunctionType::LinearSimplex => "l.simplex".to_string(),
            BasisFunctionType::QuadraticSimplex => "q.simplex".to_string(),
            BasisFunctionType::Polygon => "polygon".to_string(),
            BasisFunctionType::Monomial(order) => format!("monomial({order})"),
            BasisFunctionType::Fourier(order) => format!("fourier({order})"),
            BasisFunctionType::Unspecified => "unspecified".to_string(),
        }
    }
}

/// The description of a basis: a function type per xi direction plus the links
/// between directions
///
/// Two bases with equal descriptions are the same basis.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct BasisType {
    functions: Vec<BasisFunctionType>,
    linkage: Linkage,
}

impl BasisType {
    /// Create a basis type
    pub fn new(functions: &[BasisFunctionType], links: &[XiLink]) -> Result<Self> {
        if functions.is_empty() || functions.len() > 3 {
            return Err(Error::InvalidArgument(format!(
                "basis dimension must be 1, 2 or 3, got {}",
                functions.len()
            )));
        }
        let linkage = Linkage::new(functions.len(), links)?;
        for group in linkage.groups() {
            let first = functions[group[0]];
            if group.iter().any(|d| functions[*d] != first) {
                return Err(Error::InvalidArgument(format!(
                    "linked xi directions {} must share the same basis type",
                    group.iter().map(|d| d + 1).join(",")
                )));
            }
            match first {
                BasisFunctionType::LinearSimplex | BasisFunctionType::QuadraticSimplex => {
                    if group.len() < 2 {
                        return Err(Error::InvalidArgument(format!(
                            "simplex direction xi{} is not linked",
                            group[0] + 1
                        )));
                    }
                    if linkage
                        .links()
                        .iter()
                        .any(|l| group.contains(&l.first) && l.parameter != 1)
                    {
                        return Err(Error::InvalidArgument(
                            "simplex links must have parameter 1".to_string(),
                        ));
                    }
                }
                BasisFunctionType::Polygon => {
                    if group.len() != 2 {
                        return Err(Error::InvalidArgument(
                            "polygon directions must be linked in pairs".to_string(),
                        ));
                    }
                    if linkage.group_parameter(&group) < 3 {
                        return Err(Error::InvalidArgument(
                            "a polygon needs at least 3 sides".to_string(),
                        ));
                    }
                }
                _ => {
                    if group.len() > 1 {
                        return Err(Error::InvalidArgument(format!(
                            "{} directions cannot be linked",
                            first.name()
                        )));
                    }
                }
            }
        }
        Ok(Self {
            functions: functions.to_vec(),
            linkage,
        })
    }

    /// Create a basis type with the same function type in every direction and no links
    pub fn tensor(function: BasisFunctionType, dim: usize) -> Result<Self> {
        Self::new(&vec![function; dim], &[])
    }

    /// Create a simplex basis type with all directions linked
    pub fn simplex(function: BasisFunctionType, dim: usize) -> Result<Self> {
        let links = (1..dim)
            .map(|d| XiLink {
                first: 0,
                second: d,
                parameter: 1,
            })
            .collect::<Vec<_>>();
        Self::new(&vec![function; dim], &links)
    }

    /// The number of xi directions
    pub fn dimension(&self) -> usize {
        self.functions.len()
    }

    /// The function type in each direction
    pub fn functions(&self) -> &[BasisFunctionType] {
        &self.functions
    }

    /// The links between directions
    pub fn linkage(&self) -> &Linkage {
        &self.linkage
    }

    /// Does any direction have an unspecified type?
    pub fn is_specified(&self) -> bool {
        !self.functions.contains(&BasisFunctionType::Unspecified)
    }
}

impl fmt::Display for BasisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (d, function) in self.functions.iter().enumerate() {
            if d > 0 {
                write!(f, "*")?;
            }
            write!(f, "{}", function.name())?;
            let partners = self
                .linkage
                .links()
                .iter()
                .filter(|l| l.first == d)
                .collect::<Vec<_>>();
            if !partners.is_empty() {
                let mut items = vec![];
                if *function == BasisFunctionType::Polygon {
                    items.push(partners[0].parameter.to_string());
                }
                items.extend(partners.iter().map(|l| (l.second + 1).to_string()));
                write!(f, "({})", items.join(";"))?;
            }
        }
        Ok(())
    }
}

impl FromStr for BasisType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |term: &str| Error::InvalidArgument(format!("invalid basis term '{term}'"));
        let mut functions = vec![];
        let mut links = vec![];
        for (d, term) in s.split('*').map(str::trim).enumerate() {
            let (name, arguments) = match term.find('(') {
                Some(open) => {
                    let arguments = term[open + 1..]
                        .strip_suffix(')')
                        .ok_or_else(|| invalid(term))?
                        .split(';')
                        .map(|a| a.trim().parse::<usize>().map_err(|_| invalid(term)))
                        .collect::<Result<Vec<_>>>()?;
                    (&term[..open], arguments)
                }
                None => (term, vec![]),
            };
            let function = match (name, arguments.len()) {
                ("constant", 0) => BasisFunctionType::Constant,
                ("l.Lagrange", 0) => BasisFunctionType::LinearLagrange,
                ("q.Lagrange", 0) => BasisFunctionType::QuadraticLagrange,
                ("c.Lagrange", 0) => BasisFunctionType::CubicLagrange,
                ("c.Hermite", 0) => BasisFunctionType::CubicHermite,
                ("LagrangeHermite", 0) => BasisFunctionType::LagrangeHermite,
                ("HermiteLagrange", 0) => BasisFunctionType::HermiteLagrange,
                ("unspecified", 0) => BasisFunctionType::Unspecified,
                ("monomial", 1) => BasisFunctionType::Monomial(arguments[0]),
                ("fourier", 1) => BasisFunctionType::Fourier(arguments[0]),
                ("l.simplex", _) | ("q.simplex", _) => {
                    for partner in &arguments {
                        if *partner <= d + 1 {
                            return Err(invalid(term));
                        }
                        links.push(XiLink {
                            first: d,
                            second: partner - 1,
                            parameter: 1,
                        });
                    }
                    if name == "l.simplex" {
                        BasisFunctionType::LinearSimplex
                    } else {
                        BasisFunctionType::QuadraticSimplex
                    }
                }
                ("polygon", 0) => BasisFunctionType::Polygon,
                ("polygon", 2) => {
                    if arguments[1] <= d + 1 {
                        return Err(invalid(term));
                    }
                    links.push(XiLink {
                        first: d,
                        second: arguments[1] - 1,
                        parameter: arguments[0],
                    });
                    BasisFunctionType::Polygon
                }
                _ => return Err(invalid(term)),
            };
            functions.push(function);
        }
        BasisType::new(&functions, &links)
    }
}

/// How to adjust angle values around a ring of nodes so that the angle interpolates
/// without jumping by 2 pi
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ThetaModifyMode {
    /// Each value is within pi of the previous value in xi1
    ClosestInXi1,
    /// Values strictly decrease in xi1
    DecreasingInXi1,
    /// Values strictly increase in xi1
    IncreasingInXi1,
    /// Values do not decrease in xi1
    NonDecreasingInXi1,
    /// Values do not increase in xi1
    NonIncreasingInXi1,
}

/// The functions of one group of linked directions
#[derive(Debug, Clone)]
struct BasisGroup {
    directions: Vec<usize>,
    function: BasisFunctionType,
    parameter: usize,
    nodes: Vec<Vec<usize>>,
    derivative_directions: Vec<u8>,
}

impl BasisGroup {
    fn new(directions: Vec<usize>, function: BasisFunctionType, parameter: usize) -> Self {
        let single = |n: usize| ((0..n).map(|i| vec![i]).collect(), vec![0; n]);
        let (nodes, derivative_directions) = match function {
            BasisFunctionType::Constant => single(1),
            BasisFunctionType::LinearLagrange => single(2),
            BasisFunctionType::QuadraticLagrange => single(3),
            BasisFunctionType::CubicLagrange => single(4),
            BasisFunctionType::CubicHermite => (vec![vec![0, 1], vec![2, 3]], vec![0, 1, 0, 1]),
            BasisFunctionType::LagrangeHermite => (vec![vec![0], vec![1, 2]], vec![0, 0, 1]),
            BasisFunctionType::HermiteLagrange => (vec![vec![0, 1], vec![2]], vec![0, 1, 0]),
            BasisFunctionType::LinearSimplex => single(simplex_lattice(directions.len(), 1).len()),
            BasisFunctionType::QuadraticSimplex => {
                single(simplex_lattice(directions.len(), 2).len())
            }
            BasisFunctionType::Polygon => single(parameter + 1),
            BasisFunctionType::Monomial(order) => (vec![(0..=order).collect()], vec![0; order + 1]),
            BasisFunctionType::Fourier(order) => {
                (vec![(0..2 * order + 1).collect()], vec![0; 2 * order + 1])
            }
            BasisFunctionType::Unspecified => (vec![], vec![]),
        };
        Self {
            directions,
            function,
            parameter,
            nodes,
            derivative_directions,
        }
    }

    fn number_of_functions(&self) -> usize {
        self.derivative_directions.len()
    }

    fn tabulate(&self, xi: &[FeValue]) -> Result<(Vec<FeValue>, Vec<FeValue>)> {
        let local = self.directions.iter().map(|d| xi[*d]).collect::<Vec<_>>();
        Ok(match self.function {
            BasisFunctionType::Constant => (vec![1.0], vec![0.0]),
            BasisFunctionType::LinearLagrange => tabulate_lagrange(1, local[0]),
            BasisFunctionType::QuadraticLagrange => tabulate_lagrange(2, local[0]),
            BasisFunctionType::CubicLagrange => tabulate_lagrange(3, local[0]),
            BasisFunctionType::CubicHermite => tabulate_cubic_hermite(local[0]),
            BasisFunctionType::LagrangeHermite => tabulate_lagrange_hermite(local[0]),
            BasisFunctionType::HermiteLagrange => tabulate_hermite_lagrange(local[0]),
            BasisFunctionType::LinearSimplex => tabulate_simplex(1, &local),
            BasisFunctionType::QuadraticSimplex => tabulate_simplex(2, &local),
            BasisFunctionType::Polygon => tabulate_polygon(self.parameter, &local),
            BasisFunctionType::Monomial(order) => tabulate_monomials(order, local[0]),
            BasisFunctionType::Fourier(order) => tabulate_fourier(order, local[0]),
            BasisFunctionType::Unspecified => {
                return Err(Error::InvalidArgument(
                    "cannot evaluate an unspecified basis".to_string(),
                ))
            }
        })
    }
}

/// The multi-indices of a product of ranges, with the first index varying fastest
fn first_fastest(sizes: &[usize]) -> Vec<Vec<usize>> {
    sizes
        .iter()
        .rev()
        .map(|n| 0..*n)
        .multi_cartesian_product()
        .map(|mut p| {
            p.reverse();
            p
        })
        .collect()
}

/// A basis
#[derive(Debug, Clone)]
pub struct Basis {
    basis_type: BasisType,
    groups: Vec<BasisGroup>,
    // For each function, the index of the function used from each group
    local_functions: Vec<Vec<usize>>,
    function_nodes: Vec<usize>,
    node_offsets: Vec<usize>,
}

impl Basis {
    /// Create a basis
    pub fn new(basis_type: BasisType) -> Self {
        let groups = basis_type
            .linkage
            .groups()
            .into_iter()
            .map(|g| {
                let parameter = basis_type.linkage.group_parameter(&g);
                let function = basis_type.functions[g[0]];
                BasisGroup::new(g, function, parameter)
            })
            .collect::<Vec<_>>();

        let mut local_functions = vec![];
        let mut function_nodes = vec![];
        let mut node_offsets = vec![];
        if basis_type.is_specified() {
            let node_counts = groups.iter().map(|g| g.nodes.len()).collect::<Vec<_>>();
            for (node, node_index) in first_fastest(&node_counts).into_iter().enumerate() {
                node_offsets.push(local_functions.len());
                let per_group = groups
                    .iter()
                    .zip(&node_index)
                    .map(|(g, n)| g.nodes[*n].clone())
                    .collect::<Vec<_>>();
                let counts = per_group.iter().map(|f| f.len()).collect::<Vec<_>>();
                for choice in first_fastest(&counts) {
                    local_functions.push(
                        per_group
                            .iter()
                            .zip(&choice)
                            .map(|(f, c)| f[*c])
                            .collect(),
                    );
                    function_nodes.push(node);
                }
            }
        }
        Self {
            basis_type,
            groups,
            local_functions,
            function_nodes,
            node_offsets,
        }
    }

    /// The description of this basis
    pub fn basis_type(&self) -> &BasisType {
        &self.basis_type
    }

    /// The number of xi directions
    pub fn dimension(&self) -> usize {
        self.basis_type.dimension()
    }

    /// The number of basis functions
    pub fn number_of_functions(&self) -> usize {
        self.local_functions.len()
    }

    /// The number of nodes
    pub fn number_of_nodes(&self) -> usize {
        self.node_offsets.len()
    }

    /// The number of functions associated with a node
    pub fn number_of_functions_per_node(&self, node: usize) -> Option<usize> {
        let start = *self.node_offsets.get(node)?;
        let end = self
            .node_offsets
            .get(node + 1)
            .copied()
            .unwrap_or(self.number_of_functions());
        Some(end - start)
    }

    /// The node a function belongs to
    pub fn node_of_function(&self, function: usize) -> Option<usize> {
        self.function_nodes.get(function).copied()
    }

    /// The first function belonging to a node
    pub fn first_function_of_node(&self, node: usize) -> Option<usize> {
        self.node_offsets.get(node).copied()
    }

    /// The xi directions a function is a derivative in, as bits
    pub fn derivative_directions(&self, function: usize) -> Option<u8> {
        let locals = self.local_functions.get(function)?;
        Some(
            self.groups
                .iter()
                .zip(locals)
                .filter(|(g, l)| g.derivative_directions[**l] != 0)
                .fold(0, |bits, (g, _)| bits | (1 << g.directions[0])),
        )
    }

    /// Is a function a nodal derivative rather than a nodal value?
    pub fn is_derivative(&self, function: usize) -> bool {
        self.derivative_directions(function).unwrap_or(0) != 0
    }

    /// The kind of nodal value a function interpolates
    pub fn nodal_value_type(&self, function: usize) -> Option<NodalValueType> {
        NodalValueType::from_directions(self.derivative_directions(function)?)
    }

    /// The shape of the array needed by [Basis::tabulate]
    pub fn tabulate_array_shape(&self, nderivs: usize) -> [usize; 2] {
        let rows = if nderivs == 0 { 1 } else { 1 + self.dimension() };
        [rows, self.number_of_functions()]
    }

    /// Tabulate the basis functions and, if `nderivs` is 1, their first derivatives at a point
    ///
    /// Row 0 of `data` holds the values; row `1 + d` holds the derivatives with respect to xi_d.
    pub fn tabulate(&self, xi: &[FeValue], nderivs: usize, data: &mut [FeValue]) -> Result<()> {
        if !self.basis_type.is_specified() {
            return Err(Error::InvalidArgument(format!(
                "cannot evaluate basis '{}'",
                self.basis_type
            )));
        }
        if nderivs > 1 {
            return Err(Error::InvalidArgument(
                "only first derivatives can be tabulated".to_string(),
            ));
        }
        if xi.len() != self.dimension() {
            return Err(Error::InvalidArgument(format!(
                "expected {} xi coordinates, got {}",
                self.dimension(),
                xi.len()
            )));
        }
        let shape = self.tabulate_array_shape(nderivs);
        let n = shape[1];
        if data.len() < shape[0] * n {
            return Err(Error::InvalidArgument(
                "tabulation array is too small".to_string(),
            ));
        }
        let tables = self
            .groups
            .iter()
            .map(|g| g.tabulate(xi))
            .collect::<Result<Vec<_>>>()?;

        for (f, locals) in self.local_functions.iter().enumerate() {
            data[f] = tables
                .iter()
                .zip(locals)
                .map(|((values, _), l)| values[*l])
                .product();
            if nderivs == 0 {
                continue;
            }
            for (g, group) in self.groups.iter().enumerate() {
                let others = tables
                    .iter()
                    .zip(locals)
                    .enumerate()
                    .filter(|(h, _)| *h != g)
                    .map(|(_, ((values, _), l))| values[*l])
                    .product::<FeValue>();
                let gn = group.number_of_functions();
                for (position, direction) in group.directions.iter().enumerate() {
                    data[(1 + direction) * n + f] =
                        tables[g].1[position * gn + locals[g]] * others;
                }
            }
        }
        Ok(())
    }

    /// Adjust angle coefficients so that they interpolate continuously around xi1
    ///
    /// `values` holds one coefficient per basis function. Only tensor product bases are
    /// supported. If all the values in a plane at the start or end of xi2 or xi3 are zero,
    /// the plane is taken to be on an axis and the values from the adjacent plane are copied in.
    pub fn modify_theta_in_xi1(&self, mode: ThetaModifyMode, values: &mut [FeValue]) -> Result<()> {
        if self.groups.iter().any(|g| g.directions.len() > 1) {
            return Err(Error::InvalidArgument(
                "theta modification needs a tensor product basis".to_string(),
            ));
        }
        if values.len() != self.number_of_functions() {
            return Err(Error::InvalidArgument(format!(
                "expected {} values, got {}",
                self.number_of_functions(),
                values.len()
            )));
        }
        let counts = (0..3)
            .map(|d| self.groups.get(d).map(|g| g.nodes.len()).unwrap_or(1))
            .collect::<Vec<_>>();
        let (n1, n2, n3) = (counts[0], counts[1], counts[2]);
        let index = |i: usize, j: usize, k: usize| self.node_offsets[i + n1 * (j + n2 * k)];

        let plane_is_zero = |plane: &dyn Fn(usize, usize) -> usize, a: usize, b: usize| {
            (0..a).all(|p| (0..b).all(|q| values[plane(p, q)] == 0.0))
        };
        if n3 > 1 && plane_is_zero(&|i, j| index(i, j, 0), n1, n2) {
            for j in 0..n2 {
                for i in 0..n1 {
                    values[index(i, j, 0)] = values[index(i, j, 1)];
                }
            }
        } else if n3 > 1 && plane_is_zero(&|i, j| index(i, j, n3 - 1), n1, n2) {
            for j in 0..n2 {
                for i in 0..n1 {
                    values[index(i, j, n3 - 1)] = values[index(i, j, n3 - 2)];
                }
            }
        } else if n2 > 1 && plane_is_zero(&|i, k| index(i, 0, k), n1, n3) {
            for k in 0..n3 {
                for i in 0..n1 {
                    values[index(i, 0, k)] = values[index(i, 1, k)];
                }
            }
        } else if n2 > 1 && plane_is_zero(&|i, k| index(i, n2 - 1, k), n1, n3) {
            for k in 0..n3 {
                for i in 0..n1 {
                    values[index(i, n2 - 1, k)] = values[index(i, n2 - 2, k)];
                }
            }
        }

        let closest_offset = |value: FeValue, reference: FeValue| {
            if value > reference + PI {
                -2.0 * PI
            } else if value < reference - PI {
                2.0 * PI
            } else {
                0.0
            }
        };
        for k in 0..n3 {
            for j in 0..n2 {
                let start = index(0, j, k);
                let row_offset = if j > 0 {
                    closest_offset(values[start], values[index(0, j - 1, k)])
                } else if k > 0 {
                    closest_offset(values[start], values[index(0, 0, k - 1)])
                } else {
                    0.0
                };
                values[start] += row_offset;
                for i in 1..n1 {
                    let last = values[index(i - 1, j, k)];
                    let theta = &mut values[index(i, j, k)];
                    *theta += row_offset;
                    match mode {
                        ThetaModifyMode::ClosestInXi1 => *theta += closest_offset(*theta, last),
                        ThetaModifyMode::DecreasingInXi1 => {
                            if last <= *theta {
                                *theta -= 2.0 * PI;
                            }
                        }
                        ThetaModifyMode::IncreasingInXi1 => {
                            if last >= *theta {
                                *theta += 2.0 * PI;
                            }
                        }
                        ThetaModifyMode::NonDecreasingInXi1 => {
                            if last > *theta {
                                *theta += 2.0 * PI;
                            }
                        }
                        ThetaModifyMode::NonIncreasingInXi1 => {
                            if last < *theta {
                                *theta -= 2.0 * PI;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::*;

    fn basis(description: &str) -> Basis {
        Basis::new(description.parse::<BasisType>().unwrap())
    }

    #[test]
    fn test_parse_and_print() {
        for description in [
            "l.Lagrange*l.Lagrange",
            "c.Hermite*l.Lagrange*q.Lagrange",
            "l.simplex(2)*l.simplex",
            "q.simplex(2;3)*q.simplex*q.simplex",
            "polygon(5;3)*l.Lagrange*polygon",
            "monomial(3)*fourier(2)",
            "LagrangeHermite*HermiteLagrange",
            "constant",
        ] {
            let t = description.parse::<BasisType>().unwrap();
            assert_eq!(t.to_string(), description);
        }
    }

    #[test]
    fn test_invalid_descriptions() {
        assert!("l.simplex".parse::<BasisType>().is_err());
        assert!("l.simplex(2)*l.Lagrange".parse::<BasisType>().is_err());
        assert!("polygon(2;2)*polygon".parse::<BasisType>().is_err());
        assert!("l.Lagrange(2)*l.Lagrange".parse::<BasisType>().is_err());
        assert!("cubic".parse::<BasisType>().is_err());
        assert!("".parse::<BasisType>().is_err());
    }

    #[test]
    fn test_equal_descriptions() {
        let a = "l.simplex(2)*l.simplex".parse::<BasisType>().unwrap();
        let b = BasisType::simplex(BasisFunctionType::LinearSimplex, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_number_of_functions() {
        assert_eq!(basis("l.Lagrange*l.Lagrange*l.Lagrange").number_of_functions(), 8);
        assert_eq!(basis("c.Hermite*c.Hermite").number_of_functions(), 16);
        assert_eq!(basis("c.Hermite*c.Hermite").number_of_nodes(), 4);
        assert_eq!(basis("q.simplex(2)*q.simplex").number_of_functions(), 6);
        assert_eq!(basis("l.simplex(2;3)*l.simplex*l.simplex").number_of_functions(), 4);
        assert_eq!(basis("l.simplex(2)*l.simplex*l.Lagrange").number_of_functions(), 6);
        assert_eq!(basis("polygon(5;2)*polygon").number_of_functions(), 6);
        assert_eq!(basis("LagrangeHermite").number_of_functions(), 3);
        assert_eq!(basis("fourier(2)").number_of_functions(), 5);
    }

    #[test]
    fn test_bicubic_hermite_node_layout() {
        let b = basis("c.Hermite*c.Hermite");
        for node in 0..4 {
            assert_eq!(b.number_of_functions_per_node(node), Some(4));
            let first = b.first_function_of_node(node).unwrap();
            assert_eq!(b.nodal_value_type(first), Some(NodalValueType::Value));
            assert_eq!(b.nodal_value_type(first + 1), Some(NodalValueType::DS1));
            assert_eq!(b.nodal_value_type(first + 2), Some(NodalValueType::DS2));
            assert_eq!(b.nodal_value_type(first + 3), Some(NodalValueType::D2DS1DS2));
        }
        assert_eq!(b.node_of_function(5), Some(1));
        assert!(!b.is_derivative(4));
        assert!(b.is_derivative(5));
    }

    #[test]
    fn test_bilinear_values() {
        let b = basis("l.Lagrange*l.Lagrange");
        let mut data = vec![0.0; 12];
        b.tabulate(&[0.25, 0.5], 1, &mut data).unwrap();
        assert_relative_eq!(data[0], 0.375);
        assert_relative_eq!(data[1], 0.125);
        assert_relative_eq!(data[2], 0.375);
        assert_relative_eq!(data[3], 0.125);
        // d/dxi1
        assert_relative_eq!(data[4], -0.5);
        assert_relative_eq!(data[5], 0.5);
        // d/dxi2
        assert_relative_eq!(data[8], -0.75);
        assert_relative_eq!(data[11], 0.25);
    }

    #[test]
    fn test_derivatives_match_differences() {
        let h = 1e-6;
        for description in [
            "c.Hermite*q.Lagrange",
            "q.simplex(2)*q.simplex*l.Lagrange",
            "polygon(4;2)*polygon",
        ] {
            let b = basis(description);
            let n = b.number_of_functions();
            let dim = b.dimension();
            let xi = vec![0.3, 0.4, 0.2][..dim].to_vec();
            let mut data = vec![0.0; (1 + dim) * n];
            b.tabulate(&xi, 1, &mut data).unwrap();
            for d in 0..dim {
                let mut plus = xi.clone();
                let mut minus = xi.clone();
                plus[d] += h;
                minus[d] -= h;
                let mut vp = vec![0.0; n];
                let mut vm = vec![0.0; n];
                b.tabulate(&plus, 0, &mut vp).unwrap();
                b.tabulate(&minus, 0, &mut vm).unwrap();
                for f in 0..n {
                    assert_relative_eq!(
                        data[(1 + d) * n + f],
                        (vp[f] - vm[f]) / (2.0 * h),
                        epsilon = 1e-5
                    );
                }
            }
        }
    }

    #[test]
    fn test_unspecified_basis_fails() {
        let b = basis("unspecified*l.Lagrange");
        assert_eq!(b.number_of_functions(), 0);
        let mut data = vec![0.0; 4];
        assert!(b.tabulate(&[0.5, 0.5], 0, &mut data).is_err());
    }

    #[test]
    fn test_wrong_xi_length() {
        let b = basis("l.Lagrange*l.Lagrange");
        let mut data = vec![0.0; 4];
        assert!(b.tabulate(&[0.5], 0, &mut data).is_err());
    }

    #[test]
    fn test_theta_increasing() {
        let b = basis("l.Lagrange*l.Lagrange");
        let mut values = vec![5.5, 0.5, 5.5, 0.5];
        b.modify_theta_in_xi1(ThetaModifyMode::IncreasingInXi1, &mut values)
            .unwrap();
        assert_relative_eq!(values[1], 0.5 + 2.0 * PI);
        assert_relative_eq!(values[3], 0.5 + 2.0 * PI);

        let mut values = vec![0.5, 5.5];
        basis("l.Lagrange")
            .modify_theta_in_xi1(ThetaModifyMode::ClosestInXi1, &mut values)
            .unwrap();
        assert_relative_eq!(values[1], 5.5 - 2.0 * PI);
    }

    #[test]
    fn test_theta_apex_copy() {
        let b = basis("l.Lagrange*l.Lagrange");
        let mut values = vec![0.0, 0.0, 1.0, 2.0];
        b.modify_theta_in_xi1(ThetaModifyMode::NonDecreasingInXi1, &mut values)
            .unwrap();
        assert_eq!(values, vec![1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_theta_needs_tensor_product() {
        let b = basis("l.simplex(2)*l.simplex");
        let mut values = vec![0.0; 3];
        assert!(b
            .modify_theta_in_xi1(ThetaModifyMode::ClosestInXi1, &mut values)
            .is_err());
    }
}
