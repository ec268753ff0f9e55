//! Element shapes
//!
//! A shape is a product of lines, simplices and polygons over the xi directions. Each
//! face of a shape has an affine map from its own xi coordinates to those of the element.
//! The coordinates of a face that lies on a plane xi_d = constant are the remaining
//! directions taken cyclically from d + 1, so the faces xi1 = 0, xi2 = 0 and xi3 = 0 of a
//! cube have coordinates (xi2, xi3), (xi3, xi1) and (xi1, xi2).

use crate::element::basis::{BasisFunctionType, BasisType};
use crate::element::linkage::{Linkage, XiLink};
use crate::types::{Error, FeValue, Result};
use approx::abs_diff_eq;
use itertools::Itertools;
use std::fmt;
use std::str::FromStr;

/// Sums of simplex xi within this of one are on the slant face
const ROUNDING: FeValue = 1e-12;

/// The shape of an element in one xi direction
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ShapeKind {
    /// The interval [0, 1]
    Line,
    /// A polygon (linked to one other direction)
    Polygon,
    /// A simplex (linked to other directions)
    Simplex,
}

/// The description of a shape: a kind per xi direction plus the links between directions
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct ShapeType {
    kinds: Vec<ShapeKind>,
    linkage: Linkage,
}

impl ShapeType {
    /// Create a shape type
    pub fn new(kinds: &[ShapeKind], links: &[XiLink]) -> Result<Self> {
        if kinds.is_empty() || kinds.len() > 3 {
            return Err(Error::InvalidArgument(format!(
                "shape dimension must be 1, 2 or 3, got {}",
                kinds.len()
            )));
        }
        let linkage = Linkage::new(kinds.len(), links)?;
        for group in linkage.groups() {
            let first = kinds[group[0]];
            if group.iter().any(|d| kinds[*d] != first) {
                return Err(Error::InvalidArgument(
                    "linked xi directions must share the same shape".to_string(),
                ));
            }
            let valid = match first {
                ShapeKind::Line => group.len() == 1,
                ShapeKind::Simplex => {
                    group.len() > 1
                        && linkage
                            .links()
                            .iter()
                            .all(|l| !group.contains(&l.first) || l.parameter == 1)
                }
                ShapeKind::Polygon => group.len() == 2 && linkage.group_parameter(&group) >= 3,
            };
            if !valid {
                return Err(Error::InvalidArgument(format!(
                    "invalid {first:?} linkage of xi directions {}",
                    group.iter().map(|d| d + 1).join(",")
                )));
            }
        }
        Ok(Self {
            kinds: kinds.to_vec(),
            linkage,
        })
    }

    /// The product of lines in each direction (a line, square or cube)
    pub fn line(dim: usize) -> Result<Self> {
        Self::new(&vec![ShapeKind::Line; dim], &[])
    }

    /// A simplex with all directions linked
    pub fn simplex(dim: usize) -> Result<Self> {
        let links = (1..dim)
            .map(|d| XiLink {
                first: 0,
                second: d,
                parameter: 1,
            })
            .collect::<Vec<_>>();
        Self::new(&vec![ShapeKind::Simplex; dim], &links)
    }

    /// A polygon with the given number of sides
    pub fn polygon(sides: usize) -> Result<Self> {
        Self::new(
            &[ShapeKind::Polygon, ShapeKind::Polygon],
            &[XiLink {
                first: 0,
                second: 1,
                parameter: sides,
            }],
        )
    }

    /// The shape type matching a basis type
    pub fn from_basis_type(basis_type: &BasisType) -> Result<Self> {
        let kinds = basis_type
            .functions()
            .iter()
            .map(|f| match f {
                BasisFunctionType::LinearSimplex | BasisFunctionType::QuadraticSimplex => {
                    ShapeKind::Simplex
                }
                BasisFunctionType::Polygon => ShapeKind::Polygon,
                _ => ShapeKind::Line,
            })
            .collect::<Vec<_>>();
        Self::new(&kinds, basis_type.linkage().links())
    }

    /// The number of xi directions
    pub fn dimension(&self) -> usize {
        self.kinds.len()
    }

    /// The kind in each direction
    pub fn kinds(&self) -> &[ShapeKind] {
        &self.kinds
    }

    /// The links between directions
    pub fn linkage(&self) -> &Linkage {
        &self.linkage
    }

    /// Check that a basis can be used on elements of this shape
    pub fn check_basis(&self, basis_type: &BasisType) -> Result<()> {
        if !basis_type.is_specified() {
            return Err(Error::IncompatibleStructure(format!(
                "basis '{basis_type}' is unspecified"
            )));
        }
        if basis_type.dimension() != self.dimension() {
            return Err(Error::IncompatibleStructure(format!(
                "basis '{basis_type}' has dimension {} but the shape has dimension {}",
                basis_type.dimension(),
                self.dimension()
            )));
        }
        let matching = ShapeType::from_basis_type(basis_type)?;
        if matching != *self {
            return Err(Error::IncompatibleStructure(format!(
                "basis '{basis_type}' does not match shape '{self}'"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (d, kind) in self.kinds.iter().enumerate() {
            if d > 0 {
                write!(f, "*")?;
            }
            write!(
                f,
                "{}",
                match kind {
                    ShapeKind::Line => "line",
                    ShapeKind::Polygon => "polygon",
                    ShapeKind::Simplex => "simplex",
                }
            )?;
            let partners = self
                .linkage
                .links()
                .iter()
                .filter(|l| l.first == d)
                .collect::<Vec<_>>();
            if !partners.is_empty() {
                let mut items = vec![];
                if *kind == ShapeKind::Polygon {
                    items.push(partners[0].parameter.to_string());
                }
                items.extend(partners.iter().map(|l| (l.second + 1).to_string()));
                write!(f, "({})", items.join(";"))?;
            }
        }
        Ok(())
    }
}

impl FromStr for ShapeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |term: &str| Error::InvalidArgument(format!("invalid shape term '{term}'"));
        let mut kinds = vec![];
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
            let kind = match (name, arguments.len()) {
                ("line", 0) => ShapeKind::Line,
                ("simplex", _) => {
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
                    ShapeKind::Simplex
                }
                ("polygon", 0) => ShapeKind::Polygon,
                ("polygon", 2) => {
                    if arguments[1] <= d + 1 {
                        return Err(invalid(term));
                    }
                    links.push(XiLink {
                        first: d,
                        second: arguments[1] - 1,
                        parameter: arguments[0],
                    });
                    ShapeKind::Polygon
                }
                _ => return Err(invalid(term)),
            };
            kinds.push(kind);
        }
        ShapeType::new(&kinds, &links)
    }
}

/// An affine map `y = b + A x` between xi spaces
#[derive(Debug, PartialEq, Clone)]
pub struct AffineXiMap {
    translation: Vec<FeValue>,
    // Row-major, one row per output coordinate
    matrix: Vec<FeValue>,
    input_dimension: usize,
}

impl AffineXiMap {
    /// Create a map
    ///
    /// `matrix` is row-major with one row per entry of `translation`.
    pub fn new(translation: Vec<FeValue>, matrix: Vec<FeValue>) -> Result<Self> {
        if translation.is_empty() || matrix.len() % translation.len() != 0 {
            return Err(Error::InvalidArgument(format!(
                "a matrix with {} entries cannot have {} rows",
                matrix.len(),
                translation.len()
            )));
        }
        let input_dimension = matrix.len() / translation.len();
        Ok(Self {
            translation,
            matrix,
            input_dimension,
        })
    }

    /// The identity map
    pub fn identity(dim: usize) -> Self {
        let mut matrix = vec![0.0; dim * dim];
        for i in 0..dim {
            matrix[i * dim + i] = 1.0;
        }
        Self {
            translation: vec![0.0; dim],
            matrix,
            input_dimension: dim,
        }
    }

    /// The dimension of the input space
    pub fn input_dimension(&self) -> usize {
        self.input_dimension
    }

    /// The dimension of the output space
    pub fn output_dimension(&self) -> usize {
        self.translation.len()
    }

    /// The translation
    pub fn translation(&self) -> &[FeValue] {
        &self.translation
    }

    /// The entry of the matrix in the given row and column
    pub fn matrix_entry(&self, row: usize, column: usize) -> FeValue {
        self.matrix[row * self.input_dimension + column]
    }

    /// Apply the map to a point
    pub fn apply(&self, x: &[FeValue]) -> Result<Vec<FeValue>> {
        if x.len() != self.input_dimension {
            return Err(Error::InvalidArgument(format!(
                "expected {} coordinates, got {}",
                self.input_dimension,
                x.len()
            )));
        }
        Ok(self
            .translation
            .iter()
            .enumerate()
            .map(|(row, b)| {
                b + x
                    .iter()
                    .enumerate()
                    .map(|(column, v)| self.matrix_entry(row, column) * v)
                    .sum::<FeValue>()
            })
            .collect())
    }

    /// The map that applies `inner` then this map
    pub fn compose(&self, inner: &AffineXiMap) -> Result<AffineXiMap> {
        if inner.output_dimension() != self.input_dimension {
            return Err(Error::InvalidArgument(format!(
                "cannot compose a map from dimension {} after a map to dimension {}",
                self.input_dimension,
                inner.output_dimension()
            )));
        }
        let translation = self.apply(&inner.translation)?;
        let mut matrix = vec![0.0; self.output_dimension() * inner.input_dimension];
        for row in 0..self.output_dimension() {
            for column in 0..inner.input_dimension {
                matrix[row * inner.input_dimension + column] = (0..self.input_dimension)
                    .map(|k| self.matrix_entry(row, k) * inner.matrix_entry(k, column))
                    .sum();
            }
        }
        Ok(AffineXiMap {
            translation,
            matrix,
            input_dimension: inner.input_dimension,
        })
    }

    /// Find the input point whose image is closest to `y` in the least squares sense
    pub fn least_squares_inverse(&self, y: &[FeValue]) -> Result<Vec<FeValue>> {
        let n = self.input_dimension;
        if y.len() != self.output_dimension() {
            return Err(Error::InvalidArgument(format!(
                "expected {} coordinates, got {}",
                self.output_dimension(),
                y.len()
            )));
        }
        let residual = y
            .iter()
            .zip(&self.translation)
            .map(|(a, b)| a - b)
            .collect::<Vec<_>>();
        // Normal equations A^T A x = A^T (y - b)
        let mut system = vec![0.0; n * (n + 1)];
        for i in 0..n {
            for j in 0..n {
                system[i * (n + 1) + j] = (0..self.output_dimension())
                    .map(|k| self.matrix_entry(k, i) * self.matrix_entry(k, j))
                    .sum();
            }
            system[i * (n + 1) + n] = (0..self.output_dimension())
                .map(|k| self.matrix_entry(k, i) * residual[k])
                .sum();
        }
        solve_augmented(n, &mut system)
            .ok_or_else(|| Error::InvalidArgument("xi map is singular".to_string()))
    }
}

/// Solve an n by n system stored as an augmented row-major matrix with partial pivoting
fn solve_augmented(n: usize, system: &mut [FeValue]) -> Option<Vec<FeValue>> {
    let width = n + 1;
    for column in 0..n {
        let pivot = (column..n).max_by(|a, b| {
            system[a * width + column]
                .abs()
                .total_cmp(&system[b * width + column].abs())
        })?;
        if system[pivot * width + column].abs() < 1e-14 {
            return None;
        }
        for k in 0..width {
            system.swap(column * width + k, pivot * width + k);
        }
        for row in column + 1..n {
            let factor = system[row * width + column] / system[column * width + column];
            for k in column..width {
                system[row * width + k] -= factor * system[column * width + k];
            }
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let sum = (row + 1..n)
            .map(|k| system[row * width + k] * x[k])
            .sum::<FeValue>();
        x[row] = (system[row * width + n] - sum) / system[row * width + row];
    }
    Some(x)
}

/// How a face is obtained from the shape
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum FaceKind {
    // xi_d = 0 or xi_d = 1
    Plane { direction: usize, at_one: bool },
    // The sum of the group xi is 1; the first group direction is eliminated
    SimplexSlant { group_first: usize },
    // Side of a polygon; the radial direction is 1
    PolygonSide { around: usize, radial: usize, side: usize },
}

/// An element shape
#[derive(Debug, Clone)]
pub struct Shape {
    dimension: usize,
    shape_type: Option<ShapeType>,
    faces: Vec<(FaceKind, AffineXiMap)>,
}

impl Shape {
    /// Create a shape
    pub fn new(shape_type: ShapeType) -> Self {
        let dimension = shape_type.dimension();
        let groups = shape_type.linkage.groups();
        let mut faces = vec![];
        for d in 0..dimension {
            let group = groups
                .iter()
                .find(|g| g.contains(&d))
                .cloned()
                .unwrap_or_else(|| vec![d]);
            match shape_type.kinds[d] {
                ShapeKind::Line => {
                    for at_one in [false, true] {
                        faces.push(FaceKind::Plane {
                            direction: d,
                            at_one,
                        });
                    }
                }
                ShapeKind::Simplex => {
                    faces.push(FaceKind::Plane {
                        direction: d,
                        at_one: false,
                    });
                    if group.last() == Some(&d) {
                        faces.push(FaceKind::SimplexSlant {
                            group_first: group[0],
                        });
                    }
                }
                ShapeKind::Polygon => {
                    if group[0] == d {
                        let sides = shape_type.linkage.group_parameter(&group);
                        for side in 0..sides {
                            faces.push(FaceKind::PolygonSide {
                                around: group[0],
                                radial: group[1],
                                side,
                            });
                        }
                    }
                }
            }
        }
        let faces = faces
            .into_iter()
            .map(|kind| {
                let map = Self::face_map(dimension, &shape_type, &groups, kind);
                (kind, map)
            })
            .collect();
        Self {
            dimension,
            shape_type: Some(shape_type),
            faces,
        }
    }

    /// Create a shape with a dimension but no type
    ///
    /// Fields cannot be defined on elements with an unspecified shape.
    pub fn unspecified(dimension: usize) -> Self {
        Self {
            dimension,
            shape_type: None,
            faces: vec![],
        }
    }

    /// The directions of the face coordinates
    ///
    /// These are the directions other than `removed`, taken cyclically from `removed + 1`.
    fn cyclic_directions(dimension: usize, removed: usize) -> Vec<usize> {
        (1..dimension)
            .map(|i| (removed + i) % dimension)
            .collect()
    }

    fn face_map(
        dimension: usize,
        shape_type: &ShapeType,
        groups: &[Vec<usize>],
        kind: FaceKind,
    ) -> AffineXiMap {
        let face_dimension = dimension - 1;
        let mut translation = vec![0.0; dimension];
        let mut matrix = vec![0.0; dimension * face_dimension];
        match kind {
            FaceKind::Plane { direction, at_one } => {
                if at_one {
                    translation[direction] = 1.0;
                }
                for (j, d) in Self::cyclic_directions(dimension, direction)
                    .into_iter()
                    .enumerate()
                {
                    matrix[d * face_dimension + j] = 1.0;
                }
            }
            FaceKind::SimplexSlant { group_first } => {
                let group = groups
                    .iter()
                    .find(|g| g.contains(&group_first))
                    .cloned()
                    .unwrap_or_default();
                translation[group_first] = 1.0;
                for (j, d) in Self::cyclic_directions(dimension, group_first)
                    .into_iter()
                    .enumerate()
                {
                    matrix[d * face_dimension + j] = 1.0;
                    if group.contains(&d) {
                        matrix[group_first * face_dimension + j] = -1.0;
                    }
                }
            }
            FaceKind::PolygonSide {
                around,
                radial,
                side,
            } => {
                let sides = shape_type.linkage.group_parameter(&[around, radial]) as FeValue;
                translation[radial] = 1.0;
                translation[around] = side as FeValue / sides;
                for (j, d) in Self::cyclic_directions(dimension, radial)
                    .into_iter()
                    .enumerate()
                {
                    matrix[d * face_dimension + j] = if d == around { 1.0 / sides } else { 1.0 };
                }
            }
        }
        AffineXiMap {
            translation,
            matrix,
            input_dimension: face_dimension,
        }
    }

    /// The topological dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The shape type, or None if unspecified
    pub fn shape_type(&self) -> Option<&ShapeType> {
        self.shape_type.as_ref()
    }

    /// Is the shape type specified?
    pub fn is_specified(&self) -> bool {
        self.shape_type.is_some()
    }

    /// The number of faces
    pub fn number_of_faces(&self) -> usize {
        self.faces.len()
    }

    /// The map from a face's xi to the element's xi
    pub fn face_to_element_map(&self, face: usize) -> Result<&AffineXiMap> {
        self.faces
            .get(face)
            .map(|(_, map)| map)
            .ok_or_else(|| Error::InvalidArgument(format!("face {face} out of range")))
    }

    /// Convert xi on a face to xi on the element
    pub fn face_to_element_xi(&self, face: usize, face_xi: &[FeValue]) -> Result<Vec<FeValue>> {
        self.face_to_element_map(face)?.apply(face_xi)
    }

    /// Convert xi on the element to xi on a face
    ///
    /// Points off the face are projected onto its plane.
    pub fn element_to_face_xi(&self, face: usize, xi: &[FeValue]) -> Result<Vec<FeValue>> {
        self.face_to_element_map(face)?.least_squares_inverse(xi)
    }

    /// The type of a face
    pub fn face_shape_type(&self, face: usize) -> Result<ShapeType> {
        let shape_type = self
            .shape_type
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("shape is unspecified".to_string()))?;
        if self.dimension < 2 {
            return Err(Error::InvalidArgument(
                "the faces of a line are points".to_string(),
            ));
        }
        let (kind, _) = self
            .faces
            .get(face)
            .ok_or_else(|| Error::InvalidArgument(format!("face {face} out of range")))?;
        let removed = match *kind {
            FaceKind::Plane { direction, .. } => direction,
            FaceKind::SimplexSlant { group_first } => group_first,
            FaceKind::PolygonSide { radial, .. } => radial,
        };
        let directions = Self::cyclic_directions(self.dimension, removed);
        let mut kinds = directions
            .iter()
            .map(|d| shape_type.kinds[*d])
            .collect::<Vec<_>>();
        let mut links = vec![];
        for group in shape_type.linkage.groups() {
            let positions = directions
                .iter()
                .positions(|d| group.contains(d))
                .collect::<Vec<_>>();
            let parameter = shape_type.linkage.group_parameter(&group);
            match shape_type.kinds[group[0]] {
                ShapeKind::Line => {}
                ShapeKind::Simplex if positions.len() > 1 => {
                    links.extend(positions[1..].iter().map(|p| XiLink {
                        first: positions[0],
                        second: *p,
                        parameter: 1,
                    }));
                }
                ShapeKind::Polygon if positions.len() == 2 => {
                    links.push(XiLink {
                        first: positions[0],
                        second: positions[1],
                        parameter,
                    });
                }
                // Directions left alone from a simplex or polygon become lines
                _ => {
                    for p in positions {
                        kinds[p] = ShapeKind::Line;
                    }
                }
            }
        }
        ShapeType::new(&kinds, &links)
    }

    /// The shape of a face
    pub fn face_shape(&self, face: usize) -> Result<Shape> {
        Ok(Shape::new(self.face_shape_type(face)?))
    }

    /// Does a point lie in the element, allowing the given tolerance?
    pub fn contains_xi(&self, xi: &[FeValue], tolerance: FeValue) -> bool {
        if xi.len() != self.dimension {
            return false;
        }
        if xi.iter().any(|x| *x < -tolerance || *x > 1.0 + tolerance) {
            return false;
        }
        self.simplex_groups()
            .iter()
            .all(|g| g.iter().map(|d| xi[*d]).sum::<FeValue>() <= 1.0 + tolerance)
    }

    fn simplex_groups(&self) -> Vec<Vec<usize>> {
        match &self.shape_type {
            Some(t) => t
                .linkage
                .groups()
                .into_iter()
                .filter(|g| t.kinds[g[0]] == ShapeKind::Simplex)
                .collect(),
            None => vec![],
        }
    }

    /// Find a face that a point on the boundary of the element lies on
    pub fn find_face_for_xi(&self, xi: &[FeValue], tolerance: FeValue) -> Option<usize> {
        if !self.contains_xi(xi, tolerance) || self.dimension < 2 {
            return None;
        }
        (0..self.faces.len()).find(|face| {
            let Ok(face_xi) = self.element_to_face_xi(*face, xi) else {
                return false;
            };
            let Ok(back) = self.face_to_element_xi(*face, &face_xi) else {
                return false;
            };
            let on_plane = back
                .iter()
                .zip(xi)
                .all(|(a, b)| abs_diff_eq!(*a, *b, epsilon = tolerance));
            on_plane
                && self
                    .face_shape(*face)
                    .map(|s| s.contains_xi(&face_xi, tolerance))
                    .unwrap_or(false)
        })
    }

    /// Move a point that is outside the element by more than the tolerance onto the nearest face
    ///
    /// Points within the tolerance of the element are left as they are. Returns true if
    /// the point was moved.
    pub fn limit_xi(&self, xi: &mut [FeValue], tolerance: FeValue) -> Result<bool> {
        self.check_xi_length(xi)?;
        let mut changed = false;
        for x in xi.iter_mut() {
            if *x < -tolerance {
                *x = 0.0;
                changed = true;
            } else if *x > 1.0 + tolerance {
                *x = 1.0;
                changed = true;
            }
        }
        for group in self.simplex_groups() {
            let sum = group.iter().map(|d| xi[*d]).sum::<FeValue>();
            if sum > 1.0 + tolerance {
                project_onto_simplex_face(xi, &group);
                changed = true;
            }
        }
        Ok(changed)
    }

    /// Snap a point that is outside the element by no more than the tolerance onto the nearest face
    ///
    /// Fails, leaving the point unchanged, if the point is further outside. Returns true if
    /// the point was moved.
    pub fn clamp_xi(&self, xi: &mut [FeValue], tolerance: FeValue) -> Result<bool> {
        self.check_xi_length(xi)?;
        if !self.contains_xi(xi, tolerance) {
            return Err(Error::InvalidArgument(format!(
                "xi {xi:?} is outside the element"
            )));
        }
        let mut changed = false;
        for x in xi.iter_mut() {
            if *x < 0.0 {
                *x = 0.0;
                changed = true;
            } else if *x > 1.0 {
                *x = 1.0;
                changed = true;
            }
        }
        for group in self.simplex_groups() {
            let sum = group.iter().map(|d| xi[*d]).sum::<FeValue>();
            if sum > 1.0 + ROUNDING {
                project_onto_simplex_face(xi, &group);
                changed = true;
            }
        }
        Ok(changed)
    }

    fn check_xi_length(&self, xi: &[FeValue]) -> Result<()> {
        if xi.len() != self.dimension {
            return Err(Error::InvalidArgument(format!(
                "expected {} xi coordinates, got {}",
                self.dimension,
                xi.len()
            )));
        }
        Ok(())
    }
}

/// Move the xi of a simplex group with sum greater than one onto the face where the sum is one
fn project_onto_simplex_face(xi: &mut [FeValue], group: &[usize]) {
    let mut active = group.to_vec();
    loop {
        let excess = group.iter().map(|d| xi[*d]).sum::<FeValue>() - 1.0;
        if excess <= 0.0 || active.is_empty() {
            break;
        }
        let share = excess / active.len() as FeValue;
        for d in &active {
            xi[*d] = (xi[*d] - share).max(0.0);
        }
        active.retain(|d| xi[*d] > 0.0);
        if active.len() == group.len() || excess < 1e-15 {
            break;
        }
    }
    // Make the sum exactly one
    if let Some(largest) = group
        .iter()
        .copied()
        .max_by(|a, b| xi[*a].total_cmp(&xi[*b]))
    {
        let others = group
            .iter()
            .filter(|d| **d != largest)
            .map(|d| xi[*d])
            .sum::<FeValue>();
        if others <= 1.0 {
            xi[largest] = 1.0 - others;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::*;
    use rand::{Rng, SeedableRng};

    fn shape(description: &str) -> Shape {
        Shape::new(description.parse::<ShapeType>().unwrap())
    }

    #[test]
    fn test_parse_and_print() {
        for description in [
            "line",
            "line*line*line",
            "simplex(2)*simplex",
            "simplex(2;3)*simplex*simplex",
            "simplex(2)*simplex*line",
            "polygon(5;2)*polygon",
        ] {
            assert_eq!(
                description.parse::<ShapeType>().unwrap().to_string(),
                description
            );
        }
        assert!("simplex".parse::<ShapeType>().is_err());
        assert!("polygon(2;2)*polygon".parse::<ShapeType>().is_err());
        assert!("square".parse::<ShapeType>().is_err());
    }

    #[test]
    fn test_number_of_faces() {
        assert_eq!(shape("line").number_of_faces(), 2);
        assert_eq!(shape("line*line").number_of_faces(), 4);
        assert_eq!(shape("line*line*line").number_of_faces(), 6);
        assert_eq!(shape("simplex(2)*simplex").number_of_faces(), 3);
        assert_eq!(shape("simplex(2;3)*simplex*simplex").number_of_faces(), 4);
        assert_eq!(shape("simplex(2)*simplex*line").number_of_faces(), 5);
        assert_eq!(shape("polygon(5;2)*polygon").number_of_faces(), 5);
        assert_eq!(Shape::unspecified(2).number_of_faces(), 0);
    }

    #[test]
    fn test_cube_face_maps() {
        let cube = shape("line*line*line");
        let f = [0.25, 0.75];
        assert_eq!(cube.face_to_element_xi(0, &f).unwrap(), vec![0.0, 0.25, 0.75]);
        assert_eq!(cube.face_to_element_xi(1, &f).unwrap(), vec![1.0, 0.25, 0.75]);
        assert_eq!(cube.face_to_element_xi(2, &f).unwrap(), vec![0.75, 0.0, 0.25]);
        assert_eq!(cube.face_to_element_xi(4, &f).unwrap(), vec![0.25, 0.75, 0.0]);
        assert_eq!(cube.face_to_element_xi(5, &f).unwrap(), vec![0.25, 0.75, 1.0]);
    }

    #[test]
    fn test_tetrahedron_slant_face() {
        let tet = shape("simplex(2;3)*simplex*simplex");
        let xi = tet.face_to_element_xi(3, &[0.25, 0.5]).unwrap();
        assert_relative_eq!(xi[0], 0.25);
        assert_relative_eq!(xi[1], 0.25);
        assert_relative_eq!(xi[2], 0.5);
        let back = tet.element_to_face_xi(3, &xi).unwrap();
        assert_relative_eq!(back[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(back[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_polygon_side() {
        let pentagon = shape("polygon(5;2)*polygon");
        let xi = pentagon.face_to_element_xi(2, &[0.5]).unwrap();
        assert_relative_eq!(xi[0], 0.5);
        assert_relative_eq!(xi[1], 1.0);
        assert_eq!(
            pentagon.face_shape_type(2).unwrap(),
            ShapeType::line(1).unwrap()
        );
    }

    #[test]
    fn test_face_shapes() {
        let tet = shape("simplex(2;3)*simplex*simplex");
        for face in 0..4 {
            assert_eq!(
                tet.face_shape_type(face).unwrap(),
                ShapeType::simplex(2).unwrap()
            );
        }
        let wedge = shape("simplex(2)*simplex*line");
        assert_eq!(
            wedge.face_shape_type(0).unwrap(),
            "line*line".parse::<ShapeType>().unwrap()
        );
        assert_eq!(
            wedge.face_shape_type(3).unwrap(),
            ShapeType::simplex(2).unwrap()
        );
        assert_eq!(
            wedge.face_shape_type(2).unwrap(),
            "line*line".parse::<ShapeType>().unwrap()
        );
        assert!(shape("line").face_shape_type(0).is_err());
    }

    #[test]
    fn test_compose_maps() {
        let cube = shape("line*line*line");
        let square = cube.face_shape(4).unwrap();
        let line_map = square.face_to_element_map(1).unwrap();
        let composed = cube
            .face_to_element_map(4)
            .unwrap()
            .compose(line_map)
            .unwrap();
        assert_eq!(composed.apply(&[0.5]).unwrap(), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_find_face() {
        let square = shape("line*line");
        assert_eq!(square.find_face_for_xi(&[0.5, 1.0], 1e-6), Some(3));
        assert_eq!(square.find_face_for_xi(&[0.0, 0.5], 1e-6), Some(0));
        assert_eq!(square.find_face_for_xi(&[0.5, 0.5], 1e-6), None);
        let triangle = shape("simplex(2)*simplex");
        assert_eq!(triangle.find_face_for_xi(&[0.5, 0.5], 1e-6), Some(2));
        assert_eq!(triangle.find_face_for_xi(&[0.5, 0.6], 1e-6), None);
    }

    #[test]
    fn test_clamp_inside_is_unchanged() {
        let cube = shape("line*line*line");
        let mut xi = [0.2, 0.5, 0.9];
        assert!(!cube.clamp_xi(&mut xi, 1e-6).unwrap());
        assert_eq!(xi, [0.2, 0.5, 0.9]);
    }

    #[test]
    fn test_clamp_within_tolerance() {
        let square = shape("line*line");
        let mut xi = [-1e-8, 1.0 + 1e-8];
        assert!(square.clamp_xi(&mut xi, 1e-6).unwrap());
        assert_eq!(xi, [0.0, 1.0]);

        let mut xi = [-0.1, 0.5];
        assert!(square.clamp_xi(&mut xi, 1e-6).is_err());
        assert_eq!(xi, [-0.1, 0.5]);
    }

    #[test]
    fn test_limit_simplex() {
        let triangle = shape("simplex(2)*simplex");
        let mut xi = [0.9, 0.5];
        assert!(triangle.limit_xi(&mut xi, 1e-6).unwrap());
        assert_relative_eq!(xi[0], 0.7, epsilon = 1e-12);
        assert_relative_eq!(xi[1], 0.3, epsilon = 1e-12);
        let mut again = xi;
        assert!(!triangle.limit_xi(&mut again, 1e-6).unwrap());
        assert_eq!(again, xi);
    }

    #[test]
    fn test_limit_is_idempotent() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        for description in [
            "line*line*line",
            "simplex(2;3)*simplex*simplex",
            "simplex(2)*simplex*line",
        ] {
            let s = shape(description);
            for _ in 0..200 {
                let mut xi = (0..3).map(|_| rng.gen_range(-1.0..2.0)).collect::<Vec<_>>();
                s.limit_xi(&mut xi, 1e-6).unwrap();
                assert!(s.contains_xi(&xi, 1e-6));
                let limited = xi.clone();
                assert!(!s.limit_xi(&mut xi, 1e-6).unwrap());
                assert!(!s.clamp_xi(&mut xi, 1e-6).unwrap());
                assert_eq!(xi, limited);
            }
        }
    }

    #[test]
    fn test_basis_compatibility() {
        let triangle = ShapeType::simplex(2).unwrap();
        assert!(triangle
            .check_basis(&"q.simplex(2)*q.simplex".parse().unwrap())
            .is_ok());
        assert!(triangle
            .check_basis(&"l.Lagrange*l.Lagrange".parse().unwrap())
            .is_err());
        assert!(triangle.check_basis(&"l.Lagrange".parse().unwrap()).is_err());
        let square = ShapeType::line(2).unwrap();
        assert!(square
            .check_basis(&"c.Hermite*l.Lagrange".parse().unwrap())
            .is_ok());
        let pentagon = ShapeType::polygon(5).unwrap();
        assert!(pentagon
            .check_basis(&"polygon(5;2)*polygon".parse().unwrap())
            .is_ok());
        assert!(pentagon
            .check_basis(&"polygon(4;2)*polygon".parse().unwrap())
            .is_err());
    }
}
