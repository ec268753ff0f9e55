//! Types used throughout fefield

use std::fmt;
use std::str::FromStr;

/// The floating point type used for field values, xi coordinates and times
pub type FeValue = f64;

/// Error type
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A missing object, out-of-range index or mismatched dimension
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A structural change that cannot be applied to the target
    #[error("Incompatible structure: {0}")]
    IncompatibleStructure(String),
    /// A field or object that is not defined where it was looked for
    #[error("Not found: {0}")]
    NotFound(String),
    /// A storage limit was exceeded
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl Error {
    /// Is this a not-found error?
    ///
    /// Traversals usually skip these rather than failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// The scalar type of the values stored for a field
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// The library floating point type
    FeValue = 0,
    /// Double precision
    Double = 1,
    /// Single precision
    Float = 2,
    /// 32 bit integer
    Int = 3,
    /// 16 bit integer
    Short = 4,
    /// Text
    String = 5,
    /// An embedded location: an element and an xi within it
    ElementXi = 6,
}

impl ValueType {
    /// Create a value type from a u8
    pub fn from(i: u8) -> Option<ValueType> {
        match i {
            0 => Some(ValueType::FeValue),
            1 => Some(ValueType::Double),
            2 => Some(ValueType::Float),
            3 => Some(ValueType::Int),
            4 => Some(ValueType::Short),
            5 => Some(ValueType::String),
            6 => Some(ValueType::ElementXi),
            _ => None,
        }
    }

    /// Can values of this type be converted to and from `FeValue`?
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ValueType::String | ValueType::ElementXi)
    }

    /// The name of this type
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::FeValue => "real",
            ValueType::Double => "double",
            ValueType::Float => "float",
            ValueType::Int => "integer",
            ValueType::Short => "short",
            ValueType::String => "string",
            ValueType::ElementXi => "element_xi",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        (0..7)
            .filter_map(ValueType::from)
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown value type '{s}'")))
    }
}

/// The category of an element, which determines the identifier namespace it lives in
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
#[repr(u8)]
pub enum ElementCategory {
    /// A top-level element
    Element = 0,
    /// A face
    Face = 1,
    /// A line
    Line = 2,
}

impl ElementCategory {
    /// Create a category from a u8
    pub fn from(i: u8) -> Option<ElementCategory> {
        match i {
            0 => Some(ElementCategory::Element),
            1 => Some(ElementCategory::Face),
            2 => Some(ElementCategory::Line),
            _ => None,
        }
    }

    /// The category used for the faces of an element of this category with the given dimension
    pub fn for_face_of_dimension(face_dimension: usize) -> ElementCategory {
        if face_dimension == 1 {
            ElementCategory::Line
        } else {
            ElementCategory::Face
        }
    }
}

/// The identifier of an element: unique within a region
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct ElementIdentifier {
    /// Category
    pub category: ElementCategory,
    /// Number
    pub number: i32,
}

impl ElementIdentifier {
    /// Create an identifier
    pub fn new(category: ElementCategory, number: i32) -> Self {
        Self { category, number }
    }

    /// Create a top-level element identifier
    pub fn element(number: i32) -> Self {
        Self::new(ElementCategory::Element, number)
    }
}

impl fmt::Display for ElementIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.category {
            ElementCategory::Element => "element",
            ElementCategory::Face => "face",
            ElementCategory::Line => "line",
        };
        write!(f, "{prefix} {}", self.number)
    }
}

/// A location embedded in an element
#[derive(Debug, PartialEq, Clone)]
pub struct ElementXi {
    /// The element
    pub element: ElementIdentifier,
    /// The xi coordinates in the element
    pub xi: Vec<FeValue>,
}

/// A single value of any of the supported value types
#[derive(Debug, PartialEq, Clone)]
pub enum Value {
    /// The library floating point type
    FeValue(FeValue),
    /// Double precision
    Double(f64),
    /// Single precision
    Float(f32),
    /// 32 bit integer
    Int(i32),
    /// 16 bit integer
    Short(i16),
    /// Text
    String(String),
    /// An embedded location, or none
    ElementXi(Option<ElementXi>),
}

impl Value {
    /// The type of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::FeValue(_) => ValueType::FeValue,
            Value::Double(_) => ValueType::Double,
            Value::Float(_) => ValueType::Float,
            Value::Int(_) => ValueType::Int,
            Value::Short(_) => ValueType::Short,
            Value::String(_) => ValueType::String,
            Value::ElementXi(_) => ValueType::ElementXi,
        }
    }

    /// The initial value stored for a newly defined field of the given type
    pub fn zero(value_type: ValueType) -> Value {
        match value_type {
            ValueType::FeValue => Value::FeValue(0.0),
            ValueType::Double => Value::Double(0.0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Int => Value::Int(0),
            ValueType::Short => Value::Short(0),
            ValueType::String => Value::String(String::new()),
            ValueType::ElementXi => Value::ElementXi(None),
        }
    }

    /// Convert a floating point value to a numeric value type
    ///
    /// Integer types are rounded to the nearest integer.
    pub fn from_fe_value(value_type: ValueType, value: FeValue) -> Result<Value> {
        let out_of_range =
            || Error::InvalidArgument(format!("{value} cannot be stored as {value_type}"));
        Ok(match value_type {
            ValueType::FeValue => Value::FeValue(value),
            ValueType::Double => Value::Double(value),
            ValueType::Float => Value::Float(num::cast(value).ok_or_else(out_of_range)?),
            ValueType::Int => Value::Int(num::cast(value.round()).ok_or_else(out_of_range)?),
            ValueType::Short => Value::Short(num::cast(value.round()).ok_or_else(out_of_range)?),
            ValueType::String | ValueType::ElementXi => {
                return Err(Error::InvalidArgument(format!(
                    "{value_type} values are not numeric"
                )))
            }
        })
    }

    /// The value as a floating point number, if it is numeric
    pub fn as_fe_value(&self) -> Option<FeValue> {
        match self {
            Value::FeValue(v) => Some(*v),
            Value::Double(v) => Some(*v),
            Value::Float(v) => num::cast(*v),
            Value::Int(v) => num::cast(*v),
            Value::Short(v) => num::cast(*v),
            Value::String(_) | Value::ElementXi(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::FeValue(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::ElementXi(None) => write!(f, "none"),
            Value::ElementXi(Some(location)) => {
                write!(f, "{}", location.element)?;
                for x in &location.xi {
                    write!(f, " {x}")?;
                }
                Ok(())
            }
        }
    }
}

/// The kind of a value stored at a node: the value itself or one of its derivatives
/// with respect to the nodal arc-length parameters
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
#[repr(u8)]
pub enum NodalValueType {
    /// The value
    Value = 0,
    /// d/ds1
    DS1 = 1,
    /// d/ds2
    DS2 = 2,
    /// d/ds3
    DS3 = 3,
    /// d2/ds1ds2
    D2DS1DS2 = 4,
    /// d2/ds1ds3
    D2DS1DS3 = 5,
    /// d2/ds2ds3
    D2DS2DS3 = 6,
    /// d3/ds1ds2ds3
    D3DS1DS2DS3 = 7,
}

impl NodalValueType {
    /// Create a nodal value type from a u8
    pub fn from(i: u8) -> Option<NodalValueType> {
        match i {
            0 => Some(NodalValueType::Value),
            1 => Some(NodalValueType::DS1),
            2 => Some(NodalValueType::DS2),
            3 => Some(NodalValueType::DS3),
            4 => Some(NodalValueType::D2DS1DS2),
            5 => Some(NodalValueType::D2DS1DS3),
            6 => Some(NodalValueType::D2DS2DS3),
            7 => Some(NodalValueType::D3DS1DS2DS3),
            _ => None,
        }
    }

    /// The nodal value type for the derivative with respect to the given set of parameters
    ///
    /// Bit `d` of `directions` is set if the derivative is taken in direction `d`.
    pub fn from_directions(directions: u8) -> Option<NodalValueType> {
        match directions {
            0 => Some(NodalValueType::Value),
            0b001 => Some(NodalValueType::DS1),
            0b010 => Some(NodalValueType::DS2),
            0b100 => Some(NodalValueType::DS3),
            0b011 => Some(NodalValueType::D2DS1DS2),
            0b101 => Some(NodalValueType::D2DS1DS3),
            0b110 => Some(NodalValueType::D2DS2DS3),
            0b111 => Some(NodalValueType::D3DS1DS2DS3),
            _ => None,
        }
    }

    /// The name of this type
    pub fn name(&self) -> &'static str {
        match self {
            NodalValueType::Value => "value",
            NodalValueType::DS1 => "d/ds1",
            NodalValueType::DS2 => "d/ds2",
            NodalValueType::DS3 => "d/ds3",
            NodalValueType::D2DS1DS2 => "d2/ds1ds2",
            NodalValueType::D2DS1DS3 => "d2/ds1ds3",
            NodalValueType::D2DS2DS3 => "d2/ds2ds3",
            NodalValueType::D3DS1DS2DS3 => "d3/ds1ds2ds3",
        }
    }
}

impl fmt::Display for NodalValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for NodalValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        (0..8)
            .filter_map(NodalValueType::from)
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown nodal value type '{s}'")))
    }
}

/// The type of coordinate system a field's values are expressed in
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum CoordinateSystemType {
    /// Rectangular cartesian
    RectangularCartesian,
    /// Cylindrical polar (r, theta, z)
    CylindricalPolar,
    /// Spherical polar (r, theta, phi)
    SphericalPolar,
    /// Prolate spheroidal (lambda, mu, theta)
    ProlateSpheroidal,
    /// Oblate spheroidal (lambda, mu, theta)
    OblateSpheroidal,
    /// Fibre angles
    Fibre,
    /// Not a coordinate field
    NotApplicable,
}

impl CoordinateSystemType {
    /// The name of this type
    pub fn name(&self) -> &'static str {
        match self {
            CoordinateSystemType::RectangularCartesian => "rectangular_cartesian",
            CoordinateSystemType::CylindricalPolar => "cylindrical_polar",
            CoordinateSystemType::SphericalPolar => "spherical_polar",
            CoordinateSystemType::ProlateSpheroidal => "prolate_spheroidal",
            CoordinateSystemType::OblateSpheroidal => "oblate_spheroidal",
            CoordinateSystemType::Fibre => "fibre",
            CoordinateSystemType::NotApplicable => "not_applicable",
        }
    }

    /// Does this system use a focus?
    pub fn has_focus(&self) -> bool {
        matches!(
            self,
            CoordinateSystemType::ProlateSpheroidal | CoordinateSystemType::OblateSpheroidal
        )
    }
}

impl FromStr for CoordinateSystemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            CoordinateSystemType::RectangularCartesian,
            CoordinateSystemType::CylindricalPolar,
            CoordinateSystemType::SphericalPolar,
            CoordinateSystemType::ProlateSpheroidal,
            CoordinateSystemType::OblateSpheroidal,
            CoordinateSystemType::Fibre,
            CoordinateSystemType::NotApplicable,
        ]
        .into_iter()
        .find(|t| t.name() == s)
        .ok_or_else(|| Error::InvalidArgument(format!("unknown coordinate system '{s}'")))
    }
}

/// A coordinate system
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct CoordinateSystem {
    /// The type of system
    pub system_type: CoordinateSystemType,
    /// The focus, used by spheroidal systems
    pub focus: FeValue,
}

impl CoordinateSystem {
    /// Create a coordinate system with unit focus
    pub fn new(system_type: CoordinateSystemType) -> Self {
        Self {
            system_type,
            focus: 1.0,
        }
    }

    /// Create a coordinate system with the given focus
    pub fn with_focus(system_type: CoordinateSystemType, focus: FeValue) -> Result<Self> {
        if focus.is_nan() || focus <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "focus must be positive, got {focus}"
            )));
        }
        Ok(Self { system_type, focus })
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self::new(CoordinateSystemType::RectangularCartesian)
    }
}
