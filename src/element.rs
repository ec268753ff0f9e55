//! Basis functions and element shapes

pub mod basis;
pub mod linkage;
pub mod polynomials;
pub mod shape;
