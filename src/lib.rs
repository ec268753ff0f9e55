//! Finite element fields
//!
//! Fields are defined piecewise over a mesh of elements. Values are stored at nodes, or on
//! elements at the points of a regular grid, and are blended by basis functions to evaluate
//! a field and its derivatives at any point of an element.
#![cfg_attr(feature = "strict", deny(warnings))]
#![warn(missing_docs)]

pub mod element;
pub mod evaluation;
pub mod field;
pub mod grid;
pub mod io;
pub mod time;
pub mod traits;
pub mod types;
