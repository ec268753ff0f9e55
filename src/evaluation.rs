//! Evaluation of fields in elements

mod assembly;
mod field_values;
mod inheritance;

pub use assembly::assemble_coefficients;
pub use field_values::ElementFieldValues;
pub use inheritance::{
    find_defining_ancestors, find_defining_element, top_level_element_and_xi, DefiningElement,
};
