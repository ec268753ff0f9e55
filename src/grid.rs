//! Mesh storage: fields at nodes and elements, owned by a region

pub mod arena;
pub mod element;
pub mod maps;
pub mod node;
pub mod region;
pub mod value_storage;
