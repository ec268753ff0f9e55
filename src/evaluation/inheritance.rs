//! Inheritance of fields from parent elements
//!
//! A face or line with no definition of a field inherits it from the first ancestor that
//! has one. The search is breadth first over parents, visiting each ancestor once, and
//! carries the composed face maps from the element's xi to the ancestor's xi.

use crate::element::shape::AffineXiMap;
use crate::grid::arena::{ElementHandle, FieldHandle};
use crate::grid::region::Region;
use crate::types::{Error, FeValue, Result};
use std::collections::{HashSet, VecDeque};

/// An element defining a field for another element, and the map between their xi
#[derive(Debug, Clone, PartialEq)]
pub struct DefiningElement {
    /// The element defining the field
    pub element: ElementHandle,
    /// The map from the xi of the original element to the xi of the defining element
    pub xi_map: AffineXiMap,
}

fn not_in_region() -> Error {
    Error::InvalidArgument("the element is not in this region".to_string())
}

/// Visit an element and its ancestors breadth first, each once, with the map from the
/// element's xi to the visited element's xi; stops when `visit` returns true
fn walk_ancestors(
    region: &Region,
    element: ElementHandle,
    mut visit: impl FnMut(ElementHandle, &AffineXiMap) -> bool,
) -> Result<()> {
    let dimension = region.element(element).ok_or_else(not_in_region)?.dimension();
    let mut visited = HashSet::from([element]);
    let mut queue = VecDeque::from([(element, AffineXiMap::identity(dimension))]);
    while let Some((handle, map)) = queue.pop_front() {
        if visit(handle, &map) {
            return Ok(());
        }
        let current = region.element(handle).ok_or_else(not_in_region)?;
        for (parent, face) in current.parents() {
            if !visited.insert(*parent) {
                continue;
            }
            let parent_element = region.element(*parent).ok_or_else(not_in_region)?;
            let face_map = parent_element.shape().face_to_element_map(*face)?;
            queue.push_back((*parent, face_map.compose(&map)?));
        }
    }
    Ok(())
}

/// Find the element defining a field for an element
///
/// An element defining the field itself is its own defining element. Otherwise the
/// nearest ancestor defining the field is used; if `top_level` is given, that ancestor
/// must define the field and is used instead.
pub fn find_defining_element(
    region: &Region,
    element: ElementHandle,
    field: FieldHandle,
    top_level: Option<ElementHandle>,
) -> Result<DefiningElement> {
    let mut found = None;
    walk_ancestors(region, element, |handle, map| {
        let defines = region
            .element(handle)
            .map(|e| e.has_field(field))
            .unwrap_or(false);
        let accept = match top_level {
            Some(t) => defines && (handle == element || handle == t),
            None => defines,
        };
        if accept {
            found = Some(DefiningElement {
                element: handle,
                xi_map: map.clone(),
            });
        }
        accept
    })?;
    found.ok_or_else(|| {
        let identifier = region
            .element(element)
            .map(|e| e.identifier().to_string())
            .unwrap_or_default();
        Error::NotFound(format!(
            "field is not defined on {identifier} or its ancestors"
        ))
    })
}

/// Find the element and its ancestors that define a field, nearest first
pub fn find_defining_ancestors(
    region: &Region,
    element: ElementHandle,
    field: FieldHandle,
) -> Result<Vec<DefiningElement>> {
    let mut found = vec![];
    walk_ancestors(region, element, |handle, map| {
        if region
            .element(handle)
            .map(|e| e.has_field(field))
            .unwrap_or(false)
        {
            found.push(DefiningElement {
                element: handle,
                xi_map: map.clone(),
            });
        }
        false
    })?;
    Ok(found)
}

/// Find a top level ancestor of an element and the xi in it of a point in the element
///
/// If `top_level` is given, it must be an ancestor of the element, or the element itself.
/// Otherwise the nearest top level ancestor is used.
pub fn top_level_element_and_xi(
    region: &Region,
    element: ElementHandle,
    xi: &[FeValue],
    top_level: Option<ElementHandle>,
) -> Result<(ElementHandle, Vec<FeValue>)> {
    let mut found = None;
    walk_ancestors(region, element, |handle, map| {
        let accept = match top_level {
            Some(t) => handle == t,
            None => region
                .element(handle)
                .map(|e| e.is_top_level())
                .unwrap_or(false),
        };
        if accept {
            found = Some((handle, map.clone()));
        }
        accept
    })?;
    let (handle, map) = found.ok_or_else(|| {
        Error::NotFound("no top level element found among the ancestors".to_string())
    })?;
    Ok((handle, map.apply(xi)?))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::shape::ShapeType;
    use crate::field::FieldBuilder;
    use crate::grid::element::ElementBuilder;
    use crate::grid::maps::ElementFieldComponent;
    use crate::types::ElementIdentifier;
    use approx::*;

    /// A square with a grid field and its faces and their lines
    fn square(region: &mut Region) -> (FieldHandle, ElementHandle) {
        let field = region
            .add_field(FieldBuilder::new("f", 1).build().unwrap())
            .unwrap();
        let definition = region.field(field).unwrap().clone();
        let shape = region.get_shape(&ShapeType::line(2).unwrap());
        let mut builder = ElementBuilder::new(ElementIdentifier::element(1), shape);
        builder
            .define_field(
                field,
                &definition,
                vec![ElementFieldComponent::grid_based(vec![1, 1], 0).unwrap()],
            )
            .unwrap();
        let element = region.add_element(builder.finalize()).unwrap();
        region.define_faces(element).unwrap();
        (field, element)
    }

    #[test]
    fn test_direct_definition() {
        let mut region = Region::new();
        let (field, element) = square(&mut region);
        let defining = find_defining_element(&region, element, field, None).unwrap();
        assert_eq!(defining.element, element);
        assert_eq!(defining.xi_map, AffineXiMap::identity(2));
    }

    #[test]
    fn test_inherited_from_parent() {
        let mut region = Region::new();
        let (field, element) = square(&mut region);
        // Face 1 of a square is xi1 = 1, parameterised by xi2
        let face = region.element(element).unwrap().face(1).unwrap();
        let defining = find_defining_element(&region, face, field, None).unwrap();
        assert_eq!(defining.element, element);
        let xi = defining.xi_map.apply(&[0.25]).unwrap();
        assert_relative_eq!(xi[0], 1.0);
        assert_relative_eq!(xi[1], 0.25);

        let (top, top_xi) = top_level_element_and_xi(&region, face, &[0.25], None).unwrap();
        assert_eq!(top, element);
        assert_eq!(top_xi, xi);
        assert_eq!(
            find_defining_ancestors(&region, face, field).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_not_defined() {
        let mut region = Region::new();
        let (_, element) = square(&mut region);
        let other = region
            .add_field(FieldBuilder::new("g", 1).build().unwrap())
            .unwrap();
        let face = region.element(element).unwrap().face(0).unwrap();
        assert!(find_defining_element(&region, face, other, None)
            .unwrap_err()
            .is_not_found());
        assert!(find_defining_ancestors(&region, face, other)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_forced_top_level() {
        let mut region = Region::new();
        let (field, element) = square(&mut region);
        let face = region.element(element).unwrap().face(2).unwrap();
        let defining = find_defining_element(&region, face, field, Some(element)).unwrap();
        assert_eq!(defining.element, element);
        // A top level element that is not an ancestor gives nothing
        let shape = region.get_shape(&ShapeType::line(2).unwrap());
        let unrelated = region
            .add_element(ElementBuilder::new(ElementIdentifier::element(2), shape).finalize())
            .unwrap();
        assert!(find_defining_element(&region, face, field, Some(unrelated)).is_err());
        assert!(top_level_element_and_xi(&region, face, &[0.5], Some(unrelated)).is_err());
    }
}
