//! Linkage between xi directions

use crate::types::{Error, Result};

/// A link between two xi directions with a link parameter
///
/// The parameter is 1 for simplex links and the number of sides for polygon links.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct XiLink {
    /// The lower direction
    pub first: usize,
    /// The higher direction
    pub second: usize,
    /// The link parameter
    pub parameter: usize,
}

/// The set of links between the xi directions of a basis or shape
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Linkage {
    dim: usize,
    links: Vec<XiLink>,
}

impl Linkage {
    /// Create a linkage with no links
    pub fn unlinked(dim: usize) -> Self {
        Self {
            dim,
            links: vec![],
        }
    }

    /// Create a linkage from a list of links
    pub fn new(dim: usize, links: &[XiLink]) -> Result<Self> {
        let mut sorted = vec![];
        for link in links {
            let (first, second) = if link.first < link.second {
                (link.first, link.second)
            } else {
                (link.second, link.first)
            };
            if first == second || second >= dim {
                return Err(Error::InvalidArgument(format!(
                    "invalid link between xi{} and xi{} in dimension {dim}",
                    link.first + 1,
                    link.second + 1
                )));
            }
            if link.parameter == 0 {
                return Err(Error::InvalidArgument(
                    "link parameter must be positive".to_string(),
                ));
            }
            sorted.push(XiLink {
                first,
                second,
                parameter: link.parameter,
            });
        }
        sorted.sort();
        for pair in sorted.windows(2) {
            if pair[0].first == pair[1].first && pair[0].second == pair[1].second {
                return Err(Error::InvalidArgument(format!(
                    "xi{} and xi{} are linked twice",
                    pair[0].first + 1,
                    pair[0].second + 1
                )));
            }
        }
        Ok(Self {
            dim,
            links: sorted,
        })
    }

    /// The number of xi directions
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The links
    pub fn links(&self) -> &[XiLink] {
        &self.links
    }

    /// The link parameter between two directions, if they are directly linked
    pub fn parameter(&self, a: usize, b: usize) -> Option<usize> {
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        self.links
            .iter()
            .find(|l| l.first == first && l.second == second)
            .map(|l| l.parameter)
    }

    /// Is the given direction linked to any other?
    pub fn is_linked(&self, d: usize) -> bool {
        self.links.iter().any(|l| l.first == d || l.second == d)
    }

    /// The groups of directions connected by links, each sorted, ordered by their lowest member
    ///
    /// Unlinked directions form groups of size one.
    pub fn groups(&self) -> Vec<Vec<usize>> {
        let mut parent = (0..self.dim).collect::<Vec<_>>();
        fn root(parent: &[usize], mut i: usize) -> usize {
            while parent[i] != i {
                i = parent[i];
            }
            i
        }
        for link in &self.links {
            let a = root(&parent, link.first);
            let b = root(&parent, link.second);
            if a != b {
                parent[a.max(b)] = a.min(b);
            }
        }
        let mut groups: Vec<Vec<usize>> = vec![];
        for d in 0..self.dim {
            let r = root(&parent, d);
            if let Some(group) = groups.iter_mut().find(|g| g[0] == r) {
                group.push(d);
            } else {
                groups.push(vec![d]);
            }
        }
        groups
    }

    /// The group containing a direction
    pub fn group_of(&self, d: usize) -> Vec<usize> {
        self.groups()
            .into_iter()
            .find(|g| g.contains(&d))
            .unwrap_or_else(|| vec![d])
    }

    /// The largest link parameter within a group
    pub fn group_parameter(&self, group: &[usize]) -> usize {
        self.links
            .iter()
            .filter(|l| group.contains(&l.first))
            .map(|l| l.parameter)
            .max()
            .unwrap_or(0)
    }
}
