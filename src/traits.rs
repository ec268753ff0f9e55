//! Trait definitions

use crate::grid::region::ChangeLog;

/// A consumer of changes to the objects of a region
pub trait ChangeObserver {
    /// Called when a batch of changes is complete
    fn region_changed(&mut self, changes: &ChangeLog);
}
