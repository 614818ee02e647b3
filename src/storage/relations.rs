//! Parent/child relations between span annotations.
//!
//! Given a parent annotation (e.g. sentences) and a child annotation
//! (e.g. tokens), computes which children each parent contains, using a
//! co-sort and two-pointer sweep over start offsets.

use crate::base::Span;

/// Children per parent (indices into the child annotation) plus the
/// orphan set (children contained in no parent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentChildren {
    pub children: Vec<Vec<usize>>,
    pub orphans: Vec<usize>,
}

/// For each parent span, the indices of child spans contained in it.
///
/// Parents and children are co-sorted by start offset; a sweep assigns
/// each child to every parent containing it. Orphans come back in child
/// order; whether they warrant a warning is the caller's call.
pub fn find_children(parents: &[Span], children: &[Span]) -> ParentChildren {
    let mut parent_order: Vec<usize> = (0..parents.len()).collect();
    parent_order.sort_by_key(|&i| parents[i]);
    let mut child_order: Vec<usize> = (0..children.len()).collect();
    child_order.sort_by_key(|&i| children[i]);

    let mut result = vec![Vec::new(); parents.len()];
    let mut orphans = Vec::new();
    let mut first_candidate = 0usize;

    for &ci in &child_order {
        let child = &children[ci];
        // Parents ending before this child's start can never contain it,
        // nor any later child.
        while first_candidate < parent_order.len() {
            let p = &parents[parent_order[first_candidate]];
            if p.end() < child.start() {
                first_candidate += 1;
            } else {
                break;
            }
        }
        let mut adopted = false;
        for &pi in &parent_order[first_candidate..] {
            let parent = &parents[pi];
            if parent.start() > child.start() {
                break;
            }
            if parent.contains(child) {
                result[pi].push(ci);
                adopted = true;
            }
        }
        if !adopted {
            orphans.push(ci);
        }
    }

    for list in &mut result {
        list.sort_unstable();
    }
    orphans.sort_unstable();
    ParentChildren {
        children: result,
        orphans,
    }
}
