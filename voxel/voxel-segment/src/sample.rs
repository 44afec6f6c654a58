//! Sample identification: isolate the largest connected region of good voxels.

use std::collections::VecDeque;

use tracing::{info, warn};
use voxel_types::GridGeometry;

use crate::error::{SegmentResult, check_tuples};

/// Result of [`identify_sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SampleReport {
    /// Good voxels in the kept region.
    pub kept: usize,
    /// Good voxels outside the kept region, now marked bad.
    pub removed: usize,
    /// Enclosed bad voxels marked good.
    pub filled: usize,
}

/// Labels the 6-connected components of voxels where `member(i)` holds.
///
/// Returns a component index per voxel (`usize::MAX` for non-members) and
/// the size of each component, in discovery order.
fn components(geometry: &GridGeometry, member: impl Fn(usize) -> bool) -> (Vec<usize>, Vec<usize>) {
    let total = geometry.voxel_count();
    let mut label = vec![usize::MAX; total];
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..total {
        if label[seed] != usize::MAX || !member(seed) {
            continue;
        }
        let component = sizes.len();
        label[seed] = component;
        queue.push_back(seed);
        let mut size = 0;
        while let Some(current) = queue.pop_front() {
            size += 1;
            for neighbor in geometry.neighbor_indices(current) {
                if label[neighbor] == usize::MAX && member(neighbor) {
                    label[neighbor] = component;
                    queue.push_back(neighbor);
                }
            }
        }
        sizes.push(size);
    }
    (label, sizes)
}

/// Keeps only the largest 6-connected region of `good` voxels.
///
/// Ties go to the region found first in scan order. With `fill_holes`, bad
/// regions that do not touch a face of the grid are then marked good; in a
/// grid one voxel thick every voxel touches a face, so nothing is filled.
///
/// # Errors
///
/// Returns [`SegmentError::TupleCountMismatch`](crate::SegmentError::TupleCountMismatch)
/// if `good` does not cover the grid.
///
/// # Example
///
/// ```
/// use voxel_types::GridGeometry;
/// use voxel_segment::identify_sample;
///
/// let grid = GridGeometry::from_dims([5, 1, 1]).unwrap();
/// let mut good = [true, false, true, true, false];
/// let report = identify_sample(&grid, &mut good, false).unwrap();
/// assert_eq!(good, [false, false, true, true, false]);
/// assert_eq!(report.removed, 1);
/// ```
pub fn identify_sample(
    geometry: &GridGeometry,
    good: &mut [bool],
    fill_holes: bool,
) -> SegmentResult<SampleReport> {
    check_tuples("good", geometry.voxel_count(), good.len())?;

    let (label, sizes) = components(geometry, |i| good[i]);
    let mut largest = None;
    let mut kept = 0;
    for (component, &size) in sizes.iter().enumerate() {
        if size > kept {
            kept = size;
            largest = Some(component);
        }
    }
    let Some(largest) = largest else {
        warn!("No good voxels; nothing to identify");
        return Ok(SampleReport::default());
    };

    let mut report = SampleReport {
        kept,
        ..SampleReport::default()
    };
    for (flag, &component) in good.iter_mut().zip(&label) {
        if *flag && component != largest {
            *flag = false;
            report.removed += 1;
        }
    }

    if fill_holes {
        let (label, sizes) = components(geometry, |i| !good[i]);
        let mut open = vec![false; sizes.len()];
        for (index, &component) in label.iter().enumerate() {
            if component != usize::MAX && geometry.is_boundary(index) {
                open[component] = true;
            }
        }
        for (flag, &component) in good.iter_mut().zip(&label) {
            if component != usize::MAX && !open[component] {
                *flag = true;
                report.filled += 1;
            }
        }
        report.kept += report.filled;
    }

    info!(
        kept = report.kept,
        removed = report.removed,
        filled = report.filled,
        "Identified sample"
    );
    Ok(report)
}
