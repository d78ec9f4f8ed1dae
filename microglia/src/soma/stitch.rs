//! Linking of per-plane instance labels into 3D objects.
//!
//! Plane by plane, each instance is matched against the already stitched
//! instances of the previous plane by intersection over union. For every
//! previous instance only its best-matching new instance may link to it;
//! each new instance then takes the ID of its best remaining match when
//! that IoU reaches the threshold, and a fresh ID otherwise.

use std::collections::{BTreeMap, HashMap};

use common::Buffer3;

/// Stitch `planes` (each `width * height`, arbitrary instance values) into
/// one label volume with IDs contiguous from 1.
pub fn stitch_planes(
    planes: Vec<Vec<u32>>,
    width: usize,
    height: usize,
    threshold: f32,
) -> Buffer3<u32> {
    let threshold = threshold as f64;
    let mut next_id = 1u32;
    let mut stitched: Vec<Vec<u32>> = Vec::with_capacity(planes.len());

    for raw in planes {
        let areas = instance_areas(&raw);
        let assignment: HashMap<u32, u32> = match stitched.last() {
            Some(prev) if !areas.is_empty() => {
                link_to_previous(&raw, &areas, prev, threshold, &mut next_id)
            }
            _ => areas
                .keys()
                .map(|&label| {
                    let id = next_id;
                    next_id += 1;
                    (label, id)
                })
                .collect(),
        };
        let plane = raw
            .iter()
            .map(|l| if *l == 0 { 0 } else { assignment[l] })
            .collect();
        stitched.push(plane);
    }

    Buffer3::from_planes(width, height, stitched)
}

/// Pixel count per non-zero instance, ordered by instance value.
fn instance_areas(plane: &[u32]) -> BTreeMap<u32, usize> {
    let mut areas = BTreeMap::new();
    for &l in plane.iter().filter(|&&l| l != 0) {
        *areas.entry(l).or_insert(0) += 1;
    }
    areas
}

fn link_to_previous(
    raw: &[u32],
    areas: &BTreeMap<u32, usize>,
    prev: &[u32],
    threshold: f64,
    next_id: &mut u32,
) -> HashMap<u32, u32> {
    let prev_areas = instance_areas(prev);
    let mut intersections: BTreeMap<(u32, u32), usize> = BTreeMap::new();
    for (&new, &old) in raw.iter().zip(prev) {
        if new != 0 && old != 0 {
            *intersections.entry((new, old)).or_insert(0) += 1;
        }
    }

    let candidates: Vec<(u32, u32, f64)> = intersections
        .iter()
        .map(|(&(new, old), &inter)| {
            let union = areas[&new] + prev_areas[&old] - inter;
            (new, old, inter as f64 / union as f64)
        })
        .filter(|&(_, _, iou)| iou >= threshold)
        .collect();

    // Best IoU per previous instance; weaker claims on it are dropped.
    let mut column_max: HashMap<u32, f64> = HashMap::new();
    for &(_, old, iou) in &candidates {
        let best = column_max.entry(old).or_insert(iou);
        *best = best.max(iou);
    }

    // Best surviving match per new instance; ties go to the lower ID.
    let mut best_match: BTreeMap<u32, (u32, f64)> = BTreeMap::new();
    for &(new, old, iou) in &candidates {
        if iou < column_max[&old] {
            continue;
        }
        match best_match.get(&new) {
            Some(&(_, best)) if best >= iou => {}
            _ => {
                best_match.insert(new, (old, iou));
            }
        }
    }

    areas
        .keys()
        .map(|&label| match best_match.get(&label) {
            Some(&(old, _)) => (label, old),
            None => {
                let id = *next_id;
                *next_id += 1;
                (label, id)
            }
        })
        .collect()
}
