/*
  Copyright© 2023 Raúl Wolters(1)

  This file is part of supervoxel-watershed.

  supervoxel-watershed is free software: you can redistribute it and/or modify
  it under the terms of the European Union Public License version 1.2 or later,
  as published by the European Commission.

  supervoxel-watershed is distributed in the hope that it will be useful, but
  WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
  FITNESS FOR A PARTICULAR PURPOSE. See the European Union Public License for
  more details.

  You should have received a copy of the EUPL in an/all official language(s) of
  the European Union along with supervoxel-watershed.  If not, see
  <https://ec.europa.eu/info/european-union-public-licence_en/>.

  (1) Resident of the Kingdom of the Netherlands; agreement between licensor and
  licensee subject to Dutch law as per article 15 of the EUPL.
*/

//! The middle layer of the oversegmentation engine: seed generation, seed-map
//! merging, per-slice and volumetric watershed execution and post-hoc size
//! filtering. The [`crate::Oversegment`] strategies are thin orchestrations of
//! the functions in this module.
//!
//! Per-slice operations (2D seeding and 2D flooding) treat every z-slice as an
//! independent problem and run them in parallel; only the running label offset
//! that keeps slice-local labels globally unique is applied in a second,
//! ordered pass.

use ndarray as nd;
use rayon::prelude::*;

use crate::primitives;
use crate::BACKGROUND_LABEL;

#[cfg(feature = "progress")]
fn set_up_bar(n_slices: usize) -> indicatif::ProgressBar {
  const TEMPLATE: &str = "{spinner}[{elapsed}/{duration}] slice {pos}/{len}{bar:60}";
  let style = indicatif::ProgressStyle::with_template(TEMPLATE);
  let bar = indicatif::ProgressBar::new(n_slices as u64);
  bar.set_style(style.unwrap());
  return bar;
}

////////////////////////////////////////////////////////////////////////////////
//                               SEED GENERATION                              //
////////////////////////////////////////////////////////////////////////////////

/// Generates coarse seeds from thresholded connected components: voxels with
/// `value <= threshold` form the foreground, minus any voxels of the exclusion
/// mask, and each connected foreground component becomes one seed. Returns the
/// seed map and the merge offset `max label + 1`: deliberately one more than
/// the number of seeds, so that a second label space shifted by it can never
/// collide with this one (see [`merge_seed_maps`]).
///
/// Deterministic for identical inputs; labels start at 1 and are contiguous.
pub fn seeds_from_connected_components(
  input: nd::ArrayView3<f32>,
  threshold: f32,
  exclusion: Option<nd::ArrayView3<bool>>,
) -> (nd::Array3<u32>, u32) {
  let mut foreground = input.mapv(|value| value <= threshold);
  if let Some(excluded) = exclusion {
    nd::Zip::from(&mut foreground).and(excluded).for_each(|fg, &out| {
      if out {
        *fg = false;
      }
    });
  }
  let (seeds, max_label) = primitives::label_components_3d(foreground.view());
  log::debug!("connected-component seeding: {max_label} seeds");
  (seeds, max_label + 1)
}

fn distance_seeds_slice(
  plane: nd::ArrayView2<f32>,
  threshold: f32,
  sigma: f32,
) -> (nd::Array2<u32>, u32) {
  let foreground = plane.mapv(|value| value < threshold);
  let mut dist = primitives::distance_transform_2d(foreground.view());
  //sigma <= 0 disables smoothing; the primitive requires a positive sigma
  if sigma > 0.0 {
    dist = primitives::gaussian_smooth_2d(dist.view(), sigma);
  }
  let maxima = primitives::local_maxima_2d(dist.view());
  primitives::label_components_2d(maxima.view())
}

/// Generates fine seeds from the local maxima of the Euclidean distance
/// transform of the `value < threshold` foreground, optionally smoothed with
/// a Gaussian of width `sigma` (`sigma <= 0` disables smoothing). One
/// volumetric pass. Returns the seed map and the number of seeds, which is
/// the bare maximum label since labels are contiguous from 1, unlike the
/// `max + 1` merge offset that [`seeds_from_connected_components`] returns.
pub fn seeds_from_distance_transform(
  input: nd::ArrayView3<f32>,
  threshold: f32,
  sigma: f32,
) -> (nd::Array3<u32>, u32) {
  let foreground = input.mapv(|value| value < threshold);
  let mut dist = primitives::distance_transform_3d(foreground.view());
  if sigma > 0.0 {
    dist = primitives::gaussian_smooth_3d(dist.view(), sigma);
  }
  let maxima = primitives::local_maxima_3d(dist.view());
  let (seeds, max_label) = primitives::label_components_3d(maxima.view());
  log::debug!("distance-transform seeding (3d): {max_label} seeds");
  (seeds, max_label)
}

/// Per-slice variant of [`seeds_from_distance_transform`] for strongly
/// anisotropic volumes: every z-slice is seeded independently, then a running
/// label offset makes the slice-local labels globally unique. The per-slice
/// work runs in parallel; the offset is an accumulator applied in a second,
/// ordered pass and only ever grows, so label spaces of different slices
/// never collide (empty slices included).
pub fn seeds_from_distance_transform_2d(
  input: nd::ArrayView3<f32>,
  threshold: f32,
  sigma: f32,
) -> (nd::Array3<u32>, u32) {
  //(1) label every slice independently, in parallel
  let slices: Vec<(nd::Array2<u32>, u32)> = input
    .axis_iter(nd::Axis(0))
    .into_par_iter()
    .map(|plane| distance_seeds_slice(plane, threshold, sigma))
    .collect();

  //(2) thread the running offset through the slices in z-order
  let mut seeds = nd::Array3::<u32>::zeros(input.raw_dim());
  let mut offset = 0u32;
  for (z, (plane, count)) in slices.into_iter().enumerate() {
    nd::Zip::from(seeds.index_axis_mut(nd::Axis(0), z)).and(&plane).for_each(|seed, &label| {
      if label != BACKGROUND_LABEL {
        *seed = label + offset;
      }
    });
    offset += count;
  }
  log::debug!("distance-transform seeding (2d): {offset} seeds");
  (seeds, offset)
}

////////////////////////////////////////////////////////////////////////////////
//                                SEED MERGING                                //
////////////////////////////////////////////////////////////////////////////////

/// Merges a secondary seed map into a primary one: every nonzero secondary
/// label is shifted up by `offset` (the primary map's seed count) and copied
/// only into voxels the primary map left unseeded. Primary labels always win,
/// so coarse, reliable seeds dominate and the fine seeds merely break up the
/// remaining unseeded space.
pub fn merge_seed_maps(
  primary: &mut nd::Array3<u32>,
  secondary: nd::ArrayView3<u32>,
  offset: u32,
) {
  nd::Zip::from(primary).and(secondary).for_each(|first, &second| {
    if *first == BACKGROUND_LABEL && second != BACKGROUND_LABEL {
      *first = second + offset;
    }
  });
}

////////////////////////////////////////////////////////////////////////////////
//                            WATERSHED EXECUTION                             //
////////////////////////////////////////////////////////////////////////////////

/// One seeded watershed pass over the full volume.
pub fn run_watershed(
  growth: nd::ArrayView3<f32>,
  seeds: nd::ArrayView3<u32>,
) -> (nd::Array3<u32>, u32) {
  primitives::seeded_watershed_3d(growth, seeds)
}

/// Runs the seeded watershed independently per z-slice: each slice only sees
/// its own seeds and growth values, so no region ever grows across z. Used on
/// strongly anisotropic data where 3D flooding across the coarse z-axis would
/// produce physically implausible merges. Slices are flooded in parallel.
pub fn run_watershed_2d(
  growth: nd::ArrayView3<f32>,
  seeds: nd::ArrayView3<u32>,
) -> (nd::Array3<u32>, u32) {
  let mut flooded = nd::Array3::<u32>::zeros(growth.raw_dim());

  #[cfg(feature = "progress")]
  let bar = set_up_bar(growth.len_of(nd::Axis(0)));

  nd::Zip::from(flooded.outer_iter_mut())
    .and(growth.outer_iter())
    .and(seeds.outer_iter())
    .par_for_each(|mut out, growth_z, seeds_z| {
      let (labels, _) = primitives::seeded_watershed_2d(growth_z, seeds_z);
      out.assign(&labels);
      #[cfg(feature = "progress")]
      bar.inc(1);
    });

  let max_label = flooded.iter().copied().max().unwrap_or(BACKGROUND_LABEL);
  (flooded, max_label)
}

////////////////////////////////////////////////////////////////////////////////
//                               SIZE FILTERING                               //
////////////////////////////////////////////////////////////////////////////////

/// Removes regions smaller than `min_size` voxels from a watershed result:
/// their labels are erased in a copy of the label volume and one volumetric
/// re-flood lets the surviving neighbours absorb the freed voxels.
///
/// This is a single filter-and-reflood pass. If every region is undersized
/// the re-flood has no seeds left and the result is all background; removal
/// cascades are not iterated to a fixpoint.
pub fn filter_small_regions(
  growth: nd::ArrayView3<f32>,
  flooded: nd::ArrayView3<u32>,
  min_size: usize,
) -> (nd::Array3<u32>, u32) {
  //(1) voxel counts per label
  let mut counts: std::collections::HashMap<u32, usize> = std::collections::HashMap::new();
  for &label in flooded.iter() {
    *counts.entry(label).or_insert(0) += 1;
  }

  //(2) erase the undersized labels in a copy of the label volume
  let undersized: std::collections::HashSet<u32> = counts
    .iter()
    .filter(|&(&label, &count)| label != BACKGROUND_LABEL && count < min_size)
    .map(|(&label, _)| label)
    .collect();
  if undersized.is_empty() {
    let max_label = flooded.iter().copied().max().unwrap_or(BACKGROUND_LABEL);
    return (flooded.to_owned(), max_label);
  }
  log::debug!("size filter: removing {} regions below {min_size} voxels", undersized.len());
  let mut reduced = flooded.to_owned();
  reduced.mapv_inplace(|label| if undersized.contains(&label) { BACKGROUND_LABEL } else { label });

  //(3) re-flood from the surviving labels so the freed voxels are reabsorbed
  primitives::seeded_watershed_3d(growth, reduced.view())
}

////////////////////////////////////////////////////////////////////////////////
//                                   TESTS                                    //
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cc_seeds_respect_threshold_and_return_the_merge_offset() {
    //One low-value cube in a high background: exactly one seed, and the
    //returned offset is one past its label
    let mut volume = nd::Array3::<f32>::from_elem((3, 6, 6), 1.0);
    volume.slice_mut(nd::s![0..2, 0..2, 0..2]).fill(0.0);
    let (seeds, offset) = seeds_from_connected_components(volume.view(), 0.5, None);
    assert_eq!(offset, 2); //max label 1 → offset 2
    assert_eq!(seeds[[0, 0, 0]], 1);
    assert_eq!(seeds[[2, 5, 5]], 0);
  }

  #[test]
  fn cc_seeds_exclusion_blocks_seeding() {
    let volume = nd::Array3::<f32>::zeros((2, 4, 4));
    let exclusion = nd::Array3::<bool>::from_elem((2, 4, 4), true);
    let (seeds, offset) =
      seeds_from_connected_components(volume.view(), 0.5, Some(exclusion.view()));
    assert_eq!(offset, 1); //no labels used → max label 0 → offset 1
    assert!(seeds.iter().all(|&l| l == 0));
  }

  #[test]
  fn merge_offsets_secondary_labels() {
    //A = {0,1,2} with seed count 3, B = {0,1}: B-derived labels must be
    //exactly {0,4}, and only where A was unseeded
    let mut primary = nd::Array3::<u32>::zeros((1, 1, 4));
    primary[[0, 0, 0]] = 1;
    primary[[0, 0, 1]] = 2;
    let mut secondary = nd::Array3::<u32>::zeros((1, 1, 4));
    secondary[[0, 0, 1]] = 1; //collides with A → must lose
    secondary[[0, 0, 2]] = 1;
    merge_seed_maps(&mut primary, secondary.view(), 3);
    assert_eq!(primary[[0, 0, 0]], 1);
    assert_eq!(primary[[0, 0, 1]], 2); //A takes priority
    assert_eq!(primary[[0, 0, 2]], 4); //1 + offset 3
    assert_eq!(primary[[0, 0, 3]], 0);
  }

  #[test]
  fn dt_seeds_2d_offsets_never_collide() {
    //Slices 0 and 2 have foreground blobs; slice 1 has none, which makes its
    //whole zero-distance field one border plateau and thus one seed. The
    //running offset must keep all three slices' label spaces disjoint.
    let mut volume = nd::Array3::<f32>::from_elem((3, 7, 7), 1.0);
    volume.slice_mut(nd::s![0, 1..3, 1..3]).fill(0.0);
    volume.slice_mut(nd::s![0, 4..6, 4..6]).fill(0.0);
    volume.slice_mut(nd::s![2, 2..5, 2..5]).fill(0.0);
    let (seeds, total) = seeds_from_distance_transform_2d(volume.view(), 0.5, 0.0);

    let labels_z0: std::collections::HashSet<u32> =
      seeds.index_axis(nd::Axis(0), 0).iter().copied().filter(|&l| l != 0).collect();
    let labels_z1: std::collections::HashSet<u32> =
      seeds.index_axis(nd::Axis(0), 1).iter().copied().filter(|&l| l != 0).collect();
    let labels_z2: std::collections::HashSet<u32> =
      seeds.index_axis(nd::Axis(0), 2).iter().copied().filter(|&l| l != 0).collect();

    assert_eq!(labels_z0.len(), 2);
    assert_eq!(labels_z1.len(), 1);
    assert!(!labels_z2.is_empty());
    assert!(labels_z0.is_disjoint(&labels_z1));
    assert!(labels_z0.is_disjoint(&labels_z2));
    assert!(labels_z1.is_disjoint(&labels_z2));
    let max = seeds.iter().copied().max().unwrap();
    assert!(total >= max, "total seed count {total} must cover the max label {max}");
  }

  #[test]
  fn watershed_2d_keeps_slices_independent() {
    //One seed per slice with flat growth: each slice floods to its own label
    let growth = nd::Array3::<f32>::zeros((2, 3, 3));
    let mut seeds = nd::Array3::<u32>::zeros((2, 3, 3));
    seeds[[0, 1, 1]] = 1;
    seeds[[1, 1, 1]] = 2;
    let (flooded, max_label) = run_watershed_2d(growth.view(), seeds.view());
    assert_eq!(max_label, 2);
    assert!(flooded.index_axis(nd::Axis(0), 0).iter().all(|&l| l == 1));
    assert!(flooded.index_axis(nd::Axis(0), 1).iter().all(|&l| l == 2));
  }

  #[test]
  fn size_filter_absorbs_small_region() {
    //A 1-voxel region enclosed by a large one: after filtering, its voxel
    //carries the large region's label and the large region grew by exactly
    //that one voxel (mass conservation)
    let growth = nd::Array3::<f32>::zeros((1, 4, 4));
    let mut flooded = nd::Array3::<u32>::from_elem((1, 4, 4), 1);
    flooded[[0, 2, 2]] = 2;
    let before = flooded.iter().filter(|&&l| l == 1).count();
    let (cleaned, max_label) = filter_small_regions(growth.view(), flooded.view(), 3);
    assert_eq!(max_label, 1);
    assert_eq!(cleaned[[0, 2, 2]], 1);
    let after = cleaned.iter().filter(|&&l| l == 1).count();
    assert_eq!(after, before + 1);
  }

  #[test]
  fn size_filter_zero_removals_is_identity() {
    let growth = nd::Array3::<f32>::zeros((1, 3, 3));
    let flooded = nd::Array3::<u32>::from_elem((1, 3, 3), 1);
    let (cleaned, max_label) = filter_small_regions(growth.view(), flooded.view(), 3);
    assert_eq!(cleaned, flooded);
    assert_eq!(max_label, 1);
  }

  #[test]
  fn size_filter_single_pass_may_leave_small_regions() {
    //Documented single-pass behaviour: when every region is undersized the
    //re-flood has no seeds left, so the result is all background rather than
    //an error
    let growth = nd::Array3::<f32>::zeros((1, 2, 2));
    let mut flooded = nd::Array3::<u32>::zeros((1, 2, 2));
    flooded[[0, 0, 0]] = 1;
    flooded[[0, 0, 1]] = 1;
    flooded[[0, 1, 0]] = 2;
    flooded[[0, 1, 1]] = 2;
    let (cleaned, max_label) = filter_small_regions(growth.view(), flooded.view(), 10);
    assert_eq!(max_label, 0);
    assert!(cleaned.iter().all(|&l| l == 0));
  }
}
