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

//! Dense-array primitives that the oversegmentation pipeline is built from:
//! background-aware connected-component labelling, the exact Euclidean distance
//! transform, separable Gaussian smoothing, plateau-aware local maxima
//! detection, seeded watershed flooding and consecutive relabelling.
//!
//! All functions here are pure: they consume read-only views and return fresh
//! arrays. Label `0` is reserved for background throughout. The 2D variants
//! operate on single z-slices; where the operation is separable (distance
//! transform, smoothing) both variants share one dimension-generic core.

use std::collections::{BinaryHeap, HashMap, VecDeque};

use ndarray as nd;

use crate::BACKGROUND_LABEL;

////////////////////////////////////////////////////////////////////////////////
//                              HELPER FUNCTIONS                              //
////////////////////////////////////////////////////////////////////////////////

#[inline]
fn neighbours_6con(
  index: (usize, usize, usize),
  dim: (usize, usize, usize),
) -> Vec<(usize, usize, usize)> {
  let (z, y, x) = (index.0 as isize, index.1 as isize, index.2 as isize);
  [(z - 1, y, x), (z + 1, y, x), (z, y - 1, x), (z, y + 1, x), (z, y, x - 1), (z, y, x + 1)]
    .iter()
    .filter_map(|&(z, y, x)| {
      if z < 0 || y < 0 || x < 0 {
        None
      } else if z as usize >= dim.0 || y as usize >= dim.1 || x as usize >= dim.2 {
        None
      } else {
        Some((z as usize, y as usize, x as usize))
      }
    })
    .collect()
}

#[inline]
fn neighbours_26con(
  index: (usize, usize, usize),
  dim: (usize, usize, usize),
) -> Vec<(usize, usize, usize)> {
  let (z, y, x) = (index.0 as isize, index.1 as isize, index.2 as isize);
  let mut neighbours = Vec::with_capacity(26);
  for dz in -1isize..=1 {
    for dy in -1isize..=1 {
      for dx in -1isize..=1 {
        if dz == 0 && dy == 0 && dx == 0 {
          continue;
        }
        let (nz, ny, nx) = (z + dz, y + dy, x + dx);
        if nz < 0 || ny < 0 || nx < 0 {
          continue;
        }
        let (nz, ny, nx) = (nz as usize, ny as usize, nx as usize);
        if nz >= dim.0 || ny >= dim.1 || nx >= dim.2 {
          continue;
        }
        neighbours.push((nz, ny, nx));
      }
    }
  }
  neighbours
}

////////////////////////////////////////////////////////////////////////////////
//                        CONNECTED-COMPONENT LABELLING                       //
////////////////////////////////////////////////////////////////////////////////

/// Union-find over provisional labels, with path compression. Slot 0 is the
/// background sentinel and is never merged.
struct UnionFind {
  parent: Vec<u32>,
}

impl UnionFind {
  fn new() -> Self {
    UnionFind { parent: vec![0] }
  }

  fn make_label(&mut self) -> u32 {
    let label = self.parent.len() as u32;
    self.parent.push(label);
    label
  }

  fn find(&mut self, label: u32) -> u32 {
    let mut root = label;
    while self.parent[root as usize] != root {
      root = self.parent[root as usize];
    }
    //Path compression: point every node on the walked path at the root
    let mut node = label;
    while self.parent[node as usize] != root {
      let next = self.parent[node as usize];
      self.parent[node as usize] = root;
      node = next;
    }
    root
  }

  fn union(&mut self, a: u32, b: u32) -> u32 {
    let root_a = self.find(a);
    let root_b = self.find(b);
    let (lo, hi) = if root_a < root_b { (root_a, root_b) } else { (root_b, root_a) };
    self.parent[hi as usize] = lo;
    lo
  }
}

/// Labels the connected foreground (`true`) components of a binary volume
/// under 6-connectivity. Background voxels keep label 0; component labels are
/// contiguous starting at 1, numbered in scan order. Returns the label volume
/// and the maximum label used.
pub fn label_components_3d(mask: nd::ArrayView3<bool>) -> (nd::Array3<u32>, u32) {
  let (nz, ny, nx) = mask.dim();
  let mut labels = nd::Array3::<u32>::zeros((nz, ny, nx));
  let mut forest = UnionFind::new();

  //(1) provisional pass: inherit a label from the already-visited neighbours
  // (-z, -y, -x), merging their equivalence classes where they disagree
  for z in 0..nz {
    for y in 0..ny {
      for x in 0..nx {
        if !mask[[z, y, x]] {
          continue;
        }
        let mut current = BACKGROUND_LABEL;
        let previous = [
          if z > 0 { labels[[z - 1, y, x]] } else { BACKGROUND_LABEL },
          if y > 0 { labels[[z, y - 1, x]] } else { BACKGROUND_LABEL },
          if x > 0 { labels[[z, y, x - 1]] } else { BACKGROUND_LABEL },
        ];
        for &neighbour in previous.iter().filter(|&&l| l != BACKGROUND_LABEL) {
          current = if current == BACKGROUND_LABEL {
            neighbour
          } else {
            forest.union(current, neighbour)
          };
        }
        if current == BACKGROUND_LABEL {
          current = forest.make_label();
        }
        labels[[z, y, x]] = current;
      }
    }
  }

  //(2) resolution pass: collapse every voxel onto its class root and renumber
  // the roots consecutively in order of first appearance
  let mut remap = vec![BACKGROUND_LABEL; forest.parent.len()];
  let mut max_label = 0u32;
  for label in labels.iter_mut() {
    if *label == BACKGROUND_LABEL {
      continue;
    }
    let root = forest.find(*label) as usize;
    if remap[root] == BACKGROUND_LABEL {
      max_label += 1;
      remap[root] = max_label;
    }
    *label = remap[root];
  }
  (labels, max_label)
}

/// 2D counterpart of [`label_components_3d`] (4-connectivity within a slice).
pub fn label_components_2d(mask: nd::ArrayView2<bool>) -> (nd::Array2<u32>, u32) {
  let (labels, max_label) = label_components_3d(mask.insert_axis(nd::Axis(0)));
  (labels.remove_axis(nd::Axis(0)), max_label)
}

////////////////////////////////////////////////////////////////////////////////
//                        EUCLIDEAN DISTANCE TRANSFORM                        //
////////////////////////////////////////////////////////////////////////////////

/// Scratch buffers for the lower-envelope pass, reused across lanes.
#[derive(Default)]
struct ParabolaScratch {
  f: Vec<f32>,
  v: Vec<usize>,
  z: Vec<f32>,
}

/// Two-direction scan along one lane: turns the 0/∞ indicator into the squared
/// distance to the nearest zero within the lane.
fn scan_lane(lane: &mut nd::ArrayViewMut1<f32>) {
  let n = lane.len();
  let mut prev = f32::INFINITY;
  for i in 0..n {
    prev = if lane[i] == 0.0 { 0.0 } else { prev + 1.0 };
    lane[i] = prev;
  }
  prev = f32::INFINITY;
  for i in (0..n).rev() {
    prev = (prev + 1.0).min(lane[i]);
    lane[i] = prev * prev;
  }
}

#[inline]
fn parabola_intersection(f: &[f32], q: usize, p: usize) -> f32 {
  let (qf, pf) = (q as f32, p as f32);
  ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
}

/// One Felzenszwalb–Huttenlocher lower-envelope pass over a lane of squared
/// distances. Infinite entries (lanes that saw no background along earlier
/// axes) contribute no parabola; an all-infinite lane stays infinite.
fn envelope_lane(lane: &mut nd::ArrayViewMut1<f32>, scratch: &mut ParabolaScratch) {
  let n = lane.len();
  if n == 0 {
    return;
  }
  let ParabolaScratch { f, v, z } = scratch;
  f.clear();
  f.extend(lane.iter().copied());
  v.clear();
  v.resize(n, 0);
  z.clear();
  z.resize(n + 1, 0.0);

  let mut k = 0usize;
  let mut have_any = false;
  for q in 0..n {
    if !f[q].is_finite() {
      continue;
    }
    if !have_any {
      have_any = true;
      v[0] = q;
      z[0] = f32::NEG_INFINITY;
      z[1] = f32::INFINITY;
      continue;
    }
    let mut s = parabola_intersection(f, q, v[k]);
    while s <= z[k] {
      k -= 1;
      s = parabola_intersection(f, q, v[k]);
    }
    k += 1;
    v[k] = q;
    z[k] = s;
    z[k + 1] = f32::INFINITY;
  }
  if !have_any {
    return;
  }

  k = 0;
  for q in 0..n {
    while z[k + 1] < q as f32 {
      k += 1;
    }
    let dq = q as f32 - v[k] as f32;
    lane[q] = f[v[k]] + dq * dq;
  }
}

fn distance_transform_impl<D: nd::Dimension>(
  mask: nd::ArrayView<'_, bool, D>,
) -> nd::Array<f32, D> {
  let mut dist = mask.mapv(|foreground| if foreground { f32::INFINITY } else { 0.0 });
  let ndim = dist.ndim();

  //(1) scan pass along the innermost axis
  for mut lane in dist.lanes_mut(nd::Axis(ndim - 1)) {
    scan_lane(&mut lane);
  }
  //(2) lower-envelope passes along the remaining axes
  let mut scratch = ParabolaScratch::default();
  for ax in 0..ndim - 1 {
    for mut lane in dist.lanes_mut(nd::Axis(ax)) {
      envelope_lane(&mut lane, &mut scratch);
    }
  }
  //(3) squared values back to metric distances
  dist.mapv_inplace(f32::sqrt);
  dist
}

/// Exact Euclidean distance of every foreground (`true`) voxel to the nearest
/// background voxel. Background voxels have distance 0. A volume without any
/// background yields `f32::INFINITY` everywhere; callers that can encounter
/// this degenerate input must handle it themselves.
pub fn distance_transform_3d(mask: nd::ArrayView3<bool>) -> nd::Array3<f32> {
  distance_transform_impl(mask)
}

/// 2D counterpart of [`distance_transform_3d`].
pub fn distance_transform_2d(mask: nd::ArrayView2<bool>) -> nd::Array2<f32> {
  distance_transform_impl(mask)
}

////////////////////////////////////////////////////////////////////////////////
//                             GAUSSIAN SMOOTHING                             //
////////////////////////////////////////////////////////////////////////////////

fn gaussian_kernel(sigma: f32) -> Vec<f32> {
  let radius = (3.0 * sigma).ceil().max(1.0) as isize;
  let s2 = 2.0 * sigma * sigma;
  let mut kernel: Vec<f32> =
    (-radius..=radius).map(|i| (-((i * i) as f32) / s2).exp()).collect();
  let sum: f32 = kernel.iter().sum();
  kernel.iter_mut().for_each(|w| *w /= sum);
  kernel
}

fn convolve_reflect(src: &[f32], kernel: &[f32], dst: &mut nd::ArrayViewMut1<f32>) {
  let n = src.len() as isize;
  let radius = (kernel.len() / 2) as isize;
  for i in 0..n {
    let mut acc = 0.0;
    for (j, &weight) in kernel.iter().enumerate() {
      let mut idx = i + j as isize - radius;
      //Reflect out-of-range taps back into the lane (d c b a | a b c d)
      loop {
        if idx < 0 {
          idx = -idx - 1;
        } else if idx >= n {
          idx = 2 * n - idx - 1;
        } else {
          break;
        }
      }
      acc += weight * src[idx as usize];
    }
    dst[i as usize] = acc;
  }
}

fn gaussian_smooth_impl<D: nd::Dimension>(
  field: nd::ArrayView<'_, f32, D>,
  sigma: f32,
) -> nd::Array<f32, D> {
  debug_assert!(sigma > 0.0, "smoothing requires a positive sigma");
  let kernel = gaussian_kernel(sigma);
  let mut out = field.to_owned();
  let mut buf: Vec<f32> = Vec::new();
  for ax in 0..out.ndim() {
    for mut lane in out.lanes_mut(nd::Axis(ax)) {
      buf.clear();
      buf.extend(lane.iter().copied());
      convolve_reflect(&buf, &kernel, &mut lane);
    }
  }
  out
}

/// Separable Gaussian smoothing with reflected boundaries and a kernel radius
/// of `ceil(3σ)`. The caller must branch on `sigma <= 0` (smoothing disabled)
/// before calling in here.
pub fn gaussian_smooth_3d(field: nd::ArrayView3<f32>, sigma: f32) -> nd::Array3<f32> {
  gaussian_smooth_impl(field, sigma)
}

/// 2D counterpart of [`gaussian_smooth_3d`].
pub fn gaussian_smooth_2d(field: nd::ArrayView2<f32>, sigma: f32) -> nd::Array2<f32> {
  gaussian_smooth_impl(field, sigma)
}

////////////////////////////////////////////////////////////////////////////////
//                                LOCAL MAXIMA                                //
////////////////////////////////////////////////////////////////////////////////

/// Marks the local maxima of a scalar field under 26-connectivity. Plateaus
/// are allowed: a connected set of equal-valued voxels is a maximum iff no
/// voxel of it has a strictly greater neighbour. Maxima touching the volume
/// border are allowed (out-of-bounds neighbours are simply not compared).
pub fn local_maxima_3d(field: nd::ArrayView3<f32>) -> nd::Array3<bool> {
  let dim = field.dim();
  //(1) candidate pass: no strictly greater neighbour
  let mut maxima = nd::Array3::<bool>::from_elem(dim, false);
  for (idx, &value) in field.indexed_iter() {
    let candidate =
      neighbours_26con(idx, dim).into_iter().all(|neighbour| field[neighbour] <= value);
    maxima[idx] = candidate;
  }

  /*(2) plateau demotion
    A candidate that shares its value with a non-candidate neighbour sits on a
    plateau that touches a strictly greater voxel somewhere, so the whole
    plateau has to be unmarked. The demotion spreads through equal-valued
    candidates with a plain queue.
  */
  let mut queue: VecDeque<(usize, usize, usize)> = VecDeque::new();
  for (idx, &value) in field.indexed_iter() {
    if !maxima[idx] {
      continue;
    }
    let touches_demoted = neighbours_26con(idx, dim)
      .into_iter()
      .any(|neighbour| field[neighbour] == value && !maxima[neighbour]);
    if touches_demoted {
      queue.push_back(idx);
    }
  }
  while let Some(idx) = queue.pop_front() {
    if !maxima[idx] {
      continue;
    }
    maxima[idx] = false;
    let value = field[idx];
    for neighbour in neighbours_26con(idx, dim) {
      if maxima[neighbour] && field[neighbour] == value {
        queue.push_back(neighbour);
      }
    }
  }
  maxima
}

/// 2D counterpart of [`local_maxima_3d`] (8-connectivity within a slice).
pub fn local_maxima_2d(field: nd::ArrayView2<f32>) -> nd::Array2<bool> {
  local_maxima_3d(field.insert_axis(nd::Axis(0))).remove_axis(nd::Axis(0))
}

////////////////////////////////////////////////////////////////////////////////
//                         SEEDED WATERSHED FLOODING                          //
////////////////////////////////////////////////////////////////////////////////

/// One entry on the flooding front: a labelled voxel offering to colour an
/// unlabelled neighbour at the given growth height. Lower heights flood first;
/// equal heights flood in insertion order, which keeps the transform
/// deterministic.
struct FloodFront {
  height: f32,
  order: u64,
  target: (usize, usize, usize),
  label: u32,
}

impl PartialEq for FloodFront {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other).is_eq()
  }
}

impl Eq for FloodFront {}

impl PartialOrd for FloodFront {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for FloodFront {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    //BinaryHeap is a max-heap: reverse both criteria so that the lowest
    //height (then the earliest insertion) pops first
    other.height.total_cmp(&self.height).then_with(|| other.order.cmp(&self.order))
  }
}

/// Floods a scalar growth map from a seed map: every unseeded voxel is
/// assigned the label of the seed that reaches it first along ascending
/// growth values (6-connectivity). Seeded voxels keep their label. Label 0
/// survives only where no seed can reach a voxel, i.e. when the seed map is
/// empty. Returns the flooded label volume and its maximum label.
pub fn seeded_watershed_3d(
  growth: nd::ArrayView3<f32>,
  seeds: nd::ArrayView3<u32>,
) -> (nd::Array3<u32>, u32) {
  assert_eq!(growth.dim(), seeds.dim(), "growth map and seed map must have the same shape");
  let dim = growth.dim();
  let mut labels = seeds.to_owned();
  let mut front: BinaryHeap<FloodFront> = BinaryHeap::new();
  let mut order = 0u64;
  let mut max_label = BACKGROUND_LABEL;

  //(1) the initial front: all unlabelled neighbours of seeded voxels
  for (idx, &label) in seeds.indexed_iter() {
    if label == BACKGROUND_LABEL {
      continue;
    }
    max_label = max_label.max(label);
    for neighbour in neighbours_6con(idx, dim) {
      if labels[neighbour] == BACKGROUND_LABEL {
        front.push(FloodFront { height: growth[neighbour], order, target: neighbour, label });
        order += 1;
      }
    }
  }

  //(2) flood in order of ascending growth height. A voxel may sit on the
  // front several times; only the first (lowest) offer colours it.
  while let Some(offer) = front.pop() {
    if labels[offer.target] != BACKGROUND_LABEL {
      continue;
    }
    labels[offer.target] = offer.label;
    for neighbour in neighbours_6con(offer.target, dim) {
      if labels[neighbour] == BACKGROUND_LABEL {
        front.push(FloodFront {
          height: growth[neighbour],
          order,
          target: neighbour,
          label: offer.label,
        });
        order += 1;
      }
    }
  }
  (labels, max_label)
}

/// 2D counterpart of [`seeded_watershed_3d`] (4-connectivity within a slice).
pub fn seeded_watershed_2d(
  growth: nd::ArrayView2<f32>,
  seeds: nd::ArrayView2<u32>,
) -> (nd::Array2<u32>, u32) {
  let (labels, max_label) =
    seeded_watershed_3d(growth.insert_axis(nd::Axis(0)), seeds.insert_axis(nd::Axis(0)));
  (labels.remove_axis(nd::Axis(0)), max_label)
}

////////////////////////////////////////////////////////////////////////////////
//                           CONSECUTIVE RELABELLING                          //
////////////////////////////////////////////////////////////////////////////////

/// Remaps the nonzero labels of a volume onto the consecutive range `1..=n`,
/// in order of first appearance in memory order. Label 0 is preserved.
/// Applying the relabelling twice gives the same result as applying it once.
/// Returns the relabelled volume, the new maximum label and the old→new
/// mapping (including `0 → 0`).
pub fn relabel_consecutive(
  labels: nd::ArrayView3<u32>,
) -> (nd::Array3<u32>, u32, HashMap<u32, u32>) {
  let mut mapping: HashMap<u32, u32> = HashMap::new();
  mapping.insert(BACKGROUND_LABEL, BACKGROUND_LABEL);
  let mut next = 0u32;
  let relabelled = labels.mapv(|label| {
    *mapping.entry(label).or_insert_with(|| {
      next += 1;
      next
    })
  });
  (relabelled, next, mapping)
}

////////////////////////////////////////////////////////////////////////////////
//                                   TESTS                                    //
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
  use super::*;
  use nd::array;

  fn mask_2d(pattern: &[&[u8]]) -> nd::Array2<bool> {
    let rows = pattern.len();
    let cols = pattern[0].len();
    nd::Array2::from_shape_fn((rows, cols), |(y, x)| pattern[y][x] != 0)
  }

  #[test]
  fn label_components_two_blobs() {
    let mask = mask_2d(&[
      &[1, 1, 0, 0, 0],
      &[1, 0, 0, 1, 1],
      &[0, 0, 0, 1, 0],
      &[0, 0, 0, 0, 0],
    ]);
    let (labels, max_label) = label_components_2d(mask.view());
    assert_eq!(max_label, 2);
    assert_eq!(labels[[0, 0]], 1);
    assert_eq!(labels[[0, 1]], 1);
    assert_eq!(labels[[1, 0]], 1);
    assert_eq!(labels[[1, 3]], 2);
    assert_eq!(labels[[1, 4]], 2);
    assert_eq!(labels[[2, 3]], 2);
    assert_eq!(labels[[0, 2]], 0);
  }

  #[test]
  fn label_components_diagonal_is_disconnected() {
    //4-connectivity: diagonal contact does not join components
    let mask = mask_2d(&[&[1, 0], &[0, 1]]);
    let (labels, max_label) = label_components_2d(mask.view());
    assert_eq!(max_label, 2);
    assert_ne!(labels[[0, 0]], labels[[1, 1]]);
  }

  #[test]
  fn label_components_u_shape_merges() {
    //The two arms of the U get provisional labels that must be unified
    let mask = mask_2d(&[&[1, 0, 1], &[1, 0, 1], &[1, 1, 1]]);
    let (labels, max_label) = label_components_2d(mask.view());
    assert_eq!(max_label, 1);
    assert_eq!(labels[[0, 0]], 1);
    assert_eq!(labels[[0, 2]], 1);
  }

  #[test]
  fn label_components_connect_across_z() {
    let mut mask = nd::Array3::<bool>::from_elem((2, 2, 2), false);
    mask[[0, 0, 0]] = true;
    mask[[1, 0, 0]] = true;
    mask[[1, 1, 1]] = true;
    let (labels, max_label) = label_components_3d(mask.view());
    assert_eq!(max_label, 2);
    assert_eq!(labels[[0, 0, 0]], labels[[1, 0, 0]]);
    assert_ne!(labels[[0, 0, 0]], labels[[1, 1, 1]]);
  }

  #[test]
  fn label_components_empty_mask() {
    let mask = nd::Array3::<bool>::from_elem((3, 3, 3), false);
    let (labels, max_label) = label_components_3d(mask.view());
    assert_eq!(max_label, 0);
    assert!(labels.iter().all(|&l| l == 0));
  }

  #[test]
  fn distance_transform_row() {
    let mask = mask_2d(&[&[0, 1, 1, 1, 0]]);
    let dist = distance_transform_2d(mask.view());
    let expected = array![[0.0f32, 1.0, 2.0, 1.0, 0.0]];
    for (d, e) in dist.iter().zip(expected.iter()) {
      assert!((d - e).abs() < 1e-5, "got {d}, expected {e}");
    }
  }

  #[test]
  fn distance_transform_is_euclidean() {
    //Single background corner: distances must be true euclidean lengths
    let mut mask = nd::Array2::<bool>::from_elem((4, 4), true);
    mask[[0, 0]] = false;
    let dist = distance_transform_2d(mask.view());
    assert!((dist[[1, 1]] - 2.0f32.sqrt()).abs() < 1e-5);
    assert!((dist[[3, 3]] - 18.0f32.sqrt()).abs() < 1e-5);
    assert!((dist[[0, 3]] - 3.0).abs() < 1e-5);
  }

  #[test]
  fn distance_transform_all_foreground_is_infinite() {
    let mask = nd::Array3::<bool>::from_elem((2, 3, 3), true);
    let dist = distance_transform_3d(mask.view());
    assert!(dist.iter().all(|d| d.is_infinite()));
  }

  #[test]
  fn gaussian_smooth_preserves_constant_field() {
    let field = nd::Array2::<f32>::from_elem((8, 8), 3.5);
    let smoothed = gaussian_smooth_2d(field.view(), 1.2);
    for &v in smoothed.iter() {
      assert!((v - 3.5).abs() < 1e-4);
    }
  }

  #[test]
  fn gaussian_smooth_keeps_peak_centred() {
    let mut field = nd::Array2::<f32>::zeros((9, 9));
    field[[4, 4]] = 1.0;
    let smoothed = gaussian_smooth_2d(field.view(), 1.0);
    let peak = smoothed
      .indexed_iter()
      .fold(((0, 0), f32::NEG_INFINITY), |acc, (idx, &v)| if v > acc.1 { (idx, v) } else { acc });
    assert_eq!(peak.0, (4, 4));
    assert!((smoothed[[3, 4]] - smoothed[[5, 4]]).abs() < 1e-6);
  }

  #[test]
  fn local_maxima_single_peak() {
    let mut field = nd::Array2::<f32>::zeros((5, 5));
    field[[2, 2]] = 2.0;
    field[[2, 3]] = 1.0;
    let maxima = local_maxima_2d(field.view());
    assert!(maxima[[2, 2]]);
    assert!(!maxima[[2, 3]]);
  }

  #[test]
  fn local_maxima_plateau_below_peak_is_unmarked() {
    //A flat ridge of 1.0 touching a 2.0 voxel is not a maximum anywhere
    let mut field = nd::Array2::<f32>::zeros((3, 5));
    for x in 0..4 {
      field[[1, x]] = 1.0;
    }
    field[[1, 4]] = 2.0;
    let maxima = local_maxima_2d(field.view());
    for x in 0..4 {
      assert!(!maxima[[1, x]], "plateau voxel at x={x} must not be a maximum");
    }
    assert!(maxima[[1, 4]]);
  }

  #[test]
  fn local_maxima_plateau_at_top_is_fully_marked() {
    let mut field = nd::Array2::<f32>::zeros((3, 5));
    field[[1, 1]] = 1.0;
    field[[1, 2]] = 1.0;
    let maxima = local_maxima_2d(field.view());
    assert!(maxima[[1, 1]]);
    assert!(maxima[[1, 2]]);
    assert!(!maxima[[0, 0]]);
  }

  #[test]
  fn local_maxima_allowed_at_border() {
    let mut field = nd::Array2::<f32>::zeros((3, 3));
    field[[0, 0]] = 5.0;
    let maxima = local_maxima_2d(field.view());
    assert!(maxima[[0, 0]]);
  }

  #[test]
  fn watershed_splits_at_the_barrier() {
    //Two seeds separated by a high-growth column: the flood from either side
    //meets at the barrier and each half keeps its own label
    let growth = array![[0.0f32, 0.0, 0.9, 0.0, 0.0]];
    let seeds = array![[1u32, 0, 0, 0, 2]];
    let (labels, max_label) = seeded_watershed_2d(growth.view(), seeds.view());
    assert_eq!(max_label, 2);
    assert_eq!(labels[[0, 0]], 1);
    assert_eq!(labels[[0, 1]], 1);
    assert_eq!(labels[[0, 3]], 2);
    assert_eq!(labels[[0, 4]], 2);
    assert!(labels[[0, 2]] == 1 || labels[[0, 2]] == 2);
  }

  #[test]
  fn watershed_preserves_seeded_labels() {
    let growth = nd::Array3::<f32>::zeros((2, 3, 3));
    let mut seeds = nd::Array3::<u32>::zeros((2, 3, 3));
    seeds[[0, 0, 0]] = 7;
    seeds[[1, 2, 2]] = 3;
    let (labels, max_label) = seeded_watershed_3d(growth.view(), seeds.view());
    assert_eq!(max_label, 7);
    assert_eq!(labels[[0, 0, 0]], 7);
    assert_eq!(labels[[1, 2, 2]], 3);
    assert!(labels.iter().all(|&l| l != 0));
  }

  #[test]
  fn watershed_without_seeds_stays_background() {
    let growth = nd::Array3::<f32>::zeros((2, 2, 2));
    let seeds = nd::Array3::<u32>::zeros((2, 2, 2));
    let (labels, max_label) = seeded_watershed_3d(growth.view(), seeds.view());
    assert_eq!(max_label, 0);
    assert!(labels.iter().all(|&l| l == 0));
  }

  #[test]
  fn relabel_closes_gaps() {
    let mut labels = nd::Array3::<u32>::zeros((1, 2, 3));
    labels[[0, 0, 0]] = 5;
    labels[[0, 0, 1]] = 9;
    labels[[0, 1, 0]] = 5;
    let (relabelled, max_label, mapping) = relabel_consecutive(labels.view());
    assert_eq!(max_label, 2);
    assert_eq!(relabelled[[0, 0, 0]], 1);
    assert_eq!(relabelled[[0, 0, 1]], 2);
    assert_eq!(relabelled[[0, 1, 0]], 1);
    assert_eq!(mapping[&0], 0);
    assert_eq!(mapping[&5], 1);
    assert_eq!(mapping[&9], 2);
  }

  #[test]
  fn relabel_is_idempotent() {
    let mut labels = nd::Array3::<u32>::zeros((2, 2, 2));
    labels[[0, 0, 0]] = 42;
    labels[[1, 1, 1]] = 17;
    labels[[0, 1, 1]] = 42;
    let (once, max_once, _) = relabel_consecutive(labels.view());
    let (twice, max_twice, _) = relabel_consecutive(once.view());
    assert_eq!(once, twice);
    assert_eq!(max_once, max_twice);
  }
}
