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

//! Supervoxel-watershed is a pure-rust oversegmentation engine for
//! connectomics image analysis: it turns the dense, voxel-level affinity
//! predictions of a boundary-detection network into an initial partition of
//! "supervoxels" via seeded watershed, ready for downstream agglomeration.
//!
//! # Features
//! The engine combines two seeding strategies into one label space:
//! 1. *Coarse* seeds from thresholded connected components of the long-range
//! channel average, which mark large, reliable object cores.
//! 2. *Fine* seeds from the local maxima of the Euclidean distance transform
//! of the near-range channel average, which break up whatever the coarse
//! seeds left uncovered.
//!
//! The merged seed map floods the near-range growth map either per z-slice
//! (for strongly anisotropic volumes, where the z-resolution is much coarser
//! than x/y) or as one volumetric pass. Undersized regions can be erased and
//! reabsorbed afterwards, and an optional inclusion mask keeps excluded
//! voxels out of seeding, flooding and the final result.
//!
//! # Quickstart
//! `supervoxel-watershed` uses the commonly used "builder pattern" to
//! configure a segmenter before executing it. Create a [`SegmenterBuilder`],
//! chain the options you need, then call `build()` to obtain a
//! (`Sync`&`Send`) trait object implementing [`Oversegment`].
//! ```rust
//! use supervoxel_watershed::prelude::*;
//! use ndarray as nd;
//!
//! //A (channel, z, y, x) affinity volume; low values mark object interiors
//! let affinities = nd::Array4::<f32>::from_elem((3, 4, 16, 16), 1.0);
//!
//! let segmenter = SegmenterBuilder::new_affinity(0.9, 0.4, 1.6)
//!   .set_anisotropic(false)
//!   .set_size_filter(0)
//!   .build()
//!   .unwrap();
//!
//! let result = segmenter.segment(affinities.view().into_dyn(), None).unwrap();
//! assert_eq!(result.labels.dim(), (4, 16, 16));
//! ```
//! Integer-typed network outputs can be brought into the `[0, 1]` range the
//! engine expects with [`normalize_affinities`].
//!
//! # Cargo feature gates
//! *By default, all features behind cargo feature gates are **disabled***
//! - `jemalloc`: this feature enables the [jemalloc allocator](https://jemalloc.net),
//! which can considerably improve run-time performance on machines with many
//! cores. To compile with this feature, jemalloc must be installed on the host
//! system.
//! - `progress`: this feature enables a per-slice progress bar for the 2D
//! watershed runner. Enabling this feature adds the `indicatif` crate as a
//! dependency.
//! - `debug`: this feature enables per-stage performance monitoring output.
//! This can negatively impact performance. Enabling this feature does not add
//! additional dependencies.

//Unconditional imports
use ndarray as nd;
use num_traits::{Num, ToPrimitive};

//Set Jemalloc as the global allocator for this crate
#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

pub mod pipeline;
pub mod primitives;

//Label reserved for unassigned, background and excluded voxels
pub const BACKGROUND_LABEL: u32 = 0;
//Growth-map value that flooding can never prefer (affinities live in [0, 1])
const IMPASSABLE: f32 = 1.0;

//Utility prelude for batch import
pub mod prelude {
  pub use crate::{
    normalize_affinities, Oversegment, Segmentation, SegmentationError, SegmenterBuilder,
  };
}

////////////////////////////////////////////////////////////////////////////////
//                             OPTIONAL MODULES                               //
////////////////////////////////////////////////////////////////////////////////

#[cfg(feature = "debug")]
mod performance_monitoring {

  #[derive(Clone, Debug, Default)]
  pub struct PipelineReport {
    pub cc_seeding_ms: usize,
    pub dt_seeding_ms: usize,
    pub watershed_ms: usize,
    pub size_filter_ms: usize,
    pub mask_cleanup_ms: usize,
    pub total_ms: usize,
  }

  impl PipelineReport {
    fn stages_total(&self) -> usize {
      self.cc_seeding_ms
        + self.dt_seeding_ms
        + self.watershed_ms
        + self.size_filter_ms
        + self.mask_cleanup_ms
    }
  }

  impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      writeln!(f, ">---------[Pipeline Summary]---------")?;
      writeln!(f, ">  CC seeding:   {}ms", self.cc_seeding_ms)?;
      writeln!(f, ">  DT seeding:   {}ms", self.dt_seeding_ms)?;
      writeln!(f, ">  Watershed:    {}ms", self.watershed_ms)?;
      writeln!(f, ">  Size filter:  {}ms", self.size_filter_ms)?;
      writeln!(f, ">  Mask cleanup: {}ms", self.mask_cleanup_ms)?;
      writeln!(f, ">-----------------------------+ total")?;
      writeln!(
        f,
        ">  {}ms with {}ms overhead (Δt)",
        self.total_ms,
        self.total_ms.saturating_sub(self.stages_total())
      )
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//                              ERRORS & RESULTS                              //
////////////////////////////////////////////////////////////////////////////////

/// Everything that can go wrong while configuring or running a segmenter.
/// Numeric oddities of the primitive layer (infinite distances on degenerate
/// foregrounds and the like) are *not* errors: they propagate through the
/// pipeline as values.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SegmentationError {
  #[error("expected a volume with {expected} dimensions, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
  #[error("affinity volume has {actual} channel(s), but at least {required} are required")]
  NotEnoughChannels { required: usize, actual: usize },
  #[error("seed channel index {index} out of range for a volume with {channels} channels")]
  SeedChannelOutOfRange { index: usize, channels: usize },
  #[error("seed channel selection may not be empty")]
  EmptySeedChannels,
  #[error("mask shape {mask:?} does not match the volume shape {volume:?}")]
  MaskShapeMismatch { mask: [usize; 3], volume: [usize; 3] },
  #[error("smoothing sigma must be finite and non-negative, got {0}")]
  InvalidSigma(f32),
  #[error("threshold must be finite, got {0}")]
  InvalidThreshold(f32),
  #[error("could not build the worker pool: {0}")]
  WorkerPool(String),
  #[error("the {0} strategy is not implemented")]
  NotImplemented(&'static str),
}

/// The outcome of one oversegmentation run: a dense label volume (label 0 is
/// background/excluded), its maximum label, and the merged seed map the flood
/// started from if the segmenter was configured with `set_return_seeds`.
#[derive(Debug, Clone)]
pub struct Segmentation {
  pub labels: nd::Array3<u32>,
  pub max_label: u32,
  pub seeds: Option<nd::Array3<u32>>,
}

////////////////////////////////////////////////////////////////////////////////
//                              HELPER FUNCTIONS                              //
////////////////////////////////////////////////////////////////////////////////

/// Converts an array of any numeric data-type `T` into the `[0, 1]` range of
/// `f32` affinities that the segmenter expects. Special float values are
/// taken care of: `NaN` and positive infinity become the impassable value
/// `1.0`, negative infinity becomes `0.0`, and everything else is min/max
/// scaled over the finite value range.
pub fn normalize_affinities<T, D>(volume: nd::ArrayView<T, D>) -> nd::Array<f32, D>
where
  T: Num + Copy + ToPrimitive + PartialOrd,
  D: nd::Dimension,
{
  //(1) find the finite value range
  let mut min = f64::INFINITY;
  let mut max = f64::NEG_INFINITY;
  for value in volume.iter() {
    let float = value.to_f64().unwrap_or(f64::NAN);
    if float.is_finite() {
      min = min.min(float);
      max = max.max(float);
    }
  }
  let range = max - min;

  //(2) map to [0, 1], taking care of NaN and infinity
  volume.mapv(|value| {
    let float = value.to_f64().unwrap_or(f64::NAN);
    if float.is_nan() || float == f64::INFINITY {
      IMPASSABLE
    } else if float == f64::NEG_INFINITY {
      0.0
    } else if range > 0.0 {
      ((float - min) / range) as f32
    } else {
      0.0
    }
  })
}

////////////////////////////////////////////////////////////////////////////////
//                            SEGMENTER INTERFACE                             //
////////////////////////////////////////////////////////////////////////////////

/// Capability interface of all oversegmentation strategies. This trait is
/// dyn-safe, which means that trait objects may be constructed from it.
///
/// `segment` is stateless given its inputs and the segmenter's fixed
/// configuration; nothing is carried over between calls. The expected
/// dimensionality of `volume` depends on the strategy (4D `(channel, z, y, x)`
/// for the affinity and mutex strategies, 3D for the distance-transform
/// strategy) and is checked at call entry. The optional `mask` marks the
/// voxels to include; everything outside it is kept out of seeding and ends
/// up as label 0 in the result.
pub trait Oversegment {
  fn segment(
    &self,
    volume: nd::ArrayViewD<f32>,
    mask: Option<nd::ArrayView3<bool>>,
  ) -> Result<Segmentation, SegmentationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrategyKind {
  Affinity,
  DistanceTransform,
  Mutex,
}

/// Builder for configuring an oversegmentation strategy.
///
/// Use the `new_affinity()` associated function to start configuring a
/// long-range affinity watershed, `new_distance_transform()` for a watershed
/// seeded directly on a boundary map's distance transform, or `new_mutex()`
/// for the mutex-constrained watershed. Once the desired options are set, a
/// segmenter is generated with the `build()` associated function. This returns
/// a trait object of the type `Box<dyn Oversegment + Send + Sync>`, which can
/// be shared between threads.
#[derive(Debug, Clone)]
pub struct SegmenterBuilder {
  kind: StrategyKind,
  threshold_cc: f32,
  threshold_dt: f32,
  sigma_seeds: f32,
  size_filter: usize,
  anisotropic: bool,
  seed_channels: Option<Vec<usize>>,
  return_seeds: bool,
  num_threads: Option<usize>,
}

impl SegmenterBuilder {
  /// Creates a new `SegmenterBuilder` configured for the long-range affinity
  /// watershed. `threshold_cc` bounds the foreground of the coarse
  /// connected-component seeding, `threshold_dt` the foreground of the fine
  /// distance-transform seeding, and `sigma_seeds` smooths the distance field
  /// before its maxima are taken (`0` disables smoothing).
  pub fn new_affinity(threshold_cc: f32, threshold_dt: f32, sigma_seeds: f32) -> Self {
    SegmenterBuilder {
      kind: StrategyKind::Affinity,
      threshold_cc,
      threshold_dt,
      sigma_seeds,
      size_filter: 25,
      anisotropic: true,
      seed_channels: None,
      return_seeds: false,
      num_threads: None,
    }
  }

  /// Creates a new `SegmenterBuilder` configured for the (currently
  /// unimplemented) distance-transform-only watershed over a 3D boundary map.
  pub fn new_distance_transform(threshold_dt: f32, sigma_seeds: f32) -> Self {
    SegmenterBuilder {
      kind: StrategyKind::DistanceTransform,
      threshold_cc: 0.0,
      threshold_dt,
      sigma_seeds,
      size_filter: 25,
      anisotropic: true,
      seed_channels: None,
      return_seeds: false,
      num_threads: None,
    }
  }

  /// Creates a new `SegmenterBuilder` configured for the (currently
  /// unimplemented) mutex-constrained watershed.
  pub fn new_mutex() -> Self {
    SegmenterBuilder {
      kind: StrategyKind::Mutex,
      threshold_cc: 0.0,
      threshold_dt: 0.0,
      sigma_seeds: 0.0,
      size_filter: 0,
      anisotropic: true,
      seed_channels: None,
      return_seeds: false,
      num_threads: None,
    }
  }

  /// Set the minimum region size in voxels; smaller regions are erased after
  /// flooding and reabsorbed by their neighbours. A value of 0 disables the
  /// size-filter pass entirely.
  pub fn set_size_filter(mut self, min_size: usize) -> Self {
    self.size_filter = min_size;
    self
  }

  /// Select per-slice (2D) or volumetric (3D) execution. Anisotropic volumes,
  /// whose z-resolution is much coarser than x/y, should be seeded and
  /// flooded per slice so that no region grows across the unreliable
  /// z-direction.
  pub fn set_anisotropic(mut self, anisotropic: bool) -> Self {
    self.anisotropic = anisotropic;
    self
  }

  /// Restrict which input channels feed the coarse connected-component
  /// seeding. By default all channels are averaged.
  pub fn set_seed_channels(mut self, channels: Vec<usize>) -> Self {
    self.seed_channels = Some(channels);
    self
  }

  /// Also return the merged seed map from every `segment` call. Useful for
  /// diagnosing over- and under-seeding.
  pub fn set_return_seeds(mut self, return_seeds: bool) -> Self {
    self.return_seeds = return_seeds;
    self
  }

  /// Hint at how many worker threads the data-parallel stages may use.
  /// Without this, the global rayon pool is used.
  pub fn set_num_threads(mut self, num_threads: usize) -> Self {
    self.num_threads = Some(num_threads);
    self
  }

  /// Build a `Box<dyn Oversegment + Send + Sync>` from the current builder
  /// configuration. This function returns an `Err` result if the builder was
  /// not properly configured: non-finite thresholds, a negative or non-finite
  /// sigma, or an empty seed-channel selection.
  pub fn build(self) -> Result<Box<dyn Oversegment + Send + Sync>, SegmentationError> {
    if !self.sigma_seeds.is_finite() || self.sigma_seeds < 0.0 {
      return Err(SegmentationError::InvalidSigma(self.sigma_seeds));
    }
    match self.kind {
      StrategyKind::Affinity => {
        if !self.threshold_cc.is_finite() {
          return Err(SegmentationError::InvalidThreshold(self.threshold_cc));
        }
        if !self.threshold_dt.is_finite() {
          return Err(SegmentationError::InvalidThreshold(self.threshold_dt));
        }
        if self.seed_channels.as_ref().is_some_and(|channels| channels.is_empty()) {
          return Err(SegmentationError::EmptySeedChannels);
        }
        Ok(Box::new(LongRangeAffinityWatershed {
          threshold_cc: self.threshold_cc,
          threshold_dt: self.threshold_dt,
          sigma_seeds: self.sigma_seeds,
          size_filter: self.size_filter,
          anisotropic: self.anisotropic,
          seed_channels: self.seed_channels,
          return_seeds: self.return_seeds,
          num_threads: self.num_threads,
        }))
      }
      StrategyKind::DistanceTransform => {
        if !self.threshold_dt.is_finite() {
          return Err(SegmentationError::InvalidThreshold(self.threshold_dt));
        }
        Ok(Box::new(DistanceTransformWatershed {
          threshold_dt: self.threshold_dt,
          sigma_seeds: self.sigma_seeds,
          size_filter: self.size_filter,
          anisotropic: self.anisotropic,
          num_threads: self.num_threads,
        }))
      }
      StrategyKind::Mutex => Ok(Box::new(MutexWatershed)),
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//                      LONG-RANGE AFFINITY WATERSHED                         //
////////////////////////////////////////////////////////////////////////////////

/// The implemented oversegmentation strategy: coarse connected-component
/// seeds from the long-range channel average, fine distance-transform seeds
/// from the near-range channel average, one merged flood over the near-range
/// growth map, then size filtering and mask cleanup.
///
/// Expects 4D `(channel, z, y, x)` input. On anisotropic data the near-range
/// average skips the z-affinity channel 0 (so at least two channels are
/// required) and all per-slice stages run in 2D; otherwise channels up to 3
/// feed the growth map and flooding is volumetric.
pub struct LongRangeAffinityWatershed {
  threshold_cc: f32,
  threshold_dt: f32,
  sigma_seeds: f32,
  size_filter: usize,
  anisotropic: bool,
  seed_channels: Option<Vec<usize>>,
  return_seeds: bool,
  num_threads: Option<usize>,
}

impl LongRangeAffinityWatershed {
  /// Reduces the multi-channel affinity volume to the two scalar fields the
  /// pipeline works on: the full-range average feeding the coarse seeding,
  /// and the near-range average feeding the fine seeding and the growth map.
  fn reduce_channels(
    &self,
    affinities: nd::ArrayView4<f32>,
  ) -> Result<(nd::Array3<f32>, nd::Array3<f32>), SegmentationError> {
    let channels = affinities.len_of(nd::Axis(0));
    let required = if self.anisotropic { 2 } else { 1 };
    if channels < required {
      return Err(SegmentationError::NotEnoughChannels { required, actual: channels });
    }

    let full = match &self.seed_channels {
      None => affinities.sum_axis(nd::Axis(0)) / channels as f32,
      Some(selection) => {
        let (_, nz, ny, nx) = affinities.dim();
        let mut sum = nd::Array3::<f32>::zeros((nz, ny, nx));
        for &channel in selection {
          if channel >= channels {
            return Err(SegmentationError::SeedChannelOutOfRange { index: channel, channels });
          }
          sum += &affinities.index_axis(nd::Axis(0), channel);
        }
        sum / selection.len() as f32
      }
    };

    //The near-range average skips the z-affinity channel on anisotropic data
    let lo = if self.anisotropic { 1 } else { 0 };
    let hi = channels.min(3);
    let nearest =
      affinities.slice(nd::s![lo..hi, .., .., ..]).sum_axis(nd::Axis(0)) / (hi - lo) as f32;
    Ok((full, nearest))
  }

  fn run_pipeline(
    &self,
    affinities: nd::ArrayView4<f32>,
    mask: Option<nd::ArrayView3<bool>>,
  ) -> Result<Segmentation, SegmentationError> {
    #[cfg(feature = "debug")]
    let mut report = performance_monitoring::PipelineReport::default();
    #[cfg(feature = "debug")]
    let total_start = std::time::Instant::now();

    let (full, nearest) = self.reduce_channels(affinities)?;
    if let Some(included) = &mask {
      if included.dim() != full.dim() {
        let (mz, my, mx) = included.dim();
        let (vz, vy, vx) = full.dim();
        return Err(SegmentationError::MaskShapeMismatch {
          mask: [mz, my, mx],
          volume: [vz, vy, vx],
        });
      }
    }
    //The excluded area is the inverted inclusion mask
    let exclusion: Option<nd::Array3<bool>> = mask.map(|m| m.mapv(|included| !included));

    //(1) coarse seeds from thresholded connected components; excluded voxels
    // can neither become nor connect seeds
    #[cfg(feature = "debug")]
    let stage_start = std::time::Instant::now();
    let (mut seeds, seed_offset) = pipeline::seeds_from_connected_components(
      full.view(),
      self.threshold_cc,
      exclusion.as_ref().map(|e| e.view()),
    );
    #[cfg(feature = "debug")]
    {
      report.cc_seeding_ms = stage_start.elapsed().as_millis() as usize;
    }

    //(2) the growth map is the near-range average, made impassable in the
    // excluded area (a working copy; the caller's input stays untouched)
    let mut growth = nearest;
    if let Some(excluded) = &exclusion {
      nd::Zip::from(&mut growth).and(excluded).for_each(|g, &out| {
        if out {
          *g = IMPASSABLE;
        }
      });
    }

    //(3) fine seeds from the distance transform of the growth map
    #[cfg(feature = "debug")]
    let stage_start = std::time::Instant::now();
    let (seeds_dt, _) = if self.anisotropic {
      pipeline::seeds_from_distance_transform_2d(growth.view(), self.threshold_dt, self.sigma_seeds)
    } else {
      pipeline::seeds_from_distance_transform(growth.view(), self.threshold_dt, self.sigma_seeds)
    };
    #[cfg(feature = "debug")]
    {
      report.dt_seeding_ms = stage_start.elapsed().as_millis() as usize;
    }

    //(4) merge the seed maps: coarse seeds win, fine seeds fill the gaps
    pipeline::merge_seed_maps(&mut seeds, seeds_dt.view(), seed_offset);

    //(5) flood, per slice or volumetric
    #[cfg(feature = "debug")]
    let stage_start = std::time::Instant::now();
    let (mut labels, mut max_label) = if self.anisotropic {
      pipeline::run_watershed_2d(growth.view(), seeds.view())
    } else {
      pipeline::run_watershed(growth.view(), seeds.view())
    };
    #[cfg(feature = "debug")]
    {
      report.watershed_ms = stage_start.elapsed().as_millis() as usize;
    }

    //(6) erase undersized regions and let the neighbours reabsorb them;
    // a threshold of 0 disables the pass
    if self.size_filter > 0 {
      #[cfg(feature = "debug")]
      let stage_start = std::time::Instant::now();
      let (filtered, filtered_max) =
        pipeline::filter_small_regions(growth.view(), labels.view(), self.size_filter);
      labels = filtered;
      max_label = filtered_max;
      #[cfg(feature = "debug")]
      {
        report.size_filter_ms = stage_start.elapsed().as_millis() as usize;
      }
    }

    //(7) mask cleanup: zero the excluded area and close the label gaps
    if let Some(excluded) = &exclusion {
      #[cfg(feature = "debug")]
      let stage_start = std::time::Instant::now();
      nd::Zip::from(&mut labels).and(excluded).for_each(|label, &out| {
        if out {
          *label = BACKGROUND_LABEL;
        }
      });
      let (relabelled, relabelled_max, _) = primitives::relabel_consecutive(labels.view());
      labels = relabelled;
      max_label = relabelled_max;
      #[cfg(feature = "debug")]
      {
        report.mask_cleanup_ms = stage_start.elapsed().as_millis() as usize;
      }
    }

    log::debug!("oversegmentation finished with {max_label} labels");
    #[cfg(feature = "debug")]
    {
      report.total_ms = total_start.elapsed().as_millis() as usize;
      println!("{report}");
    }

    Ok(Segmentation {
      labels,
      max_label,
      seeds: if self.return_seeds { Some(seeds) } else { None },
    })
  }
}

impl Oversegment for LongRangeAffinityWatershed {
  fn segment(
    &self,
    volume: nd::ArrayViewD<f32>,
    mask: Option<nd::ArrayView3<bool>>,
  ) -> Result<Segmentation, SegmentationError> {
    let actual = volume.ndim();
    let affinities = volume
      .into_dimensionality::<nd::Ix4>()
      .map_err(|_| SegmentationError::DimensionMismatch { expected: 4, actual })?;

    match self.num_threads {
      Some(threads) => {
        let pool = rayon::ThreadPoolBuilder::new()
          .num_threads(threads)
          .build()
          .map_err(|err| SegmentationError::WorkerPool(err.to_string()))?;
        pool.install(|| self.run_pipeline(affinities, mask))
      }
      None => self.run_pipeline(affinities, mask),
    }
  }
}

////////////////////////////////////////////////////////////////////////////////
//                          UNIMPLEMENTED STRATEGIES                          //
////////////////////////////////////////////////////////////////////////////////

/// Watershed seeded directly on the distance transform of a 3D boundary map.
/// The contract is declared (3D scalar input, optional mask) but the pipeline
/// itself is not implemented yet; `segment` fails with
/// [`SegmentationError::NotImplemented`] after validating the input.
//TODO: implement the distance-transform-only seeding and flooding pipeline
pub struct DistanceTransformWatershed {
  threshold_dt: f32,
  sigma_seeds: f32,
  size_filter: usize,
  anisotropic: bool,
  num_threads: Option<usize>,
}

impl Oversegment for DistanceTransformWatershed {
  fn segment(
    &self,
    volume: nd::ArrayViewD<f32>,
    _mask: Option<nd::ArrayView3<bool>>,
  ) -> Result<Segmentation, SegmentationError> {
    if volume.ndim() != 3 {
      return Err(SegmentationError::DimensionMismatch { expected: 3, actual: volume.ndim() });
    }
    log::debug!(
      "distance-transform watershed requested (threshold {}, sigma {}, min size {}, anisotropic {}, threads {:?})",
      self.threshold_dt,
      self.sigma_seeds,
      self.size_filter,
      self.anisotropic,
      self.num_threads
    );
    Err(SegmentationError::NotImplemented("distance-transform watershed"))
  }
}

/// Mutex-constrained watershed over a 4D affinity volume. Declared contract
/// only; `segment` fails with [`SegmentationError::NotImplemented`] after
/// validating the input.
//TODO: implement the mutex watershed
pub struct MutexWatershed;

impl Oversegment for MutexWatershed {
  fn segment(
    &self,
    volume: nd::ArrayViewD<f32>,
    _mask: Option<nd::ArrayView3<bool>>,
  ) -> Result<Segmentation, SegmentationError> {
    if volume.ndim() != 4 {
      return Err(SegmentationError::DimensionMismatch { expected: 4, actual: volume.ndim() });
    }
    Err(SegmentationError::NotImplemented("mutex watershed"))
  }
}

////////////////////////////////////////////////////////////////////////////////
//                                   TESTS                                    //
////////////////////////////////////////////////////////////////////////////////
