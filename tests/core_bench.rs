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

use ndarray as nd;
use ndarray_rand::{rand_distr::Uniform, RandomExt};
use supervoxel_watershed::prelude::*;

#[test]
fn core_bench() {
  //Create a random anisotropic affinity volume
  let affinities = nd::Array4::<f32>::random((3, 32, 256, 256), Uniform::new(0.0f32, 1.0));

  println!("Testing 1 to {} threads performance", rayon::current_num_threads());

  //Time with num cores; the thread hint installs a dedicated pool per run
  let results: Vec<f64> = (1..=rayon::current_num_threads())
    .map(|num_threads| {
      println!("Running the pipeline with {num_threads} thread(s)");
      let segmenter = SegmenterBuilder::new_affinity(0.3, 0.5, 1.0)
        .set_num_threads(num_threads)
        .build()
        .unwrap();
      //Time the full oversegmentation
      let start = std::time::Instant::now();
      let result = segmenter.segment(affinities.view().into_dyn(), None).unwrap();
      let elapsed = start.elapsed().as_secs_f64();
      assert!(result.max_label >= 1);
      elapsed
    })
    .collect();

  //Print per run results
  for (threads, time) in results.iter().enumerate().map(|(i, t)| (i + 1, t)) {
    println!("{threads:02} threads = {time:000.02}s");
  }

  //Print total results
  let average = (1.0 / (results.len() as f64)) * results.iter().sum::<f64>();
  println!("Average time: {average:.02}");
}
