#![cfg(feature = "rayon")]

use std::sync::Arc;

use cdsearch::image::tiff::{self, Compression};
use cdsearch::pipeline::{
    AggregatorConfig, Buckets, CoordinatorConfig, JobOutcome, MaskSpec, ResultAggregator,
    SearchCoordinator, SearchJob, WorkQueue, WorkerConfig, WorkerPool,
};
use cdsearch::store::{BlobStore, MemoryBlobStore, MemoryJobStore, MemoryTaskStore};
use cdsearch::{
    BatchWorker, ColorDepthMatcher, DecodedImage, MaskBuilder, MaskMatches, SearchParams,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WIDTH: usize = 24;
const HEIGHT: usize = 112;

/// Sparse noise: mostly dark, with bright pixels of a few related hues so
/// that masks and targets overlap often.
fn make_image(rng: &mut StdRng) -> Vec<u8> {
    let mut data = vec![0u8; WIDTH * HEIGHT * 3];
    for px in data.chunks_exact_mut(3) {
        if rng.random_range(0..4) == 0 {
            let b = rng.random_range(150..=255u8);
            let g = rng.random_range(0..=b / 2);
            px.copy_from_slice(&[0, g, b]);
        }
    }
    data
}

fn params(parallel: bool) -> SearchParams {
    SearchParams {
        xy_shift: 4,
        mirror_mask: true,
        mirror_negative_mask: true,
        pix_color_fluctuation: 10.0,
        min_matching_pix_ratio: 0.0,
        parallel,
        ..SearchParams::default()
    }
}

#[test]
fn parallel_kernel_matches_scalar() {
    let mut rng = StdRng::seed_from_u64(7);
    let mask_img = DecodedImage::from_rgb(make_image(&mut rng), WIDTH, HEIGHT).unwrap();
    let neg_img = DecodedImage::from_rgb(make_image(&mut rng), WIDTH, HEIGHT).unwrap();
    let options = params(false).mask_options(100, 200);
    let mask = MaskBuilder::new(options)
        .build(&mask_img, Some(&neg_img))
        .unwrap();

    let scalar = ColorDepthMatcher::new(&params(false));
    let parallel = ColorDepthMatcher::new(&params(true));
    for _ in 0..8 {
        let target = DecodedImage::from_rgb(make_image(&mut rng), WIDTH, HEIGHT).unwrap();
        assert_eq!(
            scalar.evaluate(&mask, &target),
            parallel.evaluate(&mask, &target)
        );
    }
}

fn run_search(parallel: bool) -> Vec<MaskMatches> {
    let mut rng = StdRng::seed_from_u64(11);
    let blobs = Arc::new(MemoryBlobStore::new());
    let buckets = Buckets::default();
    let encode = |pixels: Vec<u8>| {
        tiff::encode_rgb(&pixels, WIDTH, HEIGHT, Compression::PackBits).unwrap()
    };

    let mut masks = Vec::new();
    for i in 0..2 {
        let key = format!("search/m{i}.tif");
        blobs
            .put(&buckets.masks, &key, encode(make_image(&mut rng)), "image/tiff")
            .unwrap();
        masks.push(MaskSpec::new(key, 100));
    }
    let mut target_keys = Vec::new();
    for i in 0..12 {
        let key = format!("lib/SS{i}/t{i:02}-20x.tif");
        blobs
            .put(&buckets.library, &key, encode(make_image(&mut rng)), "image/tiff")
            .unwrap();
        target_keys.push(key);
    }

    let tasks = Arc::new(MemoryTaskStore::new());
    let jobs = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(WorkQueue::new());
    let coordinator = SearchCoordinator::new(
        jobs.clone(),
        queue.clone(),
        CoordinatorConfig {
            batch_size: 5,
            max_parallelism: 10,
        },
    );
    let dispatch = coordinator
        .submit(SearchJob {
            job_id: None,
            masks,
            target_keys,
            params: params(parallel),
            buckets,
        })
        .unwrap();
    queue.close();

    let worker = BatchWorker::new(blobs.clone(), tasks.clone(), WorkerConfig::default());
    let threads = if parallel { 3 } else { 1 };
    let pool = WorkerPool::new(worker, threads).run(&queue);
    assert!(pool.failed.is_empty());

    let aggregator = ResultAggregator::new(blobs, tasks, jobs, AggregatorConfig::default());
    aggregator
        .aggregate(&dispatch.job_id, &JobOutcome::completed())
        .unwrap()
        .results
}

#[test]
fn parallel_pipeline_matches_sequential() {
    let sequential = run_search(false);
    let parallel = run_search(true);
    assert_eq!(sequential.len(), 2);
    assert!(sequential.iter().any(|doc| !doc.results.is_empty()));
    assert_eq!(sequential, parallel);
}
