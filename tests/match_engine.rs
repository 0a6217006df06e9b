use cdsearch::image::tiff::{self, Compression};
use cdsearch::{
    ColorDepthMask, ColorDepthMatcher, DecodeRange, DecodedImage, MaskBuilder, MaskOptions,
    SearchParams,
};

const WIDTH: usize = 8;
const HEIGHT: usize = 104;
const BLUE_GREEN: [u8; 3] = [0, 100, 200];

fn image_with(points: &[(usize, usize)], rgb: [u8; 3]) -> Vec<u8> {
    let mut pixels = vec![0u8; WIDTH * HEIGHT * 3];
    for &(x, y) in points {
        let i = (y * WIDTH + x) * 3;
        pixels[i..i + 3].copy_from_slice(&rgb);
    }
    pixels
}

fn decoded(pixels: Vec<u8>) -> DecodedImage {
    DecodedImage::from_rgb(pixels, WIDTH, HEIGHT).unwrap()
}

fn row(y: usize, xs: std::ops::Range<usize>) -> Vec<(usize, usize)> {
    xs.map(|x| (x, y)).collect()
}

fn mask(points: &[(usize, usize)], options: MaskOptions) -> ColorDepthMask {
    let image = decoded(image_with(points, BLUE_GREEN));
    MaskBuilder::new(options).build(&image, None).unwrap()
}

#[test]
fn identical_target_matches_every_pixel() {
    let points = row(101, 2..6);
    let mask = mask(&points, MaskOptions::default());
    let target = decoded(image_with(&points, BLUE_GREEN));

    let score = ColorDepthMatcher::new(&SearchParams::default())
        .score(&mask, &target)
        .unwrap();
    assert_eq!(score.matching_pixels, 4);
    assert_eq!(score.matching_ratio, 1.0);
    assert!(!score.mirrored);
}

#[test]
fn dark_target_is_filtered_out() {
    let points = row(101, 2..6);
    let mask = mask(&points, MaskOptions::default());
    let target = decoded(image_with(&points, [0, 50, 100]));

    let matcher = ColorDepthMatcher::new(&SearchParams::default());
    assert!(matcher.score(&mask, &target).is_none());
    let score = matcher.evaluate(&mask, &target);
    assert_eq!(score.matching_pixels, 0);
    assert_eq!(score.matching_ratio, 0.0);
}

#[test]
fn minimum_ratio_is_exclusive() {
    let mask = mask(&row(101, 0..4), MaskOptions::default());
    let params = SearchParams {
        min_matching_pix_ratio: 50.0,
        ..SearchParams::default()
    };
    let matcher = ColorDepthMatcher::new(&params);

    let half = decoded(image_with(&row(101, 0..2), BLUE_GREEN));
    assert!(matcher.score(&mask, &half).is_none());
    assert_eq!(matcher.evaluate(&mask, &half).matching_pixels, 2);

    let most = decoded(image_with(&row(101, 0..3), BLUE_GREEN));
    let score = matcher.score(&mask, &most).unwrap();
    assert_eq!(score.matching_pixels, 3);
    assert_eq!(score.matching_ratio, 0.75);
}

#[test]
fn shifted_target_needs_xy_shift() {
    let points = row(101, 0..4);
    let moved = row(101, 2..6);
    let target = decoded(image_with(&moved, BLUE_GREEN));
    let params = SearchParams::default();
    let matcher = ColorDepthMatcher::new(&params);

    let rigid = mask(&points, params.mask_options(100, 0));
    // Only the overlap of x = 2 and x = 3 lines up.
    assert_eq!(matcher.evaluate(&rigid, &target).matching_pixels, 2);

    let params = SearchParams {
        xy_shift: 2,
        ..params
    };
    let shifted = mask(&points, params.mask_options(100, 0));
    let score = matcher.score(&shifted, &target).unwrap();
    assert_eq!(score.matching_pixels, 4);
    assert!(!score.mirrored);
}

#[test]
fn mirrored_target_needs_mirror_mask() {
    let points = row(102, 0..3);
    let flipped = row(102, 5..8);
    let target = decoded(image_with(&flipped, BLUE_GREEN));
    let matcher = ColorDepthMatcher::new(&SearchParams::default());

    let plain = mask(&points, MaskOptions::default());
    assert!(matcher.score(&plain, &target).is_none());

    let mirrored = mask(
        &points,
        MaskOptions {
            mirror_mask: true,
            ..MaskOptions::default()
        },
    );
    let score = matcher.score(&mirrored, &target).unwrap();
    assert_eq!(score.matching_pixels, 3);
    assert_eq!(score.matching_ratio, 1.0);
    assert!(score.mirrored);
}

#[test]
fn mirrored_pass_loses_ties() {
    // A symmetric mask scores the same in both passes.
    let points = row(101, 2..6);
    let target = decoded(image_with(&points, BLUE_GREEN));
    let mirrored = mask(
        &points,
        MaskOptions {
            mirror_mask: true,
            ..MaskOptions::default()
        },
    );
    let score = ColorDepthMatcher::new(&SearchParams::default())
        .score(&mirrored, &target)
        .unwrap();
    assert!(!score.mirrored);
}

#[test]
fn negative_mask_subtracts_scaled_matches() {
    let positive = decoded(image_with(&row(101, 0..4), BLUE_GREEN));
    let negative = decoded(image_with(&row(102, 0..2), BLUE_GREEN));
    let options = MaskOptions {
        negative_threshold: 100,
        ..MaskOptions::default()
    };
    let mask = MaskBuilder::new(options)
        .build(&positive, Some(&negative))
        .unwrap();

    // Every mask pixel and one of the two negative pixels are present.
    let mut points = row(101, 0..4);
    points.push((0, 102));
    let target = decoded(image_with(&points, BLUE_GREEN));

    let score = ColorDepthMatcher::new(&SearchParams::default())
        .score(&mask, &target)
        .unwrap();
    // 4 - 1 * (4 / 2)
    assert_eq!(score.matching_pixels, 2);
    // 4 / 4 - 1 / 2
    assert_eq!(score.matching_ratio, 0.5);

    // Covering the whole negative region cancels the match.
    let mut points = row(101, 0..4);
    points.extend(row(102, 0..2));
    let target = decoded(image_with(&points, BLUE_GREEN));
    let matcher = ColorDepthMatcher::new(&SearchParams::default());
    assert!(matcher.score(&mask, &target).is_none());
    assert_eq!(matcher.evaluate(&mask, &target).matching_pixels, 0);
}

#[test]
fn pixels_past_the_decoded_rows_never_match() {
    let points = vec![(1, 101), (1, 103)];
    let full_mask = mask(&points, MaskOptions::default());
    let bytes = tiff::encode_rgb(
        &image_with(&points, BLUE_GREEN),
        WIDTH,
        HEIGHT,
        Compression::PackBits,
    )
    .unwrap();
    let matcher = ColorDepthMatcher::new(&SearchParams::default());

    let enough = tiff::decode(&bytes, full_mask.decode_range()).unwrap();
    assert_eq!(matcher.evaluate(&full_mask, &enough).matching_pixels, 2);

    let short = tiff::decode(&bytes, DecodeRange::ThroughPixel(101 * WIDTH + 1)).unwrap();
    assert!(short.is_partial());
    assert_eq!(matcher.evaluate(&full_mask, &short).matching_pixels, 1);
}

#[test]
fn explicit_three_pixel_mask_matches_fully() {
    // 4x3 image, pixels 5, 6 and 7 lit.
    let mut pixels = vec![0u8; 4 * 3 * 3];
    for p in 5..8 {
        pixels[p * 3..p * 3 + 3].copy_from_slice(&BLUE_GREEN);
    }
    let image = DecodedImage::from_rgb(pixels, 4, 3).unwrap();
    let mask = MaskBuilder::default()
        .from_positions(&image, vec![5, 6, 7], None)
        .unwrap();
    assert_eq!(mask.size(), 3);
    assert!(mask.layer().shifted().is_empty());

    let score = ColorDepthMatcher::new(&SearchParams::default())
        .score(&mask, &image)
        .unwrap();
    assert_eq!(score.matching_pixels, 3);
    assert_eq!(score.matching_ratio, 1.0);
}

#[test]
fn ratio_stays_in_the_unit_interval() {
    let points = row(100, 0..8);
    let mask = mask(&points, MaskOptions::default());
    let matcher = ColorDepthMatcher::new(&SearchParams::default());
    for lit in 1..=8 {
        let target = decoded(image_with(&row(100, 0..lit), BLUE_GREEN));
        let score = matcher.score(&mask, &target).unwrap();
        assert!(score.matching_ratio > 0.0 && score.matching_ratio <= 1.0);
        assert_eq!(score.matching_pixels, lit as i64);
    }
}
