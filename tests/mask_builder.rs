use cdsearch::mask::{
    mirror_positions, shift_offsets, threshold_positions, ColorDepthMask, MaskBuilder, MaskOptions, OUTSIDE_CANVAS,
};
use cdsearch::{CdsError, DecodeRange, DecodedImage};

const WIDTH: usize = 8;
const HEIGHT: usize = 104;
const BLUE_GREEN: [u8; 3] = [0, 100, 200];

fn canvas() -> Vec<u8> {
    vec![0u8; WIDTH * HEIGHT * 3]
}

fn paint(pixels: &mut [u8], x: usize, y: usize, rgb: [u8; 3]) {
    let i = (y * WIDTH + x) * 3;
    pixels[i..i + 3].copy_from_slice(&rgb);
}

fn image_with(points: &[(usize, usize)]) -> DecodedImage {
    let mut pixels = canvas();
    for &(x, y) in points {
        paint(&mut pixels, x, y, BLUE_GREEN);
    }
    DecodedImage::from_rgb(pixels, WIDTH, HEIGHT).unwrap()
}

fn index(x: usize, y: usize) -> u32 {
    (y * WIDTH + x) as u32
}

fn build(options: MaskOptions, image: &DecodedImage) -> ColorDepthMask {
    MaskBuilder::new(options).build(image, None).unwrap()
}

#[test]
fn threshold_skips_the_label_overlay() {
    // (2, 10) lies in the top-left label area and must be ignored.
    let image = image_with(&[(5, 102), (2, 10), (1, 101)]);
    assert_eq!(
        threshold_positions(&image, 100),
        vec![index(1, 101), index(5, 102)]
    );
}

#[test]
fn mask_without_bright_pixels_is_empty() {
    let image = image_with(&[(2, 10)]);
    let err = MaskBuilder::default().build(&image, None).unwrap_err();
    assert_eq!(err, CdsError::EmptyMask { threshold: 100 });
    assert!(err.is_recoverable());
}

#[test]
fn threshold_is_strict() {
    let mut pixels = canvas();
    paint(&mut pixels, 3, 101, [0, 50, 100]);
    let image = DecodedImage::from_rgb(pixels, WIDTH, HEIGHT).unwrap();
    assert!(threshold_positions(&image, 100).is_empty());
    assert_eq!(threshold_positions(&image, 99), vec![index(3, 101)]);
}

#[test]
fn shifts_produce_nine_variants_per_ring() {
    let image = image_with(&[(3, 101)]);
    let options = MaskOptions {
        xy_shift: 4,
        ..MaskOptions::default()
    };
    let mask = build(options, &image);
    assert_eq!(shift_offsets(4).len(), 18);
    assert_eq!(mask.layer().shifted().len(), 18);
    assert_eq!(mask.layer().direct_variants().count(), 19);
    assert!(mask.layer().mirrored_variants().is_none());

    // Ring 2, dx = 2, dy = 0 is entry 7 (dx outer, dy inner).
    assert_eq!(mask.layer().shifted()[7], vec![index(5, 101)]);
    // Ring 4, dx = 4, dy = 4 leaves the 104-row canvas.
    assert_eq!(mask.layer().shifted()[17], vec![OUTSIDE_CANVAS]);
}

#[test]
fn bounds_cover_every_variant() {
    let image = image_with(&[(3, 101)]);
    let options = MaskOptions {
        xy_shift: 2,
        ..MaskOptions::default()
    };
    let mask = build(options, &image);
    assert_eq!(mask.bounds(), (index(1, 99), index(5, 103)));
    assert_eq!(
        mask.decode_range(),
        DecodeRange::ThroughPixel(index(5, 103) as usize)
    );

    let plain = build(MaskOptions::default(), &image);
    assert_eq!(plain.bounds(), (index(3, 101), index(3, 101)));
}

#[test]
fn mirrored_variants_follow_the_shift_order() {
    let image = image_with(&[(1, 101), (2, 102)]);
    let options = MaskOptions {
        xy_shift: 2,
        mirror_mask: true,
        ..MaskOptions::default()
    };
    let mask = build(options, &image);
    let mirrored = mask.layer().mirrored().unwrap();
    assert_eq!(mirrored.len(), 10);
    assert_eq!(mirrored[0], vec![index(6, 101), index(5, 102)]);
    // Mirror of the dx = -2, dy = -2 shift: (1,101) leaves the canvas.
    assert_eq!(mirrored[1], vec![OUTSIDE_CANVAS, index(7, 100)]);
    assert_eq!(mask.bounds().1, index(6, 103));
}

#[test]
fn empty_negative_mask_is_dropped() {
    let image = image_with(&[(3, 101)]);
    let negative = image_with(&[]);
    let options = MaskOptions {
        negative_threshold: 100,
        ..MaskOptions::default()
    };
    let mask = MaskBuilder::new(options)
        .build(&image, Some(&negative))
        .unwrap();
    assert!(mask.negative().is_none());
}

#[test]
fn negative_mask_extends_the_bounds() {
    let image = image_with(&[(3, 101)]);
    let negative = image_with(&[(6, 103)]);
    let options = MaskOptions {
        negative_threshold: 100,
        ..MaskOptions::default()
    };
    let mask = MaskBuilder::new(options)
        .build(&image, Some(&negative))
        .unwrap();
    assert_eq!(mask.negative().unwrap().positions(), &[index(6, 103)]);
    assert_eq!(mask.bounds(), (index(3, 101), index(6, 103)));
}

#[test]
fn negative_mask_must_match_the_mask_size() {
    let image = image_with(&[(3, 101)]);
    let mut pixels = vec![0u8; WIDTH * (HEIGHT + 1) * 3];
    let i = (102 * WIDTH + 2) * 3;
    pixels[i..i + 3].copy_from_slice(&BLUE_GREEN);
    let negative = DecodedImage::from_rgb(pixels, WIDTH, HEIGHT + 1).unwrap();
    let err = MaskBuilder::default()
        .build(&image, Some(&negative))
        .unwrap_err();
    assert!(matches!(err, CdsError::InvalidInput(_)));
}

#[test]
fn explicit_positions_must_ascend() {
    let image = image_with(&[]);
    let builder = MaskBuilder::default();
    assert!(builder
        .from_positions(&image, vec![index(2, 101), index(1, 101)], None)
        .is_err());
    assert!(builder
        .from_positions(&image, vec![(WIDTH * HEIGHT) as u32], None)
        .is_err());

    let mask = builder
        .from_positions(&image, vec![index(1, 101), index(2, 101)], None)
        .unwrap();
    assert_eq!(mask.size(), 2);
}

#[test]
fn mirroring_twice_restores_the_positions() {
    let image = image_with(&[(0, 100), (3, 101), (7, 101), (4, 103)]);
    let positions = threshold_positions(&image, 100);
    let once = mirror_positions(&positions, WIDTH);
    assert_ne!(once, positions);
    assert_eq!(mirror_positions(&once, WIDTH), positions);
}
