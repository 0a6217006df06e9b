use cdsearch::metrics::{
    class_gap, pixel_gap, HueSector, MatchThresholds, PixelClass, NO_MATCH_GAP,
};

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-5
}

#[test]
fn identical_pixels_have_zero_gap() {
    assert_eq!(pixel_gap([0, 100, 200], [0, 100, 200]), 0.0);
    assert_eq!(pixel_gap([200, 50, 10], [200, 50, 10]), 0.0);
}

#[test]
fn same_sector_gap_is_ratio_difference() {
    // BlueGreen with ratios 0.5 and 0.75.
    let gap = pixel_gap([0, 100, 200], [0, 150, 200]);
    assert!(approx(gap, 0.25), "gap {gap}");
}

#[test]
fn zero_runner_up_never_compares() {
    assert_eq!(pixel_gap([0, 0, 200], [0, 0, 200]), NO_MATCH_GAP);
    assert_eq!(pixel_gap([0, 0, 200], [0, 100, 200]), NO_MATCH_GAP);
}

#[test]
fn unclassified_pixels_never_compare() {
    assert_eq!(pixel_gap([10, 10, 10], [0, 100, 200]), NO_MATCH_GAP);
    assert_eq!(pixel_gap([0, 100, 200], [120, 120, 40]), NO_MATCH_GAP);
}

#[test]
fn neighbouring_sectors_measure_distance_to_the_boundary() {
    let mask = PixelClass::of([60, 0, 200]);
    let target = PixelClass::of([0, 60, 200]);
    assert_eq!(mask.sector(), Some(HueSector::BlueRed));
    assert_eq!(target.sector(), Some(HueSector::BlueGreen));
    // Both ratios are 0.3, below the 0.3549 boundary.
    let gap = class_gap(mask, target);
    assert!(approx(gap, -0.109_725_49), "gap {gap}");

    // Near-equal blue and green on either side of the blue/green boundary.
    let gap = pixel_gap([0, 190, 200], [0, 200, 190]);
    assert!(approx(gap, 2.0 * (0.996_078_431 - 0.95)), "gap {gap}");
}

#[test]
fn neighbouring_sectors_outside_the_ratio_window_never_compare() {
    // GreenBlue ratio 0.75 is past the 0.7 cut-off towards GreenRed.
    assert_eq!(pixel_gap([0, 200, 150], [100, 200, 0]), NO_MATCH_GAP);
}

#[test]
fn distant_sectors_never_compare() {
    assert_eq!(pixel_gap([60, 0, 200], [200, 60, 0]), NO_MATCH_GAP);
    assert_eq!(pixel_gap([0, 100, 200], [200, 0, 100]), NO_MATCH_GAP);
}

#[test]
fn thresholds_require_bright_and_close_targets() {
    let thresholds = MatchThresholds {
        data_threshold: 100,
        z_tolerance: 0.02,
    };
    let mask = PixelClass::of([0, 100, 200]);
    assert!(thresholds.matches(mask, [0, 100, 200]));
    // Same hue but no channel above the data threshold.
    assert!(!thresholds.matches(mask, [0, 50, 100]));
    // Bright but the ratio moved by 0.05.
    assert!(!thresholds.matches(mask, [0, 110, 200]));

    let loose = MatchThresholds {
        z_tolerance: 0.1,
        ..thresholds
    };
    assert!(loose.matches(mask, [0, 110, 200]));
}
