use super::*;
use crate::test_support::figure_with;
use proptest::prelude::*;

#[test]
fn fit_centres_wide_image() {
    let vt = ViewTransform::fit(400.0, 100.0, 200.0, 200.0);
    assert_eq!(vt.scale, 0.5);
    assert_eq!(vt.offset_x, 0.0);
    assert_eq!(vt.offset_y, 75.0);
}

#[test]
fn fit_degenerate_image_is_identity() {
    assert_eq!(ViewTransform::fit(0.0, 10.0, 100.0, 100.0), ViewTransform::default());
}

#[test]
fn zero_scale_maps_to_origin() {
    let vt = ViewTransform::new(0.0, 5.0, 5.0);
    assert_eq!(vt.to_original(Point::new(10.0, 10.0)), Point::default());
    assert_eq!(vt.length_to_original(4.0), 0.0);
}

#[test]
fn pointer_mapping_handles_css_scaling() {
    // 800x600 canvas shown at 400x300 with its corner at (10, 20)
    let element = Rect::new(10.0, 20.0, 400.0, 300.0);
    let p = pointer_to_model(Point::new(110.0, 170.0), element, 800.0, 600.0);
    assert_eq!(p, Point::new(200.0, 300.0));
}

#[test]
fn hit_test_prefers_highest_order() {
    let mut fig = figure_with(2, 10, 10);
    fig.panels[0].geometry.frame = Rect::new(0.0, 0.0, 100.0, 100.0);
    fig.panels[1].geometry.frame = Rect::new(50.0, 50.0, 100.0, 100.0);
    let top = fig.panels[1].id;
    let bottom = fig.panels[0].id;

    assert_eq!(hit_test(&fig.panels, Point::new(60.0, 60.0)), Some(top));
    assert_eq!(hit_test(&fig.panels, Point::new(10.0, 10.0)), Some(bottom));
    assert_eq!(hit_test(&fig.panels, Point::new(500.0, 10.0)), None);
}

#[test]
fn rect_union_and_contains() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(20.0, 5.0, 5.0, 20.0);
    assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 25.0, 25.0));
    assert!(a.contains(Point::new(0.0, 0.0)));
    assert!(!a.contains(Point::new(10.0, 5.0)));
}

#[test]
fn snapping() {
    assert_eq!(snap(14.0, 10.0), 10.0);
    assert_eq!(snap(15.0, 10.0), 20.0);
    assert_eq!(snap(7.3, 0.0), 7.3);
    assert_eq!(snap_point(Point::new(4.0, 6.0), 5.0), Point::new(5.0, 5.0));
}

proptest! {
    #[test]
    fn view_round_trip_recovers_original(
        x in -5000.0f64..5000.0,
        y in -5000.0f64..5000.0,
        scale in 0.01f64..50.0,
        ox in -1000.0f64..1000.0,
        oy in -1000.0f64..1000.0,
    ) {
        let vt = ViewTransform::new(scale, ox, oy);
        let back = vt.to_original(vt.to_view(Point::new(x, y)));
        prop_assert!((back.x - x).abs() < 1e-6);
        prop_assert!((back.y - y).abs() < 1e-6);
    }
}
