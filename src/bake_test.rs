use super::*;
use crate::test_support::{bounds_near, count_near, fixture_fonts, gradient_image, pristine, solid_image};
use proptest::prelude::*;

fn fonts() -> FontCache {
    FontCache::offline()
}

fn red_rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Annotation {
    Annotation::Rect { x1, y1, x2, y2, color: "#ff0000".into(), line_width: 2.0 }
}

#[test]
fn crop_at_double_scale_maps_annotations() {
    let src = pristine(gradient_image(400, 300), "src.png");
    let mut edits = PanelEdits::default();
    edits.crop = Some(CropRect::new(50.0, 50.0, 200.0, 150.0));
    edits.annotations.push(red_rect(100.0, 100.0, 150.0, 120.0));

    let out = bake(&src, &edits, 2.0, &fonts()).unwrap();
    assert_eq!((out.width(), out.height()), (400, 300));

    let crop = edits.crop.unwrap();
    assert_eq!(map_to_output(Point::new(100.0, 100.0), &crop, 400, 300), Point::new(100.0, 100.0));
    // left edge of the mapped rect
    assert_eq!(out.image().get_pixel(100, 110).0, [255, 0, 0, 255]);
}

#[test]
fn oversized_crop_is_clamped_not_rejected() {
    let src = pristine(gradient_image(400, 300), "src.png");
    let mut edits = PanelEdits::default();
    edits.crop = Some(CropRect::new(-10.0, 0.0, 1000.0, 1000.0));

    let clamped = bake(&src, &edits, 1.0, &fonts()).unwrap();
    let full = bake(&src, &PanelEdits::default(), 1.0, &fonts()).unwrap();
    assert_eq!((clamped.width(), clamped.height()), (400, 300));
    assert!(clamped.same_pixels(&full));
}

#[test]
fn ceiling_scales_down_proportionally() {
    let src = pristine(gradient_image(400, 300), "src.png");
    let out = bake_with_ceiling(&src, &PanelEdits::default(), 1.0, &fonts(), 100).unwrap();
    assert_eq!((out.width(), out.height()), (100, 75));
    assert_eq!(target_size(&CropRect::full(400, 300), 20.0, DEFAULT_MAX_DIMENSION), (4000, 3000));
}

#[test]
fn invalid_scale_falls_back_to_one() {
    assert_eq!(target_size(&CropRect::full(10, 5), f64::NAN, 4000), (10, 5));
    assert_eq!(target_size(&CropRect::full(10, 5), -2.0, 4000), (10, 5));
}

#[test]
fn undecodable_source_names_the_file() {
    let src = PristineSource::new(b"definitely not pixels".to_vec(), "scan.tif", "image/tiff");
    let err = bake(&src, &PanelEdits::default(), 1.0, &fonts()).unwrap_err();
    assert_eq!(err.filename, "scan.tif");
}

#[test]
fn annotations_are_not_filtered() {
    let src = pristine(solid_image(40, 40, [0, 0, 255, 255]), "blue.png");
    let mut edits = PanelEdits::default();
    edits.greyscale = 100.0;
    edits.annotations.push(red_rect(10.0, 10.0, 30.0, 30.0));

    let out = bake(&src, &edits, 1.0, &fonts()).unwrap();
    let background = out.image().get_pixel(20, 20).0;
    assert_eq!(background[0], background[2]);
    assert_eq!(out.image().get_pixel(10, 20).0, [255, 0, 0, 255]);
}

#[test]
fn annotations_follow_rotation() {
    let src = pristine(solid_image(40, 40, [0, 0, 0, 255]), "black.png");
    let mut edits = PanelEdits::default();
    edits.rotation = 180.0;
    edits.annotations.push(Annotation::Rect {
        x1: 2.0,
        y1: 2.0,
        x2: 10.0,
        y2: 10.0,
        color: "#ff0000".into(),
        line_width: 2.0,
    });

    let out = bake(&src, &edits, 1.0, &fonts()).unwrap();
    let moved = out.image().get_pixel(37, 34).0;
    assert!(moved[0] > 200 && moved[1] < 50, "annotation did not rotate: {:?}", moved);
    let vacated = out.image().get_pixel(2, 5).0;
    assert!(vacated[0] < 50, "annotation stayed put: {:?}", vacated);
}

#[test]
fn text_without_fonts_is_skipped() {
    let src = pristine(gradient_image(30, 20), "g.png");
    let mut edits = PanelEdits::default();
    edits.annotations.push(Annotation::Text {
        x: 5.0,
        y: 15.0,
        text: "n=12".into(),
        color: "#000".into(),
        size: 12.0,
        font_family: "Arial".into(),
        font_weight: "normal".into(),
        font_style: "normal".into(),
    });
    let with_text = bake(&src, &edits, 1.0, &fonts()).unwrap();
    let plain = bake(&src, &PanelEdits::default(), 1.0, &fonts()).unwrap();
    assert!(with_text.same_pixels(&plain));
}

fn caption(x: f64, y: f64) -> Annotation {
    Annotation::Text {
        x,
        y,
        text: "n=12".into(),
        color: "#000".into(),
        size: 20.0,
        font_family: "Arial".into(),
        font_weight: "normal".into(),
        font_style: "normal".into(),
    }
}

const INK: [u8; 3] = [0, 0, 0];

#[test]
fn text_sits_on_its_mapped_baseline() {
    let src = pristine(solid_image(100, 60, [255, 255, 255, 255]), "white.png");
    let mut edits = PanelEdits::default();
    edits.annotations.push(caption(20.0, 40.0));
    let fonts = fixture_fonts();

    let once = bake(&src, &edits, 1.0, &fonts).unwrap();
    let (x0, y0, x1, y1) = bounds_near(once.image(), INK, 160).expect("text drawn");
    assert!(x0 >= 18 && x1 <= 72, "x span {x0}..{x1}");
    assert!(y0 >= 20 && y1 <= 42, "y span {y0}..{y1}");
    // alphabetic baseline: glyphs end on y = 40
    assert!(y1 >= 36);

    let twice = bake(&src, &edits, 2.0, &fonts).unwrap();
    let (x0, y0, x1, y1) = bounds_near(twice.image(), INK, 160).expect("text drawn");
    assert!(x0 >= 36 && x1 <= 145, "x span {x0}..{x1}");
    assert!(y0 >= 40 && y1 <= 84, "y span {y0}..{y1}");
    assert!(y1 >= 74);
}

#[test]
fn text_size_scales_with_bake_factor() {
    let src = pristine(solid_image(100, 60, [255, 255, 255, 255]), "white.png");
    let mut edits = PanelEdits::default();
    edits.annotations.push(caption(20.0, 40.0));
    let fonts = fixture_fonts();

    let small = count_near(bake(&src, &edits, 1.0, &fonts).unwrap().image(), INK, 160);
    let large = count_near(bake(&src, &edits, 2.0, &fonts).unwrap().image(), INK, 160);
    assert!(small > 0);
    // area grows with the square of the factor
    assert!(large > small * 3, "ink at 1x: {small}, at 2x: {large}");
}

#[test]
fn text_follows_rotation() {
    let src = pristine(solid_image(100, 60, [255, 255, 255, 255]), "white.png");
    let mut edits = PanelEdits::default();
    edits.rotation = 180.0;
    edits.annotations.push(caption(20.0, 40.0));

    let out = bake(&src, &edits, 1.0, &fixture_fonts()).unwrap();
    let (x0, y0, x1, y1) = bounds_near(out.image(), INK, 160).expect("text drawn");
    // upright text spans roughly x 20..68, y 25..40; turned half way it lands at x 32..80, y 20..35
    assert!(x0 >= 28 && x1 <= 84, "x span {x0}..{x1}");
    assert!(y0 >= 16 && y1 <= 38, "y span {y0}..{y1}");
}

#[test]
fn queue_keeps_only_latest_generation() {
    let src = pristine(gradient_image(40, 30), "g.png");
    let id = Uuid::new_v4();
    let mut queue = BakeQueue::new(Arc::new(fonts()), DEFAULT_MAX_DIMENSION);

    let first = queue.request(id, src.clone(), PanelEdits::default(), 1.0);
    let second = queue.request(id, src, PanelEdits::default(), 0.5);
    assert!(second > first);
    assert!(queue.is_pending(id));

    let out = queue.wait_for(id).unwrap().unwrap();
    assert_eq!((out.width(), out.height()), (20, 15));
    assert!(!queue.is_pending(id));
    // the superseded result never surfaces
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(queue.drain().is_empty());
}

#[test]
fn cancelled_bake_is_discarded() {
    let src = pristine(gradient_image(8, 8), "g.png");
    let id = Uuid::new_v4();
    let mut queue = BakeQueue::new(Arc::new(fonts()), DEFAULT_MAX_DIMENSION);
    queue.request(id, src, PanelEdits::default(), 1.0);
    queue.cancel(id);
    assert!(!queue.is_pending(id));
    assert!(queue.wait_for(id).is_none());
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(queue.drain().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn baking_is_deterministic(
        brightness in 0.0f64..200.0,
        contrast in 0.0f64..200.0,
        greyscale in 0.0f64..100.0,
        rotation in -360.0f64..360.0,
        cx in -5.0f64..20.0,
        cw in 1.0f64..40.0,
        scale in 0.25f64..2.0,
    ) {
        let src = pristine(gradient_image(24, 18), "g.png");
        let edits = PanelEdits {
            crop: Some(CropRect::new(cx, 2.0, cw, 12.0)),
            brightness,
            contrast,
            greyscale,
            rotation,
            annotations: vec![red_rect(4.0, 4.0, 12.0, 10.0)],
            ..PanelEdits::default()
        };
        let a = bake(&src, &edits, scale, &fonts()).unwrap();
        let b = bake(&src, &edits, scale, &fonts()).unwrap();
        prop_assert!(a.same_pixels(&b));
    }
}
