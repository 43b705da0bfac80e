//! End-to-end: load, paint, remove, export, driven without a window.

use dewatermark::engine::{EngineConfig, EngineLoader};
use dewatermark::io::{self, SaveFormat};
use dewatermark::ops::remove::{InpaintParams, RemoveError};
use dewatermark::project::Project;
use image::{Rgba, RgbaImage};

/// Smooth horizontal gradient with a bright "watermark" bar baked in.
fn watermarked(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let in_mark = (90..110).contains(&y) && (200..400).contains(&x);
        if in_mark {
            Rgba([255, 255, 255, 255])
        } else {
            let v = (x * 200 / width) as u8;
            Rgba([v, 80, 255 - v, 255])
        }
    })
}

#[test]
fn wide_image_scenario() {
    let engine = EngineLoader::spawn(EngineConfig::default()).wait().unwrap();
    let mut project = Project::from_image(watermarked(2000, 1000), None, 1280, 20);
    assert_eq!(project.working_size(), (1280, 640));
    assert!(project.canvas_state.mask_is_clear());

    project.press((100.0, 100.0), 20.0);
    project.move_to((200.0, 100.0));
    project.release();

    let mask = project.canvas_state.mask();
    for y in 91..=108 {
        assert_eq!(mask.get_pixel(150, y).0, [255, 255, 255, 255], "row {y}");
    }
    assert_eq!(mask.get_pixel(10, 10).0, [0, 0, 0, 255]);

    let before = project.source().clone();
    let shown_before = project.canvas_state.visible().clone();
    let job = project.begin_inpaint(true, InpaintParams::default()).unwrap();
    let result = job.run(&engine);
    project.finish_inpaint(result).unwrap();

    assert!(project.canvas_state.mask_is_clear());
    assert_ne!(
        project.canvas_state.visible().get_pixel(150, 100),
        shown_before.get_pixel(150, 100)
    );
    assert_eq!(
        project.canvas_state.visible().get_pixel(10, 10),
        shown_before.get_pixel(10, 10)
    );
    assert_eq!(project.source().get_pixel(10, 10), before.get_pixel(10, 10));
    assert_eq!(engine.live_buffers(), 0);
    assert_eq!(project.canvas_state.visible(), project.source());
}

#[test]
fn painted_watermark_is_replaced_by_surroundings() {
    let engine = EngineLoader::spawn(EngineConfig::default()).wait().unwrap();
    let mut project = Project::from_image(watermarked(600, 300), None, 1280, 20);

    // Two passes of the brush over the bar.
    for y in [95.0, 105.0] {
        project.press((195.0, y), 20.0);
        project.move_to((405.0, y));
        project.release();
    }
    let job = project.begin_inpaint(true, InpaintParams::default()).unwrap();
    project.finish_inpaint(job.run(&engine)).unwrap();

    let p = project.source().get_pixel(300, 100).0;
    assert!(p[1].abs_diff(80) < 25, "green channel {p:?}");
    assert!(p[0] < 200 || p[2] < 200, "still white: {p:?}");

    // Untouched region is bit-exact.
    for x in 0..50 {
        assert_eq!(project.source().get_pixel(x, 250), watermarked(600, 300).get_pixel(x, 250));
    }
}

#[test]
fn moves_without_press_change_nothing() {
    let mut project = Project::from_image(watermarked(300, 200), None, 1280, 20);
    let visible = project.canvas_state.visible().clone();
    project.move_to((10.0, 10.0));
    project.move_to((120.0, 80.0));
    project.release();
    assert_eq!(project.canvas_state.visible(), &visible);
    assert!(project.canvas_state.mask_is_clear());
    assert!(!project.history.can_undo());
}

#[test]
fn concurrent_removal_is_rejected() {
    let mut project = Project::from_image(watermarked(100, 100), None, 1280, 20);
    project.press((50.0, 50.0), 10.0);
    project.release();
    assert!(project.begin_inpaint(true, InpaintParams::default()).is_ok());
    assert_eq!(
        project.begin_inpaint(true, InpaintParams::default()).err(),
        Some(RemoveError::Busy)
    );
    // Strokes are ignored while busy.
    let mask = project.canvas_state.mask().clone();
    project.press((10.0, 10.0), 10.0);
    assert_eq!(project.canvas_state.mask(), &mask);
}

#[test]
fn export_after_load_matches_scaled_image() {
    let original = watermarked(1600, 400);
    let project = Project::from_image(original.clone(), None, 1280, 20);
    let exported = io::encode_to_vec(project.export_image(), SaveFormat::Png, 90).unwrap();
    let scaled = io::fit_to_width(original, 1280);
    let expected = io::encode_to_vec(&scaled, SaveFormat::Png, 90).unwrap();
    assert_eq!(exported, expected);
}

#[test]
fn patchmatch_variant_runs_end_to_end() {
    let engine = EngineLoader::spawn(EngineConfig::default()).wait().unwrap();
    let mut project = Project::from_image(watermarked(400, 200), None, 1280, 20);
    project.press((250.0, 100.0), 16.0);
    project.move_to((300.0, 100.0));
    project.release();
    let params = InpaintParams {
        method: dewatermark::ops::inpaint::InpaintMethod::PatchMatch,
        ..Default::default()
    };
    let job = project.begin_inpaint(true, params).unwrap();
    project.finish_inpaint(job.run(&engine)).unwrap();
    assert!(project.canvas_state.mask_is_clear());
    assert_eq!(engine.live_buffers(), 0);
}
