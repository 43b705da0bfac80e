//! Session files, export files and the headless CLI against a scratch dir.

use clap::Parser;
use dewatermark::cli::{CliArgs, process_all};
use dewatermark::io::{self, SaveFormat};
use dewatermark::project::Project;
use image::{Rgba, RgbaImage};

fn sample() -> RgbaImage {
    RgbaImage::from_fn(64, 48, |x, y| Rgba([(x * 4) as u8, (y * 5) as u8, 120, 255]))
}

#[test]
fn session_round_trip_restores_canvases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("work.dwm");

    let mut project = Project::from_image(sample(), None, 1280, 20);
    project.press((10.0, 10.0), 8.0);
    project.move_to((40.0, 30.0));
    project.release();
    io::write_session(&project.to_session(8.0), &path).unwrap();

    let session = io::read_session(&path).unwrap();
    assert_eq!(session.brush_size, 8.0);
    let restored = Project::from_session(session, path, 20).unwrap();
    assert_eq!(restored.source(), project.source());
    assert_eq!(restored.canvas_state.mask(), project.canvas_state.mask());
    assert_eq!(restored.canvas_state.visible(), project.canvas_state.visible());
    assert_eq!(restored.history.stroke_count(), 1);
}

#[test]
fn truncated_session_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.dwm");
    std::fs::write(&path, b"DWM").unwrap();
    assert!(io::read_session(&path).is_err());
}

#[test]
fn exported_file_decodes_to_visible_canvas() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("removed-watermark.png");
    let project = Project::from_image(sample(), None, 1280, 20);
    io::encode_and_write(project.export_image(), &path, SaveFormat::Png, 90).unwrap();
    assert_eq!(&io::load_image_sync(&path).unwrap(), project.export_image());
}

#[test]
fn cli_cleans_batch_into_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    sample().save(&a).unwrap();
    sample().save(&b).unwrap();

    // Mask at half resolution; the CLI stretches it to each input.
    let mut mask = RgbaImage::from_pixel(32, 24, Rgba([0, 0, 0, 255]));
    for y in 10..14 {
        for x in 8..20 {
            mask.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }
    }
    let mask_path = dir.path().join("mask.png");
    mask.save(&mask_path).unwrap();

    let out_dir = dir.path().join("out");
    let pattern = dir.path().join("[ab].png");
    let args = CliArgs::try_parse_from([
        "dewatermark",
        "-i",
        pattern.to_str().unwrap(),
        "-m",
        mask_path.to_str().unwrap(),
        "--output-dir",
        out_dir.to_str().unwrap(),
    ])
    .unwrap();

    let report = process_all(&args).unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);

    let cleaned = io::load_image_sync(&out_dir.join("a.png")).unwrap();
    assert_eq!(cleaned.dimensions(), (64, 48));
    assert_eq!(cleaned.get_pixel(0, 0), sample().get_pixel(0, 0));
}

#[test]
fn cli_rejects_single_output_for_several_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    sample().save(&a).unwrap();
    sample().save(&b).unwrap();
    let out_file = dir.path().join("x.png");
    let out_dir = dir.path().join("d");

    let args = CliArgs::try_parse_from([
        "dewatermark",
        "-i",
        a.to_str().unwrap(),
        b.to_str().unwrap(),
        "-m",
        a.to_str().unwrap(),
        "-o",
        out_file.to_str().unwrap(),
        "--output-dir",
        out_dir.to_str().unwrap(),
    ])
    .unwrap();

    assert!(process_all(&args).is_err());
    assert!(!out_file.exists());
    assert!(!out_dir.exists());
}

#[test]
fn cli_rejects_unknown_method() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    sample().save(&input).unwrap();
    let args = CliArgs::try_parse_from([
        "dewatermark",
        "-i",
        input.to_str().unwrap(),
        "-m",
        input.to_str().unwrap(),
        "--method",
        "blur",
    ])
    .unwrap();
    assert!(process_all(&args).is_err());
}
