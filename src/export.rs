//! Renders a stored hand pose to a PNG for download.
//!
//! The picture is mirrored horizontally so it reads like the selfie view the
//! sign was recorded in.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Pixel, Rgba, RgbaImage};
use log::info;

use crate::models::{index, GestureTemplate, HandSet, LandmarkPoint, HAND_CONNECTIONS};

pub const EXPORT_WIDTH: u32 = 640;
pub const EXPORT_HEIGHT: u32 = 480;

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const BONE: Rgba<u8> = Rgba([255, 255, 255, 128]);
const BONE_WIDTH: f32 = 2.0;
const WRIST_RADIUS: f32 = 8.0;
const JOINT_RADIUS: f32 = 5.0;

const WRIST: Rgba<u8> = Rgba([255, 255, 0, 255]);
const THUMB: Rgba<u8> = Rgba([255, 0, 0, 255]);
const INDEX: Rgba<u8> = Rgba([0, 0, 255, 255]);
const MIDDLE: Rgba<u8> = Rgba([0, 255, 0, 255]);
const RING: Rgba<u8> = Rgba([128, 0, 128, 255]);
const PINKY: Rgba<u8> = Rgba([255, 165, 0, 255]);

/// `"good morning"` -> `"good_morning_sign.png"`.
pub fn export_file_name(name: &str) -> String {
    let stem = name.split_whitespace().collect::<Vec<_>>().join("_");
    format!("{stem}_sign.png")
}

pub fn render_hand_set(hands: &HandSet, width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);
    let project = |p: &LandmarkPoint| ((1.0 - p.x) * width as f32, p.y * height as f32);

    for hand in hands.iter() {
        for &(from, to) in HAND_CONNECTIONS.iter() {
            if let (Some(a), Some(b)) = (hand.points.get(from), hand.points.get(to)) {
                draw_line(&mut canvas, project(a), project(b), BONE_WIDTH, BONE);
            }
        }

        for (i, point) in hand.points.iter().enumerate() {
            let (color, radius) = joint_style(i);
            fill_disc(&mut canvas, project(point), radius, color);
        }
    }
    canvas
}

/// Writes `<dir>/<name>_sign.png` and returns its path.
pub fn export_png(template: &GestureTemplate, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(export_file_name(&template.name));
    render_hand_set(&template.landmarks, EXPORT_WIDTH, EXPORT_HEIGHT)
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Exported '{}' to {}", template.name, path.display());
    Ok(path)
}

fn joint_style(point_index: usize) -> (Rgba<u8>, f32) {
    match point_index {
        index::WRIST => (WRIST, WRIST_RADIUS),
        index::THUMB_CMC..=index::THUMB_TIP => (THUMB, JOINT_RADIUS),
        index::INDEX_MCP..=index::INDEX_TIP => (INDEX, JOINT_RADIUS),
        index::MIDDLE_MCP..=index::MIDDLE_TIP => (MIDDLE, JOINT_RADIUS),
        index::RING_MCP..=index::RING_TIP => (RING, JOINT_RADIUS),
        _ => (PINKY, JOINT_RADIUS),
    }
}

fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
        return;
    }
    canvas.get_pixel_mut(x as u32, y as u32).blend(&color);
}

/// Stamps pixels whose center lies within `width / 2` of the segment.
fn draw_line(canvas: &mut RgbaImage, a: (f32, f32), b: (f32, f32), width: f32, color: Rgba<u8>) {
    let half = width / 2.0;
    let min_x = (a.0.min(b.0) - half).floor() as i64;
    let max_x = (a.0.max(b.0) + half).ceil() as i64;
    let min_y = (a.1.min(b.1) - half).floor() as i64;
    let max_y = (a.1.max(b.1) + half).ceil() as i64;

    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length_sq = dx * dx + dy * dy;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            let t = if length_sq > 0.0 {
                (((px - a.0) * dx + (py - a.1) * dy) / length_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
            if (px - cx).powi(2) + (py - cy).powi(2) <= half * half {
                blend_pixel(canvas, x, y, color);
            }
        }
    }
}

fn fill_disc(canvas: &mut RgbaImage, center: (f32, f32), radius: f32, color: Rgba<u8>) {
    let min_x = (center.0 - radius).floor() as i64;
    let max_x = (center.0 + radius).ceil() as i64;
    let min_y = (center.1 - radius).floor() as i64;
    let max_y = (center.1 + radius).ceil() as i64;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            if (px - center.0).powi(2) + (py - center.1).powi(2) <= radius * radius {
                blend_pixel(canvas, x, y, color);
            }
        }
    }
}
