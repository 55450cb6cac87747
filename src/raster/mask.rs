use image::{GrayImage, Luma};
use tiny_skia::{FillRule, Mask, PathBuilder, Transform};
use tracing::debug;

use crate::region::{Point, Region};

pub const MASKED: u8 = 255;

const ON_EDGE_EPSILON: f32 = 1e-3;

/// Single-channel removal mask the size of the image: 255 where pixel
/// `(x, y)` lies inside or on any region polygon (even-odd per polygon,
/// union across polygons), 0 elsewhere.
pub fn build_mask(width: u32, height: u32, regions: &[Region]) -> GrayImage {
    let mut out = GrayImage::new(width, height);
    let Some(mut mask) = Mask::new(width, height) else {
        return out;
    };

    // tiny-skia samples pixel centers; shifting the path by half a pixel
    // makes it sample the integer pixel coordinates instead.
    let to_pixel_grid = Transform::from_translate(0.5, 0.5);
    for (index, region) in regions.iter().enumerate() {
        let mut builder = PathBuilder::new();
        let mut points = region.polygon().iter();
        let Some(first) = points.next() else {
            continue;
        };
        builder.move_to(first.x, first.y);
        for point in points {
            builder.line_to(point.x, point.y);
        }
        builder.close();
        match builder.finish() {
            Some(path) => mask.fill_path(&path, FillRule::EvenOdd, false, to_pixel_grid),
            None => debug!("region {} has a degenerate polygon; only its outline is masked", index),
        }
    }

    for (pixel, value) in out.pixels_mut().zip(mask.data()) {
        *pixel = Luma([if *value > 0 { MASKED } else { 0 }]);
    }
    for region in regions {
        let polygon = region.polygon();
        for (index, start) in polygon.iter().enumerate() {
            let end = polygon[(index + 1) % polygon.len()];
            mark_edge(&mut out, *start, end);
        }
    }
    out
}

/// Masks every pixel whose integer coordinates lie on the segment.
fn mark_edge(mask: &mut GrayImage, start: Point, end: Point) {
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    if dx == 0.0 && dy == 0.0 {
        mark_if_on_grid(mask, start.x, start.y);
        return;
    }
    if dx.abs() >= dy.abs() {
        let (lo, hi) = (start.x.min(end.x).ceil(), start.x.max(end.x).floor());
        for x in lo.max(0.0) as i64..=hi.min(mask.width() as f32 - 1.0) as i64 {
            let x = x as f32;
            mark_if_on_grid(mask, x, start.y + (x - start.x) / dx * dy);
        }
    } else {
        let (lo, hi) = (start.y.min(end.y).ceil(), start.y.max(end.y).floor());
        for y in lo.max(0.0) as i64..=hi.min(mask.height() as f32 - 1.0) as i64 {
            let y = y as f32;
            mark_if_on_grid(mask, start.x + (y - start.y) / dy * dx, y);
        }
    }
}

fn mark_if_on_grid(mask: &mut GrayImage, x: f32, y: f32) {
    let (px, py) = (x.round(), y.round());
    if (x - px).abs() > ON_EDGE_EPSILON || (y - py).abs() > ON_EDGE_EPSILON {
        return;
    }
    if px < 0.0 || py < 0.0 || px >= mask.width() as f32 || py >= mask.height() as f32 {
        return;
    }
    mask.put_pixel(px as u32, py as u32, Luma([MASKED]));
}

pub(crate) fn is_masked(mask: &GrayImage, x: u32, y: u32) -> bool {
    mask.get_pixel(x, y).0[0] > 0
}
