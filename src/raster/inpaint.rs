//! Telea's fast-marching inpainting.
//!
//! Masked pixels are filled in order of their distance from the mask
//! boundary. Each one becomes a weighted average of the already-known pixels
//! within `radius`, extrapolated along their local image gradient. Pixels
//! outside the mask are never written.

use image::{GrayImage, RgbImage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, warn};

use super::mask::is_masked;

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;

const FAR: f32 = 1.0e6;

pub fn inpaint(image: &RgbImage, mask: &GrayImage, radius: u32) -> RgbImage {
    if image.dimensions() != mask.dimensions() {
        warn!(
            "mask is {:?} but image is {:?}; skipping text removal",
            mask.dimensions(),
            image.dimensions()
        );
        return image.clone();
    }
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    if width == 0 || height == 0 {
        return out;
    }

    let mut march = FastMarch::new(mask);
    if march.inside == 0 {
        debug!("empty removal mask; image left untouched");
        return out;
    }
    if march.heap.is_empty() {
        warn!("removal mask covers the whole image; nothing to sample from");
        return out;
    }
    march.run(&mut out, radius.max(1) as i64);
    out
}

#[derive(Debug, Clone, Copy)]
struct Node {
    t: f32,
    index: usize,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    // Min-heap on arrival time; ties broken by index for determinism.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.index.cmp(&self.index))
    }
}

struct FastMarch {
    width: i64,
    height: i64,
    flags: Vec<u8>,
    t: Vec<f32>,
    heap: BinaryHeap<Node>,
    inside: usize,
}

impl FastMarch {
    fn new(mask: &GrayImage) -> Self {
        let (width, height) = mask.dimensions();
        let len = width as usize * height as usize;
        let mut flags = vec![KNOWN; len];
        let mut t = vec![0.0f32; len];
        let mut inside = 0usize;
        for (x, y, _) in mask.enumerate_pixels() {
            if is_masked(mask, x, y) {
                let index = y as usize * width as usize + x as usize;
                flags[index] = INSIDE;
                t[index] = FAR;
                inside += 1;
            }
        }

        let mut march = Self {
            width: width as i64,
            height: height as i64,
            flags,
            t,
            heap: BinaryHeap::new(),
            inside,
        };

        // Initial band: known pixels touching the mask.
        for y in 0..march.height {
            for x in 0..march.width {
                let index = march.index(x, y);
                if march.flags[index] != KNOWN {
                    continue;
                }
                let touches = NEIGHBORS
                    .iter()
                    .any(|(dx, dy)| march.flag(x + dx, y + dy) == Some(INSIDE));
                if touches {
                    march.flags[index] = BAND;
                    march.heap.push(Node { t: 0.0, index });
                }
            }
        }
        march
    }

    fn run(&mut self, image: &mut RgbImage, radius: i64) {
        let mut filled = 0usize;
        while let Some(Node { t, index }) = self.heap.pop() {
            if self.flags[index] != BAND || t > self.t[index] {
                continue;
            }
            self.flags[index] = KNOWN;
            let x = index as i64 % self.width;
            let y = index as i64 / self.width;

            for (dx, dy) in NEIGHBORS {
                let (nx, ny) = (x + dx, y + dy);
                let Some(flag) = self.flag(nx, ny) else {
                    continue;
                };
                if flag == KNOWN {
                    continue;
                }
                let arrival = self
                    .solve(nx - 1, ny, nx, ny - 1)
                    .min(self.solve(nx + 1, ny, nx, ny - 1))
                    .min(self.solve(nx - 1, ny, nx, ny + 1))
                    .min(self.solve(nx + 1, ny, nx, ny + 1));
                let neighbor = self.index(nx, ny);
                if flag == INSIDE {
                    self.t[neighbor] = arrival;
                    self.fill_pixel(image, nx, ny, radius);
                    self.flags[neighbor] = BAND;
                    filled += 1;
                    self.heap.push(Node {
                        t: arrival,
                        index: neighbor,
                    });
                } else if arrival < self.t[neighbor] {
                    self.t[neighbor] = arrival;
                    self.heap.push(Node {
                        t: arrival,
                        index: neighbor,
                    });
                }
            }
        }
        debug!("inpainted {} of {} masked pixels", filled, self.inside);
    }

    /// First-order upwind solution of |∇T| = 1 from two orthogonal neighbors.
    fn solve(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> f32 {
        let first = self.known_t(x1, y1);
        let second = self.known_t(x2, y2);
        match (first, second) {
            (Some(t1), Some(t2)) => {
                let diff = t1 - t2;
                let disc = 2.0 - diff * diff;
                if disc < 0.0 {
                    return 1.0 + t1.min(t2);
                }
                let r = disc.sqrt();
                let s = (t1 + t2 - r) * 0.5;
                if s >= t1 && s >= t2 {
                    s
                } else {
                    let s = s + r;
                    if s >= t1 && s >= t2 { s } else { 1.0 + t1.min(t2) }
                }
            }
            (Some(t1), None) => 1.0 + t1,
            (None, Some(t2)) => 1.0 + t2,
            (None, None) => FAR,
        }
    }

    fn fill_pixel(&self, image: &mut RgbImage, x: i64, y: i64, radius: i64) {
        let (grad_tx, grad_ty) = self.arrival_gradient(x, y);
        let t_here = self.t[self.index(x, y)];
        let mut sum = [0.0f32; 3];
        let mut weight_sum = 0.0f32;

        for ky in (y - radius)..=(y + radius) {
            for kx in (x - radius)..=(x + radius) {
                if kx == x && ky == y {
                    continue;
                }
                let Some(flag) = self.flag(kx, ky) else {
                    continue;
                };
                if flag == INSIDE {
                    continue;
                }
                let rx = (x - kx) as f32;
                let ry = (y - ky) as f32;
                let len_sq = rx * rx + ry * ry;
                if len_sq > (radius * radius) as f32 {
                    continue;
                }
                let len = len_sq.sqrt();
                let mut direction = (rx * grad_tx + ry * grad_ty).abs() / len;
                if direction <= 0.01 {
                    direction = 1.0e-6;
                }
                let distance = 1.0 / (len_sq * len);
                let level = 1.0 / (1.0 + (self.t[self.index(kx, ky)] - t_here).abs());
                let weight = direction * distance * level;

                let sample = image.get_pixel(kx as u32, ky as u32).0;
                for channel in 0..3 {
                    let (gx, gy) = self.image_gradient(image, kx, ky, channel);
                    let value = sample[channel] as f32 + gx * rx + gy * ry;
                    sum[channel] += weight * value;
                }
                weight_sum += weight;
            }
        }

        if weight_sum <= 0.0 {
            return;
        }
        let pixel = image.get_pixel_mut(x as u32, y as u32);
        for channel in 0..3 {
            pixel.0[channel] = (sum[channel] / weight_sum).round().clamp(0.0, 255.0) as u8;
        }
    }

    fn arrival_gradient(&self, x: i64, y: i64) -> (f32, f32) {
        let here = self.t[self.index(x, y)];
        let sample = |sx: i64, sy: i64| self.known_or_band_t(sx, sy);
        (
            central_difference(sample(x - 1, y), here, sample(x + 1, y)),
            central_difference(sample(x, y - 1), here, sample(x, y + 1)),
        )
    }

    fn image_gradient(&self, image: &RgbImage, x: i64, y: i64, channel: usize) -> (f32, f32) {
        let here = image.get_pixel(x as u32, y as u32).0[channel] as f32;
        let sample = |sx: i64, sy: i64| {
            self.flag(sx, sy)
                .filter(|flag| *flag != INSIDE)
                .map(|_| image.get_pixel(sx as u32, sy as u32).0[channel] as f32)
        };
        (
            central_difference(sample(x - 1, y), here, sample(x + 1, y)),
            central_difference(sample(x, y - 1), here, sample(x, y + 1)),
        )
    }

    fn known_t(&self, x: i64, y: i64) -> Option<f32> {
        match self.flag(x, y) {
            Some(KNOWN) => Some(self.t[self.index(x, y)]),
            _ => None,
        }
    }

    fn known_or_band_t(&self, x: i64, y: i64) -> Option<f32> {
        match self.flag(x, y) {
            Some(INSIDE) | None => None,
            Some(_) => Some(self.t[self.index(x, y)]),
        }
    }

    fn flag(&self, x: i64, y: i64) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some(self.flags[self.index(x, y)])
    }

    fn index(&self, x: i64, y: i64) -> usize {
        (y * self.width + x) as usize
    }
}

const NEIGHBORS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

fn central_difference(before: Option<f32>, here: f32, after: Option<f32>) -> f32 {
    match (before, after) {
        (Some(before), Some(after)) => (after - before) * 0.5,
        (None, Some(after)) => after - here,
        (Some(before), None) => here - before,
        (None, None) => 0.0,
    }
}
