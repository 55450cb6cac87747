//! Text removal: rasterize region polygons into a mask, then inpaint it.

pub mod inpaint;
pub mod mask;

pub use inpaint::inpaint;
pub use mask::build_mask;
