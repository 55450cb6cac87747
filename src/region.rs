use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<[f32; 2]> for Point {
    fn from(value: [f32; 2]) -> Self {
        Self {
            x: value[0],
            y: value[1],
        }
    }
}

impl From<Point> for [f32; 2] {
    fn from(value: Point) -> Self {
        [value.x, value.y]
    }
}

/// A detected polygon with its recognized text.
///
/// Regions are immutable once built; the bounding box is always derived from
/// the polygon so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RegionRecord")]
pub struct Region {
    polygon: Vec<Point>,
    text: String,
    confidence: f32,
}

#[derive(Deserialize)]
struct RegionRecord {
    #[serde(alias = "bbox")]
    polygon: Vec<Point>,
    text: String,
    confidence: f32,
}

impl TryFrom<RegionRecord> for Region {
    type Error = anyhow::Error;

    fn try_from(record: RegionRecord) -> Result<Self> {
        Region::new(record.polygon, record.text, record.confidence)
    }
}

impl Region {
    pub fn new(polygon: Vec<Point>, text: impl Into<String>, confidence: f32) -> Result<Self> {
        if polygon.len() < 3 {
            return Err(anyhow!(
                "region polygon needs at least 3 points (got {})",
                polygon.len()
            ));
        }
        if polygon
            .iter()
            .any(|point| !point.x.is_finite() || !point.y.is_finite())
        {
            return Err(anyhow!("region polygon contains a non-finite coordinate"));
        }
        if !confidence.is_finite() {
            return Err(anyhow!("region confidence is not a number"));
        }
        Ok(Self {
            polygon,
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    /// Axis-aligned rectangle polygon, the shape line-level detectors emit.
    pub fn rect(
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        text: impl Into<String>,
        confidence: f32,
    ) -> Result<Self> {
        Self::new(
            vec![
                Point::new(x, y),
                Point::new(x + w, y),
                Point::new(x + w, y + h),
                Point::new(x, y + h),
            ],
            text,
            confidence,
        )
    }

    pub fn polygon(&self) -> &[Point] {
        &self.polygon
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox {
            min_x: f32::MAX,
            min_y: f32::MAX,
            max_x: f32::MIN,
            max_y: f32::MIN,
        };
        for point in &self.polygon {
            bbox.min_x = bbox.min_x.min(point.x);
            bbox.min_y = bbox.min_y.min(point.y);
            bbox.max_x = bbox.max_x.max(point.x);
            bbox.max_y = bbox.max_y.max(point.y);
        }
        bbox
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BBox {
    pub fn width(&self) -> f32 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.max_y - self.min_y).max(0.0)
    }

    /// Integer pixel rectangle clipped to the image. `None` when nothing of
    /// the box lies inside the image.
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> Option<PixelRect> {
        let x1 = self.min_x.floor().max(0.0) as u32;
        let y1 = self.min_y.floor().max(0.0) as u32;
        let x2 = (self.max_x.ceil().max(0.0) as u32).min(image_width);
        let y2 = (self.max_y.ceil().max(0.0) as u32).min(image_height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1,
            y: y1,
            w: x2 - x1,
            h: y2 - y1,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Keeps regions whose confidence reaches `min_confidence`, in input order.
pub fn filter_regions(regions: Vec<Region>, min_confidence: f32) -> Vec<Region> {
    regions
        .into_iter()
        .filter(|region| region.confidence >= min_confidence)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(text: &str, confidence: f32) -> Region {
        Region::rect(0.0, 0.0, 10.0, 10.0, text, confidence).expect("region")
    }

    #[test]
    fn filter_keeps_order_and_threshold() {
        let regions = vec![
            region("a", 0.9),
            region("b", 0.2),
            region("c", 0.5),
            region("d", 0.49),
            region("e", 1.0),
        ];
        let kept = filter_regions(regions, 0.5);
        let texts = kept.iter().map(Region::text).collect::<Vec<_>>();
        assert_eq!(texts, vec!["a", "c", "e"]);
        assert!(kept.iter().all(|region| region.confidence() >= 0.5));
    }

    #[test]
    fn filter_empty_input_is_empty() {
        assert!(filter_regions(Vec::new(), 0.5).is_empty());
    }

    #[test]
    fn region_requires_three_points() {
        let err = Region::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)], "x", 0.9);
        assert!(err.is_err());
    }

    #[test]
    fn bbox_is_derived_from_polygon() {
        let region = Region::new(
            vec![
                Point::new(12.0, 5.0),
                Point::new(40.5, 7.0),
                Point::new(38.0, 25.0),
                Point::new(10.0, 22.0),
            ],
            "tilted",
            0.8,
        )
        .expect("region");
        let bbox = region.bbox();
        assert_eq!(bbox.min_x, 10.0);
        assert_eq!(bbox.min_y, 5.0);
        assert_eq!(bbox.max_x, 40.5);
        assert_eq!(bbox.max_y, 25.0);
        assert_eq!(bbox.width(), 30.5);
    }

    #[test]
    fn pixel_rect_is_clipped_to_image() {
        let region = Region::rect(-5.0, 90.0, 30.0, 30.0, "edge", 0.9).expect("region");
        let rect = region.bbox().to_pixel_rect(100, 100).expect("rect");
        assert_eq!(rect, PixelRect { x: 0, y: 90, w: 25, h: 10 });
        let outside = Region::rect(200.0, 200.0, 5.0, 5.0, "out", 0.9).expect("region");
        assert!(outside.bbox().to_pixel_rect(100, 100).is_none());
    }

    #[test]
    fn deserializes_detector_record_shape() {
        let json = r#"[{"bbox": [[0,0],[100,0],[100,20],[0,20]], "text": "Hello", "confidence": 0.93}]"#;
        let regions: Vec<Region> = serde_json::from_str(json).expect("parse");
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text(), "Hello");
        assert_eq!(regions[0].bbox().width(), 100.0);

        let bad = r#"[{"bbox": [[0,0],[1,1]], "text": "x", "confidence": 0.5}]"#;
        assert!(serde_json::from_str::<Vec<Region>>(bad).is_err());
    }
}
