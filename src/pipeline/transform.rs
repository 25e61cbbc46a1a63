use crate::models::{BoundingBox, Frame};

/// Map a box measured in `source` pixels into `target` pixels.
pub fn scale_box(bbox: &BoundingBox, source: Frame, target: Frame) -> BoundingBox {
    if source == target {
        return *bbox;
    }
    let sx = target.width / source.width;
    let sy = target.height / source.height;
    BoundingBox {
        x: bbox.x * sx,
        y: bbox.y * sy,
        width: bbox.width * sx,
        height: bbox.height * sy,
    }
}
