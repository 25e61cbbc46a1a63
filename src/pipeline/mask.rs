// Swap preview
// ------------
//
// Before submitting, the user sees the source photo with every registered
// (excluded) face blacked out, plus a padded crop of each excluded face with
// its box outlined.

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use serde::Serialize;

use crate::error::{FaceSwapError, Result};
use crate::models::{BoundingBox, DetectionPass, Frame, RegisteredId};
use crate::pipeline::selector::SwapSelection;
use crate::pipeline::transform::scale_box;

pub const CROP_PADDING: u32 = 20;
const JPEG_QUALITY: u8 = 85;
const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(Debug, Clone, Serialize)]
pub struct FaceCrop {
    pub index: usize,
    pub registered_id: RegisteredId,
    /// Box in the decoded photo's pixel space.
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(skip)]
    pub jpeg: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MaskPreview {
    pub frame: Frame,
    pub masked_jpeg: Vec<u8>,
    pub crops: Vec<FaceCrop>,
}

pub fn render_preview(photo: &[u8], pass: &DetectionPass, selection: &SwapSelection) -> Result<MaskPreview> {
    if selection.pass != pass.id {
        return Err(FaceSwapError::StaleDetection { expected: pass.id, found: selection.pass });
    }
    let original = image::load_from_memory(photo)?.to_rgb8();
    let frame = Frame::new(original.width() as f64, original.height() as f64);
    let mut masked = original.clone();
    let mut crops = Vec::with_capacity(selection.excluded.len());

    for excluded in &selection.excluded {
        let face = pass.face(excluded.index).ok_or(FaceSwapError::StaleDetection {
            expected: pass.id,
            found: excluded.index.pass,
        })?;
        // Detector boxes may be measured on a resized copy of the photo.
        let bbox = scale_box(&face.bbox, pass.frame, frame).rounded().clamp_to(frame);
        let (x, y, w, h) = pixel_rect(&bbox);
        if w == 0 || h == 0 {
            tracing::warn!(index = excluded.index.index, "excluded face box is outside the photo");
            continue;
        }
        fill(&mut masked, x, y, w, h, Rgb([0, 0, 0]));
        crops.push(FaceCrop {
            index: excluded.index.index,
            registered_id: excluded.registered_id,
            bbox,
            jpeg: encode_jpeg(padded_crop(&original, x, y, w, h))?,
        });
    }

    Ok(MaskPreview { frame, masked_jpeg: encode_jpeg(masked)?, crops })
}

fn pixel_rect(b: &BoundingBox) -> (u32, u32, u32, u32) {
    (b.x as u32, b.y as u32, b.width as u32, b.height as u32)
}

fn fill(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

fn padded_crop(img: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> RgbImage {
    let cx = x.saturating_sub(CROP_PADDING);
    let cy = y.saturating_sub(CROP_PADDING);
    let cw = (x + w + CROP_PADDING).min(img.width()) - cx;
    let ch = (y + h + CROP_PADDING).min(img.height()) - cy;
    let mut crop = image::imageops::crop_imm(img, cx, cy, cw, ch).to_image();
    outline(&mut crop, x - cx, y - cy, w, h);
    crop
}

fn outline(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32) {
    const T: u32 = 2;
    let (iw, ih) = img.dimensions();
    for py in y..(y + h).min(ih) {
        for px in x..(x + w).min(iw) {
            let edge = px < x + T || py < y + T || px + T >= x + w || py + T >= y + h;
            if edge {
                img.put_pixel(px, py, OUTLINE);
            }
        }
    }
}

fn encode_jpeg(img: RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .map_err(|e| FaceSwapError::Internal(format!("jpeg encoding failed: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetectedFace, DetectedId, DetectionIndex, Descriptor, PassId};
    use crate::pipeline::selector::ExcludedFace;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(w, h, Rgb([200, 200, 200]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    fn setup(report_frame: Frame) -> (DetectionPass, SwapSelection) {
        let id = PassId(1);
        let boxes = [BoundingBox::new(10.0, 10.0, 30.0, 30.0), BoundingBox::new(100.0, 50.0, 40.0, 40.0)];
        let faces = boxes
            .iter()
            .enumerate()
            .map(|(i, b)| DetectedFace {
                id: DetectedId(i as u64),
                index: DetectionIndex { pass: id, index: i },
                bbox: *b,
                descriptor: Descriptor::new(vec![0.0]),
            })
            .collect();
        let pass = DetectionPass { id, frame: report_frame, faces };
        let selection = SwapSelection {
            pass: id,
            excluded: vec![ExcludedFace {
                index: DetectionIndex { pass: id, index: 1 },
                registered_id: RegisteredId(3),
                name: "Ana".into(),
                distance: 0.1,
            }],
            targets: vec![DetectionIndex { pass: id, index: 0 }],
        };
        (pass, selection)
    }

    #[test]
    fn test_blacks_out_only_excluded_faces() {
        let (pass, selection) = setup(Frame::new(200.0, 120.0));
        let preview = render_preview(&png(200, 120), &pass, &selection).unwrap();
        assert_eq!(preview.crops.len(), 1);
        assert_eq!(preview.crops[0].index, 1);
        // Padded on every side, the photo is large enough.
        let crop = image::load_from_memory(&preview.crops[0].jpeg).unwrap();
        assert_eq!((crop.width(), crop.height()), (80, 80));

        let masked = image::load_from_memory(&preview.masked_jpeg).unwrap().to_rgb8();
        let inside = masked.get_pixel(120, 70);
        let target_face = masked.get_pixel(25, 25);
        assert!(inside.0.iter().all(|c| *c < 40));
        assert!(target_face.0.iter().all(|c| *c > 150));
    }

    #[test]
    fn test_boxes_are_scaled_into_photo_frame() {
        // Boxes measured on a double-size copy.
        let (pass, selection) = setup(Frame::new(400.0, 240.0));
        let preview = render_preview(&png(200, 120), &pass, &selection).unwrap();
        assert_eq!(preview.crops[0].bbox, BoundingBox::new(50.0, 25.0, 20.0, 20.0));
        assert_eq!(preview.frame, Frame::new(200.0, 120.0));
    }

    #[test]
    fn test_rejects_selection_from_other_pass() {
        let (pass, mut selection) = setup(Frame::new(200.0, 120.0));
        selection.pass = PassId(99);
        assert!(matches!(
            render_preview(&png(200, 120), &pass, &selection),
            Err(FaceSwapError::StaleDetection { .. })
        ));
    }
}
