use std::collections::HashMap;

use axum::extract::Multipart;

use crate::error::{FaceSwapError, Result};
use crate::models::ImageData;
use crate::pipeline::detect::DetectionReport;

/// Multipart body split into file parts (in arrival order) and text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    files: Vec<(String, ImageData)>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    if bytes.is_empty() {
                        return Err(FaceSwapError::validation(format!("{} is empty", name)));
                    }
                    let mut image = ImageData::new(file_name, bytes);
                    // Browsers send application/octet-stream for blobs; the extension is a better guess then.
                    if let Some(ct) = content_type.filter(|ct| ct.starts_with("image/")) {
                        image = image.with_content_type(ct);
                    }
                    form.files.push((name, image));
                }
                None => {
                    let text = field.text().await?;
                    form.fields.insert(name, text);
                }
            }
        }
        Ok(form)
    }

    pub fn take_image(&mut self, field: &str) -> Result<ImageData> {
        let pos = self
            .files
            .iter()
            .position(|(name, _)| name == field)
            .ok_or_else(|| FaceSwapError::validation(format!("missing file field `{}`", field)))?;
        Ok(self.files.remove(pos).1)
    }

    /// Every file sent under `field`, in order.
    pub fn take_images(&mut self, field: &str) -> Vec<ImageData> {
        let (taken, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.files).into_iter().partition(|(name, _)| name == field);
        self.files = rest;
        taken.into_iter().map(|(_, img)| img).collect()
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn require_text(&self, field: &str) -> Result<&str> {
        self.text(field).ok_or_else(|| FaceSwapError::validation(format!("missing field `{}`", field)))
    }

    /// The client-side detector's output for the uploaded image.
    pub fn detections(&self) -> Result<DetectionReport> {
        DetectionReport::parse(self.require_text("detections")?)
    }

    /// A JSON array of non-negative integers, e.g. `[0, 2]`.
    pub fn indices(&self, field: &str) -> Result<Option<Vec<usize>>> {
        self.text(field).map(parse_indices).transpose()
    }
}

pub fn parse_indices(raw: &str) -> Result<Vec<usize>> {
    serde_json::from_str::<Vec<usize>>(raw)
        .map_err(|_| FaceSwapError::validation(format!("index must be a JSON array of face positions, got `{}`", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indices() {
        assert_eq!(parse_indices("[0, 2]").unwrap(), vec![0, 2]);
        assert_eq!(parse_indices("[]").unwrap(), Vec::<usize>::new());
        assert!(parse_indices("[-1]").is_err());
        assert!(parse_indices("0,2").is_err());
    }

    #[test]
    fn test_take_images_keeps_order() {
        let mut form = UploadForm::default();
        form.files.push(("face_image".into(), ImageData::new("a.jpg", vec![1u8])));
        form.files.push(("source_image".into(), ImageData::new("s.jpg", vec![2u8])));
        form.files.push(("face_image".into(), ImageData::new("b.jpg", vec![3u8])));
        let faces = form.take_images("face_image");
        assert_eq!(faces.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(), vec!["a.jpg", "b.jpg"]);
        assert!(form.take_image("face_image").is_err());
        assert_eq!(form.take_image("source_image").unwrap().name, "s.jpg");
    }
}
