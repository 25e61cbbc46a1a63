use std::fmt;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(SessionId, "session");
id_type!(RegisteredId, "face");
id_type!(DetectedId, "detected");
id_type!(PassId, "pass");
id_type!(CompareId, "compare");

impl PassId {
    /// Pass for indices that arrive from outside a session, e.g. the raw
    /// `index` list of the multi-faceswap endpoint. Never handed out by the
    /// allocator, which starts at 1.
    pub const EXTERNAL: PassId = PassId(0);
}

/// Feature vector produced by the detection model for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Pixel dimensions a bounding box was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width: f64,
    pub height: f64,
}

impl Frame {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Provider detectors report boxes as `[x1, y1, x2, y2]`.
    pub fn from_corners(corners: [f64; 4]) -> Self {
        let [x1, y1, x2, y2] = corners;
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    pub fn corners(&self) -> [f64; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    pub fn rounded(&self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
            width: self.width.round(),
            height: self.height.round(),
        }
    }

    /// Intersect with the frame; may yield a zero-sized box.
    pub fn clamp_to(&self, frame: Frame) -> Self {
        let x1 = self.x.clamp(0.0, frame.width);
        let y1 = self.y.clamp(0.0, frame.height);
        let x2 = (self.x + self.width).clamp(0.0, frame.width);
        let y2 = (self.y + self.height).clamp(0.0, frame.height);
        Self { x: x1, y: y1, width: (x2 - x1).max(0.0), height: (y2 - y1).max(0.0) }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Uploaded image bytes plus the name/content type they arrived with.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ImageData {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let content_type = mime_guess::from_path(&name).first_or_octet_stream().to_string();
        Self { name, content_type, bytes: bytes.into() }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn data_url(&self) -> String {
        use base64::Engine as _;
        format!(
            "data:{};base64,{}",
            self.content_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

#[derive(Debug, Clone)]
pub struct RegisteredFace {
    pub id: RegisteredId,
    pub name: String,
    pub descriptor: Descriptor,
    pub reference_image: ImageData,
    pub bbox: BoundingBox,
    pub reference_frame: Frame,
}

/// Position of a face inside one specific detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetectionIndex {
    pub pass: PassId,
    pub index: usize,
}

impl DetectionIndex {
    pub fn external(index: usize) -> Self {
        Self { pass: PassId::EXTERNAL, index }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectedFace {
    pub id: DetectedId,
    pub index: DetectionIndex,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(skip)]
    pub descriptor: Descriptor,
}

/// Everything one run of the detector produced for one photo, in detector order.
#[derive(Debug, Clone)]
pub struct DetectionPass {
    pub id: PassId,
    pub frame: Frame,
    pub faces: Vec<DetectedFace>,
}

impl DetectionPass {
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Descriptor length shared by every face of the pass.
    pub fn dimension(&self) -> Option<usize> {
        self.faces.first().map(|f| f.descriptor.len())
    }

    pub fn face(&self, index: DetectionIndex) -> Option<&DetectedFace> {
        if index.pass != self.id {
            return None;
        }
        self.faces.get(index.index)
    }
}
