use std::fmt;
use std::str::FromStr;

use avframe_image::{BBox, ImageSize};

/// Scheme prefix of every serialized [`FrameUri`].
pub const URI_SCHEME: &str = "avframe://";

/// Errors raised while parsing a [`FrameUri`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    /// The string does not start with [`URI_SCHEME`].
    #[error("Uri {0:?} does not start with {URI_SCHEME}")]
    BadScheme(String),

    /// A required field is absent or empty.
    #[error("Uri is missing the required field {0}")]
    MissingField(&'static str),

    /// A `key=value` pair has no `=`.
    #[error("Malformed uri component {0:?}")]
    MalformedPair(String),

    /// A key that is not part of the uri format.
    #[error("Unknown uri key {0:?}")]
    UnknownKey(String),

    /// A key given more than once.
    #[error("Duplicate uri key {0:?}")]
    DuplicateKey(String),

    /// The timestamp is not an integer.
    #[error("Invalid uri timestamp {0:?}")]
    BadTimestamp(String),

    /// The viewport is not four comma separated non-negative integers.
    #[error("Invalid uri viewport {0:?}")]
    BadViewport(String),

    /// A `%` escape is not followed by two hex digits.
    #[error("Invalid escape sequence in {0:?}")]
    BadEscape(String),
}

/// A pixel rectangle narrowing a frame to a sub-region of its image.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: u32,
    /// Top edge in pixels.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// The viewport as a box clipped to `image_size`.
    pub fn to_bbox(&self, image_size: ImageSize) -> BBox {
        BBox::new(
            self.x as f64,
            self.y as f64,
            self.width as f64,
            self.height as f64,
            image_size,
        )
    }
}

impl From<&BBox> for Viewport {
    /// The smallest integer rectangle covering the box.
    fn from(bbox: &BBox) -> Self {
        let x = bbox.x().floor().max(0.0);
        let y = bbox.y().floor().max(0.0);
        Self {
            x: x as u32,
            y: y as u32,
            width: (bbox.x2().ceil() - x).max(0.0) as u32,
            height: (bbox.y2().ceil() - y).max(0.0) as u32,
        }
    }
}

impl From<BBox> for Viewport {
    fn from(bbox: BBox) -> Self {
        Self::from(&bbox)
    }
}

/// Names one camera image of one sample in a recording segment.
///
/// The canonical string form is
///
/// ```text
/// avframe://dataset=<d>&segment_id=<s>&split=<sp>&timestamp=<t>&camera=<c>[&viewport=<x>,<y>,<w>,<h>][&track_id=<id>]
/// ```
///
/// where `%`, `&` and `=` inside values are percent-escaped. Parsing the
/// serialized form gives back an equal uri.
///
/// Uris order by dataset, split, segment, timestamp and camera.
///
/// # Examples
///
/// ```
/// use avframe_frame::uri::{FrameUri, Viewport};
///
/// let uri = FrameUri::new("nuscenes", "train", "scene-0061", 1532402927647951, "CAM_FRONT")
///     .unwrap()
///     .with_viewport(Viewport { x: 10, y: 20, width: 100, height: 50 });
/// let parsed: FrameUri = uri.to_string().parse().unwrap();
/// assert_eq!(parsed, uri);
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[serde(into = "String", try_from = "String")]
pub struct FrameUri {
    // field order defines the total order
    dataset: String,
    split: String,
    segment_id: String,
    timestamp: i64,
    camera: String,
    viewport: Option<Viewport>,
    track_id: Option<String>,
}

impl FrameUri {
    /// Create a uri naming the full image of `camera` at `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`UriError::MissingField`] if `dataset`, `segment_id` or
    /// `camera` is empty.
    pub fn new(
        dataset: impl Into<String>,
        split: impl Into<String>,
        segment_id: impl Into<String>,
        timestamp: i64,
        camera: impl Into<String>,
    ) -> Result<Self, UriError> {
        let uri = Self {
            dataset: dataset.into(),
            split: split.into(),
            segment_id: segment_id.into(),
            timestamp,
            camera: camera.into(),
            viewport: None,
            track_id: None,
        };
        if uri.dataset.is_empty() {
            return Err(UriError::MissingField("dataset"));
        }
        if uri.segment_id.is_empty() {
            return Err(UriError::MissingField("segment_id"));
        }
        if uri.camera.is_empty() {
            return Err(UriError::MissingField("camera"));
        }
        Ok(uri)
    }

    /// Parse the canonical string form.
    pub fn parse(s: &str) -> Result<Self, UriError> {
        let query = s
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| UriError::BadScheme(s.to_string()))?;

        let mut dataset = None;
        let mut split = None;
        let mut segment_id = None;
        let mut timestamp = None;
        let mut camera = None;
        let mut viewport = None;
        let mut track_id = None;

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair
                .split_once('=')
                .ok_or_else(|| UriError::MalformedPair(pair.to_string()))?;
            let value = unescape(raw)?;

            let slot_taken = match key {
                "dataset" => dataset.replace(value).is_some(),
                "split" => split.replace(value).is_some(),
                "segment_id" => segment_id.replace(value).is_some(),
                "camera" => camera.replace(value).is_some(),
                "track_id" => track_id.replace(value).is_some(),
                "timestamp" => {
                    let ts = value
                        .parse::<i64>()
                        .map_err(|_| UriError::BadTimestamp(value.clone()))?;
                    timestamp.replace(ts).is_some()
                }
                "viewport" => viewport.replace(parse_viewport(&value)?).is_some(),
                _ => return Err(UriError::UnknownKey(key.to_string())),
            };
            if slot_taken {
                return Err(UriError::DuplicateKey(key.to_string()));
            }
        }

        let required = |field: Option<String>, name: &'static str| match field {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(UriError::MissingField(name)),
        };

        Ok(Self {
            dataset: required(dataset, "dataset")?,
            split: split.unwrap_or_default(),
            segment_id: required(segment_id, "segment_id")?,
            timestamp: timestamp.ok_or(UriError::MissingField("timestamp"))?,
            camera: required(camera, "camera")?,
            viewport,
            track_id,
        })
    }

    /// Serialize to the canonical string form.
    pub fn serialize(&self) -> String {
        let mut out = format!(
            "{URI_SCHEME}dataset={}&segment_id={}&split={}&timestamp={}&camera={}",
            escape(&self.dataset),
            escape(&self.segment_id),
            escape(&self.split),
            self.timestamp,
            escape(&self.camera),
        );
        if let Some(v) = &self.viewport {
            out.push_str(&format!("&viewport={},{},{},{}", v.x, v.y, v.width, v.height));
        }
        if let Some(track_id) = &self.track_id {
            out.push_str("&track_id=");
            out.push_str(&escape(track_id));
        }
        out
    }

    /// A copy narrowed to a sub-region of the image.
    pub fn with_viewport(&self, viewport: impl Into<Viewport>) -> Self {
        Self {
            viewport: Some(viewport.into()),
            ..self.clone()
        }
    }

    /// A copy narrowed to one annotated object.
    pub fn with_track_id(&self, track_id: impl Into<String>) -> Self {
        Self {
            track_id: Some(track_id.into()),
            ..self.clone()
        }
    }

    /// The dataset name.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// The split the segment belongs to, e.g. `train`.
    pub fn split(&self) -> &str {
        &self.split
    }

    /// The recording segment (scene or log).
    pub fn segment_id(&self) -> &str {
        &self.segment_id
    }

    /// The sample timestamp.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The camera name.
    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// The requested viewport; `None` means the full image.
    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    /// The requested track, if any.
    pub fn track_id(&self) -> Option<&str> {
        self.track_id.as_deref()
    }
}

impl fmt::Display for FrameUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for FrameUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<FrameUri> for String {
    fn from(uri: FrameUri) -> Self {
        uri.serialize()
    }
}

impl TryFrom<String> for FrameUri {
    type Error = UriError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

fn parse_viewport(value: &str) -> Result<Viewport, UriError> {
    let bad = || UriError::BadViewport(value.to_string());
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<u32>().map_err(|_| bad()))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        &[x, y, width, height] => Ok(Viewport {
            x,
            y,
            width,
            height,
        }),
        _ => Err(bad()),
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, UriError> {
    if !value.contains('%') {
        return Ok(value.to_string());
    }

    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = value
                .get(i + 1..i + 3)
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| UriError::BadEscape(value.to_string()))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| UriError::BadEscape(value.to_string()))
}
