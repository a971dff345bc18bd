use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;
// upper bound on the capacity reserved from an untrusted header
const MAX_RESERVED_POINTS: usize = 1 << 16;

/// Error types for the lidar readers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LidarError {
    /// Failed to read the sweep file.
    #[error("Failed to read lidar file")]
    Io(#[from] std::io::Error),

    /// A header declares a field layout the reader does not support.
    #[error("Unsupported lidar field layout: {0}")]
    UnsupportedLayout(String),

    /// The header is truncated or inconsistent.
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// The file does not have the expected extension.
    #[error("Invalid lidar file extension. Got:{0}")]
    InvalidFileExtension(String),

    /// A packed record buffer does not divide into whole points.
    #[error("Buffer of {len} bytes is not a multiple of the {stride}-float record size")]
    TruncatedRecords {
        /// Buffer length in bytes.
        len: usize,
        /// Floats per point.
        stride: usize,
    },
}

/// Byte offsets of the x/y/z fields within one PCD point record.
#[derive(Debug)]
struct PcdLayout {
    offsets: [usize; 3],
    point_step: usize,
    num_points: usize,
}

#[inline]
fn read_f32_le(buf: &[u8], offset: usize) -> Option<f32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(f32::from_le_bytes(bytes))
}

fn parse_list<T: std::str::FromStr>(values: std::str::SplitWhitespace<'_>) -> Result<Vec<T>, LidarError> {
    values
        .map(|v| v.parse::<T>().map_err(|_| LidarError::MalformedHeader))
        .collect()
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, LidarError> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<String> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut num_points = 0usize;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(LidarError::MalformedHeader);
        }
        let line = line.trim();
        if line.starts_with('#') || line.is_empty() {
            continue;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("FIELDS") => names = it.map(String::from).collect(),
            Some("SIZE") => sizes = parse_list(it)?,
            Some("TYPE") => types = it.map(String::from).collect(),
            Some("COUNT") => counts = parse_list(it)?,
            Some("POINTS") => {
                num_points = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .ok_or(LidarError::MalformedHeader)?;
            }
            Some("DATA") => match it.next() {
                Some("binary") => break,
                other => {
                    return Err(LidarError::UnsupportedLayout(format!(
                        "DATA {}",
                        other.unwrap_or_default()
                    )))
                }
            },
            _ => {}
        }
    }

    if names.is_empty() || sizes.len() != names.len() || types.len() != names.len() {
        return Err(LidarError::MalformedHeader);
    }
    if !counts.is_empty() && counts.len() != names.len() {
        return Err(LidarError::MalformedHeader);
    }

    let mut field_offsets = HashMap::new();
    let mut offset = 0usize;
    for (i, name) in names.iter().enumerate() {
        let count = counts.get(i).copied().unwrap_or(1);
        if matches!(name.as_str(), "x" | "y" | "z")
            && !(sizes[i] == 4 && count == 1 && types[i] == "F")
        {
            return Err(LidarError::UnsupportedLayout(format!(
                "field {name} must be a single 4-byte float"
            )));
        }
        if field_offsets.insert(name.as_str(), offset).is_some() {
            return Err(LidarError::MalformedHeader);
        }
        offset = sizes[i]
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .ok_or(LidarError::MalformedHeader)?;
    }

    if offset == 0 || offset > MAX_POINT_STEP || num_points > MAX_POINTS {
        return Err(LidarError::MalformedHeader);
    }

    let field = |name: &str| {
        field_offsets
            .get(name)
            .copied()
            .ok_or_else(|| LidarError::UnsupportedLayout(format!("missing field {name}")))
    };

    Ok(PcdLayout {
        offsets: [field("x")?, field("y")?, field("z")?],
        point_step: offset,
        num_points,
    })
}

/// Parse the x/y/z coordinates of a binary PCD stream.
pub fn parse_pcd_binary<R: BufRead>(reader: &mut R) -> Result<Vec<[f64; 3]>, LidarError> {
    let layout = parse_pcd_layout(reader)?;

    let mut buffer = vec![0u8; layout.point_step];
    let mut points = Vec::with_capacity(layout.num_points.min(MAX_RESERVED_POINTS));
    for _ in 0..layout.num_points {
        reader.read_exact(&mut buffer)?;
        let mut point = [0.0; 3];
        for (value, &offset) in point.iter_mut().zip(layout.offsets.iter()) {
            *value = read_f32_le(&buffer, offset).ok_or(LidarError::MalformedHeader)? as f64;
        }
        points.push(point);
    }

    Ok(points)
}

/// Read the x/y/z coordinates of a binary PCD file.
///
/// Extra fields (intensity, ring, rgb, ...) are skipped.
pub fn read_pcd_binary(path: impl AsRef<Path>) -> Result<Vec<[f64; 3]>, LidarError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("pcd") => {}
        other => {
            return Err(LidarError::InvalidFileExtension(
                other.unwrap_or_default().to_string(),
            ))
        }
    }

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let points = parse_pcd_binary(&mut reader)?;
    log::debug!("Read {} points from {}", points.len(), path.display());
    Ok(points)
}

/// Decode packed little-endian float32 records, keeping the first three
/// values of each record as x/y/z.
///
/// nuScenes-style sweeps use `stride = 5` (x, y, z, intensity, ring).
pub fn parse_float_records(bytes: &[u8], stride: usize) -> Result<Vec<[f64; 3]>, LidarError> {
    if stride < 3 {
        return Err(LidarError::UnsupportedLayout(format!(
            "record stride {stride} is smaller than 3"
        )));
    }
    let record_bytes = stride.checked_mul(4).ok_or_else(|| {
        LidarError::UnsupportedLayout(format!("record stride {stride} is too large"))
    })?;
    if bytes.len() % record_bytes != 0 {
        return Err(LidarError::TruncatedRecords {
            len: bytes.len(),
            stride,
        });
    }

    bytes
        .chunks_exact(record_bytes)
        .map(|record| {
            let mut point = [0.0; 3];
            for (i, value) in point.iter_mut().enumerate() {
                *value = read_f32_le(record, i * 4).ok_or(LidarError::MalformedHeader)? as f64;
            }
            Ok(point)
        })
        .collect()
}

/// Read a file of packed little-endian float32 records.
pub fn read_float_records(path: impl AsRef<Path>, stride: usize) -> Result<Vec<[f64; 3]>, LidarError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let points = parse_float_records(&bytes, stride)?;
    log::debug!("Read {} points from {}", points.len(), path.display());
    Ok(points)
}
