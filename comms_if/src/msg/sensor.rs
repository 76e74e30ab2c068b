//! # Sensor Messages
//!
//! Lidar scans and SLAM point clouds published by the bridge.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use base64::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::telem::Header;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of bytes taken by the x, y, z fields at the start of each cloud record.
pub const XYZ_FIELDS_LEN: usize = 12;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single revolution of a planar lidar, in the body frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LaserScanMsg {
    #[serde(default)]
    pub header: Header,

    /// Bearing of the first ray in radians. Scans which omit it start at -pi.
    #[serde(default = "default_angle_min")]
    pub angle_min: f64,

    /// Measured ranges in meters, one per ray, evenly spaced over a full revolution.
    ///
    /// Infinite and NaN ranges cannot be represented in JSON and arrive as `null`.
    pub ranges: Vec<Option<f64>>,
}

/// A point cloud frame already expressed in the world frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CloudFrameMsg {
    #[serde(default)]
    pub header: Header,

    /// Number of points per row, zero if unknown
    #[serde(default)]
    pub width: u32,

    /// Number of rows, zero if unknown
    #[serde(default)]
    pub height: u32,

    /// Length of one point record in bytes. Each record starts with the x, y and z coordinates
    /// as little endian 32 bit floats.
    pub point_step: u32,

    /// The point records, encoded in base64.
    pub b64_data: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CloudDecodeError {
    #[error("Failed to decode cloud data from base64: {0}")]
    Base64Error(DecodeError),

    #[error("Point step of {0} bytes is too short to hold x, y and z")]
    PointStepTooShort(u32),

    #[error("Cloud data of {len} bytes is not a whole number of {point_step} byte records")]
    TruncatedRecord { len: usize, point_step: usize },

    #[error("Cloud header declares {declared} points but the data holds {actual}")]
    FrameWrongSize { declared: usize, actual: usize },

    #[error("Decimation factor must be at least 1")]
    InvalidDecimation,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CloudFrameMsg {
    /// Build a frame from a list of points, using the minimum 12 byte record.
    pub fn from_points(points: &[[f32; 3]]) -> Self {
        let mut bytes = vec![0u8; points.len() * XYZ_FIELDS_LEN];
        for (record, p) in bytes.chunks_exact_mut(XYZ_FIELDS_LEN).zip(points) {
            LittleEndian::write_f32_into(p, record);
        }

        Self {
            header: Header::default(),
            width: points.len() as u32,
            height: 1,
            point_step: XYZ_FIELDS_LEN as u32,
            b64_data: base64::encode(bytes),
        }
    }

    /// Decode the points in this frame, keeping only every `decimation`-th record.
    ///
    /// The whole frame is rejected if it is malformed. Individual points with non-finite
    /// coordinates are skipped.
    pub fn decode_points(&self, decimation: usize) -> Result<Vec<[f32; 3]>, CloudDecodeError> {
        if decimation == 0 {
            return Err(CloudDecodeError::InvalidDecimation);
        }

        let point_step = self.point_step as usize;
        if point_step < XYZ_FIELDS_LEN {
            return Err(CloudDecodeError::PointStepTooShort(self.point_step));
        }

        let bytes = base64::decode(&self.b64_data).map_err(CloudDecodeError::Base64Error)?;

        if bytes.len() % point_step != 0 {
            return Err(CloudDecodeError::TruncatedRecord {
                len: bytes.len(),
                point_step,
            });
        }

        let num_records = bytes.len() / point_step;
        let declared = self.width as usize * self.height as usize;
        if declared != 0 && declared != num_records {
            return Err(CloudDecodeError::FrameWrongSize {
                declared,
                actual: num_records,
            });
        }

        let mut points = Vec::with_capacity(num_records / decimation + 1);
        for record in bytes.chunks_exact(point_step).step_by(decimation) {
            let mut p = [0f32; 3];
            LittleEndian::read_f32_into(&record[..XYZ_FIELDS_LEN], &mut p);

            if p.iter().all(|c| c.is_finite()) {
                points.push(p);
            }
        }

        Ok(points)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_angle_min() -> f64 {
    -std::f64::consts::PI
}
