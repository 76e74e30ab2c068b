//! # Point Cloud Accumulator
//!
//! Builds a map of the vehicle's surroundings as a capped buffer of world frame points. Points come
//! from one of two sources:
//!
//! - SLAM cloud frames, which are already in the world frame and are decoded and appended,
//! - planar lidar scans, which are in the body frame and are transformed using the vehicle's pose
//!   at the moment they are accumulated.
//!
//! The first message received decides the source. Once a SLAM cloud has been seen the map is built
//! from clouds only, scans are ignored from then on. Sources are never mixed in the buffer.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod buffer;

pub use buffer::PointCloudBuffer;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::msg::sensor::{CloudFrameMsg, LaserScanMsg};
use log::{debug, info, warn};
use nalgebra::Vector3;
use std::f64::consts::TAU;

use crate::{orient, params::CloudParams, state_agg::VehicleState};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PointCloudAccumulator {
    params: CloudParams,

    buffer: PointCloudBuffer,

    source: Option<CloudSource>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Source the accumulated points are taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudSource {
    /// SLAM cloud frames already in the world frame
    WorldFrame,

    /// Lidar scans transformed from the body frame
    BodyScan,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PointCloudAccumulator {
    pub fn new(params: &CloudParams) -> Self {
        Self {
            params: params.clone(),
            buffer: PointCloudBuffer::new(params.capacity_points),
            source: None,
        }
    }

    pub fn buffer(&self) -> &PointCloudBuffer {
        &self.buffer
    }

    pub fn source(&self) -> Option<CloudSource> {
        self.source
    }

    /// Discard all accumulated points. The source stays as it is.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Accumulate a SLAM cloud frame, returning the number of points added.
    ///
    /// A malformed frame is dropped as a whole.
    pub fn ingest_cloud(&mut self, msg: &CloudFrameMsg) -> usize {
        match self.source {
            Some(CloudSource::WorldFrame) => (),
            Some(CloudSource::BodyScan) => {
                info!("SLAM cloud received, switching the map from scans to clouds");
                self.buffer.clear();
                self.source = Some(CloudSource::WorldFrame);
            }
            None => {
                info!("Building the map from SLAM clouds");
                self.source = Some(CloudSource::WorldFrame);
            }
        }

        let points = match msg.decode_points(self.params.decimation) {
            Ok(p) => p,
            Err(e) => {
                warn!("Dropping cloud frame: {}", e);
                return 0;
            }
        };

        let num_points = points.len();
        self.buffer.extend(points);

        num_points
    }

    /// Accumulate a lidar scan using the vehicle's current pose, returning the number of points
    /// added.
    ///
    /// Ray `i` of `n` has the bearing `angle_min + i * 2pi / n`. Rays which are null, not finite,
    /// or outside the configured range limits are skipped.
    pub fn ingest_scan(&mut self, msg: &LaserScanMsg, vehicle: &VehicleState) -> usize {
        match self.source {
            Some(CloudSource::BodyScan) => (),
            Some(CloudSource::WorldFrame) => {
                debug!("Ignoring scan, the map is built from SLAM clouds");
                return 0;
            }
            None => {
                info!("Building the map from lidar scans");
                self.source = Some(CloudSource::BodyScan);
            }
        }

        if msg.ranges.is_empty() {
            return 0;
        }

        let angle_min = self.params.scan_angle_min_rad.unwrap_or(msg.angle_min);
        if !angle_min.is_finite() {
            warn!("Dropping scan with a non-finite start angle");
            return 0;
        }

        let angle_step = TAU / msg.ranges.len() as f64;
        let min_range = self.params.min_range_m;
        let max_range = self.params.max_range_m;

        // Take the pose once so the whole scan uses the same one
        let orientation = vehicle.orientation;
        let position = vehicle.position_m;

        let points: Vec<[f32; 3]> = msg
            .ranges
            .iter()
            .enumerate()
            .filter_map(|(i, r)| match r {
                Some(r) if r.is_finite() && *r >= min_range && *r <= max_range => Some((i, *r)),
                _ => None,
            })
            .map(|(i, r)| {
                let bearing = angle_min + i as f64 * angle_step;
                let local = Vector3::new(r * bearing.cos(), r * bearing.sin(), 0.0);
                let world = orient::body_to_world(&local, &orientation, &position);

                [world.x as f32, world.y as f32, world.z as f32]
            })
            .collect();

        let num_points = points.len();
        self.buffer.extend(points);

        num_points
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::msg::telem::Header;
    use nalgebra::UnitQuaternion;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn params(capacity_points: usize) -> CloudParams {
        CloudParams {
            capacity_points,
            decimation: 1,
            ..Default::default()
        }
    }

    fn scan(ranges: Vec<Option<f64>>) -> LaserScanMsg {
        LaserScanMsg {
            header: Header::default(),
            angle_min: -PI,
            ranges,
        }
    }

    fn assert_point(p: &[f32; 3], expected: [f64; 3]) {
        for (a, b) in p.iter().zip(expected.iter()) {
            assert!((*a as f64 - b).abs() < 1e-5, "{:?} != {:?}", p, expected);
        }
    }

    #[test]
    fn test_scan_bearings_and_filter() {
        let mut acc = PointCloudAccumulator::new(&params(100));
        let vehicle = VehicleState::default();

        // 4 rays at -180, -90, 0 and 90 degrees
        let added = acc.ingest_scan(
            &scan(vec![Some(2.0), Some(0.1), None, Some(3.0)]),
            &vehicle,
        );
        assert_eq!(added, 2);

        let points: Vec<_> = acc.buffer().iter().collect();
        assert_point(points[0], [-2.0, 0.0, 0.0]);
        assert_point(points[1], [0.0, 3.0, 0.0]);

        // Beyond the maximum range or infinite
        assert_eq!(
            acc.ingest_scan(&scan(vec![Some(15.5), Some(std::f64::INFINITY)]), &vehicle),
            0
        );
    }

    #[test]
    fn test_scan_uses_vehicle_pose() {
        let mut acc = PointCloudAccumulator::new(&params(100));
        let vehicle = VehicleState {
            position_m: Vector3::new(10.0, -5.0, 2.0),
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, FRAC_PI_2),
            ..Default::default()
        };

        // Single ray straight ahead
        let mut msg = scan(vec![Some(1.0)]);
        msg.angle_min = 0.0;
        acc.ingest_scan(&msg, &vehicle);

        assert_point(acc.buffer().iter().next().unwrap(), [10.0, -4.0, 2.0]);
    }

    #[test]
    fn test_cloud_and_capacity() {
        let mut acc = PointCloudAccumulator::new(&params(5));

        for frame in 0..4 {
            let points: Vec<[f32; 3]> = (0..3)
                .map(|i| [(frame * 3 + i) as f32, 1.0, 2.0])
                .collect();
            assert_eq!(acc.ingest_cloud(&CloudFrameMsg::from_points(&points)), 3);

            assert!(acc.buffer().len_points() <= 5);
            assert_eq!(acc.buffer().to_flat().len() % 3, 0);
        }

        // The 5 most recent of the 12 points
        let xs: Vec<f32> = acc.buffer().iter().map(|p| p[0]).collect();
        assert_eq!(xs, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_malformed_cloud_is_dropped() {
        let mut acc = PointCloudAccumulator::new(&params(100));
        acc.ingest_cloud(&CloudFrameMsg::from_points(&[[1.0, 2.0, 3.0]]));

        let mut bad = CloudFrameMsg::from_points(&[[4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        bad.point_step = 16;
        assert_eq!(acc.ingest_cloud(&bad), 0);

        bad.b64_data = String::from("not base64!");
        assert_eq!(acc.ingest_cloud(&bad), 0);

        assert_eq!(acc.buffer().to_flat(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_cloud_decimation() {
        let mut acc = PointCloudAccumulator::new(&CloudParams {
            capacity_points: 100,
            decimation: 2,
            ..Default::default()
        });

        let points: Vec<[f32; 3]> = (0..5).map(|i| [i as f32, 0.0, 0.0]).collect();
        assert_eq!(acc.ingest_cloud(&CloudFrameMsg::from_points(&points)), 3);
    }

    #[test]
    fn test_source_never_mixed() {
        let mut acc = PointCloudAccumulator::new(&params(100));
        let vehicle = VehicleState::default();

        acc.ingest_scan(&scan(vec![Some(1.0), Some(1.0)]), &vehicle);
        assert_eq!(acc.source(), Some(CloudSource::BodyScan));
        assert_eq!(acc.buffer().len_points(), 2);

        // The first cloud replaces everything built from scans
        acc.ingest_cloud(&CloudFrameMsg::from_points(&[[1.0, 1.0, 1.0]]));
        assert_eq!(acc.source(), Some(CloudSource::WorldFrame));
        assert_eq!(acc.buffer().len_points(), 1);

        // And later scans are ignored
        assert_eq!(acc.ingest_scan(&scan(vec![Some(1.0)]), &vehicle), 0);
        assert_eq!(acc.buffer().len_points(), 1);

        acc.clear();
        assert!(acc.buffer().is_empty());
        assert_eq!(acc.source(), Some(CloudSource::WorldFrame));
    }
}
