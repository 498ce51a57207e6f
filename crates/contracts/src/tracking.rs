//! StypePacket - Ingestion input, TrackingFrame - Ingestion output
//!
//! Decoded camera-tracking samples and the frames published downstream.

use serde::{Deserialize, Serialize};

use crate::{QualifiedFrameTime, Timecode};

/// Command bit signalling that the focus distance is driven by the device
pub const COMMAND_DEPTH_OF_FIELD: u8 = 0x02;

/// Decoded, checksum-valid Stype HF sample
///
/// Distances are metres and angles degrees, in device axes
/// (-z forward, x right, y up).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StypePacket {
    /// Command byte
    pub command: u8,

    /// Timecode of the sample
    pub timecode: Timecode,

    /// Wrapping 8-bit packet counter
    pub package_no: u8,

    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub pan: f32,
    pub tilt: f32,
    pub roll: f32,

    /// Horizontal field of view (degrees)
    pub fov_x: f32,

    /// Aspect ratio
    pub aspect_ratio: f32,

    pub focus: f32,
    pub zoom: f32,

    /// Radial distortion
    pub k1: f32,
    pub k2: f32,

    /// Center shift (mm)
    pub center_shift_x: f32,
    pub center_shift_y: f32,

    /// Projection area width (mm)
    pub pa_width: f32,
}

impl StypePacket {
    pub fn uses_depth_of_field(&self) -> bool {
        self.command & COMMAND_DEPTH_OF_FIELD != 0
    }
}

/// 2D vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

/// Position in engine axes (x forward, y right, z up), centimetres
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Rotation in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Camera pose
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraTransform {
    pub location: Location,
    pub rotation: Rotation,
}

/// Per-frame lens parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LensData {
    /// Horizontal field of view (degrees)
    pub field_of_view: f64,
    pub aspect_ratio: f64,
    /// Focal length (mm)
    pub focal_length: f64,
    /// Focus distance (cm)
    pub focus_distance: f64,
    pub focus: f64,
    pub zoom: f64,
    pub k1: f64,
    pub k2: f64,
    pub center_shift: Vector2,
    pub projection_area_width: f64,
    /// Normalized principal point
    pub principal_point: Vector2,
    /// Normalized focal lengths
    pub fx_fy: Vector2,
}

/// Lens data that only changes when the camera body or mode changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LensStaticData {
    /// Film back width (mm)
    pub film_back_width: f64,
    /// Film back height (mm)
    pub film_back_height: f64,
    /// Whether focus distance is driven by the device
    pub focus_distance_supported: bool,
}

/// One published tracking sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingFrame {
    /// Subject name
    pub subject: String,

    /// Command byte of the source packet
    pub command: u8,

    /// Packet counter of the source packet
    pub package_no: u8,

    /// Raw timecode of the source packet
    pub timecode: Timecode,

    /// Scene time (estimated, or raw timecode at the fallback rate)
    pub scene_time: QualifiedFrameTime,

    /// Whether `scene_time` comes from a confirmed estimation
    pub timing_valid: bool,

    /// Camera pose
    pub transform: CameraTransform,

    /// Lens parameters
    pub lens: LensData,

    /// Wall clock at reception (seconds since UNIX epoch)
    pub received_at: f64,
}
