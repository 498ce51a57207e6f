//! Per-connection tracking session
//!
//! Turns decoded packets into published frames: timing estimation, fallback
//! scene time, camera pose and lens derivation.

use std::time::{SystemTime, UNIX_EPOCH};

use contracts::{
    CameraTransform, LensData, LensStaticData, Location, QualifiedFrameTime, Rotation,
    StypePacket, TimingConfig, TrackingFrame, Vector2,
};
use timing_engine::TimingEstimator;
use tracing::{debug, trace};

use crate::fallback::FallbackRate;

/// Device distances are metres, published ones centimetres
const METRES_TO_CM: f64 = 100.0;

/// Projection area width change that triggers a lens static data update
const PA_WIDTH_TOLERANCE: f32 = 1.0e-6;

/// Result of processing one packet
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutput {
    pub frame: TrackingFrame,
    /// Present on the first packet and whenever the lens setup changes
    pub lens_update: Option<LensStaticData>,
}

/// Lens setup last announced downstream
#[derive(Debug, Clone, Copy)]
struct LensState {
    pa_width: f32,
    depth_of_field: bool,
}

/// Tracking session for one device stream
#[derive(Debug)]
pub struct TrackingSession {
    subject: String,
    estimator: TimingEstimator,
    fallback: FallbackRate,
    lens: Option<LensState>,
}

impl TrackingSession {
    pub fn new(subject: impl Into<String>, timing: &TimingConfig, fallback: FallbackRate) -> Self {
        Self {
            subject: subject.into(),
            estimator: TimingEstimator::new(timing),
            fallback,
            lens: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn estimator(&self) -> &TimingEstimator {
        &self.estimator
    }

    pub fn fallback(&self) -> &FallbackRate {
        &self.fallback
    }

    /// Process a packet received now
    pub fn process(&mut self, packet: &StypePacket) -> SessionOutput {
        let received_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();
        self.process_at(packet, received_at)
    }

    /// Process a packet with an explicit reception time
    pub fn process_at(&mut self, packet: &StypePacket, received_at: f64) -> SessionOutput {
        let lens_update = self.lens_static_update(packet);

        self.estimator.update(packet.package_no, &packet.timecode);

        let timing_valid = self.estimator.is_valid();
        let scene_time = if timing_valid {
            self.estimator.qualified_frame_time()
        } else {
            QualifiedFrameTime::from_timecode(&packet.timecode, self.fallback.get())
        };

        trace!(
            subject = %self.subject,
            package_no = packet.package_no,
            timecode = %packet.timecode,
            scene_time = %scene_time,
            timing_valid,
            "stype packet"
        );

        SessionOutput {
            frame: TrackingFrame {
                subject: self.subject.clone(),
                command: packet.command,
                package_no: packet.package_no,
                timecode: packet.timecode,
                scene_time,
                timing_valid,
                transform: camera_transform(packet),
                lens: lens_data(packet),
                received_at,
            },
            lens_update,
        }
    }

    fn lens_static_update(&mut self, packet: &StypePacket) -> Option<LensStaticData> {
        let depth_of_field = packet.uses_depth_of_field();
        let changed = match self.lens {
            None => true,
            Some(state) => {
                (state.pa_width - packet.pa_width).abs() > PA_WIDTH_TOLERANCE
                    || state.depth_of_field != depth_of_field
            }
        };
        if !changed {
            return None;
        }

        self.lens = Some(LensState {
            pa_width: packet.pa_width,
            depth_of_field,
        });

        let film_back_width = f64::from(packet.pa_width);
        let aspect_ratio = f64::from(packet.aspect_ratio);
        let data = LensStaticData {
            film_back_width,
            film_back_height: if aspect_ratio != 0.0 {
                film_back_width / aspect_ratio
            } else {
                0.0
            },
            focus_distance_supported: depth_of_field,
        };
        debug!(
            subject = %self.subject,
            film_back_width = data.film_back_width,
            film_back_height = data.film_back_height,
            depth_of_field,
            "lens static data changed"
        );
        Some(data)
    }

    /// Start over after a reconnect
    pub fn reset(&mut self) {
        self.estimator.reset();
        self.lens = None;
        debug!(subject = %self.subject, "tracking session reset");
    }
}

/// Device axes (-z forward, x right, y up, metres) to engine axes
/// (x forward, y right, z up, centimetres)
pub fn camera_transform(packet: &StypePacket) -> CameraTransform {
    CameraTransform {
        location: Location {
            x: -f64::from(packet.z) * METRES_TO_CM,
            y: f64::from(packet.x) * METRES_TO_CM,
            z: f64::from(packet.y) * METRES_TO_CM,
        },
        rotation: Rotation {
            pitch: f64::from(packet.tilt),
            yaw: f64::from(packet.pan),
            roll: f64::from(packet.roll),
        },
    }
}

/// Per-frame lens block derived from the packet
pub fn lens_data(packet: &StypePacket) -> LensData {
    let fov = f64::from(packet.fov_x);
    let aspect_ratio = f64::from(packet.aspect_ratio);
    let pa_width = f64::from(packet.pa_width);
    let csx = f64::from(packet.center_shift_x);
    let csy = f64::from(packet.center_shift_y);

    let focal_length = pa_width / (2.0 * (fov.to_radians() * 0.5).tan());

    let (principal_point, fx_fy) = if pa_width != 0.0 {
        (
            Vector2 {
                x: -csx / pa_width + 0.5,
                y: csy * aspect_ratio / pa_width + 0.5,
            },
            Vector2 {
                x: focal_length / pa_width,
                y: focal_length / pa_width * aspect_ratio,
            },
        )
    } else {
        (Vector2 { x: 0.5, y: 0.5 }, Vector2::default())
    };

    LensData {
        field_of_view: fov,
        aspect_ratio,
        focal_length,
        focus_distance: f64::from(packet.focus) * METRES_TO_CM,
        focus: f64::from(packet.focus),
        zoom: f64::from(packet.zoom),
        k1: f64::from(packet.k1),
        k2: f64::from(packet.k2),
        center_shift: Vector2 { x: csx, y: csy },
        projection_area_width: pa_width,
        principal_point,
        fx_fy,
    }
}
