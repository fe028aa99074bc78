//! # Orientation Joystick
//!
//! Drives joystick axes from the angles of any orientation source: yaw to
//! X, pitch to Y, roll to Z. `range` degrees either side of centre reach
//! full deflection; radian sources (`ahrs`, `freeimu`) are converted first. Yaw is unwrapped and taken relative to the first
//! sample, so the starting heading is centre; pitch and roll are absolute.
//!
//! `source` selects `ahrs` (default), `freeimu`, `iphone`, `opentrack` or
//! `android` (phone `device`). The profile's `transports` list must enable
//! the same source.

use super::android_mouse::phone_index;
use super::{Params, Script};
use crate::engine::Bindings;
use crate::error::{BridgeError, Result};
use crate::filters::{AngleUnit, FilterBank};
use crate::input::Orientation;
use crate::output::codes::Axis;

const DEFAULT_RANGE: f64 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Ahrs,
    FreeImu,
    Iphone,
    Opentrack,
    Android(u8),
}

impl Source {
    /// Whether the transport reports angles in radians.
    fn is_radians(self) -> bool {
        matches!(self, Source::Ahrs | Source::FreeImu)
    }

    /// Current angles in degrees.
    fn degrees(self, ctx: &mut Bindings) -> Orientation {
        let angles = self.read(ctx);
        if !self.is_radians() {
            return angles;
        }
        Orientation {
            yaw: angles.yaw.to_degrees(),
            pitch: angles.pitch.to_degrees(),
            roll: angles.roll.to_degrees(),
        }
    }

    fn read(self, ctx: &mut Bindings) -> Orientation {
        match self {
            Source::Ahrs => ctx.ahrs.orientation,
            Source::FreeImu => ctx.freeimu.orientation,
            Source::Iphone => ctx.iphone.orientation,
            Source::Opentrack => Orientation {
                yaw: ctx.opentrack.pose.yaw,
                pitch: ctx.opentrack.pose.pitch,
                roll: ctx.opentrack.pose.roll,
            },
            Source::Android(index) => {
                let phone = ctx.android.device(index);
                Orientation {
                    yaw: phone.yaw,
                    pitch: phone.pitch,
                    roll: phone.roll,
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct OrientationJoystick {
    source: Source,
    range: f64,
    yaw_origin: Option<f64>,
}

pub(crate) fn build(params: &Params<'_>, _bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    let source = match params.string("source", "ahrs")? {
        "ahrs" => Source::Ahrs,
        "freeimu" => Source::FreeImu,
        "iphone" => Source::Iphone,
        "opentrack" => Source::Opentrack,
        "android" => Source::Android(phone_index(params)?),
        other => {
            return Err(BridgeError::Script(format!("unknown orientation source '{}'", other)))
        }
    };
    let range = params.float("range", DEFAULT_RANGE)?;
    if !(range > 0.0 && range <= 180.0) {
        return Err(BridgeError::Script(format!("range must be in (0, 180], got {}", range)));
    }

    Ok(Box::new(OrientationJoystick {
        source,
        range,
        yaw_origin: None,
    }))
}

impl Script for OrientationJoystick {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let angles = self.source.degrees(ctx);
        let yaw = ctx
            .filters
            .continuous_rotation(angles.yaw, AngleUnit::Degrees, "orientation-yaw");
        let origin = *self.yaw_origin.get_or_insert(yaw);

        for (axis, angle) in [
            (Axis::X, yaw - origin),
            (Axis::Y, angles.pitch),
            (Axis::Z, angles.roll),
        ] {
            let value = FilterBank::map_range_clamped(angle, -self.range, self.range, -1.0, 1.0);
            ctx.vjoy.set_axis(axis, value);
        }
        Ok(())
    }
}
