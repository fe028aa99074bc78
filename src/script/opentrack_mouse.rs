//! Head tracker as a mouse: per-tick yaw and pitch change, smoothed, in
//! pixels per degree (`sensitivity`, default 10; `smoothing`, 0.2).

use super::android_mouse::smoothing;
use super::{Params, Script};
use crate::engine::Bindings;
use crate::error::Result;

const DEFAULT_SENSITIVITY: f64 = 10.0;
const DEFAULT_SMOOTHING: f64 = 0.2;

#[derive(Debug)]
pub struct OpentrackMouse {
    sensitivity: f64,
    smoothing: f64,
}

pub(crate) fn build(params: &Params<'_>, _bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    Ok(Box::new(OpentrackMouse {
        sensitivity: params.float("sensitivity", DEFAULT_SENSITIVITY)?,
        smoothing: smoothing(params, DEFAULT_SMOOTHING)?,
    }))
}

impl Script for OpentrackMouse {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let pose = ctx.opentrack.pose;
        let filters = &mut ctx.filters;

        let dyaw = filters.delta(pose.yaw, "yaw");
        let dpitch = filters.delta(pose.pitch, "pitch");
        let dyaw = filters.ema(dyaw, self.smoothing, "syaw")?;
        let dpitch = filters.ema(dpitch, self.smoothing, "spitch")?;

        ctx.mouse.x = (dyaw * self.sensitivity).round() as i32;
        ctx.mouse.y = (dpitch * self.sensitivity).round() as i32;
        Ok(())
    }
}
