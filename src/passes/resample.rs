use gltf::json::{
    accessor::{ComponentType, Type},
    animation::{Interpolation, Property},
    validation::Checked,
};
use log::{debug, info};
use serde_json::json;

use super::Transform;
use crate::{buffer, document::Document, error::Result};

/// Drops keyframes that the remaining ones reproduce within `tolerance`.
///
/// Only LINEAR and STEP samplers with float output are touched. Rotation
/// channels are compared against spherical interpolation.
pub struct Resample {
    pub tolerance: f32,
}

impl Transform for Resample {
    fn name(&self) -> &'static str {
        "resample"
    }

    fn apply(&self, doc: &mut Document) -> Result<()> {
        let mut before = 0;
        let mut after = 0;

        for a in 0..doc.root.animations.len() {
            for s in 0..doc.root.animations[a].samplers.len() {
                let anim = &doc.root.animations[a];
                let sampler = &anim.samplers[s];
                let interpolation = match sampler.interpolation {
                    Checked::Valid(i @ (Interpolation::Linear | Interpolation::Step)) => i,
                    _ => continue,
                };
                let rotation = anim.channels.iter().any(|c| {
                    c.sampler.value() == s && c.target.path == Checked::Valid(Property::Rotation)
                });
                let (input, output) = (sampler.input, sampler.output);

                let (times, values) = match (
                    buffer::read_f32(&doc.root, &doc.blob, input),
                    buffer::read_f32(&doc.root, &doc.blob, output),
                ) {
                    (Ok(t), Ok(v)) => (t, v),
                    (Err(e), _) | (_, Err(e)) => {
                        debug!("animation {a} sampler {s}: {e}, skipping");
                        continue;
                    }
                };
                if times.len() < 3 || values.len() % times.len() != 0 {
                    continue;
                }
                // morph weights are SCALAR with one element per target per key
                let width = values.len() / times.len();
                let out_type = match &doc.root.accessors[output.value()].type_ {
                    Checked::Valid(t) if width % t.multiplicity() == 0 => *t,
                    _ => {
                        debug!("animation {a} sampler {s}: output layout does not match its keys, skipping");
                        continue;
                    }
                };
                let keep = keyframes_to_keep(&times, &values, width, interpolation, rotation, self.tolerance);
                before += times.len();
                after += keep.len();
                if keep.len() == times.len() {
                    continue;
                }

                let n_times: Vec<f32> = keep.iter().map(|&k| times[k]).collect();
                let n_values: Vec<f32> = keep
                    .iter()
                    .flat_map(|&k| values[k * width..(k + 1) * width].iter().copied())
                    .collect();

                let n_input = buffer::push_accessor(
                    &mut doc.root,
                    &mut doc.blob,
                    input,
                    &buffer::f32_bytes(&n_times),
                    ComponentType::F32,
                    Type::Scalar,
                    false,
                    None,
                )?;
                let input_acc = &mut doc.root.accessors[n_input.value()];
                input_acc.min = Some(json!([n_times[0]]));
                input_acc.max = Some(json!([n_times[n_times.len() - 1]]));

                let n_output = buffer::push_accessor(
                    &mut doc.root,
                    &mut doc.blob,
                    output,
                    &buffer::f32_bytes(&n_values),
                    ComponentType::F32,
                    out_type,
                    false,
                    None,
                )?;

                let sampler = &mut doc.root.animations[a].samplers[s];
                sampler.input = n_input;
                sampler.output = n_output;
            }
        }

        if before > 0 {
            info!("resample: {before} keyframes -> {after}");
        }
        Ok(())
    }
}

/// Indices of the keyframes that must stay. The first and last always do.
fn keyframes_to_keep(
    times: &[f32],
    values: &[f32],
    width: usize,
    interpolation: Interpolation,
    rotation: bool,
    tolerance: f32,
) -> Vec<usize> {
    let value = |i: usize| &values[i * width..(i + 1) * width];
    let last = times.len() - 1;
    let mut keep = vec![0];

    for i in 1..last {
        let prev = keep[keep.len() - 1];
        let redundant = match interpolation {
            Interpolation::Step => close(value(i), value(prev), tolerance),
            _ => {
                let span = times[i + 1] - times[prev];
                let t = if span > 0.0 { (times[i] - times[prev]) / span } else { 0.0 };
                let expected = if rotation && width == 4 {
                    slerp(value(prev), value(i + 1), t)
                } else {
                    lerp(value(prev), value(i + 1), t)
                };
                close(value(i), &expected, tolerance)
            }
        };
        if !redundant {
            keep.push(i);
        }
    }
    keep.push(last);
    keep
}

fn close(a: &[f32], b: &[f32], tolerance: f32) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
}

fn lerp(a: &[f32], b: &[f32], t: f32) -> Vec<f32> {
    a.iter().zip(b).map(|(x, y)| x + (y - x) * t).collect()
}

fn slerp(a: &[f32], b: &[f32], t: f32) -> Vec<f32> {
    let mut dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mut b: Vec<f32> = b.to_vec();
    if dot < 0.0 {
        dot = -dot;
        b.iter_mut().for_each(|v| *v = -*v);
    }
    if dot > 0.9995 {
        let mut q = lerp(a, &b, t);
        let len = q.iter().map(|v| v * v).sum::<f32>().sqrt();
        if len > 0.0 {
            q.iter_mut().for_each(|v| *v /= len);
        }
        return q;
    }
    let theta = dot.acos();
    let sin = theta.sin();
    let wa = ((1.0 - t) * theta).sin() / sin;
    let wb = (t * theta).sin() / sin;
    a.iter().zip(&b).map(|(x, y)| x * wa + y * wb).collect()
}
