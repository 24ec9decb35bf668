//! Animation clips: per-bone keyframe channels with linear sampling.
//!
//! Clips are the import-side representation; the GPU consumes the
//! fixed-resolution lookup tables built from them in [`super::lookup`].

use glam::{Quat, Vec3};

/// A single keyframe.
#[derive(Debug, Clone, Copy)]
pub struct Keyframe<T> {
    /// Keyframe time in seconds.
    pub time: f32,
    /// Keyframe value.
    pub value: T,
}

/// Keyframe channels of one bone in one clip. Any channel may be empty,
/// meaning the bone keeps its identity transform for that component.
#[derive(Debug, Clone, Default)]
pub struct BoneChannel {
    /// Translation keys.
    pub translations: Vec<Keyframe<Vec3>>,
    /// Rotation keys.
    pub rotations: Vec<Keyframe<Quat>>,
    /// Scale keys.
    pub scales: Vec<Keyframe<Vec3>>,
}

/// One animation clip of a model.
#[derive(Debug, Clone)]
pub struct AnimClip {
    /// Clip name from the source asset.
    pub name: String,
    /// Clip duration in seconds.
    pub duration: f32,
    /// Per-bone channels; `None` when the clip does not animate the bone.
    pub channels: Vec<Option<BoneChannel>>,
}

impl AnimClip {
    /// Sample the translation of `bone` at `time` (clamped to the key
    /// range), or the identity translation when the channel is empty.
    #[must_use]
    pub fn sample_translation(&self, bone: usize, time: f32) -> Vec3 {
        self.channels
            .get(bone)
            .and_then(Option::as_ref)
            .map_or(Vec3::ZERO, |c| {
                sample_keys(&c.translations, time, Vec3::ZERO, Vec3::lerp)
            })
    }

    /// Sample the rotation of `bone` at `time` via shortest-path slerp.
    #[must_use]
    pub fn sample_rotation(&self, bone: usize, time: f32) -> Quat {
        self.channels
            .get(bone)
            .and_then(Option::as_ref)
            .map_or(Quat::IDENTITY, |c| {
                sample_keys(&c.rotations, time, Quat::IDENTITY, |a, b, t| {
                    // Keep interpolation on the shorter arc.
                    let b = if a.dot(b) < 0.0 { -b } else { b };
                    a.slerp(b, t)
                })
            })
    }

    /// Sample the scale of `bone` at `time`.
    #[must_use]
    pub fn sample_scale(&self, bone: usize, time: f32) -> Vec3 {
        self.channels
            .get(bone)
            .and_then(Option::as_ref)
            .map_or(Vec3::ONE, |c| {
                sample_keys(&c.scales, time, Vec3::ONE, Vec3::lerp)
            })
    }
}

/// Interpolate between the two keys bracketing `time`. Times before the
/// first or after the last key clamp to the end values.
fn sample_keys<T: Copy>(
    keys: &[Keyframe<T>],
    time: f32,
    identity: T,
    interpolate: impl Fn(T, T, f32) -> T,
) -> T {
    let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
        return identity;
    };
    if time <= first.time {
        return first.value;
    }
    if time >= last.time {
        return last.value;
    }
    let next_idx = keys
        .partition_point(|k| k.time <= time)
        .min(keys.len() - 1);
    let prev = keys[next_idx - 1];
    let next = keys[next_idx];
    let span = next.time - prev.time;
    if span <= f32::EPSILON {
        return prev.value;
    }
    interpolate(prev.value, next.value, (time - prev.time) / span)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key<T>(time: f32, value: T) -> Keyframe<T> {
        Keyframe { time, value }
    }

    fn clip_with_translation() -> AnimClip {
        AnimClip {
            name: "walk".to_owned(),
            duration: 2.0,
            channels: vec![Some(BoneChannel {
                translations: vec![
                    key(0.0, Vec3::ZERO),
                    key(1.0, Vec3::new(0.0, 1.0, 0.0)),
                    key(2.0, Vec3::new(0.0, 1.0, 2.0)),
                ],
                ..BoneChannel::default()
            })],
        }
    }

    #[test]
    fn linear_interpolation_between_keys() {
        let clip = clip_with_translation();
        assert_eq!(clip.sample_translation(0, 0.5), Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(clip.sample_translation(0, 1.5), Vec3::new(0.0, 1.0, 1.0));
    }

    #[test]
    fn sampling_clamps_to_key_range() {
        let clip = clip_with_translation();
        assert_eq!(clip.sample_translation(0, -1.0), Vec3::ZERO);
        assert_eq!(clip.sample_translation(0, 5.0), Vec3::new(0.0, 1.0, 2.0));
    }

    #[test]
    fn empty_channel_samples_identity() {
        let clip = AnimClip {
            name: "idle".to_owned(),
            duration: 1.0,
            channels: vec![None],
        };
        assert_eq!(clip.sample_translation(0, 0.5), Vec3::ZERO);
        assert_eq!(clip.sample_rotation(0, 0.5), Quat::IDENTITY);
        assert_eq!(clip.sample_scale(0, 0.5), Vec3::ONE);
    }

    #[test]
    fn rotation_takes_shortest_arc() {
        let a = Quat::from_rotation_y(0.1);
        let b = -Quat::from_rotation_y(0.3);
        let clip = AnimClip {
            name: "turn".to_owned(),
            duration: 1.0,
            channels: vec![Some(BoneChannel {
                rotations: vec![key(0.0, a), key(1.0, b)],
                ..BoneChannel::default()
            })],
        };
        let mid = clip.sample_rotation(0, 0.5);
        let expected = Quat::from_rotation_y(0.2);
        assert!(mid.dot(expected).abs() > 0.999_9);
    }
}
