//! Pointer-driven pose animator.
//!
//! Pointer samples are mapped to a bounded (pitch, yaw) target and the bound
//! node eases toward it. There is a single transition slot: a new sample
//! replaces whatever was in flight, starting from the node's current pose.
//!
//! State: `Unbound -> Bound -> Animating -> Settled -> Animating ...`, with
//! `set_target(None)` returning to `Unbound` from anywhere.

use crate::Vec2;
use crate::config::PoseConfig;
use crate::scene::{NodeId, SceneGraph};

/// Pointer position normalized to [-1, 1] on both axes, +y up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSample {
    pub x: f32,
    pub y: f32,
}

impl PointerSample {
    /// Normalize a pixel position against the viewport size.
    ///
    /// Returns `None` for non-positive or non-finite viewport sizes and
    /// non-finite positions. Positions outside the viewport clamp to the edge.
    pub fn from_pixels(x_px: f32, y_px: f32, width: f32, height: f32) -> Option<Self> {
        let valid_extent = |v: f32| v.is_finite() && v > 0.0;
        if !valid_extent(width) || !valid_extent(height) {
            return None;
        }
        if !x_px.is_finite() || !y_px.is_finite() {
            return None;
        }
        let x = (x_px / width) * 2.0 - 1.0;
        let y = -(y_px / height) * 2.0 + 1.0;
        Some(Self {
            x: x.clamp(-1.0, 1.0),
            y: y.clamp(-1.0, 1.0),
        })
    }
}

/// Target orientation in radians. Pitch rotates about X, yaw about Y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotationTarget {
    pub pitch: f32,
    pub yaw: f32,
}

impl RotationTarget {
    /// Pointer up tilts the node back (negative pitch), pointer right turns it right.
    #[inline]
    pub fn from_sample(sample: PointerSample, scale: f32) -> Self {
        Self {
            pitch: -sample.y * scale,
            yaw: sample.x * scale,
        }
    }

    #[inline]
    fn as_vec2(self) -> Vec2 {
        Vec2::new(self.pitch, self.yaw)
    }
}

/// Quartic ease-out (`power3.out` in tweening libraries): fast start,
/// decelerates into 1.
#[inline]
pub fn ease_out_quart(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    let inv = 1.0 - t;
    1.0 - inv * inv * inv * inv
}

#[derive(Clone, Copy, Debug)]
struct Transition {
    from: Vec2,
    to: Vec2,
    elapsed: f32,
    duration: f32,
}

impl Transition {
    fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }

    fn value(&self) -> Vec2 {
        let p = self.progress();
        if p >= 1.0 {
            // Exact landing, no float drift from the lerp.
            return self.to;
        }
        self.from.lerp(self.to, ease_out_quart(p))
    }

    fn is_finished(&self) -> bool {
        self.progress() >= 1.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimatorState {
    Unbound,
    Bound,
    Animating,
    Settled,
}

#[derive(Debug)]
pub struct PoseAnimator {
    config: PoseConfig,
    node: Option<NodeId>,
    target: Option<RotationTarget>,
    transition: Option<Transition>,
}

impl PoseAnimator {
    pub fn new(config: PoseConfig) -> Self {
        Self {
            config,
            node: None,
            target: None,
            transition: None,
        }
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    /// Bind (or unbind with `None`) the node to animate. Any in-flight
    /// transition is dropped.
    pub fn set_target(&mut self, node: Option<NodeId>) {
        if self.node != node {
            log::debug!("Pose animator target: {:?} -> {:?}", self.node, node);
        }
        self.node = node;
        self.target = None;
        self.transition = None;
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Latest requested rotation, if any.
    pub fn target(&self) -> Option<RotationTarget> {
        self.target
    }

    pub fn state(&self) -> AnimatorState {
        match (self.node, self.transition, self.target) {
            (None, _, _) => AnimatorState::Unbound,
            (Some(_), Some(_), _) => AnimatorState::Animating,
            (Some(_), None, Some(_)) => AnimatorState::Settled,
            (Some(_), None, None) => AnimatorState::Bound,
        }
    }

    /// Feed a pointer position in pixels. Starts (or redirects) the eased
    /// transition when a node is bound and returns the new target.
    pub fn on_pointer_move(
        &mut self,
        x_px: f32,
        y_px: f32,
        viewport_width: f32,
        viewport_height: f32,
        scene: &SceneGraph,
    ) -> Option<RotationTarget> {
        let Some(sample) = PointerSample::from_pixels(x_px, y_px, viewport_width, viewport_height)
        else {
            log::trace!(
                "Ignoring pointer move with viewport {}x{}",
                viewport_width,
                viewport_height
            );
            return None;
        };

        let node = self.node?;
        let current = scene.transform(node)?.rotation_euler;
        let target = RotationTarget::from_sample(sample, self.config.scale);

        self.target = Some(target);
        self.transition = Some(Transition {
            from: Vec2::new(current.x, current.y),
            to: target.as_vec2(),
            elapsed: 0.0,
            duration: self.config.duration,
        });
        Some(target)
    }

    /// Advance the current transition by `dt` seconds and write the pose.
    pub fn tick(&mut self, dt: f32, scene: &mut SceneGraph) {
        let (Some(node), Some(tr)) = (self.node, self.transition.as_mut()) else {
            return;
        };
        if dt.is_finite() && dt > 0.0 {
            tr.elapsed += dt;
        }
        let pose = tr.value();
        let finished = tr.is_finished();

        let Some(t) = scene.transform_mut(node) else {
            self.transition = None;
            return;
        };
        t.rotation_euler.x = pose.x;
        t.rotation_euler.y = pose.y;

        if finished {
            self.transition = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Transform;

    const EPS: f32 = 1e-5;

    fn scene_with_face() -> (SceneGraph, NodeId) {
        let mut g = SceneGraph::new();
        let root = g.spawn(Some("Scene"), Transform::identity(), None);
        let face = g.spawn(Some("face"), Transform::identity(), Some(root));
        (g, face)
    }

    fn pose(g: &SceneGraph, id: NodeId) -> Vec2 {
        let r = g.transform(id).unwrap().rotation_euler;
        Vec2::new(r.x, r.y)
    }

    fn run_for(anim: &mut PoseAnimator, g: &mut SceneGraph, secs: f32) {
        let steps = (secs / 0.016).ceil() as usize;
        for _ in 0..steps {
            anim.tick(0.016, g);
        }
    }

    #[test]
    fn pixels_inside_viewport_normalize_into_unit_range() {
        let (w, h) = (800.0, 600.0);
        for xi in 0..=16 {
            for yi in 0..=12 {
                let s = PointerSample::from_pixels(xi as f32 * 50.0, yi as f32 * 50.0, w, h)
                    .expect("valid viewport");
                assert!((-1.0..=1.0).contains(&s.x), "x={}", s.x);
                assert!((-1.0..=1.0).contains(&s.y), "y={}", s.y);
            }
        }
    }

    #[test]
    fn viewport_edges_map_to_unit_corners() {
        let tl = PointerSample::from_pixels(0.0, 0.0, 800.0, 600.0).unwrap();
        assert_eq!((tl.x, tl.y), (-1.0, 1.0));
        let br = PointerSample::from_pixels(800.0, 600.0, 800.0, 600.0).unwrap();
        assert_eq!((br.x, br.y), (1.0, -1.0));
        let mid = PointerSample::from_pixels(400.0, 300.0, 800.0, 600.0).unwrap();
        assert_eq!((mid.x, mid.y), (0.0, 0.0));
    }

    #[test]
    fn degenerate_viewports_are_rejected() {
        assert!(PointerSample::from_pixels(10.0, 10.0, 0.0, 600.0).is_none());
        assert!(PointerSample::from_pixels(10.0, 10.0, 800.0, -1.0).is_none());
        assert!(PointerSample::from_pixels(10.0, 10.0, f32::NAN, 600.0).is_none());
        assert!(PointerSample::from_pixels(f32::INFINITY, 10.0, 800.0, 600.0).is_none());
    }

    #[test]
    fn zero_viewport_leaves_target_unchanged() {
        let (g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        anim.set_target(Some(face));
        let first = anim.on_pointer_move(800.0, 0.0, 800.0, 600.0, &g);
        assert!(first.is_some());

        assert_eq!(anim.on_pointer_move(100.0, 100.0, 0.0, 600.0, &g), None);
        assert_eq!(anim.on_pointer_move(100.0, 100.0, 800.0, -5.0, &g), None);
        assert_eq!(anim.target(), first);
    }

    #[test]
    fn target_is_bounded_by_scale() {
        let scale = PoseConfig::default().scale;
        for &(x, y) in &[
            (-5000.0, -5000.0),
            (0.0, 0.0),
            (123.0, 456.0),
            (800.0, 600.0),
            (99999.0, -99999.0),
        ] {
            let s = PointerSample::from_pixels(x, y, 800.0, 600.0).unwrap();
            let t = RotationTarget::from_sample(s, scale);
            assert!(t.pitch.abs() <= scale + EPS);
            assert!(t.yaw.abs() <= scale + EPS);
        }
    }

    #[test]
    fn corner_scenarios_match_expected_targets() {
        let (g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        let scale = anim.config().scale;
        anim.set_target(Some(face));

        let a = anim.on_pointer_move(800.0, 0.0, 800.0, 600.0, &g).unwrap();
        assert!((a.pitch + scale).abs() < EPS);
        assert!((a.yaw - scale).abs() < EPS);

        let b = anim.on_pointer_move(0.0, 600.0, 800.0, 600.0, &g).unwrap();
        assert!((b.pitch - scale).abs() < EPS);
        assert!((b.yaw + scale).abs() < EPS);
    }

    #[test]
    fn ease_out_shape() {
        assert_eq!(ease_out_quart(0.0), 0.0);
        assert_eq!(ease_out_quart(1.0), 1.0);
        let mut prev = 0.0;
        for i in 1..100 {
            let t = i as f32 / 100.0;
            let v = ease_out_quart(t);
            assert!(v > prev);
            assert!(v > t, "ease-out must lead the linear ramp at t={t}");
            prev = v;
        }
        assert_eq!(ease_out_quart(-3.0), 0.0);
        assert_eq!(ease_out_quart(7.0), 1.0);
        assert!((ease_out_quart(0.5) - 0.9375).abs() < 1e-6);
        assert!((ease_out_quart(0.25) - (1.0 - 0.75f32.powi(4))).abs() < 1e-6);
    }

    #[test]
    fn midpoint_of_full_swing_matches_quartic_curve() {
        let (mut g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        anim.set_target(Some(face));
        let t = anim.on_pointer_move(800.0, 300.0, 800.0, 600.0, &g).unwrap();
        assert!((t.yaw - 0.5).abs() < EPS);
        anim.tick(0.75, &mut g);
        assert!((pose(&g, face).y - 0.46875).abs() < EPS);
    }

    #[test]
    fn node_settles_on_target_after_duration() {
        let (mut g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        anim.set_target(Some(face));
        assert_eq!(anim.state(), AnimatorState::Bound);

        let t = anim.on_pointer_move(600.0, 150.0, 800.0, 600.0, &g).unwrap();
        assert_eq!(anim.state(), AnimatorState::Animating);

        anim.tick(0.75, &mut g);
        let half = pose(&g, face);
        // Quartic ease-out at p = 0.5: 1 - 0.5^4 = 0.9375 of the way.
        assert!((half.x - t.pitch * 0.9375).abs() < EPS);
        assert!((half.y - t.yaw * 0.9375).abs() < EPS);

        anim.tick(0.75, &mut g);
        let end = pose(&g, face);
        assert_eq!(end, Vec2::new(t.pitch, t.yaw));
        assert_eq!(anim.state(), AnimatorState::Settled);
    }

    #[test]
    fn newer_sample_supersedes_in_flight_transition() {
        let (mut g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        anim.set_target(Some(face));

        let first = anim.on_pointer_move(800.0, 0.0, 800.0, 600.0, &g).unwrap();
        anim.tick(0.1, &mut g);
        let second = anim.on_pointer_move(0.0, 600.0, 800.0, 600.0, &g).unwrap();

        let first = Vec2::new(first.pitch, first.yaw);
        let mut visited = Vec::new();
        for _ in 0..200 {
            anim.tick(0.016, &mut g);
            visited.push(pose(&g, face));
        }
        assert!(
            visited.iter().all(|p| (*p - first).length() > 0.1),
            "stale target was reached"
        );
        assert_eq!(visited.last().copied(), Some(Vec2::new(second.pitch, second.yaw)));
        assert_eq!(anim.target(), Some(second));
    }

    #[test]
    fn redirect_starts_from_current_pose() {
        let (mut g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        anim.set_target(Some(face));

        anim.on_pointer_move(800.0, 0.0, 800.0, 600.0, &g);
        anim.tick(0.3, &mut g);
        let before = pose(&g, face);
        anim.on_pointer_move(400.0, 300.0, 800.0, 600.0, &g);
        anim.tick(0.0, &mut g);
        assert!((pose(&g, face) - before).length() < EPS);
    }

    #[test]
    fn unbound_animator_never_mutates() {
        let (mut g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        for i in 0..50 {
            let r = anim.on_pointer_move(i as f32 * 16.0, i as f32 * 12.0, 800.0, 600.0, &g);
            assert!(r.is_none());
            anim.tick(0.1, &mut g);
        }
        assert_eq!(pose(&g, face), Vec2::ZERO);
        assert_eq!(anim.state(), AnimatorState::Unbound);
    }

    #[test]
    fn unbinding_drops_the_transition() {
        let (mut g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        anim.set_target(Some(face));
        anim.on_pointer_move(800.0, 0.0, 800.0, 600.0, &g);
        anim.tick(0.2, &mut g);
        let frozen = pose(&g, face);

        anim.set_target(None);
        assert_eq!(anim.state(), AnimatorState::Unbound);
        run_for(&mut anim, &mut g, 2.0);
        assert_eq!(pose(&g, face), frozen);
    }

    #[test]
    fn missing_node_is_a_silent_noop() {
        let (mut g, _) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig::default());
        anim.set_target(Some(NodeId(42)));
        assert!(anim.on_pointer_move(10.0, 10.0, 800.0, 600.0, &g).is_none());
        anim.tick(0.5, &mut g);
    }

    #[test]
    fn zero_duration_snaps_immediately() {
        let (mut g, face) = scene_with_face();
        let mut anim = PoseAnimator::new(PoseConfig {
            duration: 0.0,
            ..PoseConfig::default()
        });
        anim.set_target(Some(face));
        let t = anim.on_pointer_move(0.0, 0.0, 800.0, 600.0, &g).unwrap();
        anim.tick(0.0, &mut g);
        assert_eq!(pose(&g, face), Vec2::new(t.pitch, t.yaw));
        assert_eq!(anim.state(), AnimatorState::Settled);
    }
}
