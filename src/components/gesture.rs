// ============================================================================
// GESTURE TRANSFORM: multi-contact pan / pinch-zoom / rotate for overlays
// ============================================================================

use crate::canvas::RasterSurface;
use crate::ops::transform::Affine;

/// Host-assigned identifier of one pointer / touch contact.
pub type ContactId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn midpoint(&self, other: Point) -> Point {
        Point::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }

    /// Angle of the vector `self → other`, in degrees.
    pub fn angle_deg_to(&self, other: Point) -> f64 {
        (other.y - self.y).atan2(other.x - self.x).to_degrees()
    }
}

/// Wrap an angle difference into (−180°, 180°].
fn normalize_delta_deg(delta: f64) -> f64 {
    let d = delta.rem_euclid(360.0);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Scale limits and discrete step sizes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureLimits {
    pub min_scale: f64,
    pub max_scale: f64,
    pub zoom_in_step: f64,
    pub zoom_out_step: f64,
    pub rotate_step_deg: f64,
}

impl Default for GestureLimits {
    fn default() -> Self {
        Self {
            min_scale: 0.05,
            max_scale: 20.0,
            zoom_in_step: 1.08,
            zoom_out_step: 0.92,
            rotate_step_deg: 15.0,
        }
    }
}

/// Placement of an overlay image in viewport coordinates.  `(tx, ty)` is
/// the top-left of the unrotated, scaled image; rotation is about its
/// center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayTransform {
    pub tx: f64,
    pub ty: f64,
    pub scale: f64,
    pub rotation_deg: f64,
}

impl Default for OverlayTransform {
    fn default() -> Self {
        Self { tx: 0.0, ty: 0.0, scale: 1.0, rotation_deg: 0.0 }
    }
}

impl OverlayTransform {
    /// Map source pixel space of a `width × height` image to the viewport:
    /// `T(tx + w·s/2, ty + h·s/2) · R · T(−w·s/2, −h·s/2) · S(s)`.
    pub fn to_affine(&self, width: u32, height: u32) -> Affine {
        let hw = width as f64 * self.scale * 0.5;
        let hh = height as f64 * self.scale * 0.5;
        Affine::translate(self.tx + hw, self.ty + hh)
            .then_apply(&Affine::rotate_deg(self.rotation_deg))
            .then_apply(&Affine::translate(-hw, -hh))
            .then_apply(&Affine::scale(self.scale))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GesturePhase {
    Idle,
    OneContact { reference: Point },
    TwoPlusContact { distance: f64, midpoint: Point, angle_deg: f64 },
}

/// State machine turning contact events into an [`OverlayTransform`].
///
/// Contacts are kept in arrival order; the two oldest are the primary pair
/// for pinch and rotate.  Every change in contact count re-derives the
/// baseline from the current positions, so nothing measured before the
/// transition leaks into the next frame.
#[derive(Clone, Debug)]
pub struct GestureTransformController {
    contacts: Vec<(ContactId, Point)>,
    phase: GesturePhase,
    transform: OverlayTransform,
    limits: GestureLimits,
    viewport: (f64, f64),
}

impl GestureTransformController {
    /// Fit a `width × height` image into the viewport (never upscaling) and
    /// center it.
    pub fn new(image_size: (u32, u32), viewport: (f64, f64), limits: GestureLimits) -> Self {
        let (iw, ih) = (image_size.0.max(1) as f64, image_size.1.max(1) as f64);
        let (vw, vh) = viewport;
        let fit = (vw / iw).min(vh / ih).min(1.0);
        let scale = if fit.is_finite() && fit > 0.0 { fit } else { 1.0 };
        let scale = scale.clamp(limits.min_scale, limits.max_scale);
        let transform = OverlayTransform {
            tx: (vw - iw * scale) * 0.5,
            ty: (vh - ih * scale) * 0.5,
            scale,
            rotation_deg: 0.0,
        };
        Self::with_transform(transform, viewport, limits)
    }

    pub fn with_transform(mut transform: OverlayTransform, viewport: (f64, f64), limits: GestureLimits) -> Self {
        transform.scale = transform.scale.clamp(limits.min_scale, limits.max_scale);
        Self {
            contacts: Vec::new(),
            phase: GesturePhase::Idle,
            transform,
            limits,
            viewport,
        }
    }

    pub fn transform(&self) -> OverlayTransform {
        self.transform
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn limits(&self) -> &GestureLimits {
        &self.limits
    }

    // ---- contacts -----------------------------------------------------------

    /// A known id is treated as a move to the new position.
    pub fn pointer_down(&mut self, id: ContactId, p: Point) {
        if self.contacts.iter().any(|(cid, _)| *cid == id) {
            self.pointer_move(id, p);
            return;
        }
        self.contacts.push((id, p));
        self.rebaseline();
    }

    pub fn pointer_move(&mut self, id: ContactId, p: Point) {
        let Some(slot) = self.contacts.iter_mut().find(|(cid, _)| *cid == id) else {
            return;
        };
        slot.1 = p;

        match self.phase {
            GesturePhase::Idle => {}
            GesturePhase::OneContact { reference } => {
                self.transform.tx += p.x - reference.x;
                self.transform.ty += p.y - reference.y;
                self.phase = GesturePhase::OneContact { reference: p };
            }
            GesturePhase::TwoPlusContact { distance, angle_deg, .. } => {
                let (a, b) = (self.contacts[0].1, self.contacts[1].1);
                let new_distance = a.distance(b);
                let new_midpoint = a.midpoint(b);
                let new_angle = a.angle_deg_to(b);

                // Scale about the new midpoint
                if distance > 0.0 && new_distance > 0.0 {
                    self.zoom_about(new_midpoint, new_distance / distance);
                }
                self.transform.rotation_deg += normalize_delta_deg(new_angle - angle_deg);

                self.phase = GesturePhase::TwoPlusContact {
                    distance: new_distance,
                    midpoint: new_midpoint,
                    angle_deg: new_angle,
                };
            }
        }
    }

    /// Unknown ids are ignored.
    pub fn pointer_up(&mut self, id: ContactId) {
        let before = self.contacts.len();
        self.contacts.retain(|(cid, _)| *cid != id);
        if self.contacts.len() != before {
            self.rebaseline();
        }
    }

    fn rebaseline(&mut self) {
        self.phase = match self.contacts.as_slice() {
            [] => GesturePhase::Idle,
            [(_, only)] => GesturePhase::OneContact { reference: *only },
            [(_, a), (_, b), ..] => GesturePhase::TwoPlusContact {
                distance: a.distance(*b),
                midpoint: a.midpoint(*b),
                angle_deg: a.angle_deg_to(*b),
            },
        };
    }

    // ---- discrete controls --------------------------------------------------

    /// Negative sign zooms in about `focal`, positive zooms out, zero (or
    /// NaN) does nothing.
    pub fn wheel(&mut self, delta_sign: f64, focal: Point) {
        if delta_sign < 0.0 {
            self.zoom_about(focal, self.limits.zoom_in_step);
        } else if delta_sign > 0.0 {
            self.zoom_about(focal, self.limits.zoom_out_step);
        }
    }

    pub fn zoom_in(&mut self) {
        self.zoom_about(self.viewport_center(), self.limits.zoom_in_step);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_about(self.viewport_center(), self.limits.zoom_out_step);
    }

    pub fn rotate_left(&mut self) {
        self.transform.rotation_deg -= self.limits.rotate_step_deg;
    }

    pub fn rotate_right(&mut self) {
        self.transform.rotation_deg += self.limits.rotate_step_deg;
    }

    fn viewport_center(&self) -> Point {
        Point::new(self.viewport.0 * 0.5, self.viewport.1 * 0.5)
    }

    /// Scale by `factor` (clamped) keeping the viewport point `focal` fixed.
    fn zoom_about(&mut self, focal: Point, factor: f64) {
        if !(factor > 0.0) || !factor.is_finite() {
            return;
        }
        let old_scale = self.transform.scale;
        let new_scale = (old_scale * factor).clamp(self.limits.min_scale, self.limits.max_scale);
        let ratio = new_scale / old_scale;
        self.transform.tx = focal.x - (focal.x - self.transform.tx) * ratio;
        self.transform.ty = focal.y - (focal.y - self.transform.ty) * ratio;
        self.transform.scale = new_scale;
    }
}

// ============================================================================
// IMAGE OVERLAY: a floating image awaiting commit
// ============================================================================

/// An inserted image being positioned before it is committed to a layer.
#[derive(Clone, Debug)]
pub struct ImageOverlay {
    pub source: RasterSurface,
    pub controller: GestureTransformController,
}

impl ImageOverlay {
    pub fn new(source: RasterSurface, viewport: (f64, f64), limits: GestureLimits) -> Self {
        let controller = GestureTransformController::new(source.dimensions(), viewport, limits);
        Self { source, controller }
    }

    /// Source pixel space → viewport.
    pub fn affine(&self) -> Affine {
        self.controller.transform().to_affine(self.source.width(), self.source.height())
    }

    /// The source-image coordinate currently under a viewport point.
    pub fn image_point_at(&self, p: Point) -> Option<Point> {
        let (x, y) = self.affine().inverse()?.apply(p.x, p.y);
        Some(Point::new(x, y))
    }
}
