//! 4x4 column-major matrix utilities and the fixed-function transform state.
//!
//! The legacy draw API exposes a GL-style matrix-stack model: callers set a
//! projection and a modelview matrix and push/pop both around nested draws.
//! State setters mutate [`TransformState`]; only the draw facade reads the
//! combined matrix, once per draw call, when filling the push-constant block.

/// Column-major 4x4 matrix, `m[column * 4 + row]`.
pub type Mat4 = [f32; 16];

/// Maximum save/restore depth for each matrix stack.
pub const MAX_MATRIX_STACK: usize = 8;

/// Identity matrix.
pub fn mat4_identity() -> Mat4 {
    let mut m = [0.0; 16];
    m[0] = 1.0;
    m[5] = 1.0;
    m[10] = 1.0;
    m[15] = 1.0;
    m
}

/// Orthographic projection with the legacy GL element layout.
pub fn mat4_ortho(l: f32, r: f32, b: f32, t: f32, n: f32, f: f32) -> Mat4 {
    let mut m = [0.0; 16];
    m[0] = 2.0 / (r - l);
    m[5] = 2.0 / (t - b);
    m[10] = -2.0 / (f - n);
    m[12] = -(r + l) / (r - l);
    m[13] = -(t + b) / (t - b);
    m[14] = -(f + n) / (f - n);
    m[15] = 1.0;
    m
}

/// Perspective projection; `fovy_deg` is the vertical field of view in degrees.
pub fn mat4_perspective(fovy_deg: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut m = [0.0; 16];
    let fovy_rad = fovy_deg.to_radians();
    let f = 1.0 / (fovy_rad / 2.0).tan();
    m[0] = f / aspect;
    m[5] = f;
    m[10] = (far + near) / (near - far);
    m[11] = -1.0;
    m[14] = (2.0 * far * near) / (near - far);
    m
}

/// Matrix product `a * b` (column-major).
pub fn mat4_multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [0.0; 16];
    for i in 0..4 {
        for j in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[k * 4 + i] * b[j * 4 + k];
            }
            out[j * 4 + i] = sum;
        }
    }
    out
}

/// Fixed-function matrix state: projection, modelview, their cached product,
/// and bounded save/restore stacks for both.
///
/// Push on a full stack and pop on an empty stack are no-ops, matching the
/// permissive behavior legacy callers expect from the GL matrix stack.
pub struct TransformState {
    projection: Mat4,
    modelview: Mat4,
    mvp: Mat4,
    projection_stack: Vec<Mat4>,
    modelview_stack: Vec<Mat4>,
}

impl TransformState {
    pub fn new() -> Self {
        Self {
            projection: mat4_identity(),
            modelview: mat4_identity(),
            mvp: mat4_identity(),
            projection_stack: Vec::with_capacity(MAX_MATRIX_STACK),
            modelview_stack: Vec::with_capacity(MAX_MATRIX_STACK),
        }
    }

    /// The combined projection * modelview matrix pushed to the GPU per draw.
    pub fn mvp(&self) -> &Mat4 {
        &self.mvp
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn modelview(&self) -> &Mat4 {
        &self.modelview
    }

    pub fn set_projection(&mut self, m: Mat4) {
        self.projection = m;
        self.update_mvp();
    }

    pub fn set_modelview(&mut self, m: Mat4) {
        self.modelview = m;
        self.update_mvp();
    }

    pub fn set_ortho(&mut self, l: f32, r: f32, b: f32, t: f32, n: f32, f: f32) {
        self.set_projection(mat4_ortho(l, r, b, t, n, f));
    }

    pub fn set_perspective(&mut self, fovy_deg: f32, aspect: f32, near: f32, far: f32) {
        self.set_projection(mat4_perspective(fovy_deg, aspect, near, far));
    }

    pub fn load_identity_modelview(&mut self) {
        self.set_modelview(mat4_identity());
    }

    /// Multiply the modelview by `m` on the right, as the legacy
    /// glMultMatrix-style callers do.
    pub fn mult_modelview(&mut self, m: &Mat4) {
        self.modelview = mat4_multiply(&self.modelview, m);
        self.update_mvp();
    }

    pub fn push_projection(&mut self) {
        if self.projection_stack.len() < MAX_MATRIX_STACK {
            self.projection_stack.push(self.projection);
        }
    }

    pub fn pop_projection(&mut self) {
        if let Some(m) = self.projection_stack.pop() {
            self.projection = m;
            self.update_mvp();
        }
    }

    pub fn push_modelview(&mut self) {
        if self.modelview_stack.len() < MAX_MATRIX_STACK {
            self.modelview_stack.push(self.modelview);
        }
    }

    pub fn pop_modelview(&mut self) {
        if let Some(m) = self.modelview_stack.pop() {
            self.modelview = m;
            self.update_mvp();
        }
    }

    fn update_mvp(&mut self) {
        self.mvp = mat4_multiply(&self.projection, &self.modelview);
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Matrix functions
    // ============================================================

    #[test]
    fn test_identity_diagonal() {
        let m = mat4_identity();
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_eq!(m[j * 4 + i], expected);
            }
        }
    }

    #[test]
    fn test_multiply_identity() {
        let a = mat4_perspective(90.0, 1.0, 0.1, 5000.0);
        let i = mat4_identity();
        assert_eq!(mat4_multiply(&a, &i), a);
        assert_eq!(mat4_multiply(&i, &a), a);
    }

    #[test]
    fn test_multiply_translation_chain() {
        // Two translations compose by adding their offsets.
        let mut ta = mat4_identity();
        ta[12] = 1.0;
        ta[13] = 2.0;
        let mut tb = mat4_identity();
        tb[12] = 3.0;
        tb[14] = -1.0;
        let m = mat4_multiply(&ta, &tb);
        assert_eq!(m[12], 4.0);
        assert_eq!(m[13], 2.0);
        assert_eq!(m[14], -1.0);
    }

    #[test]
    fn test_ortho_unit_cube() {
        // The 2D screen projection used after a 3D scene closes.
        let m = mat4_ortho(0.0, 1.0, 0.0, 1.0, -1.0, 1.0);
        assert_eq!(m[0], 2.0);
        assert_eq!(m[5], 2.0);
        assert_eq!(m[10], -1.0);
        assert_eq!(m[12], -1.0);
        assert_eq!(m[13], -1.0);
        assert_eq!(m[14], 0.0);
        assert_eq!(m[15], 1.0);
    }

    #[test]
    fn test_ortho_maps_corners() {
        // (0,0) -> (-1,-1), (1,1) -> (1,1)
        let m = mat4_ortho(0.0, 1.0, 0.0, 1.0, -1.0, 1.0);
        let map = |x: f32, y: f32| (m[0] * x + m[12], m[5] * y + m[13]);
        assert_eq!(map(0.0, 0.0), (-1.0, -1.0));
        assert_eq!(map(1.0, 1.0), (1.0, 1.0));
        assert_eq!(map(0.5, 0.5), (0.0, 0.0));
    }

    #[test]
    fn test_perspective_elements() {
        let m = mat4_perspective(90.0, 1.0, 0.1, 5000.0);
        // tan(45 deg) == 1, so the focal term is 1 at fovy 90.
        assert!((m[0] - 1.0).abs() < 1e-6);
        assert!((m[5] - 1.0).abs() < 1e-6);
        assert_eq!(m[11], -1.0);
        assert_eq!(m[15], 0.0);
        assert!((m[10] - (5000.1 / -4999.9)).abs() < 1e-4);
    }

    #[test]
    fn test_perspective_aspect_scales_x() {
        let m = mat4_perspective(90.0, 2.0, 1.0, 100.0);
        assert!((m[0] - 0.5).abs() < 1e-6);
        assert!((m[5] - 1.0).abs() < 1e-6);
    }

    // ============================================================
    // TransformState
    // ============================================================

    #[test]
    fn test_mvp_is_projection_times_modelview() {
        let mut ts = TransformState::new();
        let p = mat4_perspective(90.0, 1.0, 0.1, 5000.0);
        let mut mv = mat4_identity();
        mv[12] = 5.0;
        ts.set_projection(p);
        ts.set_modelview(mv);
        assert_eq!(*ts.mvp(), mat4_multiply(&p, &mv));
    }

    #[test]
    fn test_push_pop_restores_modelview() {
        let mut ts = TransformState::new();
        let mut mv = mat4_identity();
        mv[12] = 7.0;
        ts.set_modelview(mv);
        ts.push_modelview();
        ts.load_identity_modelview();
        assert_eq!(*ts.modelview(), mat4_identity());
        ts.pop_modelview();
        assert_eq!(*ts.modelview(), mv);
    }

    #[test]
    fn test_pop_updates_mvp() {
        let mut ts = TransformState::new();
        ts.set_ortho(0.0, 1.0, 0.0, 1.0, -1.0, 1.0);
        ts.push_projection();
        ts.set_projection(mat4_identity());
        ts.pop_projection();
        assert_eq!(*ts.mvp(), mat4_ortho(0.0, 1.0, 0.0, 1.0, -1.0, 1.0));
    }

    #[test]
    fn test_pop_empty_stack_is_noop() {
        let mut ts = TransformState::new();
        let mut mv = mat4_identity();
        mv[13] = 3.0;
        ts.set_modelview(mv);
        ts.pop_modelview();
        ts.pop_projection();
        assert_eq!(*ts.modelview(), mv);
    }

    #[test]
    fn test_push_beyond_depth_is_noop() {
        let mut ts = TransformState::new();
        for i in 0..MAX_MATRIX_STACK {
            let mut m = mat4_identity();
            m[12] = i as f32;
            ts.set_modelview(m);
            ts.push_modelview();
        }
        // Ninth push is dropped; pops walk back through the eight saved.
        let mut overflow = mat4_identity();
        overflow[12] = 99.0;
        ts.set_modelview(overflow);
        ts.push_modelview();

        ts.pop_modelview();
        assert_eq!(ts.modelview()[12], (MAX_MATRIX_STACK - 1) as f32);
    }

    #[test]
    fn test_mult_modelview_applies_on_right() {
        let mut ts = TransformState::new();
        let mut a = mat4_identity();
        a[12] = 1.0;
        let mut b = mat4_identity();
        b[13] = 2.0;
        ts.set_modelview(a);
        ts.mult_modelview(&b);
        assert_eq!(*ts.modelview(), mat4_multiply(&a, &b));
    }
}
