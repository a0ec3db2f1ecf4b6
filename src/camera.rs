//! A yaw/pitch camera and its perspective projection.
//!
//! # Key types
//! - [`Camera`]: position plus yaw and pitch, producing a right-handed view matrix
//! - [`Projection`]: field of view, aspect ratio and clip planes
//! - [`view_projection`]: the packed matrix pipelines push per draw

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3, perspective};

/// Converts cgmath's OpenGL clip space (z in -1..1) to wgpu's (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
}

impl Camera {
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
        }
    }

    pub fn forward(&self) -> Vector3<f32> {
        let (sin_pitch, cos_pitch) = self.pitch.0.sin_cos();
        let (sin_yaw, cos_yaw) = self.yaw.0.sin_cos();
        Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize()
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }
}

impl Default for Camera {
    /// Ten units back on +z, looking at the origin.
    fn default() -> Self {
        Self::new((0.0, 0.0, 10.0), cgmath::Deg(-90.0), cgmath::Deg(0.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

pub fn view_projection(camera: &Camera, projection: &Projection) -> [[f32; 4]; 4] {
    (projection.calc_matrix() * camera.calc_matrix()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Vector4};

    #[test]
    fn default_camera_looks_down_negative_z() {
        let forward = Camera::default().forward();
        assert!((forward - Vector3::new(0.0, 0.0, -1.0)).magnitude() < 1e-5);
    }

    #[test]
    fn origin_projects_into_the_unit_depth_range() {
        let camera = Camera::default();
        let projection = Projection::new(800, 600, Deg(45.0), 0.1, 100.0);
        let clip = Matrix4::from(view_projection(&camera, &projection)) * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
