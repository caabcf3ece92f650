//! The per-frame render pass.
//!
//! ```text
//! FrameStart -> Cleared -> per mesh { program -> uniforms -> texture unit 0
//!            -> vertex array -> draw -> unbind } -> FrameEnd
//! ```

use ember_common::EntityId;
use ember_common::math::{look_at, model_view_projection, normal_matrix, perspective};
use ember_ecs::{ComponentStore, Mesh, Transform};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::device::{GraphicsDevice, UniformValue};
use crate::error::RenderError;
use crate::scene::{Geometry, Material, SceneStore, Shader};

pub const U_MVP: &str = "u_mvp";
pub const U_MODEL: &str = "u_model";
pub const U_NORMAL_MATRIX: &str = "u_normal_matrix";
pub const U_LIGHT_POS: &str = "u_light_pos";
pub const U_CAM_POS: &str = "u_cam_pos";
pub const U_TEXTURE_DIFFUSE: &str = "u_texture_diffuse";
pub const U_GLOSSINESS: &str = "u_glossiness";
pub const U_DIFFUSE: &str = "u_diffuse";

/// Every uniform the pass uploads, in upload order.
pub const FRAME_UNIFORMS: [&str; 8] = [
    U_MVP,
    U_MODEL,
    U_NORMAL_MATRIX,
    U_LIGHT_POS,
    U_CAM_POS,
    U_TEXTURE_DIFFUSE,
    U_GLOSSINESS,
    U_DIFFUSE,
];

/// Texture unit the diffuse texture is bound to.
pub const DIFFUSE_TEXTURE_UNIT: u32 = 0;

/// Perspective camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees: 60.0,
            aspect: 1.0,
            near: 0.01,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        look_at(self.eye, self.target, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        perspective(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        )
    }
}

/// Per-frame constants shared by every draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneParameters {
    pub camera: Camera,
    pub light_position: Vec3,
    pub glossiness: f32,
    pub clear_color: [f32; 4],
}

impl Default for SceneParameters {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            light_position: Vec3::new(1000.0, 0.0, 1000.0),
            glossiness: 80.0,
            clear_color: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

/// A mesh left out of a frame, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedMesh {
    pub entity: EntityId,
    pub reason: String,
}

/// Outcome of one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    pub drawn: usize,
    pub skipped: Vec<SkippedMesh>,
}

/// What one draw needs, resolved before the device is touched.
struct DrawItem<'a> {
    material: &'a Material,
    geometry: &'a Geometry,
    shader: &'a Shader,
    model: Mat4,
}

/// Render one frame.
///
/// Meshes whose material, geometry, shader or transform cannot be resolved
/// are skipped and reported; the rest of the frame still draws. An error the
/// device raised during the frame is returned as
/// [`RenderError::GraphicsDevice`].
pub fn render_frame(
    device: &mut dyn GraphicsDevice,
    scene: &SceneStore,
    components: &ComponentStore,
    params: &SceneParameters,
) -> Result<FrameReport, RenderError> {
    device.clear(params.clear_color);

    let view = params.camera.view();
    let projection = params.camera.projection();
    let mut report = FrameReport::default();

    for (entity, mesh) in components.all::<Mesh>() {
        match resolve(scene, components, mesh) {
            Ok(item) => {
                draw(device, &item, view, projection, params);
                report.drawn += 1;
            }
            Err(err) => {
                tracing::warn!(
                    entity = %components.label(entity),
                    error = %err,
                    "skipping mesh"
                );
                report.skipped.push(SkippedMesh {
                    entity,
                    reason: err.to_string(),
                });
            }
        }
    }

    tracing::trace!(
        drawn = report.drawn,
        skipped = report.skipped.len(),
        "frame recorded"
    );

    match device.take_error() {
        Some(err) => Err(err.into()),
        None => Ok(report),
    }
}

fn resolve<'a>(
    scene: &'a SceneStore,
    components: &ComponentStore,
    mesh: &Mesh,
) -> Result<DrawItem<'a>, RenderError> {
    let material = scene.material(mesh.material)?;
    let geometry = scene.geometry(mesh.geometry)?;
    let shader = scene.shader(&material.shader)?;
    let model = components
        .get::<Transform>(mesh.owner)?
        .global_matrix(components.storage::<Transform>())?;
    Ok(DrawItem {
        material,
        geometry,
        shader,
        model,
    })
}

fn draw(
    device: &mut dyn GraphicsDevice,
    item: &DrawItem<'_>,
    view: Mat4,
    projection: Mat4,
    params: &SceneParameters,
) {
    device.use_program(Some(item.shader.program));

    let mvp = model_view_projection(projection, view, item.model);
    let values = [
        (U_MVP, UniformValue::Mat4(mvp)),
        (U_MODEL, UniformValue::Mat4(item.model)),
        (U_NORMAL_MATRIX, UniformValue::Mat4(normal_matrix(item.model))),
        (U_LIGHT_POS, UniformValue::Vec3(params.light_position)),
        (U_CAM_POS, UniformValue::Vec3(params.camera.eye)),
        (U_TEXTURE_DIFFUSE, UniformValue::Int(DIFFUSE_TEXTURE_UNIT as i32)),
        (U_GLOSSINESS, UniformValue::Float(params.glossiness)),
        (U_DIFFUSE, UniformValue::Vec3(item.material.diffuse)),
    ];
    for (name, value) in values {
        if let Some(location) = item.shader.location(name) {
            device.set_uniform(location, value);
        }
    }

    device.active_texture(DIFFUSE_TEXTURE_UNIT);
    device.bind_texture(item.material.texture);

    device.bind_vertex_array(Some(item.geometry.vertex_array));
    device.draw_indexed_triangles(item.geometry.triangle_count * 3);
    device.bind_vertex_array(None);
    device.use_program(None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Command, RecordingDevice};
    use ember_assets::{AssetLoader, TextureImage};
    use ember_ecs::{GeometryHandle, MaterialHandle};

    const VERTEX: &str = "\
let clip = uniforms.u_mvp * vec4<f32>(in.position, 1.0);
let world = uniforms.u_model * vec4<f32>(in.position, 1.0);
let n = uniforms.u_normal_matrix * vec4<f32>(in.normal, 0.0);
";
    const FRAGMENT: &str = "\
let l = normalize(uniforms.u_light_pos - in.world);
let v = normalize(uniforms.u_cam_pos - in.world);
let unit = uniforms.u_texture_diffuse;
let spec = pow(max(dot(r, v), 0.0), uniforms.u_glossiness);
let color = uniforms.u_diffuse;
";

    struct Fixture {
        _dir: tempfile::TempDir,
        device: RecordingDevice,
        scene: SceneStore,
        components: ComponentStore,
        plane: GeometryHandle,
        material: MaterialHandle,
    }

    fn fixture(vertex: &str, fragment: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("phong.vert"), vertex).unwrap();
        std::fs::write(dir.path().join("phong.frag"), fragment).unwrap();
        let assets = AssetLoader::new(dir.path());

        let mut device = RecordingDevice::new();
        let mut scene = SceneStore::new();
        scene
            .load_shader(&mut device, &assets, "phong", "phong.vert", "phong.frag")
            .unwrap();
        let plane = scene.create_plane_geometry(&mut device).unwrap();
        let material = scene.create_material("phong", Vec3::new(1.0, 0.5, 0.25), None);
        device.clear_commands();

        Fixture {
            _dir: dir,
            device,
            scene,
            components: ComponentStore::new(),
            plane,
            material,
        }
    }

    impl Fixture {
        fn spawn_mesh(
            &mut self,
            name: &str,
            transform: Transform,
            material: MaterialHandle,
        ) -> EntityId {
            let id = self.components.spawn(name);
            self.components.insert(id, transform);
            self.components.attach_mesh(id, self.plane, material);
            id
        }

        fn render(&mut self) -> Result<FrameReport, RenderError> {
            render_frame(
                &mut self.device,
                &self.scene,
                &self.components,
                &SceneParameters::default(),
            )
        }
    }

    #[test]
    fn defaults_match_fixed_constants() {
        let params = SceneParameters::default();
        assert_eq!(params.camera.eye, Vec3::new(0.0, 0.0, 3.0));
        assert_eq!(params.camera.target, Vec3::ZERO);
        assert_eq!(params.camera.up, Vec3::Y);
        assert_eq!(params.camera.fov_y_degrees, 60.0);
        assert_eq!(params.camera.aspect, 1.0);
        assert_eq!((params.camera.near, params.camera.far), (0.01, 100.0));
        assert_eq!(params.light_position, Vec3::new(1000.0, 0.0, 1000.0));
        assert_eq!(params.glossiness, 80.0);
    }

    #[test]
    fn single_plane_draws_once_with_fixed_camera() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let material = fx.material;
        fx.spawn_mesh("plane", Transform::default(), material);

        let report = fx.render().unwrap();
        assert_eq!(report.drawn, 1);
        assert!(report.skipped.is_empty());
        assert_eq!(fx.device.draws(), vec![6]);

        let expected = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.01, 100.0)
            * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y);
        match fx.device.uniform_values(U_MVP).as_slice() {
            [UniformValue::Mat4(mvp)] => assert!(mvp.abs_diff_eq(expected, 1e-6)),
            other => panic!("unexpected u_mvp uploads: {other:?}"),
        }
        assert_eq!(
            fx.device.uniform_values(U_MODEL),
            vec![UniformValue::Mat4(Mat4::IDENTITY)]
        );
        assert_eq!(
            fx.device.uniform_values(U_CAM_POS),
            vec![UniformValue::Vec3(Vec3::new(0.0, 0.0, 3.0))]
        );
        assert_eq!(
            fx.device.uniform_values(U_DIFFUSE),
            vec![UniformValue::Vec3(Vec3::new(1.0, 0.5, 0.25))]
        );
        assert_eq!(fx.device.uniform_values(U_TEXTURE_DIFFUSE), vec![UniformValue::Int(0)]);
        assert_eq!(fx.device.uniform_values(U_GLOSSINESS), vec![UniformValue::Float(80.0)]);
    }

    #[test]
    fn binds_state_in_fixed_order() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let material = fx.material;
        fx.spawn_mesh("plane", Transform::default(), material);
        fx.render().unwrap();

        let program = fx.scene.shader("phong").unwrap().program;
        let vao = fx.scene.geometry(fx.plane).unwrap().vertex_array;
        let commands = fx.device.commands();

        assert!(matches!(commands[0], Command::Clear { .. }));
        assert_eq!(commands[1], Command::UseProgram { program: Some(program) });
        let uniforms: Vec<&str> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(uniforms, FRAME_UNIFORMS.to_vec());

        let tail = &commands[2 + FRAME_UNIFORMS.len()..];
        assert_eq!(
            tail,
            &[
                Command::ActiveTexture { unit: 0 },
                Command::BindTexture { texture: None },
                Command::BindVertexArray { vertex_array: Some(vao) },
                Command::DrawIndexed { index_count: 6 },
                Command::BindVertexArray { vertex_array: None },
                Command::UseProgram { program: None },
            ]
        );
    }

    #[test]
    fn out_of_range_material_skips_only_that_mesh() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let material = fx.material;
        fx.spawn_mesh("a", Transform::default(), material);
        let bad = fx.spawn_mesh("bad", Transform::default(), MaterialHandle(99));
        fx.spawn_mesh("c", Transform::from_translation(Vec3::X), material);

        let report = fx.render().unwrap();
        assert_eq!(report.drawn, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].entity, bad);
        assert!(report.skipped[0].reason.contains("99"));
        assert_eq!(fx.device.draws(), vec![6, 6]);
    }

    #[test]
    fn skipped_mesh_leaves_no_partial_binds() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let orphan = fx.components.spawn("orphan");
        fx.components.attach_mesh(orphan, fx.plane, fx.material);

        let report = fx.render().unwrap();
        assert_eq!(report.drawn, 0);
        assert!(report.skipped[0].reason.contains("Transform"));
        assert_eq!(fx.device.commands().len(), 1);
    }

    #[test]
    fn missing_shader_and_geometry_are_skipped() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let unlit = fx.scene.create_material("unlit", Vec3::ONE, None);
        fx.spawn_mesh("no-shader", Transform::default(), unlit);
        let id = fx.components.spawn("no-geometry");
        fx.components.insert(id, Transform::default());
        fx.components.attach_mesh(id, GeometryHandle(7), fx.material);

        let report = fx.render().unwrap();
        assert_eq!(report.drawn, 0);
        let reasons: Vec<&str> = report.skipped.iter().map(|s| s.reason.as_str()).collect();
        assert!(reasons[0].contains("unlit"));
        assert!(reasons[1].contains('7'));
    }

    #[test]
    fn cyclic_transform_is_skipped() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let material = fx.material;
        let a = fx.spawn_mesh("a", Transform::default(), material);
        let b = fx.spawn_mesh("b", Transform::default(), material);
        // bypass set_parent to build a cycle
        fx.components.get_mut::<Transform>(a).unwrap().parent = Some(b);
        fx.components.get_mut::<Transform>(b).unwrap().parent = Some(a);

        let report = fx.render().unwrap();
        assert_eq!(report.drawn, 0);
        assert_eq!(report.skipped.len(), 2);
    }

    #[test]
    fn parent_transform_feeds_the_model_matrix() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let material = fx.material;
        let root = fx.components.spawn("root");
        fx.components
            .insert(root, Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)));
        let leaf = fx.spawn_mesh("leaf", Transform::from_translation(Vec3::X), material);
        fx.components.set_parent(leaf, Some(root)).unwrap();

        fx.render().unwrap();
        match fx.device.uniform_values(U_MODEL).as_slice() {
            [UniformValue::Mat4(model)] => {
                let origin = model.transform_point3(Vec3::ZERO);
                assert!(origin.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
            }
            other => panic!("unexpected u_model uploads: {other:?}"),
        }
    }

    #[test]
    fn undeclared_uniforms_are_not_uploaded() {
        let mut fx = fixture("uniforms.u_mvp", "uniforms.u_diffuse");
        let material = fx.material;
        fx.spawn_mesh("plane", Transform::default(), material);

        fx.render().unwrap();
        assert_eq!(fx.device.uniform_values(U_MVP).len(), 1);
        assert_eq!(fx.device.uniform_values(U_DIFFUSE).len(), 1);
        for name in [
            U_MODEL,
            U_NORMAL_MATRIX,
            U_LIGHT_POS,
            U_CAM_POS,
            U_TEXTURE_DIFFUSE,
            U_GLOSSINESS,
        ] {
            assert!(fx.device.uniform_values(name).is_empty(), "{name} uploaded");
        }
    }

    #[test]
    fn material_texture_is_bound_on_unit_zero() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let texture = fx
            .device
            .create_texture(&TextureImage::solid([255, 255, 255, 255]))
            .unwrap();
        let textured = fx.scene.create_material("phong", Vec3::ONE, Some(texture));
        fx.spawn_mesh("textured", Transform::default(), textured);
        fx.device.clear_commands();

        fx.render().unwrap();
        let commands = fx.device.commands();
        let unit = commands
            .iter()
            .position(|c| *c == Command::ActiveTexture { unit: 0 })
            .unwrap();
        assert_eq!(commands[unit + 1], Command::BindTexture { texture: Some(texture) });
    }

    #[test]
    fn device_error_fails_the_frame() {
        let mut fx = fixture(VERTEX, FRAGMENT);
        let material = fx.material;
        fx.spawn_mesh("plane", Transform::default(), material);
        fx.device.inject_error("GL_OUT_OF_MEMORY");

        let err = fx.render().unwrap_err();
        assert!(matches!(err, RenderError::GraphicsDevice(msg) if msg.contains("OUT_OF_MEMORY")));
        // the meshes were still drawn before the error was checked
        assert_eq!(fx.device.draws(), vec![6]);
    }
}
