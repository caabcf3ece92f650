use std::path::PathBuf;

use ember_assets::AssetLoader;
use ember_common::EntityId;
use ember_ecs::{ComponentStore, Transform};
use ember_render::{
    FrameReport, GraphicsDevice, RenderError, SceneParameters, SceneStore, render_frame,
};
use glam::{Mat4, Quat, Vec3};

/// Asset paths the demo scene is built from, relative to the asset root.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneAssets {
    pub shader: String,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub floor_texture: PathBuf,
    pub mesh: PathBuf,
}

impl Default for SceneAssets {
    fn default() -> Self {
        Self {
            shader: "phong".into(),
            vertex_shader: "shaders/phong.vert.wgsl".into(),
            fragment_shader: "shaders/phong.frag.wgsl".into(),
            floor_texture: "textures/checker.tga".into(),
            mesh: "meshes/cube.obj".into(),
        }
    }
}

/// Rotation speed of the pivot, in radians per second.
const SPIN_RATE: f32 = 0.8;

/// Application context: the scene store, the component store and the
/// per-frame parameters. Owned by the entry point and handed to the loop.
#[derive(Debug)]
pub struct Game {
    scene: SceneStore,
    components: ComponentStore,
    params: SceneParameters,
    pivot: EntityId,
    angle: f32,
    frames: u64,
}

impl Game {
    /// Build the demo scene with the default asset layout.
    pub fn init(
        device: &mut dyn GraphicsDevice,
        assets: &AssetLoader,
        params: SceneParameters,
    ) -> Result<Self, RenderError> {
        Self::init_with(device, assets, params, &SceneAssets::default())
    }

    /// Load the shader, texture and meshes, then spawn a textured floor and
    /// a pivot carrying two cubes.
    pub fn init_with(
        device: &mut dyn GraphicsDevice,
        assets: &AssetLoader,
        params: SceneParameters,
        paths: &SceneAssets,
    ) -> Result<Self, RenderError> {
        let _span = tracing::info_span!("game_init", root = %assets.root().display()).entered();
        let mut scene = SceneStore::new();

        scene.load_shader(
            device,
            assets,
            &paths.shader,
            &paths.vertex_shader,
            &paths.fragment_shader,
        )?;
        let checker = scene.load_texture(device, assets, &paths.floor_texture)?;
        let plane = scene.create_plane_geometry(device)?;
        let cube = scene.create_geometry_from_obj(device, assets, &paths.mesh)?;

        let floor_material = scene.create_material(&paths.shader, Vec3::ONE, Some(checker));
        let body_material = scene.create_material(&paths.shader, Vec3::new(0.9, 0.35, 0.2), None);
        let moon_material = scene.create_material(&paths.shader, Vec3::new(0.3, 0.6, 0.95), None);

        let mut components = ComponentStore::new();

        let floor = components.spawn("floor");
        components.insert(
            floor,
            Transform::from_trs(
                Vec3::new(0.0, -1.0, 0.0),
                Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
                Vec3::splat(4.0),
            ),
        );
        components.attach_mesh(floor, plane, floor_material);

        let pivot = components.spawn("pivot");
        components.insert(pivot, Transform::default());

        let body = components.spawn("cube");
        components.insert(body, Transform::from_trs(Vec3::ZERO, Quat::IDENTITY, Vec3::splat(0.6)));
        components.attach_mesh(body, cube, body_material);
        components.set_parent(body, Some(pivot))?;

        let moon = components.spawn("moon");
        components.insert(
            moon,
            Transform::from_trs(Vec3::new(1.5, 0.0, 0.0), Quat::IDENTITY, Vec3::splat(0.25)),
        );
        components.attach_mesh(moon, cube, moon_material);
        components.set_parent(moon, Some(pivot))?;

        tracing::info!(
            entities = components.entity_count(),
            geometries = scene.geometry_count(),
            materials = scene.material_count(),
            "scene ready"
        );

        Ok(Self {
            scene,
            components,
            params,
            pivot,
            angle: 0.0,
            frames: 0,
        })
    }

    /// Advance the scene by `dt` seconds, render it and present.
    pub fn update(
        &mut self,
        device: &mut dyn GraphicsDevice,
        dt: f32,
    ) -> Result<FrameReport, RenderError> {
        self.angle = (self.angle + dt * SPIN_RATE) % std::f32::consts::TAU;
        self.components.get_mut::<Transform>(self.pivot)?.local = Mat4::from_rotation_y(self.angle);

        let report = render_frame(device, &self.scene, &self.components, &self.params)?;
        device.present()?;
        self.frames += 1;
        tracing::trace!(frame = self.frames, dt, drawn = report.drawn, "frame presented");
        Ok(report)
    }

    /// Release every device resource the scene holds.
    pub fn shutdown(&mut self, device: &mut dyn GraphicsDevice) {
        tracing::info!(frames = self.frames, "shutting down");
        self.scene.release(device);
    }

    pub fn scene(&self) -> &SceneStore {
        &self.scene
    }

    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
