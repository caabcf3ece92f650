use std::collections::BTreeMap;
use std::path::Path;

use ember_assets::{AssetLoader, MeshData, primitives};
use ember_ecs::{GeometryHandle, MaterialHandle};
use glam::Vec3;

use crate::device::{
    DeviceError, GraphicsDevice, ProgramId, TextureId, UniformLocation, VertexArrayId,
};
use crate::error::RenderError;
use crate::pass::FRAME_UNIFORMS;

/// Uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub vertex_array: VertexArrayId,
    pub triangle_count: u32,
    pub vertex_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Name of the shader in the scene store.
    pub shader: String,
    pub diffuse: Vec3,
    pub texture: Option<TextureId>,
}

/// Linked program and the frame uniforms it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    pub program: ProgramId,
    uniforms: BTreeMap<&'static str, UniformLocation>,
}

impl Shader {
    /// Location of a uniform, or `None` if the program does not declare it.
    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.uniforms.keys().copied()
    }
}

/// Owns every GPU resource of the scene: geometries, materials, shaders
/// and textures.
///
/// Geometries and materials are append-only; their handles are indices and
/// stay valid until [`SceneStore::release`].
#[derive(Debug, Default)]
pub struct SceneStore {
    geometries: Vec<Geometry>,
    materials: Vec<Material>,
    shaders: BTreeMap<String, Shader>,
    textures: Vec<TextureId>,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and upload an indexed triangle mesh.
    ///
    /// `uvs` and `normals` are either empty (zero-filled) or hold exactly
    /// one entry per position.
    pub fn create_geometry(
        &mut self,
        device: &mut dyn GraphicsDevice,
        positions: &[[f32; 3]],
        uvs: &[[f32; 2]],
        normals: &[[f32; 3]],
        indices: &[u32],
    ) -> Result<GeometryHandle, RenderError> {
        let vertex_count = positions.len();
        if indices.is_empty() {
            return Err(RenderError::InvalidGeometry("geometry has no triangles".into()));
        }
        if indices.len() % 3 != 0 {
            return Err(RenderError::InvalidGeometry(format!(
                "{} indices is not a whole number of triangles",
                indices.len()
            )));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(RenderError::InvalidGeometry(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }
        let uvs = per_vertex(uvs, vertex_count, "uv")?;
        let normals = per_vertex(normals, vertex_count, "normal")?;

        let mesh = MeshData {
            positions: positions.to_vec(),
            uvs,
            normals,
            indices: indices.to_vec(),
        };
        let vertex_array = device.create_vertex_array(&mesh)?;
        let handle = GeometryHandle(self.geometries.len());
        self.geometries.push(Geometry {
            vertex_array,
            triangle_count: mesh.triangle_count() as u32,
            vertex_count: vertex_count as u32,
        });
        tracing::debug!(
            geometry = handle.0,
            vertices = vertex_count,
            triangles = mesh.triangle_count(),
            "created geometry"
        );
        Ok(handle)
    }

    pub fn create_geometry_from_mesh(
        &mut self,
        device: &mut dyn GraphicsDevice,
        mesh: &MeshData,
    ) -> Result<GeometryHandle, RenderError> {
        self.create_geometry(device, &mesh.positions, &mesh.uvs, &mesh.normals, &mesh.indices)
    }

    /// The built-in unit quad.
    pub fn create_plane_geometry(
        &mut self,
        device: &mut dyn GraphicsDevice,
    ) -> Result<GeometryHandle, RenderError> {
        self.create_geometry_from_mesh(device, &primitives::plane())
    }

    pub fn create_geometry_from_obj(
        &mut self,
        device: &mut dyn GraphicsDevice,
        assets: &AssetLoader,
        path: impl AsRef<Path>,
    ) -> Result<GeometryHandle, RenderError> {
        let mesh = assets.load_obj(path)?;
        self.create_geometry_from_mesh(device, &mesh)
    }

    pub fn create_material(
        &mut self,
        shader: impl Into<String>,
        diffuse: Vec3,
        texture: Option<TextureId>,
    ) -> MaterialHandle {
        let handle = MaterialHandle(self.materials.len());
        self.materials.push(Material {
            shader: shader.into(),
            diffuse,
            texture,
        });
        handle
    }

    /// Read, compile and link a shader, registering it under `name`.
    ///
    /// A shader already registered under `name` is replaced and its
    /// program deleted.
    pub fn load_shader(
        &mut self,
        device: &mut dyn GraphicsDevice,
        assets: &AssetLoader,
        name: &str,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<ProgramId, RenderError> {
        let vertex_source = assets.read_to_string(vertex_path)?;
        let fragment_source = assets.read_to_string(fragment_path)?;

        let program = device
            .create_program(name, &vertex_source, &fragment_source)
            .map_err(|err| match err {
                DeviceError::Compile(log) => RenderError::ShaderCompile {
                    name: name.to_owned(),
                    log,
                },
                other => other.into(),
            })?;

        let uniforms = FRAME_UNIFORMS
            .iter()
            .filter_map(|&u| device.uniform_location(program, u).map(|loc| (u, loc)))
            .collect::<BTreeMap<_, _>>();
        tracing::info!(shader = name, uniforms = uniforms.len(), "loaded shader");

        if let Some(old) = self
            .shaders
            .insert(name.to_owned(), Shader { program, uniforms })
        {
            tracing::debug!(shader = name, "replacing shader");
            device.delete_program(old.program);
        }
        Ok(program)
    }

    /// Decode the image at `path` and upload it.
    pub fn load_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        assets: &AssetLoader,
        path: impl AsRef<Path>,
    ) -> Result<TextureId, RenderError> {
        let image = assets.load_texture(path)?;
        let texture = device.create_texture(&image)?;
        self.textures.push(texture);
        Ok(texture)
    }

    pub fn geometry(&self, handle: GeometryHandle) -> Result<&Geometry, RenderError> {
        self.geometries
            .get(handle.0)
            .ok_or(RenderError::InvalidGeometryIndex(handle.0))
    }

    pub fn material(&self, handle: MaterialHandle) -> Result<&Material, RenderError> {
        self.materials
            .get(handle.0)
            .ok_or(RenderError::InvalidMaterialIndex(handle.0))
    }

    pub fn shader(&self, name: &str) -> Result<&Shader, RenderError> {
        self.shaders
            .get(name)
            .ok_or_else(|| RenderError::ShaderNotFound(name.to_owned()))
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn shader_names(&self) -> impl Iterator<Item = &str> {
        self.shaders.keys().map(String::as_str)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Delete every program, vertex array and texture, leaving the store empty.
    pub fn release(&mut self, device: &mut dyn GraphicsDevice) {
        tracing::info!(
            geometries = self.geometries.len(),
            shaders = self.shaders.len(),
            textures = self.textures.len(),
            "releasing scene resources"
        );
        for (_, shader) in std::mem::take(&mut self.shaders) {
            device.delete_program(shader.program);
        }
        for geometry in self.geometries.drain(..) {
            device.delete_vertex_array(geometry.vertex_array);
        }
        for texture in self.textures.drain(..) {
            device.delete_texture(texture);
        }
        self.materials.clear();
    }
}

fn per_vertex<T: Copy + Default>(
    stream: &[T],
    vertex_count: usize,
    what: &str,
) -> Result<Vec<T>, RenderError> {
    match stream.len() {
        0 => Ok(vec![T::default(); vertex_count]),
        n if n == vertex_count => Ok(stream.to_vec()),
        n => Err(RenderError::InvalidGeometry(format!(
            "{n} {what}s for {vertex_count} vertices"
        ))),
    }
}
