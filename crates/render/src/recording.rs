use std::collections::{BTreeMap, BTreeSet};

use ember_assets::{MeshData, TextureImage};
use serde::Serialize;

use crate::device::{
    DeviceError, GraphicsDevice, ProgramId, TextureId, UniformLocation, UniformValue,
    VertexArrayId, declared_uniforms,
};

/// One command received by a [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateProgram {
        program: ProgramId,
        name: String,
    },
    DeleteProgram {
        program: ProgramId,
    },
    CreateVertexArray {
        vertex_array: VertexArrayId,
        vertices: usize,
        indices: usize,
    },
    DeleteVertexArray {
        vertex_array: VertexArrayId,
    },
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    DeleteTexture {
        texture: TextureId,
    },
    Clear {
        color: [f32; 4],
    },
    UseProgram {
        program: Option<ProgramId>,
    },
    SetUniform {
        name: String,
        value: UniformValue,
    },
    ActiveTexture {
        unit: u32,
    },
    BindTexture {
        texture: Option<TextureId>,
    },
    BindVertexArray {
        vertex_array: Option<VertexArrayId>,
    },
    DrawIndexed {
        index_count: u32,
    },
    Present,
}

/// Headless [`GraphicsDevice`] that records every command.
///
/// It tracks bound state the way a GL context does and raises a device
/// error for commands a real context would reject (drawing with no vertex
/// array or program, setting a uniform of another program, using a deleted
/// resource).
#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<Command>,
    next_id: u32,
    programs: BTreeMap<ProgramId, BTreeSet<String>>,
    vertex_arrays: BTreeMap<VertexArrayId, usize>,
    textures: BTreeSet<TextureId>,
    locations: Vec<(ProgramId, String)>,
    current_program: Option<ProgramId>,
    current_vertex_array: Option<VertexArrayId>,
    compile_failures: BTreeMap<String, String>,
    error: Option<DeviceError>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_program` call for `name` fail with `log`.
    pub fn fail_compile(&mut self, name: impl Into<String>, log: impl Into<String>) {
        self.compile_failures.insert(name.into(), log.into());
    }

    /// Raise a device error, as a driver would asynchronously.
    pub fn inject_error(&mut self, message: impl Into<String>) {
        self.raise(message.into());
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Drop the recorded commands, keeping device state.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Index counts of every draw, in order.
    pub fn draws(&self) -> Vec<u32> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { index_count } => Some(*index_count),
                _ => None,
            })
            .collect()
    }

    /// Values uploaded for the uniform `name`, in order.
    pub fn uniform_values(&self, name: &str) -> Vec<UniformValue> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform { name: n, value } if n == name => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Programs, vertex arrays and textures not yet deleted.
    pub fn live_resources(&self) -> usize {
        self.programs.len() + self.vertex_arrays.len() + self.textures.len()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn raise(&mut self, message: String) {
        tracing::trace!(%message, "recording device error");
        // the first error sticks until it is taken
        if self.error.is_none() {
            self.error = Some(DeviceError::Device(message));
        }
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_program(
        &mut self,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, DeviceError> {
        if let Some(log) = self.compile_failures.remove(name) {
            return Err(DeviceError::Compile(log));
        }
        let program = ProgramId(self.allocate());
        let mut uniforms = declared_uniforms(vertex_source);
        uniforms.extend(declared_uniforms(fragment_source));
        self.locations
            .extend(uniforms.iter().map(|name| (program, name.clone())));
        self.programs.insert(program, uniforms);
        self.commands.push(Command::CreateProgram {
            program,
            name: name.to_owned(),
        });
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            self.raise(format!("delete of unknown program {}", program.0));
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.commands.push(Command::DeleteProgram { program });
    }

    fn create_vertex_array(&mut self, mesh: &MeshData) -> Result<VertexArrayId, DeviceError> {
        if mesh.positions.is_empty() || mesh.indices.is_empty() {
            return Err(DeviceError::Device("vertex array has no vertices or indices".into()));
        }
        let vertex_array = VertexArrayId(self.allocate());
        self.vertex_arrays.insert(vertex_array, mesh.indices.len());
        self.commands.push(Command::CreateVertexArray {
            vertex_array,
            vertices: mesh.vertex_count(),
            indices: mesh.indices.len(),
        });
        Ok(vertex_array)
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        if self.vertex_arrays.remove(&vertex_array).is_none() {
            self.raise(format!("delete of unknown vertex array {}", vertex_array.0));
        }
        self.commands.push(Command::DeleteVertexArray { vertex_array });
    }

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, DeviceError> {
        let texture = TextureId(self.allocate());
        self.textures.insert(texture);
        self.commands.push(Command::CreateTexture {
            texture,
            width: image.width,
            height: image.height,
        });
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if !self.textures.remove(&texture) {
            self.raise(format!("delete of unknown texture {}", texture.0));
        }
        self.commands.push(Command::DeleteTexture { texture });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.commands.push(Command::Clear { color });
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        if let Some(p) = program {
            if !self.programs.contains_key(&p) {
                self.raise(format!("use of unknown program {}", p.0));
            }
        }
        self.current_program = program;
        self.commands.push(Command::UseProgram { program });
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        if !self.programs.contains_key(&program) {
            return None;
        }
        self.locations
            .iter()
            .position(|(p, n)| *p == program && n == name)
            .map(|i| UniformLocation(i as u32))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let index = location.0 as usize;
        let Some(program) = self.current_program else {
            self.raise("set_uniform with no program in use".into());
            return;
        };
        match self.locations.get(index) {
            Some((owner, name)) if *owner == program => {
                let name = name.clone();
                self.commands.push(Command::SetUniform { name, value });
            }
            Some(_) => self.raise(format!("uniform location {index} belongs to another program")),
            None => self.raise(format!("invalid uniform location {index}")),
        }
    }

    fn active_texture(&mut self, unit: u32) {
        self.commands.push(Command::ActiveTexture { unit });
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        if let Some(t) = texture {
            if !self.textures.contains(&t) {
                self.raise(format!("bind of unknown texture {}", t.0));
            }
        }
        self.commands.push(Command::BindTexture { texture });
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        if let Some(v) = vertex_array {
            if !self.vertex_arrays.contains_key(&v) {
                self.raise(format!("bind of unknown vertex array {}", v.0));
            }
        }
        self.current_vertex_array = vertex_array;
        self.commands.push(Command::BindVertexArray { vertex_array });
    }

    fn draw_indexed_triangles(&mut self, index_count: u32) {
        match (self.current_program, self.current_vertex_array) {
            (None, _) => self.raise("draw with no program in use".into()),
            (_, None) => self.raise("draw with no vertex array bound".into()),
            (Some(_), Some(vao)) => {
                let available = self.vertex_arrays.get(&vao).copied().unwrap_or(0);
                if index_count as usize > available {
                    self.raise(format!(
                        "draw of {index_count} indices from a vertex array holding {available}"
                    ));
                }
            }
        }
        self.commands.push(Command::DrawIndexed { index_count });
    }

    fn take_error(&mut self) -> Option<DeviceError> {
        self.error.take()
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        self.commands.push(Command::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_assets::primitives;

    const VS: &str = "fn vs() { let p = uniforms.u_mvp; }";
    const FS: &str = "fn fs() { let c = uniforms.u_diffuse; }";

    #[test]
    fn only_declared_uniforms_have_locations() {
        let mut device = RecordingDevice::new();
        let program = device.create_program("p", VS, FS).unwrap();
        assert!(device.uniform_location(program, "u_mvp").is_some());
        assert!(device.uniform_location(program, "u_diffuse").is_some());
        assert!(device.uniform_location(program, "u_glossiness").is_none());
    }

    #[test]
    fn injected_compile_failure_carries_log() {
        let mut device = RecordingDevice::new();
        device.fail_compile("bad", "error: expected `;`");
        let err = device.create_program("bad", VS, FS).unwrap_err();
        assert_eq!(err, DeviceError::Compile("error: expected `;`".into()));
        // only the next compile fails
        assert!(device.create_program("bad", VS, FS).is_ok());
    }

    #[test]
    fn draw_without_vertex_array_raises_error() {
        let mut device = RecordingDevice::new();
        let program = device.create_program("p", VS, FS).unwrap();
        device.use_program(Some(program));
        device.draw_indexed_triangles(3);
        assert!(matches!(device.take_error(), Some(DeviceError::Device(_))));
        assert_eq!(device.take_error(), None);
    }

    #[test]
    fn uniform_of_other_program_is_rejected() {
        let mut device = RecordingDevice::new();
        let a = device.create_program("a", VS, FS).unwrap();
        let b = device.create_program("b", VS, FS).unwrap();
        let loc = device.uniform_location(a, "u_mvp").unwrap();
        device.use_program(Some(b));
        device.set_uniform(loc, UniformValue::Int(0));
        assert!(device.take_error().is_some());
        assert!(device.uniform_values("u_mvp").is_empty());
    }

    #[test]
    fn tracks_live_resources() {
        let mut device = RecordingDevice::new();
        let program = device.create_program("p", VS, FS).unwrap();
        let vao = device.create_vertex_array(&primitives::plane()).unwrap();
        let tex = device.create_texture(&TextureImage::solid([255; 4])).unwrap();
        assert_eq!(device.live_resources(), 3);

        device.delete_texture(tex);
        device.delete_vertex_array(vao);
        device.delete_program(program);
        assert_eq!(device.live_resources(), 0);
        assert_eq!(device.take_error(), None);

        device.delete_texture(tex);
        assert!(device.take_error().is_some());
    }

    #[test]
    fn overlong_draw_raises_error() {
        let mut device = RecordingDevice::new();
        let program = device.create_program("p", VS, FS).unwrap();
        let vao = device.create_vertex_array(&primitives::plane()).unwrap();
        device.use_program(Some(program));
        device.bind_vertex_array(Some(vao));
        device.draw_indexed_triangles(6);
        assert_eq!(device.take_error(), None);
        device.draw_indexed_triangles(9);
        assert!(device.take_error().is_some());
        assert_eq!(device.draws(), vec![6, 9]);
    }

    #[test]
    fn empty_vertex_array_is_refused() {
        let mut device = RecordingDevice::new();
        let empty = MeshData {
            positions: vec![],
            uvs: vec![],
            normals: vec![],
            indices: vec![],
        };
        assert!(matches!(
            device.create_vertex_array(&empty),
            Err(DeviceError::Device(_))
        ));
        assert_eq!(device.live_resources(), 0);
        assert!(device.commands().is_empty());
    }
}
