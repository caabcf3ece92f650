use std::sync::{Arc, Mutex};

use ember_render::{ProgramId, TextureId, UniformLocation, UniformValue, VertexArrayId};

use crate::shaders::UniformBlock;

/// State a draw captured when it was issued.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Draw {
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub texture: Option<TextureId>,
    pub uniforms: UniformBlock,
    pub index_count: u32,
}

#[derive(Debug, Default)]
struct BindState {
    program: Option<ProgramId>,
    vertex_array: Option<VertexArrayId>,
    texture: Option<TextureId>,
    active_unit: u32,
    uniforms: UniformBlock,
}

/// Bound state and the draws recorded since the last clear.
///
/// Immediate-mode calls land here; the device replays the recorded draws in
/// one render pass when the frame is presented.
#[derive(Debug, Default)]
pub(crate) struct FrameRecorder {
    state: BindState,
    clear_color: Option<[f32; 4]>,
    draws: Vec<Draw>,
}

impl FrameRecorder {
    /// Start a frame over: earlier draws are discarded.
    pub fn clear(&mut self, color: [f32; 4]) {
        self.draws.clear();
        self.clear_color = Some(color);
    }

    pub fn use_program(&mut self, program: Option<ProgramId>) {
        self.state.program = program;
    }

    /// Unbind `program` if it is current.
    pub fn forget_program(&mut self, program: ProgramId) {
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    /// Unbind `vertex_array` if it is current.
    pub fn forget_vertex_array(&mut self, vertex_array: VertexArrayId) {
        if self.state.vertex_array == Some(vertex_array) {
            self.state.vertex_array = None;
        }
    }

    pub fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), String> {
        if self.state.program.is_none() {
            return Err("set_uniform with no program in use".into());
        }
        self.state.uniforms.set(location.0, value)
    }

    pub fn active_texture(&mut self, unit: u32) -> Result<(), String> {
        self.state.active_unit = unit;
        if unit != 0 {
            return Err(format!("texture unit {unit} is not supported"));
        }
        Ok(())
    }

    /// Bind `texture` to the active unit. Only unit 0 is sampled.
    pub fn bind_texture(&mut self, texture: Option<TextureId>) {
        if self.state.active_unit == 0 {
            self.state.texture = texture;
        }
    }

    pub fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.state.vertex_array = vertex_array;
    }

    /// Capture a draw of `index_count` indices with the bound state.
    ///
    /// `available` gives the index count of a vertex array. A draw of zero
    /// indices is valid and records nothing.
    pub fn draw(
        &mut self,
        index_count: u32,
        available: impl FnOnce(VertexArrayId) -> u32,
    ) -> Result<(), String> {
        let (Some(program), Some(vertex_array)) = (self.state.program, self.state.vertex_array)
        else {
            return Err("draw requires a program and a vertex array".into());
        };
        if index_count == 0 {
            return Ok(());
        }
        let available = available(vertex_array);
        if index_count > available {
            return Err(format!(
                "draw of {index_count} indices from a vertex array holding {available}"
            ));
        }
        self.draws.push(Draw {
            program,
            vertex_array,
            texture: self.state.texture,
            uniforms: self.state.uniforms,
            index_count,
        });
        Ok(())
    }

    /// Hand over the frame's clear color and draws, leaving the recorder empty.
    pub fn finish(&mut self) -> (Option<[f32; 4]>, Vec<Draw>) {
        (self.clear_color.take(), std::mem::take(&mut self.draws))
    }

    /// Drop the frame without encoding it.
    pub fn discard(&mut self) {
        self.clear_color = None;
        self.draws.clear();
    }
}

/// Device errors collected from our own checks and from wgpu's uncaptured
/// error callback.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorSink {
    errors: Arc<Mutex<Vec<String>>>,
}

impl ErrorSink {
    pub fn push(&self, message: String) {
        self.errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message);
    }

    /// The oldest pending error; the rest are dropped.
    pub fn take_first(&self) -> Option<String> {
        let mut errors = self
            .errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if errors.is_empty() {
            return None;
        }
        let first = errors.remove(0);
        errors.clear();
        Some(first)
    }
}

/// Uniform slots to allocate for `draws` blocks, or `None` when `current`
/// already holds them. Capacity grows to the next power of two.
pub(crate) fn grow_uniform_slots(current: u64, draws: u64) -> Option<u64> {
    (draws > current).then(|| draws.next_power_of_two())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    const PROGRAM: ProgramId = ProgramId(1);
    const VAO: VertexArrayId = VertexArrayId(2);

    fn bound() -> FrameRecorder {
        let mut frame = FrameRecorder::default();
        frame.use_program(Some(PROGRAM));
        frame.bind_vertex_array(Some(VAO));
        frame
    }

    #[test]
    fn draw_captures_bound_state() {
        let mut frame = bound();
        frame.bind_texture(Some(TextureId(3)));
        frame
            .set_uniform(UniformLocation(7), UniformValue::Vec3(Vec3::X))
            .unwrap();
        frame.draw(6, |_| 6).unwrap();

        // later binds do not leak into the recorded draw
        frame.bind_texture(None);
        frame
            .set_uniform(UniformLocation(7), UniformValue::Vec3(Vec3::Y))
            .unwrap();
        frame.draw(3, |_| 6).unwrap();

        let (_, draws) = frame.finish();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].texture, Some(TextureId(3)));
        assert_eq!(draws[0].index_count, 6);
        assert_eq!(draws[1].texture, None);
        assert_ne!(draws[0].uniforms, draws[1].uniforms);
    }

    #[test]
    fn empty_draw_records_nothing() {
        let mut frame = bound();
        frame.draw(0, |_| 0).unwrap();
        assert!(frame.finish().1.is_empty());
    }

    #[test]
    fn draw_needs_program_and_vertex_array() {
        let mut frame = FrameRecorder::default();
        assert!(frame.draw(3, |_| 3).is_err());
        frame.use_program(Some(PROGRAM));
        assert!(frame.draw(3, |_| 3).is_err());
        frame.bind_vertex_array(Some(VAO));
        frame.forget_program(PROGRAM);
        assert!(frame.draw(3, |_| 3).is_err());
        assert!(frame.finish().1.is_empty());
    }

    #[test]
    fn overlong_draw_is_rejected() {
        let mut frame = bound();
        let err = frame.draw(9, |vao| if vao == VAO { 6 } else { 0 }).unwrap_err();
        assert!(err.contains("holding 6"), "{err}");
        assert!(frame.finish().1.is_empty());
    }

    #[test]
    fn clear_discards_earlier_draws() {
        let mut frame = bound();
        frame.draw(3, |_| 3).unwrap();
        frame.clear([0.0, 0.0, 0.0, 1.0]);
        frame.draw(6, |_| 6).unwrap();
        let (clear, draws) = frame.finish();
        assert_eq!(clear, Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(draws.len(), 1);
        assert_eq!(frame.finish(), (None, Vec::new()));
    }

    #[test]
    fn uniforms_need_a_program() {
        let mut frame = FrameRecorder::default();
        assert!(frame.set_uniform(UniformLocation(4), UniformValue::Float(1.0)).is_err());
        frame.use_program(Some(PROGRAM));
        assert!(frame.set_uniform(UniformLocation(4), UniformValue::Float(1.0)).is_ok());
    }

    #[test]
    fn only_unit_zero_is_sampled() {
        let mut frame = bound();
        assert!(frame.active_texture(1).is_err());
        frame.bind_texture(Some(TextureId(5)));
        frame.active_texture(0).unwrap();
        frame.draw(3, |_| 3).unwrap();
        assert_eq!(frame.finish().1[0].texture, None);
    }

    #[test]
    fn error_sink_keeps_the_first_error() {
        let sink = ErrorSink::default();
        assert_eq!(sink.take_first(), None);
        sink.push("first".into());
        sink.clone().push("second".into());
        assert_eq!(sink.take_first().as_deref(), Some("first"));
        assert_eq!(sink.take_first(), None);
    }

    #[test]
    fn uniform_slots_grow_by_powers_of_two() {
        assert_eq!(grow_uniform_slots(16, 0), None);
        assert_eq!(grow_uniform_slots(16, 16), None);
        assert_eq!(grow_uniform_slots(16, 17), Some(32));
        assert_eq!(grow_uniform_slots(32, 100), Some(128));
        assert_eq!(grow_uniform_slots(0, 1), Some(1));
    }
}
