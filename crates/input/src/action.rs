use glam::Vec2;

/// What the application should do in response to input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Close the window and leave the main loop.
    Quit,
    /// Primary (left) button pressed at this cursor position, in physical pixels.
    PrimaryClick(Vec2),
    /// Input with no binding.
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

/// Backend-neutral input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyPressed(Key),
    KeyReleased(Key),
    CursorMoved(Vec2),
    ButtonPressed(MouseButton),
    ButtonReleased(MouseButton),
}

/// Input state carried between events.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    cursor: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known cursor position.
    pub fn cursor(&self) -> Vec2 {
        self.cursor
    }

    pub fn handle(&mut self, event: InputEvent) -> Action {
        match event {
            InputEvent::KeyPressed(Key::Escape) => Action::Quit,
            InputEvent::CursorMoved(position) => {
                self.cursor = position;
                Action::Noop
            }
            InputEvent::ButtonPressed(MouseButton::Left) => Action::PrimaryClick(self.cursor),
            _ => Action::Noop,
        }
    }
}
