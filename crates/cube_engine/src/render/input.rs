//! Window input translated into camera and renderer actions
//!
//! Cursor history and the resize flag live here instead of in globals; the
//! application loop hands the deltas to the camera explicitly.

use glfw::{Action, Key, WindowEvent};

use crate::render::camera::CameraMovement;

/// Keys polled every tick and the camera motion each one drives
pub const MOVEMENT_KEYS: [(Key, CameraMovement); 4] = [
    (Key::W, CameraMovement::Forward),
    (Key::S, CameraMovement::Backward),
    (Key::A, CameraMovement::Left),
    (Key::D, CameraMovement::Right),
];

/// What one window event asks the application to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputAction {
    /// Nothing to do
    None,
    /// Close the window
    Close,
    /// Rotate the camera by a cursor delta, y already flipped to "up is positive"
    Look {
        /// Horizontal delta in pixels
        dx: f32,
        /// Vertical delta in pixels
        dy: f32,
    },
    /// The framebuffer changed size
    Resized {
        /// New width in pixels
        width: u32,
        /// New height in pixels
        height: u32,
    },
}

/// Cursor history and pending resize
#[derive(Debug, Clone)]
pub struct InputState {
    last_x: f32,
    last_y: f32,
    first_mouse: bool,
    resize_requested: bool,
}

impl InputState {
    /// Start with the cursor assumed at the center of a `width` x `height` window
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            last_x: width as f32 / 2.0,
            last_y: height as f32 / 2.0,
            first_mouse: true,
            resize_requested: false,
        }
    }

    /// Record a cursor position and return the delta since the last one
    ///
    /// The first sample only seeds the history, so capturing the cursor does
    /// not spin the camera.
    pub fn cursor_moved(&mut self, x: f64, y: f64) -> (f32, f32) {
        let (x, y) = (x as f32, y as f32);
        if self.first_mouse {
            self.last_x = x;
            self.last_y = y;
            self.first_mouse = false;
        }

        let dx = x - self.last_x;
        // screen y grows downwards
        let dy = self.last_y - y;
        self.last_x = x;
        self.last_y = y;
        (dx, dy)
    }

    /// Last recorded cursor position
    pub fn last_cursor(&self) -> (f32, f32) {
        (self.last_x, self.last_y)
    }

    /// Note that the framebuffer was resized
    pub fn notify_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Whether a resize is waiting for a swapchain recreate
    pub fn resize_pending(&self) -> bool {
        self.resize_requested
    }

    /// The flag itself, for the frame loop to clear after a recreate
    pub fn resize_flag(&mut self) -> &mut bool {
        &mut self.resize_requested
    }

    /// Translate one window event
    pub fn handle_event(&mut self, event: &WindowEvent) -> InputAction {
        match *event {
            WindowEvent::Key(Key::Escape, _, Action::Press, _) | WindowEvent::Close => InputAction::Close,
            WindowEvent::CursorPos(x, y) => {
                let (dx, dy) = self.cursor_moved(x, y);
                InputAction::Look { dx, dy }
            }
            WindowEvent::FramebufferSize(width, height) => {
                self.notify_resize();
                InputAction::Resized {
                    width: width.max(0) as u32,
                    height: height.max(0) as u32,
                }
            }
            _ => InputAction::None,
        }
    }

    /// Camera moves for every movement key `is_pressed` reports as held
    pub fn movements<F>(is_pressed: F) -> impl Iterator<Item = CameraMovement>
    where
        F: Fn(Key) -> bool,
    {
        MOVEMENT_KEYS
            .into_iter()
            .filter(move |(key, _)| is_pressed(*key))
            .map(|(_, movement)| movement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfw::Modifiers;

    #[test]
    fn test_cursor_starts_at_window_center() {
        let input = InputState::new(800, 600);
        assert_eq!(input.last_cursor(), (400.0, 300.0));
    }

    #[test]
    fn test_first_sample_does_not_jump() {
        let mut input = InputState::new(800, 600);
        assert_eq!(input.cursor_moved(10.0, 20.0), (0.0, 0.0));
        assert_eq!(input.cursor_moved(15.0, 10.0), (5.0, 10.0));
    }

    #[test]
    fn test_resize_event_sets_flag() {
        let mut input = InputState::new(800, 600);
        assert!(!input.resize_pending());

        let action = input.handle_event(&WindowEvent::FramebufferSize(1024, 768));
        assert_eq!(
            action,
            InputAction::Resized {
                width: 1024,
                height: 768
            }
        );
        assert!(input.resize_pending());

        *input.resize_flag() = false;
        assert!(!input.resize_pending());
    }

    #[test]
    fn test_escape_closes() {
        let mut input = InputState::new(800, 600);
        let press = WindowEvent::Key(Key::Escape, 0, Action::Press, Modifiers::empty());
        let release = WindowEvent::Key(Key::Escape, 0, Action::Release, Modifiers::empty());
        assert_eq!(input.handle_event(&press), InputAction::Close);
        assert_eq!(input.handle_event(&release), InputAction::None);
    }

    #[test]
    fn test_movement_keys() {
        let held: Vec<_> = InputState::movements(|key| key == Key::W || key == Key::D).collect();
        assert_eq!(held, vec![CameraMovement::Forward, CameraMovement::Right]);
        assert_eq!(InputState::movements(|_| false).count(), 0);
    }
}
