use std::fmt;

/// Left-stick output levels. Deflections are always full scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stick {
    #[default]
    Neutral,
    Up,
    Down,
    Left,
    Right,
}

impl fmt::Display for Stick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stick::Neutral => write!(f, "neutral"),
            Stick::Up => write!(f, "up"),
            Stick::Down => write!(f, "down"),
            Stick::Left => write!(f, "left"),
            Stick::Right => write!(f, "right"),
        }
    }
}

/// Controller outputs driven by the actuation machine.
///
/// `at_ms` is the machine's scheduled time for the change, which can lag the
/// wall clock when the machine is polled late.
pub trait Gamepad {
    fn set_button(&mut self, pressed: bool, at_ms: u64);
    fn set_stick(&mut self, stick: Stick, at_ms: u64);
}

/// One output change seen by a [`RecordingGamepad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamepadEvent {
    Button { pressed: bool, at_ms: u64 },
    Stick { stick: Stick, at_ms: u64 },
}

/// Gamepad that only remembers its levels and every change.
///
/// Stands in for the USB HID report in the simulated controller and in
/// tests. Repeated writes of the same level are not logged.
#[derive(Debug, Default)]
pub struct RecordingGamepad {
    pressed: bool,
    stick: Stick,
    events: Vec<GamepadEvent>,
}

impl RecordingGamepad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn stick(&self) -> Stick {
        self.stick
    }

    pub fn events(&self) -> &[GamepadEvent] {
        &self.events
    }

    /// Timestamps of every button press, in order.
    pub fn press_times(&self) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|event| match event {
                GamepadEvent::Button { pressed: true, at_ms } => Some(*at_ms),
                _ => None,
            })
            .collect()
    }
}

impl Gamepad for RecordingGamepad {
    fn set_button(&mut self, pressed: bool, at_ms: u64) {
        if self.pressed != pressed {
            self.pressed = pressed;
            self.events.push(GamepadEvent::Button { pressed, at_ms });
        }
    }

    fn set_stick(&mut self, stick: Stick, at_ms: u64) {
        if self.stick != stick {
            self.stick = stick;
            self.events.push(GamepadEvent::Stick { stick, at_ms });
        }
    }
}
