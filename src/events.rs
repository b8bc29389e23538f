/// Commands fed into the render loop from the keyboard (stdin) reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Next,
    Previous,
    TogglePause,
    Quit,
}

impl InputEvent {
    /// Map one line typed on stdin to a command. Unknown input maps to `None`.
    pub fn from_key(line: &str) -> Option<Self> {
        let key = line.trim_end_matches(['\r', '\n']);
        if key == " " {
            return Some(Self::TogglePause);
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "n" | "right" | "next" => Some(Self::Next),
            "p" | "left" | "prev" | "previous" => Some(Self::Previous),
            "pause" | "space" => Some(Self::TogglePause),
            "q" | "esc" | "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}
