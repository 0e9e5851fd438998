//! Console modes and the text markers each sub-console wraps its output in.

use std::fmt;

/// Text the engine prints around a sub-console session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleMarkers {
    /// Name used in logs.
    pub name: &'static str,

    /// Echoed entry command, with and without the colon form.
    pub entry_banners: [&'static str; 2],

    /// Width of the dashed rule opening the divider line.
    pub divider_width: usize,

    /// Title following the rule on the divider line.
    pub divider_title: &'static str,

    /// Echoed command that leaves the sub-console.
    pub exit_marker: &'static str,
}

impl ConsoleMarkers {
    /// The full divider text: the rule followed by the title.
    pub fn divider(&self) -> String {
        format!("{}{}", "-".repeat(self.divider_width), self.divider_title)
    }
}

/// Markers of the matrix language sub-console.
pub static MATA: ConsoleMarkers = ConsoleMarkers {
    name: "mata",
    entry_banners: [". mata:\n", ". mata\n"],
    divider_width: 49,
    divider_title: " mata (type end to exit) ",
    exit_marker: ": end\n",
};

/// Markers of the embedded script language sub-console.
pub static PYTHON: ConsoleMarkers = ConsoleMarkers {
    name: "python",
    entry_banners: [". python:\n", ". python\n"],
    divider_width: 47,
    divider_title: " python (type end to exit) ",
    exit_marker: ">>> end\n",
};

/// Which console a command runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsoleMode {
    /// The engine's own command language.
    #[default]
    Plain,
    /// Interactive matrix language session.
    Mata,
    /// Interactive embedded script language session.
    Python,
}

impl ConsoleMode {
    /// Detect a sub-console entry from the first line of a command.
    ///
    /// Only a bare `mata`, `mata:`, `python` or `python:` first line opens
    /// a sub-console. One-shot forms such as `mata: x = 1` stay plain.
    pub fn detect(command: &str) -> Self {
        let first = command.lines().next().unwrap_or_default().trim();
        match first {
            "mata" | "mata:" => Self::Mata,
            "python" | "python:" => Self::Python,
            _ => Self::Plain,
        }
    }

    /// Whether output is wrapped in sub-console markers.
    pub fn is_sub_console(self) -> bool {
        self != Self::Plain
    }

    /// Markers for this mode, if it is a sub-console.
    pub fn markers(self) -> Option<&'static ConsoleMarkers> {
        match self {
            Self::Plain => None,
            Self::Mata => Some(&MATA),
            Self::Python => Some(&PYTHON),
        }
    }
}

impl fmt::Display for ConsoleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Mata => "mata",
            Self::Python => "python",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_sub_console() {
        assert_eq!(ConsoleMode::detect("mata"), ConsoleMode::Mata);
        assert_eq!(ConsoleMode::detect("mata:\nx = 1\nend"), ConsoleMode::Mata);
        assert_eq!(ConsoleMode::detect("python\nprint(1)\nend"), ConsoleMode::Python);
        assert_eq!(ConsoleMode::detect("python:"), ConsoleMode::Python);
    }

    #[test]
    fn test_detect_plain() {
        assert_eq!(ConsoleMode::detect("display 1+1"), ConsoleMode::Plain);
        assert_eq!(ConsoleMode::detect("mata: x = 1"), ConsoleMode::Plain);
        assert_eq!(ConsoleMode::detect("matador"), ConsoleMode::Plain);
        assert_eq!(ConsoleMode::detect(""), ConsoleMode::Plain);
    }

    #[test]
    fn test_divider_text() {
        let divider = MATA.divider();
        assert!(divider.starts_with(&"-".repeat(49)));
        assert!(!divider.starts_with(&"-".repeat(50)));
        assert!(divider.ends_with(" mata (type end to exit) "));
        assert_eq!(PYTHON.divider().len(), 47 + PYTHON.divider_title.len());
        assert!(ConsoleMode::Plain.markers().is_none());
    }
}
