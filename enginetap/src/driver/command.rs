//! Commands sent to the engine.

use crate::platform::ConsoleMode;

/// One invocation of the engine.
///
/// Built once, then handed to the dispatcher by reference. The console
/// mode is detected from the text unless set explicitly.
///
/// # Example
///
/// ```rust
/// use enginetap::driver::Command;
/// use enginetap::platform::ConsoleMode;
///
/// let cmd = Command::new("display 1+1");
/// assert_eq!(cmd.mode(), ConsoleMode::Plain);
///
/// let block = Command::mata_block("x = 1\nx", false).quiet(true);
/// assert_eq!(block.text(), "mata\nx = 1\nx\nend");
/// assert_eq!(block.mode(), ConsoleMode::Mata);
/// assert!(block.is_quiet());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    mode: ConsoleMode,
    quiet: bool,
    inline: bool,
}

impl Command {
    /// Create a command, detecting its console mode from the text.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            mode: ConsoleMode::detect(&text),
            text,
            quiet: false,
            inline: true,
        }
    }

    /// A one-shot matrix language statement, run from the plain console.
    pub fn mata_statement(statement: &str) -> Self {
        Self::new(format!("mata: {}", statement))
    }

    /// A block of matrix language code run inside a sub-console session.
    ///
    /// With `colon`, the session stops at the first error and reports it.
    pub fn mata_block(code: &str, colon: bool) -> Self {
        let opener = if colon { "mata:" } else { "mata" };
        let newline = if code.ends_with('\n') { "" } else { "\n" };
        Self::new(format!("{}\n{}{}end", opener, code, newline))
            .with_mode(ConsoleMode::Mata)
            .inline(false)
    }

    /// Override the detected console mode.
    pub fn with_mode(mut self, mode: ConsoleMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run without displaying output.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Whether graphs produced by the command render inline.
    pub fn inline(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn mode(&self) -> ConsoleMode {
        self.mode
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn is_inline(&self) -> bool {
        self.inline
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
