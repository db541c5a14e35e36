//! Host hook for program output.

/// Services the interpreter calls out to while running byte-code.
pub trait RuntimeServices {
    /// Called once per `Output` / `OutputString` instruction.
    fn output(&mut self, text: &str);
}

impl<R: RuntimeServices + ?Sized> RuntimeServices for &mut R {
    fn output(&mut self, text: &str) {
        (**self).output(text);
    }
}

/// Collects every output line in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferedOutput {
    lines: Vec<String>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Drain the collected lines.
    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

impl RuntimeServices for BufferedOutput {
    fn output(&mut self, text: &str) {
        self.lines.push(text.to_owned());
    }
}
