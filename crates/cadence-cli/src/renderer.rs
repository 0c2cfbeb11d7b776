//! Terminal rendering module for rich markdown output
//!
//! Core types format themselves as markdown; this module prints that markdown
//! through termimad, or verbatim when colors are disabled.

use std::io::{self, Write};

use anyhow::Result;
use termimad::{crossterm::style::Color, MadSkin};

/// Terminal renderer that can switch between rich and plain text output
pub struct TerminalRenderer {
    rich_enabled: bool,
    skin: MadSkin,
}

impl TerminalRenderer {
    /// Create a new terminal renderer
    pub fn new(rich_enabled: bool) -> Self {
        let mut skin = MadSkin::default();

        skin.set_headers_fg(Color::Blue);
        skin.bold.set_fg(Color::Yellow);
        skin.italic.set_fg(Color::Magenta);
        skin.code_block.set_bg(Color::AnsiValue(238));
        skin.inline_code.set_bg(Color::AnsiValue(238));

        Self { rich_enabled, skin }
    }

    /// Render markdown to standard output
    pub fn render(&self, markdown: &str) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.render_to(&mut out, markdown)?;
        out.flush()?;
        Ok(())
    }

    /// Render a short notice to standard error, keeping stdout for results
    pub fn notice(&self, markdown: &str) -> Result<()> {
        let stderr = io::stderr();
        let mut err = stderr.lock();
        self.render_to(&mut err, markdown)?;
        Ok(())
    }

    fn render_to<W: Write>(&self, out: &mut W, markdown: &str) -> io::Result<()> {
        if !self.rich_enabled {
            write!(out, "{markdown}")?;
            if !markdown.ends_with('\n') {
                writeln!(out)?;
            }
            return Ok(());
        }

        // Headers keep their hash marks so nesting stays visible.
        for line in markdown.lines() {
            if line.starts_with('#') {
                writeln!(out, "\x1b[34m{line}\x1b[0m")?;
            } else {
                writeln!(out, "{}", self.skin.inline(line))?;
            }
        }
        Ok(())
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(renderer: &TerminalRenderer, markdown: &str) -> String {
        let mut out = Vec::new();
        renderer.render_to(&mut out, markdown).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_plain_renderer_is_verbatim() {
        let renderer = TerminalRenderer::new(false);
        assert_eq!(
            rendered(&renderer, "# Steps\n\n- **a**: done\n"),
            "# Steps\n\n- **a**: done\n"
        );
        assert_eq!(rendered(&renderer, "no newline"), "no newline\n");
    }

    #[test]
    fn test_rich_renderer_colors_headers() {
        let renderer = TerminalRenderer::new(true);
        let output = rendered(&renderer, "# Steps\nplain line");
        assert!(output.starts_with("\x1b[34m# Steps\x1b[0m\n"));
        assert!(output.contains("plain line"));
    }

    #[test]
    fn test_default_is_rich() {
        let renderer = TerminalRenderer::default();
        assert!(renderer.rich_enabled);
    }
}
