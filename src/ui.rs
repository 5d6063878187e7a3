//! Terminal output for kubesess: color detection, styling, tables.
//!
//! Data (context names, listings, shell code) goes to stdout; warnings go to
//! stderr so the shell wrappers can capture stdout safely.
//!
//! # No-color detection (in priority order):
//! 1. `--no-color` CLI flag
//! 2. `NO_COLOR` environment variable (any value)
//! 3. `TERM=dumb`
//! 4. Non-TTY stdout (detected via anstream)

use anstream::{eprintln, print, println};
use anstyle::{AnsiColor, Color, Style};
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets};
use std::io::IsTerminal;

/// Color mode for output
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Always,
    #[default]
    Auto,
    Never,
}

impl std::str::FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "auto" => Ok(Self::Auto),
            "never" => Ok(Self::Never),
            _ => Err(format!("invalid color mode: {}", s)),
        }
    }
}

/// Outcome marker used by `doctor` and the context table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warn,
    Err,
    Info,
}

impl Status {
    fn icon(self, color: bool) -> &'static str {
        match (self, color) {
            (Self::Ok, true) => "✓",
            (Self::Ok, false) => "[OK]",
            (Self::Warn, true) => "⚠",
            (Self::Warn, false) => "[!]",
            (Self::Err, true) => "✗",
            (Self::Err, false) => "[X]",
            (Self::Info, true) => "•",
            (Self::Info, false) => "-",
        }
    }
}

/// Resolved display settings
#[derive(Debug, Clone)]
pub struct Ui {
    pub color_enabled: bool,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new(ColorMode::Auto, false)
    }
}

impl Ui {
    pub fn new(mode: ColorMode, force_no_color: bool) -> Self {
        let color_enabled = Self::resolve_color(mode, force_no_color);

        // Make anstream strip anything that still slips through
        if !color_enabled {
            anstream::ColorChoice::write_global(anstream::ColorChoice::Never);
        }

        Self { color_enabled }
    }

    fn resolve_color(mode: ColorMode, force_no_color: bool) -> bool {
        if force_no_color || std::env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if std::env::var("TERM").is_ok_and(|t| t == "dumb") {
            return false;
        }

        match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => std::io::stdout().is_terminal(),
        }
    }

    fn paint(&self, s: impl AsRef<str>, style: Style) -> String {
        if self.color_enabled {
            format!("{style}{}{style:#}", s.as_ref())
        } else {
            s.as_ref().to_string()
        }
    }

    /// Print a WARN-labelled message to stderr
    pub fn warn(&self, msg: impl AsRef<str>) {
        let label = Style::new()
            .fg_color(Some(Color::Ansi(AnsiColor::Yellow)))
            .bold();
        eprintln!("{} {}", self.paint("WARN", label), msg.as_ref());
    }

    pub fn dim(&self, s: impl AsRef<str>) -> String {
        self.paint(s, Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
    }

    pub fn bold(&self, s: impl AsRef<str>) -> String {
        self.paint(s, Style::new().bold())
    }

    pub fn colored(&self, s: impl AsRef<str>, color: AnsiColor) -> String {
        self.paint(s, Style::new().fg_color(Some(Color::Ansi(color))))
    }

    /// A context or namespace that was just selected
    pub fn highlight(&self, name: impl AsRef<str>) -> String {
        self.paint(name, Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))).bold())
    }

    pub fn icon(&self, status: Status) -> &'static str {
        status.icon(self.color_enabled)
    }

    /// Bordered table for `list contexts --long`
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.load_preset(if self.color_enabled {
            presets::UTF8_FULL_CONDENSED
        } else {
            presets::ASCII_MARKDOWN
        });
        table
    }

    /// Borderless key/value table for verbose context details
    pub fn details_table(&self) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.load_preset(presets::NOTHING);
        table
    }

    pub fn cell(&self, content: impl Into<String>) -> Cell {
        Cell::new(content.into())
    }

    pub fn header_cell(&self, content: impl Into<String>) -> Cell {
        let cell = Cell::new(content.into());
        if self.color_enabled {
            cell.add_attribute(Attribute::Bold)
        } else {
            cell
        }
    }

    /// Colored through comfy-table so column widths stay right
    pub fn colored_cell(&self, content: impl Into<String>, color: comfy_table::Color) -> Cell {
        let cell = Cell::new(content.into());
        if self.color_enabled { cell.fg(color) } else { cell }
    }

    /// Print a line to stdout
    pub fn println(&self, msg: impl AsRef<str>) {
        println!("{}", msg.as_ref());
    }

    /// Print text verbatim, e.g. generated shell code
    pub fn print(&self, text: impl AsRef<str>) {
        print!("{}", text.as_ref());
    }

    pub fn newline(&self) {
        println!();
    }

    pub fn section(&self, title: impl AsRef<str>) {
        println!("{}", self.bold(title));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    #[test]
    fn test_color_mode_parse() {
        assert_eq!("always".parse::<ColorMode>().unwrap(), ColorMode::Always);
        assert_eq!("AUTO".parse::<ColorMode>().unwrap(), ColorMode::Auto);
        assert_eq!("never".parse::<ColorMode>().unwrap(), ColorMode::Never);
        assert!("sometimes".parse::<ColorMode>().is_err());
    }

    #[test]
    fn test_no_color_flag_wins() {
        assert!(!Ui::new(ColorMode::Always, true).color_enabled);
        assert!(!plain().color_enabled);
    }

    #[test]
    fn test_plain_icons() {
        let ui = plain();
        assert_eq!(ui.icon(Status::Ok), "[OK]");
        assert_eq!(ui.icon(Status::Err), "[X]");
        assert_eq!(ui.icon(Status::Warn), "[!]");
        assert_eq!(ui.icon(Status::Info), "-");
    }

    #[test]
    fn test_plain_styling_is_identity() {
        let ui = plain();
        assert_eq!(ui.highlight("docker-desktop"), "docker-desktop");
        assert_eq!(ui.colored("x", AnsiColor::Red), "x");
        assert_eq!(ui.dim("default"), "default");
        assert_eq!(ui.bold("Checking"), "Checking");
    }

    #[test]
    fn test_colored_styling_wraps_text() {
        let ui = Ui { color_enabled: true };
        let painted = ui.highlight("prod");
        assert!(painted.contains("prod"));
        assert_ne!(painted, "prod");
    }

    #[test]
    fn test_plain_table_has_no_escape_codes() {
        let ui = plain();
        let mut table = ui.table();
        table.set_header(vec![ui.header_cell("Context")]);
        table.add_row(vec![ui.colored_cell("docker-desktop", comfy_table::Color::Green)]);
        let rendered = table.to_string();
        assert!(rendered.contains("docker-desktop"));
        assert!(!rendered.contains('\u{1b}'));
    }
}
