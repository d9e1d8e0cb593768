//! Human-facing views of a routing map: the live progress table drawn while a discovery runs,
//! and the Rust source form used to paste a finished map into a device database.
use std::fmt::Write as _;
use std::io::Write;

use tracing::debug;

use crate::zia::{CellIndex, RoutingMap, RoutingSource};

const CELL_WIDTH: usize = 15;
const ANSI_HOME_CLEAR: &str = "\x1b[H\x1b[2J";
const ANSI_REVERSE: &str = "\x1b[7m";
const ANSI_RESET: &str = "\x1b[0m";

/// Receives progress as the search walks through candidates
pub trait ProgressSink {
    /// `label` is the candidate now being probed in `cell`
    fn trying(&mut self, map: &RoutingMap, cell: CellIndex, label: &str);
    fn finished(&mut self, _map: &RoutingMap) {}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn trying(&mut self, _map: &RoutingMap, _cell: CellIndex, _label: &str) {}
}

/// Redraws the whole table on a terminal for every candidate
pub struct TerminalProgress<W> {
    out: W,
    macrocells_per_block: u32,
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W, macrocells_per_block: u32) -> Self {
        Self {
            out,
            macrocells_per_block,
        }
    }

    fn draw(&mut self, text: &str) {
        let res = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush());
        if let Err(e) = res {
            debug!("progress output failed: {e}");
        }
    }
}

impl<W: Write> ProgressSink for TerminalProgress<W> {
    fn trying(&mut self, map: &RoutingMap, cell: CellIndex, label: &str) {
        let text = format!(
            "{ANSI_HOME_CLEAR}{}",
            table(map, self.macrocells_per_block, Some((cell, label)))
        );
        self.draw(&text);
    }

    fn finished(&mut self, map: &RoutingMap) {
        let text = format!("{ANSI_HOME_CLEAR}{}", table(map, self.macrocells_per_block, None));
        self.draw(&text);
    }
}

/// Short name of a resolved cell, `???` when unknown
pub fn cell_label(source: Option<RoutingSource>, macrocells_per_block: u32) -> String {
    match source {
        None => "???".to_string(),
        Some(RoutingSource::DedicatedInput) => "inpin".to_string(),
        Some(RoutingSource::Macrocell { fb, mc }) => format!("FB{}_{} mc", fb + 1, mc + 1),
        Some(RoutingSource::InputBuffer { pad }) => format!(
            "FB{}_{} io",
            pad / macrocells_per_block + 1,
            pad % macrocells_per_block + 1
        ),
    }
}

fn rule(s: &mut String, slots: usize) {
    s.push_str(&"#".repeat(CELL_WIDTH * (slots + 1)));
    s.push_str("#\n");
}

/// The map as a `#`-ruled text grid, one row per ZIA row.  `highlight` draws the given label
/// in reverse video in place of the cell's contents.
pub fn table(
    map: &RoutingMap,
    macrocells_per_block: u32,
    highlight: Option<(CellIndex, &str)>,
) -> String {
    let slots = map.slots();
    let field = CELL_WIDTH - 2;
    let mut s = String::new();

    s.push_str(&" ".repeat(CELL_WIDTH));
    s.push_str(&"#".repeat(CELL_WIDTH * slots));
    s.push_str("#\n");
    s.push_str(&" ".repeat(CELL_WIDTH));
    for slot in 0..slots {
        let _ = write!(s, "# {slot:<field$}");
    }
    s.push_str("#\n");
    rule(&mut s, slots);

    for row in 0..map.rows() {
        let _ = write!(s, "# {row:<field$}");
        for slot in 0..slots {
            let cell = CellIndex::new(row, slot);
            match highlight {
                Some((at, label)) if at == cell => {
                    let _ = write!(s, "#{ANSI_REVERSE} {label:<field$}{ANSI_RESET}");
                }
                _ => {
                    let label = cell_label(map.get(cell), macrocells_per_block);
                    let _ = write!(s, "# {label:<field$}");
                }
            }
        }
        s.push_str("#\n");
    }
    rule(&mut s, slots);
    s
}

fn rust_entry(source: Option<RoutingSource>) -> String {
    match source {
        Some(RoutingSource::DedicatedInput) => "XC2ZIAInput::DedicatedInput".to_string(),
        Some(RoutingSource::Macrocell { fb, mc }) => {
            format!("XC2ZIAInput::Macrocell{{fb: {fb}, ff: {mc}}}")
        }
        Some(RoutingSource::InputBuffer { pad }) => format!("XC2ZIAInput::IBuf{{ibuf: {pad}}}"),
        None => "XC2ZIAInput::One /* unresolved */".to_string(),
    }
}

/// The map as the body of a `[[XC2ZIAInput; SLOTS]; ROWS]` static
pub fn rust_table(map: &RoutingMap) -> String {
    let mut s = String::new();
    for row in 0..map.rows() {
        let _ = writeln!(s, "    // Row {row}");
        let entries = map.row(row);
        for (slot, &source) in entries.iter().enumerate() {
            let open = if slot == 0 { "    [" } else { "     " };
            let close = if slot + 1 == entries.len() { "]," } else { "," };
            let _ = writeln!(s, "{open}{}{close}", rust_entry(source));
        }
    }
    s
}
