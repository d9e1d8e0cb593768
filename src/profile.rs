//! Device constants for one CoolRunner-II part: fuse array geometry, ZIA shape, pin ranges and
//! the pins the discovery treats specially.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A macrocell / IO pin, zero-based
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pin {
    pub fb: u32,
    pub mc: u32,
}

impl Pin {
    pub const fn new(fb: u32, mc: u32) -> Self {
        Self { fb, mc }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FB{}_{}", self.fb + 1, self.mc + 1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub idcode: u32,
    /// Bits of `idcode` that must match (the version nibble varies between steppings)
    pub idcode_mask: u32,
    pub image_rows: usize,
    pub image_width: usize,
    pub zia_rows: usize,
    pub slots_per_row: usize,
    /// Fuse pattern selecting each choice slot of a ZIA row, slot 0 first
    pub zia_patterns: Vec<String>,
    /// Fuse pattern of a ZIA row with nothing selected
    pub zia_idle: String,
    pub function_blocks: u32,
    pub macrocells_per_block: u32,
    /// Whether the part has a dedicated input pin (bit 0 of the boundary register)
    pub dedicated_input: bool,
    /// Never tried as candidates
    pub excluded_pins: BTreeSet<Pin>,
    /// Clock/reference pins in preference order; the first is the primary reference
    pub reference_pins: Vec<Pin>,
    /// Output observed in boundary scan; the test design routes the ZIA row under test to it
    pub watch_pin: Pin,
}

/// One-hot active-low ZIA patterns: the leading bit is active-high and held low, the selected
/// slot counts from the right.
pub fn one_hot_zia_patterns(slots: usize) -> (Vec<String>, String) {
    let width = slots + 2;
    let patterns = (0..slots)
        .map(|slot| {
            (0..width)
                .map(|i| if i == 0 || i == width - 1 - slot { '0' } else { '1' })
                .collect()
        })
        .collect();
    (patterns, "1".repeat(width))
}

impl DeviceProfile {
    pub fn xc2c32a() -> Self {
        let (zia_patterns, zia_idle) = one_hot_zia_patterns(6);
        Self {
            name: "xc2c32a".to_string(),
            idcode: 0x06e1_c093,
            idcode_mask: 0x0fff_ffff,
            image_rows: 50,
            image_width: 260,
            zia_rows: 40,
            slots_per_row: 6,
            zia_patterns,
            zia_idle,
            function_blocks: 2,
            macrocells_per_block: 16,
            dedicated_input: true,
            excluded_pins: BTreeSet::new(),
            // GCK0, GCK1, GCK2
            reference_pins: vec![Pin::new(1, 4), Pin::new(1, 5), Pin::new(1, 6)],
            watch_pin: Pin::new(0, 8),
        }
    }

    pub fn xc2c64a() -> Self {
        let (zia_patterns, zia_idle) = one_hot_zia_patterns(12);
        Self {
            name: "xc2c64a".to_string(),
            idcode: 0x06e5_d093,
            idcode_mask: 0x0fff_ffff,
            image_rows: 98,
            image_width: 274,
            zia_rows: 40,
            slots_per_row: 12,
            zia_patterns,
            zia_idle,
            function_blocks: 4,
            macrocells_per_block: 16,
            dedicated_input: false,
            excluded_pins: BTreeSet::new(),
            reference_pins: vec![Pin::new(1, 4), Pin::new(1, 5), Pin::new(1, 6)],
            watch_pin: Pin::new(0, 8),
        }
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "xc2c32a" | "xc2c32" => Ok(Self::xc2c32a()),
            "xc2c64a" | "xc2c64" => Ok(Self::xc2c64a()),
            _ => Err(Error::profile(format!("no built-in profile named \"{name}\""))),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let profile: Self = serde_json::from_str(&text)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_rows < 2 || self.image_width == 0 {
            return Err(Error::profile("fuse array needs at least two non-empty rows"));
        }
        if self.zia_patterns.len() != self.slots_per_row {
            return Err(Error::profile(format!(
                "{} ZIA patterns for {} slots",
                self.zia_patterns.len(),
                self.slots_per_row
            )));
        }
        let width = self.zia_idle.len();
        for p in self.zia_patterns.iter().chain(core::iter::once(&self.zia_idle)) {
            if p.len() != width || !p.chars().all(|c| c == '0' || c == '1') {
                return Err(Error::profile(format!("bad ZIA pattern \"{p}\"")));
            }
        }
        if self.reference_pins.is_empty() {
            return Err(Error::profile("at least one reference pin is required"));
        }
        let all = self.reference_pins.iter().chain(&self.excluded_pins).chain([&self.watch_pin]);
        for pin in all {
            if !self.contains(*pin) {
                return Err(Error::profile(format!("{pin} is outside the device")));
            }
        }
        Ok(())
    }

    pub fn contains(&self, pin: Pin) -> bool {
        pin.fb < self.function_blocks && pin.mc < self.macrocells_per_block
    }

    pub fn pin_count(&self) -> u32 {
        self.function_blocks * self.macrocells_per_block
    }

    /// All pins, function block major
    pub fn pins(&self) -> impl Iterator<Item = Pin> + '_ {
        (0..self.function_blocks)
            .flat_map(move |fb| (0..self.macrocells_per_block).map(move |mc| Pin::new(fb, mc)))
    }

    /// Input-buffer numbering used by the ZIA tables
    pub fn pad_index(&self, pin: Pin) -> u32 {
        pin.fb * self.macrocells_per_block + pin.mc
    }

    /// Gray-coded row address width, ceil(log2(image_rows))
    pub fn address_bits(&self) -> usize {
        crate::isc::address_bits(self.image_rows)
    }

    pub fn boundary(&self) -> BoundaryLayout {
        BoundaryLayout {
            pins: self.pin_count() as usize,
            macrocells_per_block: self.macrocells_per_block as usize,
            dedicated_input: self.dedicated_input,
        }
    }
}

/// Positions in the INTEST boundary register.  Each pin owns three cells counted from the far
/// end of the register (input, output, output enable); the dedicated input, if present, is
/// cell 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundaryLayout {
    pins: usize,
    macrocells_per_block: usize,
    dedicated_input: bool,
}

impl BoundaryLayout {
    pub fn len(&self) -> usize {
        self.pins * 3 + self.dedicated_input as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pins(&self) -> usize {
        self.pins
    }

    fn index(&self, pin: Pin) -> usize {
        pin.fb as usize * self.macrocells_per_block + pin.mc as usize
    }

    pub fn dedicated_input_bit(&self) -> Option<usize> {
        if self.dedicated_input {
            Some(0)
        } else {
            None
        }
    }

    pub fn input_bit(&self, pin: Pin) -> usize {
        self.len() - 1 - self.index(pin) * 3
    }

    pub fn output_bit(&self, pin: Pin) -> usize {
        self.len() - 1 - (self.index(pin) * 3 + 1)
    }

    /// Output cell of the pin with linear index `idx`
    pub fn output_bit_at(&self, idx: usize) -> usize {
        self.len() - 1 - (idx * 3 + 1)
    }

    /// Input cell of the pin with linear index `idx`
    pub fn input_bit_at(&self, idx: usize) -> usize {
        self.len() - 1 - idx * 3
    }

    /// An all-zero vector with the given cells set
    pub fn vector(&self, set: &[usize]) -> Vec<bool> {
        let mut v = vec![false; self.len()];
        for &i in set {
            v[i] = true;
        }
        v
    }
}
