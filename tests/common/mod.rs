//! Shared fixtures: a compiler that tags each image with the cell it was built for, and a
//! simulated part whose ZIA is wired from a lookup table.

#![allow(dead_code)]

use std::collections::HashMap;

use embedded_hal::delay::DelayNs;
use zia_probe::cable::sim::SimCpld;
use zia_probe::image::ConfigurationImage;
use zia_probe::isc::{arr2num, num2arr};
use zia_probe::profile::DeviceProfile;
use zia_probe::synth::{BitstreamCompiler, FuseMapTemplate, ImageVariant, Synthesizer};
use zia_probe::zia::{CellIndex, RoutingSource};
use zia_probe::Result;

pub const BASE_TEMPLATE: &str = "BASE\n{zia}\n{pterm}\n";
pub const ALT_TEMPLATE: &str = "ALT\n{zia}\n{pterm}\n";

/// Settle times are irrelevant to the simulator
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Reads back the ZIA selection from the fuse map and stores (row, slot, variant) in the
/// first rows of the image.  Row 0 starts `01` so an erased array never decodes.
pub struct TaggingCompiler {
    profile: DeviceProfile,
}

impl TaggingCompiler {
    pub fn new(profile: &DeviceProfile) -> Self {
        Self {
            profile: profile.clone(),
        }
    }
}

impl BitstreamCompiler for TaggingCompiler {
    fn compile(&mut self, fuse_map: &str) -> Result<ConfigurationImage> {
        let mut lines = fuse_map.lines();
        let variant = match lines.next() {
            Some("ALT") => ImageVariant::Alt,
            _ => ImageVariant::Base,
        };
        let zia = lines.next().unwrap_or_default();
        let width = self.profile.zia_idle.len();
        let (row, slot) = zia
            .as_bytes()
            .chunks(width)
            .enumerate()
            .find_map(|(row, chunk)| {
                let chunk = std::str::from_utf8(chunk).ok()?;
                let slot = self.profile.zia_patterns.iter().position(|p| p == chunk)?;
                Some((row, slot))
            })
            .unwrap_or((0, 0));

        let mut image = ConfigurationImage::blank(self.profile.image_rows, self.profile.image_width);
        image.set(1, 0, true);
        for (x, bit) in num2arr(row as u32, 8).into_iter().enumerate() {
            image.set(x, 1, bit);
        }
        for (x, bit) in num2arr(slot as u32, 8).into_iter().enumerate() {
            image.set(x, 2, bit);
        }
        image.set(0, 3, variant == ImageVariant::Alt);
        Ok(image)
    }
}

/// The cell and variant a running configuration was built for
pub fn decode(fuses: &[Vec<bool>]) -> Option<(CellIndex, ImageVariant)> {
    if fuses.len() < 4 || fuses[0][0] || !fuses[0][1] {
        return None;
    }
    let row = arr2num(&fuses[1][..8]) as usize;
    let slot = arr2num(&fuses[2][..8]) as usize;
    let variant = if fuses[3][0] {
        ImageVariant::Alt
    } else {
        ImageVariant::Base
    };
    Some((CellIndex::new(row, slot), variant))
}

/// Ground truth for the simulated ZIA.  `alt_only` sources are only observable when the
/// alternate image is running.
#[derive(Clone, Default)]
pub struct Wiring {
    pub base: HashMap<CellIndex, RoutingSource>,
    pub alt_only: HashMap<CellIndex, RoutingSource>,
}

impl Wiring {
    pub fn with(mut self, row: usize, slot: usize, source: RoutingSource) -> Self {
        self.base.insert(CellIndex::new(row, slot), source);
        self
    }

    pub fn with_alt(mut self, row: usize, slot: usize, source: RoutingSource) -> Self {
        self.alt_only.insert(CellIndex::new(row, slot), source);
        self
    }
}

pub fn sim(profile: &DeviceProfile, wiring: Wiring) -> SimCpld {
    SimCpld::new(profile).with_router(move |fuses| {
        let (cell, variant) = decode(fuses)?;
        match variant {
            ImageVariant::Base => wiring.base.get(&cell).copied(),
            ImageVariant::Alt => wiring
                .alt_only
                .get(&cell)
                .or_else(|| wiring.base.get(&cell))
                .copied(),
        }
    })
}

pub fn synthesizer(profile: &DeviceProfile, with_alt: bool) -> Synthesizer {
    let base = FuseMapTemplate::new(BASE_TEMPLATE).unwrap();
    let alt = with_alt.then(|| FuseMapTemplate::new(ALT_TEMPLATE).unwrap());
    Synthesizer::new(base, alt, Box::new(TaggingCompiler::new(profile)))
}

/// The 40x12 ZIA with only two function blocks bonded out
pub fn two_block_profile() -> DeviceProfile {
    let mut profile = DeviceProfile::xc2c64a();
    profile.name = "xc2c64a-2fb".to_string();
    profile.function_blocks = 2;
    profile
        .excluded_pins
        .extend([zia_probe::profile::Pin::new(0, 8), zia_probe::profile::Pin::new(1, 4)]);
    profile
}
