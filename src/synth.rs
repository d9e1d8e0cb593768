//! Synthetic test images.  A fuse-map template is a JED file with two holes, `{zia}` and
//! `{pterm}`.  Filling them enables exactly one ZIA choice and points one product term at it,
//! and the bitstream compiler turns the result into a configuration image.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::image::ConfigurationImage;
use crate::profile::DeviceProfile;

const ZIA_HOLE: &str = "{zia}";
const PTERM_HOLE: &str = "{pterm}";

/// Which of the two design templates an image is built from.  They differ only in how the
/// watched output is driven, so a source that is invisible through one may show in the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageVariant {
    Base,
    Alt,
}

impl fmt::Display for ImageVariant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImageVariant::Base => write!(f, "base"),
            ImageVariant::Alt => write!(f, "alt"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuseMapTemplate {
    text: String,
}

impl FuseMapTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        for hole in [ZIA_HOLE, PTERM_HOLE] {
            if !text.contains(hole) {
                return Err(Error::template(format!("template has no {hole} field")));
            }
        }
        Ok(Self { text })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::new(fs::read_to_string(path)?)
    }

    pub fn render(&self, zia: &str, pterm: &str) -> String {
        self.text.replace(ZIA_HOLE, zia).replace(PTERM_HOLE, pterm)
    }
}

/// The ZIA fuses of the whole array with only `slot` of `row` selected
pub fn zia_field(profile: &DeviceProfile, row: usize, slot: usize) -> String {
    (0..profile.zia_rows)
        .map(|r| {
            if r == row {
                profile.zia_patterns[slot].as_str()
            } else {
                profile.zia_idle.as_str()
            }
        })
        .collect()
}

/// Product-term fuses: `01` on the ZIA row under test, `11` elsewhere
pub fn pterm_field(profile: &DeviceProfile, row: usize) -> String {
    (0..profile.zia_rows)
        .map(|r| if r == row { "01" } else { "11" })
        .collect()
}

/// Turns fuse-map text into a configuration image
pub trait BitstreamCompiler {
    fn compile(&mut self, fuse_map: &str) -> Result<ConfigurationImage>;
}

/// Runs a JED-to-crbit converter such as `xc2jed2crbit`.  The fuse map is written into
/// `work_dir` and its path passed as the only argument; crbit text is read from stdout.
pub struct ExternalCompiler {
    program: PathBuf,
    work_dir: PathBuf,
}

impl ExternalCompiler {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
        }
    }
}

impl BitstreamCompiler for ExternalCompiler {
    fn compile(&mut self, fuse_map: &str) -> Result<ConfigurationImage> {
        let jed = self.work_dir.join("zia-probe-work.jed");
        fs::write(&jed, fuse_map)?;
        debug!("running {} {}", self.program.display(), jed.display());

        let output = Command::new(&self.program)
            .arg(&jed)
            .output()
            .map_err(|e| Error::compiler(&self.program, e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::compiler(
                &self.program,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|_| Error::compiler(&self.program, "output is not text"))?;
        ConfigurationImage::from_crbit(&text)
    }
}

/// Builds the test image for one ZIA cell
pub struct Synthesizer {
    base: FuseMapTemplate,
    alt: Option<FuseMapTemplate>,
    compiler: Box<dyn BitstreamCompiler>,
}

impl Synthesizer {
    pub fn new(
        base: FuseMapTemplate,
        alt: Option<FuseMapTemplate>,
        compiler: Box<dyn BitstreamCompiler>,
    ) -> Self {
        Self { base, alt, compiler }
    }

    pub fn has_variant(&self, variant: ImageVariant) -> bool {
        match variant {
            ImageVariant::Base => true,
            ImageVariant::Alt => self.alt.is_some(),
        }
    }

    pub fn fuse_map(
        &self,
        profile: &DeviceProfile,
        row: usize,
        slot: usize,
        variant: ImageVariant,
    ) -> Result<String> {
        if row >= profile.zia_rows || slot >= profile.slots_per_row {
            return Err(Error::template(format!("no ZIA cell at row {row} choice {slot}")));
        }
        let template = match variant {
            ImageVariant::Base => &self.base,
            ImageVariant::Alt => self
                .alt
                .as_ref()
                .ok_or_else(|| Error::template("no alternate template loaded"))?,
        };
        Ok(template.render(&zia_field(profile, row, slot), &pterm_field(profile, row)))
    }

    /// Fill, compile and check the image for (`row`, `slot`)
    pub fn image(
        &mut self,
        profile: &DeviceProfile,
        row: usize,
        slot: usize,
        variant: ImageVariant,
    ) -> Result<ConfigurationImage> {
        let fuse_map = self.fuse_map(profile, row, slot, variant)?;
        let image = self.compiler.compile(&fuse_map)?;
        image.check_geometry(profile.image_rows, profile.image_width)?;
        Ok(image)
    }
}
