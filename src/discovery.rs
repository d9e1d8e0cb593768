//! Automated ZIA routing discovery.
//!
//! For every (row, choice) cell the device is programmed with an image that routes exactly
//! that choice to a product term driving the watched output.  The device is then put in
//! INTEST and every plausible source is wiggled in turn through the boundary register.  The
//! source whose rising edge shows up on the watched output is the one wired to the cell.
//!
//! Because a capture is only shifted out by the *next* DR scan, each probe is a run of scans
//! whose scan-outs are the responses to the scan before: a prime that sets up a known state,
//! a stimulus, and a trailer that flushes the last response out.  A candidate matches when the
//! watched output is low after the prime and high after the stimulus.  Input buffers get one
//! more scan that drops the pin again, and only match if the output follows it down.  A
//! flip-flop clocked by the same pin would hold its level instead.
//!
//! Some sources only become visible under the alternate design, or with a different pin
//! acting as the reference clock.  The search therefore walks a list of phases and stops at
//! the first one that matches.  Cells that no phase resolves stay unknown and are recorded as
//! exhausted so they can be reviewed by hand.
use std::collections::HashMap;
use std::fmt;
use std::ops::DerefMut;

use embedded_hal::delay::DelayNs;
use tracing::{debug, info, warn};

use crate::cable::Cable;
use crate::error::{Error, Result};
use crate::image::ConfigurationImage;
use crate::isc::Cpld;
use crate::profile::{BoundaryLayout, DeviceProfile, Pin};
use crate::render::{cell_label, ProgressSink};
use crate::store::CheckpointStore;
use crate::synth::{ImageVariant, Synthesizer};
use crate::zia::{CellIndex, Checkpoint, RoutingMap, RoutingSource};

/// One attempt at a cell: which image to program and which pin clocks the macrocells
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchPhase {
    pub variant: ImageVariant,
    pub reference: Pin,
}

impl fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} image, reference {}", self.variant, self.reference)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    pub phases: Vec<SearchPhase>,
    /// Probe cells that an earlier run gave up on
    pub retry_exhausted: bool,
}

impl DiscoveryPolicy {
    /// Base then alternate image for each reference pin, primary reference first
    pub fn for_profile(profile: &DeviceProfile) -> Self {
        let phases = profile
            .reference_pins
            .iter()
            .flat_map(|&reference| {
                [ImageVariant::Base, ImageVariant::Alt]
                    .map(|variant| SearchPhase { variant, reference })
            })
            .collect();
        Self {
            phases,
            retry_exhausted: false,
        }
    }
}

/// A source to try, in the form the boundary register can exercise it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Candidate {
    DedicatedInput,
    InputBuffer(Pin),
    Macrocell(Pin),
}

impl Candidate {
    pub fn source(&self, profile: &DeviceProfile) -> RoutingSource {
        match *self {
            Candidate::DedicatedInput => RoutingSource::DedicatedInput,
            Candidate::InputBuffer(pin) => RoutingSource::InputBuffer {
                pad: profile.pad_index(pin),
            },
            Candidate::Macrocell(pin) => RoutingSource::Macrocell {
                fb: pin.fb,
                mc: pin.mc,
            },
        }
    }

    pub fn label(&self) -> String {
        match self {
            Candidate::DedicatedInput => "inpin".to_string(),
            Candidate::InputBuffer(pin) => format!("{pin} io"),
            Candidate::Macrocell(pin) => format!("{pin} mc"),
        }
    }

    /// Watched level expected in response to each of the candidate's scans but the last
    pub fn expected_levels(&self) -> &'static [bool] {
        match self {
            Candidate::InputBuffer(_) => &[false, true, false],
            Candidate::DedicatedInput | Candidate::Macrocell(_) => &[false, true],
        }
    }
}

/// Everything worth probing with `reference` as the clock, in search order: the dedicated
/// input, every pin's input buffer, then every pin's macrocell.  Excluded pins and the
/// reference itself are left out.  The watched pin stays in, its input and output cells are
/// separate.
pub fn candidates(profile: &DeviceProfile, reference: Pin) -> Vec<Candidate> {
    let usable = |pin: &Pin| *pin != reference && !profile.excluded_pins.contains(pin);

    let mut list = Vec::new();
    if profile.dedicated_input {
        list.push(Candidate::DedicatedInput);
    }
    list.extend(profile.pins().filter(usable).map(Candidate::InputBuffer));
    list.extend(profile.pins().filter(usable).map(Candidate::Macrocell));
    list
}

/// Boundary vectors for one candidate, scanned in order.  Macrocell candidates hold the
/// reference high across the stimulus so their flip-flop clocks the candidate's input in.
/// Input buffers release the pin before the trailer.
pub fn probe_vectors(layout: &BoundaryLayout, candidate: Candidate, reference: Pin) -> Vec<Vec<bool>> {
    let zeros = vec![false; layout.len()];
    let reference = layout.input_bit(reference);
    match candidate {
        Candidate::DedicatedInput => {
            let inpin: Vec<usize> = layout.dedicated_input_bit().into_iter().collect();
            vec![zeros.clone(), layout.vector(&inpin), zeros]
        }
        Candidate::InputBuffer(pin) => vec![
            zeros.clone(),
            layout.vector(&[layout.input_bit(pin)]),
            zeros,
            layout.vector(&[reference]),
        ],
        Candidate::Macrocell(pin) => vec![
            layout.vector(&[reference]),
            layout.vector(&[layout.input_bit(pin), reference]),
            zeros,
        ],
    }
}

/// The state of one discovery: the device, the policy and the checkpoint being filled in
pub struct DiscoverySession {
    profile: DeviceProfile,
    policy: DiscoveryPolicy,
    checkpoint: Checkpoint,
}

impl DiscoverySession {
    pub fn new(profile: DeviceProfile, policy: DiscoveryPolicy) -> Result<Self> {
        let checkpoint = Checkpoint::new(profile.zia_rows, profile.slots_per_row);
        Self::with_checkpoint(profile, policy, checkpoint)
    }

    /// Continue from whatever `store` holds, or start empty
    pub fn resume(
        profile: DeviceProfile,
        policy: DiscoveryPolicy,
        store: &mut dyn CheckpointStore,
    ) -> Result<Self> {
        match store.load()? {
            Some(checkpoint) => {
                info!(
                    "resuming with {} cells resolved, {} exhausted",
                    checkpoint.map.resolved(),
                    checkpoint.exhausted.len()
                );
                if let Some(cell) = checkpoint.cursor {
                    info!("{cell} was in flight, probing it again");
                }
                Self::with_checkpoint(profile, policy, checkpoint)
            }
            None => Self::new(profile, policy),
        }
    }

    fn with_checkpoint(
        profile: DeviceProfile,
        policy: DiscoveryPolicy,
        checkpoint: Checkpoint,
    ) -> Result<Self> {
        profile.validate()?;
        checkpoint.map.check_dims(profile.zia_rows, profile.slots_per_row)?;
        if policy.phases.is_empty() {
            return Err(Error::profile("no search phases"));
        }
        if let Some(phase) = policy.phases.iter().find(|p| !profile.contains(p.reference)) {
            return Err(Error::profile(format!(
                "reference {} is outside the device",
                phase.reference
            )));
        }
        Ok(Self {
            profile,
            policy,
            checkpoint,
        })
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn map(&self) -> &RoutingMap {
        &self.checkpoint.map
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Cells in row-major order, limited to `rows` and `slots` when given
    pub fn cells(&self, rows: Option<&[usize]>, slots: Option<&[usize]>) -> Result<Vec<CellIndex>> {
        let all_rows: Vec<usize> = (0..self.profile.zia_rows).collect();
        let all_slots: Vec<usize> = (0..self.profile.slots_per_row).collect();
        let rows = rows.unwrap_or(&all_rows);
        let slots = slots.unwrap_or(&all_slots);

        let mut cells = Vec::with_capacity(rows.len() * slots.len());
        for &row in rows {
            for &slot in slots {
                let cell = CellIndex::new(row, slot);
                if !self.checkpoint.map.contains(cell) {
                    return Err(Error::checkpoint(format!("{cell} is outside the ZIA")));
                }
                cells.push(cell);
            }
        }
        Ok(cells)
    }

    fn needs_probe(&self, cell: CellIndex) -> bool {
        self.checkpoint.map.get(cell).is_none()
            && (self.policy.retry_exhausted || !self.checkpoint.exhausted.contains(&cell))
    }
}

/// What a `run` did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub resolved: Vec<(CellIndex, RoutingSource)>,
    pub exhausted: Vec<CellIndex>,
    /// Cells already resolved, or exhausted without `retry_exhausted`
    pub skipped: usize,
}

pub struct Engine<'a, T, D> {
    cpld: &'a mut Cpld<T, D>,
    synth: &'a mut Synthesizer,
    store: &'a mut dyn CheckpointStore,
    progress: &'a mut dyn ProgressSink,
}

impl<'a, T, U, D> Engine<'a, T, D>
    where T: DerefMut<Target=U>,
          U: Cable + ?Sized,
          D: DelayNs
{
    pub fn new(
        cpld: &'a mut Cpld<T, D>,
        synth: &'a mut Synthesizer,
        store: &'a mut dyn CheckpointStore,
        progress: &'a mut dyn ProgressSink,
    ) -> Self {
        Self {
            cpld,
            synth,
            store,
            progress,
        }
    }

    /// Probe `cells` in order.  The checkpoint is saved when a cell is started and again when
    /// it is settled, so an interrupted run loses at most the cell in flight.
    pub fn run(&mut self, session: &mut DiscoverySession, cells: &[CellIndex]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for &cell in cells {
            if !session.needs_probe(cell) {
                summary.skipped += 1;
                continue;
            }

            session.checkpoint.cursor = Some(cell);
            self.store.save(&session.checkpoint)?;

            match self.resolve(session, cell)? {
                Some(source) => {
                    let label = cell_label(Some(source), session.profile.macrocells_per_block);
                    info!("{cell}: {label}");
                    session.checkpoint.map.set(cell, source);
                    session.checkpoint.exhausted.remove(&cell);
                    summary.resolved.push((cell, source));
                }
                None => {
                    warn!("{cell}: no source found in any search phase");
                    session.checkpoint.exhausted.insert(cell);
                    summary.exhausted.push(cell);
                }
            }

            session.checkpoint.cursor = None;
            self.store.save(&session.checkpoint)?;
        }
        self.progress.finished(&session.checkpoint.map);
        Ok(summary)
    }

    fn resolve(&mut self, session: &DiscoverySession, cell: CellIndex) -> Result<Option<RoutingSource>> {
        let profile = &session.profile;
        let mut images: HashMap<ImageVariant, ConfigurationImage> = HashMap::new();
        let mut programmed = None;

        for phase in &session.policy.phases {
            if !self.synth.has_variant(phase.variant) {
                debug!("{cell}: skipping {phase}, no template");
                continue;
            }
            info!("{cell}: searching with {phase}");

            if programmed != Some(phase.variant) {
                if !images.contains_key(&phase.variant) {
                    let image = self.synth.image(profile, cell.row, cell.slot, phase.variant)?;
                    images.insert(phase.variant, image);
                }
                self.cpld.erase()?;
                self.cpld.program(&images[&phase.variant])?;
                programmed = Some(phase.variant);
            }

            self.cpld.enter_intest()?;
            let found = self.search(session, cell, phase.reference)?;
            self.cpld.sm.reset()?;
            if let Some(source) = found {
                return Ok(Some(source));
            }
        }
        Ok(None)
    }

    // Must start in Exit1-IR with INTEST loaded
    fn search(
        &mut self,
        session: &DiscoverySession,
        cell: CellIndex,
        reference: Pin,
    ) -> Result<Option<RoutingSource>> {
        let profile = &session.profile;
        let layout = profile.boundary();
        let watch = layout.output_bit(profile.watch_pin);

        for candidate in candidates(profile, reference) {
            let label = candidate.label();
            self.progress.trying(&session.checkpoint.map, cell, &label);
            let vectors = probe_vectors(&layout, candidate, reference);
            if self.probe(&vectors, candidate.expected_levels(), watch)? {
                return Ok(Some(candidate.source(profile)));
            }
        }
        Ok(None)
    }

    fn probe(&mut self, vectors: &[Vec<bool>], expected: &[bool], watch: usize) -> Result<bool> {
        let sm = &mut self.cpld.sm;
        let mut levels = Vec::with_capacity(expected.len());
        for (i, vector) in vectors.iter().enumerate() {
            sm.shift_dr_from_exit1()?;
            let out = sm.shift(vector, true)?;
            // the first scan-out predates this candidate
            if i > 0 {
                levels.push(out[watch]);
            }
        }
        let trace: String = levels.iter().map(|&b| if b { '1' } else { '0' }).collect();
        debug!("watched output {trace}");
        Ok(levels == expected)
    }
}
