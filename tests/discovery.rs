mod common;

use common::{sim, synthesizer, two_block_profile, NoDelay, Wiring};
use zia_probe::discovery::{DiscoveryPolicy, DiscoverySession, Engine, SearchPhase};
use zia_probe::isc::Cpld;
use zia_probe::profile::{DeviceProfile, Pin};
use zia_probe::render::{NoProgress, ProgressSink};
use zia_probe::statemachine::JtagSM;
use zia_probe::store::{CheckpointStore, JsonFileStore, MemoryStore};
use zia_probe::synth::ImageVariant;
use zia_probe::zia::{CellIndex, Checkpoint, RoutingMap, RoutingSource};
use zia_probe::Error;

/// Counts progress callbacks per cell
#[derive(Default)]
struct Recorder {
    tried: Vec<(CellIndex, String)>,
    finished: usize,
}

impl ProgressSink for Recorder {
    fn trying(&mut self, _map: &RoutingMap, cell: CellIndex, label: &str) {
        self.tried.push((cell, label.to_string()));
    }

    fn finished(&mut self, _map: &RoutingMap) {
        self.finished += 1;
    }
}

fn base_only(reference: Pin) -> DiscoveryPolicy {
    DiscoveryPolicy {
        phases: vec![SearchPhase { variant: ImageVariant::Base, reference }],
        retry_exhausted: false,
    }
}

#[test]
fn macrocell_cell_resolves_and_nothing_else_changes() {
    let profile = two_block_profile();
    let wiring = Wiring::default().with(3, 5, RoutingSource::Macrocell { fb: 1, mc: 9 });
    let mut device = sim(&profile, wiring);
    let mut synth = synthesizer(&profile, false);
    let mut store = MemoryStore::default();
    let mut progress = NoProgress;

    let mut session = DiscoverySession::new(profile.clone(), base_only(Pin::new(1, 4))).unwrap();
    let cells = session.cells(Some(&[3]), None).unwrap();
    assert_eq!(cells.len(), 12);

    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &cells)
        .unwrap();

    assert_eq!(
        summary.resolved,
        vec![(CellIndex::new(3, 5), RoutingSource::Macrocell { fb: 1, mc: 9 })]
    );
    assert_eq!(summary.exhausted.len(), 11);
    assert_eq!(session.map().resolved(), 1);
    for row in 0..profile.zia_rows {
        for slot in 0..profile.slots_per_row {
            let cell = CellIndex::new(row, slot);
            if cell != CellIndex::new(3, 5) {
                assert_eq!(session.map().get(cell), None, "{cell}");
            }
        }
    }

    // one erase per cell
    assert_eq!(cpld.sm.cable.erases(), 12);

    let saved = store.checkpoint.unwrap();
    assert_eq!(&saved, session.checkpoint());
    assert_eq!(saved.cursor, None);
    assert_eq!(store.saves, 24);
}

#[test]
fn row_six_of_the_32_macrocell_part() {
    // ZIA row 6 of the XC2C32A as published in xc2bit
    let expected = [
        RoutingSource::InputBuffer { pad: 6 },
        RoutingSource::DedicatedInput,
        RoutingSource::InputBuffer { pad: 20 },
        RoutingSource::Macrocell { fb: 0, mc: 0 },
        RoutingSource::Macrocell { fb: 1, mc: 3 },
        RoutingSource::Macrocell { fb: 1, mc: 13 },
    ];
    let profile = DeviceProfile::xc2c32a();
    let wiring = expected
        .iter()
        .enumerate()
        .fold(Wiring::default(), |w, (slot, &src)| w.with(6, slot, src));
    let mut device = sim(&profile, wiring);
    let mut synth = synthesizer(&profile, false);
    let mut store = MemoryStore::default();
    let mut progress = Recorder::default();

    let policy = DiscoveryPolicy::for_profile(&profile);
    let mut session = DiscoverySession::new(profile.clone(), policy).unwrap();
    let cells = session.cells(Some(&[6]), None).unwrap();

    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &cells)
        .unwrap();

    assert!(summary.exhausted.is_empty());
    assert_eq!(session.map().row(6), expected.map(Some).as_slice());
    assert_eq!(progress.finished, 1);
    assert_eq!(progress.tried[0], (CellIndex::new(6, 0), "inpin".to_string()));

    // GCK0 only shows up once another pin is the reference, without reprogramming
    let gck0: Vec<&str> = progress
        .tried
        .iter()
        .filter(|(cell, _)| *cell == CellIndex::new(6, 2))
        .map(|(_, label)| label.as_str())
        .collect();
    assert_eq!(gck0.last(), Some(&"FB2_5 io"));
    assert_eq!(gck0.iter().filter(|&&l| l == "inpin").count(), 2);
    assert_eq!(cpld.sm.cable.erases(), 6);
}

#[test]
fn alternate_image_is_tried_when_the_base_finds_nothing() {
    let profile = DeviceProfile::xc2c32a();
    let wiring = Wiring::default().with_alt(2, 3, RoutingSource::Macrocell { fb: 0, mc: 2 });
    let mut device = sim(&profile, wiring);
    let mut synth = synthesizer(&profile, true);
    let mut store = MemoryStore::default();
    let mut progress = NoProgress;

    let policy = DiscoveryPolicy::for_profile(&profile);
    let mut session = DiscoverySession::new(profile.clone(), policy).unwrap();
    let cells = [CellIndex::new(2, 3)];

    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &cells)
        .unwrap();

    assert_eq!(summary.resolved.len(), 1);
    assert_eq!(
        session.map().get(CellIndex::new(2, 3)),
        Some(RoutingSource::Macrocell { fb: 0, mc: 2 })
    );
    // base, then alt
    assert_eq!(cpld.sm.cable.erases(), 2);
}

#[test]
fn gck0_macrocell_is_not_mistaken_for_its_input_buffer() {
    let profile = DeviceProfile::xc2c32a();
    let gck0_mc = RoutingSource::Macrocell { fb: 1, mc: 4 };
    let gck0_io = RoutingSource::InputBuffer { pad: 20 };
    let wiring = Wiring::default().with(1, 3, gck0_mc).with(1, 4, gck0_io);
    let mut device = sim(&profile, wiring);
    let mut synth = synthesizer(&profile, true);
    let mut store = MemoryStore::default();
    let mut progress = NoProgress;

    let policy = DiscoveryPolicy::for_profile(&profile);
    let mut session = DiscoverySession::new(profile.clone(), policy).unwrap();
    let cells = [CellIndex::new(1, 3), CellIndex::new(1, 4)];

    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &cells)
        .unwrap();

    // GCK0 clocks its own flip-flop, so the output never falls back with the pad
    assert_ne!(session.map().get(cells[0]), Some(gck0_io));
    assert_eq!(summary.exhausted, vec![cells[0]]);
    assert_eq!(session.map().get(cells[1]), Some(gck0_io));
}

#[test]
fn watched_pin_input_buffer_resolves() {
    let profile = DeviceProfile::xc2c32a();
    let source = RoutingSource::InputBuffer {
        pad: profile.pad_index(profile.watch_pin),
    };
    assert_eq!(source, RoutingSource::InputBuffer { pad: 8 });
    let mut device = sim(&profile, Wiring::default().with(1, 3, source));
    let mut synth = synthesizer(&profile, true);
    let mut store = MemoryStore::default();
    let mut progress = Recorder::default();

    let policy = DiscoveryPolicy::for_profile(&profile);
    let mut session = DiscoverySession::new(profile.clone(), policy).unwrap();
    let cell = CellIndex::new(1, 3);

    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &[cell])
        .unwrap();

    assert_eq!(summary.resolved, vec![(cell, source)]);
    assert_eq!(progress.tried.last(), Some(&(cell, "FB1_9 io".to_string())));
    // found under the first phase
    assert_eq!(cpld.sm.cable.erases(), 1);
}

#[test]
fn exhausted_cells_are_recorded_and_skipped_until_retried() {
    let profile = DeviceProfile::xc2c32a();
    let mut device = sim(&profile, Wiring::default());
    let mut synth = synthesizer(&profile, true);
    let mut store = MemoryStore::default();
    let mut progress = NoProgress;
    let cells = [CellIndex::new(0, 0)];

    {
        let policy = DiscoveryPolicy::for_profile(&profile);
        let mut session = DiscoverySession::new(profile.clone(), policy).unwrap();
        let sm = JtagSM::new(&mut device).unwrap();
        let mut cpld = Cpld::new(sm, NoDelay, &profile);
        let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
            .run(&mut session, &cells)
            .unwrap();
        assert_eq!(summary.exhausted, cells.to_vec());
        assert!(session.checkpoint().exhausted.contains(&cells[0]));
        assert_eq!(session.map().get(cells[0]), None);
    }
    // three references, each with a base and an alternate image
    let erases = device.erases();
    assert_eq!(erases, 6);

    {
        let policy = DiscoveryPolicy::for_profile(&profile);
        let mut session = DiscoverySession::resume(profile.clone(), policy, &mut store).unwrap();
        let sm = JtagSM::new(&mut device).unwrap();
        let mut cpld = Cpld::new(sm, NoDelay, &profile);
        let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
            .run(&mut session, &cells)
            .unwrap();
        assert_eq!(summary.skipped, 1);
    }
    assert_eq!(device.erases(), erases);

    {
        let mut policy = DiscoveryPolicy::for_profile(&profile);
        policy.retry_exhausted = true;
        let mut session = DiscoverySession::resume(profile.clone(), policy, &mut store).unwrap();
        let sm = JtagSM::new(&mut device).unwrap();
        let mut cpld = Cpld::new(sm, NoDelay, &profile);
        let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
            .run(&mut session, &cells)
            .unwrap();
        assert_eq!(summary.exhausted, cells.to_vec());
    }
    assert_eq!(device.erases(), erases * 2);
}

#[test]
fn resolved_cells_are_never_probed_again() {
    let profile = DeviceProfile::xc2c32a();
    let mut checkpoint = Checkpoint::new(profile.zia_rows, profile.slots_per_row);
    checkpoint.map.set(CellIndex::new(0, 0), RoutingSource::InputBuffer { pad: 0 });
    let mut store = MemoryStore {
        checkpoint: Some(checkpoint),
        saves: 0,
    };

    let mut device = sim(&profile, Wiring::default());
    let mut synth = synthesizer(&profile, true);
    let mut progress = Recorder::default();
    let policy = DiscoveryPolicy::for_profile(&profile);
    let mut session = DiscoverySession::resume(profile.clone(), policy, &mut store).unwrap();

    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &[CellIndex::new(0, 0)])
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert!(progress.tried.is_empty());
    assert_eq!(store.saves, 0);
    assert_eq!(cpld.sm.cable.erases(), 0);
}

#[test]
fn interrupted_run_leaves_the_cursor_on_the_cell_in_flight() {
    let profile = DeviceProfile::xc2c32a();
    let mut device = sim(&profile, Wiring::default());
    let mut synth = synthesizer(&profile, false);
    let mut store = MemoryStore::default();
    let mut progress = NoProgress;
    let policy = DiscoveryPolicy::for_profile(&profile);
    let mut session = DiscoverySession::new(profile.clone(), policy).unwrap();

    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    cpld.sm.cable.fail_after(5000);
    let err = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &[CellIndex::new(4, 1)])
        .unwrap_err();

    assert!(matches!(err, Error::Transport { .. }));
    let saved = store.checkpoint.unwrap();
    assert_eq!(saved.cursor, Some(CellIndex::new(4, 1)));
    assert!(saved.exhausted.is_empty());
}

#[test]
fn disconnect_during_search_reports_the_first_failure() {
    let profile = DeviceProfile::xc2c32a();
    let mut device = sim(&profile, Wiring::default());
    let mut synth = synthesizer(&profile, false);
    let mut store = MemoryStore::default();
    let mut progress = Recorder::default();
    let mut session = DiscoverySession::new(profile.clone(), base_only(Pin::new(1, 4))).unwrap();

    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    // past erase and program, well inside the candidate scan
    cpld.sm.cable.fail_after(20_000);
    let err = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &[CellIndex::new(4, 1)])
        .unwrap_err();

    assert!(
        matches!(err, Error::Transport { ref reason } if reason.starts_with("simulated probe disconnect")),
        "{err}"
    );
    assert!(progress.tried.len() > 1);
    assert_eq!(store.checkpoint.unwrap().cursor, Some(CellIndex::new(4, 1)));
}

#[test]
fn file_checkpoint_resumes_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zia_work_dump.json");
    let profile = DeviceProfile::xc2c32a();
    let wiring = Wiring::default()
        .with(6, 0, RoutingSource::InputBuffer { pad: 6 })
        .with(6, 1, RoutingSource::DedicatedInput);
    let mut device = sim(&profile, wiring);
    let mut synth = synthesizer(&profile, false);
    let mut progress = NoProgress;
    let cells = [CellIndex::new(6, 0), CellIndex::new(6, 1)];

    {
        let mut store = JsonFileStore::new(&path);
        let policy = base_only(Pin::new(1, 4));
        let mut session = DiscoverySession::resume(profile.clone(), policy, &mut store).unwrap();
        let sm = JtagSM::new(&mut device).unwrap();
        let mut cpld = Cpld::new(sm, NoDelay, &profile);
        Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
            .run(&mut session, &cells)
            .unwrap();
    }
    let erases = device.erases();

    let mut store = JsonFileStore::new(&path);
    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.map.get(cells[0]), Some(RoutingSource::InputBuffer { pad: 6 }));
    assert_eq!(saved.map.get(cells[1]), Some(RoutingSource::DedicatedInput));

    let policy = base_only(Pin::new(1, 4));
    let mut session = DiscoverySession::resume(profile.clone(), policy, &mut store).unwrap();
    let sm = JtagSM::new(&mut device).unwrap();
    let mut cpld = Cpld::new(sm, NoDelay, &profile);
    let summary = Engine::new(&mut cpld, &mut synth, &mut store, &mut progress)
        .run(&mut session, &cells)
        .unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(cpld.sm.cable.erases(), erases);
}
