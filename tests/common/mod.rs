#![allow(dead_code)]

use floorplan_txn::scenario::{BeamSite, Scenario};
use floorplan_txn::{Editor, EngineConfig, EntityDump};

/// Editor over a layer holding one beam with the given contents.
pub fn editor_with_beam_site(openings: usize, panels: usize, contents: usize) -> (Editor, BeamSite) {
    let mut scenario = Scenario::new();
    let site = scenario.beam_site(openings, panels, contents).unwrap();
    (scenario.into_editor(EngineConfig::default()), site)
}

pub fn snapshot(editor: &Editor) -> Vec<EntityDump> {
    editor.document().dump().unwrap()
}

pub fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
