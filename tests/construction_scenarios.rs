//! Scenario tests for the construction kernel.
//!
//! These tests drive a `Construction` through its public API only and check
//! redefinition paths, batch commits, history and persistence.

use construction_kernel::{
    CodecKind, Construction, ConstructionConfig, ConstructionError, ConstructionInfo,
    ElementRecord, GeoKind, GeoValue, KernelEvent, Macro, Operation, RecordingKernel,
    ReplaceOutcome,
};
use construction_kernel::types::will_auto_create_element;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn recorded(config: ConstructionConfig) -> (Construction, RecordingKernel) {
    let recorder = RecordingKernel::new();
    let construction = Construction::with_kernel(config, Box::new(recorder.clone()));
    (construction, recorder)
}

fn build(construction: &mut Construction, definitions: &[(&str, &str)]) {
    for (label, definition) in definitions {
        construction
            .define(label, definition)
            .unwrap_or_else(|e| panic!("define {} = {}: {}", label, definition, e));
    }
}

fn number(construction: &Construction, label: &str) -> f64 {
    construction
        .value(label)
        .and_then(GeoValue::as_number)
        .unwrap_or_else(|| panic!("{} is not a number", label))
}

fn midpoint() -> Macro {
    Macro {
        name: "Midpoint".to_string(),
        inputs: vec!["P".to_string(), "Q".to_string()],
        output: "M".to_string(),
        body: vec![ElementRecord::new("M", GeoKind::Point, "(P + Q) / 2")],
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Redefinition
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_constant_update_propagates_without_rebuild() {
    let (mut c, recorder) = recorded(ConstructionConfig::default());
    build(&mut c, &[("a", "5"), ("b", "a + 1")]);

    let outcome = c.replace("a", "10").unwrap();

    assert_eq!(outcome, ReplaceOutcome::UpdatedInPlace);
    assert_eq!(number(&c, "b"), 11.0);
    assert_eq!(recorder.resets(), 0);
    assert_eq!(recorder.updates(), 0);
}

#[test]
fn test_self_referential_update_in_place() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "5"), ("b", "a + 1")]);

    assert_eq!(c.replace("a", "a + 1").unwrap(), ReplaceOutcome::UpdatedInPlace);
    assert_eq!(number(&c, "a"), 6.0);
    assert_eq!(number(&c, "b"), 7.0);
    assert!(c.lookup("a").unwrap().is_independent());
}

#[test]
fn test_cycle_through_dependent_point() {
    let mut c = Construction::new();
    build(&mut c, &[("A", "(1, 1)"), ("B", "A + (1, 1)")]);
    let before = c.current_undo_xml().unwrap();

    let err = c.replace("A", "B - (1, 1)").unwrap_err();

    match err {
        ConstructionError::CircularDefinition { label, definition } => {
            assert_eq!(label, "A");
            assert_eq!(definition, "B - (1, 1)");
        }
        other => panic!("expected circular definition, got {}", other),
    }
    assert_eq!(c.current_undo_xml().unwrap(), before);
    assert_eq!(c.value("A"), Some(&GeoValue::Point([1.0, 1.0])));
    assert_eq!(c.value("B"), Some(&GeoValue::Point([2.0, 2.0])));
}

#[test]
fn test_dependent_self_reference_rejected() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "1"), ("b", "a + 1")]);
    let before = c.current_undo_xml().unwrap();

    assert!(matches!(c.replace("b", "b * 2"), Err(ConstructionError::CircularDefinition { .. })));
    assert_eq!(c.current_undo_xml().unwrap(), before);
}

#[test]
fn test_substitution_keeps_label_and_style() {
    let (mut c, recorder) = recorded(ConstructionConfig::default());
    build(&mut c, &[("a", "1"), ("b", "2"), ("c", "3")]);
    let old_id = c.lookup("a").unwrap().id();
    let mut style = c.lookup("a").unwrap().style().clone();
    style.caption = Some("first".to_string());
    style.layer = 4;
    c.set_style("a", style.clone()).unwrap();

    assert_eq!(c.replace("a", "b + c").unwrap(), ReplaceOutcome::Substituted);

    let a = c.lookup("a").unwrap();
    assert_ne!(a.id(), old_id);
    assert!(c.element(old_id).is_none());
    assert_eq!(a.style(), &style);
    assert_eq!(number(&c, "a"), 5.0);
    assert_eq!(c.construction_list(), vec!["b", "c", "a"]);
    assert!(recorder.events().contains(&KernelEvent::Removed("a".to_string())));
    assert_eq!(recorder.resets(), 0);
}

#[test]
fn test_general_redefinition_reorders() {
    let (mut c, recorder) = recorded(ConstructionConfig::default());
    build(&mut c, &[("a", "1"), ("b", "a * 2"), ("p", "3"), ("q", "p + 1")]);

    assert_eq!(c.replace("a", "q * 10").unwrap(), ReplaceOutcome::Rebuilt);

    assert_eq!(c.construction_list(), vec!["p", "q", "a", "b"]);
    assert_eq!(number(&c, "b"), 80.0);
    assert!(c.state().is_topologically_ordered());
    assert_eq!(recorder.resets(), 1);
    assert_eq!(recorder.updates(), 1);
}

#[test]
fn test_unknown_element() {
    let mut c = Construction::new();
    assert!(matches!(c.replace("nope", "1"), Err(ConstructionError::UnknownElement(_))));
}

#[test]
fn test_eval_failure_reports_operation_and_label() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "1"), ("b", "a + 1"), ("t", "\"x\"")]);

    match c.replace("a", "t").unwrap_err() {
        ConstructionError::Rebuild(failure) => {
            assert_eq!(failure.operation, Operation::Replace);
            assert_eq!(failure.element.as_deref(), Some("b"));
        }
        other => panic!("expected rebuild failure, got {}", other),
    }
    assert_eq!(number(&c, "a"), 1.0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch Mode
// ─────────────────────────────────────────────────────────────────────────────

const BATCH_BASE: &[(&str, &str)] = &[("x", "10"), ("a", "1"), ("b", "2"), ("c", "a + b"), ("y", "5")];
const BATCH_EDITS: &[(&str, &str)] = &[("a", "x / 2"), ("b", "y * 2"), ("c", "a * b")];

#[test]
fn test_batch_commit_single_rebuild() {
    let (mut c, recorder) = recorded(ConstructionConfig::default());
    build(&mut c, BATCH_BASE);
    recorder.clear();

    c.start_collecting_redefines();
    for (label, definition) in BATCH_EDITS {
        assert_eq!(c.replace(label, definition).unwrap(), ReplaceOutcome::Deferred);
    }
    assert_eq!(recorder.resets(), 0);
    assert!(c.commit().unwrap());
    assert!(!c.is_collecting_redefines());

    assert_eq!(recorder.resets(), 1);
    assert_eq!(recorder.updates(), 1);
    assert_eq!(
        recorder.events(),
        vec![KernelEvent::Reset, KernelEvent::UpdateConstruction]
    );
}

#[test]
fn test_batch_matches_sequential() {
    let mut batched = Construction::new();
    build(&mut batched, BATCH_BASE);
    batched.start_collecting_redefines();
    for (label, definition) in BATCH_EDITS {
        batched.replace(label, definition).unwrap();
    }
    batched.commit().unwrap();

    let mut sequential = Construction::new();
    build(&mut sequential, BATCH_BASE);
    for (label, definition) in BATCH_EDITS {
        sequential.replace(label, definition).unwrap();
    }

    for label in ["x", "a", "b", "c", "y"] {
        assert_eq!(batched.value(label), sequential.value(label), "value of {}", label);
    }
    assert_eq!(number(&batched, "c"), 50.0);
    assert_eq!(batched.construction_list(), sequential.construction_list());
}

#[test]
fn test_empty_commit_is_noop() {
    let (mut c, recorder) = recorded(ConstructionConfig::default());
    build(&mut c, &[("a", "1")]);
    c.start_collecting_redefines();
    assert!(!c.commit().unwrap());
    assert!(!c.is_collecting_redefines());
    assert_eq!(recorder.resets(), 0);
}

#[test]
fn test_replace_after_commit_applies_immediately() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "1"), ("b", "a + 1")]);
    c.start_collecting_redefines();
    c.replace("b", "a * 10").unwrap();
    assert!(c.commit().unwrap());
    assert_ne!(c.replace("b", "a * 20").unwrap(), ReplaceOutcome::Deferred);
    assert_eq!(number(&c, "b"), 20.0);
}

#[test]
fn test_stop_discards_buffer() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "1"), ("b", "a + 1")]);
    c.start_collecting_redefines();
    c.replace("b", "a * 100").unwrap();
    c.stop_collecting_redefines();
    assert!(!c.commit().unwrap());
    assert_eq!(number(&c, "b"), 2.0);
}

#[test]
fn test_failed_commit_leaves_state_and_batch_mode() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "1"), ("b", "a + 1"), ("t", "\"x\"")]);
    let before = c.current_undo_xml().unwrap();
    c.start_collecting_redefines();
    c.replace("a", "t").unwrap();

    assert!(c.commit().is_err());
    assert!(!c.is_collecting_redefines());
    assert_eq!(c.current_undo_xml().unwrap(), before);
}

// ─────────────────────────────────────────────────────────────────────────────
// History
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_undo_to_initial_state() {
    let mut c = Construction::new();
    let initial = c.current_undo_xml().unwrap();
    build(&mut c, &[("a", "1"), ("b", "a + 1"), ("A", "(0, 0)"), ("B", "A + (a, b)")]);
    c.replace("a", "7").unwrap();
    let newest = c.current_undo_xml().unwrap();

    assert!(!c.redo_possible());
    let mut undone = 0;
    while c.undo_possible() {
        assert!(c.undo().unwrap());
        undone += 1;
    }
    assert_eq!(undone, 5);
    assert_eq!(c.current_undo_xml().unwrap(), initial);
    assert!(!c.undo().unwrap());

    while c.redo_possible() {
        assert!(c.redo().unwrap());
    }
    assert_eq!(c.current_undo_xml().unwrap(), newest);
}

#[test]
fn test_undo_leaves_batch_mode() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "1"), ("b", "a + 1")]);
    c.start_collecting_redefines();
    c.replace("b", "a - 1").unwrap();
    c.undo().unwrap();
    assert!(!c.is_collecting_redefines());
    assert!(c.lookup("b").is_none());
}

#[test]
fn test_undo_depth_limit() {
    let mut c = Construction::with_config(ConstructionConfig { max_undo_depth: 3, ..Default::default() });
    build(&mut c, &[("a", "1"), ("b", "2"), ("d", "3"), ("f", "4")]);
    let mut undone = 0;
    while c.undo().unwrap() {
        undone += 1;
    }
    assert_eq!(undone, 2);
    assert_eq!(c.construction_list(), vec!["a", "b"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_snapshot_rebuild_idempotent() {
    for codec in [CodecKind::Json, CodecKind::Xml] {
        let config = ConstructionConfig { codec, ..Default::default() };
        let mut c = Construction::with_config(config.clone());
        build(
            &mut c,
            &[("A_10", "(1, 2)"), ("A_2", "(3, 4)"), ("n", "2"), ("v", "A_2 - A_10"), ("t", "\"len \" + length(v)")],
        );
        c.define_cas_cell("c1", "n^2").unwrap();
        let text = c.current_undo_xml().unwrap();

        let mut copy = Construction::with_config(config);
        copy.load(&text).unwrap();

        assert_eq!(copy.current_undo_xml().unwrap(), text);
        assert_eq!(copy.name_description_order(), c.name_description_order());
        assert_eq!(copy.label_order(), c.label_order());
        assert_eq!(copy.cas_cells(), vec!["c1"]);
    }
}

#[test]
fn test_info_and_step_travel_with_snapshot() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "1"), ("b", "a + 1"), ("d", "b + 1")]);
    c.set_info(ConstructionInfo {
        title: Some("Triangle".to_string()),
        author: Some("someone".to_string()),
        ..Default::default()
    });
    c.set_construction_step(Some(1));
    let text = c.current_undo_xml().unwrap();

    let mut copy = Construction::new();
    copy.load(&text).unwrap();
    assert_eq!(copy.info().title.as_deref(), Some("Triangle"));
    assert_eq!(copy.construction_step(), Some(1));
    assert!(copy.is_visible_at_step("b"));
    assert!(!copy.is_visible_at_step("d"));
}

#[test]
fn test_macros_travel_with_snapshot() {
    let mut c = Construction::new();
    c.register_macro(midpoint()).unwrap();
    build(&mut c, &[("A", "(0, 0)"), ("B", "(4, 2)"), ("M", "Midpoint(A, B)")]);
    assert_eq!(c.used_macros(), ["Midpoint".to_string()]);
    assert_eq!(c.value("M"), Some(&GeoValue::Point([2.0, 1.0])));
    let text = c.current_undo_xml().unwrap();

    let mut fresh = Construction::new();
    fresh.load(&text).unwrap();
    assert!(fresh.macros().contains("Midpoint"));
    fresh.replace("B", "(8, 8)").unwrap();
    assert_eq!(fresh.value("M"), Some(&GeoValue::Point([4.0, 4.0])));
}

#[test]
fn test_load_rejects_misordered_document() {
    let text = r#"{
        "schema_version": "1.0.0",
        "elements": [
            { "label": "b", "kind": "numeric", "definition": "a + 1" },
            { "label": "a", "kind": "numeric", "definition": "1" }
        ]
    }"#;
    let mut c = Construction::new();
    build(&mut c, &[("z", "9")]);
    match c.load(text).unwrap_err() {
        ConstructionError::Rebuild(failure) => {
            assert_eq!(failure.operation, Operation::Load);
            assert_eq!(failure.element.as_deref(), Some("b"));
        }
        other => panic!("expected rebuild failure, got {}", other),
    }
    assert_eq!(c.construction_list(), vec!["z"]);
}

#[test]
fn test_spreadsheet_cells() {
    assert!(will_auto_create_element("A1"));
    assert!(will_auto_create_element("$B$12"));
    assert!(will_auto_create_element("i"));
    assert!(!will_auto_create_element("a1"));

    let mut c = Construction::new();
    build(&mut c, &[("total", "A1 + A2")]);
    assert_eq!(number(&c, "total"), 0.0);
    c.set_value("A1", GeoValue::Number(3.0)).unwrap();
    assert_eq!(number(&c, "total"), 3.0);
    let text = c.current_undo_xml().unwrap();
    let mut copy = Construction::new();
    copy.load(&text).unwrap();
    assert!(copy.lookup("A2").unwrap().is_auxiliary());
}

#[test]
fn test_redefinition_creates_spreadsheet_cells() {
    let mut c = Construction::new();
    build(&mut c, &[("a", "1"), ("b", "a + 1")]);
    assert_eq!(c.eval_command("a = A1 + 1").unwrap(), "a");
    assert_eq!(c.construction_list(), vec!["A1", "a", "b"]);
    assert!(c.lookup("A1").unwrap().is_auxiliary());
    c.set_value("A1", GeoValue::Number(4.0)).unwrap();
    assert_eq!(number(&c, "b"), 6.0);

    c.start_collecting_redefines();
    assert_eq!(c.replace("b", "B1 * 2").unwrap(), ReplaceOutcome::Deferred);
    assert!(c.commit().unwrap());
    assert_eq!(number(&c, "b"), 0.0);
    assert!(c.state().is_topologically_ordered());

    for _ in 0..3 {
        assert!(c.undo().unwrap());
    }
    assert!(!c.contains("A1"));
    assert_eq!(number(&c, "b"), 2.0);
}
