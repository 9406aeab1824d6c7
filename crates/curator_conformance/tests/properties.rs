//! Invariants of the curator that must hold for every project: stable
//! identities, complete dependency analysis, idempotent scans, coalesced jobs
//! and consistent lookup tables.

use std::sync::atomic::AtomicBool;

use curator_assets::TransformState;
use curator_common::{Guid, Status};
use curator_conformance::{drain, TestProject, ALIAS};
use curator_core::{CuratorEvent, TransformFlags, TransformTicket};
use curator_diagnostics::codes;

#[test]
fn guid_survives_rescans_and_setting_changes() {
    let p = TestProject::new();
    p.write("Mesh.ext", "{}");
    p.scan();
    let guid = p.guid("Mesh.ext");

    p.scan();
    assert_eq!(p.guid("Mesh.ext"), guid);

    p.write("Mesh.ext", r#"{ "settings": { "scale": 4 } }"#);
    p.scan();
    assert_eq!(p.guid("Mesh.ext"), guid);
}

#[test]
fn declared_guid_is_used() {
    let p = TestProject::new();
    let declared = Guid::from_u128(0x00c0ffee_0000_4000_8000_000000000001);
    p.write("Mesh.ext", &format!(r#"{{ "guid": "{declared}" }}"#));
    p.scan();
    assert_eq!(p.guid("Mesh.ext"), declared);
    assert!(p.curator.find_sub_asset(&declared.to_string()).is_some());
}

#[test]
fn missing_dependency_is_reported_direct_and_transitive() {
    let p = TestProject::new();
    p.write_with_deps("A.ext", &["B.ext"]);
    p.write_with_deps("B.ext", &["C.ext"]);
    p.write("C.ext", "{}");
    p.scan();
    assert_eq!(p.state("A.ext"), TransformState::NeedsTransform);

    p.remove("C.ext");
    p.scan();
    assert_eq!(p.state("B.ext"), TransformState::MissingTransformDependency);
    assert_eq!(p.state("A.ext"), TransformState::MissingTransformDependency);

    let notes = |rel: &str| -> Vec<String> {
        p.log(rel)
            .into_iter()
            .filter(|e| e.code == codes::MISSING_DEPENDENCY)
            .flat_map(|e| e.notes)
            .collect()
    };
    let b = notes("B.ext");
    assert!(b.iter().any(|n| n.starts_with("direct:") && n.contains("C.ext")));
    assert!(!b.iter().any(|n| n.starts_with("transitive:")));
    let a = notes("A.ext");
    assert!(a
        .iter()
        .any(|n| n.starts_with("transitive:") && n.contains(&TestProject::qualified("B.ext"))));
    assert!(!a.iter().any(|n| n.starts_with("direct:")));
}

#[test]
fn every_cycle_member_is_reported_and_never_transformed() {
    let p = TestProject::new();
    p.write_with_deps("A.ext", &["B.ext"]);
    p.write_with_deps("B.ext", &["A.ext"]);
    p.write_with_deps("User.ext", &["A.ext"]);
    p.scan();

    for rel in ["A.ext", "B.ext", "User.ext"] {
        assert_eq!(p.state(rel), TransformState::CircularDependency, "{rel}");
    }
    let notes: Vec<String> = p
        .log("A.ext")
        .into_iter()
        .filter(|e| e.code == codes::CIRCULAR_DEPENDENCY)
        .flat_map(|e| e.notes)
        .collect();
    assert!(notes.iter().any(|n| n.contains(&TestProject::qualified("A.ext"))));
    assert!(notes.iter().any(|n| n.contains(&TestProject::qualified("B.ext"))));

    let ticket = p.submit("A.ext");
    assert!(matches!(
        ticket,
        TransformTicket::Blocked(TransformState::CircularDependency)
    ));
    let status = p
        .curator
        .transform_all_assets(TransformFlags::default(), &AtomicBool::new(false));
    assert_eq!(status, Status::Success);
    assert_eq!(p.manager.executions(), 0);
    assert_ne!(p.state("A.ext"), TransformState::UpToDate);
}

#[test]
fn rescanning_unchanged_files_publishes_nothing() {
    let p = TestProject::new();
    p.write_with_deps("A.ext", &["B.ext", "Ghost.ext"]);
    p.write("B.ext", r#"{ "outputs": ["lod1"] }"#);
    p.write_with_deps("C.ext", &["D.ext"]);
    p.write_with_deps("D.ext", &["C.ext"]);
    p.scan();
    assert!(p.transform("B.ext").is_success());

    let revision = p.curator.revision();
    let mut rx = p.curator.subscribe();
    p.scan();
    assert!(drain(&mut rx).is_empty());
    assert_eq!(p.curator.revision(), revision);
}

#[test]
fn duplicate_requests_run_once() {
    let p = TestProject::new();
    p.write("Mesh.ext", "{}");
    p.scan();

    p.manager.gate.close();
    let TransformTicket::Queued(first) = p.submit("Mesh.ext") else {
        panic!("first request was not queued");
    };
    let TransformTicket::Queued(second) = p.submit("Mesh.ext") else {
        panic!("second request was not queued");
    };
    assert!(first.same_job(&second));
    p.manager.gate.open();

    assert!(first.wait().is_success());
    assert!(second.wait().is_success());
    assert_eq!(p.manager.executions(), 1);
    assert_eq!(p.state("Mesh.ext"), TransformState::UpToDate);
}

#[test]
fn lookup_tables_match_the_database() {
    let p = TestProject::new();
    p.write("Mesh.ext", r#"{ "outputs": ["lod1", "lod2"] }"#);
    p.write("props/Chair.ext", "{}");
    p.write_with_deps("Scene.ext", &["Mesh.ext", "props/Chair.ext"]);
    p.scan();
    assert_eq!(p.curator.write_asset_tables(), Status::Success);

    let table = p.curator.read_asset_table(0, ALIAS).unwrap();
    let states = p.curator.asset_states();
    assert_eq!(states.len(), 3);
    for (guid, _, _) in &states {
        assert_eq!(table.get(guid).cloned(), p.curator.lookup_path(*guid));
    }
    // Three main sub-assets plus the two named outputs of Mesh.ext.
    assert_eq!(table.len(), 5);
    assert_eq!(table[&p.guid("props/Chair.ext")], "project/props/Chair.out");
}

#[test]
fn dependents_of_a_failed_asset_are_skipped() {
    let p = TestProject::new();
    p.write("Bad.ext", "{}");
    p.write_with_deps("User.ext", &["Bad.ext"]);
    p.write("Free.ext", "{}");
    p.scan();

    let status = p
        .curator
        .transform_all_assets(TransformFlags::default(), &AtomicBool::new(false));
    assert_eq!(status, Status::Failure);
    assert_eq!(p.state("Bad.ext"), TransformState::TransformError);
    assert_eq!(p.state("Free.ext"), TransformState::UpToDate);
    assert_eq!(p.state("User.ext"), TransformState::NeedsTransform);
    assert!(p
        .log("User.ext")
        .iter()
        .any(|e| e.code == codes::BLOCKED_BY_DEPENDENCY));
}

#[test]
fn dependents_stay_blocked_while_a_dependency_keeps_failing() {
    let p = TestProject::new();
    p.write("Bad.ext", "{}");
    p.write_with_deps("User.ext", &["Bad.ext"]);
    p.scan();

    let first = p
        .curator
        .transform_all_assets(TransformFlags::default(), &AtomicBool::new(false));
    assert_eq!(first, Status::Failure);
    assert_eq!(p.state("Bad.ext"), TransformState::TransformError);
    let executions = p.manager.executions();

    let second = p
        .curator
        .transform_all_assets(TransformFlags::default(), &AtomicBool::new(false));
    assert_eq!(second, Status::Warning);
    assert_eq!(p.manager.executions(), executions);
    assert_eq!(p.state("User.ext"), TransformState::NeedsTransform);
    let notes: Vec<String> = p
        .log("User.ext")
        .into_iter()
        .filter(|e| e.code == codes::BLOCKED_BY_DEPENDENCY)
        .flat_map(|e| e.notes)
        .collect();
    assert_eq!(
        notes,
        vec![format!("failed dependency: {}", TestProject::qualified("Bad.ext"))]
    );
}

#[test]
fn cancelled_batch_submits_nothing() {
    let p = TestProject::new();
    p.write("A.ext", "{}");
    p.write("B.ext", "{}");
    p.scan();

    let status = p
        .curator
        .transform_all_assets(TransformFlags::default(), &AtomicBool::new(true));
    assert_eq!(status, Status::Cancelled);
    assert_eq!(p.manager.executions(), 0);
    assert_eq!(p.state("A.ext"), TransformState::NeedsTransform);
}

#[test]
fn clearing_a_transform_error_reevaluates_the_asset() {
    let p = TestProject::new();
    p.write("Broken.ext", "{}");
    p.scan();
    assert!(!p.transform("Broken.ext").is_success());
    assert_eq!(p.state("Broken.ext"), TransformState::TransformError);

    let guid = p.guid("Broken.ext");
    assert!(p.curator.clear_transform_error(guid));
    assert_eq!(p.state("Broken.ext"), TransformState::NeedsTransform);
    assert!(!p
        .log("Broken.ext")
        .iter()
        .any(|e| e.code == codes::TRANSFORM_FAILED));
    assert!(!p.curator.clear_transform_error(guid));
}

#[test]
fn transform_errors_stick_until_retried_or_edited() {
    let p = TestProject::new();
    p.write("Broken.ext", "{}");
    p.scan();

    assert!(!p.transform("Broken.ext").is_success());
    assert_eq!(p.state("Broken.ext"), TransformState::TransformError);
    assert!(p.log("Broken.ext").iter().any(|e| e.message == "scripted failure"));

    p.scan();
    let status = p
        .curator
        .transform_all_assets(TransformFlags::default(), &AtomicBool::new(false));
    assert_eq!(status, Status::Success);
    assert_eq!(p.manager.executions(), 1);
    assert_eq!(p.state("Broken.ext"), TransformState::TransformError);

    let manual = TransformFlags {
        force: false,
        manual: true,
    };
    let TransformTicket::Queued(retry) = p.curator.transform_asset(p.guid("Broken.ext"), manual).unwrap()
    else {
        panic!("manual retry was not queued");
    };
    assert!(!retry.wait().is_success());
    assert_eq!(p.manager.executions(), 2);

    p.write("Broken.ext", r#"{ "settings": { "fixed": true } }"#);
    p.scan();
    assert_eq!(p.state("Broken.ext"), TransformState::NeedsTransform);
}

#[test]
fn removing_an_asset_publishes_every_sub_asset() {
    let p = TestProject::new();
    p.write("Mesh.ext", r#"{ "outputs": ["lod1"] }"#);
    p.scan();
    let main = p.guid("Mesh.ext");
    let mut rx = p.curator.subscribe();

    p.remove("Mesh.ext");
    p.scan();
    let mut removed: Vec<Guid> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            CuratorEvent::AssetRemoved(guid) => Some(guid),
            _ => None,
        })
        .collect();
    removed.sort();
    let mut expected = vec![main, main.derive("lod1")];
    expected.sort();
    assert_eq!(removed, expected);
}
