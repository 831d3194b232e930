use std::sync::Arc;

use cmpforge_config::{DefinerKind, WiringMode};
use cmpforge_core::{ordered_by_key, ComparatorError, HostContext, Spec};

use super::*;
use crate::artifact::{ArtifactName, ArtifactRegistry};
use crate::bridge;
use crate::codegen;

struct Job {
    priority: u8,
}

fn spec() -> Arc<Spec> {
    Arc::new(
        Spec::ordering::<Job>()
            .with(ordered_by_key("priority", |j: &Job| j.priority).shared())
            .build()
            .unwrap(),
    )
}

fn request(spec: &Arc<Spec>, wiring: WiringMode, host: HostContext) -> DefinitionRequest {
    DefinitionRequest {
        name: ArtifactName::next(host.name(), spec),
        spec: Arc::clone(spec),
        wiring,
        host,
    }
}

fn define(kind: DefinerKind, wiring: WiringMode) -> Arc<Artifact> {
    let definer = definer(kind);
    let mut unit = definer
        .open(request(&spec(), wiring, HostContext::default()))
        .unwrap();
    let code = codegen::emit(&mut unit).unwrap();
    definer.define(unit, code).unwrap()
}

#[test]
fn test_support_matrix() {
    let anonymous = definer(DefinerKind::Anonymous);
    assert!(anonymous.supports(WiringMode::Embedded));
    assert!(!anonymous.supports(WiringMode::External));
    assert!(!anonymous.supports(WiringMode::Bridge));
    assert!(!anonymous.produces_named());

    let named = definer(DefinerKind::Named);
    assert!(!named.supports(WiringMode::Embedded));
    assert!(named.supports(WiringMode::Bridge));
    assert!(named.produces_named());
    assert_eq!(
        named.supports(WiringMode::External),
        crate::capability::SLOT_WRITER.is_available()
    );
}

#[test]
fn test_anonymous_embeds_slots() {
    let artifact = define(DefinerKind::Anonymous, WiringMode::Embedded);
    assert_eq!(artifact.definer(), DefinerKind::Anonymous);
    assert!(artifact.slots().is_none());
    assert!(artifact.methods().compare.is_some());
    assert!(artifact.methods().write_replace.is_none());
    assert_eq!(artifact.run_init(), 1);
    assert!(ArtifactRegistry::global()
        .lookup(&artifact.name().to_string())
        .is_none());
}

#[test]
fn test_named_registers_and_reserves_slot_object() {
    let artifact = define(DefinerKind::Named, WiringMode::External);
    let (base, len) = artifact.slots().unwrap();
    assert_eq!(len, 2);
    // SAFETY: the slot object is `len` zero-initialized words owned by the
    // artifact.
    let words = unsafe { std::slice::from_raw_parts(base, len) };
    assert!(words.iter().all(|w| *w == 0));

    let registered = ArtifactRegistry::global()
        .lookup(&artifact.name().to_string())
        .unwrap();
    assert!(Arc::ptr_eq(&registered, &artifact));
}

#[test]
fn test_bridge_init_copies_registered_words() {
    let definer = definer(DefinerKind::Named);
    let spec = spec();
    let request = request(&spec, WiringMode::Bridge, HostContext::default());
    let serial = request.name.serial();
    let mut unit = definer.open(request).unwrap();
    let words = unit.values.words();
    let registration = bridge::register(serial, words.clone()).unwrap();
    let code = codegen::emit(&mut unit).unwrap();
    let artifact = definer.define(unit, code).unwrap();

    assert_eq!(artifact.run_init(), 1);
    let (base, len) = artifact.slots().unwrap();
    // SAFETY: as above.
    let copied = unsafe { std::slice::from_raw_parts(base, len) };
    assert_eq!(copied, &words[..]);
    // Single use: a second init finds nothing.
    assert_eq!(artifact.run_init(), 0);
    drop(registration);
}

#[test]
fn test_denied_native_code() {
    let host = HostContext::new("sandbox").deny_native_code();
    for kind in [DefinerKind::Anonymous, DefinerKind::Named] {
        let err = definer(kind)
            .open(request(&spec(), WiringMode::Embedded, host.clone()))
            .err()
            .unwrap();
        match err {
            ComparatorError::ArtifactDefinition { artifact, reason } => {
                assert!(artifact.starts_with("sandbox.Ord$Job$"));
                assert!(reason.contains("native code"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
