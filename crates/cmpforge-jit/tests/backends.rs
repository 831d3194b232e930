//! Every definer x instantiator x wiring combination.

use std::cmp::Ordering;

use cmpforge_config::{DefinerKind, InstantiatorKind, SynthesisConfig, WiringMode};
use cmpforge_core::{ordered_by_key, ComparatorError, HostContext, NullPolicy, Spec};
use cmpforge_jit::{ComparatorForm, Engine, SLOT_WRITER};

struct Ticket {
    queue: u16,
    number: u64,
}

const DEFINERS: [DefinerKind; 2] = [DefinerKind::Anonymous, DefinerKind::Named];
const INSTANTIATORS: [InstantiatorKind; 3] = [
    InstantiatorKind::Bypass,
    InstantiatorKind::Initializer,
    InstantiatorKind::ByName,
];
const WIRINGS: [WiringMode; 3] = [WiringMode::Embedded, WiringMode::External, WiringMode::Bridge];

fn spec() -> Spec {
    Spec::ordering::<Ticket>()
        .with(
            ordered_by_key("queue", |t: &Ticket| t.queue)
                .serializable()
                .shared(),
        )
        .with(
            ordered_by_key("number", |t: &Ticket| t.number)
                .serializable()
                .shared(),
        )
        .nulls(NullPolicy::NullsFirst)
        .strict_types(true)
        .serializable()
        .build()
        .unwrap()
}

fn is_valid(definer: DefinerKind, instantiator: InstantiatorKind, wiring: WiringMode) -> bool {
    match (definer, wiring) {
        (DefinerKind::Anonymous, WiringMode::Embedded) => instantiator != InstantiatorKind::ByName,
        (DefinerKind::Anonymous, _) => false,
        (DefinerKind::Named, WiringMode::Embedded) => false,
        (DefinerKind::Named, WiringMode::External) => SLOT_WRITER.is_available(),
        (DefinerKind::Named, WiringMode::Bridge) => instantiator != InstantiatorKind::Bypass,
    }
}

fn engine(
    definer: DefinerKind,
    instantiator: InstantiatorKind,
    wiring: WiringMode,
) -> Engine {
    Engine::new(
        SynthesisConfig::default()
            .with_definers([definer])
            .with_instantiators([instantiator])
            .with_wiring(wiring),
    )
    .unwrap()
}

#[test]
fn every_valid_combination_builds_a_working_comparator() {
    let a = Ticket { queue: 1, number: 10 };
    let b = Ticket { queue: 1, number: 11 };
    let c = Ticket { queue: 0, number: 99 };

    for definer in DEFINERS {
        for instantiator in INSTANTIATORS {
            for wiring in WIRINGS {
                let label = format!("{definer}/{instantiator}/{wiring}");
                let result = engine(definer, instantiator, wiring).build(spec());
                if !is_valid(definer, instantiator, wiring) {
                    let err = result.err().unwrap_or_else(|| panic!("{label} should not build"));
                    assert!(
                        matches!(err, ComparatorError::NoStrategiesAvailable { .. }),
                        "{label}: {err}"
                    );
                    continue;
                }

                let cmp = result.unwrap_or_else(|e| panic!("{label}: {e}"));
                match cmp.form() {
                    ComparatorForm::Synthesized {
                        definer: d,
                        instantiator: i,
                        wiring: w,
                        ..
                    } => assert_eq!((d, i, w), (definer, instantiator, wiring), "{label}"),
                    other => panic!("{label}: unexpected form {other}"),
                }

                assert_eq!(cmp.compare(Some(&a), Some(&b)).unwrap(), Ordering::Less, "{label}");
                assert_eq!(cmp.compare(Some(&a), Some(&c)).unwrap(), Ordering::Greater, "{label}");
                assert_eq!(cmp.compare(None, Some(&c)).unwrap(), Ordering::Less, "{label}");
                assert!(cmp.are_equal(Some(&a), Some(&Ticket { queue: 1, number: 10 })).unwrap());
                assert!(!cmp.are_equal(Some(&a), Some(&b)).unwrap(), "{label}");
                assert_eq!(cmp.hash(Some(&a)).unwrap(), (17 * 37 + 1) * 37 + 10, "{label}");

                let proxy = cmp.to_proxy().unwrap_or_else(|e| panic!("{label}: {e}"));
                assert_eq!(proxy.criteria, vec!["queue", "number"], "{label}");
                assert!(proxy.fingerprint.is_some(), "{label}");
            }
        }
    }
}

#[test]
fn named_artifacts_carry_the_host_name() {
    let engine = engine(
        DefinerKind::Named,
        InstantiatorKind::ByName,
        WiringMode::Bridge,
    )
    .with_host(HostContext::new("billing"));
    let cmp = engine.build(spec()).unwrap();
    let ComparatorForm::Synthesized { artifact, .. } = cmp.form() else {
        panic!("not synthesized");
    };
    assert!(artifact.starts_with("billing.Ord$Ticket$"), "{artifact}");
}

#[test]
fn external_wiring_needs_the_write_privilege() {
    if !SLOT_WRITER.is_available() {
        return;
    }
    let engine = engine(
        DefinerKind::Named,
        InstantiatorKind::Initializer,
        WiringMode::External,
    )
    .with_host(HostContext::new("ro").deny_external_writes());
    let err = engine.build(spec()).unwrap_err();
    assert!(matches!(
        err.causes(),
        [ComparatorError::ArtifactDefinition { .. }]
    ));
}

#[test]
fn disabled_bridge_methods_remove_bridge_candidates() {
    let engine = Engine::new(
        SynthesisConfig::default()
            .with_definers([DefinerKind::Named])
            .with_instantiators([InstantiatorKind::Initializer])
            .with_bridge_methods(false),
    )
    .unwrap();
    match engine.build(spec()) {
        Ok(cmp) => assert!(matches!(
            cmp.form(),
            ComparatorForm::Synthesized {
                wiring: WiringMode::External,
                ..
            }
        )),
        Err(err) => {
            assert!(!SLOT_WRITER.is_available());
            assert!(err.causes().is_empty());
        }
    }
}
