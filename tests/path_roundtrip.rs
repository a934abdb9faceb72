//! Property tests for path descriptors.

use piece_kernel::types::{FieldAlias, Path, Step};
use proptest::prelude::*;

/// Field or index step, never an alias step.
fn full_step() -> impl Strategy<Value = Step> {
    let known: Vec<&'static str> = FieldAlias::ALL.iter().map(|a| a.field_name()).collect();
    let letters: Vec<String> = FieldAlias::ALL.iter().map(|a| a.letter().to_string()).collect();
    prop_oneof![
        (0usize..10_000).prop_map(Step::Index),
        "[A-Za-z][A-Za-z0-9_-]{0,12}".prop_map(Step::field),
        proptest::sample::select(known).prop_map(Step::field),
        // Full field names that happen to be alias letters.
        proptest::sample::select(letters).prop_map(Step::field),
    ]
}

fn any_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => full_step(),
        1 => proptest::sample::select(FieldAlias::ALL.to_vec()).prop_map(Step::alias),
    ]
}

fn full_path() -> impl Strategy<Value = Path> {
    proptest::collection::vec(full_step(), 0..12).prop_map(Path::new)
}

fn path() -> impl Strategy<Value = Path> {
    proptest::collection::vec(any_step(), 0..12).prop_map(Path::new)
}

proptest! {
    #[test]
    fn test_expand_undoes_compact(p in full_path()) {
        prop_assert_eq!(p.compact().expand(), p.clone());
        prop_assert_eq!(p.expand(), p);
    }

    #[test]
    fn test_compact_undoes_expand(p in path()) {
        prop_assert_eq!(p.expand().compact(), p.compact());
        prop_assert_eq!(p.compact().expand(), p.expand());
        prop_assert_eq!(p.compact().fingerprint(), p.fingerprint());
        prop_assert_eq!(p.compact().len(), p.len());
    }

    #[test]
    fn test_text_form_roundtrip(p in path()) {
        prop_assert_eq!(Path::parse(&p.to_string()).unwrap(), p);
    }

    #[test]
    fn test_json_roundtrip(p in path()) {
        let json = serde_json::to_string(&p).unwrap();
        let back: Path = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, p);
    }

    #[test]
    fn test_prefix_relations(p in path(), q in path()) {
        let joined = p.join(&q);
        prop_assert!(joined.starts_with(&p));
        prop_assert_eq!(joined.len(), p.len() + q.len());
        if let Some(parent) = joined.parent() {
            prop_assert_eq!(parent.len() + 1, joined.len());
        }
    }
}
