//! Whole-table properties of the policy engine.

use proptest::prelude::*;
use tw_core::{MediaType, NistCategory, WipeMethod, WipeScope};
use tw_policy::{is_method_valid_for_media, recommend, resolve, PolicyRequest};

fn media() -> impl Strategy<Value = MediaType> {
    prop::sample::select(MediaType::ALL.to_vec())
}

fn scope() -> impl Strategy<Value = WipeScope> {
    prop::sample::select(WipeScope::ALL.to_vec())
}

fn category() -> impl Strategy<Value = NistCategory> {
    prop::sample::select(NistCategory::ALL.to_vec())
}

proptest! {
    #[test]
    fn recommend_is_deterministic(m in media(), s in scope(), c in category()) {
        prop_assert_eq!(recommend(m, s, c), recommend(m, s, c));
    }

    #[test]
    fn recommended_method_is_always_applicable(m in media(), s in scope(), c in category()) {
        let rec = recommend(m, s, c);
        prop_assert!(is_method_valid_for_media(m, rec.method));
        prop_assert!(rec.verification.sample_percent <= 100);
    }

    #[test]
    fn folder_scope_always_overwrites(m in media(), c in category()) {
        let rec = recommend(m, WipeScope::Folder, c);
        prop_assert_eq!(rec.method, WipeMethod::Overwrite);
        prop_assert!(rec.rationale.ends_with("freespace wiping on containing volume"));
    }

    #[test]
    fn solid_state_paths_carry_wear_leveling_caveat(c in category(), s in scope()) {
        for m in [MediaType::Ssd, MediaType::Nvme] {
            let rec = recommend(m, s, c);
            prop_assert!(rec.warnings.iter().any(|w| w.starts_with("SSD wear-leveling")));
        }
    }

    #[test]
    fn overrides_accepted_iff_allow_listed(m in media(), c in category(),
        method in prop::sample::select(WipeMethod::ALL.to_vec())) {
        let req = PolicyRequest { method: Some(method), ..PolicyRequest::for_category(c) };
        let outcome = resolve(m, WipeScope::Drive, &req);
        prop_assert_eq!(outcome.is_ok(), is_method_valid_for_media(m, method));
    }
}

#[test]
fn ssd_drive_purge_scenario() {
    let snap = resolve(
        MediaType::Ssd,
        WipeScope::Drive,
        &PolicyRequest::for_category(NistCategory::Purge),
    )
    .unwrap();
    assert_eq!(snap.method, WipeMethod::NvmeSanitize);
    assert_eq!(snap.recommendation.verification.sample_percent, 0);
}
