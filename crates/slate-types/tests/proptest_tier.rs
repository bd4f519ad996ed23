//! Property-based tests for tier limits and entitlement arithmetic

use chrono::Utc;
use proptest::prelude::*;
use slate_types::{normalize_code, normalize_email, Tier, UserEntitlement, UserId, UNLIMITED};

// ============================================================================
// Strategies
// ============================================================================

fn tier_strategy() -> impl Strategy<Value = Tier> {
    prop_oneof![Just(Tier::Free), Just(Tier::Pro)]
}

fn limit_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![Just(UNLIMITED), 0i32..1000]
}

/// Snapshot with arbitrary (possibly drifted) limits
fn entitlement_strategy() -> impl Strategy<Value = UserEntitlement> {
    (tier_strategy(), 0i32..1000, limit_strategy(), limit_strategy(), any::<bool>()).prop_map(
        |(tier, used, total, shots, storyboards)| {
            let mut ent = UserEntitlement::new_free(UserId::new("uid"), "p@example.com", Utc::now());
            ent.tier = tier;
            ent.used_pages = used;
            ent.total_pages = total;
            ent.max_shots_per_scene = shots;
            ent.can_generate_storyboards = storyboards;
            ent
        },
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn apply_tier_always_restores_invariant(mut ent in entitlement_strategy(), tier in tier_strategy()) {
        let used = ent.used_pages;
        ent.apply_tier(tier);
        prop_assert!(ent.satisfies_tier_invariant());
        prop_assert_eq!(ent.tier, tier);
        prop_assert_eq!(ent.used_pages, used);
        prop_assert!(!ent.apply_tier(tier));
    }

    #[test]
    fn remaining_pages_never_negative(ent in entitlement_strategy()) {
        match ent.remaining_pages() {
            None => prop_assert_eq!(ent.total_pages, UNLIMITED),
            Some(left) => prop_assert!(left >= 0),
        }
    }

    #[test]
    fn can_consume_respects_allowance(ent in entitlement_strategy(), pages in 1i32..100) {
        let expected = ent.has_unlimited_pages()
            || i64::from(ent.used_pages) + i64::from(pages) <= i64::from(ent.total_pages);
        prop_assert_eq!(ent.can_consume(pages), expected);
    }

    #[test]
    fn normalization_is_idempotent(raw in "[ a-zA-Z0-9@._-]{0,40}") {
        let email = normalize_email(&raw);
        prop_assert_eq!(normalize_email(&email), email.clone());
        let code = normalize_code(&raw);
        prop_assert_eq!(normalize_code(&code), code.clone());
        prop_assert!(!code.chars().any(|c| c.is_ascii_lowercase()));
    }
}
