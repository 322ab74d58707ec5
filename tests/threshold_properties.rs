//! Property tests for the infection threshold and input validation

mod common;

use proptest::prelude::*;

use common::{reports_and_flag, seed_survivor, temp_engine};
use survivor_ledger::core::types::DEFAULT_MAX_LEVEL_LEN;
use survivor_ledger::{AfterInfection, ErrorKind, Inventory, SurvivorId, CONTAMINATION_THRESHOLD};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Infected exactly when the number of accepted reports reaches the threshold
    #[test]
    fn prop_infected_iff_threshold_reached(attempts in 0u32..8, reject in any::<bool>()) {
        let policy = if reject { AfterInfection::Reject } else { AfterInfection::Accumulate };
        let (engine, _dir) = temp_engine(policy);
        let id = seed_survivor(&engine, 1, 0, false, true);

        let mut accepted = 0u32;
        runtime().block_on(async {
            for _ in 0..attempts {
                match engine.infection().submit_contamination_report(id).await {
                    Ok(_) => accepted += 1,
                    Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
                }
            }
        });

        let (reports, infected) = reports_and_flag(&engine, id);
        prop_assert_eq!(reports, accepted);
        prop_assert_eq!(infected, attempts >= CONTAMINATION_THRESHOLD);
        if reject {
            prop_assert_eq!(accepted, attempts.min(CONTAMINATION_THRESHOLD));
        } else {
            prop_assert_eq!(accepted, attempts);
        }
    }

    #[test]
    fn prop_positive_ids_round_trip(raw in 1i64..=i64::MAX) {
        let id: SurvivorId = raw.to_string().parse().unwrap();
        prop_assert_eq!(id.get(), raw);
    }

    #[test]
    fn prop_non_positive_ids_rejected(raw in i64::MIN..=0i64) {
        let err = raw.to_string().parse::<SurvivorId>().unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn prop_short_labels_accepted(level in "[a-z]{1,32}") {
        let inventory = Inventory::new(level.clone(), level.clone(), level.clone(), level);
        prop_assert!(inventory.validate(DEFAULT_MAX_LEVEL_LEN).is_ok());
    }

    #[test]
    fn prop_long_labels_rejected(level in "[a-z]{33,64}") {
        let inventory = Inventory::new("low", "low", "low", level);
        let err = inventory.validate(DEFAULT_MAX_LEVEL_LEN).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
