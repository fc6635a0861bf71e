// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for the quota ledger's cap and sum invariants.

use std::sync::Arc;

use harvester_config::model::QuotaConfig;
use harvester_core::Clock;
use harvester_quota::{Admission, QuotaLedger};
use harvester_sim::ManualClock;
use harvester_storage::Database;
use proptest::prelude::*;
use tokio::runtime::Runtime;

const ACCOUNTS: [&str; 3] = ["alpha", "beta", "gamma"];

#[derive(Debug, Clone)]
enum Op {
    /// Reserve, then either commit (true) or release (false).
    Attempt { account: usize, succeed: bool },
    /// Replay an earlier commit key.
    Replay { index: usize },
    /// Restart: reload counters from the database.
    Reload,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..ACCOUNTS.len(), any::<bool>())
            .prop_map(|(account, succeed)| Op::Attempt { account, succeed }),
        1 => (0usize..64).prop_map(|index| Op::Replay { index }),
        1 => Just(Op::Reload),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        max_shrink_iters: 100,
        .. ProptestConfig::default()
    })]

    #[test]
    fn caps_hold_and_accounts_sum_to_global(
        per_account in 1u32..6,
        global in 1u32..12,
        ops in proptest::collection::vec(op_strategy(), 1..60),
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let db = Database::open(dir.path().join("props.db").to_str().unwrap())
                .await
                .unwrap();
            let clock = Arc::new(ManualClock::default());
            let config = QuotaConfig {
                per_account_daily_cap: per_account,
                global_daily_cap: global,
            };
            let ledger = QuotaLedger::from_database(&config, db.clone(), clock.clone())
                .await
                .unwrap();

            let mut keys: Vec<(usize, String)> = Vec::new();
            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Attempt { account, succeed } => {
                        let name = ACCOUNTS[account];
                        if ledger.reserve(name).await != Admission::Granted {
                            continue;
                        }
                        if succeed {
                            let key = format!("attempt-{step}");
                            assert!(ledger.commit(name, &key).await.unwrap());
                            keys.push((account, key));
                        } else {
                            ledger.release(name).await;
                        }
                    }
                    Op::Replay { index } => {
                        if let Some((account, key)) = keys.get(index % keys.len().max(1)) {
                            assert!(!ledger.commit(ACCOUNTS[*account], key).await.unwrap());
                        }
                    }
                    Op::Reload => ledger.load().await.unwrap(),
                }

                let snapshot = ledger.snapshot(&clock.today()).await.unwrap();
                assert_eq!(snapshot.account_sum(), snapshot.global);
                assert!(snapshot.global <= global);
                for count in snapshot.accounts.values() {
                    assert!(*count <= per_account);
                }
                assert_eq!(snapshot.global, ledger.global_count().await);
            }

            assert_eq!(ledger.global_count().await as usize, keys.len());
            db.close().await.unwrap();
        });
    }
}
