use std::sync::{Arc, Barrier};
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tokenledger_common::{AccountId, TokenType};
use tokenledger_ledger::{Account, LedgerConfig, LedgerEngine, TransferRequest, TransferStatus};

fn gold() -> TokenType {
    TokenType::new("gold")
}

fn engine_with(accounts: &[(&str, Decimal)]) -> Arc<LedgerEngine> {
    let config = LedgerConfig::default().with_lock_timeout(Duration::from_secs(5));
    let engine = LedgerEngine::new(config).unwrap();
    for (id, amount) in accounts {
        engine
            .open_account(Account::new(*id).with_holding("gold", *amount))
            .unwrap();
    }
    Arc::new(engine)
}

#[test]
fn concurrent_disjoint_transfers_both_commit() {
    let engine = engine_with(&[
        ("alice", dec!(10)),
        ("bob", dec!(0)),
        ("carol", dec!(10)),
        ("dave", dec!(0)),
    ]);

    let (left, right) = std::thread::scope(|scope| {
        let left = scope.spawn(|| engine.transfer(TransferRequest::new("alice", "bob", "gold", dec!(4), "k-ab")));
        let right = scope.spawn(|| engine.transfer(TransferRequest::new("carol", "dave", "gold", dec!(6), "k-cd")));
        (left.join().unwrap(), right.join().unwrap())
    });

    assert_eq!(left.status, TransferStatus::Committed);
    assert_eq!(right.status, TransferStatus::Committed);

    let mut sequences = vec![
        left.record.unwrap().sequence,
        right.record.unwrap().sequence,
    ];
    sequences.sort();
    assert_eq!(sequences, vec![1, 2]);

    assert_eq!(engine.balance(&AccountId::new("bob"), &gold()).unwrap(), dec!(4));
    assert_eq!(engine.balance(&AccountId::new("dave"), &gold()).unwrap(), dec!(6));
}

#[test]
fn opposite_direction_transfers_do_not_deadlock() {
    let engine = engine_with(&[("alice", dec!(1000)), ("bob", dec!(1000))]);

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let engine = &engine;
            scope.spawn(move || {
                for i in 0..250 {
                    let (from, to) = if (worker + i) % 2 == 0 {
                        ("alice", "bob")
                    } else {
                        ("bob", "alice")
                    };
                    let key = format!("w{worker}-{i}");
                    let result = engine.transfer(TransferRequest::new(from, to, "gold", dec!(1), key));
                    assert!(
                        matches!(result.status, TransferStatus::Committed | TransferStatus::InsufficientFunds),
                        "unexpected status {:?}",
                        result.status
                    );
                }
            });
        }
    });

    let alice = engine.balance(&AccountId::new("alice"), &gold()).unwrap();
    let bob = engine.balance(&AccountId::new("bob"), &gold()).unwrap();
    assert_eq!(alice + bob, dec!(2000));
    assert!(engine.reconcile().unwrap().is_consistent());
}

#[test]
fn contention_on_one_account_never_overdraws() {
    let engine = engine_with(&[
        ("hot", dec!(100)),
        ("a", dec!(0)),
        ("b", dec!(0)),
        ("c", dec!(0)),
        ("d", dec!(0)),
    ]);
    let receivers = ["a", "b", "c", "d"];

    std::thread::scope(|scope| {
        for receiver in receivers {
            let engine = &engine;
            scope.spawn(move || {
                for i in 0..50 {
                    engine.transfer(TransferRequest::new(
                        "hot",
                        receiver,
                        "gold",
                        dec!(1),
                        format!("{receiver}-{i}"),
                    ));
                }
            });
        }
    });

    // 200 requests against 100 tokens: exactly 100 succeed.
    assert_eq!(engine.balance(&AccountId::new("hot"), &gold()).unwrap(), Decimal::ZERO);
    assert_eq!(engine.metrics().transfers_committed, 100);
    assert_eq!(engine.metrics().transfers_rejected, 100);

    let report = engine.reconcile().unwrap();
    assert!(report.is_consistent());
    assert!(report.negative_balances.is_empty());
}

#[test]
fn concurrent_retries_commit_exactly_once() {
    let engine = engine_with(&[("alice", dec!(100)), ("bob", dec!(0))]);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    engine.transfer(TransferRequest::new("alice", "bob", "gold", dec!(10), "same-key"))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let committed = results
        .iter()
        .filter(|r| r.status == TransferStatus::Committed)
        .count();
    assert_eq!(committed, 1);
    assert!(results.iter().all(|r| r.is_success()));

    let first = results[0].record.clone();
    assert!(results.iter().all(|r| r.record == first));
    assert_eq!(engine.balance(&AccountId::new("bob"), &gold()).unwrap(), dec!(10));
}

#[test]
fn shared_key_on_disjoint_pairs_commits_once() {
    for round in 0..20 {
        let engine = engine_with(&[
            ("alice", dec!(10)),
            ("bob", dec!(0)),
            ("carol", dec!(10)),
            ("dave", dec!(0)),
        ]);
        let key = format!("shared-{round}");
        let barrier = Barrier::new(2);

        let (left, right) = std::thread::scope(|scope| {
            let left = scope.spawn(|| {
                barrier.wait();
                engine.transfer(TransferRequest::new("alice", "bob", "gold", dec!(4), key.as_str()))
            });
            let right = scope.spawn(|| {
                barrier.wait();
                engine.transfer(TransferRequest::new("carol", "dave", "gold", dec!(6), key.as_str()))
            });
            (left.join().unwrap(), right.join().unwrap())
        });

        let mut statuses = vec![left.status, right.status];
        statuses.sort_by_key(|status| *status == TransferStatus::AlreadyProcessed);
        assert_eq!(
            statuses,
            vec![TransferStatus::Committed, TransferStatus::AlreadyProcessed]
        );
        assert_eq!(left.record, right.record);
        assert_eq!(engine.log().len(), 1);

        let balance = |id: &str| engine.balance(&AccountId::new(id), &gold()).unwrap();
        let (loser_from, loser_to) = if left.status == TransferStatus::Committed {
            ("carol", "dave")
        } else {
            ("alice", "bob")
        };
        assert_eq!(balance(loser_from), dec!(10));
        assert_eq!(balance(loser_to), Decimal::ZERO);
        assert!(engine.reconcile().unwrap().is_consistent());
    }
}

#[test]
fn history_matches_balance_changes() {
    let engine = engine_with(&[("alice", dec!(500)), ("bob", dec!(500)), ("carol", dec!(500))]);
    let pairs = [("alice", "bob"), ("bob", "carol"), ("carol", "alice")];

    std::thread::scope(|scope| {
        for (n, (from, to)) in pairs.into_iter().enumerate() {
            let engine = &engine;
            scope.spawn(move || {
                for i in 0..100 {
                    engine.transfer(TransferRequest::new(from, to, "gold", dec!(1), format!("{n}-{i}")));
                }
            });
        }
    });

    for id in ["alice", "bob", "carol"] {
        let account = AccountId::new(id);
        let history: Vec<_> = engine.history(&account).unwrap().collect();

        assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));

        let net: Decimal = history.iter().map(|r| r.delta_for(&account)).sum();
        assert_eq!(engine.balance(&account, &gold()).unwrap(), dec!(500) + net);
    }
}

#[tokio::test]
async fn blocking_tasks_share_the_engine() {
    let engine = engine_with(&[("alice", dec!(50)), ("bob", dec!(50))]);

    let mut handles = Vec::new();
    for i in 0..10 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::task::spawn_blocking(move || {
            let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            engine.transfer(TransferRequest::new(from, to, "gold", dec!(5), format!("t{i}")))
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().status, TransferStatus::Committed);
    }
    assert_eq!(engine.log().len(), 10);
}
