mod common;

use common::*;

use std::sync::Arc;
use std::time::Duration;

use heron_common::config::EngineConfig;
use heron_common::error::{CoreError, EngineError, TxnError};
use heron_common::schema::TablespaceDef;
use heron_engine::{ExecutionResult, Statement};

#[test]
fn transaction_is_isolated_until_commit() {
    let engine = engine();
    create_users(&engine);

    let txn = engine.begin(TS).unwrap();
    for id in 1..=3 {
        insert_user(&engine, Some(txn), id, "u", "g");
    }
    assert_eq!(count_rows(&engine, Some(txn), None), 3);
    assert_eq!(count_rows(&engine, None, None), 0);

    engine.commit(TS, txn).unwrap();
    assert_eq!(count_rows(&engine, None, None), 3);
}

#[test]
fn rollback_discards_all_buffered_work() {
    let engine = engine();
    create_users(&engine);
    insert_user(&engine, None, 1, "kept", "g");

    let txn = engine.begin(TS).unwrap();
    insert_user(&engine, Some(txn), 2, "discarded", "g");
    engine
        .execute(
            Some(txn),
            Statement::Delete {
                tablespace: TS.into(),
                table: "users".into(),
                key: key(1),
                predicate: None,
            },
        )
        .unwrap();
    assert_eq!(count_rows(&engine, Some(txn), None), 1);

    engine.rollback(TS, txn).unwrap();
    assert_eq!(count_rows(&engine, None, None), 1);
    let remaining: Vec<_> = engine
        .scan(None, TS, "users", None)
        .unwrap()
        .map(|r| r.key)
        .collect();
    assert_eq!(remaining, vec![key(1)]);
}

#[test]
fn duplicate_key_fails_statement_but_not_transaction() {
    let engine = engine();
    create_users(&engine);
    insert_user(&engine, None, 1, "alice", "g");

    let txn = engine.begin(TS).unwrap();
    let err = engine.execute(Some(txn), insert_stmt(1, "imposter", "g")).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Txn(TxnError::ConstraintViolation(_, _))
    ));
    assert!(err.is_user_error());

    // The transaction survives and can keep working.
    insert_user(&engine, Some(txn), 2, "bob", "g");
    engine.commit(TS, txn).unwrap();
    assert_eq!(count_rows(&engine, None, None), 2);
}

#[test]
fn losing_schema_race_rolls_back_with_conflict() {
    let engine = engine();
    let first = engine.begin(TS).unwrap();
    let second = engine.begin(TS).unwrap();
    engine
        .execute(Some(first), Statement::CreateTable(users_table()))
        .unwrap();
    engine
        .execute(Some(second), Statement::CreateTable(users_table()))
        .unwrap();

    engine.commit(TS, first).unwrap();
    let err = engine.commit(TS, second).unwrap_err();
    assert!(matches!(err, CoreError::Txn(TxnError::Conflict(_, _))));
    assert!(err.is_retryable());
    assert!(err.retry_after_ms() > 0);

    // The loser is gone; a retry has to start a fresh transaction.
    assert!(matches!(
        engine.commit(TS, second),
        Err(CoreError::Txn(TxnError::NotFound(_)))
    ));
}

#[test]
fn finished_transactions_are_unknown() {
    let engine = engine();
    create_users(&engine);
    let txn = engine.begin(TS).unwrap();
    engine.commit(TS, txn).unwrap();
    assert!(matches!(
        engine.commit(TS, txn),
        Err(CoreError::Txn(TxnError::NotFound(_)))
    ));
    assert!(matches!(
        engine.rollback(TS, txn),
        Err(CoreError::Txn(TxnError::NotFound(_)))
    ));
    // DML under a finished id is rejected the same way.
    assert!(matches!(
        engine.execute(Some(txn), insert_stmt(1, "late", "g")),
        Err(CoreError::Txn(TxnError::NotFound(_)))
    ));
}

#[test]
fn contended_row_write_times_out_transiently() {
    let engine = engine_with(EngineConfig::default().with_lock_timeout_ms(40));
    create_users(&engine);
    insert_user(&engine, None, 1, "alice", "g");

    let holder = engine.begin(TS).unwrap();
    engine
        .execute(
            Some(holder),
            Statement::Update {
                tablespace: TS.into(),
                table: "users".into(),
                key: key(1),
                value: row(1, "held", "g"),
            },
        )
        .unwrap();

    // Autocommit writer on the same key gives up after the timeout.
    let err = engine
        .execute(
            None,
            Statement::Update {
                tablespace: TS.into(),
                table: "users".into(),
                key: key(1),
                value: row(1, "blocked", "g"),
            },
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::Txn(TxnError::LockTimeout { .. })));
    assert!(err.is_transient());

    engine.commit(TS, holder).unwrap();
    // Lock released: the same statement now succeeds.
    let result = engine
        .execute(
            None,
            Statement::Update {
                tablespace: TS.into(),
                table: "users".into(),
                key: key(1),
                value: row(1, "unblocked", "g"),
            },
        )
        .unwrap();
    assert_eq!(result.update_count(), 1);
}

#[test]
fn statements_wait_for_tablespace_readiness() {
    let config = EngineConfig::default()
        .with_tablespace_ready_timeout_ms(60)
        .with_tablespace_ready_poll_ms(5);
    let engine = Arc::new(heron_engine::DbEngine::new(config));

    // Declared for two replicas but only one assigned: stays unready.
    let def = TablespaceDef {
        name: "ts_slow".into(),
        replicas: vec!["node1".into()],
        leader: "node1".into(),
        expected_replica_count: 2,
        max_leader_inactivity_ms: 10_000,
    };
    engine.create_tablespace(def).unwrap();

    let err = engine
        .execute(None, Statement::CreateTable({
            let mut def = users_table();
            def.tablespace = "ts_slow".into();
            def
        }))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Engine(EngineError::TablespaceNotReady { .. })
    ));
    assert!(err.is_retryable());

    // Readiness arriving mid-wait unblocks the poll loop.
    let ts = engine.tablespace("ts_slow").unwrap();
    let activator = {
        let ts = Arc::clone(&ts);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            ts.activate();
        })
    };
    let mut def = users_table();
    def.tablespace = "ts_slow".into();
    engine.execute(None, Statement::CreateTable(def)).unwrap();
    activator.join().unwrap();
}

#[test]
fn unknown_tablespace_is_rejected() {
    let engine = engine();
    assert!(matches!(
        engine.begin("nowhere"),
        Err(CoreError::Engine(EngineError::TablespaceNotFound(_)))
    ));
    assert!(matches!(
        engine.create_tablespace(TablespaceDef::single_node(TS, "node1")),
        Err(CoreError::Engine(EngineError::TablespaceAlreadyExists(_)))
    ));
}

#[test]
fn async_statement_runs_on_worker_pool() {
    let engine = engine();
    create_users(&engine);

    let rx = engine
        .execute_async(None, insert_stmt(1, "alice", "g"))
        .unwrap();
    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
    assert_eq!(result, ExecutionResult::UpdateCount(1));
    assert_eq!(count_rows(&engine, None, None), 1);
}

#[test]
fn txn_stats_track_lifecycle_outcomes() {
    let engine = engine();
    create_users(&engine);

    let a = engine.begin(TS).unwrap();
    insert_user(&engine, Some(a), 1, "alice", "g");
    engine.commit(TS, a).unwrap();

    let b = engine.begin(TS).unwrap();
    engine.rollback(TS, b).unwrap();

    let stats = engine.tablespace(TS).unwrap().txns().stats();
    assert_eq!(stats.begun, 2);
    assert_eq!(stats.committed, 1);
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.active, 0);
}
