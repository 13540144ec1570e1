//! Integration tests for the serverdb crate.
//!
//! Every test runs against a scratch SQLite file. Set
//! `SERVERDB_TEST_POSTGRESQL` and/or `SERVERDB_TEST_MYSQL` to the path of a
//! connection parameter file (and enable the matching cargo feature) to run
//! the same tests against a networked server as well. Each test uses its own
//! table prefix so tests can share one networked database.

use std::collections::HashMap;
use std::thread;

use chrono::Utc;
use serverdb::{
    Backend, ConnectionParameters, DatabaseState, DbError, ServerDatabase, SqliteParameters,
};
use tempfile::TempDir;

struct TestBackend {
    params: ConnectionParameters,
    _dir: Option<TempDir>,
}

fn test_backends() -> Vec<TestBackend> {
    let dir = tempfile::tempdir().unwrap();
    let mut backends = vec![TestBackend {
        params: ConnectionParameters::sqlite(dir.path().join("servers.sqlite")),
        _dir: Some(dir),
    }];
    for var in ["SERVERDB_TEST_POSTGRESQL", "SERVERDB_TEST_MYSQL"] {
        if let Ok(path) = std::env::var(var) {
            let params = ConnectionParameters::load(&path)
                .unwrap_or_else(|e| panic!("{var}:\n{}", e.report()));
            backends.push(TestBackend { params, _dir: None });
        }
    }
    backends
}

/// Opens `prefix`ed tables on `params`, dropping whatever a previous run left behind.
fn fresh_database(params: &ConnectionParameters, prefix: &str) -> ServerDatabase {
    let stale = ServerDatabase::open_with_prefix(params, prefix).unwrap();
    stale.destroy_tables().unwrap();
    drop(stale);
    ServerDatabase::open_with_prefix(params, prefix).unwrap()
}

/// Runs `test` once per configured backend on freshly created tables.
fn with_each_backend(prefix: &str, test: impl Fn(&ConnectionParameters, &ServerDatabase)) {
    for backend in test_backends() {
        let db = fresh_database(&backend.params, prefix);
        test(&backend.params, &db);
        db.destroy_tables().unwrap();
    }
}

fn configs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_server_registry_scenario() {
    with_each_backend("reg_", |_, db| {
        let servers = db.server_table().unwrap();
        assert!(servers.server_exists(1).unwrap());
        assert!(!servers.server_exists(2).unwrap());

        servers.add_server(2).unwrap();
        assert!(servers.server_exists(2).unwrap());

        servers.remove_server(2).unwrap();
        assert!(!servers.server_exists(2).unwrap());

        let err = servers.add_server(1).unwrap_err();
        assert!(err.is_duplicate(), "{}", err.report());
        assert_eq!(servers.get_all_server_ids().unwrap(), [1]);
    });
}

#[test]
fn test_remove_unknown_server_is_not_an_error() {
    with_each_backend("rmunk_", |_, db| {
        let servers = db.server_table().unwrap();
        servers.remove_server(77).unwrap();
        servers.remove_server(77).unwrap();
        assert_eq!(servers.get_all_server_ids().unwrap(), [1]);
    });
}

#[test]
fn test_free_server_id_fills_gaps() {
    with_each_backend("free_", |_, db| {
        let servers = db.server_table().unwrap();
        assert_eq!(servers.get_free_server_id().unwrap(), 2);

        for id in [2, 3, 5] {
            servers.add_server(id).unwrap();
        }
        assert_eq!(servers.get_free_server_id().unwrap(), 4);

        servers.remove_server(1).unwrap();
        assert_eq!(servers.get_free_server_id().unwrap(), 1);
        assert_eq!(servers.get_all_server_ids().unwrap(), [2, 3, 5]);
    });
}

#[test]
fn test_log_scenario() {
    with_each_backend("log_", |_, db| {
        let logs = db.log_table().unwrap();
        logs.log_message(1, "hello").unwrap();

        let err = logs.log_message(5, "x").unwrap_err();
        assert!(err.is_not_found(), "{}", err.report());
        assert!(err.report().contains("server 5 does not exist"));
        assert_eq!(logs.get_log_size(5).unwrap(), 0);
        assert!(logs.get_logs(5, None, 0).unwrap().is_empty());

        // The failed call leaves the handle usable.
        logs.log_message(1, "still there").unwrap();
        assert_eq!(logs.get_log_size(1).unwrap(), 2);
    });
}

#[test]
fn test_log_round_trips_multibyte_text() {
    with_each_backend("utf8_", |_, db| {
        let logs = db.log_table().unwrap();
        let messages = [
            "✅ 👀",
            "Grüße aus Köln",
            "日本語のテキスト",
            "𝄞 outside the basic plane 🦀",
            "quotes ' \" and ? placeholders",
        ];
        for message in messages {
            logs.log_message(1, message).unwrap();
        }

        let stored: Vec<String> = logs
            .get_logs(1, None, 0)
            .unwrap()
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(stored, messages);
    });
}

#[test]
fn test_logs_keep_insertion_order_and_page() {
    with_each_backend("page_", |_, db| {
        let logs = db.log_table().unwrap();
        let before = Utc::now().timestamp_millis();
        for i in 0..10 {
            logs.log_message(1, &format!("entry {i}")).unwrap();
        }
        let after = Utc::now().timestamp_millis();

        let all = logs.get_logs(1, None, 0).unwrap();
        assert_eq!(all.len(), 10);
        assert!(all.windows(2).all(|pair| pair[0].id < pair[1].id));
        for (i, entry) in all.iter().enumerate() {
            assert_eq!(entry.server_id, 1);
            assert_eq!(entry.message, format!("entry {i}"));
            let millis = entry.timestamp.timestamp_millis();
            assert!(before <= millis && millis <= after);
        }

        let page: Vec<_> = logs
            .get_logs(1, Some(3), 4)
            .unwrap()
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(page, ["entry 4", "entry 5", "entry 6"]);

        assert_eq!(logs.get_logs(1, None, 8).unwrap().len(), 2);
        assert!(logs.get_logs(1, Some(5), 10).unwrap().is_empty());
        assert_eq!(logs.get_log_size(1).unwrap(), 10);
    });
}

#[test]
fn test_config_scenario() {
    with_each_backend("cfg_", |_, db| {
        let config = db.config_table().unwrap();

        config.set_config(1, "miau", "test").unwrap();
        assert_eq!(config.get_config_or_empty(1, "miau").unwrap(), "test");

        config.set_config(1, "miau", "different").unwrap();
        assert_eq!(config.get_config_or_empty(1, "miau").unwrap(), "different");

        config.set_config(1, "theKey", "theValue").unwrap();
        config.clear_config(1, "theKey").unwrap();
        assert_eq!(
            config.get_config(1, "theKey", "theDefault").unwrap(),
            "theDefault"
        );

        assert_eq!(
            config.get_all_configs(1).unwrap(),
            configs(&[("miau", "different")])
        );

        config.clear_all_configs(1).unwrap();
        assert!(config.get_all_configs(1).unwrap().is_empty());
        config.clear_all_configs(1).unwrap();
    });
}

#[test]
fn test_config_defaults_for_unknown_keys_and_servers() {
    with_each_backend("cfgdef_", |_, db| {
        let config = db.config_table().unwrap();
        assert_eq!(config.get_config(1, "k", "D").unwrap(), "D");
        assert_eq!(config.get_config(99, "k", "D").unwrap(), "D");
        assert_eq!(config.get_config_or_empty(99, "k").unwrap(), "");
        assert!(config.get_all_configs(99).unwrap().is_empty());
        config.clear_config(99, "k").unwrap();
        config.clear_all_configs(99).unwrap();
    });
}

#[test]
fn test_config_keys_are_exact() {
    with_each_backend("cfgkey_", |_, db| {
        let config = db.config_table().unwrap();
        config.set_config(1, "Key", "upper").unwrap();
        config.set_config(1, "key", "lower").unwrap();
        config.set_config(1, "motd", "Willkommen 🎧").unwrap();

        assert_eq!(config.get_config_or_empty(1, "Key").unwrap(), "upper");
        assert_eq!(config.get_config_or_empty(1, "key").unwrap(), "lower");
        assert_eq!(
            config.get_all_configs(1).unwrap(),
            configs(&[("Key", "upper"), ("key", "lower"), ("motd", "Willkommen 🎧")])
        );
    });
}

#[test]
fn test_set_config_for_unknown_server_is_not_found() {
    with_each_backend("cfgnf_", |_, db| {
        let config = db.config_table().unwrap();
        let err = config.set_config(42, "name", "ghost").unwrap_err();
        assert!(err.is_not_found(), "{}", err.report());
        assert!(config.get_all_configs(42).unwrap().is_empty());
    });
}

#[test]
fn test_remove_server_cascades_to_logs_and_configs() {
    with_each_backend("cascade_", |_, db| {
        let servers = db.server_table().unwrap();
        let logs = db.log_table().unwrap();
        let config = db.config_table().unwrap();

        servers.add_server(3).unwrap();
        logs.log_message(3, "started").unwrap();
        config.set_config(3, "name", "Lobby").unwrap();
        logs.log_message(1, "untouched").unwrap();
        config.set_config(1, "name", "Root").unwrap();

        servers.remove_server(3).unwrap();
        assert_eq!(logs.get_log_size(3).unwrap(), 0);
        assert!(config.get_all_configs(3).unwrap().is_empty());

        // Re-adding the ID starts from a clean slate.
        servers.add_server(3).unwrap();
        assert!(logs.get_logs(3, None, 0).unwrap().is_empty());
        assert_eq!(config.get_config(3, "name", "unnamed").unwrap(), "unnamed");

        assert_eq!(logs.get_log_size(1).unwrap(), 1);
        assert_eq!(config.get_config_or_empty(1, "name").unwrap(), "Root");
    });
}

#[test]
fn test_reinitialization_keeps_data() {
    with_each_backend("reinit_", |params, db| {
        db.server_table().unwrap().add_server(9).unwrap();
        db.config_table().unwrap().set_config(9, "k", "v").unwrap();
        db.log_table().unwrap().log_message(9, "kept").unwrap();

        let reopened = ServerDatabase::open_with_prefix(params, "reinit_").unwrap();
        assert_eq!(
            reopened.server_table().unwrap().get_all_server_ids().unwrap(),
            [1, 9]
        );
        assert_eq!(
            reopened.config_table().unwrap().get_config_or_empty(9, "k").unwrap(),
            "v"
        );
        assert_eq!(reopened.log_table().unwrap().get_log_size(9).unwrap(), 1);
    });
}

#[test]
fn test_default_server_only_seeds_an_empty_registry() {
    with_each_backend("seed_", |params, db| {
        let servers = db.server_table().unwrap();
        servers.add_server(7).unwrap();
        servers.remove_server(1).unwrap();

        let reopened = ServerDatabase::open_with_prefix(params, "seed_").unwrap();
        assert_eq!(
            reopened.server_table().unwrap().get_all_server_ids().unwrap(),
            [7]
        );

        servers.remove_server(7).unwrap();
        let reopened = ServerDatabase::open_with_prefix(params, "seed_").unwrap();
        assert_eq!(
            reopened.server_table().unwrap().get_all_server_ids().unwrap(),
            [1]
        );
    });
}

#[test]
fn test_prefixes_isolate_installations() {
    with_each_backend("iso_a_", |params, a| {
        let b = fresh_database(params, "iso_b_");
        a.server_table().unwrap().add_server(2).unwrap();
        a.config_table().unwrap().set_config(1, "k", "a").unwrap();

        assert!(!b.server_table().unwrap().server_exists(2).unwrap());
        assert_eq!(b.config_table().unwrap().get_config(1, "k", "none").unwrap(), "none");
        b.destroy_tables().unwrap();
    });
}

#[test]
fn test_concurrent_add_has_exactly_one_winner() {
    with_each_backend("race_", |_, db| {
        let results: Vec<Result<(), DbError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| db.server_table().unwrap().add_server(42)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(err.is_duplicate(), "{}", err.report());
        }
        assert_eq!(db.server_table().unwrap().get_all_server_ids().unwrap(), [1, 42]);
    });
}

#[test]
fn test_concurrent_writers_on_different_servers() {
    with_each_backend("workers_", |_, db| {
        for id in 2..=5 {
            db.server_table().unwrap().add_server(id).unwrap();
        }

        thread::scope(|scope| {
            for id in 1..=5u32 {
                scope.spawn(move || {
                    let logs = db.log_table().unwrap();
                    let config = db.config_table().unwrap();
                    for i in 0..20 {
                        logs.log_message(id, &format!("server {id} message {i}")).unwrap();
                        config.set_config(id, "counter", &i.to_string()).unwrap();
                    }
                });
            }
        });

        for id in 1..=5 {
            assert_eq!(db.log_table().unwrap().get_log_size(id).unwrap(), 20);
            assert_eq!(
                db.config_table().unwrap().get_config_or_empty(id, "counter").unwrap(),
                "19"
            );
        }
    });
}

#[test]
fn test_simultaneous_initialization_succeeds() {
    with_each_backend("ci_", |params, db| {
        db.destroy_tables().unwrap();

        let opened: Vec<Result<ServerDatabase, DbError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|_| scope.spawn(|| ServerDatabase::open_with_prefix(params, "ci_")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for result in &opened {
            if let Err(err) = result {
                panic!("initialization failed:\n{}", err.report());
            }
        }
        for db in opened.iter().flatten() {
            assert_eq!(db.state(), DatabaseState::Ready);
            assert_eq!(db.server_table().unwrap().get_all_server_ids().unwrap(), [1]);
        }
    });
}

#[test]
fn test_log_message_never_outlives_removed_server() {
    with_each_backend("orphan_", |params, db| {
        let other = ServerDatabase::open_with_prefix(params, "orphan_").unwrap();

        for round in 0..5 {
            let id = 10 + round;
            db.server_table().unwrap().add_server(id).unwrap();

            let results: Vec<Result<(), DbError>> = thread::scope(|scope| {
                let writer = scope.spawn(|| {
                    let logs = db.log_table().unwrap();
                    (0..40)
                        .map(|i| logs.log_message(id, &format!("message {i}")))
                        .collect::<Vec<_>>()
                });
                scope.spawn(|| other.server_table().unwrap().remove_server(id).unwrap());
                writer.join().unwrap()
            });

            for err in results.iter().filter_map(|r| r.as_ref().err()) {
                assert!(err.is_not_found(), "{}", err.report());
            }
            assert!(!db.server_table().unwrap().server_exists(id).unwrap());
            assert_eq!(db.log_table().unwrap().get_log_size(id).unwrap(), 0);
            assert!(db.log_table().unwrap().get_logs(id, None, 0).unwrap().is_empty());
        }
    });
}

#[test]
fn test_schema_failure_reports_full_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.sqlite");
    {
        use serverdb_core::Session;

        // An index already owns the name of one of the tables.
        let session = serverdb_sqlite::SqliteSession::open(&SqliteParameters::new(&path)).unwrap();
        session.execute("CREATE TABLE unrelated (x INTEGER)", &[]).unwrap();
        session.execute("CREATE INDEX configs ON unrelated (x)", &[]).unwrap();
        session.close().unwrap();
    }

    let mut db = ServerDatabase::new(Backend::Sqlite);
    let err = db.init(&ConnectionParameters::sqlite(&path)).unwrap_err();
    assert_eq!(db.state(), DatabaseState::Failed);
    assert!(err.is_schema(), "{}", err.report());

    let chain: Vec<_> = err.chain().collect();
    assert!(chain.len() >= 3);
    let last = chain.last().unwrap();
    assert!(last.downcast_ref::<DbError>().is_none());
    assert!(chain.iter().any(|e| {
        e.downcast_ref::<DbError>().is_some_and(|inner| inner.is_backend())
    }));

    let report = err.report();
    assert!(report.contains("failed to create table 'configs'"));
    assert!(report.contains("already an index named configs"));
}

#[test]
fn test_missing_file_without_create_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = SqliteParameters::new(dir.path().join("absent.sqlite"));
    params.create = false;

    let mut db = ServerDatabase::new(Backend::Sqlite);
    let err = db.init(&ConnectionParameters::Sqlite(params)).unwrap_err();
    assert!(err.is_connection(), "{}", err.report());
    assert_eq!(db.state(), DatabaseState::Failed);
    assert!(!dir.path().join("absent.sqlite").exists());
}

#[test]
fn test_tables_are_unavailable_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let params = ConnectionParameters::sqlite(dir.path().join("servers.sqlite"));
    let mut db = ServerDatabase::open(&params).unwrap();
    db.close().unwrap();

    let err = db.server_table().err().unwrap();
    assert!(err.is_connection());
    assert!(err.report().contains("closed"));
}

#[test]
fn test_destroy_tables_removes_everything() {
    with_each_backend("destroy_", |params, db| {
        db.server_table().unwrap().add_server(2).unwrap();
        db.destroy_tables().unwrap();
        assert!(db.server_table().unwrap().server_exists(1).is_err());

        let reopened = ServerDatabase::open_with_prefix(params, "destroy_").unwrap();
        assert_eq!(
            reopened.server_table().unwrap().get_all_server_ids().unwrap(),
            [1]
        );
    });
}

#[test]
fn test_parameter_file_drives_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("serverdb.yaml");
    let db_path = dir.path().join("from-file.sqlite");
    std::fs::write(
        &file,
        format!("backend: sqlite\npath: {}\nbusy_timeout_ms: 250\n", db_path.display()),
    )
    .unwrap();

    let params = ConnectionParameters::load(&file).unwrap();
    let db = ServerDatabase::open(&params).unwrap();
    assert_eq!(db.backend(), Backend::Sqlite);
    assert!(db.server_table().unwrap().server_exists(1).unwrap());
    assert!(db_path.exists());
}

#[test]
fn test_log_entries_serialize_to_json() {
    with_each_backend("json_", |_, db| {
        let logs = db.log_table().unwrap();
        logs.log_message(1, "✅ 👀").unwrap();
        let entries = logs.get_logs(1, None, 0).unwrap();
        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json[0]["server_id"], 1);
        assert_eq!(json[0]["message"], "✅ 👀");
        assert!(json[0]["timestamp"].is_string());
    });
}
