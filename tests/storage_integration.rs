use chrono::{TimeZone, Utc};
use clipbrain::account::{AccountContext, AccountStore, MetricWeights};
use clipbrain::catalog::{import_file, VideoCatalog};
use clipbrain::storage::StorageManager;
use rusqlite::params;
use tempfile::TempDir;

const CATALOG: &str = r#"[
    {"id": "v1", "owner_id": "alice", "hook": "Three pantry swaps", "views": 1200,
     "saves": 40, "published_date": "2026-05-01T12:00:00Z", "theme": "Cooking"},
    {"id": "v2", "owner_id": "alice", "hook": "Why your bread is dense", "views": 5400,
     "saves": 310, "published_date": "2026-05-08T12:00:00Z"},
    {"id": "", "owner_id": "alice", "published_date": "2026-05-09T12:00:00Z"},
    {"id": "b1", "owner_id": "bob", "hook": "Desk setup tour", "views": 800,
     "published_date": "2026-05-10T12:00:00Z"}
]"#;

#[test]
fn test_storage_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("nested/brain.sqlite");
    let catalog_path = temp.path().join("videos.json");
    std::fs::write(&catalog_path, CATALOG).unwrap();

    {
        let storage = StorageManager::new(db_path.clone(), 2).expect("Failed to create storage");
        assert!(db_path.exists(), "Database file should exist");
        println!("✓ Database created at: {:?}", db_path);

        let catalog = storage.video_catalog();
        let report = import_file(catalog.as_ref(), &catalog_path).expect("Import failed");
        assert_eq!(report.imported, 3);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].index, 2);
        println!("✓ Imported {} videos", report.imported);

        let mut context = AccountContext::new("alice");
        context.mission = Some("Teach weeknight cooking".to_string());
        context.themes = vec!["Cooking".to_string()];
        context.weights = MetricWeights::from_array([0.2, 0.5, 0.3]);
        storage
            .account_store()
            .save(&context)
            .expect("Failed to save account context");
    }

    let storage = StorageManager::new(db_path.clone(), 2).expect("Failed to reopen storage");
    let catalog = storage.video_catalog();

    let alice = catalog.list_videos("alice").unwrap();
    let ids: Vec<&str> = alice.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["v1", "v2"]);
    assert_eq!(
        alice[0].published_date,
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    );
    assert_eq!(catalog.list_videos("bob").unwrap().len(), 1);

    let context = storage.account_store().get("alice").unwrap().unwrap();
    assert_eq!(context.weights, MetricWeights::from_array([0.2, 0.5, 0.3]));
    assert_eq!(context.mission.as_deref(), Some("Teach weeknight cooking"));
    assert!(storage.account_store().get("bob").unwrap().is_none());

    let stats = storage.stats("alice").unwrap();
    assert_eq!(stats.db.video_count, 2);
    assert_eq!(stats.db.vector_count, 0);
    assert!(stats.database_size > 0);

    println!("✓ Storage verified after reopen");
}

#[test]
fn test_migrations_are_recorded_once() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("brain.sqlite");

    let first = StorageManager::new(db_path.clone(), 1).unwrap();
    let count = |storage: &StorageManager| -> i64 {
        let conn = storage.database.get_conn().unwrap();
        conn.query_row("SELECT COUNT(*) FROM _migrations", params![], |row| {
            row.get(0)
        })
        .unwrap()
    };
    let applied = count(&first);
    assert!(applied > 0);
    drop(first);

    let second = StorageManager::new(db_path, 1).unwrap();
    assert_eq!(count(&second), applied);

    let conn = second.database.get_conn().unwrap();
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
             ('videos', 'content_vectors', 'corpus_versions', 'account_contexts',
              'idea_outcomes', 'insights')",
            params![],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 6);
}
