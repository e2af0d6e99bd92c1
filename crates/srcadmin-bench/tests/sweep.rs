//! Full sweep against a mock admin server.

use srcadmin_bench::{BenchmarkConfig, BenchmarkRunner};
use srcadmin_core::{Error, Instance};
use srcadmin_db::Database;
use srcadmin_rcon::packet::{read_packet, write_packet, Packet};
use srcadmin_rcon::{RconPool, TYPE_AUTH, TYPE_AUTH_RESPONSE, TYPE_VALUE};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;

/// Mock server: accepts auth, answers every command, records them in order.
async fn spawn_mock_server(commands: Arc<Mutex<Vec<String>>>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let auth = read_packet(&mut stream).await.unwrap();
        assert_eq!(auth.packet_type, TYPE_AUTH);
        write_packet(&mut stream, &Packet::new(auth.request_id, TYPE_AUTH_RESPONSE, ""))
            .await
            .unwrap();

        loop {
            let Ok(exec) = read_packet(&mut stream).await else {
                return;
            };
            let Ok(sentinel) = read_packet(&mut stream).await else {
                return;
            };
            commands.lock().unwrap().push(exec.body.clone());

            let reply = if exec.body == "status" {
                "hostname: bench\ntick: 64\nplayers : 0 humans, 5 bots (10 max)\n".to_string()
            } else {
                String::new()
            };
            write_packet(&mut stream, &Packet::new(exec.request_id, TYPE_VALUE, reply))
                .await
                .unwrap();
            write_packet(
                &mut stream,
                &Packet::new(sentinel.request_id, TYPE_VALUE, ""),
            )
            .await
            .unwrap();
        }
    });

    addr
}

async fn setup_db() -> (Database, Uuid, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(&dir.path().join("test.db")).await.unwrap();
    let inst = Instance::new("bench", PathBuf::from("/srv/bench"), 27015);
    let id = db.instances().insert(&inst).await.unwrap();
    (db, id, dir)
}

#[tokio::test]
async fn test_two_step_sweep() {
    let (db, instance_id, _dir) = setup_db().await;
    let commands = Arc::new(Mutex::new(Vec::new()));
    let addr = spawn_mock_server(Arc::clone(&commands)).await;

    let pool = Arc::new(RconPool::new());
    pool.connect(instance_id, addr.to_string(), "pw").await.unwrap();

    let runner = BenchmarkRunner::new(
        BenchmarkConfig {
            instance_id,
            max_bots: 10,
            step_size: 5,
            step_duration: Duration::from_secs(1),
        },
        db.clone(),
        pool,
    );

    let progress: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&progress);
    runner.set_on_progress(move |step, total, metrics| {
        assert_eq!(total, 2);
        assert!(step >= 1 && step <= 2);
        seen.lock().unwrap().push(metrics.bot_count);
    });

    let result = runner.run().await.unwrap();

    // Exactly two progress events with the stepped bot counts
    assert_eq!(progress.lock().unwrap().clone(), vec![5, 10]);

    // Quota commands issued in order, ending with the reset
    let quotas: Vec<String> = commands
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.starts_with("bot_quota"))
        .cloned()
        .collect();
    assert_eq!(quotas, vec!["bot_quota 5", "bot_quota 10", "bot_quota 0"]);

    // One persisted aggregate with the parsed tick rate
    assert_eq!(result.bot_count, 10);
    assert_eq!(result.avg_tickrate, 64.0);
    assert_eq!(result.min_tickrate, 64.0);
    assert_eq!(result.avg_frametime, 0.0);
    assert_eq!(result.duration_sec, 2);

    let stored = db.benchmarks().list_by_instance(instance_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, result.id);
}

#[tokio::test]
async fn test_cancellation_between_samples() {
    let (db, instance_id, _dir) = setup_db().await;
    // No pool entry: the sweep still samples the host, just without bots
    let pool = Arc::new(RconPool::new());

    let runner = Arc::new(BenchmarkRunner::new(
        BenchmarkConfig {
            instance_id,
            max_bots: 50,
            step_size: 10,
            step_duration: Duration::from_secs(30),
        },
        db.clone(),
        pool,
    ));

    let handle = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move { runner.run().await })
    };

    tokio::time::sleep(Duration::from_millis(800)).await;
    let started = std::time::Instant::now();
    runner.stop();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(Error::Stopped)));
    assert!(started.elapsed() < Duration::from_secs(3));

    // Nothing persisted for a cancelled run
    assert!(db.benchmarks().list_by_instance(instance_id).await.unwrap().is_empty());
}
