use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;
use unibook::engine::{Engine, EngineError};
use unibook::model::*;

const HOUR: i64 = 3_600_000; // 1 hour in ms
/// 2024-01-01T00:00:00Z
const BASE: i64 = 1_704_067_200_000;

fn fresh_engine(name: &str) -> Engine {
    let dir = std::env::temp_dir().join("unibook_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{name}_{}.wal", Ulid::new()));
    Engine::new(path).unwrap()
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

fn room(name: &str, seats: u32) -> ResourceSpec {
    ResourceSpec {
        kind: ResourceKind::Room,
        name: name.into(),
        details: ResourceDetails::default(),
        capacity: Some(seats),
        starts_at: None,
    }
}

fn event(name: &str, capacity: u32) -> ResourceSpec {
    ResourceSpec {
        kind: ResourceKind::CampusEvent,
        name: name.into(),
        details: ResourceDetails::default(),
        capacity: Some(capacity),
        starts_at: Some(BASE),
    }
}

fn slot(requester: String, i: i64) -> BookingRequest {
    BookingRequest {
        requester,
        span: Some(Span::new(BASE + i * HOUR, BASE + (i + 1) * HOUR)),
        ..Default::default()
    }
}

fn seat(requester: String) -> BookingRequest {
    BookingRequest {
        requester,
        ..Default::default()
    }
}

async fn phase1_sequential() {
    let engine = fresh_engine("sequential");
    let rid = Ulid::new();
    engine.create_resource(rid, room("Aula", 300)).await.unwrap();

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        engine
            .create_booking(Ulid::new(), rid, ResourceKind::Room, slot("1".into(), i as i64))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Many requesters racing for the last places of one event.
async fn phase2_hot_event() {
    let engine = Arc::new(fresh_engine("hot_event"));
    let capacity = 100;
    let eid = Ulid::new();
    engine.create_resource(eid, event("Graduation", capacity)).await.unwrap();

    let n_tasks = 1000;
    let admitted = Arc::new(AtomicUsize::new(0));
    let full = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let engine = engine.clone();
        let admitted = admitted.clone();
        let full = full.clone();
        handles.push(tokio::spawn(async move {
            let t = Instant::now();
            match engine
                .create_booking(Ulid::new(), eid, ResourceKind::CampusEvent, seat(i.to_string()))
                .await
            {
                Ok(_) => {
                    admitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(EngineError::CapacityExceeded(_)) => {
                    full.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => eprintln!("unexpected: {e}"),
            }
            t.elapsed()
        }));
    }

    let mut latencies = Vec::with_capacity(n_tasks);
    for h in handles {
        latencies.push(h.await.unwrap());
    }

    let elapsed = start.elapsed();
    let occupancy = engine.get_resource_info(eid).await.unwrap().occupancy;
    println!(
        "  {n_tasks} RSVPs in {:.2}s: {} admitted, {} full, occupancy {occupancy}/{capacity}",
        elapsed.as_secs_f64(),
        admitted.load(Ordering::Relaxed),
        full.load(Ordering::Relaxed),
    );
    assert_eq!(occupancy, capacity, "occupancy must equal capacity");
    print_latency("admission latency", &mut latencies);
}

async fn phase3_read_under_load() {
    let engine = Arc::new(fresh_engine("read_load"));
    let mut rooms = Vec::new();
    for i in 0..50 {
        let rid = Ulid::new();
        engine
            .create_resource(rid, room(&format!("R{i}"), 10 + i))
            .await
            .unwrap();
        for h in (0..200).step_by(2) {
            engine
                .create_booking(Ulid::new(), rid, ResourceKind::Room, slot("0".into(), h))
                .await
                .unwrap();
        }
        rooms.push(rid);
    }

    // Writer tasks: continuously book and cancel in the background
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        let rid = rooms[w];
        writer_handles.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let id = Ulid::new();
                let h = 1001 + 2 * (i % 1000);
                if engine
                    .create_booking(id, rid, ResourceKind::Room, slot(w.to_string(), h))
                    .await
                    .is_ok()
                {
                    let _ = engine.cancel_booking(id, ResourceKind::Room).await;
                }
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = engine.clone();
        let rid = rooms[r % rooms.len()];
        reader_handles.push(tokio::spawn(async move {
            let window = Span::new(BASE, BASE + 7 * 24 * HOUR);
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let t = Instant::now();
                if i % 2 == 0 {
                    engine.free_windows_for(rid, window).await.unwrap();
                } else {
                    engine
                        .available_rooms(Some(Span::new(BASE, BASE + HOUR)), Some(20))
                        .await
                        .unwrap();
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("free windows / available rooms", &mut all_latencies);
}

async fn phase4_churn_and_compact() {
    let engine = fresh_engine("churn");
    let eid = Ulid::new();
    engine.create_resource(eid, event("Open Day", 50)).await.unwrap();

    let n = 5000;
    let start = Instant::now();
    for i in 0..n {
        let id = Ulid::new();
        engine
            .create_booking(id, eid, ResourceKind::CampusEvent, seat((i % 50).to_string()))
            .await
            .unwrap();
        engine.cancel_booking(id, ResourceKind::CampusEvent).await.unwrap();
    }
    let churn = start.elapsed();

    let appends = engine.wal_appends_since_compact().await;
    let t = Instant::now();
    let kept = engine.compact_wal().await.unwrap();
    println!(
        "  {n} book/cancel cycles in {:.2}s; compacted {appends} appends to {kept} events in {:.2}ms",
        churn.as_secs_f64(),
        t.elapsed().as_secs_f64() * 1000.0,
    );
}

#[tokio::main]
async fn main() {
    println!("=== unibook stress benchmark ===\n");

    println!("[phase 1] sequential room bookings");
    phase1_sequential().await;

    println!("\n[phase 2] contention on one event");
    phase2_hot_event().await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load().await;

    println!("\n[phase 4] churn and compaction");
    phase4_churn_and_compact().await;

    println!("\n=== benchmark complete ===");
}
