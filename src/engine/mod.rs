mod admission;
mod availability;
mod error;
mod mutations;
mod queries;

pub use admission::{admit, find_duplicate, find_slot_conflict, has_capacity};
pub use availability::{free_windows, merge_overlapping, subtract_intervals};
pub use error::EngineError;
pub use mutations::Registration;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;

        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Flush what we have before running the non-append command.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // leak into the next batch.
    let flush_result = wal.flush_sync();
    match append_err {
        Some(e) => Err(e),
        None => flush_result,
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// The booking store: every resource with its bookings, kept in memory and
/// made durable through the WAL.
pub struct Engine {
    pub(super) state: DashMap<Ulid, SharedResourceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: booking id → resource id. Closed bookings stay mapped.
    pub(super) booking_to_resource: DashMap<Ulid, Ulid>,
    /// Held shared by every mutation (taken before any resource lock) and
    /// exclusively by compaction, so no append can slip between the
    /// compaction snapshot and the file swap.
    pub(super) compaction_gate: RwLock<()>,
}

/// Apply an event to a ResourceState (no locking, the caller holds the lock).
fn apply_to_resource(rs: &mut ResourceState, event: &Event, booking_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingConfirmed {
            id,
            resource_id,
            requester,
            span,
            label,
            note,
            contact,
            created_at,
        } => {
            rs.insert_booking(Booking {
                id: *id,
                resource_id: *resource_id,
                requester: requester.clone(),
                span: *span,
                status: BookingStatus::Confirmed,
                label: label.clone(),
                note: note.clone(),
                contact: contact.clone(),
                created_at: *created_at,
                closed_at: None,
            });
            booking_map.insert(*id, *resource_id);
        }
        Event::BookingAmended { id, label, note, .. } => {
            rs.amend_booking(*id, label.clone(), note.clone());
        }
        Event::BookingClosed { id, status, at, .. } => {
            rs.close_booking(*id, *status, *at);
        }
        Event::ResourceUpdated {
            name,
            details,
            capacity,
            starts_at,
            ..
        } => {
            rs.name = name.clone();
            rs.details = details.clone();
            rs.capacity = *capacity;
            rs.starts_at = *starts_at;
        }
        // Created/Deleted are handled at the map level, not here
        Event::ResourceCreated { .. } | Event::ResourceDeleted { .. } => {}
    }
}

/// Resource the event applies to (for non-Create/Delete events).
fn event_resource_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingConfirmed { resource_id, .. }
        | Event::BookingAmended { resource_id, .. }
        | Event::BookingClosed { resource_id, .. } => Some(*resource_id),
        Event::ResourceUpdated { id, .. } => Some(*id),
        Event::ResourceCreated { .. } | Event::ResourceDeleted { .. } => None,
    }
}

impl Engine {
    /// Replay the WAL at `wal_path` and start the writer task.
    /// Must be called from within a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let booking_to_resource = DashMap::new();
        let mut resources: HashMap<Ulid, ResourceState> = HashMap::new();
        for event in &events {
            match event {
                Event::ResourceCreated {
                    id,
                    kind,
                    name,
                    details,
                    capacity,
                    starts_at,
                } => {
                    let spec = ResourceSpec {
                        kind: *kind,
                        name: name.clone(),
                        details: details.clone(),
                        capacity: *capacity,
                        starts_at: *starts_at,
                    };
                    resources.insert(*id, ResourceState::new(*id, spec));
                }
                Event::ResourceDeleted { id } => {
                    if let Some(rs) = resources.remove(id) {
                        for booking in &rs.bookings {
                            booking_to_resource.remove(&booking.id);
                        }
                    }
                }
                other => {
                    if let Some(resource_id) = event_resource_id(other)
                        && let Some(rs) = resources.get_mut(&resource_id)
                    {
                        apply_to_resource(rs, other, &booking_to_resource);
                    }
                }
            }
        }

        info!(
            "replayed {} WAL events into {} resources from {}",
            events.len(),
            resources.len(),
            wal_path.display()
        );

        let state = DashMap::new();
        for (id, rs) in resources {
            state.insert(id, Arc::new(RwLock::new(rs)));
        }

        metrics::gauge!(crate::observability::RESOURCES_ACTIVE).set(state.len() as f64);

        Ok(Self {
            state,
            wal_tx,
            booking_to_resource,
            compaction_gate: RwLock::new(()),
        })
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn resource_count(&self) -> usize {
        self.state.len()
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_resource_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_resource.get(booking_id).map(|e| *e.value())
    }

    /// Every resource handle, cloned out of the map so no shard lock is held
    /// across an await.
    pub(super) fn all_resources(&self) -> Vec<SharedResourceState> {
        self.state.iter().map(|e| e.value().clone()).collect()
    }

    /// WAL-append, then apply. State is untouched if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ResourceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_resource(rs, event, &self.booking_to_resource);
        Ok(())
    }

    /// Write-lock a resource that is still in the map once the lock is held.
    /// A resource deleted while we waited is `NotFound`.
    pub(super) async fn lock_resource(
        &self,
        id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ResourceState>, EngineError> {
        let rs = self.get_resource(id).ok_or(EngineError::NotFound(*id))?;
        let guard = rs.clone().write_owned().await;
        let live = self
            .state
            .get(id)
            .is_some_and(|e| Arc::ptr_eq(e.value(), &rs));
        if !live {
            return Err(EngineError::NotFound(*id));
        }
        Ok(guard)
    }

    /// Lookup booking → resource, get resource, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ResourceState>, EngineError> {
        let resource_id = self
            .get_resource_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        self.lock_resource(&resource_id)
            .await
            .map_err(|_| EngineError::BookingNotFound(*booking_id))
    }
}
