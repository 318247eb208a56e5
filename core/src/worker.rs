//! Per-business serialization domains.
//!
//! RULE: all detector/planner/propagator activity for one business runs
//! on that business's single worker thread, in submission order.
//! Different businesses run fully in parallel and share no mutable
//! state; each worker owns its own store connection.

use crate::{
    clock::EngineClock,
    config::EngineConfig,
    engine::DispatchEngine,
    error::{DispatchError, DispatchResult},
    notify::LogNotifier,
    store::DispatchStore,
    types::BusinessId,
};
use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

enum WorkerCommand {
    RunPass,
    Shutdown,
}

struct BusinessWorker {
    sender: Sender<WorkerCommand>,
    handle: JoinHandle<()>,
}

/// Owns one worker per business and routes pass requests to them.
pub struct Coordinator {
    store: DispatchStore,
    config: EngineConfig,
    clock: EngineClock,
    workers: HashMap<BusinessId, BusinessWorker>,
}

impl Coordinator {
    /// `store` must point at a shared database (a file or a
    /// shared-cache memory URI): every worker reopens its own
    /// connection from it.
    pub fn new(store: DispatchStore, config: EngineConfig, clock: EngineClock) -> Self {
        Self {
            store,
            config,
            clock,
            workers: HashMap::new(),
        }
    }

    /// Spawn the worker domain for a business if it does not exist yet.
    pub fn ensure_worker(&mut self, business_id: BusinessId) -> DispatchResult<()> {
        if self.workers.contains_key(&business_id) {
            return Ok(());
        }

        let store = self.store.reopen()?;
        let engine = DispatchEngine::new(
            business_id,
            self.config.clone(),
            self.clock.clone(),
            store,
            Box::new(LogNotifier),
        );
        let (sender, receiver) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name(format!("dispatch-{business_id}"))
            .spawn(move || worker_loop(engine, receiver))
            .map_err(|e| DispatchError::Other(anyhow::anyhow!("spawn worker thread: {e}")))?;

        self.workers.insert(business_id, BusinessWorker { sender, handle });
        Ok(())
    }

    /// Queue one pass on the business's domain. Fire-and-forget: the
    /// outcome lands in the audit log and the worker's log lines.
    pub fn submit_pass(&mut self, business_id: BusinessId) -> DispatchResult<()> {
        self.ensure_worker(business_id)?;
        let worker = &self.workers[&business_id];
        if worker.sender.send(WorkerCommand::RunPass).is_err() {
            log::error!("worker for business {business_id} is gone; dropping pass");
        }
        Ok(())
    }

    /// Queue a pass for every known business.
    pub fn submit_pass_all(&mut self) -> DispatchResult<()> {
        for business_id in self.store.list_business_ids()? {
            self.submit_pass(business_id)?;
        }
        Ok(())
    }

    /// Drain all queued work and join every worker.
    pub fn shutdown(self) {
        for (business_id, worker) in self.workers {
            let _ = worker.sender.send(WorkerCommand::Shutdown);
            if worker.handle.join().is_err() {
                log::error!("worker for business {business_id} panicked");
            }
        }
    }
}

fn worker_loop(engine: DispatchEngine, receiver: mpsc::Receiver<WorkerCommand>) {
    let business_id = engine.business_id();
    for command in receiver {
        match command {
            WorkerCommand::RunPass => match engine.run_pass() {
                Ok(summary) => {
                    if summary.delays_detected > 0 || summary.assignments > 0 {
                        log::info!(
                            "business {business_id}: {} delays, {} reassigned, {} assigned, {} in place",
                            summary.delays_detected,
                            summary.reassignments,
                            summary.assignments,
                            summary.accepted_in_place,
                        );
                    }
                }
                // Nothing in a pass is fatal; log and wait for the next one.
                Err(e) => log::error!("pass for business {business_id} failed: {e}"),
            },
            WorkerCommand::Shutdown => break,
        }
    }
}
