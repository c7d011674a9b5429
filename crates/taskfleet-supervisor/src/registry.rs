//! Worker registry.
//!
//! The authoritative table of worker records, keyed by id and kept in
//! first-seen order so iteration (and tie-breaking downstream in the
//! router) is deterministic. Liveness is heartbeat-driven: the periodic
//! sweep flips workers to `offline` once they have missed enough beats;
//! offline records stay in the table for observability until explicitly
//! unregistered.

use serde::Serialize;
use std::collections::HashMap;
use taskfleet_common::{epoch_ms, Heartbeat, Worker, WorkerRegistration, WorkerStatus};

/// Aggregate registry counters for the stats surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub online: usize,
    pub busy: usize,
    pub degraded: usize,
    pub offline: usize,
    pub total_max_load: u64,
    pub total_current_load: u64,
}

/// Single source of truth for worker membership.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Worker>,
    /// Ids in first-seen order.
    order: Vec<String>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a worker, or refresh an existing record with the new
    /// descriptor. Either way the worker comes back `online` with a fresh
    /// heartbeat stamp.
    ///
    /// Returns the stored record and whether this registration brought the
    /// worker online (it was absent, or was marked offline).
    pub fn register(&mut self, reg: WorkerRegistration) -> (Worker, bool) {
        let now = epoch_ms();
        if let Some(existing) = self.workers.get_mut(&reg.id) {
            let came_online = existing.status == WorkerStatus::Offline;
            existing.name = reg.name;
            existing.endpoint = reg.endpoint;
            existing.capabilities = reg.capabilities;
            existing.max_load = reg.max_load;
            if reg.metadata.is_some() {
                existing.metadata = reg.metadata;
            }
            existing.current_load = reg.current_load;
            existing.status = WorkerStatus::Online;
            existing.last_heartbeat_ms = now;
            (existing.clone(), came_online)
        } else {
            let worker = Worker {
                id: reg.id.clone(),
                name: reg.name,
                endpoint: reg.endpoint,
                capabilities: reg.capabilities,
                max_load: reg.max_load,
                metadata: reg.metadata,
                status: WorkerStatus::Online,
                current_load: reg.current_load,
                last_heartbeat_ms: now,
                registered_at_ms: now,
            };
            self.order.push(reg.id.clone());
            self.workers.insert(reg.id, worker.clone());
            (worker, true)
        }
    }

    /// Remove a worker; returns whether it existed.
    pub fn unregister(&mut self, id: &str) -> bool {
        let existed = self.workers.remove(id).is_some();
        if existed {
            self.order.retain(|w| w != id);
        }
        existed
    }

    /// Apply a heartbeat. Unknown ids are ignored (`None`).
    ///
    /// Returns the updated record and whether this beat brought an
    /// offline worker back.
    pub fn heartbeat(&mut self, hb: &Heartbeat) -> Option<(Worker, bool)> {
        let worker = self.workers.get_mut(&hb.worker_id)?;
        let came_online =
            worker.status == WorkerStatus::Offline && hb.status != WorkerStatus::Offline;
        worker.status = hb.status;
        worker.current_load = hb.current_load;
        worker.max_load = hb.max_load;
        if let Some(capabilities) = &hb.capabilities {
            worker.capabilities = capabilities.clone();
        }
        worker.last_heartbeat_ms = epoch_ms();
        Some((worker.clone(), came_online))
    }

    /// Liveness sweep: flip non-offline workers whose last heartbeat is
    /// older than `heartbeat_interval_ms * missed_threshold` to `offline`.
    /// Returns the newly-offline records.
    pub fn check_worker_health(
        &mut self,
        heartbeat_interval_ms: u64,
        missed_threshold: u32,
    ) -> Vec<Worker> {
        let now = epoch_ms();
        let cutoff = heartbeat_interval_ms.saturating_mul(missed_threshold as u64);
        let mut lost = Vec::new();
        for id in &self.order {
            if let Some(worker) = self.workers.get_mut(id) {
                if worker.status != WorkerStatus::Offline
                    && now.saturating_sub(worker.last_heartbeat_ms) > cutoff
                {
                    worker.status = WorkerStatus::Offline;
                    lost.push(worker.clone());
                }
            }
        }
        lost
    }

    pub fn get(&self, id: &str) -> Option<Worker> {
        self.workers.get(id).cloned()
    }

    /// All workers in first-seen order.
    pub fn get_all(&self) -> Vec<Worker> {
        self.order
            .iter()
            .filter_map(|id| self.workers.get(id))
            .cloned()
            .collect()
    }

    pub fn get_by_status(&self, status: WorkerStatus) -> Vec<Worker> {
        self.order
            .iter()
            .filter_map(|id| self.workers.get(id))
            .filter(|w| w.status == status)
            .cloned()
            .collect()
    }

    /// Online workers whose capability set covers `capability` (an empty
    /// set counts, per the wildcard rule). Busy workers are excluded:
    /// capability lookups are for matching, not fallback listing.
    pub fn get_by_capability(&self, capability: &str) -> Vec<Worker> {
        self.order
            .iter()
            .filter_map(|id| self.workers.get(id))
            .filter(|w| w.status == WorkerStatus::Online && w.accepts(capability))
            .cloned()
            .collect()
    }

    /// Workers eligible to take one more task: online or busy, with load
    /// headroom. First-seen order.
    pub fn get_available(&self) -> Vec<Worker> {
        self.order
            .iter()
            .filter_map(|id| self.workers.get(id))
            .filter(|w| {
                matches!(w.status, WorkerStatus::Online | WorkerStatus::Busy) && w.has_headroom()
            })
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: self.workers.len(),
            online: 0,
            busy: 0,
            degraded: 0,
            offline: 0,
            total_max_load: 0,
            total_current_load: 0,
        };
        for w in self.workers.values() {
            match w.status {
                WorkerStatus::Online => stats.online += 1,
                WorkerStatus::Busy => stats.busy += 1,
                WorkerStatus::Degraded => stats.degraded += 1,
                WorkerStatus::Offline => stats.offline += 1,
            }
            stats.total_max_load += w.max_load as u64;
            stats.total_current_load += w.current_load as u64;
        }
        stats
    }

    /// Count one assigned task against the worker's load. Heartbeats
    /// overwrite this with the worker-advertised value.
    pub fn bump_load(&mut self, id: &str) {
        if let Some(w) = self.workers.get_mut(id) {
            w.current_load = w.current_load.saturating_add(1);
        }
    }

    /// Release one assigned task's worth of load.
    pub fn release_load(&mut self, id: &str) {
        if let Some(w) = self.workers.get_mut(id) {
            w.current_load = w.current_load.saturating_sub(1);
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(id: &str, capabilities: Vec<&str>, max_load: u32) -> WorkerRegistration {
        WorkerRegistration {
            id: id.to_string(),
            name: format!("worker-{}", id),
            endpoint: format!("http://localhost/{}", id),
            capabilities: capabilities.into_iter().map(String::from).collect(),
            current_load: 0,
            max_load,
            metadata: None,
        }
    }

    fn heartbeat(id: &str, status: WorkerStatus, current: u32, max: u32) -> Heartbeat {
        Heartbeat {
            worker_id: id.to_string(),
            status,
            current_load: current,
            max_load: max,
            capabilities: None,
        }
    }

    #[test]
    fn test_register_inserts_online() {
        let mut reg = WorkerRegistry::new();
        let (worker, came_online) = reg.register(registration("w1", vec!["chat"], 2));
        assert!(came_online);
        assert_eq!(worker.status, WorkerStatus::Online);
        assert_eq!(worker.max_load, 2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_re_register_merges_and_refreshes() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec!["chat"], 2));
        let before = reg.get("w1").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let (worker, came_online) = reg.register(registration("w1", vec!["code"], 8));
        assert!(!came_online);
        assert_eq!(worker.capabilities, vec!["code".to_string()]);
        assert_eq!(worker.max_load, 8);
        assert!(worker.last_heartbeat_ms >= before.last_heartbeat_ms);
        assert_eq!(worker.registered_at_ms, before.registered_at_ms);
        // Same stats shape as registering once.
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.stats().online, 1);
    }

    #[test]
    fn test_register_after_offline_reports_online() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec![], 2));

        // With a zero cutoff any elapsed time counts as a missed beat.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let lost = reg.check_worker_health(0, 0);
        assert_eq!(lost.len(), 1);
        assert_eq!(reg.get("w1").unwrap().status, WorkerStatus::Offline);

        let (worker, came_online) = reg.register(registration("w1", vec![], 2));
        assert!(came_online);
        assert_eq!(worker.status, WorkerStatus::Online);
    }

    #[test]
    fn test_unregister() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec![], 2));
        assert!(reg.unregister("w1"));
        assert!(!reg.unregister("w1"));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_heartbeat_updates_dynamic_fields() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec!["chat"], 2));
        let (worker, came_online) = reg
            .heartbeat(&heartbeat("w1", WorkerStatus::Busy, 2, 4))
            .unwrap();
        assert!(!came_online);
        assert_eq!(worker.status, WorkerStatus::Busy);
        assert_eq!(worker.current_load, 2);
        assert_eq!(worker.max_load, 4);
        // Capabilities untouched when absent from the beat.
        assert_eq!(worker.capabilities, vec!["chat".to_string()]);
    }

    #[test]
    fn test_heartbeat_can_replace_capabilities() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec!["chat"], 2));
        let hb = Heartbeat {
            capabilities: Some(vec!["code".to_string(), "embed".to_string()]),
            ..heartbeat("w1", WorkerStatus::Online, 0, 2)
        };
        let (worker, _) = reg.heartbeat(&hb).unwrap();
        assert_eq!(worker.capabilities, vec!["code".to_string(), "embed".to_string()]);
    }

    #[test]
    fn test_heartbeat_unknown_is_noop() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec![], 2));
        let before = reg.stats();
        assert!(reg.heartbeat(&heartbeat("ghost", WorkerStatus::Online, 0, 1)).is_none());
        let after = reg.stats();
        assert_eq!(before.total, after.total);
        assert_eq!(before.online, after.online);
    }

    #[test]
    fn test_liveness_sweep_flips_silent_workers() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec![], 2));
        reg.register(registration("w2", vec![], 2));

        std::thread::sleep(std::time::Duration::from_millis(30));
        // w2 beats, w1 stays silent.
        reg.heartbeat(&heartbeat("w2", WorkerStatus::Online, 0, 2));

        let lost = reg.check_worker_health(10, 2); // cutoff 20ms
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].id, "w1");
        assert_eq!(reg.get("w1").unwrap().status, WorkerStatus::Offline);
        assert_eq!(reg.get("w2").unwrap().status, WorkerStatus::Online);

        // Offline workers stay in the table and are not re-reported.
        assert!(reg.check_worker_health(10, 2).is_empty());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_get_by_status_and_capability() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec!["chat"], 2));
        reg.register(registration("w2", vec![], 2));
        reg.register(registration("w3", vec!["code"], 2));
        reg.heartbeat(&heartbeat("w3", WorkerStatus::Busy, 1, 2));

        assert_eq!(reg.get_by_status(WorkerStatus::Online).len(), 2);
        assert_eq!(reg.get_by_status(WorkerStatus::Busy).len(), 1);

        // Busy workers are excluded from capability lookups.
        let chat = reg.get_by_capability("chat");
        assert_eq!(chat.len(), 2); // w1 explicit + w2 wildcard
        let code = reg.get_by_capability("code");
        assert_eq!(code.len(), 1); // w2 wildcard only; w3 is busy
        assert_eq!(code[0].id, "w2");
    }

    #[test]
    fn test_get_available_requires_headroom() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec![], 2));
        reg.register(registration("w2", vec![], 2));
        reg.register(registration("w3", vec![], 2));
        reg.heartbeat(&heartbeat("w1", WorkerStatus::Busy, 1, 2)); // busy + headroom
        reg.heartbeat(&heartbeat("w2", WorkerStatus::Busy, 2, 2)); // busy, full
        reg.heartbeat(&heartbeat("w3", WorkerStatus::Degraded, 0, 2)); // degraded

        let available = reg.get_available();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "w1");
    }

    #[test]
    fn test_available_order_is_first_seen() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("b", vec![], 2));
        reg.register(registration("a", vec![], 2));
        reg.register(registration("c", vec![], 2));
        let ids: Vec<_> = reg.get_available().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_stats_counts_and_sums() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec![], 4));
        reg.register(registration("w2", vec![], 6));
        reg.heartbeat(&heartbeat("w2", WorkerStatus::Busy, 3, 6));

        let stats = reg.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.online, 1);
        assert_eq!(stats.busy, 1);
        assert_eq!(stats.total_max_load, 10);
        assert_eq!(stats.total_current_load, 3);
    }

    #[test]
    fn test_bump_and_release_load() {
        let mut reg = WorkerRegistry::new();
        reg.register(registration("w1", vec![], 2));
        reg.bump_load("w1");
        reg.bump_load("w1");
        assert_eq!(reg.get("w1").unwrap().current_load, 2);
        assert!(!reg.get("w1").unwrap().has_headroom());

        reg.release_load("w1");
        assert_eq!(reg.get("w1").unwrap().current_load, 1);
        // Saturating: never underflows.
        reg.release_load("w1");
        reg.release_load("w1");
        assert_eq!(reg.get("w1").unwrap().current_load, 0);
    }
}
