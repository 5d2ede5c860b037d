//! The distributor: one file through classification, assignment, dispatch,
//! and event emission; one request through depth-first traversal.
//!
//! Each file node is processed under its own cooperative distribution
//! budget. If that budget expires mid-node the node's event may be lost,
//! but children already collected still recurse under the enclosing
//! request budget. Scanner faults and unresolvable scanner names are
//! contained per scanner; only coordinator faults abandon the request.

use crate::assign::{compile_mappings, sort_assignments, Assignment, ScannerMapping};
use crate::coordinator::{ArcCoordinator, Coordinator};
use crate::core::config::BackendConfig;
use crate::core::error::{ConfigError, ScanError, WorkerError};
use crate::core::event::{EventRecord, FileRecord};
use crate::core::file::FileNode;
use crate::scanners::{FaultBreaker, ScanOptions, ScannerRegistry};
use crate::tasting::Tasting;

use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;

/// Runs files through classification and their assigned scanners.
#[derive(Debug)]
pub struct Distributor {
    coordinator: ArcCoordinator,
    tasting: Tasting,
    mappings: Vec<ScannerMapping>,
    registry: ScannerRegistry,
    breaker: FaultBreaker,
    max_depth: u32,
    distribution: Duration,
}

impl Distributor {
    /// Builds a distributor: compiles every scanner mapping and prepares
    /// the lazy plugin registry.
    pub fn new(
        config: Arc<BackendConfig>,
        coordinator: ArcCoordinator,
        tasting: Tasting,
    ) -> Result<Self, ConfigError> {
        let mappings = compile_mappings(&config.scanners)?;
        let registry = ScannerRegistry::new(Arc::clone(&config), Arc::clone(&coordinator));

        Ok(Self {
            coordinator,
            tasting,
            mappings,
            registry,
            breaker: FaultBreaker::default(),
            max_depth: config.limits.max_depth,
            distribution: config.limits.distribution(),
        })
    }

    /// Processes one whole request: the root file plus everything scanners
    /// extract from it, depth-first in child-insertion order.
    ///
    /// The explicit stack keeps native call depth flat; `max_depth` is the
    /// termination guarantee against archive bombs.
    pub async fn process_request(
        &mut self,
        root_id: &str,
        expire_at: i64,
    ) -> Result<(), WorkerError> {
        let mut stack = vec![FileNode::root(root_id)];

        while let Some(mut file) = stack.pop() {
            let mut children = Vec::new();
            let budget = self.distribution;

            match tokio::time::timeout(
                budget,
                self.distribute(&mut file, root_id, expire_at, &mut children),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    let err = WorkerError::DistributionTimeout {
                        uid: file.uid.clone(),
                    };
                    tracing::warn!(
                        root_id,
                        uid = %file.uid,
                        depth = file.depth,
                        error = %err,
                        "event for this node may be lost; collected children still recurse"
                    );
                }
            }

            // Adopt children, reversed so the stack pops them in insertion
            // order.
            for mut child in children.into_iter().rev() {
                child.parent = Some(file.uid.clone());
                child.depth = file.depth + 1;
                stack.push(child);
            }
        }

        Ok(())
    }

    /// Distributes a single file node: drain, taste, assign, dispatch,
    /// emit. Children are appended to `children` as scanners hand them
    /// over, so partial progress survives a distribution timeout.
    async fn distribute(
        &mut self,
        file: &mut FileNode,
        root_id: &str,
        expire_at: i64,
        children: &mut Vec<FileNode>,
    ) -> Result<(), WorkerError> {
        if file.depth > self.max_depth {
            tracing::warn!(
                root_id,
                uid = %file.uid,
                depth = file.depth,
                max_depth = self.max_depth,
                "skipping file beyond depth budget"
            );
            return Ok(());
        }

        let data = self.coordinator.drain_bytes(&file.pointer).await?;

        let taste = self.tasting.taste(&data);
        file.flavors.mime = taste.mime;
        file.flavors.yara = taste.rules;
        let flavors = file.flavors.union();

        let mut assignments: Vec<Assignment> = self
            .mappings
            .iter()
            .filter_map(|mapping| mapping.assign_file(file, &flavors))
            .collect();
        sort_assignments(&mut assignments);

        let scanner_names: Vec<String> =
            assignments.iter().map(|a| a.name.clone()).collect();
        let file_record = FileRecord::new(file, scanner_names, data.len() as u64, root_id);

        let mut scan = Map::new();
        for assignment in &assignments {
            if !self.breaker.allows(&assignment.name) {
                tracing::warn!(
                    root_id,
                    scanner = %assignment.name,
                    "scanner skipped by fault breaker"
                );
                continue;
            }

            let scanner = match self.registry.get(&assignment.name) {
                Ok(scanner) => scanner,
                Err(err) => {
                    tracing::error!(root_id, error = %err, "skipping unresolvable scanner");
                    continue;
                }
            };

            let options = ScanOptions::new(assignment.options.clone());
            match scanner.scan(&data, file, &options, expire_at).await {
                Ok(scanned) => {
                    self.breaker.record_success(&assignment.name);
                    // Last writer wins on key collision; the stable
                    // priority order keeps that deterministic.
                    scan.insert(assignment.name.clone(), scanned.output);
                    children.extend(scanned.children);
                }
                Err(ScanError::Coordinator(err)) => return Err(WorkerError::Coordinator(err)),
                Err(err) => {
                    self.breaker.record_failure(&assignment.name);
                    tracing::error!(
                        root_id,
                        scanner = %assignment.name,
                        error = %err,
                        "scanner failed; other scanners continue"
                    );
                }
            }
        }

        let event = EventRecord {
            file: file_record,
            scan,
        };
        self.coordinator
            .emit(root_id, &event.to_wire(), expire_at)
            .await?;

        Ok(())
    }

    /// Test hook for seeding synthetic scanner instances.
    #[cfg(test)]
    pub(crate) fn registry_mut(&mut self) -> &mut ScannerRegistry {
        &mut self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TastingConfig;
    use crate::coordinator::{Coordinator, MemoryCoordinator};
    use crate::scanners::{FileScanner, Scanned};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::io::Write;

    const EXPIRE_AT: i64 = 2_000_000_000;

    fn distributor(scanners_yaml: &str, coordinator: Arc<MemoryCoordinator>) -> Distributor {
        let mut config = BackendConfig::default();
        config.scanners = serde_yaml::from_str(scanners_yaml).unwrap();
        config.limits.max_depth = 5;
        config.limits.distribution = 10;

        let tasting = Tasting::from_config(&TastingConfig::default()).unwrap();
        Distributor::new(Arc::new(config), coordinator, tasting).unwrap()
    }

    fn parsed_events(coordinator: &MemoryCoordinator, root_id: &str) -> Vec<Value> {
        coordinator
            .events(root_id)
            .iter()
            .map(|raw| serde_json::from_slice(raw).unwrap())
            .collect()
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_single_file_no_scanners() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.stage_bytes("r1", b"hello world\n".to_vec());

        let mut distributor = distributor("{}", coordinator.clone());
        distributor.process_request("r1", EXPIRE_AT).await.unwrap();

        let events = parsed_events(&coordinator, "r1");
        assert_eq!(events.len(), 1);

        let file = &events[0]["file"];
        assert_eq!(file["size"], 12);
        assert_eq!(file["depth"], 0);
        assert_eq!(file["scanners"], json!([]));
        assert_eq!(file["flavors"]["mime"], json!(["text/plain"]));
        assert_eq!(file["tree"]["node"], "r1");
        assert_eq!(file["tree"]["parent"], Value::Null);
        assert_eq!(file["tree"]["root"], "r1");

        // The event key carries the request expiry.
        assert_eq!(coordinator.expiry("event:r1"), Some(EXPIRE_AT));
    }

    #[tokio::test]
    async fn test_archive_expands_into_child_events() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.stage_bytes("r1", zip_bytes(&[("a.txt", b"alpha bytes")]));

        let yaml = "ScanZip:\n- positive:\n    flavors: [\"application/zip\"]\n  priority: 5\n";
        let mut distributor = distributor(yaml, coordinator.clone());
        distributor.process_request("r1", EXPIRE_AT).await.unwrap();

        let events = parsed_events(&coordinator, "r1");
        assert_eq!(events.len(), 2);

        let parent = &events[0];
        assert_eq!(parent["file"]["scanners"], json!(["ScanZip"]));
        assert_eq!(parent["file"]["tree"]["node"], "r1");
        assert_eq!(parent["scan"]["ScanZip"]["extracted"], 1);

        let child = &events[1];
        assert_eq!(child["file"]["depth"], 1);
        assert_eq!(child["file"]["name"], "a.txt");
        assert_eq!(child["file"]["source"], "ScanZip");
        assert_eq!(child["file"]["size"], 11);
        assert_eq!(child["file"]["tree"]["parent"], "r1");
        assert_eq!(child["file"]["tree"]["root"], "r1");
    }

    #[tokio::test]
    async fn test_priority_orders_dispatch() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.stage_bytes("r1", b"plain text".to_vec());

        // Configured low-priority first; the sort must put ScanHash (7)
        // ahead of ScanEntropy (3).
        let yaml = concat!(
            "ScanEntropy:\n- positive:\n    flavors: [\"*\"]\n  priority: 3\n",
            "ScanHash:\n- positive:\n    flavors: [\"*\"]\n  priority: 7\n",
        );
        let mut distributor = distributor(yaml, coordinator.clone());
        distributor.process_request("r1", EXPIRE_AT).await.unwrap();

        let events = parsed_events(&coordinator, "r1");
        assert_eq!(events[0]["file"]["scanners"], json!(["ScanHash", "ScanEntropy"]));
        assert!(events[0]["scan"]["ScanHash"].is_object());
        assert!(events[0]["scan"]["ScanEntropy"].is_object());
    }

    #[tokio::test]
    async fn test_missing_scanner_is_soft() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.stage_bytes("r1", b"payload".to_vec());

        let yaml = concat!(
            "ScanImaginary:\n- positive:\n    flavors: [\"*\"]\n  priority: 9\n",
            "ScanHash:\n- positive:\n    flavors: [\"*\"]\n",
        );
        let mut distributor = distributor(yaml, coordinator.clone());
        distributor.process_request("r1", EXPIRE_AT).await.unwrap();

        let events = parsed_events(&coordinator, "r1");
        assert_eq!(events.len(), 1);

        // Assignment happened, resolution failed softly: the name stays in
        // the assigned list while the scan map omits it.
        assert_eq!(
            events[0]["file"]["scanners"],
            json!(["ScanImaginary", "ScanHash"])
        );
        assert!(events[0]["scan"]["ScanImaginary"].is_null());
        assert!(events[0]["scan"]["ScanHash"].is_object());
    }

    #[tokio::test]
    async fn test_depth_budget_skips_children() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.stage_bytes("r1", zip_bytes(&[("deep.txt", b"too deep")]));

        let yaml = "ScanZip:\n- positive:\n    flavors: [\"application/zip\"]\n";
        let mut config = BackendConfig::default();
        config.scanners = serde_yaml::from_str(yaml).unwrap();
        config.limits.max_depth = 0;

        let tasting = Tasting::from_config(&TastingConfig::default()).unwrap();
        let mut distributor =
            Distributor::new(Arc::new(config), coordinator.clone(), tasting).unwrap();
        distributor.process_request("r1", EXPIRE_AT).await.unwrap();

        // Root distributes, the extracted child is beyond the budget and
        // produces no event.
        let events = parsed_events(&coordinator, "r1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["file"]["depth"], 0);
    }

    #[tokio::test]
    async fn test_coordinator_fault_abandons_request() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.stage_bytes("r1", b"payload".to_vec());

        let mut distributor = distributor("{}", coordinator.clone());
        coordinator.set_faulty(true);

        let err = distributor.process_request("r1", EXPIRE_AT).await.unwrap_err();
        assert!(matches!(err, WorkerError::Coordinator(_)));

        coordinator.set_faulty(false);
        assert!(coordinator.events("r1").is_empty());
    }

    /// Stages one child file, then returns it.
    #[derive(Debug)]
    struct SpawnScanner {
        coordinator: ArcCoordinator,
    }

    #[async_trait]
    impl FileScanner for SpawnScanner {
        fn name(&self) -> &'static str {
            "ScanSpawn"
        }

        async fn scan(
            &self,
            _data: &[u8],
            _file: &FileNode,
            _options: &ScanOptions,
            expire_at: i64,
        ) -> Result<Scanned, ScanError> {
            let child = FileNode::extracted(self.name()).with_name("spawned.txt");
            self.coordinator
                .push_bytes(&child.pointer, b"spawned text", expire_at)
                .await?;
            Ok(Scanned::output(json!({ "spawned": 1 })).with_children(vec![child]))
        }
    }

    /// Never finishes within any distribution budget.
    #[derive(Debug)]
    struct StallScanner;

    #[async_trait]
    impl FileScanner for StallScanner {
        fn name(&self) -> &'static str {
            "ScanStall"
        }

        async fn scan(
            &self,
            _data: &[u8],
            _file: &FileNode,
            _options: &ScanOptions,
            _expire_at: i64,
        ) -> Result<Scanned, ScanError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Scanned::default())
        }
    }

    /// Always faults.
    #[derive(Debug)]
    struct FaultyScanner;

    #[async_trait]
    impl FileScanner for FaultyScanner {
        fn name(&self) -> &'static str {
            "ScanFaulty"
        }

        async fn scan(
            &self,
            _data: &[u8],
            _file: &FileNode,
            _options: &ScanOptions,
            _expire_at: i64,
        ) -> Result<Scanned, ScanError> {
            Err(ScanError::fault(self.name(), "synthetic failure"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_distribution_timeout_keeps_collected_children() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        // Binary payload so only the synthetic scanners match it, while
        // the spawned text child matches nothing and recursion stops.
        coordinator.stage_bytes("r1", vec![0u8, 1, 2, 0xff]);

        let yaml = concat!(
            "ScanSpawn:\n- positive:\n    flavors: [\"application/octet-stream\"]\n  priority: 9\n",
            "ScanStall:\n- positive:\n    flavors: [\"application/octet-stream\"]\n  priority: 1\n",
        );
        let mut distributor = distributor(yaml, coordinator.clone());
        distributor.registry_mut().preload(Arc::new(SpawnScanner {
            coordinator: coordinator.clone(),
        }));
        distributor.registry_mut().preload(Arc::new(StallScanner));

        distributor.process_request("r1", EXPIRE_AT).await.unwrap();

        // The root's own event was lost to the distribution timeout, but
        // the child collected before the stall still distributed.
        let events = parsed_events(&coordinator, "r1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["file"]["name"], "spawned.txt");
        assert_eq!(events[0]["file"]["depth"], 1);
        assert_eq!(events[0]["file"]["tree"]["parent"], "r1");
    }

    #[tokio::test]
    async fn test_scanner_fault_does_not_poison_request() {
        let coordinator = Arc::new(MemoryCoordinator::new());
        coordinator.stage_bytes("r1", b"payload".to_vec());

        let yaml = concat!(
            "ScanFaulty:\n- positive:\n    flavors: [\"*\"]\n  priority: 9\n",
            "ScanHash:\n- positive:\n    flavors: [\"*\"]\n",
        );
        let mut distributor = distributor(yaml, coordinator.clone());
        distributor.registry_mut().preload(Arc::new(FaultyScanner));

        distributor.process_request("r1", EXPIRE_AT).await.unwrap();

        let events = parsed_events(&coordinator, "r1");
        assert_eq!(events.len(), 1);
        assert!(events[0]["scan"]["ScanFaulty"].is_null());
        assert!(events[0]["scan"]["ScanHash"].is_object());
    }
}
