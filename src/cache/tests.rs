//! Cache Module Tests
//!
//! ## Test Scopes
//! - **Activation**: Working/cache directory lifecycle and worker prefix suffixing.
//! - **Residency**: Spill and reload, memory pressure, empty status, destruction.
//! - **Export & Cleanup**: Durable file naming, dirty flag handling, pinning.
//! - **Statistics**: Counter accounting and explicit reset.

#[cfg(test)]
mod tests {
    use crate::cache::manager::CacheManager;
    use crate::cache::matrix::{MatrixBlock, MatrixMeta, MatrixObject, Residency};
    use crate::cache::stats::CacheStatisticsSnapshot;
    use crate::config::WorkerConfig;
    use crate::runtime::context::{Data, ExecutionContext};
    use tempfile::TempDir;

    fn test_manager(dir: &TempDir) -> CacheManager {
        let config = WorkerConfig::new(dir.path().join("scratch"), dir.path().join("durable"));
        CacheManager::new(&config)
    }

    async fn active_manager(dir: &TempDir) -> CacheManager {
        let cache = test_manager(dir);
        cache.create_working_directory("proc_1").await.unwrap();
        cache.init_caching().await.unwrap();
        cache
    }

    // ============================================================
    // ACTIVATION TESTS
    // ============================================================

    #[tokio::test]
    async fn test_init_caching_creates_directories() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        assert!(!cache.is_active().await);

        let working = cache.create_working_directory("proc_1").await.unwrap();
        cache.init_caching().await.unwrap();

        assert!(cache.is_active().await);
        assert!(working.exists());
        assert_eq!(working, dir.path().join("scratch").join("proc_1"));
        assert_eq!(cache.cache_dir().await, Some(working.join("cache")));
        assert!(working.join("cache").exists());
    }

    #[tokio::test]
    async fn test_init_caching_requires_working_directory() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);

        assert!(cache.init_caching().await.is_err());
        assert!(!cache.is_active().await);
    }

    #[tokio::test]
    async fn test_worker_suffix_applied_once() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        assert!(!cache.has_worker_suffix().await);

        assert!(cache.apply_worker_suffix(7).await);
        assert_eq!(cache.local_prefix().await, "cache_7");
        assert_eq!(cache.durable_prefix().await, "out_7");

        // A second worker in the same process must not stack suffixes
        assert!(!cache.apply_worker_suffix(8).await);
        assert_eq!(cache.local_prefix().await, "cache_7");
        assert_eq!(cache.durable_prefix().await, "out_7");
    }

    #[tokio::test]
    async fn test_teardown_removes_directories() {
        let dir = TempDir::new().unwrap();
        let cache = active_manager(&dir).await;
        let working = cache.working_dir().await.unwrap();

        cache.cleanup_cache_dir().await.unwrap();
        cache.disable_caching().await;
        cache.cleanup_working_directory().await.unwrap();

        assert!(!cache.is_active().await);
        assert!(!working.exists());
        assert!(cache.working_dir().await.is_none());

        // Idempotent
        cache.cleanup_cache_dir().await.unwrap();
        cache.cleanup_working_directory().await.unwrap();
    }

    // ============================================================
    // RESIDENCY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_spill_and_reload_from_local_file() {
        let dir = TempDir::new().unwrap();
        let cache = active_manager(&dir).await;
        let mut mo = MatrixObject::resident(MatrixBlock::filled(4, 2, 1.5));

        assert!(cache.spill(&mut mo).await.unwrap());
        let spill_path = match mo.residency() {
            Residency::Spilled(path) => path.clone(),
            other => panic!("expected spilled matrix, got {:?}", other),
        };
        assert!(spill_path.exists());
        assert_eq!(mo.resident_cells(), 0);

        let block = cache.acquire_read(&mut mo).await.unwrap();
        assert_eq!(block.get(3, 1), Some(1.5));
        assert!(mo.is_resident());
        assert!(!spill_path.exists());

        let stats = cache.statistics().snapshot();
        assert_eq!(stats.local_file_writes, 1);
        assert_eq!(stats.local_file_hits, 1);
    }

    #[tokio::test]
    async fn test_spill_requires_active_caching() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        let mut mo = MatrixObject::resident(MatrixBlock::filled(2, 2, 0.0));

        assert!(!cache.spill(&mut mo).await.unwrap());
        assert!(mo.is_resident());
    }

    #[tokio::test]
    async fn test_pinned_matrix_survives_memory_pressure() {
        let dir = TempDir::new().unwrap();
        let cache = active_manager(&dir).await;
        let mut ec = ExecutionContext::new();

        let mut result = MatrixObject::resident(MatrixBlock::filled(10, 10, 2.0));
        result.enable_cleanup(false);
        ec.set("R", Data::Matrix(result));
        ec.set("X", Data::Matrix(MatrixObject::resident(MatrixBlock::filled(10, 10, 3.0))));
        ec.set("Y", Data::Matrix(MatrixObject::resident(MatrixBlock::filled(10, 10, 4.0))));

        // ACT: Budget too small for anything
        let spilled = cache.relieve_memory_pressure(&mut ec, 0).await.unwrap();

        // ASSERT: Only the unpinned matrices went to disk
        assert_eq!(spilled, 2);
        let r = ec.matrix_mut("R").unwrap();
        assert!(r.is_resident());
        assert_eq!(cache.acquire_read(r).await.unwrap().get(9, 9), Some(2.0));
        assert!(!ec.matrix("X").unwrap().is_resident());
        assert!(!ec.matrix("Y").unwrap().is_resident());
        assert_eq!(ec.resident_cells(), 100);
    }

    #[tokio::test]
    async fn test_memory_pressure_stops_at_budget() {
        let dir = TempDir::new().unwrap();
        let cache = active_manager(&dir).await;
        let mut ec = ExecutionContext::new();
        ec.set("A", Data::Matrix(MatrixObject::resident(MatrixBlock::filled(5, 5, 1.0))));
        ec.set("B", Data::Matrix(MatrixObject::resident(MatrixBlock::filled(5, 5, 1.0))));

        let spilled = cache.relieve_memory_pressure(&mut ec, 25).await.unwrap();

        assert_eq!(spilled, 1);
        assert_eq!(ec.resident_cells(), 25);
    }

    #[tokio::test]
    async fn test_empty_status_reuses_retained_copy() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        let mut ec = ExecutionContext::new();
        ec.set("R", Data::Matrix(MatrixObject::resident(MatrixBlock::filled(2, 2, 5.0))));

        assert_eq!(cache.mark_matrices_empty(&mut ec), 1);

        let r = ec.matrix_mut("R").unwrap();
        assert!(r.is_empty_status());
        assert_eq!(cache.acquire_read(r).await.unwrap().get(0, 0), Some(5.0));
        assert_eq!(cache.statistics().snapshot().buffer_hits, 1);
        assert_eq!(cache.statistics().snapshot().buffer_writes, 1);
    }

    #[tokio::test]
    async fn test_empty_status_reloads_from_durable_file() {
        let dir = TempDir::new().unwrap();
        let cache = active_manager(&dir).await;
        let mut mo = MatrixObject::resident(MatrixBlock::filled(3, 1, 8.0)).with_file_name("X_in");
        cache.export("X", &mut mo).await.unwrap();

        // Spilled values lose their in-memory copy when emptied
        assert!(cache.spill(&mut mo).await.unwrap());
        assert!(!mo.set_empty_status());

        let block = cache.acquire_read(&mut mo).await.unwrap();
        assert_eq!(block.get(2, 0), Some(8.0));
        assert_eq!(cache.statistics().snapshot().durable_hits, 1);
    }

    #[tokio::test]
    async fn test_lazy_durable_matrix_loads_on_acquire() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        let mut source = MatrixObject::derived(MatrixBlock::filled(2, 3, 4.0), true);
        let input = cache.export("input", &mut source).await.unwrap();

        let mut lazy = MatrixObject::from_durable(input, MatrixMeta { rows: 2, cols: 3 });
        assert!(!lazy.is_resident());

        let block = cache.acquire_read(&mut lazy).await.unwrap();
        assert_eq!(block.meta(), MatrixMeta { rows: 2, cols: 3 });
        assert!(!lazy.is_dirty());
    }

    #[tokio::test]
    async fn test_destroyed_matrix_cannot_be_acquired() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        let mut mo = MatrixObject::resident(MatrixBlock::filled(1, 1, 0.0));
        mo.destroy();

        assert!(cache.acquire_read(&mut mo).await.is_err());
        assert!(!mo.set_empty_status());
        assert!(mo.is_destroyed());
    }

    #[tokio::test]
    async fn test_acquire_modify_marks_dirty() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        let mut mo = MatrixObject::resident(MatrixBlock::filled(2, 2, 1.0));
        assert!(!mo.is_dirty());

        cache.acquire_modify(&mut mo).await.unwrap().scale(3.0);
        cache.release(&mut mo);

        assert!(mo.is_dirty());
        assert_eq!(mo.block().unwrap().get(1, 1), Some(3.0));
    }

    // ============================================================
    // EXPORT & CLEANUP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_export_allocates_file_name_and_clears_dirty() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        cache.apply_worker_suffix(3).await;
        let mut mo = MatrixObject::derived(MatrixBlock::filled(2, 2, 1.0), true);
        assert!(mo.is_dirty());

        let first = cache.export("R", &mut mo).await.unwrap();

        assert_eq!(first, "out_3_R_1");
        assert_eq!(mo.file_name(), Some("out_3_R_1"));
        assert!(!mo.is_dirty());
        assert!(mo.is_exported());
        assert!(dir.path().join("durable").join(&first).exists());

        // Existing file names are kept
        let second = cache.export("R", &mut mo).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(cache.statistics().snapshot().durable_writes, 2);
    }

    #[tokio::test]
    async fn test_cleanup_skips_pinned_values() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);

        let mut pinned = MatrixObject::derived(MatrixBlock::filled(1, 1, 1.0), false);
        let pinned_file = cache.export("R", &mut pinned).await.unwrap();
        let mut unpinned = MatrixObject::derived(MatrixBlock::filled(1, 1, 1.0), true);
        let unpinned_file = cache.export("T", &mut unpinned).await.unwrap();

        assert!(!cache.cleanup_variable(pinned).await.unwrap());
        assert!(cache.cleanup_variable(unpinned).await.unwrap());

        let durable = dir.path().join("durable");
        assert!(durable.join(pinned_file).exists());
        assert!(!durable.join(unpinned_file).exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_input_files() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        let mut writer = MatrixObject::derived(MatrixBlock::filled(1, 1, 1.0), true);
        let file = cache.export("X", &mut writer).await.unwrap();

        let input = MatrixObject::from_durable(file.clone(), MatrixMeta { rows: 1, cols: 1 });
        assert!(cache.cleanup_variable(input).await.unwrap());

        assert!(dir.path().join("durable").join(file).exists());
    }

    #[tokio::test]
    async fn test_export_of_modified_input_allocates_new_file() {
        // ARRANGE: An input file and a value loaded from it
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        cache.apply_worker_suffix(4).await;
        let mut writer = MatrixObject::derived(MatrixBlock::filled(2, 1, 1.0), true);
        let input = cache.export("in", &mut writer).await.unwrap();
        let mut mo = MatrixObject::from_durable(input.clone(), MatrixMeta { rows: 2, cols: 1 });

        // ACT: Modify and export
        cache.acquire_modify(&mut mo).await.unwrap().scale(5.0);
        cache.release(&mut mo);
        let exported = cache.export("R", &mut mo).await.unwrap();

        // ASSERT: Output under a fresh name, input untouched
        assert_ne!(exported, input);
        assert!(exported.starts_with("out_4_R_"));
        assert_eq!(mo.file_name(), Some(exported.as_str()));

        let mut reread = MatrixObject::from_durable(input, MatrixMeta { rows: 2, cols: 1 });
        let block = cache.acquire_read(&mut reread).await.unwrap();
        assert_eq!(block.get(1, 0), Some(1.0));
    }

    #[tokio::test]
    async fn test_preserve_spilled_keeps_values_without_durable_copy() {
        // ARRANGE: A spilled value that exists nowhere else
        let dir = TempDir::new().unwrap();
        let cache = active_manager(&dir).await;
        let mut ec = ExecutionContext::new();
        ec.set(
            "T",
            Data::Matrix(MatrixObject::derived(MatrixBlock::filled(2, 2, 3.0), true)),
        );
        assert!(cache.spill(ec.matrix_mut("T").unwrap()).await.unwrap());

        // ACT: Preserve, then tear the cache directory down
        assert_eq!(cache.preserve_spilled(&mut ec).await.unwrap(), 1);
        cache.cleanup_cache_dir().await.unwrap();
        cache.mark_matrices_empty(&mut ec);

        // ASSERT
        let t = ec.matrix_mut("T").unwrap();
        assert!(t.is_empty_status());
        assert_eq!(cache.acquire_read(t).await.unwrap().get(1, 1), Some(3.0));
    }

    #[tokio::test]
    async fn test_preserve_spilled_skips_current_exports() {
        let dir = TempDir::new().unwrap();
        let cache = active_manager(&dir).await;
        let mut mo = MatrixObject::derived(MatrixBlock::filled(1, 1, 2.0), true);
        cache.export("X", &mut mo).await.unwrap();
        assert!(cache.spill(&mut mo).await.unwrap());
        let mut ec = ExecutionContext::new();
        ec.set("X", Data::Matrix(mo));

        assert_eq!(cache.preserve_spilled(&mut ec).await.unwrap(), 0);
        assert!(matches!(
            ec.matrix("X").unwrap().residency(),
            Residency::Spilled(_)
        ));
    }

    // ============================================================
    // STATISTICS TESTS
    // ============================================================

    #[tokio::test]
    async fn test_statistics_reset() {
        let dir = TempDir::new().unwrap();
        let cache = test_manager(&dir);
        let mut mo = MatrixObject::resident(MatrixBlock::filled(1, 1, 1.0));
        cache.acquire_read(&mut mo).await.unwrap();
        assert_eq!(cache.statistics().snapshot().mem_hits, 1);

        cache.statistics().reset();

        assert_eq!(cache.statistics().snapshot(), CacheStatisticsSnapshot::default());
    }
}
