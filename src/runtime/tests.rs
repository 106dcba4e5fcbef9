//! Runtime Module Tests
//!
//! ## Test Scopes
//! - **Program bundle**: Decoding of variables, blocks and result variables.
//! - **Blocks**: Scalar arithmetic, copy-on-write indexed writes, in-place scaling.
//! - **Execution context**: Typed lookups and resident cell accounting.

#[cfg(test)]
mod tests {
    use crate::cache::manager::CacheManager;
    use crate::cache::matrix::{MatrixBlock, MatrixObject};
    use crate::config::WorkerConfig;
    use crate::error::WorkerError;
    use crate::runtime::context::{Data, DataType, ExecutionContext, ScalarObject};
    use crate::runtime::program::{Operand, ProgramBlock, parse_parfor_body};
    use serde_json::json;
    use tempfile::TempDir;

    fn test_cache(dir: &TempDir) -> CacheManager {
        CacheManager::new(&WorkerConfig::new(
            dir.path().join("scratch"),
            dir.path().join("durable"),
        ))
    }

    fn var(name: &str) -> Operand {
        Operand::Var(name.to_string())
    }

    // ============================================================
    // PROGRAM BUNDLE TESTS
    // ============================================================

    #[test]
    fn test_parse_parfor_body() {
        let source = json!({
            "variables": {
                "R": {"matrix": {"rows": 20, "cols": 2, "fill": 0.0}},
                "X": {"matrix": {"rows": 20, "cols": 2, "file_name": "X_in"}},
                "k": {"scalar": 3.0}
            },
            "blocks": [
                {"op": "indexed_write", "target": "R", "index": {"var": "i"}, "value": {"var": "k"}},
                {"op": "accumulate", "target": "total", "value": {"const": 1.0}}
            ],
            "result_vars": ["R", "total", "R"]
        })
        .to_string();

        let body = parse_parfor_body(&source).unwrap();

        assert_eq!(body.child_blocks.len(), 2);
        assert_eq!(body.result_vars, vec!["R".to_string(), "total".to_string()]);
        assert_eq!(body.ec.len(), 3);
        assert!(body.ec.matrix("R").unwrap().is_resident());
        assert!(body.ec.matrix("X").unwrap().is_empty_status());
        assert_eq!(body.ec.matrix("X").unwrap().file_name(), Some("X_in"));
        assert_eq!(body.ec.scalar("k").unwrap(), ScalarObject::Double(3.0));
    }

    #[test]
    fn test_parse_rejects_unknown_result_variable() {
        let source = json!({
            "variables": {"k": {"scalar": 1.0}},
            "result_vars": ["missing"]
        })
        .to_string();

        let result = parse_parfor_body(&source);

        assert!(matches!(result, Err(WorkerError::Program(_))));
    }

    #[test]
    fn test_parse_rejects_matrix_without_source() {
        let source = json!({
            "variables": {"R": {"matrix": {"rows": 2, "cols": 2}}}
        })
        .to_string();

        assert!(matches!(
            parse_parfor_body(&source),
            Err(WorkerError::Program(_))
        ));
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(matches!(
            parse_parfor_body("not a program"),
            Err(WorkerError::Json(_))
        ));
    }

    // ============================================================
    // BLOCK TESTS
    // ============================================================

    #[tokio::test]
    async fn test_scalar_blocks() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let mut ec = ExecutionContext::new();
        ec.set_scalar("i", ScalarObject::Int(4));

        let blocks = [
            ProgramBlock::Assign {
                target: "y".to_string(),
                value: Operand::Mul(Box::new(var("i")), Box::new(Operand::Const(2.5))),
            },
            ProgramBlock::Accumulate {
                target: "sum".to_string(),
                value: var("y"),
            },
            ProgramBlock::Accumulate {
                target: "sum".to_string(),
                value: Operand::Add(Box::new(var("i")), Box::new(Operand::Const(1.0))),
            },
        ];
        for block in &blocks {
            block.execute(&mut ec, &cache).await.unwrap();
        }

        assert_eq!(ec.scalar("y").unwrap().as_f64(), 10.0);
        assert_eq!(ec.scalar("sum").unwrap().as_f64(), 15.0);
    }

    #[tokio::test]
    async fn test_indexed_write_rederives_matrix() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let mut ec = ExecutionContext::new();
        let mut r = MatrixObject::resident(MatrixBlock::filled(3, 2, 0.0)).with_file_name("R_in");
        r.enable_cleanup(false);
        ec.set("R", Data::Matrix(r));
        ec.set_scalar("i", ScalarObject::Int(1));

        let block = ProgramBlock::IndexedWrite {
            target: "R".to_string(),
            index: var("i"),
            value: Operand::Const(7.0),
        };
        block.execute(&mut ec, &cache).await.unwrap();

        let r = ec.matrix("R").unwrap();
        assert!(r.is_dirty());
        assert!(r.file_name().is_none(), "re-derived values get a new file name on export");
        assert!(r.is_pinned(), "pinning carries over to the derived value");
        let values = r.block().unwrap();
        assert_eq!(values.get(1, 0), Some(7.0));
        assert_eq!(values.get(1, 1), Some(7.0));
        assert_eq!(values.get(0, 0), Some(0.0));
    }

    #[tokio::test]
    async fn test_indexed_write_out_of_bounds_fails() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let mut ec = ExecutionContext::new();
        ec.set("R", Data::Matrix(MatrixObject::resident(MatrixBlock::filled(2, 1, 0.0))));
        ec.set_scalar("i", ScalarObject::Int(5));

        let block = ProgramBlock::IndexedWrite {
            target: "R".to_string(),
            index: var("i"),
            value: Operand::Const(1.0),
        };
        let result = block.execute(&mut ec, &cache).await;

        assert!(matches!(result, Err(WorkerError::Execution(_))));
        assert!(!ec.matrix("R").unwrap().is_dirty());
    }

    #[tokio::test]
    async fn test_scaled_input_exports_to_own_file() {
        // ARRANGE: A matrix loaded from an input file
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let mut ec = ExecutionContext::new();
        ec.set(
            "R",
            Data::Matrix(MatrixObject::resident(MatrixBlock::filled(2, 2, 2.0)).with_file_name("R_in")),
        );
        let block = ProgramBlock::Scale {
            target: "R".to_string(),
            factor: Operand::Const(0.5),
        };

        // ACT
        block.execute(&mut ec, &cache).await.unwrap();
        let r = ec.matrix_mut("R").unwrap();
        assert!(r.is_dirty());
        assert_eq!(r.block().unwrap().get(0, 1), Some(1.0));
        let exported = cache.export("R", r).await.unwrap();

        // ASSERT: Scaled in place, but written under a name of its own
        assert_ne!(exported, "R_in");
        assert_eq!(r.file_name(), Some(exported.as_str()));
        assert!(!dir.path().join("durable").join("R_in").exists());
    }

    #[tokio::test]
    async fn test_unbound_operand_fails() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        let mut ec = ExecutionContext::new();

        let block = ProgramBlock::Assign {
            target: "y".to_string(),
            value: var("nope"),
        };

        assert!(matches!(
            block.execute(&mut ec, &cache).await,
            Err(WorkerError::UnknownVariable(name)) if name == "nope"
        ));
    }

    // ============================================================
    // EXECUTION CONTEXT TESTS
    // ============================================================

    #[test]
    fn test_typed_lookups() {
        let mut ec = ExecutionContext::new();
        ec.set_scalar("k", ScalarObject::Int(2));
        ec.set("M", Data::Matrix(MatrixObject::resident(MatrixBlock::filled(2, 3, 1.0))));

        assert_eq!(ec.get("k").unwrap().data_type(), DataType::Scalar);
        assert_eq!(ec.get("M").unwrap().data_type(), DataType::Matrix);
        assert!(ec.matrix("k").is_err());
        assert!(ec.scalar("M").is_err());
        assert_eq!(ec.resident_cells(), 6);
        assert_eq!(ec.variable_names(), vec!["M".to_string(), "k".to_string()]);
    }
}
