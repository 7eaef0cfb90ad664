mod control;
#[allow(clippy::module_inception)]
mod dispatcher;

pub use dispatcher::Dispatcher;

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::{
        Config, HookflowError,
        runtime::executor_testing::executor,
        store::data::{ExecutionStatus, LogStatus},
    };

    fn workflow(
        nodes: Value,
        edges: Value,
    ) -> Value {
        json!({"id": "wf", "name": "test", "flow": {"nodes": nodes, "edges": edges}})
    }

    fn adult_or_minor() -> Value {
        workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "c", "type": "condition", "config": {"conditions": [{"field": "trigger.age", "operator": "gte", "value": 18}]}},
                {"id": "adult", "type": "variable", "config": {"variables": {"group": "adult"}}},
                {"id": "minor", "type": "variable", "config": {"variables": {"group": "minor"}}},
                {"id": "after", "type": "variable", "config": {"variables": {"seen": "{{outputs.c.branch}}"}}}
            ]),
            json!([
                {"source": "t", "target": "c"},
                {"source": "c", "target": "adult", "sourceHandle": "true"},
                {"source": "c", "target": "minor", "sourceHandle": "false"},
                {"source": "adult", "target": "c", "targetHandle": "condition-end"},
                {"source": "minor", "target": "c", "targetHandle": "condition-end"},
                {"source": "c", "target": "after", "sourceHandle": "done"}
            ]),
        )
    }

    #[tokio::test]
    async fn test_condition_runs_exactly_one_branch() {
        let executor = executor(Config::default(), &[adult_or_minor()]);

        let execution = executor.execute("wf", json!({"age": 20}), None).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let result = execution.result_data;
        assert_eq!(result["c"]["branch"], json!("true"));
        assert_eq!(result["c"]["conditionMet"], json!(true));
        assert_eq!(result["c"]["perConditionResults"][0]["result"], json!(true));
        assert_eq!(result["adult"], json!({"group": "adult"}));
        assert!(result.get("minor").is_none());
        assert_eq!(result["after"], json!({"seen": "true"}));

        let execution = executor.execute("wf", json!({"age": 10}), None).await.unwrap();
        assert_eq!(execution.result_data["c"]["branch"], json!("false"));
        assert!(execution.result_data.get("adult").is_none());
        assert_eq!(execution.result_data["minor"], json!({"group": "minor"}));
    }

    #[tokio::test]
    async fn test_loop_collects_iteration_results() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "l", "type": "loop", "config": {"loopType": "array", "arraySource": "trigger.items"}},
                {"id": "double", "type": "script", "config": {"code": "return loop.item * 2;"}},
                {"id": "after", "type": "variable", "config": {"variables": {"index": "{{loop.index}}"}}}
            ]),
            json!([
                {"source": "t", "target": "l"},
                {"source": "l", "target": "double", "sourceHandle": "loop"},
                {"source": "double", "target": "l", "targetHandle": "loop-end"},
                {"source": "l", "target": "after", "sourceHandle": "done"}
            ]),
        );
        let executor = executor(Config::default(), &[wf]);

        let execution = executor.execute("wf", json!({"items": [1, 2, 3]}), None).await.unwrap();
        assert_eq!(execution.result_data["l"], json!({"items": [2, 4, 6], "count": 3}));
        // loop scope does not leak past the loop
        assert_eq!(execution.result_data["after"], json!({"index": "{{loop.index}}"}));

        let execution = executor.execute("wf", json!({}), None).await.unwrap();
        assert_eq!(execution.result_data["l"], json!({"items": [], "count": 0}));

        let err = executor.execute("wf", json!({"items": "nope"}), None).await.unwrap_err();
        assert_eq!(err.node_id(), Some("l"));
    }

    #[tokio::test]
    async fn test_loop_iterations_are_capped() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "all", "type": "loop", "config": {"loopType": "count", "count": 10, "startIndex": 1}},
                {"id": "few", "type": "loop", "config": {"loopType": "count", "count": "{{trigger.n}}", "maxIterations": 3}}
            ]),
            json!([
                {"source": "t", "target": "all"},
                {"source": "all", "target": "few", "sourceHandle": "done"}
            ]),
        );
        let mut config = Config::default();
        config.engine.max_loop_iterations = 5;
        let executor = executor(config, &[wf]);

        let execution = executor.execute("wf", json!({"n": 50}), None).await.unwrap();
        assert_eq!(execution.result_data["all"], json!({"items": [1, 2, 3, 4, 5], "count": 5}));
        assert_eq!(execution.result_data["few"]["count"], json!(3));
    }

    #[tokio::test]
    async fn test_loop_array_slice_and_cap() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "slice", "type": "loop", "config": {"loopType": "array", "arraySource": "trigger.items", "startIndex": 1, "endIndex": 4}},
                {"id": "capped", "type": "loop", "config": {"loopType": "array", "arraySource": "trigger.items", "maxIterations": 2}},
                {"id": "inverted", "type": "loop", "config": {"loopType": "array", "arraySource": "trigger.items", "startIndex": 3, "endIndex": 1}}
            ]),
            json!([
                {"source": "t", "target": "slice"},
                {"source": "slice", "target": "capped", "sourceHandle": "done"},
                {"source": "capped", "target": "inverted", "sourceHandle": "done"}
            ]),
        );
        let mut config = Config::default();
        config.engine.max_loop_iterations = 4;
        let executor = executor(config, &[wf]);

        let execution = executor.execute("wf", json!({"items": [1, 2, 3, 4, 5]}), None).await.unwrap();
        let result = execution.result_data;
        assert_eq!(result["slice"], json!({"items": [2, 3, 4], "count": 3}));
        assert_eq!(result["capped"], json!({"items": [1, 2], "count": 2}));
        assert_eq!(result["inverted"], json!({"items": [], "count": 0}));

        let long = (0..20).collect::<Vec<_>>();
        let execution = executor.execute("wf", json!({"items": long}), None).await.unwrap();
        assert_eq!(execution.result_data["slice"], json!({"items": [1, 2, 3], "count": 3}));
        assert_eq!(execution.result_data["capped"], json!({"items": [0, 1], "count": 2}));
    }

    #[tokio::test]
    async fn test_loop_global_ceiling_on_array_source() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "l", "type": "loop", "config": {"loopType": "array", "arraySource": "trigger.items", "maxIterations": 100}}
            ]),
            json!([{"source": "t", "target": "l"}]),
        );
        let mut config = Config::default();
        config.engine.max_loop_iterations = 3;
        let executor = executor(config, &[wf]);

        let execution = executor.execute("wf", json!({"items": [9, 8, 7, 6, 5]}), None).await.unwrap();
        assert_eq!(execution.result_data["l"], json!({"items": [9, 8, 7], "count": 3}));
    }

    #[tokio::test]
    async fn test_count_loop_start_index_overflow_fails_node() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "l", "type": "loop", "config": {"loopType": "count", "count": 2, "startIndex": u64::MAX}}
            ]),
            json!([{"source": "t", "target": "l"}]),
        );
        let executor = executor(Config::default(), &[wf]);

        let err = executor.execute("wf", json!({}), None).await.unwrap_err();
        assert_eq!(err.node_id(), Some("l"));
        assert!(err.message().contains("overflows"));
    }

    #[tokio::test]
    async fn test_execution_ceiling_fails_run() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "wait", "type": "delay", "config": {"duration": 500}}
            ]),
            json!([{"source": "t", "target": "wait"}]),
        );
        let mut config = Config::default();
        config.engine.execution_timeout_ms = Some(10);
        let executor = executor(config, &[wf]);

        let err = executor.execute("wf", json!({}), None).await.unwrap_err();
        assert!(matches!(err, HookflowError::Timeout(_)));

        let executions = executor.store().executions_of("wf").unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, ExecutionStatus::Failed);
        assert_eq!(executions[0].error_message.as_deref(), Some("execution exceeded 10ms"));
    }

    #[tokio::test]
    async fn test_finished_runs_are_pruned_to_history_limit() {
        let mut config = Config::default();
        config.engine.history_limit = 2;
        let executor = executor(config, &[adult_or_minor()]);

        let mut last = String::new();
        for age in [1, 2, 3, 40] {
            last = executor.execute("wf", json!({"age": age}), None).await.unwrap().id;
        }
        let executions = executor.store().executions_of("wf").unwrap();
        assert_eq!(executions.len(), 2);
        assert!(executions.iter().any(|e| e.id == last));
        assert!(!executor.store().logs_of(&last).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_try_absorbs_error_into_catch() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "guard", "type": "try"},
                {"id": "boom", "type": "script", "config": {"code": "throw new Error(\"boom\");"}},
                {"id": "handler", "type": "variable", "config": {"variables": {"caught": "{{error.message}}"}}},
                {"id": "after", "type": "variable", "config": {"variables": {"outside": "{{error.message}}"}}}
            ]),
            json!([
                {"source": "t", "target": "guard"},
                {"source": "guard", "target": "boom", "sourceHandle": "try"},
                {"source": "boom", "target": "guard", "targetHandle": "try-end"},
                {"source": "guard", "target": "handler", "sourceHandle": "catch"},
                {"source": "handler", "target": "guard", "targetHandle": "try-end"},
                {"source": "guard", "target": "after", "sourceHandle": "done"}
            ]),
        );
        let executor = executor(Config::default(), &[wf]);

        let execution = executor.execute("wf", json!({}), None).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let result = execution.result_data;
        assert_eq!(result["handler"], json!({"caught": "boom"}));
        assert_eq!(result["guard"]["branch"], json!("catch"));
        assert_eq!(result["guard"]["success"], json!(true));
        assert_eq!(result["guard"]["error"]["message"], json!("boom"));
        assert_eq!(result["guard"]["error"]["nodeId"], json!("boom"));
        assert_eq!(result["after"], json!({"outside": "{{error.message}}"}));

        let logs = executor.store().logs_of(&execution.id).unwrap();
        let boom = logs.iter().find(|l| l.node_id == "boom").unwrap();
        assert_eq!(boom.status, LogStatus::Failed);
        assert_eq!(boom.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_error_inside_catch_propagates() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "guard", "type": "try"},
                {"id": "first", "type": "script", "config": {"code": "throw new Error(\"first\");"}},
                {"id": "second", "type": "script", "config": {"code": "throw new Error(\"second\");"}}
            ]),
            json!([
                {"source": "t", "target": "guard"},
                {"source": "guard", "target": "first", "sourceHandle": "try"},
                {"source": "guard", "target": "second", "sourceHandle": "catch"}
            ]),
        );
        let executor = executor(Config::default(), &[wf]);

        let err = executor.execute("wf", json!({}), None).await.unwrap_err();
        assert_eq!(err.node_id(), Some("second"));

        let executions = executor.store().executions_of("wf").unwrap();
        assert_eq!(executions[0].status, ExecutionStatus::Failed);
        assert_eq!(executions[0].error_message.as_deref(), Some("node 'second' failed: script failed: second"));
    }

    #[tokio::test]
    async fn test_processor_failures_carry_processor_name() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "guard", "type": "try"},
                {"id": "wait", "type": "delay", "config": {"duration": "{{trigger.ms}}"}},
                {"id": "handler", "type": "variable", "config": {"variables": {"caught": "{{error.message}}", "stack": "{{error.stack}}"}}}
            ]),
            json!([
                {"source": "t", "target": "guard"},
                {"source": "guard", "target": "wait", "sourceHandle": "try"},
                {"source": "guard", "target": "handler", "sourceHandle": "catch"}
            ]),
        );
        let executor = executor(Config::default(), &[wf]);

        let execution = executor.execute("wf", json!({"ms": "soon"}), None).await.unwrap();
        let handler = &execution.result_data["handler"];
        assert_eq!(handler["caught"], json!("invalid delay duration \"soon\""));
        assert_eq!(handler["stack"], json!("node 'wait' failed: delay failed: invalid delay duration \"soon\""));

        let logs = executor.store().logs_of(&execution.id).unwrap();
        let wait = logs.iter().find(|l| l.node_id == "wait").unwrap();
        assert_eq!(wait.error_message.as_deref(), Some("invalid delay duration \"soon\""));
    }

    #[tokio::test]
    async fn test_edge_guards() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "a", "type": "variable", "config": {"variables": {"a": 1}}},
                {"id": "b", "type": "variable", "config": {"variables": {"b": 1}}},
                {"id": "c", "type": "variable", "config": {"variables": {"c": 1}}}
            ]),
            json!([
                {"source": "t", "target": "a", "condition": "trigger.go"},
                {"source": "t", "target": "b", "condition": "{{trigger.stop}}"},
                {"source": "t", "target": "c"}
            ]),
        );
        let executor = executor(Config::default(), &[wf]);

        let execution = executor.execute("wf", json!({"go": true, "stop": false}), None).await.unwrap();
        let result = execution.result_data;
        assert!(result.get("a").is_some());
        assert!(result.get("b").is_none());
        assert!(result.get("c").is_some());
    }

    #[tokio::test]
    async fn test_edge_guard_sees_earlier_sibling_writes() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "a", "type": "variable", "config": {"variables": {"flag": true}}},
                {"id": "b", "type": "variable", "config": {"variables": {"b": 1}}}
            ]),
            json!([
                {"source": "t", "target": "a"},
                {"source": "t", "target": "b", "condition": "variables.flag"}
            ]),
        );
        let executor = executor(Config::default(), &[wf]);

        let execution = executor.execute("wf", json!({}), None).await.unwrap();
        assert_eq!(execution.result_data["b"], json!({"b": 1}));
    }

    #[tokio::test]
    async fn test_edge_guard_inside_branch_sees_earlier_sibling_writes() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "c", "type": "condition", "config": {"conditions": []}},
                {"id": "x", "type": "variable", "config": {"variables": {"x": 1}}},
                {"id": "a", "type": "variable", "config": {"variables": {"flag": true}}},
                {"id": "b", "type": "variable", "config": {"variables": {"b": 1}}}
            ]),
            json!([
                {"source": "t", "target": "c"},
                {"source": "c", "target": "x", "sourceHandle": "true"},
                {"source": "x", "target": "a"},
                {"source": "x", "target": "b", "condition": "{{variables.flag}}"},
                {"source": "b", "target": "c", "targetHandle": "condition-end"}
            ]),
        );
        let executor = executor(Config::default(), &[wf]);

        let execution = executor.execute("wf", json!({}), None).await.unwrap();
        assert_eq!(execution.result_data["b"], json!({"b": 1}));
    }

    #[tokio::test]
    async fn test_branch_diamond_runs_join_once() {
        let wf = workflow(
            json!([
                {"id": "t", "type": "trigger"},
                {"id": "c", "type": "condition", "config": {"conditions": []}},
                {"id": "x", "type": "variable", "config": {"variables": {"x": 1}}},
                {"id": "y", "type": "variable", "config": {"variables": {"y": 1}}},
                {"id": "z", "type": "variable", "config": {"variables": {"z": 1}}},
                {"id": "w", "type": "variable", "config": {"variables": {"w": 1}}}
            ]),
            json!([
                {"source": "t", "target": "c"},
                {"source": "c", "target": "x", "sourceHandle": "true"},
                {"source": "x", "target": "y"},
                {"source": "x", "target": "z"},
                {"source": "y", "target": "w"},
                {"source": "z", "target": "w"},
                {"source": "w", "target": "c", "targetHandle": "condition-end"}
            ]),
        );
        let executor = executor(Config::default(), &[wf]);

        let execution = executor.execute("wf", json!({}), None).await.unwrap();
        assert_eq!(execution.result_data["c"]["branch"], json!("true"));
        let logs = executor.store().logs_of(&execution.id).unwrap();
        assert_eq!(logs.iter().filter(|l| l.node_id == "w").count(), 1);
        assert!(logs.iter().all(|l| l.status == LogStatus::Success));
    }

    #[tokio::test]
    async fn test_single_node_runs_in_isolation() {
        let executor = executor(Config::default(), &[adult_or_minor()]);

        let out = executor.execute_single_node("wf", "adult", json!({"age": 3}), None).await.unwrap();
        assert_eq!(out, json!({"input": {"age": 3}, "output": {"group": "adult"}}));
        assert!(executor.store().executions_of("wf").unwrap().is_empty());

        let err = executor.execute_single_node("wf", "ghost", json!({}), None).await.unwrap_err();
        assert!(matches!(err, HookflowError::Definition(_)));
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_workflow() {
        let mut inactive = adult_or_minor();
        inactive["id"] = json!("off");
        inactive["status"] = json!("inactive");
        let executor = executor(Config::default(), &[inactive]);

        assert!(matches!(executor.execute("missing", json!({}), None).await, Err(HookflowError::Definition(_))));
        assert!(matches!(executor.execute("off", json!({}), None).await, Err(HookflowError::Definition(_))));
        assert!(executor.store().executions_of("off").unwrap().is_empty());
    }
}
