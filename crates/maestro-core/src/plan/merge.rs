//! Merge several plan fragments into one executable plan.
//!
//! Rules:
//! - task sets are unioned; a collision on task number is a conflict;
//! - the file-to-task map is rebuilt from each source plan's file path;
//! - worktree groups are unioned, deduplicated by full identity;
//! - the default agent and quality-control config come from the first
//!   plan that has them;
//! - waves are concatenated in input order;
//! - the combined graph must validate (acyclic, no dangling refs);
//! - a single-plan input is returned unchanged.

use crate::error::OrchestratorError;
use crate::model::Plan;

use super::validate_plan;

/// Merge `plans` into a single plan.
///
/// Callers filter out absent plans before calling; an empty slice is a
/// "plan required" error.
pub fn merge_plans(plans: Vec<Plan>) -> Result<Plan, OrchestratorError> {
    if plans.is_empty() {
        return Err(OrchestratorError::PlanRequired);
    }
    if plans.len() == 1 {
        let plan = plans.into_iter().next().expect("length checked");
        validate_plan(&plan)?;
        return Ok(plan);
    }

    let mut merged = Plan::default();

    for plan in plans {
        let source = plan.file_path.clone();

        for (number, mut task) in plan.tasks {
            if merged.tasks.contains_key(&number) {
                return Err(OrchestratorError::DuplicateTaskNumber { number });
            }
            if task.source_file.is_none() {
                task.source_file = source.clone();
            }
            if let Some(path) = &task.source_file {
                merged.file_to_task.insert(number.clone(), path.clone());
            }
            merged.tasks.insert(number, task);
        }

        merged.waves.extend(plan.waves);

        for group in plan.worktree_groups {
            if !merged.worktree_groups.contains(&group) {
                merged.worktree_groups.push(group);
            }
        }

        if merged.default_agent.is_none() {
            merged.default_agent = plan.default_agent;
        }
        if merged.quality_control.is_none() {
            merged.quality_control = plan.quality_control;
        }
        if merged.file_path.is_none() {
            merged.file_path = source;
        }
    }

    validate_plan(&merged)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Task, Wave, WorktreeGroup};
    use std::path::PathBuf;

    fn plan(path: &str, tasks: Vec<Task>) -> Plan {
        let mut plan = Plan::default();
        plan.file_path = Some(PathBuf::from(path));
        // One wave per task, in order, so intra-plan dependencies respect
        // wave ordering.
        for (i, task) in tasks.into_iter().enumerate() {
            plan.waves.push(Wave {
                name: format!("{path}-wave-{i}"),
                task_numbers: vec![task.number.clone()],
                max_concurrency: 0,
            });
            plan.tasks.insert(task.number.clone(), task);
        }
        plan
    }

    fn task(number: &str, deps: &[&str]) -> Task {
        let mut t = Task::new(number, format!("task-{number}"), "prompt");
        t.depends_on = deps.iter().map(|d| d.to_string()).collect();
        t
    }

    #[test]
    fn no_plans_is_an_error() {
        assert!(matches!(
            merge_plans(vec![]),
            Err(OrchestratorError::PlanRequired)
        ));
    }

    #[test]
    fn single_plan_is_identity() {
        let input = plan("a.toml", vec![task("1", &[])]);
        let merged = merge_plans(vec![input.clone()]).unwrap();
        assert_eq!(merged.tasks.len(), 1);
        assert_eq!(merged.file_path, input.file_path);
        // Single-plan merge does not rebuild the file map.
        assert!(merged.file_to_task.is_empty());
    }

    #[test]
    fn cross_file_dependencies_are_preserved() {
        // Plan A: tasks 1, 2 (2 depends on 1); plan B: task 3 depending on both.
        let a = plan("a.toml", vec![task("1", &[]), task("2", &["1"])]);
        let b = plan("b.toml", vec![task("3", &["1", "2"])]);

        let merged = merge_plans(vec![a, b]).unwrap();
        assert_eq!(merged.tasks.len(), 3);
        assert_eq!(merged.tasks["3"].depends_on, vec!["1", "2"]);
        assert_eq!(
            merged.file_to_task["3"],
            PathBuf::from("b.toml"),
        );
        assert_eq!(
            merged.file_to_task["1"],
            PathBuf::from("a.toml"),
        );
    }

    #[test]
    fn duplicate_task_number_is_a_conflict() {
        let a = plan("a.toml", vec![task("1", &[])]);
        let b = plan("b.toml", vec![task("1", &[])]);
        let err = merge_plans(vec![a, b]).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateTaskNumber { ref number } if number == "1"));
    }

    #[test]
    fn worktree_groups_dedup_by_identity() {
        let mut a = plan("a.toml", vec![task("1", &[])]);
        a.worktree_groups = vec![WorktreeGroup {
            group_id: "g1".to_owned(),
            tasks: vec!["1".to_owned()],
        }];
        let mut b = plan("b.toml", vec![task("2", &[])]);
        b.worktree_groups = vec![
            WorktreeGroup {
                group_id: "g1".to_owned(),
                tasks: vec!["1".to_owned()],
            },
            WorktreeGroup {
                group_id: "g2".to_owned(),
                tasks: vec!["2".to_owned()],
            },
        ];

        let merged = merge_plans(vec![a, b]).unwrap();
        assert_eq!(merged.worktree_groups.len(), 2);
    }

    #[test]
    fn first_nonempty_default_agent_wins() {
        let mut a = plan("a.toml", vec![task("1", &[])]);
        a.default_agent = None;
        let mut b = plan("b.toml", vec![task("2", &[])]);
        b.default_agent = Some("backend-developer".to_owned());
        let mut c = plan("c.toml", vec![task("3", &[])]);
        c.default_agent = Some("rust-pro".to_owned());

        let merged = merge_plans(vec![a, b, c]).unwrap();
        assert_eq!(merged.default_agent.as_deref(), Some("backend-developer"));
    }

    #[test]
    fn merged_cycle_is_rejected() {
        let a = plan("a.toml", vec![task("1", &["2"])]);
        let b = plan("b.toml", vec![task("2", &["1"])]);
        assert!(matches!(
            merge_plans(vec![a, b]),
            Err(OrchestratorError::CycleDetected(_))
        ));
    }

    #[test]
    fn union_counts_add_up() {
        let a = plan("a.toml", vec![task("1", &[]), task("2", &[])]);
        let b = plan("b.toml", vec![task("3", &[])]);
        let merged = merge_plans(vec![a, b]).unwrap();
        assert_eq!(merged.tasks.len(), 3);
        assert_eq!(merged.file_to_task.len(), 3);
        assert_eq!(merged.waves.len(), 3);
    }
}
