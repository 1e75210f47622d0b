//! Pipeline templates — declarative configuration consumed by
//! the Pipeline Builder. The builder itself has no knowledge of what any
//! `kind` means; it only needs the graph to be acyclic and fully defined.

use crate::error::{Result, SchedulerError};
use crate::model::TaskKind;
use std::collections::{HashMap, HashSet};

/// One task specification inside a `PipelineTemplate`.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub kind: TaskKind,
    pub weight: i32,
    pub payload: serde_json::Value,
    pub max_retries: i32,
    /// Kinds this task depends on, resolved to task-id edges within the
    /// same pipeline instance at build time.
    pub depends_on: Vec<TaskKind>,
}

impl TaskSpec {
    pub fn new(kind: impl Into<TaskKind>) -> Self {
        Self {
            kind: kind.into(),
            weight: 1,
            payload: serde_json::Value::Null,
            max_retries: 3,
            depends_on: Vec::new(),
        }
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn depends_on(mut self, kinds: impl IntoIterator<Item = impl Into<TaskKind>>) -> Self {
        self.depends_on = kinds.into_iter().map(Into::into).collect();
        self
    }
}

/// A named, reusable DAG of task specifications. The
/// illustrative six-task production template is provided as
/// [`PipelineTemplate::pitch_deck_review`].
#[derive(Debug, Clone)]
pub struct PipelineTemplate {
    pub name: String,
    pub tasks: Vec<TaskSpec>,
}

impl PipelineTemplate {
    pub fn new(name: impl Into<String>, tasks: Vec<TaskSpec>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }

    /// The production pitch-deck review template:
    /// `visual_analysis` and `slide_feedback` run with no dependencies;
    /// `extractions_and_template` depends on `visual_analysis`; the three
    /// specialized tasks each depend on `extractions_and_template` and are
    /// independent of one another.
    pub fn pitch_deck_review() -> Self {
        Self::new(
            "pitch_deck_review",
            vec![
                TaskSpec::new("visual_analysis"),
                TaskSpec::new("slide_feedback"),
                TaskSpec::new("extractions_and_template").depends_on(["visual_analysis"]),
                TaskSpec::new("specialized_clinical").depends_on(["extractions_and_template"]),
                TaskSpec::new("specialized_regulatory").depends_on(["extractions_and_template"]),
                TaskSpec::new("specialized_science").depends_on(["extractions_and_template"]),
            ],
        )
    }

    /// Validates that every `depends_on` kind is defined in this template
    /// and that the resulting graph is acyclic, without assigning any task
    /// ids. Backends call this before opening a transaction so a bad
    /// template is rejected with no partial writes.
    pub fn validate(&self) -> Result<()> {
        let defined: HashSet<&str> = self.tasks.iter().map(|t| t.kind.as_str()).collect();
        for spec in &self.tasks {
            for upstream in &spec.depends_on {
                if !defined.contains(upstream.as_str()) {
                    return Err(SchedulerError::UndefinedUpstream {
                        kind: upstream.clone(),
                    });
                }
            }
        }

        if has_cycle(&self.tasks) {
            return Err(SchedulerError::CycleDetected);
        }

        Ok(())
    }
}

fn has_cycle(tasks: &[TaskSpec]) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let index_of: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.kind.as_str(), i))
        .collect();
    let mut marks = vec![Mark::Unvisited; tasks.len()];

    fn visit(
        i: usize,
        tasks: &[TaskSpec],
        index_of: &HashMap<&str, usize>,
        marks: &mut [Mark],
    ) -> bool {
        match marks[i] {
            Mark::Done => return false,
            Mark::InProgress => return true,
            Mark::Unvisited => {}
        }
        marks[i] = Mark::InProgress;
        for upstream in &tasks[i].depends_on {
            if let Some(&j) = index_of.get(upstream.as_str()) {
                if visit(j, tasks, index_of, marks) {
                    return true;
                }
            }
        }
        marks[i] = Mark::Done;
        false
    }

    for i in 0..tasks.len() {
        if visit(i, tasks, &index_of, &mut marks) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_template_validates() {
        PipelineTemplate::pitch_deck_review().validate().unwrap();
    }

    #[test]
    fn rejects_undefined_upstream() {
        let template = PipelineTemplate::new(
            "bad",
            vec![TaskSpec::new("b").depends_on(["a_typo"])],
        );
        assert!(matches!(
            template.validate(),
            Err(SchedulerError::UndefinedUpstream { .. })
        ));
    }

    #[test]
    fn rejects_direct_cycle() {
        let template = PipelineTemplate::new(
            "cycle",
            vec![
                TaskSpec::new("a").depends_on(["b"]),
                TaskSpec::new("b").depends_on(["a"]),
            ],
        );
        assert!(matches!(
            template.validate(),
            Err(SchedulerError::CycleDetected)
        ));
    }

    #[test]
    fn rejects_self_cycle() {
        let template = PipelineTemplate::new("self", vec![TaskSpec::new("a").depends_on(["a"])]);
        assert!(matches!(
            template.validate(),
            Err(SchedulerError::CycleDetected)
        ));
    }

    #[test]
    fn diamond_fan_out_with_no_join_validates() {
        // Matches S4: A -> {B, C}.
        let template = PipelineTemplate::new(
            "diamond",
            vec![
                TaskSpec::new("a"),
                TaskSpec::new("b").depends_on(["a"]),
                TaskSpec::new("c").depends_on(["a"]),
            ],
        );
        template.validate().unwrap();
    }
}
