//! Workflow step ordering and dependency planning.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::{error::ScheduleError, model::StepDefinition};

/// Build a topologically ordered step list for execution.
///
/// Steps whose dependencies are satisfied at the same time keep their
/// declaration order, so a workflow without dependencies runs exactly as
/// declared. Returns an error for duplicate step identifiers, unknown
/// dependencies, or cycles (a self-dependency is a cycle of one step).
pub fn order_steps_for_execution(steps: &[StepDefinition]) -> Result<Vec<&StepDefinition>, ScheduleError> {
    let mut lookup: IndexMap<&str, &StepDefinition> = IndexMap::with_capacity(steps.len());
    for step in steps {
        if lookup.insert(step.id.as_str(), step).is_some() {
            return Err(ScheduleError::DuplicateStep { step: step.id.clone() });
        }
    }

    let mut in_degrees: HashMap<&str, usize> = lookup.keys().map(|step_id| (*step_id, 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for (step_id, step) in &lookup {
        let mut seen_dependencies = HashSet::new();
        for dependency in &step.depends_on {
            let Some((dependency_id, _)) = lookup.get_key_value(dependency.as_str()) else {
                return Err(ScheduleError::UndefinedDependency {
                    step: step_id.to_string(),
                    dependency: dependency.clone(),
                });
            };
            if !seen_dependencies.insert(*dependency_id) {
                continue;
            }
            if let Some(degree) = in_degrees.get_mut(step_id) {
                *degree += 1;
            }
            dependents.entry(*dependency_id).or_default().push(*step_id);
        }
    }

    // FIFO seeded in declaration order keeps ties in declaration order.
    let mut queue: VecDeque<&str> = lookup
        .keys()
        .filter(|step_id| in_degrees.get(*step_id).copied().unwrap_or(0) == 0)
        .copied()
        .collect();

    let mut ordered = Vec::with_capacity(lookup.len());
    while let Some(step_id) = queue.pop_front() {
        ordered.push(step_id);

        for dependent in dependents.get(step_id).into_iter().flatten() {
            if let Some(degree) = in_degrees.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    if ordered.len() != lookup.len() {
        let mut remaining: Vec<String> = in_degrees
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(step_id, _)| step_id.to_string())
            .collect();
        remaining.sort();
        return Err(ScheduleError::Cycle { steps: remaining });
    }

    Ok(ordered.into_iter().filter_map(|step_id| lookup.get(step_id).copied()).collect())
}

/// Returns the execution order as step identifiers.
pub fn execution_order(steps: &[StepDefinition]) -> Result<Vec<String>, ScheduleError> {
    Ok(order_steps_for_execution(steps)?
        .into_iter()
        .map(|step| step.id.clone())
        .collect())
}
