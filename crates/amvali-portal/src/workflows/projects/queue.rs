use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use super::domain::{Project, ProjectId, ProjectStatus};

/// Statuses that make up the technical queue.
pub const QUEUE_STATUSES: [ProjectStatus; 2] = [ProjectStatus::Validacao, ProjectStatus::Execucao];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub position: usize,
    /// Placed by an operator override rather than by score.
    pub pinned: bool,
    #[serde(flatten)]
    pub project: Project,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("project {0} is not in the technical queue")]
    ProjectNotQueued(ProjectId),
    #[error("project {0} appears more than once in the requested order")]
    DuplicateEntry(ProjectId),
}

/// Read-side ranking of in-flight projects.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrioritizationQueue;

impl PrioritizationQueue {
    pub fn new() -> Self {
        Self
    }

    /// Filter to queue statuses, rank by score, and apply operator pins on top.
    pub fn rank(&self, projects: Vec<Project>, pins: &[ProjectId]) -> Vec<QueueEntry> {
        let mut queued: Vec<Project> = projects
            .into_iter()
            .filter(|project| project.status.in_technical_queue())
            .collect();
        queued.sort_by(compare_ranked);

        let mut pinned = Vec::new();
        for id in pins {
            if let Some(index) = queued.iter().position(|project| &project.id == id) {
                pinned.push(queued.remove(index));
            }
        }

        let pinned_count = pinned.len();
        pinned
            .into_iter()
            .chain(queued)
            .enumerate()
            .map(|(index, project)| QueueEntry {
                position: index + 1,
                pinned: index < pinned_count,
                project,
            })
            .collect()
    }

    /// Check an operator-supplied order against the current queue membership.
    pub fn validate_override(
        &self,
        queued: &[Project],
        requested: &[ProjectId],
    ) -> Result<Vec<ProjectId>, QueueError> {
        let members: HashSet<&ProjectId> = queued
            .iter()
            .filter(|project| project.status.in_technical_queue())
            .map(|project| &project.id)
            .collect();

        let mut seen = HashSet::new();
        for id in requested {
            if !members.contains(id) {
                return Err(QueueError::ProjectNotQueued(id.clone()));
            }
            if !seen.insert(id) {
                return Err(QueueError::DuplicateEntry(id.clone()));
            }
        }
        Ok(requested.to_vec())
    }
}

/// Score desc, priority weight desc, older first, then id for a total order.
pub fn compare_ranked(a: &Project, b: &Project) -> Ordering {
    b.ipr_score
        .total_cmp(&a.ipr_score)
        .then_with(|| b.priority_weight.cmp(&a.priority_weight))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::projects::domain::ProjectCategory;
    use crate::workflows::projects::tests::common::project_for;
    use chrono::{Duration, Utc};

    fn queued(id: &str, score: f64, weight: u8, age_minutes: i64) -> Project {
        let mut project = project_for("mun-1", ProjectCategory::Edificacao, weight);
        project.id = ProjectId(id.to_string());
        project.ipr_score = score;
        project.status = ProjectStatus::Validacao;
        project.created_at = Utc::now() - Duration::minutes(age_minutes);
        project
    }

    fn ids(entries: &[QueueEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.project.id.0.as_str()).collect()
    }

    #[test]
    fn orders_by_score_then_weight_then_age() {
        let queue = PrioritizationQueue::new();
        let projects = vec![
            queued("low", 3.0, 5, 100),
            queued("young-heavy", 7.6, 4, 1),
            queued("old-heavy", 7.6, 4, 50),
            queued("light", 7.6, 2, 500),
            queued("top", 12.0, 1, 0),
        ];
        let ranked = queue.rank(projects, &[]);
        assert_eq!(
            ids(&ranked),
            vec!["top", "old-heavy", "young-heavy", "light", "low"]
        );
        assert_eq!(ranked[0].position, 1);
        assert!(ranked.iter().all(|entry| !entry.pinned));
    }

    #[test]
    fn excludes_projects_outside_validation_and_execution() {
        let queue = PrioritizationQueue::new();
        let mut briefing = queued("briefing", 99.0, 5, 0);
        briefing.status = ProjectStatus::Briefing;
        let mut done = queued("done", 99.0, 5, 0);
        done.status = ProjectStatus::Concluido;
        let mut executing = queued("executing", 1.0, 1, 0);
        executing.status = ProjectStatus::Execucao;

        let ranked = queue.rank(vec![briefing, done, executing], &[]);
        assert_eq!(ids(&ranked), vec!["executing"]);
    }

    #[test]
    fn identical_keys_order_is_stable_across_input_permutations() {
        let queue = PrioritizationQueue::new();
        let created = Utc::now();
        let mut a = queued("a", 5.0, 3, 0);
        let mut b = queued("b", 5.0, 3, 0);
        a.created_at = created;
        b.created_at = created;

        let forward = queue.rank(vec![a.clone(), b.clone()], &[]);
        let reverse = queue.rank(vec![b, a], &[]);
        assert_eq!(ids(&forward), ids(&reverse));
    }

    #[test]
    fn pins_lead_the_queue_and_unknown_pins_are_ignored() {
        let queue = PrioritizationQueue::new();
        let projects = vec![
            queued("first", 9.0, 3, 0),
            queued("second", 8.0, 3, 0),
            queued("third", 7.0, 3, 0),
        ];
        let pins = vec![
            ProjectId("third".to_string()),
            ProjectId("gone".to_string()),
        ];
        let ranked = queue.rank(projects, &pins);
        assert_eq!(ids(&ranked), vec!["third", "first", "second"]);
        assert!(ranked[0].pinned);
        assert!(!ranked[1].pinned);
    }

    #[test]
    fn override_rejects_non_queued_and_duplicate_ids() {
        let queue = PrioritizationQueue::new();
        let mut briefing = queued("briefing", 1.0, 1, 0);
        briefing.status = ProjectStatus::Briefing;
        let members = vec![queued("a", 1.0, 1, 0), briefing];

        assert_eq!(
            queue.validate_override(&members, &[ProjectId("briefing".to_string())]),
            Err(QueueError::ProjectNotQueued(ProjectId(
                "briefing".to_string()
            )))
        );
        assert_eq!(
            queue.validate_override(
                &members,
                &[ProjectId("a".to_string()), ProjectId("a".to_string())]
            ),
            Err(QueueError::DuplicateEntry(ProjectId("a".to_string())))
        );
        assert!(queue.validate_override(&members, &[]).is_ok());
    }
}
