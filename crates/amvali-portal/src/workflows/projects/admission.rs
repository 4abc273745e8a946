use serde::Serialize;

use super::domain::{
    Municipality, MunicipalityId, PriorityWeight, Project, ProjectCategory, STAR_BUDGET_CAP,
};

/// Policy rejection raised when a submission would overload its municipality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdmissionRejection {
    #[error(
        "star limit exceeded for {category}: current {current}, requested {requested}, max {cap}"
    )]
    StarLimitExceeded {
        category: ProjectCategory,
        current: u8,
        requested: u8,
        cap: u8,
    },
    #[error(
        "maximum simultaneous projects reached for priority {priority_weight}: {current} active, max {cap}"
    )]
    ConcurrencyLimitExceeded {
        priority_weight: PriorityWeight,
        current: u32,
        cap: u32,
    },
}

/// Stateless gatekeeper for project submissions.
///
/// Both gates are predicates over counts; callers must run [`AdmissionController::admit`] inside
/// the repository's admission transaction so the check and the counter update are atomic.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionController;

impl AdmissionController {
    pub fn new() -> Self {
        Self
    }

    /// Star-budget gate followed by the concurrency gate.
    pub fn evaluate(
        &self,
        category: ProjectCategory,
        weight: PriorityWeight,
        current_stars: u8,
        same_weight_active: u32,
    ) -> Result<(), AdmissionRejection> {
        let requested = weight.get();
        if u16::from(current_stars) + u16::from(requested) > u16::from(STAR_BUDGET_CAP) {
            return Err(AdmissionRejection::StarLimitExceeded {
                category,
                current: current_stars,
                requested,
                cap: STAR_BUDGET_CAP,
            });
        }

        let cap = weight.concurrency_limit();
        if same_weight_active >= cap {
            return Err(AdmissionRejection::ConcurrencyLimitExceeded {
                priority_weight: weight,
                current: same_weight_active,
                cap,
            });
        }

        Ok(())
    }

    /// Runs both gates against a municipality snapshot and reserves its budget on success.
    ///
    /// `existing` must hold the municipality's projects as seen inside the same transaction.
    pub fn admit(
        &self,
        municipality: &mut Municipality,
        existing: &[Project],
        category: ProjectCategory,
        weight: PriorityWeight,
    ) -> Result<(), AdmissionRejection> {
        let current_stars = municipality.stars_in(category);
        let same_weight_active = active_at_weight(existing, &municipality.id, weight);

        self.evaluate(category, weight, current_stars, same_weight_active)?;

        *municipality.active_stars.entry(category).or_insert(0) += weight.get();
        municipality.total_projects += 1;
        Ok(())
    }

    /// Inverse of the admission increment, applied once when a project concludes.
    pub fn release(
        &self,
        municipality: &mut Municipality,
        category: ProjectCategory,
        weight: PriorityWeight,
    ) {
        let stars = municipality.active_stars.entry(category).or_insert(0);
        *stars = stars.saturating_sub(weight.get());
        municipality.completed_projects += 1;
    }
}

fn active_at_weight(
    projects: &[Project],
    municipality: &MunicipalityId,
    weight: PriorityWeight,
) -> u32 {
    let count = projects
        .iter()
        .filter(|project| &project.municipality_id == municipality)
        .filter(|project| project.priority_weight == weight && project.status.is_active())
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}
