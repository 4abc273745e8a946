use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::info;

use super::domain::{
    InboxEntry, Municipality, MunicipalityId, Notification, NotificationId, Project, ProjectId,
    Technician, TechnicianId,
};
use super::repository::{
    NotificationError, NotificationInbox, NotificationPublisher, PortalRepository, ProjectFilter,
    RepositoryError, INBOX_PAGE_SIZE,
};

type Shared<T> = Arc<Mutex<T>>;

/// Process-local store. Each municipality and each project sits behind its own mutex so
/// admissions serialize per municipality and stage moves serialize per project.
#[derive(Default, Clone)]
pub struct InMemoryPortalRepository {
    municipalities: Arc<RwLock<HashMap<MunicipalityId, Shared<Municipality>>>>,
    projects: Arc<RwLock<BTreeMap<ProjectId, Shared<Project>>>>,
    technicians: Arc<RwLock<BTreeMap<TechnicianId, Technician>>>,
    pins: Arc<Mutex<Vec<ProjectId>>>,
}

fn poisoned(what: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("{what} lock poisoned"))
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex.lock().map_err(|_| poisoned(what))
}

impl InMemoryPortalRepository {
    fn municipality_slot(&self, id: &MunicipalityId) -> Result<Shared<Municipality>, RepositoryError> {
        let guard = self
            .municipalities
            .read()
            .map_err(|_| poisoned("municipality index"))?;
        guard.get(id).cloned().ok_or(RepositoryError::NotFound)
    }

    fn project_slot(&self, id: &ProjectId) -> Result<Shared<Project>, RepositoryError> {
        let guard = self
            .projects
            .read()
            .map_err(|_| poisoned("project index"))?;
        guard.get(id).cloned().ok_or(RepositoryError::NotFound)
    }

    fn snapshot_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, RepositoryError> {
        let slots: Vec<Shared<Project>> = {
            let guard = self
                .projects
                .read()
                .map_err(|_| poisoned("project index"))?;
            guard.values().cloned().collect()
        };

        let mut matched = Vec::new();
        for slot in slots {
            let project = lock(&slot, "project")?;
            if filter.matches(&project) {
                matched.push(project.clone());
            }
        }
        Ok(matched)
    }
}

impl PortalRepository for InMemoryPortalRepository {
    fn insert_municipality(
        &self,
        municipality: Municipality,
    ) -> Result<Municipality, RepositoryError> {
        let mut guard = self
            .municipalities
            .write()
            .map_err(|_| poisoned("municipality index"))?;
        if guard.contains_key(&municipality.id) {
            return Err(RepositoryError::Conflict);
        }
        for slot in guard.values() {
            if lock(slot, "municipality")?
                .code
                .eq_ignore_ascii_case(&municipality.code)
            {
                return Err(RepositoryError::Conflict);
            }
        }
        guard.insert(
            municipality.id.clone(),
            Arc::new(Mutex::new(municipality.clone())),
        );
        Ok(municipality)
    }

    fn municipality(&self, id: &MunicipalityId) -> Result<Option<Municipality>, RepositoryError> {
        match self.municipality_slot(id) {
            Ok(slot) => Ok(Some(lock(&slot, "municipality")?.clone())),
            Err(RepositoryError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn municipalities(&self) -> Result<Vec<Municipality>, RepositoryError> {
        let slots: Vec<Shared<Municipality>> = {
            let guard = self
                .municipalities
                .read()
                .map_err(|_| poisoned("municipality index"))?;
            guard.values().cloned().collect()
        };
        let mut all = Vec::with_capacity(slots.len());
        for slot in slots {
            all.push(lock(&slot, "municipality")?.clone());
        }
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    fn admit_project<E, F>(&self, municipality_id: &MunicipalityId, admit: F) -> Result<Project, E>
    where
        F: FnOnce(&mut Municipality, &[Project]) -> Result<Project, E>,
        E: From<RepositoryError>,
    {
        let slot = self.municipality_slot(municipality_id)?;
        let mut committed = lock(&slot, "municipality")?;

        let filter = ProjectFilter {
            statuses: Vec::new(),
            municipality_id: Some(municipality_id.clone()),
        };
        let existing = self.snapshot_projects(&filter)?;

        let mut draft = committed.clone();
        let project = admit(&mut draft, &existing)?;

        {
            let mut projects = self
                .projects
                .write()
                .map_err(|_| poisoned("project index"))?;
            if projects.contains_key(&project.id) {
                return Err(RepositoryError::Conflict.into());
            }
            projects.insert(project.id.clone(), Arc::new(Mutex::new(project.clone())));
        }
        *committed = draft;

        Ok(project)
    }

    fn update_municipality<F>(
        &self,
        id: &MunicipalityId,
        update: F,
    ) -> Result<Municipality, RepositoryError>
    where
        F: FnOnce(&mut Municipality),
    {
        let slot = self.municipality_slot(id)?;
        let mut guard = lock(&slot, "municipality")?;
        update(&mut guard);
        Ok(guard.clone())
    }

    fn project(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        match self.project_slot(id) {
            Ok(slot) => Ok(Some(lock(&slot, "project")?.clone())),
            Err(RepositoryError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, RepositoryError> {
        self.snapshot_projects(filter)
    }

    fn update_project<T, E, F>(&self, id: &ProjectId, apply: F) -> Result<(Project, T), E>
    where
        F: FnOnce(&mut Project) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let slot = self.project_slot(id)?;
        let mut guard = lock(&slot, "project")?;
        let mut draft = guard.clone();
        let outcome = apply(&mut draft)?;
        *guard = draft.clone();
        Ok((draft, outcome))
    }

    fn update_project_with_owner<T, E, F>(
        &self,
        id: &ProjectId,
        apply: F,
    ) -> Result<(Project, Municipality, T), E>
    where
        F: FnOnce(&mut Project, &mut Municipality) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let project_slot = self.project_slot(id)?;
        // ownership never changes after admission
        let owner = lock(&project_slot, "project")?.municipality_id.clone();
        let municipality_slot = self.municipality_slot(&owner)?;

        let mut municipality = lock(&municipality_slot, "municipality")?;
        let mut project = lock(&project_slot, "project")?;

        let mut project_draft = project.clone();
        let mut municipality_draft = municipality.clone();
        let outcome = apply(&mut project_draft, &mut municipality_draft)?;

        *project = project_draft.clone();
        *municipality = municipality_draft.clone();
        Ok((project_draft, municipality_draft, outcome))
    }

    fn queue_pins(&self) -> Result<Vec<ProjectId>, RepositoryError> {
        Ok(lock(&self.pins, "queue pins")?.clone())
    }

    fn set_queue_pins(&self, pins: Vec<ProjectId>) -> Result<(), RepositoryError> {
        *lock(&self.pins, "queue pins")? = pins;
        Ok(())
    }

    fn insert_technician(&self, technician: Technician) -> Result<Technician, RepositoryError> {
        let mut guard = self
            .technicians
            .write()
            .map_err(|_| poisoned("technician index"))?;
        if guard.contains_key(&technician.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(technician.id.clone(), technician.clone());
        Ok(technician)
    }

    fn technician(&self, id: &TechnicianId) -> Result<Option<Technician>, RepositoryError> {
        let guard = self
            .technicians
            .read()
            .map_err(|_| poisoned("technician index"))?;
        Ok(guard.get(id).cloned())
    }

    fn technicians(&self) -> Result<Vec<Technician>, RepositoryError> {
        let guard = self
            .technicians
            .read()
            .map_err(|_| poisoned("technician index"))?;
        Ok(guard.values().cloned().collect())
    }
}

/// Process-local notification store; publishing records an unread entry and logs it.
#[derive(Default)]
pub struct InMemoryNotificationOutbox {
    entries: Mutex<Vec<InboxEntry>>,
    sequence: AtomicU64,
}

impl InMemoryNotificationOutbox {
    fn entries(&self) -> Result<MutexGuard<'_, Vec<InboxEntry>>, NotificationError> {
        self.entries
            .lock()
            .map_err(|_| NotificationError::Transport("outbox lock poisoned".to_string()))
    }
}

impl NotificationPublisher for InMemoryNotificationOutbox {
    fn publish(&self, notification: Notification) -> Result<(), NotificationError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = NotificationId(format!("ntf-{sequence:06}"));
        info!(
            notification_id = %id,
            recipient = %notification.recipient_id,
            title = %notification.title,
            "notification queued"
        );
        self.entries()?.push(InboxEntry {
            id,
            notification,
            read: false,
        });
        Ok(())
    }
}

impl NotificationInbox for InMemoryNotificationOutbox {
    fn notifications_for(&self, recipient_id: &str) -> Result<Vec<InboxEntry>, NotificationError> {
        let entries = self.entries()?;
        // entries are appended in publish order
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| entry.notification.recipient_id == recipient_id)
            .take(INBOX_PAGE_SIZE)
            .cloned()
            .collect())
    }

    fn mark_read(&self, id: &NotificationId) -> Result<InboxEntry, NotificationError> {
        let mut entries = self.entries()?;
        let entry = entries
            .iter_mut()
            .find(|entry| &entry.id == id)
            .ok_or_else(|| NotificationError::NotFound(id.clone()))?;
        entry.read = true;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::projects::domain::{NotificationKind, ProjectCategory};
    use crate::workflows::projects::tests::common::{municipality, project_for};

    #[test]
    fn failed_admission_writes_nothing() {
        let repository = InMemoryPortalRepository::default();
        repository
            .insert_municipality(municipality("mun-1"))
            .expect("insert");

        let result: Result<Project, RepositoryError> =
            repository.admit_project(&MunicipalityId("mun-1".to_string()), |municipality, _| {
                municipality
                    .active_stars
                    .insert(ProjectCategory::Pavimentacao, 4);
                Err(RepositoryError::Unavailable("simulated fault".to_string()))
            });
        assert!(result.is_err());

        let stored = repository
            .municipality(&MunicipalityId("mun-1".to_string()))
            .expect("read")
            .expect("present");
        assert_eq!(stored.stars_in(ProjectCategory::Pavimentacao), 0);
        assert!(repository
            .projects(&ProjectFilter::default())
            .expect("read")
            .is_empty());
    }

    #[test]
    fn admission_sees_only_its_municipality_projects() {
        let repository = InMemoryPortalRepository::default();
        repository
            .insert_municipality(municipality("mun-1"))
            .expect("insert");
        repository
            .insert_municipality(municipality("mun-2"))
            .expect("insert");

        let first = project_for("mun-2", ProjectCategory::Edificacao, 2);
        let _: Project = repository
            .admit_project::<RepositoryError, _>(&MunicipalityId("mun-2".to_string()), |_, _| {
                Ok(first.clone())
            })
            .expect("admitted");

        let mut seen = usize::MAX;
        let second = project_for("mun-1", ProjectCategory::Edificacao, 2);
        repository
            .admit_project::<RepositoryError, _>(
                &MunicipalityId("mun-1".to_string()),
                |_, existing| {
                    seen = existing.len();
                    Ok(second.clone())
                },
            )
            .expect("admitted");
        assert_eq!(seen, 0);
    }

    #[test]
    fn update_project_discards_failed_edits() {
        let repository = InMemoryPortalRepository::default();
        repository
            .insert_municipality(municipality("mun-1"))
            .expect("insert");
        let project = project_for("mun-1", ProjectCategory::Edificacao, 1);
        let id = project.id.clone();
        repository
            .admit_project::<RepositoryError, _>(&project.municipality_id.clone(), |_, _| {
                Ok(project)
            })
            .expect("admitted");

        let result: Result<(Project, ()), RepositoryError> =
            repository.update_project(&id, |project| {
                project.title = "changed".to_string();
                Err(RepositoryError::Conflict)
            });
        assert!(result.is_err());
        let stored = repository.project(&id).expect("read").expect("present");
        assert_ne!(stored.title, "changed");
    }

    #[test]
    fn owner_update_commits_both_records_or_neither() {
        let repository = InMemoryPortalRepository::default();
        repository
            .insert_municipality(municipality("mun-1"))
            .expect("insert");
        let project = project_for("mun-1", ProjectCategory::Pavimentacao, 2);
        let id = project.id.clone();
        repository
            .admit_project::<RepositoryError, _>(&project.municipality_id.clone(), |_, _| {
                Ok(project)
            })
            .expect("admitted");

        let failed: Result<(Project, Municipality, ()), RepositoryError> = repository
            .update_project_with_owner(&id, |project, municipality| {
                project.title = "changed".to_string();
                municipality.completed_projects += 1;
                Err(RepositoryError::Unavailable("commit lost".to_string()))
            });
        assert!(failed.is_err());
        let stored = repository.project(&id).expect("read").expect("present");
        assert_ne!(stored.title, "changed");
        let owner = repository
            .municipality(&MunicipalityId("mun-1".to_string()))
            .expect("read")
            .expect("present");
        assert_eq!(owner.completed_projects, 0);

        let (project, owner, ()) = repository
            .update_project_with_owner::<(), RepositoryError, _>(&id, |project, municipality| {
                project.title = "changed".to_string();
                municipality.completed_projects += 1;
                Ok(())
            })
            .expect("committed");
        assert_eq!(project.title, "changed");
        assert_eq!(owner.completed_projects, 1);
        assert_eq!(
            repository
                .municipality(&MunicipalityId("mun-1".to_string()))
                .expect("read")
                .expect("present")
                .completed_projects,
            1
        );
    }

    #[test]
    fn municipality_codes_conflict_ignoring_case() {
        let repository = InMemoryPortalRepository::default();
        repository
            .insert_municipality(municipality("mun-1"))
            .expect("insert");
        let mut clash = municipality("mun-2");
        clash.code = "mun-1".to_string();
        assert_eq!(
            repository.insert_municipality(clash),
            Err(RepositoryError::Conflict)
        );
        assert_eq!(repository.municipalities().expect("read").len(), 1);
    }

    fn notice(recipient: &str, title: &str) -> Notification {
        Notification {
            recipient_id: recipient.to_string(),
            title: title.to_string(),
            message: format!("{title} atualizada"),
            kind: NotificationKind::Info,
            project_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn outbox_lists_newest_first_per_recipient_and_marks_read() {
        let outbox = InMemoryNotificationOutbox::default();
        outbox.publish(notice("mun-1", "Etapa 1")).expect("published");
        outbox.publish(notice("mun-2", "Etapa 1")).expect("published");
        outbox.publish(notice("mun-1", "Etapa 2")).expect("published");

        let inbox = outbox.notifications_for("mun-1").expect("listed");
        let titles: Vec<&str> = inbox
            .iter()
            .map(|entry| entry.notification.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Etapa 2", "Etapa 1"]);
        assert!(inbox.iter().all(|entry| !entry.read));

        let marked = outbox.mark_read(&inbox[1].id).expect("marked");
        assert!(marked.read);
        let inbox = outbox.notifications_for("mun-1").expect("listed");
        assert!(!inbox[0].read);
        assert!(inbox[1].read);
        assert!(outbox
            .notifications_for("mun-2")
            .expect("listed")
            .iter()
            .all(|entry| !entry.read));

        let missing = NotificationId("ntf-999999".to_string());
        assert_eq!(
            outbox.mark_read(&missing),
            Err(NotificationError::NotFound(missing.clone()))
        );
    }

    #[test]
    fn outbox_listing_is_capped() {
        let outbox = InMemoryNotificationOutbox::default();
        for index in 0..(INBOX_PAGE_SIZE + 5) {
            outbox
                .publish(notice("mun-1", &format!("Etapa {index}")))
                .expect("published");
        }
        let inbox = outbox.notifications_for("mun-1").expect("listed");
        assert_eq!(inbox.len(), INBOX_PAGE_SIZE);
        assert_eq!(
            inbox[0].notification.title,
            format!("Etapa {}", INBOX_PAGE_SIZE + 4)
        );
    }

    #[test]
    fn missing_records_read_as_none() {
        let repository = InMemoryPortalRepository::default();
        assert!(repository
            .project(&ProjectId("missing".to_string()))
            .expect("read")
            .is_none());
        assert!(repository
            .municipality(&MunicipalityId("missing".to_string()))
            .expect("read")
            .is_none());
    }
}
