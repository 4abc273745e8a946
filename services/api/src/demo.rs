use crate::infra::{build_portal, PortalService};
use amvali_portal::config::AdvisoryConfig;
use amvali_portal::error::AppError;
use amvali_portal::workflows::projects::{
    Complexity, EngagementUpdate, Municipality, MunicipalityImporter, MunicipalityRegistration,
    PortalServiceError, PriorityWeight, ProjectCategory, ProjectId, ProjectStatus,
    ProjectSubmission, ProjectUpdate, QueueEntry, StageStatus, TechnicianRegistration,
    STAR_BUDGET_CAP,
};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Municipality roster CSV (name,code,contact_email[,contact_phone]) replacing the built-in list.
    #[arg(long)]
    pub(crate) municipalities_csv: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct QueueArgs {
    /// Municipality roster CSV replacing the built-in list.
    #[arg(long)]
    pub(crate) municipalities_csv: Option<PathBuf>,
    /// Print the queue as JSON instead of a table.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SeedSummary {
    pub(crate) municipalities: usize,
    pub(crate) technicians: usize,
    pub(crate) projects: usize,
}

struct SeedProject {
    municipality_code: &'static str,
    title: &'static str,
    description: &'static str,
    category: ProjectCategory,
    priority_weight: u8,
    reached: ProjectStatus,
    complexity: Complexity,
    impact: u8,
    urgency: u8,
    cost: u8,
}

const SEED_MUNICIPALITIES: [(&str, &str, &str); 5] = [
    ("Jaraguá do Sul", "JS", "contato@jaragua.sc.gov.br"),
    ("Guaramirim", "GR", "contato@guaramirim.sc.gov.br"),
    ("Schroeder", "SC", "contato@schroeder.sc.gov.br"),
    ("Corupá", "CR", "contato@corupa.sc.gov.br"),
    ("Massaranduba", "MS", "contato@massaranduba.sc.gov.br"),
];

/// Engagement indicators per municipality code: score, meeting participations.
const SEED_ENGAGEMENT: [(&str, f64, u32); 5] = [
    ("JS", 87.5, 9),
    ("GR", 72.0, 6),
    ("SC", 64.5, 4),
    ("CR", 91.0, 11),
    ("MS", 58.0, 3),
];

const SEED_TECHNICIANS: [(&str, &str, &[ProjectCategory]); 3] = [
    (
        "Carlos Silva - Arquiteto",
        "tecnico1@amvali.org.br",
        &[ProjectCategory::Edificacao, ProjectCategory::Pavimentacao],
    ),
    (
        "Ana Santos - Engenheira Civil",
        "tecnico2@amvali.org.br",
        &[ProjectCategory::Infraestrutura, ProjectCategory::Pavimentacao],
    ),
    (
        "Pedro Costa - Projetista",
        "tecnico3@amvali.org.br",
        &[ProjectCategory::Edificacao],
    ),
];

fn seed_projects() -> [SeedProject; 5] {
    [
        SeedProject {
            municipality_code: "JS",
            title: "Pavimentação Rua das Flores",
            description: "Pavimentação asfáltica da Rua das Flores, trecho de 500m",
            category: ProjectCategory::Pavimentacao,
            priority_weight: 4,
            reached: ProjectStatus::Execucao,
            complexity: Complexity::Media,
            impact: 7,
            urgency: 6,
            cost: 5,
        },
        SeedProject {
            municipality_code: "GR",
            title: "Construção Creche Municipal",
            description: "Projeto executivo para construção de creche com capacidade para 120 crianças",
            category: ProjectCategory::Edificacao,
            priority_weight: 5,
            reached: ProjectStatus::Validacao,
            complexity: Complexity::Alta,
            impact: 9,
            urgency: 8,
            cost: 8,
        },
        SeedProject {
            municipality_code: "SC",
            title: "Rede de Drenagem Bairro Centro",
            description: "Sistema de drenagem pluvial para o bairro Centro",
            category: ProjectCategory::Infraestrutura,
            priority_weight: 3,
            reached: ProjectStatus::Briefing,
            complexity: Complexity::Media,
            impact: 6,
            urgency: 5,
            cost: 6,
        },
        SeedProject {
            municipality_code: "JS",
            title: "Reforma Praça Central",
            description: "Revitalização completa da Praça Central com paisagismo",
            category: ProjectCategory::Edificacao,
            priority_weight: 2,
            reached: ProjectStatus::Diagnostico,
            complexity: Complexity::Minima,
            impact: 5,
            urgency: 3,
            cost: 4,
        },
        SeedProject {
            municipality_code: "CR",
            title: "Ponte sobre Rio Itapocu",
            description: "Projeto estrutural para ponte de 80m sobre o Rio Itapocu",
            category: ProjectCategory::Infraestrutura,
            priority_weight: 5,
            reached: ProjectStatus::Solicitacao,
            complexity: Complexity::Alta,
            impact: 10,
            urgency: 7,
            cost: 9,
        },
    ]
}

/// Populate a fresh portal with the reference municipalities, technicians, and projects.
///
/// Seed projects go through the normal admission gates and stage machine. Projects whose
/// municipality is missing from an imported roster are skipped.
pub(crate) fn seed_portal(
    service: &PortalService,
    municipalities_csv: Option<&Path>,
) -> Result<SeedSummary, AppError> {
    let registrations = match municipalities_csv {
        Some(path) => MunicipalityImporter::from_path(path)?,
        None => SEED_MUNICIPALITIES
            .iter()
            .map(|(name, code, email)| MunicipalityRegistration {
                name: (*name).to_string(),
                code: (*code).to_string(),
                contact_email: (*email).to_string(),
                contact_phone: None,
            })
            .collect(),
    };

    let mut municipalities: Vec<Municipality> = Vec::with_capacity(registrations.len());
    for registration in registrations {
        let mut municipality = service.register_municipality(registration)?;
        if let Some((_, score, meetings)) = SEED_ENGAGEMENT
            .iter()
            .find(|(code, _, _)| *code == municipality.code)
        {
            municipality = service.update_engagement(
                &municipality.id,
                EngagementUpdate {
                    engagement_score: Some(*score),
                    meeting_participations: Some(*meetings),
                    ..EngagementUpdate::default()
                },
            )?;
        }
        municipalities.push(municipality);
    }

    for (name, email, specialties) in SEED_TECHNICIANS {
        service.register_technician(TechnicianRegistration {
            name: name.to_string(),
            email: email.to_string(),
            specialties: specialties.to_vec(),
            workload_hours: 40,
        })?;
    }

    let mut projects = 0;
    for seed in seed_projects() {
        let Some(owner) = municipalities
            .iter()
            .find(|municipality| municipality.code == seed.municipality_code)
        else {
            warn!(
                code = seed.municipality_code,
                title = seed.title,
                "seed project skipped; municipality not in roster"
            );
            continue;
        };

        let project = service.submit(ProjectSubmission {
            title: seed.title.to_string(),
            description: seed.description.to_string(),
            category: seed.category,
            municipality_id: owner.id.clone(),
            priority_weight: PriorityWeight::new(seed.priority_weight)
                .map_err(PortalServiceError::from)?,
            impact: seed.impact,
            urgency: seed.urgency,
            cost: seed.cost,
            location: None,
            scope: None,
            purpose: None,
        })?;
        service.update_project(
            &project.id,
            ProjectUpdate {
                complexity: Some(seed.complexity),
                ..ProjectUpdate::default()
            },
        )?;
        advance_to(service, &project.id, seed.reached)?;
        projects += 1;
    }

    Ok(SeedSummary {
        municipalities: municipalities.len(),
        technicians: SEED_TECHNICIANS.len(),
        projects,
    })
}

/// Complete every stage before the one matching `reached` and start that one.
fn advance_to(
    service: &PortalService,
    id: &ProjectId,
    reached: ProjectStatus,
) -> Result<(), PortalServiceError> {
    let position: i64 = match reached {
        ProjectStatus::Rascunho | ProjectStatus::Solicitacao => 0,
        ProjectStatus::Briefing => 1,
        ProjectStatus::Diagnostico => 2,
        ProjectStatus::Validacao => 3,
        ProjectStatus::Execucao => 4,
        ProjectStatus::Entrega | ProjectStatus::Concluido => 5,
    };
    for index in 0..position {
        service.transition_stage(id, index, StageStatus::Completed)?;
    }
    if reached == ProjectStatus::Concluido {
        service.transition_stage(id, position, StageStatus::Completed)?;
    } else {
        service.transition_stage(id, position, StageStatus::InProgress)?;
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let service = build_portal(AdvisoryConfig::default());
    let summary = seed_portal(&service, args.municipalities_csv.as_deref())?;

    println!("Regional project portal demo");
    println!(
        "- {} municipalities | {} technicians | {} projects admitted",
        summary.municipalities, summary.technicians, summary.projects
    );

    println!("\nStar budget per municipality");
    for municipality in service.municipalities()? {
        let budget: Vec<String> = ProjectCategory::ordered()
            .into_iter()
            .map(|category| {
                format!(
                    "{} {}/{}",
                    category.label(),
                    municipality.stars_in(category),
                    STAR_BUDGET_CAP
                )
            })
            .collect();
        println!(
            "  - {} ({}, engajamento {:.1}): {}",
            municipality.name,
            municipality.code,
            municipality.engagement.engagement_score,
            budget.join(" | ")
        );
    }

    println!("\nProjects");
    for project in service.projects(&Default::default())? {
        println!(
            "  - [{}] {} | {} | peso {} | IPR {:.1} | {:.0}%",
            project.status.label(),
            project.title,
            project.municipality_name,
            project.priority_weight,
            project.ipr_score,
            project.progress_percent
        );
    }

    render_queue(&service.technical_queue()?);

    if let Some(owner) = service
        .municipalities()?
        .into_iter()
        .find(|municipality| municipality.code == "GR")
    {
        println!("\nAdmission check: second weight-5 project for {}", owner.name);
        let attempt = service.submit(ProjectSubmission {
            title: "Ginásio Poliesportivo".to_string(),
            description: "Cobertura e vestiários do ginásio municipal".to_string(),
            category: ProjectCategory::Edificacao,
            municipality_id: owner.id.clone(),
            priority_weight: PriorityWeight::new(5).map_err(PortalServiceError::from)?,
            impact: 6,
            urgency: 4,
            cost: 7,
            location: None,
            scope: None,
            purpose: None,
        });
        match attempt {
            Ok(project) => println!("  admitted {}", project.id),
            Err(PortalServiceError::Admission(rejection)) => println!("  rejected: {rejection}"),
            Err(other) => return Err(other.into()),
        }
    }

    Ok(())
}

pub(crate) fn run_queue(args: QueueArgs) -> Result<(), AppError> {
    let service = build_portal(AdvisoryConfig::default());
    seed_portal(&service, args.municipalities_csv.as_deref())?;
    let queue = service.technical_queue()?;

    if args.json {
        let payload = serde_json::json!({ "queue": queue, "total": queue.len() });
        let rendered =
            serde_json::to_string_pretty(&payload).map_err(std::io::Error::from)?;
        println!("{rendered}");
    } else {
        render_queue(&queue);
    }
    Ok(())
}

fn render_queue(queue: &[QueueEntry]) {
    println!("\nTechnical queue ({} projects)", queue.len());
    if queue.is_empty() {
        println!("  (empty)");
    }
    for entry in queue {
        let pin = if entry.pinned { " [fixado]" } else { "" };
        println!(
            "  {}. {} | {} | IPR {:.1} | peso {}{}",
            entry.position,
            entry.project.title,
            entry.project.status.label(),
            entry.project.ipr_score,
            entry.project.priority_weight,
            pin
        );
    }
}
