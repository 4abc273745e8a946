use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of delivery stages every project carries.
pub const STAGE_COUNT: usize = 6;

/// Per-category ceiling on the summed priority weights a municipality may hold in flight.
pub const STAR_BUDGET_CAP: u8 = 5;

/// Identifier wrapper for submitted projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

/// Identifier wrapper for member municipalities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MunicipalityId(pub String);

/// Identifier wrapper for technical staff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechnicianId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MunicipalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TechnicianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCategory {
    Pavimentacao,
    Edificacao,
    Infraestrutura,
}

impl ProjectCategory {
    pub const fn ordered() -> [Self; 3] {
        [Self::Pavimentacao, Self::Edificacao, Self::Infraestrutura]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pavimentacao => "pavimentacao",
            Self::Edificacao => "edificacao",
            Self::Infraestrutura => "infraestrutura",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pavimentacao => "Pavimentação",
            Self::Edificacao => "Edificação",
            Self::Infraestrutura => "Infraestrutura",
        }
    }
}

impl fmt::Display for ProjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Minima,
    Media,
    Alta,
}

impl Complexity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minima => "minima",
            Self::Media => "media",
            Self::Alta => "alta",
        }
    }
}

/// Star weight (1..=5) a project consumes from its municipality's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PriorityWeight(u8);

impl PriorityWeight {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::PriorityOutOfRange(value))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Simultaneously active projects a municipality may hold at this weight.
    pub const fn concurrency_limit(self) -> u32 {
        match self.0 {
            5 => 1,
            4 => 2,
            3 => 3,
            2 => 4,
            _ => 5,
        }
    }
}

impl TryFrom<u8> for PriorityWeight {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PriorityWeight> for u8 {
    fn from(value: PriorityWeight) -> Self {
        value.0
    }
}

impl fmt::Display for PriorityWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Rascunho,
    Solicitacao,
    Briefing,
    Diagnostico,
    Validacao,
    Execucao,
    Entrega,
    Concluido,
}

impl ProjectStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Rascunho => "rascunho",
            Self::Solicitacao => "solicitacao",
            Self::Briefing => "briefing",
            Self::Diagnostico => "diagnostico",
            Self::Validacao => "validacao",
            Self::Execucao => "execucao",
            Self::Entrega => "entrega",
            Self::Concluido => "concluido",
        }
    }

    /// Counts against the concurrency limit of its priority weight.
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Concluido | Self::Rascunho)
    }

    pub const fn in_technical_queue(self) -> bool {
        matches!(self, Self::Validacao | Self::Execucao)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
}

impl StageStatus {
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed => 2,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The six delivery phases, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    SolicitacaoFormal,
    BriefingTecnico,
    DiagnosticoComplexidade,
    ValidacaoConjunta,
    Execucao,
    EntregaEncerramento,
}

impl StageKind {
    pub const fn ordered() -> [Self; STAGE_COUNT] {
        [
            Self::SolicitacaoFormal,
            Self::BriefingTecnico,
            Self::DiagnosticoComplexidade,
            Self::ValidacaoConjunta,
            Self::Execucao,
            Self::EntregaEncerramento,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SolicitacaoFormal => "Solicitação Formal",
            Self::BriefingTecnico => "Briefing Técnico",
            Self::DiagnosticoComplexidade => "Diagnóstico de Complexidade",
            Self::ValidacaoConjunta => "Validação Conjunta",
            Self::Execucao => "Execução",
            Self::EntregaEncerramento => "Entrega e Encerramento",
        }
    }

    /// Project status reported while this stage is the furthest one underway.
    pub const fn project_status(self) -> ProjectStatus {
        match self {
            Self::SolicitacaoFormal => ProjectStatus::Solicitacao,
            Self::BriefingTecnico => ProjectStatus::Briefing,
            Self::DiagnosticoComplexidade => ProjectStatus::Diagnostico,
            Self::ValidacaoConjunta => ProjectStatus::Validacao,
            Self::Execucao => ProjectStatus::Execucao,
            Self::EntregaEncerramento => ProjectStatus::Entrega,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub kind: StageKind,
    pub name: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Stage {
    pub fn pending(kind: StageKind) -> Self {
        Self {
            kind,
            name: kind.label().to_string(),
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            notes: None,
        }
    }
}

/// Fresh stage track with every phase pending.
pub fn stage_template() -> [Stage; STAGE_COUNT] {
    StageKind::ordered().map(Stage::pending)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Municipality {
    pub id: MunicipalityId,
    pub name: String,
    pub code: String,
    pub contact_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(flatten)]
    pub engagement: EngagementProfile,
    /// Summed priority weights of admitted, not yet concluded projects per category.
    #[serde(default)]
    pub active_stars: BTreeMap<ProjectCategory, u8>,
    pub total_projects: u32,
    pub completed_projects: u32,
    pub created_at: DateTime<Utc>,
}

impl Municipality {
    pub fn stars_in(&self, category: ProjectCategory) -> u8 {
        self.active_stars.get(&category).copied().unwrap_or(0)
    }
}

/// Relationship indicators the regional office keeps per municipality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementProfile {
    /// 0..=100
    pub engagement_score: f64,
    pub meeting_participations: u32,
    /// 0..=10
    pub clarity_score: f64,
    pub financial_regularity: bool,
}

impl Default for EngagementProfile {
    fn default() -> Self {
        Self {
            engagement_score: 0.0,
            meeting_participations: 0,
            clarity_score: 0.0,
            financial_regularity: true,
        }
    }
}

pub const ENGAGEMENT_SCORE_MAX: f64 = 100.0;
pub const CLARITY_SCORE_MAX: f64 = 10.0;

/// Partial engagement edit; absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngagementUpdate {
    #[serde(default)]
    pub engagement_score: Option<f64>,
    #[serde(default)]
    pub meeting_participations: Option<u32>,
    #[serde(default)]
    pub clarity_score: Option<f64>,
    #[serde(default)]
    pub financial_regularity: Option<bool>,
}

impl EngagementUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(score) = self.engagement_score {
            require_bounded("engagement_score", score, ENGAGEMENT_SCORE_MAX)?;
        }
        if let Some(score) = self.clarity_score {
            require_bounded("clarity_score", score, CLARITY_SCORE_MAX)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, profile: &mut EngagementProfile) {
        if let Some(score) = self.engagement_score {
            profile.engagement_score = score;
        }
        if let Some(count) = self.meeting_participations {
            profile.meeting_participations = count;
        }
        if let Some(score) = self.clarity_score {
            profile.clarity_score = score;
        }
        if let Some(regular) = self.financial_regularity {
            profile.financial_regularity = regular;
        }
    }
}

/// Scoring inputs kept together so a change to any of them re-scores the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringInputs {
    pub impact: u8,
    pub urgency: u8,
    pub cost: u8,
    pub complexity: Option<Complexity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub description: String,
    pub category: ProjectCategory,
    pub municipality_id: MunicipalityId,
    pub municipality_name: String,
    pub priority_weight: PriorityWeight,
    pub scoring: ScoringInputs,
    pub ipr_score: f64,
    pub status: ProjectStatus,
    pub progress_percent: f64,
    pub stages: [Stage; STAGE_COUNT],
    #[serde(default)]
    pub assigned_team: Vec<TechnicianId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisory_diagnosis: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technician {
    pub id: TechnicianId,
    pub name: String,
    pub email: String,
    pub specialties: Vec<ProjectCategory>,
    pub workload_hours: u16,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
}

/// Event handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub project_id: Option<ProjectId>,
    pub created_at: DateTime<Utc>,
}

/// Stored notification as its recipient sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxEntry {
    pub id: NotificationId,
    #[serde(flatten)]
    pub notification: Notification,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MunicipalityRegistration {
    pub name: String,
    pub code: String,
    pub contact_email: String,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

impl MunicipalityRegistration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        require_text("code", &self.code)?;
        require_email("contact_email", &self.contact_email)
    }
}

/// Project creation request as received from the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSubmission {
    pub title: String,
    pub description: String,
    pub category: ProjectCategory,
    pub municipality_id: MunicipalityId,
    pub priority_weight: PriorityWeight,
    pub impact: u8,
    pub urgency: u8,
    pub cost: u8,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl ProjectSubmission {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_rating("impact", self.impact)?;
        require_rating("urgency", self.urgency)?;
        require_rating("cost", self.cost)
    }
}

/// Partial edit of a project. Status, progress and priority weight are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub estimated_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub complexity: Option<Complexity>,
    #[serde(default)]
    pub impact: Option<u8>,
    #[serde(default)]
    pub urgency: Option<u8>,
    #[serde(default)]
    pub cost: Option<u8>,
}

impl ProjectUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        for (field, value) in [
            ("impact", self.impact),
            ("urgency", self.urgency),
            ("cost", self.cost),
        ] {
            if let Some(value) = value {
                require_rating(field, value)?;
            }
        }
        Ok(())
    }

    pub fn touches_scoring(&self) -> bool {
        self.complexity.is_some()
            || self.impact.is_some()
            || self.urgency.is_some()
            || self.cost.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechnicianRegistration {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub specialties: Vec<ProjectCategory>,
    #[serde(default = "default_workload_hours")]
    pub workload_hours: u16,
}

fn default_workload_hours() -> u16 {
    40
}

impl TechnicianRegistration {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        require_email("email", &self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("{0} must be an e-mail address")]
    InvalidEmail(&'static str),
    #[error("{field} must be between 1 and 10 (got {value})")]
    RatingOutOfRange { field: &'static str, value: u8 },
    #[error("priority weight must be between 1 and 5 (got {0})")]
    PriorityOutOfRange(u8),
    #[error("{field} must be a number between 0 and {max}")]
    IndicatorOutOfRange { field: &'static str, max: u8 },
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(())
    }
}

fn require_email(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::InvalidEmail(field)),
    }
}

fn require_bounded(field: &'static str, value: f64, max: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::IndicatorOutOfRange {
            field,
            max: max as u8,
        })
    }
}

fn require_rating(field: &'static str, value: u8) -> Result<(), ValidationError> {
    if (1..=10).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::RatingOutOfRange { field, value })
    }
}
