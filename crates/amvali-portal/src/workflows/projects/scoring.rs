use super::domain::{Complexity, ScoringInputs};

/// Divisor applied for a complexity class. Undiagnosed projects use the `media` divisor.
pub const fn complexity_divisor(complexity: Option<Complexity>) -> u8 {
    match complexity {
        Some(Complexity::Minima) => 1,
        Some(Complexity::Alta) => 10,
        Some(Complexity::Media) | None => 5,
    }
}

/// IPR score: `(3 * impact + 2 * urgency + cost) / divisor(complexity)`.
pub fn ipr_score(impact: u8, urgency: u8, cost: u8, complexity: Option<Complexity>) -> f64 {
    let weighted = u32::from(impact) * 3 + u32::from(urgency) * 2 + u32::from(cost);
    f64::from(weighted) / f64::from(complexity_divisor(complexity))
}

impl ScoringInputs {
    pub fn score(&self) -> f64 {
        ipr_score(self.impact, self.urgency, self.cost, self.complexity)
    }
}
