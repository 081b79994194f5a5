use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Build a visit chain from the client's ordered selections.
///
/// A single selection whose variant declares a follow-up gets a second phase
/// after the follow-up's wait. Two or more selections become back-to-back
/// phases with no gap and no follow-ups.
pub fn build_chain(selections: &[(&Service, &ServiceVariant)]) -> Result<Chain, EngineError> {
    if selections.is_empty() {
        return Err(EngineError::InvalidChain("no services selected".into()));
    }

    let mut phases = Vec::with_capacity(selections.len() + 1);
    let mut gaps = Vec::new();

    for (service, variant) in selections {
        if variant.service_id != service.id {
            return Err(EngineError::InvalidChain(format!(
                "variant {} does not belong to service {}",
                variant.id, service.id
            )));
        }
        if !phases.is_empty() {
            gaps.push(0);
        }
        phases.push(ChainPhase {
            service_id: service.id,
            variant_id: variant.id,
            service_name: service.name.clone(),
            duration_minutes: variant.duration_minutes,
            is_follow_up: false,
        });
    }

    if let [(service, variant)] = selections
        && let Some(follow_up) = &variant.follow_up
    {
        gaps.push(follow_up.wait_minutes);
        phases.push(ChainPhase {
            service_id: service.id,
            variant_id: variant.id,
            service_name: follow_up.name.clone(),
            duration_minutes: follow_up.duration_minutes,
            is_follow_up: true,
        });
    }

    validated(Chain { phases, gaps })
}

impl Chain {
    /// Chain with caller-supplied gaps; `gaps.len()` must be one less than `phases.len()`.
    pub fn with_gaps(phases: Vec<ChainPhase>, gaps: Vec<Minute>) -> Result<Chain, EngineError> {
        if phases.is_empty() {
            return Err(EngineError::InvalidChain("chain has no phases".into()));
        }
        if gaps.len() + 1 != phases.len() {
            return Err(EngineError::InvalidChain(format!(
                "{} phases need {} gaps, got {}",
                phases.len(),
                phases.len() - 1,
                gaps.len()
            )));
        }
        validated(Chain { phases, gaps })
    }
}

fn validated(chain: Chain) -> Result<Chain, EngineError> {
    if chain.phases.len() > MAX_CHAIN_PHASES {
        return Err(EngineError::InvalidChain(format!(
            "too many phases: {} (max {MAX_CHAIN_PHASES})",
            chain.phases.len()
        )));
    }
    if let Some(p) = chain.phases.iter().find(|p| p.duration_minutes <= 0) {
        return Err(EngineError::InvalidChain(format!(
            "phase {} has non-positive duration {}",
            p.service_name, p.duration_minutes
        )));
    }
    if chain.gaps.iter().any(|g| *g < 0) {
        return Err(EngineError::InvalidChain("negative wait gap".into()));
    }
    // bounded parts keep the total from overflowing
    let oversized = chain.phases.iter().any(|p| p.duration_minutes > MAX_CHAIN_MINUTES)
        || chain.gaps.iter().any(|g| *g > MAX_CHAIN_MINUTES);
    if oversized || chain.total_minutes() > MAX_CHAIN_MINUTES {
        return Err(EngineError::InvalidChain("chain does not fit in one day".into()));
    }
    Ok(chain)
}
