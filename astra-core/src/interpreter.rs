//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.

use log::info;

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::State;

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    Read { state: State },
    Created { state: State },
    Updated { state: State },
    Replaced { state: State },
    Deleted,
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

impl EffectOutcome {
    /// State left behind by this outcome, if any
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Read { state }
            | EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            EffectOutcome::Deleted | EffectOutcome::Skipped { .. } => None,
        }
    }
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<Result<EffectOutcome, ProviderError>>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            let result = self.execute_effect(effect).await;

            match &result {
                Ok(_) => success_count += 1,
                Err(_) => {
                    failure_count += 1;
                    if !self.config.continue_on_error {
                        outcomes.push(result);
                        break;
                    }
                }
            }

            outcomes.push(result);
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Execute a single Effect
    async fn execute_effect(&self, effect: &Effect) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        info!("{}", effect);

        match effect {
            Effect::Read(resource) => {
                let identifier = resource_identifier(resource);
                let state = self
                    .provider
                    .read(&resource.id, identifier.as_deref())
                    .await?;
                if !state.exists {
                    return Err(ProviderError::new("data source not found")
                        .for_resource(resource.id.clone()));
                }
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let state = self.provider.create(resource).await?;
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                let identifier = from.identifier.as_deref().ok_or_else(|| {
                    ProviderError::new("cannot update a resource without an identifier")
                        .for_resource(id.clone())
                })?;
                let state = self.provider.update(id, identifier, from, to).await?;
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to, .. } => {
                if let Some(identifier) = from.identifier.as_deref() {
                    self.provider.delete(id, identifier).await?;
                }
                let state = self.provider.create(to).await?;
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete { id, identifier } => {
                self.provider.delete(id, identifier).await?;
                Ok(EffectOutcome::Deleted)
            }
        }
    }
}

/// Data sources name their remote object through an `id` attribute
fn resource_identifier(resource: &crate::resource::Resource) -> Option<String> {
    resource.get_str("id").map(str::to_string)
}
