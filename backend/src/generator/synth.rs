//! Lead synthesis.
//!
//! The driver asks a [`LeadSynthesizer`] for each batch. [`RandomLeads`]
//! produces the synthetic records; tests swap in their own implementation
//! to inject failures.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::GenerationResult;
use crate::models::{GenerationRequest, Lead};

/// Source label written on every synthetic lead.
pub const GENERATED_SOURCE: &str = "Generated";

/// Produces the leads of one batch.
pub trait LeadSynthesizer: Send {
    /// Create `count` leads for `batch`, numbered from `offset + 1`.
    fn synthesize(
        &mut self,
        request: &GenerationRequest,
        batch: u32,
        offset: u32,
        count: u32,
    ) -> GenerationResult<Vec<Lead>>;
}

/// Synthetic leads with sequential names and random phone numbers.
#[derive(Debug)]
pub struct RandomLeads {
    rng: StdRng,
}

impl RandomLeads {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible phone numbers, for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn phone(&mut self) -> String {
        format!(
            "+55 11 9{}-{}",
            self.rng.gen_range(1000..=9999),
            self.rng.gen_range(1000..=9999)
        )
    }
}

impl Default for RandomLeads {
    fn default() -> Self {
        Self::new()
    }
}

impl LeadSynthesizer for RandomLeads {
    fn synthesize(
        &mut self,
        request: &GenerationRequest,
        _batch: u32,
        offset: u32,
        count: u32,
    ) -> GenerationResult<Vec<Lead>> {
        let created_at = Utc::now();
        Ok((1..=count)
            .map(|i| {
                let n = offset + i;
                Lead {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: format!("Lead {}", n),
                    email: format!("lead{}@example.com", n),
                    phone: self.phone(),
                    city: request.city.clone(),
                    country: request.country.clone(),
                    source: GENERATED_SOURCE.to_string(),
                    created_at,
                }
            })
            .collect())
    }
}
