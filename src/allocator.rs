//! Splits a billing amount across equipment ranks.
//!
//! Every device rank gets a random share of the amount and buys whole devices at its unit cost;
//! whatever is left over (unspent rank budget plus the consultation share) becomes consultation
//! time, reported as rank 0. Randomness comes from a [`ShareSource`] so runs can be replayed.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::GenerationError;
use crate::locale::{round2, HOURLY_RATE};
use crate::model::{EquipmentRecord, OrganizationKind, RankAllocationRecord, RecordId, CONSULTATION_RANK};

pub trait ShareSource {
    fn draw(&mut self, low: f64, high: f64) -> f64;
}

pub struct RngShares<R> {
    rng: R,
}

impl RngShares<StdRng> {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> ShareSource for RngShares<R> {
    fn draw(&mut self, low: f64, high: f64) -> f64 {
        if high > low {
            self.rng.gen_range(low..high)
        } else {
            low
        }
    }
}

/// Replays a fixed sequence of shares, cycling when exhausted. Values are returned as given,
/// even outside the requested range.
#[derive(Clone, Debug, Default)]
pub struct FixedShares {
    values: Vec<f64>,
    next: usize,
}

impl FixedShares {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, next: 0 }
    }
}

impl ShareSource for FixedShares {
    fn draw(&mut self, low: f64, _high: f64) -> f64 {
        if self.values.is_empty() {
            return low;
        }
        let v = self.values[self.next % self.values.len()];
        self.next += 1;
        v
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankTariff {
    pub rank: u8,
    pub unit_cost: f64,
    pub share_range: (f64, f64),
}

/// Equipment that cannot take its rank's budget is recorded here instead of failing.
#[derive(Clone, Debug, PartialEq)]
pub enum Shortfall {
    EmptyPool { rank: u8 },
    BelowUnitCost { rank: u8, budget: f64 },
    PoolExhausted { rank: u8, requested: u64, available: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RankAllocation {
    pub tariff: RankTariff,
    pub budget: f64,
    pub units: u32,
    pub selected: Vec<EquipmentRecord>,
}

impl RankAllocation {
    pub fn spent(&self) -> f64 {
        f64::from(self.units) * self.tariff.unit_cost
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Consultation {
    /// Budget left after buying devices, in hryvnias.
    pub budget: f64,
    pub work_time: f64,
    pub device_count: u32,
    pub equipment: Vec<EquipmentRecord>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AllocationPlan {
    pub kind: OrganizationKind,
    pub total: f64,
    pub consultation_share: f64,
    pub ranks: Vec<RankAllocation>,
    pub consultation: Consultation,
    pub shortfalls: Vec<Shortfall>,
}

impl AllocationPlan {
    pub fn is_overcommitted(&self) -> bool {
        self.consultation_share < 0.0
    }

    pub fn into_records(self, period_id: RecordId) -> Vec<RankAllocationRecord> {
        let mut out: Vec<RankAllocationRecord> = self
            .ranks
            .iter()
            .map(|r| RankAllocationRecord::new(period_id, r.tariff.rank, &r.selected, r.units, 0.0))
            .collect();
        out.push(RankAllocationRecord::new(
            period_id,
            CONSULTATION_RANK,
            &self.consultation.equipment,
            self.consultation.device_count,
            self.consultation.work_time,
        ));
        out
    }
}

pub const TYPE_A_UNIT_COST: f64 = 1000.0;

/// Upper bound on devices bought per rank. Amounts that would buy more are rejected.
pub const MAX_UNITS_PER_RANK: u64 = 100_000;

pub fn tariffs(kind: OrganizationKind) -> [RankTariff; 2] {
    let [first, second] = kind.device_ranks();
    let (costs, ranges) = match kind {
        OrganizationKind::TypeA => ([TYPE_A_UNIT_COST; 2], [(0.10, 0.40), (0.40, 0.60)]),
        OrganizationKind::TypeB => ([1000.0, 500.0], [(0.6, 0.7), (0.15, 0.2)]),
    };
    [
        RankTariff {
            rank: first,
            unit_cost: costs[0],
            share_range: ranges[0],
        },
        RankTariff {
            rank: second,
            unit_cost: costs[1],
            share_range: ranges[1],
        },
    ]
}

fn affordable_units(budget: f64, unit_cost: f64) -> u64 {
    if unit_cost <= 0.0 || budget <= 0.0 {
        return 0;
    }
    (budget / unit_cost).floor() as u64
}

pub fn allocate(
    kind: OrganizationKind,
    total: f64,
    pools: &BTreeMap<u8, Vec<EquipmentRecord>>,
    shares: &mut dyn ShareSource,
) -> Result<AllocationPlan, GenerationError> {
    if !total.is_finite() {
        return Err(GenerationError::InvalidAmount(total.to_string()));
    }
    let tariffs = tariffs(kind);
    let drawn: Vec<f64> = tariffs
        .iter()
        .map(|t| shares.draw(t.share_range.0, t.share_range.1))
        .collect();
    let consultation_share = 1.0 - drawn.iter().sum::<f64>();
    if consultation_share < 0.0 {
        tracing::warn!(
            ?kind,
            consultation_share,
            "rank shares exceed the whole amount, consultation budget is negative"
        );
    }

    let empty = Vec::new();
    let mut shortfalls = Vec::new();
    let mut ranks = Vec::with_capacity(tariffs.len());
    for (tariff, share) in tariffs.iter().zip(&drawn) {
        let pool = pools.get(&tariff.rank).unwrap_or(&empty);
        let budget = total * share;
        let requested = affordable_units(budget, tariff.unit_cost);
        if requested > MAX_UNITS_PER_RANK {
            tracing::warn!(rank = tariff.rank, requested, "amount buys more devices than allowed");
            return Err(GenerationError::InvalidAmount(total.to_string()));
        }
        if requested == 0 {
            shortfalls.push(Shortfall::BelowUnitCost {
                rank: tariff.rank,
                budget,
            });
        }

        let selected: Vec<EquipmentRecord> = if pool.is_empty() {
            if requested > 0 {
                shortfalls.push(Shortfall::EmptyPool { rank: tariff.rank });
            }
            Vec::new()
        } else {
            match kind {
                // Type A repeats the pool to fill the request.
                OrganizationKind::TypeA => pool.iter().cycle().take(requested as usize).cloned().collect(),
                OrganizationKind::TypeB => {
                    if requested > pool.len() as u64 {
                        shortfalls.push(Shortfall::PoolExhausted {
                            rank: tariff.rank,
                            requested,
                            available: pool.len(),
                        });
                    }
                    pool.iter().take(requested as usize).cloned().collect()
                }
            }
        };
        let units = u32::try_from(selected.len()).map_err(|_| GenerationError::InvalidAmount(total.to_string()))?;
        ranks.push(RankAllocation {
            tariff: *tariff,
            budget,
            units,
            selected,
        });
    }

    let remaining = ranks.iter().map(|r| r.budget - r.spent()).sum::<f64>() + total * consultation_share;
    let consultation = match kind {
        OrganizationKind::TypeA => Consultation {
            budget: remaining,
            work_time: round2(remaining / TYPE_A_UNIT_COST),
            device_count: ranks
                .iter()
                .try_fold(0u32, |acc, r| acc.checked_add(r.units))
                .ok_or_else(|| GenerationError::InvalidAmount(total.to_string()))?,
            equipment: ranks.iter().flat_map(|r| r.selected.iter().cloned()).collect(),
        },
        OrganizationKind::TypeB => {
            let hours = (remaining / HOURLY_RATE).floor();
            let minutes = (remaining.rem_euclid(HOURLY_RATE) / HOURLY_RATE * 60.0).round_ties_even();
            let work_time = if remaining > 0.0 { hours + minutes / 60.0 } else { 0.0 };
            let total_minutes = (hours * 60.0 + minutes).max(0.0) as u64;
            // One illustrative device per ten minutes of consultation.
            let device_count = u32::try_from(total_minutes / 10)
                .map_err(|_| GenerationError::InvalidAmount(total.to_string()))?;
            let equipment = tariffs
                .iter()
                .flat_map(|t| pools.get(&t.rank).unwrap_or(&empty).iter())
                .take(device_count as usize)
                .cloned()
                .collect();
            Consultation {
                budget: remaining,
                work_time,
                device_count,
                equipment,
            }
        }
    };

    tracing::info!(
        ?kind,
        total,
        units = ?ranks.iter().map(|r| (r.tariff.rank, r.units)).collect::<Vec<_>>(),
        work_time = consultation.work_time,
        "amount allocated"
    );

    Ok(AllocationPlan {
        kind,
        total,
        consultation_share,
        ranks,
        consultation,
        shortfalls,
    })
}
