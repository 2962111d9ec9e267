use std::collections::BTreeMap;

use crate::allocator::{allocate, tariffs, ShareSource, Shortfall};
use crate::config::AppConfig;
use crate::error::GenerationError;
use crate::model::{OrganizationKind, PartyRole, RankAllocationRecord, RecordId};
use crate::store::BillingStore;

#[derive(Clone, Debug, PartialEq)]
pub struct AllocationOutcome {
    pub kind: OrganizationKind,
    pub records: Vec<RankAllocationRecord>,
    pub shortfalls: Vec<Shortfall>,
    pub overcommitted: bool,
}

/// Splits the period's amount over the organization's equipment and stores the result,
/// replacing whatever was stored for the period before.
pub fn generate_allocations(
    store: &mut dyn BillingStore,
    config: &AppConfig,
    agreement_id: RecordId,
    period_id: RecordId,
    shares: &mut dyn ShareSource,
) -> Result<AllocationOutcome, GenerationError> {
    let agreement = store.fetch_agreement(agreement_id)?;
    let period = store.fetch_billing_period(period_id)?;
    if period.agreement_id != agreement.id {
        return Err(GenerationError::not_found("billing period", period_id));
    }
    if agreement.principal.role != PartyRole::Organization {
        return Err(GenerationError::not_found("organization", agreement.principal.id));
    }

    let kind = OrganizationKind::resolve(&agreement.principal.tax_id, &config.organization.special_tax_id);
    let owner = kind.equipment_owner(&agreement);
    let mut pools = BTreeMap::new();
    for tariff in tariffs(kind) {
        let equipment = store.fetch_equipment_by_rank_and_zone(tariff.rank, owner)?;
        tracing::debug!(rank = tariff.rank, available = equipment.len(), ?owner, "equipment pool");
        pools.insert(tariff.rank, equipment);
    }

    let plan = allocate(kind, period.amount, &pools, shares)?;
    let shortfalls = plan.shortfalls.clone();
    let overcommitted = plan.is_overcommitted();
    let records = plan.into_records(period.id);
    store.replace_rank_allocations(period.id, records.clone())?;
    tracing::info!(
        agreement = %agreement.name,
        period_id,
        records = records.len(),
        "allocations stored"
    );

    Ok(AllocationOutcome {
        kind,
        records,
        shortfalls,
        overcommitted,
    })
}

#[cfg(test)]
mod tests {
    use super::generate_allocations;
    use crate::allocator::FixedShares;
    use crate::config::AppConfig;
    use crate::error::GenerationError;
    use crate::model::OrganizationKind;
    use crate::store::fixtures::store;
    use crate::store::BillingStore;

    #[test]
    fn type_b_period_uses_organization_cantons() {
        let mut s = store();
        let mut shares = FixedShares::new(vec![0.6, 0.15]);
        let out = generate_allocations(&mut s, &AppConfig::default(), 1, 10, &mut shares).expect("allocate");
        assert_eq!(out.kind, OrganizationKind::TypeB);
        let ranks: Vec<(u8, u32)> = out.records.iter().map(|r| (r.rank, r.device_count)).collect();
        assert_eq!(ranks, vec![(3, 3), (4, 1), (0, 39)]);
        assert!((out.records[2].work_time - 6.5).abs() < 1e-9);
        assert_eq!(out.records[2].model_list().len(), 4);
    }

    #[test]
    fn type_a_regeneration_is_idempotent() {
        let mut s = store();
        for _ in 0..2 {
            let mut shares = FixedShares::new(vec![0.3, 0.5]);
            let out = generate_allocations(&mut s, &AppConfig::default(), 2, 20, &mut shares).expect("allocate");
            assert_eq!(out.kind, OrganizationKind::TypeA);
        }
        let stored = s.fetch_rank_allocations(20).expect("fetch");
        let ranks: Vec<(u8, u32)> = stored.iter().map(|r| (r.rank, r.device_count)).collect();
        assert_eq!(ranks, vec![(0, 8), (1, 3), (2, 5)]);
        assert_eq!(stored[1].models, "ZTE-2928\nZTE-2928\nZTE-2928");
        assert!((stored[0].work_time - 2.0).abs() < 1e-9);
    }

    #[test]
    fn period_of_another_agreement_is_not_found() {
        let mut s = store();
        let mut shares = FixedShares::default();
        let err = generate_allocations(&mut s, &AppConfig::default(), 2, 10, &mut shares).expect_err("mismatch");
        assert!(matches!(err, GenerationError::NotFound { entity: "billing period", .. }));
        assert!(s.fetch_rank_allocations(10).expect("fetch").is_empty());
    }

    #[test]
    fn master_agreements_have_no_organization() {
        let mut s = store();
        let mut shares = FixedShares::default();
        let err = generate_allocations(&mut s, &AppConfig::default(), 3, 30, &mut shares).expect_err("master");
        assert_eq!(err.user_message(), "Организация не найдена");
    }
}
