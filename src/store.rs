use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    AgreementRecord, BillingPeriodRecord, EquipmentRecord, IpPool, ModelCount, RankAllocationRecord,
    RecordId, RecordState, ZoneAssignment, ZoneOwner, CONSULTATION_RANK,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} not found: id={id}")]
    NotFound { entity: &'static str, id: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    fn not_found(entity: &'static str, id: RecordId) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Persistence used by allocation and document generation. Reads take `&self`; callers that
/// share a store across threads wrap it in their own lock.
pub trait BillingStore {
    fn fetch_agreement(&self, id: RecordId) -> Result<AgreementRecord, StoreError>;

    /// Inactive (soft-deleted) periods are reported as not found.
    fn fetch_billing_period(&self, id: RecordId) -> Result<BillingPeriodRecord, StoreError>;

    fn fetch_rank_allocations(&self, period_id: RecordId) -> Result<Vec<RankAllocationRecord>, StoreError>;

    fn fetch_equipment_by_rank_and_zone(
        &self,
        rank: u8,
        owner: ZoneOwner,
    ) -> Result<Vec<EquipmentRecord>, StoreError>;

    fn insert_rank_allocation(&mut self, record: RankAllocationRecord) -> Result<(), StoreError>;

    /// Returns the number of records removed.
    fn delete_rank_allocations(&mut self, period_id: RecordId) -> Result<usize, StoreError>;

    /// Swaps a period's allocations for `records`. Either all of `records` end up stored or
    /// the previous allocations are put back. Stores with transactions should override this.
    fn replace_rank_allocations(
        &mut self,
        period_id: RecordId,
        records: Vec<RankAllocationRecord>,
    ) -> Result<(), StoreError> {
        let previous = self.fetch_rank_allocations(period_id)?;
        let removed = self.delete_rank_allocations(period_id)?;
        if removed > 0 {
            tracing::debug!(period_id, removed, "previous allocations replaced");
        }
        for record in records {
            if let Err(err) = self.insert_rank_allocation(record) {
                tracing::warn!(period_id, error = %err, "allocation write failed, restoring previous records");
                let restored = self
                    .delete_rank_allocations(period_id)
                    .and_then(|_| previous.into_iter().try_for_each(|old| self.insert_rank_allocation(old)));
                if let Err(restore_err) = restored {
                    tracing::error!(period_id, error = %restore_err, "previous allocations could not be restored");
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Device count per model over the period's device ranks.
    fn fetch_model_summary(&self, period_id: RecordId) -> Result<Vec<ModelCount>, StoreError>;

    /// The period's device IPs grouped by /24 network.
    fn fetch_ip_pools(&self, period_id: RecordId) -> Result<Vec<IpPool>, StoreError>;

    fn set_period_state(&mut self, period_id: RecordId, state: RecordState) -> Result<(), StoreError>;
}

/// In-memory store, loadable from a JSON fixture.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStore {
    pub agreements: Vec<AgreementRecord>,
    pub periods: Vec<BillingPeriodRecord>,
    pub allocations: Vec<RankAllocationRecord>,
    pub equipment: Vec<EquipmentRecord>,
    pub zones: Vec<ZoneAssignment>,
    #[serde(skip)]
    offline: bool,
}

impl MemoryStore {
    pub fn from_json_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read data file: {}", path.display()))?;
        let store: MemoryStore = serde_json::from_str(&text)
            .with_context(|| format!("parse data file: {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            agreements = store.agreements.len(),
            periods = store.periods.len(),
            equipment = store.equipment.len(),
            "data loaded"
        );
        Ok(store)
    }

    pub fn write_json_path(&self, path: &Path) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self).context("serialize data")?;
        std::fs::write(path, text).with_context(|| format!("write data file: {}", path.display()))
    }

    /// Makes every call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    fn online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn period_allocations(&self, period_id: RecordId) -> impl Iterator<Item = &RankAllocationRecord> {
        self.allocations
            .iter()
            .filter(move |a| a.period_id == period_id && a.rank != CONSULTATION_RANK)
    }
}

/// "10.0.1.0/24" for "10.0.1.17"; addresses that are not dotted quads form their own pool.
fn ip_pool_of(ip: &str) -> String {
    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() == 4 && octets.iter().all(|o| o.parse::<u8>().is_ok()) {
        format!("{}.{}.{}.0/24", octets[0], octets[1], octets[2])
    } else {
        ip.to_string()
    }
}

impl BillingStore for MemoryStore {
    fn fetch_agreement(&self, id: RecordId) -> Result<AgreementRecord, StoreError> {
        self.online()?;
        self.agreements
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("agreement", id))
    }

    fn fetch_billing_period(&self, id: RecordId) -> Result<BillingPeriodRecord, StoreError> {
        self.online()?;
        self.periods
            .iter()
            .find(|p| p.id == id && p.is_active())
            .cloned()
            .ok_or_else(|| StoreError::not_found("billing period", id))
    }

    fn fetch_rank_allocations(&self, period_id: RecordId) -> Result<Vec<RankAllocationRecord>, StoreError> {
        self.online()?;
        let mut out: Vec<RankAllocationRecord> = self
            .allocations
            .iter()
            .filter(|a| a.period_id == period_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.rank);
        Ok(out)
    }

    fn fetch_equipment_by_rank_and_zone(
        &self,
        rank: u8,
        owner: ZoneOwner,
    ) -> Result<Vec<EquipmentRecord>, StoreError> {
        self.online()?;
        let cantons: Vec<&str> = self
            .zones
            .iter()
            .filter(|z| z.owner == owner)
            .map(|z| z.canton.as_str())
            .collect();
        Ok(self
            .equipment
            .iter()
            .filter(|e| e.rank == rank && cantons.contains(&e.canton.as_str()))
            .cloned()
            .collect())
    }

    fn insert_rank_allocation(&mut self, record: RankAllocationRecord) -> Result<(), StoreError> {
        self.online()?;
        self.allocations.push(record);
        Ok(())
    }

    fn delete_rank_allocations(&mut self, period_id: RecordId) -> Result<usize, StoreError> {
        self.online()?;
        let before = self.allocations.len();
        self.allocations.retain(|a| a.period_id != period_id);
        Ok(before - self.allocations.len())
    }

    fn replace_rank_allocations(
        &mut self,
        period_id: RecordId,
        records: Vec<RankAllocationRecord>,
    ) -> Result<(), StoreError> {
        self.online()?;
        let mut next: Vec<RankAllocationRecord> = self
            .allocations
            .iter()
            .filter(|a| a.period_id != period_id)
            .cloned()
            .collect();
        let removed = self.allocations.len() - next.len();
        next.extend(records);
        self.allocations = next;
        if removed > 0 {
            tracing::debug!(period_id, removed, "previous allocations replaced");
        }
        Ok(())
    }

    fn fetch_model_summary(&self, period_id: RecordId) -> Result<Vec<ModelCount>, StoreError> {
        self.online()?;
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for alloc in self.period_allocations(period_id) {
            for model in alloc.model_list() {
                *counts.entry(model.to_string()).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(model, count)| ModelCount { model, count })
            .collect())
    }

    fn fetch_ip_pools(&self, period_id: RecordId) -> Result<Vec<IpPool>, StoreError> {
        self.online()?;
        let mut pools: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for alloc in self.period_allocations(period_id) {
            for ip in alloc.ip_list() {
                let ips = pools.entry(ip_pool_of(ip)).or_default();
                // Type A allocations repeat devices; each address is listed once.
                if !ips.iter().any(|known| known == ip) {
                    ips.push(ip.to_string());
                }
            }
        }
        Ok(pools.into_iter().map(|(pool, ips)| IpPool { pool, ips }).collect())
    }

    fn set_period_state(&mut self, period_id: RecordId, state: RecordState) -> Result<(), StoreError> {
        self.online()?;
        let period = self
            .periods
            .iter_mut()
            .find(|p| p.id == period_id)
            .ok_or_else(|| StoreError::not_found("billing period", period_id))?;
        period.state = state;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;

    use super::MemoryStore;
    use crate::model::{
        AgreementRecord, BillingPeriodRecord, EquipmentRecord, Party, PartyRole, RecordState, ZoneAssignment,
        ZoneOwner,
    };

    pub fn party(id: i64, role: PartyRole, name: &str, tax_id: &str) -> Party {
        Party {
            id,
            role,
            name: name.to_string(),
            tax_id: tax_id.to_string(),
            vat_inn: Some(format!("{tax_id}0")),
            address: format!("м. Київ, вул. {name}, 1"),
            iban: "UA213223130000026007233566001".to_string(),
            bank_details: "АТ КБ \"ПРИВАТБАНК\"".to_string(),
            short_name: format!("{name} (скор.)"),
            pidstava: "Виписки з ЄДР".to_string(),
            persona: Some("директора Іваненка І.І.".to_string()),
            phone: Some("+380441234567".to_string()),
        }
    }

    fn equipment(id: i64, model: &str, ip: &str, rank: u8, canton: &str) -> EquipmentRecord {
        EquipmentRecord {
            id,
            model: model.to_string(),
            ip: ip.to_string(),
            rank,
            canton: canton.to_string(),
            branch: None,
        }
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    /// Agreement 1: a type B organization; agreement 2: the type A organization;
    /// agreement 3: a master (FOP). Period 10 belongs to 1, 20 to 2, 30 to 3, 11 is inactive.
    pub fn store() -> MemoryStore {
        let engineer = party(100, PartyRole::Engineer, "Петренко", "3011122233");
        let org_b = party(200, PartyRole::Organization, "ТОВ Мережа", "40000001");
        let org_a = party(201, PartyRole::Organization, "КДН", "38736443");
        let master = party(300, PartyRole::Master, "ФОП Коваль", "2955544433");

        let agreement = |id: i64, name: &str, principal| AgreementRecord {
            id,
            name: name.to_string(),
            date: date(2023, 1, 15),
            principal,
            engineer: engineer.clone(),
            state: RecordState::Active,
            terminated_on: None,
        };
        let period = |id: i64, agreement_id: i64, amount: f64, state| BillingPeriodRecord {
            id,
            agreement_id,
            date: date(2024, 3, 5),
            amount,
            amount_words: None,
            state,
        };

        MemoryStore {
            agreements: vec![
                agreement(1, "Д-17", org_b),
                agreement(2, "К-5", org_a),
                agreement(3, "М-9", master),
            ],
            periods: vec![
                period(10, 1, 10_000.0, RecordState::Active),
                period(11, 1, 5_000.0, RecordState::Inactive),
                period(20, 2, 10_000.0, RecordState::Active),
                period(30, 3, 12_345.67, RecordState::Active),
            ],
            allocations: Vec::new(),
            equipment: vec![
                equipment(1, "DES-3200", "10.0.1.2", 3, "north"),
                equipment(2, "DES-3200", "10.0.1.3", 3, "north"),
                equipment(3, "SNR-S2985", "10.0.2.4", 3, "north"),
                equipment(4, "DGS-1100", "10.0.2.5", 4, "north"),
                equipment(5, "DGS-1100", "10.0.2.6", 4, "south"),
                equipment(6, "ZTE-2928", "172.16.0.1", 1, "east"),
                equipment(7, "ZTE-5950", "172.16.0.2", 2, "east"),
            ],
            zones: vec![
                ZoneAssignment {
                    canton: "north".to_string(),
                    owner: ZoneOwner::Organization(200),
                },
                ZoneAssignment {
                    canton: "east".to_string(),
                    owner: ZoneOwner::Engineer(100),
                },
            ],
            offline: false,
        }
    }
}
