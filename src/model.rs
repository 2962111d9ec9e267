use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type RecordId = i64;

/// Rank of the synthetic "consultation time" allocation.
pub const CONSULTATION_RANK: u8 = 0;

/// Soft-delete flag shared by agreements and billing periods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Active,
    Inactive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    /// Individual entrepreneur (FOP) contracting directly.
    Master,
    Organization,
    /// Responsible engineer (RI) on the provider side.
    Engineer,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: RecordId,
    pub role: PartyRole,
    pub name: String,
    /// EDRPOU for organizations, INN for individuals.
    pub tax_id: String,
    /// Individual tax number of an organization, when it has one.
    #[serde(default)]
    pub vat_inn: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub iban: String,
    #[serde(default)]
    pub bank_details: String,
    #[serde(default)]
    pub short_name: String,
    /// Basis of authority ("pidstava").
    #[serde(default)]
    pub pidstava: String,
    /// Representative signing on behalf of an organization.
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgreementRecord {
    pub id: RecordId,
    pub name: String,
    pub date: NaiveDate,
    pub principal: Party,
    pub engineer: Party,
    #[serde(default)]
    pub state: RecordState,
    #[serde(default)]
    pub terminated_on: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BillingPeriodRecord {
    pub id: RecordId,
    pub agreement_id: RecordId,
    pub date: NaiveDate,
    pub amount: f64,
    /// Amount in words as entered by an operator; computed when absent.
    #[serde(default)]
    pub amount_words: Option<String>,
    #[serde(default)]
    pub state: RecordState,
}

impl BillingPeriodRecord {
    pub fn is_active(&self) -> bool {
        self.state == RecordState::Active
    }
}

/// One rank's share of a billing period. Lists are stored newline-joined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankAllocationRecord {
    pub period_id: RecordId,
    pub rank: u8,
    #[serde(default)]
    pub models: String,
    #[serde(default)]
    pub ips: String,
    pub device_count: u32,
    /// Consultation hours; zero for device ranks.
    #[serde(default)]
    pub work_time: f64,
}

impl RankAllocationRecord {
    pub fn new(period_id: RecordId, rank: u8, equipment: &[EquipmentRecord], device_count: u32, work_time: f64) -> Self {
        Self {
            period_id,
            rank,
            models: join_lines(equipment.iter().map(|e| e.model.as_str())),
            ips: join_lines(equipment.iter().map(|e| e.ip.as_str())),
            device_count,
            work_time,
        }
    }

    pub fn model_list(&self) -> Vec<&str> {
        split_lines(&self.models)
    }

    pub fn ip_list(&self) -> Vec<&str> {
        split_lines(&self.ips)
    }
}

fn join_lines<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join("\n")
}

fn split_lines(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('\n').collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentRecord {
    pub id: RecordId,
    pub model: String,
    pub ip: String,
    pub rank: u8,
    /// Zone ("canton") the device is installed in.
    pub canton: String,
    #[serde(default)]
    pub branch: Option<String>,
}

/// Who a canton's equipment is billed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ZoneOwner {
    Organization(RecordId),
    Engineer(RecordId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneAssignment {
    pub canton: String,
    pub owner: ZoneOwner,
}

/// Billing variant of the contracting organization, resolved once per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrganizationKind {
    TypeA,
    TypeB,
}

impl OrganizationKind {
    /// Only an exact match on the special tax id selects [`OrganizationKind::TypeA`].
    pub fn resolve(tax_id: &str, special_tax_id: &str) -> Self {
        if tax_id.trim() == special_tax_id.trim() {
            OrganizationKind::TypeA
        } else {
            OrganizationKind::TypeB
        }
    }

    /// Device ranks billed for this variant, in document order.
    pub fn device_ranks(self) -> [u8; 2] {
        match self {
            OrganizationKind::TypeA => [1, 2],
            OrganizationKind::TypeB => [3, 4],
        }
    }

    /// Type A bills equipment in the engineer's cantons, type B in the organization's own.
    pub fn equipment_owner(self, agreement: &AgreementRecord) -> ZoneOwner {
        match self {
            OrganizationKind::TypeA => ZoneOwner::Engineer(agreement.engineer.id),
            OrganizationKind::TypeB => ZoneOwner::Organization(agreement.principal.id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCount {
    pub model: String,
    pub count: u32,
}

/// Addresses of one /24 network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpPool {
    pub pool: String,
    pub ips: Vec<String>,
}
