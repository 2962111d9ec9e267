//! Marker vocabularies of each document kind.

use chrono::{Datelike, NaiveDate};

use crate::allocator::tariffs;
use crate::docx::substitute::ReplacementMap;
use crate::error::GenerationError;
use crate::locale::{
    amount_to_duration, currency_to_words, format_date, format_grouped_amount, last_day_of_month, round2,
};
use crate::model::{
    AgreementRecord, BillingPeriodRecord, OrganizationKind, Party, RankAllocationRecord, CONSULTATION_RANK,
};

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Amount in words as stored with the period, computed when the operator left it empty.
fn amount_words(period: &BillingPeriodRecord) -> Result<String, GenerationError> {
    match period.amount_words.as_deref().map(str::trim) {
        Some(words) if !words.is_empty() => Ok(words.to_string()),
        _ => currency_to_words(period.amount),
    }
}

fn engineer_entries(map: &mut ReplacementMap, ri: &Party) {
    map.insert("@ri_name", &ri.name);
    map.insert("@ri_inn", &ri.tax_id);
    map.insert("@ri_address", &ri.address);
    map.insert("@ri_iban", &ri.iban);
    map.insert("@bank_account_detail_ri", &ri.bank_details);
    map.insert("@ri_shortname", &ri.short_name);
}

pub fn master_protocol(
    agreement: &AgreementRecord,
    period: &BillingPeriodRecord,
) -> Result<ReplacementMap, GenerationError> {
    let fop = &agreement.principal;
    let ri = &agreement.engineer;
    let proto = format_date(period.date);

    let mut map = ReplacementMap::new();
    map.insert("@agr_num", &agreement.name);
    map.insert("@agr_date", format_date(agreement.date).full);
    map.insert("@proto_date", &proto.full);
    map.insert("@fop_name", &fop.name);
    map.insert("@inn_fop", &fop.tax_id);
    map.insert("@pidstava_fop", &fop.pidstava);
    map.insert("@ri_name", &ri.name);
    map.insert("@inn_ri", &ri.tax_id);
    map.insert("@pidstava_ri", &ri.pidstava);
    map.insert("@month_ukr_name", proto.month_name);
    map.insert("@year", &proto.year);
    map.insert("@last_day_of_the_month", last_day_of_month(period.date).day());
    map.insert("@agr_sum", format_grouped_amount(period.amount));
    map.insert("@agrsum_handwriting_sample", amount_words(period)?);
    map.insert("@fop_address", &fop.address);
    map.insert("@fop_iban", &fop.iban);
    map.insert("@bank_account_detail_fop", &fop.bank_details);
    map.insert("@fopname_short", &fop.short_name);
    map.insert("@ri_address", &ri.address);
    map.insert("@ri_iban", &ri.iban);
    map.insert("@bank_account_detail_ri", &ri.bank_details);
    map.insert("@riname_short", &ri.short_name);
    Ok(map)
}

pub fn master_act(
    agreement: &AgreementRecord,
    period: &BillingPeriodRecord,
    today: NaiveDate,
) -> Result<ReplacementMap, GenerationError> {
    let mut map = master_protocol(agreement, period)?;
    map.insert("@today", format_date(today).full);
    // The marker name is misspelled in the templates in use.
    map.insert("@act_nubmer", format!("{}/{}", period.id, agreement.name));
    map.insert("@act_hours", amount_to_duration(period.amount));
    Ok(map)
}

fn organization_entries(map: &mut ReplacementMap, agreement: &AgreementRecord) {
    let llc = &agreement.principal;
    map.insert("@agr_name", &agreement.name);
    map.insert("@agr_date", format_date(agreement.date).full);
    map.insert("@llc_name", &llc.name);
    map.insert("@llc_edrpou", &llc.tax_id);
    engineer_entries(map, &agreement.engineer);
}

pub fn organization_protocol(agreement: &AgreementRecord) -> ReplacementMap {
    let llc = &agreement.principal;
    let mut map = ReplacementMap::new();
    map.insert(
        "@proto_num",
        format!("{}_{}_{}", agreement.id, agreement.date.format("%Y-%m-%d"), agreement.name),
    );
    organization_entries(&mut map, agreement);
    map.insert("@persona", opt(&llc.persona));
    map.insert("@pidstava", &agreement.engineer.pidstava);
    map.insert("@llc_address", &llc.address);
    map.insert("@llc_iban", &llc.iban);
    map.insert("@bank_account_detail_llc", &llc.bank_details);
    map.insert("@llc_inn", opt(&llc.vat_inn));
    map.insert("@llc_shortname", &llc.short_name);
    map
}

/// `@rank{N}_count`/`@rank{N}_sum` for the variant's device ranks, `@time_count` and
/// `@time_sum` for consultation. Ranks without a record count as zero devices.
pub fn rank_entries(
    map: &mut ReplacementMap,
    kind: OrganizationKind,
    total: f64,
    allocations: &[RankAllocationRecord],
) {
    if allocations.is_empty() {
        tracing::warn!(?kind, "no rank allocations for period, rank markers left in place");
        return;
    }
    let mut device_sum = 0.0;
    for tariff in tariffs(kind) {
        let count = allocations
            .iter()
            .find(|a| a.rank == tariff.rank)
            .map(|a| a.device_count)
            .unwrap_or(0);
        let sum = f64::from(count) * tariff.unit_cost;
        device_sum += sum;
        map.insert(format!("@rank{}_count", tariff.rank), count);
        map.insert(format!("@rank{}_sum", tariff.rank), format!("{sum:.2}"));
    }
    let work_time = allocations
        .iter()
        .find(|a| a.rank == CONSULTATION_RANK)
        .map(|a| a.work_time)
        .unwrap_or(0.0);
    map.insert("@time_count", format!("{:.2}", round2(work_time)));
    map.insert("@time_sum", format!("{:.2}", round2(total - device_sum)));
}

pub fn bill(
    agreement: &AgreementRecord,
    period: &BillingPeriodRecord,
    kind: OrganizationKind,
    allocations: &[RankAllocationRecord],
) -> Result<ReplacementMap, GenerationError> {
    let ri = &agreement.engineer;
    let formatted = format_date(period.date);
    let last_day = last_day_of_month(period.date).day();

    let mut map = ReplacementMap::new();
    map.insert(
        "@bill_name",
        format!(
            "B{}_{}/{}_{}",
            period.id,
            last_day,
            period.date.format("%m/%y"),
            agreement.name
        ),
    );
    map.insert(
        "@bill_date",
        format!("{last_day} {} {} року", formatted.month_name, formatted.year),
    );
    organization_entries(&mut map, agreement);
    map.insert("@ri_phone", opt(&ri.phone));
    map.insert("@bill_sum", format!("{:.2}", period.amount));
    map.insert("@handwritebill_sum", currency_to_words(period.amount)?);
    rank_entries(&mut map, kind, period.amount, allocations);
    Ok(map)
}

pub fn appendix(
    agreement: &AgreementRecord,
    period: &BillingPeriodRecord,
    kind: OrganizationKind,
    allocations: &[RankAllocationRecord],
) -> ReplacementMap {
    let formatted = format_date(period.date);
    let mut map = ReplacementMap::new();
    organization_entries(&mut map, agreement);
    map.insert("@act_date", &formatted.full);
    map.insert("@month_ukr_name", formatted.month_name);
    map.insert("@year", &formatted.year);
    map.insert("@act_sum", format!("{:.2}", period.amount));
    rank_entries(&mut map, kind, period.amount, allocations);
    map
}
