//! Ukrainian formatting used by every document: dates, amounts in words, work time.

use chrono::{Datelike, NaiveDate};

use crate::error::GenerationError;

/// Genitive month names, as written after a day number ("05 березня").
pub const MONTHS_GENITIVE: [&str; 12] = [
    "січня",
    "лютого",
    "березня",
    "квітня",
    "травня",
    "червня",
    "липня",
    "серпня",
    "вересня",
    "жовтня",
    "листопада",
    "грудня",
];

/// Hourly rate of consultation work; one hour of work costs this many hryvnias.
pub const HOURLY_RATE: f64 = 1000.0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedDate {
    /// "05 березня 2024 року"
    pub full: String,
    pub month_name: &'static str,
    pub year: String,
    /// Zero-padded day of month.
    pub day: String,
}

pub fn month_name(date: NaiveDate) -> &'static str {
    // `month0` is always in 0..12.
    MONTHS_GENITIVE[date.month0() as usize]
}

pub fn format_date(date: NaiveDate) -> FormattedDate {
    let day = format!("{:02}", date.day());
    let month_name = month_name(date);
    let year = format!("{:04}", date.year());
    FormattedDate {
        full: format!("{day} {month_name} {year} року"),
        month_name,
        year,
        day,
    }
}

pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

const UNITS_MASCULINE: [&str; 10] = [
    "", "один", "два", "три", "чотири", "п'ять", "шість", "сім", "вісім", "дев'ять",
];
const UNITS_FEMININE: [&str; 10] = [
    "", "одна", "дві", "три", "чотири", "п'ять", "шість", "сім", "вісім", "дев'ять",
];
const TEENS: [&str; 10] = [
    "десять",
    "одинадцять",
    "дванадцять",
    "тринадцять",
    "чотирнадцять",
    "п'ятнадцять",
    "шістнадцять",
    "сімнадцять",
    "вісімнадцять",
    "дев'ятнадцять",
];
const TENS: [&str; 10] = [
    "", "", "двадцять", "тридцять", "сорок", "п'ятдесят", "шістдесят", "сімдесят", "вісімдесят",
    "дев'яносто",
];
const HUNDREDS: [&str; 10] = [
    "", "сто", "двісті", "триста", "чотириста", "п'ятсот", "шістсот", "сімсот", "вісімсот",
    "дев'ятсот",
];

/// (one, few, many) forms of each power of a thousand, and whether it is feminine.
const SCALES: [(&str, &str, &str, bool); 7] = [
    ("", "", "", false),
    ("тисяча", "тисячі", "тисяч", true),
    ("мільйон", "мільйони", "мільйонів", false),
    ("мільярд", "мільярди", "мільярдів", false),
    ("трильйон", "трильйони", "трильйонів", false),
    ("квадрильйон", "квадрильйони", "квадрильйонів", false),
    ("квінтильйон", "квінтильйони", "квінтильйонів", false),
];

fn plural_form<'a>(n: u64, forms: (&'a str, &'a str, &'a str)) -> &'a str {
    match (n % 100, n % 10) {
        (11..=14, _) => forms.2,
        (_, 1) => forms.0,
        (_, 2..=4) => forms.1,
        _ => forms.2,
    }
}

fn triplet_words(n: u64, feminine: bool, out: &mut Vec<&'static str>) {
    let units = if feminine { &UNITS_FEMININE } else { &UNITS_MASCULINE };
    let h = (n / 100) as usize;
    let rest = (n % 100) as usize;
    if h > 0 {
        out.push(HUNDREDS[h]);
    }
    match rest {
        0 => {}
        10..=19 => out.push(TEENS[rest - 10]),
        _ => {
            if rest >= 20 {
                out.push(TENS[rest / 10]);
            }
            if rest % 10 > 0 {
                out.push(units[rest % 10]);
            }
        }
    }
}

/// Cardinal numeral in words ("шістсот шістдесят шість").
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return "нуль".to_string();
    }
    let mut groups = Vec::new();
    let mut rest = n;
    while rest > 0 {
        groups.push(rest % 1000);
        rest /= 1000;
    }

    let mut words: Vec<&'static str> = Vec::new();
    for (scale, &group) in groups.iter().enumerate().rev() {
        if group == 0 {
            continue;
        }
        // u64 has at most seven groups.
        let (one, few, many, feminine) = SCALES[scale];
        triplet_words(group, feminine, &mut words);
        if scale > 0 {
            words.push(plural_form(group, (one, few, many)));
        }
    }
    words.join(" ")
}

/// Whole hryvnias and kopiyky of `amount`, rounded half-up on its decimal notation.
fn split_currency(amount: f64) -> Result<(bool, u64, u64), GenerationError> {
    let invalid = || GenerationError::InvalidAmount(amount.to_string());
    if !amount.is_finite() {
        return Err(invalid());
    }
    let negative = amount < 0.0;
    let text = amount.abs().to_string();
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let mut whole: u64 = whole.parse().map_err(|_| invalid())?;
    let digits: Vec<u64> = frac
        .chars()
        .filter_map(|c| c.to_digit(10).map(u64::from))
        .collect();
    let digit = |i: usize| digits.get(i).copied().unwrap_or(0);
    let mut kop = digit(0) * 10 + digit(1);
    if digit(2) >= 5 {
        kop += 1;
    }
    if kop == 100 {
        whole = whole.checked_add(1).ok_or_else(invalid)?;
        kop = 0;
    }
    Ok((negative && (whole > 0 || kop > 0), whole, kop))
}

/// "шістсот шістдесят шість гривень п'ятдесят чотири копійок". Amounts that do not fit in
/// whole hryvnias of `u64` are rejected.
pub fn currency_to_words(amount: f64) -> Result<String, GenerationError> {
    let (negative, whole, kop) = split_currency(amount)?;
    let sign = if negative { "мінус " } else { "" };
    Ok(format!(
        "{sign}{} гривень {} копійок",
        number_to_words(whole),
        number_to_words(kop)
    ))
}

/// "{h} годин {m} хвилин" for an amount billed at [`HOURLY_RATE`].
pub fn amount_to_duration(amount: f64) -> String {
    let value = amount / HOURLY_RATE;
    let hours = value.trunc();
    let minutes = ((value - hours) * 60.0).trunc();
    format!("{} годин {} хвилин", hours as i64, minutes as i64)
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Two decimals with comma thousands separators: `12,345.67`.
pub fn format_grouped_amount(x: f64) -> String {
    let fixed = format!("{:.2}", x.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if x < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}
