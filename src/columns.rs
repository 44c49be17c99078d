// Column alias table.
//
// Source files name the same field in many ways ("plan (m³)", "계획(m3)",
// "Planned Volume"). Every header is normalized with
// `util::normalize_header` and looked up here, so the loaders only ever see
// canonical fields.
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::util::normalize_header;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Year,
    Month,
    Day,
    PlannedVolume,
    Date,
    ActualVolume,
}

impl Field {
    pub const PLAN: [Field; 4] = [Field::Year, Field::Month, Field::Day, Field::PlannedVolume];
    pub const ACTUALS: [Field; 2] = [Field::Date, Field::ActualVolume];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::PlannedVolume => "planned_volume",
            Self::Date => "date",
            Self::ActualVolume => "actual_volume",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "day" => Ok(Self::Day),
            "planned_volume" => Ok(Self::PlannedVolume),
            "date" => Ok(Self::Date),
            "actual_volume" => Ok(Self::ActualVolume),
            other => Err(format!("unknown column field '{other}'")),
        }
    }
}

static DEFAULT_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    let mut table = AliasTable::empty();
    table.extend(Field::Year, ["year", "yr", "연", "년", "연도", "년도"]);
    table.extend(Field::Month, ["month", "mon", "월"]);
    table.extend(Field::Day, ["day", "dom", "일"]);
    table.extend(
        Field::PlannedVolume,
        [
            "planned_volume",
            "plannedvolume",
            "plan",
            "plan_m3",
            "plan(m3)",
            "planned(m3)",
            "plannedvolume(m3)",
            "계획",
            "계획(m3)",
            "계획량",
            "계획량(m3)",
            "공급계획",
            "공급계획(m3)",
            "신규모델_계획",
        ],
    );
    table.extend(Field::Date, ["date", "일자", "날짜", "일시"]);
    table.extend(
        Field::ActualVolume,
        [
            "actual_volume",
            "actualvolume",
            "actual",
            "observed_volume",
            "observedvolume",
            "actual(m3)",
            "실적",
            "실적(m3)",
            "실제실적",
            "공급량",
            "공급량(m3)",
            "실제공급량",
        ],
    );
    table
});

/// Mapping from canonical field to the normalized raw header names accepted
/// for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasTable {
    aliases: HashMap<Field, Vec<String>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        DEFAULT_ALIASES.clone()
    }
}

impl AliasTable {
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    /// Add aliases for `field`. Names are normalized on the way in, and
    /// duplicates are ignored.
    pub fn extend<I, S>(&mut self, field: Field, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.aliases.entry(field).or_default();
        for name in names {
            let norm = normalize_header(name.as_ref());
            if !norm.is_empty() && !entry.contains(&norm) {
                entry.push(norm);
            }
        }
    }

    pub fn aliases(&self, field: Field) -> &[String] {
        self.aliases.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Position of the first header accepted for `field`. Alias order decides
    /// between several matching headers.
    pub fn resolve(&self, headers: &[String], field: Field) -> Option<usize> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        self.aliases(field)
            .iter()
            .find_map(|alias| normalized.iter().position(|h| h == alias))
    }
}
