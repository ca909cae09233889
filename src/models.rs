use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

/// SIMAK `NA` ("non-aktif") flag. Only the literal `"N"` marks a row as live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Active,
    Archived,
}

impl RecordStatus {
    pub const ACTIVE_FLAG: &'static str = "N";

    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some(Self::ACTIVE_FLAG) => Self::Active,
            _ => Self::Archived,
        }
    }

    pub fn is_active(self) -> bool {
        self == Self::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AcademicYear(u16);

impl AcademicYear {
    /// Oldest year synced when no filter is given.
    pub const DEFAULT_FLOOR: AcademicYear = AcademicYear(2018);

    pub fn new(year: u16) -> Self {
        Self(year)
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl FromStr for AcademicYear {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SyncError::InvalidYear(raw.to_string()));
        }
        trimmed
            .parse::<u16>()
            .map(Self)
            .map_err(|_| SyncError::InvalidYear(raw.to_string()))
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which SIMAK headers a run selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearFilter {
    /// Every year from the floor onwards (numeric comparison).
    Since(AcademicYear),
    /// One year only.
    Exact(AcademicYear),
}

impl YearFilter {
    pub fn matches(self, year: AcademicYear) -> bool {
        match self {
            Self::Since(floor) => year >= floor,
            Self::Exact(wanted) => year == wanted,
        }
    }

    /// Text stored in the run ledger.
    pub fn describe(self) -> String {
        match self {
            Self::Since(floor) => format!(">={floor}"),
            Self::Exact(year) => year.to_string(),
        }
    }
}

impl Default for YearFilter {
    fn default() -> Self {
        Self::Since(AcademicYear::DEFAULT_FLOOR)
    }
}

/// A `bipot` row after conversion at the ingestion boundary.
#[derive(Debug, Clone)]
pub struct LegacyTemplate {
    /// `BIPOTID` exactly as SIMAK holds it.
    pub code: String,
    pub name: String,
    /// `Tahun` as written in SIMAK; this is what gets stored.
    pub year_text: String,
    /// Parsed `Tahun`, used for filtering.
    pub academic_year: AcademicYear,
    pub program_id: Option<String>,
    pub study_program_id: Option<String>,
    pub status: RecordStatus,
}

/// A `bipot2` row after conversion at the ingestion boundary.
#[derive(Debug, Clone)]
pub struct LegacyTemplateItem {
    pub parent_code: String,
    /// `BIPOT2ID` exactly as SIMAK holds it.
    pub item_code: String,
    pub additional_label: Option<String>,
    pub amount: i64,
    /// Already stripped of thousands separators.
    pub ukt: Option<String>,
    pub billing_name_ref: Option<String>,
    pub session_start: i64,
    pub session_count: i64,
    pub status: RecordStatus,
}

#[derive(Debug, Clone)]
pub struct BillTemplate {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub academic_year: String,
    pub program_id: Option<String>,
    pub study_program_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct BillTemplateItem {
    pub id: i64,
    pub name: String,
    pub additional_label: Option<String>,
    pub amount: i64,
    pub ukt: Option<String>,
    pub billing_name_ref: Option<String>,
    pub session_start: i64,
    pub session_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_n_is_active() {
        assert_eq!(RecordStatus::from_flag(Some("N")), RecordStatus::Active);
        assert_eq!(RecordStatus::from_flag(Some("Y")), RecordStatus::Archived);
        assert_eq!(RecordStatus::from_flag(Some("n")), RecordStatus::Archived);
        assert_eq!(RecordStatus::from_flag(Some("")), RecordStatus::Archived);
        assert_eq!(RecordStatus::from_flag(None), RecordStatus::Archived);
    }

    #[test]
    fn test_academic_year_parse() {
        assert_eq!("2023".parse::<AcademicYear>().unwrap(), AcademicYear::new(2023));
        assert_eq!(" 2018 ".parse::<AcademicYear>().unwrap(), AcademicYear::new(2018));
        assert!("2023/2024".parse::<AcademicYear>().is_err());
        assert!("".parse::<AcademicYear>().is_err());
        assert!("-5".parse::<AcademicYear>().is_err());
    }

    #[test]
    fn test_since_filter_is_numeric() {
        let filter = YearFilter::default();
        assert!(!filter.matches(AcademicYear::new(2017)));
        assert!(filter.matches(AcademicYear::new(2018)));
        assert!(filter.matches(AcademicYear::new(2024)));
        // "999" sorts after "2018" as text but is numerically older
        assert!(!filter.matches("999".parse().unwrap()));
        assert!(filter.matches("10000".parse().unwrap()));
    }

    #[test]
    fn test_exact_filter() {
        let filter = YearFilter::Exact(AcademicYear::new(2022));
        assert!(filter.matches(AcademicYear::new(2022)));
        assert!(!filter.matches(AcademicYear::new(2021)));
        assert!(!filter.matches(AcademicYear::new(2023)));
    }

    #[test]
    fn test_filter_describe() {
        assert_eq!(YearFilter::default().describe(), ">=2018");
        assert_eq!(YearFilter::Exact(AcademicYear::new(2022)).describe(), "2022");
    }
}
