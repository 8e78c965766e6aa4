//! Remote enum-like strings to local variants.
//!
//! Each table is the single place a remote spelling is recognised. Lookups
//! normalise case, surrounding whitespace, and `-` / space separators.
//! Anything not in a table is [`Mapped::Unmapped`]; the pull pass stores
//! NULL for it and counts the coercion.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapped<T> {
    Known(T),
    Unmapped(String),
    Absent,
}

impl<T> Mapped<T> {
    pub fn known(self) -> Option<T> {
        match self {
            Mapped::Known(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_unmapped(&self) -> bool {
        matches!(self, Mapped::Unmapped(_))
    }
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

fn lookup<T: Copy>(table: &[(&str, T)], raw: Option<&str>) -> Mapped<T> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Mapped::Absent;
    };
    let key = normalize(raw);
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| Mapped::Known(*v))
        .unwrap_or_else(|| Mapped::Unmapped(raw.to_string()))
}

// ---------------------------------------------------------------------------
// License status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Active,
    Inactive,
    Expired,
    Pending,
    Probation,
    Suspended,
    Revoked,
    Surrendered,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Inactive => "inactive",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Pending => "pending",
            LicenseStatus::Probation => "probation",
            LicenseStatus::Suspended => "suspended",
            LicenseStatus::Revoked => "revoked",
            LicenseStatus::Surrendered => "surrendered",
        }
    }
}

const LICENSE_STATUS: &[(&str, LicenseStatus)] = &[
    ("active", LicenseStatus::Active),
    ("current", LicenseStatus::Active),
    ("clear", LicenseStatus::Active),
    ("active_with_conditions", LicenseStatus::Probation),
    ("probation", LicenseStatus::Probation),
    ("probationary", LicenseStatus::Probation),
    ("inactive", LicenseStatus::Inactive),
    ("retired", LicenseStatus::Inactive),
    ("expired", LicenseStatus::Expired),
    ("lapsed", LicenseStatus::Expired),
    ("delinquent", LicenseStatus::Expired),
    ("pending", LicenseStatus::Pending),
    ("in_progress", LicenseStatus::Pending),
    ("suspended", LicenseStatus::Suspended),
    ("revoked", LicenseStatus::Revoked),
    ("surrendered", LicenseStatus::Surrendered),
    ("voluntarily_surrendered", LicenseStatus::Surrendered),
];

pub fn map_license_status(raw: Option<&str>) -> Mapped<LicenseStatus> {
    lookup(LICENSE_STATUS, raw)
}

// ---------------------------------------------------------------------------
// Board certificate status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Certified,
    Expired,
    Revoked,
    NotCertified,
    InProgress,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Certified => "certified",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::NotCertified => "not_certified",
            CertificateStatus::InProgress => "in_progress",
        }
    }
}

const CERTIFICATE_STATUS: &[(&str, CertificateStatus)] = &[
    ("certified", CertificateStatus::Certified),
    ("active", CertificateStatus::Certified),
    ("meeting_moc_requirements", CertificateStatus::Certified),
    ("expired", CertificateStatus::Expired),
    ("lapsed", CertificateStatus::Expired),
    ("revoked", CertificateStatus::Revoked),
    ("not_certified", CertificateStatus::NotCertified),
    ("in_progress", CertificateStatus::InProgress),
    ("eligible", CertificateStatus::InProgress),
];

pub fn map_certificate_status(raw: Option<&str>) -> Mapped<CertificateStatus> {
    lookup(CERTIFICATE_STATUS, raw)
}

// ---------------------------------------------------------------------------
// States and territories
// ---------------------------------------------------------------------------

/// (code, name). Both spellings are accepted; the code is stored.
const REGIONS: &[(&str, &str)] = &[
    ("AL", "alabama"),
    ("AK", "alaska"),
    ("AZ", "arizona"),
    ("AR", "arkansas"),
    ("CA", "california"),
    ("CO", "colorado"),
    ("CT", "connecticut"),
    ("DE", "delaware"),
    ("DC", "district_of_columbia"),
    ("FL", "florida"),
    ("GA", "georgia"),
    ("HI", "hawaii"),
    ("ID", "idaho"),
    ("IL", "illinois"),
    ("IN", "indiana"),
    ("IA", "iowa"),
    ("KS", "kansas"),
    ("KY", "kentucky"),
    ("LA", "louisiana"),
    ("ME", "maine"),
    ("MD", "maryland"),
    ("MA", "massachusetts"),
    ("MI", "michigan"),
    ("MN", "minnesota"),
    ("MS", "mississippi"),
    ("MO", "missouri"),
    ("MT", "montana"),
    ("NE", "nebraska"),
    ("NV", "nevada"),
    ("NH", "new_hampshire"),
    ("NJ", "new_jersey"),
    ("NM", "new_mexico"),
    ("NY", "new_york"),
    ("NC", "north_carolina"),
    ("ND", "north_dakota"),
    ("OH", "ohio"),
    ("OK", "oklahoma"),
    ("OR", "oregon"),
    ("PA", "pennsylvania"),
    ("RI", "rhode_island"),
    ("SC", "south_carolina"),
    ("SD", "south_dakota"),
    ("TN", "tennessee"),
    ("TX", "texas"),
    ("UT", "utah"),
    ("VT", "vermont"),
    ("VA", "virginia"),
    ("WA", "washington"),
    ("WV", "west_virginia"),
    ("WI", "wisconsin"),
    ("WY", "wyoming"),
    ("AS", "american_samoa"),
    ("GU", "guam"),
    ("MP", "northern_mariana_islands"),
    ("PR", "puerto_rico"),
    ("VI", "virgin_islands"),
];

/// Map a remote state spelling to its two-letter code.
pub fn map_region(raw: Option<&str>) -> Mapped<&'static str> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Mapped::Absent;
    };
    let key = normalize(raw);
    REGIONS
        .iter()
        .find(|(code, name)| code.eq_ignore_ascii_case(&key) || *name == key)
        .map(|(code, _)| Mapped::Known(*code))
        .unwrap_or_else(|| Mapped::Unmapped(raw.to_string()))
}
