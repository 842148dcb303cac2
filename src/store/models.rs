// Oneauth — Registry data models
//
// SECURITY: the `secret` field of `SecretRecord` is intentionally private.
// It never appears in Debug output, log messages, or listing summaries;
// access goes through `SecretStore::material()` so the serving layer is the
// only reader of raw material.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported OTP algorithm kinds. Only time-based codes exist today; the
/// column is kept textual so a counter-based variant stays a data change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpKind {
    Totp,
}

impl OtpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpKind::Totp => "totp",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "totp" => Some(OtpKind::Totp),
            _ => None,
        }
    }
}

impl fmt::Display for OtpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A full secret record as stored. The `secret` field is private — raw
/// material is only reachable via `SecretStore::material()`.
pub struct SecretRecord {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    /// Canonical base32 material — NEVER printed, logged, or Debug-displayed
    secret: String,
    pub otp_kind: OtpKind,
    pub refresh_seconds: u32,
    pub company_id: Option<i64>,
}

impl SecretRecord {
    pub fn new(
        id: i64,
        name: String,
        email: Option<String>,
        secret: String,
        otp_kind: OtpKind,
        refresh_seconds: u32,
        company_id: Option<i64>,
    ) -> Self {
        Self {
            id,
            name,
            email,
            secret,
            otp_kind,
            refresh_seconds,
            company_id,
        }
    }

    /// Access the raw secret material. Callers outside tests should prefer
    /// `SecretStore::material()` which wraps the value in `Zeroizing`.
    pub(crate) fn secret(&self) -> &str {
        &self.secret
    }
}

/// Custom Debug implementation that NEVER reveals the material.
impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("secret", &"[REDACTED]")
            .field("otp_kind", &self.otp_kind)
            .field("refresh_seconds", &self.refresh_seconds)
            .field("company_id", &self.company_id)
            .finish()
    }
}

impl fmt::Display for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.id, self.name, self.otp_kind)
    }
}

/// A listing view of a secret. Never contains the material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSummary {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub otp_kind: OtpKind,
    pub refresh_seconds: u32,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
}

/// Input for creating a new secret record.
pub struct NewSecret {
    pub name: String,
    pub email: Option<String>,
    pub secret: String,
    pub otp_kind: OtpKind,
    pub refresh_seconds: u32,
    pub company_id: Option<i64>,
}

/// Reduce raw material to canonical form: uppercase, restricted to the
/// base32 alphabet `A–Z2–7`, no padding. Anything else (spaces, `=` padding,
/// lowercase, look-alike digits) is stripped rather than rejected.
pub fn canonicalize_material(raw: &str) -> String {
    raw.chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| matches!(c, 'A'..='Z' | '2'..='7'))
        .collect()
}

/// An organization owning secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: i64,
    pub name: String,
    pub customer_ref: Option<String>,
    pub access_code: Option<String>,
}

/// Input for creating a new company record.
pub struct NewCompany {
    pub name: String,
    pub customer_ref: Option<String>,
    pub access_code: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_record_debug_redacts_material() {
        let record = SecretRecord::new(
            1,
            "Payroll portal".to_string(),
            Some("it@example.com".to_string()),
            "JBSWY3DPEHPK3PXP".to_string(),
            OtpKind::Totp,
            30,
            None,
        );

        let debug_output = format!("{:?}", record);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(
            !debug_output.contains("JBSWY3DPEHPK3PXP"),
            "Debug output must NEVER contain the raw material"
        );
    }

    #[test]
    fn test_secret_record_display_has_no_material() {
        let record = SecretRecord::new(
            7,
            "VPN".to_string(),
            None,
            "ABCDEF234567".to_string(),
            OtpKind::Totp,
            60,
            Some(3),
        );

        let display = format!("{}", record);
        assert!(!display.contains("ABCDEF234567"));
        assert!(display.contains("VPN"));
    }

    #[test]
    fn test_summary_serializes_without_material() {
        let summary = SecretSummary {
            id: 2,
            name: "Mail".to_string(),
            email: None,
            otp_kind: OtpKind::Totp,
            refresh_seconds: 30,
            company_id: Some(1),
            company_name: Some("ACME".to_string()),
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("secret"), "Summary JSON must not carry a secret field");
        assert!(json.contains("\"totp\""));
    }

    #[test]
    fn test_canonicalize_strips_padding_and_spacing() {
        assert_eq!(canonicalize_material("abc def=="), "ABCDEF");
        assert_eq!(canonicalize_material("jbswy3dpehpk3pxp"), "JBSWY3DPEHPK3PXP");
        // 0, 1, 8 and 9 are outside the base32 alphabet
        assert_eq!(canonicalize_material("A0B1C8D9"), "ABCD");
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for raw in ["abc def==", "JBSWY3DPEHPK3PXP", "  mf rg g===", ""] {
            let once = canonicalize_material(raw);
            assert_eq!(canonicalize_material(&once), once);
        }
    }

    #[test]
    fn test_otp_kind_round_trip() {
        assert_eq!(OtpKind::parse("totp"), Some(OtpKind::Totp));
        assert_eq!(OtpKind::parse(OtpKind::Totp.as_str()), Some(OtpKind::Totp));
        assert_eq!(OtpKind::parse("hotp"), None);
    }
}
