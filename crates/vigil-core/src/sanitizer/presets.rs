//! Fixed sanitizer preset bundles: none / minimal / default / gdpr / hipaa
//! / pci-dss. Each preset name maps to a stable, key-wise-equal config
//! object across invocations.

use vigil_types::sanitizer::{FieldMatcher, PatternRule, SanitizerConfig};

/// A named, immutable sanitizer configuration bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SanitizerPreset {
    None,
    Minimal,
    Default,
    Gdpr,
    Hipaa,
    PciDss,
}

const EMAIL_PATTERN: &str = r"\b([A-Za-z0-9._%+-]{2})[A-Za-z0-9._%+-]*(@[A-Za-z0-9.-]+\.[A-Za-z]{2,})\b";
const CREDIT_CARD_PATTERN: &str = r"\b(?:\d[ -]?){9,15}(\d{4})\b";
const JWT_PATTERN: &str = r"\beyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\b";
const SSN_PATTERN: &str = r"\b\d{3}-\d{2}-\d{4}\b";
const IPV4_PATTERN: &str = r"\b(?:\d{1,3}\.){3}\d{1,3}\b";
const PHONE_PATTERN: &str = r"\b\+?\d{1,3}?[-. (]?\d{3}[-. )]?\d{3}[-. ]?\d{4}\b";

fn minimal_fields() -> Vec<FieldMatcher> {
    ["password", "secret", "token", "apikey"].into_iter().map(FieldMatcher::exact).collect()
}

fn default_fields() -> Vec<FieldMatcher> {
    // "email" is deliberately absent: a literal field-name match redacts
    // the whole value before patterns run (see `Sanitizer::sanitize_field`),
    // which would pre-empt `EMAIL_PATTERN`'s partial mask below.
    [
        "password", "passwd", "pwd", "secret", "secrets", "token", "accesstoken", "refreshtoken",
        "apikey", "api_key", "authorization", "auth", "cookie", "sessionid", "privatekey",
        "clientsecret", "creditcard", "cardnumber", "cvv", "cvc", "ssn", "pin", "otp",
        "encryptionkey", "signature", "x-api-key", "bearer",
    ]
    .into_iter()
    .map(FieldMatcher::exact)
    .collect()
}

fn default_patterns() -> Vec<PatternRule> {
    vec![
        PatternRule::new("email", EMAIL_PATTERN).with_replacement("$1***$2"),
        PatternRule::new("credit_card", CREDIT_CARD_PATTERN).with_replacement("****$1"),
        PatternRule::new("jwt", JWT_PATTERN).with_replacement("[JWT_REDACTED]"),
    ]
}

impl SanitizerPreset {
    pub fn config(&self) -> SanitizerConfig {
        match self {
            SanitizerPreset::None => SanitizerConfig::disabled(),
            SanitizerPreset::Minimal => SanitizerConfig { fields: minimal_fields(), ..SanitizerConfig::default() },
            SanitizerPreset::Default => SanitizerConfig {
                fields: default_fields(),
                patterns: default_patterns(),
                ..SanitizerConfig::default()
            },
            SanitizerPreset::Gdpr => {
                let mut fields = default_fields();
                fields.extend(["name", "firstname", "lastname", "fullname", "address", "phone", "phonenumber", "ipaddress"].into_iter().map(FieldMatcher::exact));
                let mut patterns = default_patterns();
                patterns.push(PatternRule::new("phone", PHONE_PATTERN));
                patterns.push(PatternRule::new("ipv4", IPV4_PATTERN));
                SanitizerConfig { fields, patterns, ..SanitizerConfig::default() }
            }
            SanitizerPreset::Hipaa => {
                let mut fields = default_fields();
                fields.extend(["diagnosis", "medicalrecordnumber", "mrn", "healthplan", "prescription", "patientid"].into_iter().map(FieldMatcher::exact));
                let mut patterns = default_patterns();
                patterns.push(PatternRule::new("ssn", SSN_PATTERN));
                SanitizerConfig { fields, patterns, ..SanitizerConfig::default() }
            }
            SanitizerPreset::PciDss => {
                let mut fields = default_fields();
                fields.extend(["pan", "primaryaccountnumber", "cvv2", "cvc2", "pinblock"].into_iter().map(FieldMatcher::exact));
                let mut patterns = default_patterns();
                patterns.push(PatternRule::new("pan_full", r"\b(?:\d[ -]?){13,19}\b"));
                SanitizerConfig { fields, patterns, ..SanitizerConfig::default() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_registry_is_stable_across_invocations() {
        for preset in [
            SanitizerPreset::None,
            SanitizerPreset::Minimal,
            SanitizerPreset::Default,
            SanitizerPreset::Gdpr,
            SanitizerPreset::Hipaa,
            SanitizerPreset::PciDss,
        ] {
            let a = preset.config();
            let b = preset.config();
            assert_eq!(a.fields.len(), b.fields.len());
            assert_eq!(a.patterns.len(), b.patterns.len());
            assert_eq!(a.enabled, b.enabled);
        }
    }

    #[test]
    fn none_preset_is_disabled() {
        assert!(!SanitizerPreset::None.config().enabled);
    }

    #[test]
    fn default_preset_has_about_two_dozen_fields() {
        let config = SanitizerPreset::Default.config();
        assert!(config.fields.len() >= 20);
    }

    #[test]
    fn default_preset_partially_masks_an_email_valued_field_instead_of_redacting_it() {
        let config = SanitizerPreset::Default.config();
        let sanitizer = crate::sanitizer::Sanitizer::new(&config).unwrap();
        let value = serde_json::json!({"email": "john.doe@example.com", "password": "s3cr3t", "userId": "u1"});
        let serde_json::Value::Object(obj) = value else { unreachable!() };
        let out = sanitizer.sanitize_object(&obj);
        assert_eq!(out["email"], serde_json::json!("jo***@example.com"));
        assert_eq!(out["password"], serde_json::json!("[REDACTED]"));
        assert_eq!(out["userId"], serde_json::json!("u1"));
    }
}
