//! Second-factor providers known to the host authentication pipeline.

/// Identifier of the push provider implemented by this crate.
pub const NOTAKEY_PROVIDER: &str = "Two_Factor_Notakey";

/// Known provider identifiers and their display labels.
pub const PROVIDER_CATALOGUE: &[(&str, &str)] = &[
    ("Two_Factor_Email", "Email"),
    ("Two_Factor_Totp", "OTP code"),
    ("Two_Factor_FIDO_U2F", "FIDO U2F"),
    ("Two_Factor_Backup_Codes", "Backup codes"),
    (NOTAKEY_PROVIDER, "Notakey Authenticator"),
];

/// Display label for a provider, if it is a known one.
pub fn provider_label(id: &str) -> Option<&'static str> {
    PROVIDER_CATALOGUE
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, label)| *label)
}

/// Identifiers of every known provider, in catalogue order.
pub fn known_providers() -> Vec<String> {
    PROVIDER_CATALOGUE
        .iter()
        .map(|(id, _)| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_label() {
        assert_eq!(provider_label("Two_Factor_Totp"), Some("OTP code"));
        assert_eq!(
            provider_label(NOTAKEY_PROVIDER),
            Some("Notakey Authenticator")
        );
        assert_eq!(provider_label("Two_Factor_Dummy"), None);
    }

    #[test]
    fn test_known_providers_include_push() {
        let known = known_providers();
        assert_eq!(known.len(), 5);
        assert!(known.iter().any(|p| p == NOTAKEY_PROVIDER));
    }
}
