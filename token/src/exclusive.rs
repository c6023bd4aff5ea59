use crate::TokenError;

/// Exactly one of the named settings may be present.
///
/// Independent of where the values came from (environment, flags, secrets).
pub fn check_mutually_exclusive(settings: &[(&str, bool)]) -> Result<(), TokenError> {
    let present: Vec<String> = settings
        .iter()
        .filter(|(_, present)| *present)
        .map(|(name, _)| name.to_string())
        .collect();

    match present.len() {
        0 => Err(TokenError::Unconfigured(
            settings.iter().map(|(name, _)| name.to_string()).collect(),
        )),
        1 => Ok(()),
        _ => Err(TokenError::Misconfigured(present)),
    }
}
