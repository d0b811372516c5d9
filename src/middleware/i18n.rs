// src/middleware/i18n.rs

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

// Extrator de idioma. Empresas brasileiras: português é o padrão.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(pub String);

impl Default for Locale {
    fn default() -> Self {
        Locale("pt".to_string())
    }
}

impl Locale {
    pub fn from_header(raw: Option<&str>) -> Self {
        raw.and_then(|header_str| {
            accept_language::parse(header_str)
                .first()
                // "pt-BR" -> "pt", "en" -> "en"
                .map(|tag| tag.split('-').next().unwrap_or(tag).to_lowercase())
        })
        .map(Locale)
        .unwrap_or_default()
    }
}

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());
        Ok(Locale::from_header(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_primary_subtag_of_the_preferred_language() {
        assert_eq!(Locale::from_header(Some("en-US,en;q=0.9,pt;q=0.5")).0, "en");
        assert_eq!(Locale::from_header(Some("pt-BR")).0, "pt");
        assert_eq!(Locale::from_header(None), Locale::default());
    }
}
