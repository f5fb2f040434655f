use std::env;

#[derive(Debug, Clone)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        Self::parse(&env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()))
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_production_aliases() {
        assert!(matches!(Environment::parse("production"), Environment::Production));
        assert!(matches!(Environment::parse("PROD"), Environment::Production));
        assert!(matches!(Environment::parse("development"), Environment::Development));
        // Anything unrecognized falls back to development
        assert!(matches!(Environment::parse("staging"), Environment::Development));
    }

    #[test]
    fn as_str_round_trips() {
        assert_eq!(Environment::Development.as_str(), "development");
        assert_eq!(Environment::Production.as_str(), "production");
    }
}
