use crate::auth::Role;
use crate::errors::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Actor ids granted the admin role at startup (`SCRIPTGATE_ADMINS`, comma-separated).
    pub admins: Vec<String>,
}

impl Config {
    /// Load from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, AppError> {
        if dotenvy::dotenv().is_ok() {
            log::debug!("Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".into()))?;

        let max_connections = match lookup("SCRIPTGATE_MAX_CONNECTIONS") {
            Some(v) => v.parse().map_err(|_| {
                AppError::Config(format!("SCRIPTGATE_MAX_CONNECTIONS is not a number: '{v}'"))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let admins = lookup("SCRIPTGATE_ADMINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            database_url,
            max_connections,
            admins,
        })
    }

    /// Role table seed derived from `admins`.
    pub fn role_assignments(&self) -> impl Iterator<Item = (String, Role)> + '_ {
        self.admins.iter().map(|id| (id.clone(), Role::Admin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(Config::from_lookup(lookup(&[])), Err(AppError::Config(_))));
    }

    #[test]
    fn defaults_and_admin_list() {
        let cfg = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/scriptgate"),
            ("SCRIPTGATE_ADMINS", " alice, ,bob "),
        ]))
        .unwrap();
        assert_eq!(cfg.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(cfg.admins, vec!["alice", "bob"]);
        assert_eq!(cfg.role_assignments().count(), 2);
    }

    #[test]
    fn bad_pool_size_is_a_config_error() {
        let res = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/scriptgate"),
            ("SCRIPTGATE_MAX_CONNECTIONS", "lots"),
        ]));
        assert!(matches!(res, Err(AppError::Config(_))));
    }
}
